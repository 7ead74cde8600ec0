use regex::Regex;

use crate::error::{TarError, TarResult};

/// Rule splitting an entry name into a sample key and an extension.
///
/// Only the part after the final `/` is searched for the separating dot, so dots in directory
/// names never split. A name without a dot, or one the pattern does not match, is its own key
/// with an empty extension.
///
/// # Examples
/// ```
/// use tar_sample_sort::key_policy::KeyPolicy;
///
/// assert_eq!(KeyPolicy::FirstDot.split("train.v2/x.seg.png"), ("train.v2/x", "seg.png"));
/// assert_eq!(KeyPolicy::LastDot.split("train.v2/x.seg.png"), ("train.v2/x.seg", "png"));
///
/// let policy = KeyPolicy::pattern(r"^(.*?)_([a-z]+)$").unwrap();
/// assert_eq!(policy.split("sample_label"), ("sample", "label"));
/// ```
#[derive(Clone, Debug, Default)]
pub enum KeyPolicy {
    /// Split at the first dot of the basename: `x.seg.png` is key `x`, extension `seg.png`
    #[default]
    FirstDot,
    /// Split at the last dot of the basename: `x.seg.png` is key `x.seg`, extension `png`
    LastDot,
    /// First capture group is the key, second the extension
    Pattern(Regex),
}

impl KeyPolicy {
    /// Create a [KeyPolicy::Pattern], the regex must have at least two capture groups.
    pub fn pattern(pattern: &str) -> TarResult<KeyPolicy> {
        let regex = Regex::new(pattern)
            .map_err(|e| TarError::invalid_config(format!("key pattern {}: {}", pattern, e)))?;
        if regex.captures_len() < 3 {
            return Err(TarError::invalid_config(format!(
                "key pattern {} needs two capture groups, key and extension",
                pattern
            )));
        }
        Ok(KeyPolicy::Pattern(regex))
    }

    pub fn split<'a>(&self, name: &'a str) -> (&'a str, &'a str) {
        match self {
            KeyPolicy::FirstDot => {
                let start = basename_start(name);
                match name[start..].find('.') {
                    Some(i) => (&name[..start + i], &name[start + i + 1..]),
                    None => (name, ""),
                }
            }
            KeyPolicy::LastDot => {
                let start = basename_start(name);
                match name[start..].rfind('.') {
                    Some(i) => (&name[..start + i], &name[start + i + 1..]),
                    None => (name, ""),
                }
            }
            KeyPolicy::Pattern(regex) => match regex.captures(name) {
                Some(captures) => match (captures.get(1), captures.get(2)) {
                    (Some(key), Some(extension)) => (key.as_str(), extension.as_str()),
                    _ => (name, ""),
                },
                None => (name, ""),
            },
        }
    }

    pub fn key<'a>(&self, name: &'a str) -> &'a str {
        self.split(name).0
    }
}

fn basename_start(name: &str) -> usize {
    name.rfind('/').map(|i| i + 1).unwrap_or(0)
}
