use crate::entry::Entry;
use crate::error::{TarError, TarResult};

/// A run of consecutive entries sharing one key, e.g. an image with its label and metadata.
///
/// Parts keep their stream order. An extension appears at most once per sample.
#[derive(Clone, Debug)]
pub struct Sample {
    key: String,
    parts: Vec<(String, Entry)>,
}

impl Sample {
    pub fn new(key: String) -> Sample {
        Sample {
            key,
            parts: Vec::new(),
        }
    }

    pub(crate) fn with_part(key: String, extension: String, entry: Entry) -> Sample {
        Sample {
            key,
            parts: vec![(extension, entry)],
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parts(&self) -> &[(String, Entry)] {
        &self.parts
    }

    pub fn into_parts(self) -> Vec<(String, Entry)> {
        self.parts
    }

    pub fn get(&self, extension: &str) -> Option<&Entry> {
        self.parts
            .iter()
            .find(|(e, _)| e == extension)
            .map(|(_, entry)| entry)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(e, _)| e.as_str())
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Append a part. Rejects an extension already present instead of overwriting it.
    pub fn add_part(&mut self, extension: String, entry: Entry) -> TarResult<()> {
        if self.get(&extension).is_some() {
            return Err(TarError::DuplicateExtension {
                key: self.key.clone(),
                extension,
            });
        }
        self.parts.push((extension, entry));
        Ok(())
    }

    /// Archive bytes of all parts, used for memory budgets and shard size caps.
    pub fn size_bytes(&self) -> u64 {
        self.parts.iter().map(|(_, entry)| entry.encoded_len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_keep_order() -> Result<(), anyhow::Error> {
        let mut sample = Sample::new("a".to_string());
        sample.add_part("jpg".to_string(), Entry::new("a.jpg", vec![1, 2, 3])?)?;
        sample.add_part("cls".to_string(), Entry::new("a.cls", b"7".to_vec())?)?;
        assert_eq!(sample.extensions().collect::<Vec<&str>>(), vec!["jpg", "cls"]);
        assert_eq!(sample.get("cls").map(|e| e.data().to_vec()), Some(b"7".to_vec()));
        assert!(sample.get("txt").is_none());
        assert_eq!(sample.size_bytes(), 2048);
        Ok(())
    }

    #[test]
    fn test_duplicate_extension() -> Result<(), anyhow::Error> {
        let mut sample = Sample::new("a".to_string());
        sample.add_part("jpg".to_string(), Entry::new("a.jpg", vec![1])?)?;
        let result = sample.add_part("jpg".to_string(), Entry::new("a.jpg", vec![2])?);
        assert!(matches!(result, Err(TarError::DuplicateExtension { .. })));
        assert_eq!(sample.len(), 1);
        assert_eq!(sample.get("jpg").map(|e| e.data().to_vec()), Some(vec![1]));
        Ok(())
    }
}
