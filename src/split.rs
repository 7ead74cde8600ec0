use std::ffi::OsString;
use std::io;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use tempfile::{NamedTempFile, TempPath};

use crate::key_policy::KeyPolicy;
use crate::output_file::{close_output, create_output_file, open_input, persist_path};
use crate::sample_iterator::SampleIterator;
use crate::shard_policy::{ShardLimits, ShardPolicy};
use crate::splitter::{ShardOutput, Splitter};

/// Split tar archives into shard files named `{prefix}-{shard:06}.tar`
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use tar_sample_sort::shard_policy::ShardPolicy;
/// use tar_sample_sort::split::Split;
///
/// // numbered shards of at most 1000 samples or 1 GB each
/// fn split_train_set(input: PathBuf) -> Result<Vec<PathBuf>, anyhow::Error> {
///     let mut tar_split = Split::new(vec![input], PathBuf::from("/data/train"));
///     tar_split.with_policy(ShardPolicy::Sequential);
///     tar_split.with_max_samples(1000);
///     tar_split.with_max_bytes(1_000_000_000);
///     tar_split.split()
/// }
/// ```
pub struct Split {
    input_files: Vec<PathBuf>,
    prefix: PathBuf,
    policy: ShardPolicy,
    limits: ShardLimits,
    key_policy: KeyPolicy,
}

impl Split {
    /// Create a default Split definition.
    ///
    /// * samples are distributed round robin over 2 shards
    /// * shards are not capped
    /// * keys are split from extensions at the first dot of the file name
    pub fn new(input_files: Vec<PathBuf>, prefix: PathBuf) -> Split {
        Split {
            input_files,
            prefix,
            policy: ShardPolicy::RoundRobin { shards: 2 },
            limits: ShardLimits::default(),
            key_policy: KeyPolicy::FirstDot,
        }
    }

    /// Set [ShardPolicy]
    pub fn with_policy(&mut self, policy: ShardPolicy) {
        self.policy = policy;
    }

    pub fn with_max_samples(&mut self, max_samples: usize) {
        self.limits.max_samples = Some(max_samples);
    }

    pub fn with_max_bytes(&mut self, max_bytes: u64) {
        self.limits.max_bytes = Some(max_bytes);
    }

    /// Replace all caps with `limits`
    pub fn with_limits(&mut self, limits: ShardLimits) {
        self.limits = limits;
    }

    /// Set the rule deriving sample keys from entry names
    pub fn with_key_policy(&mut self, key_policy: KeyPolicy) {
        self.key_policy = key_policy;
    }

    /// Path of the file holding `shard`.
    pub fn shard_path(&self, shard: usize) -> PathBuf {
        let mut name = OsString::from(self.prefix.as_os_str());
        name.push(format!("-{:06}.tar", shard));
        PathBuf::from(name)
    }

    /// Split the samples of all inputs, in input order. Returns the shard files written.
    ///
    /// Shards are written to temporary files and renamed into place only after every shard is
    /// complete. A shard closed by roll-over releases its file handle right away. On error no
    /// shard file is left behind.
    pub fn split(&self) -> Result<Vec<PathBuf>, anyhow::Error> {
        log::info!("Start split, policy: {:?}, limits: {:?}", self.policy, self.limits);
        let closed = self
            .write_shards()
            .with_context(|| anyhow!("Split into {}", self.prefix.display()))?;

        let mut paths = Vec::with_capacity(closed.len());
        for (shard, tmp_path) in closed {
            let path = self.shard_path(shard);
            persist_path(tmp_path, &path)?;
            paths.push(path);
        }
        Ok(paths)
    }

    fn write_shards(&self) -> Result<Vec<(usize, TempPath)>, anyhow::Error> {
        let mut splitter = Splitter::new(self.policy.clone(), |shard| {
            create_output_file(&self.shard_path(shard)).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        })?
        .with_limits(self.limits);

        let mut closed = Vec::new();
        for path in &self.input_files {
            for sample in SampleIterator::from_reader(open_input(path)?, self.key_policy.clone()) {
                splitter.push(sample?)?;
                for shard in splitter.take_finished() {
                    closed.push(self.close_shard(shard)?);
                }
            }
        }
        for shard in splitter.finish()? {
            closed.push(self.close_shard(shard)?);
        }
        Ok(closed)
    }

    fn close_shard(&self, shard: ShardOutput<BufWriter<NamedTempFile>>) -> Result<(usize, TempPath), anyhow::Error> {
        log::info!(
            "Shard {}, samples: {}, bytes: {}",
            self.shard_path(shard.shard()).display(),
            shard.samples(),
            shard.bytes()
        );
        let number = shard.shard();
        Ok((number, close_output(shard.into_writer())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_path() {
        let split = Split::new(vec![], PathBuf::from("/data/out/train"));
        assert_eq!(split.shard_path(0), PathBuf::from("/data/out/train-000000.tar"));
        assert_eq!(split.shard_path(1234567), PathBuf::from("/data/out/train-1234567.tar"));
    }
}
