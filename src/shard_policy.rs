use xxhash_rust::xxh3::xxh3_64;

/// How samples are assigned to shards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShardPolicy {
    /// Sample `i` goes to shard `i mod shards`. Shard sizes differ by at most one sample.
    RoundRobin { shards: usize },
    /// A key always lands in the same shard, across runs and machines.
    HashedKey { shards: usize },
    /// Fill one shard until a [ShardLimits] cap is reached, then start the next one.
    Sequential,
}

impl ShardPolicy {
    /// Fixed number of shards, `None` for [ShardPolicy::Sequential].
    pub fn shards(&self) -> Option<usize> {
        match self {
            ShardPolicy::RoundRobin { shards } | ShardPolicy::HashedKey { shards } => Some(*shards),
            ShardPolicy::Sequential => None,
        }
    }

    /// Shard of the `index`-th sample with key `key`. Pure, nothing is remembered between calls.
    ///
    /// `None` for [ShardPolicy::Sequential], and for a fixed policy of zero shards.
    pub fn assign(&self, index: usize, key: &str) -> Option<usize> {
        match self {
            ShardPolicy::RoundRobin { shards } => index.checked_rem(*shards),
            ShardPolicy::HashedKey { shards } => hash_key(key)
                .checked_rem(*shards as u64)
                .map(|shard| shard as usize),
            ShardPolicy::Sequential => None,
        }
    }
}

/// Stable 64 bit hash of a sample key.
pub fn hash_key(key: &str) -> u64 {
    xxh3_64(key.as_bytes())
}

/// Optional per-shard caps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShardLimits {
    pub max_samples: Option<usize>,
    pub max_bytes: Option<u64>,
}

impl ShardLimits {
    pub fn new() -> ShardLimits {
        ShardLimits::default()
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> ShardLimits {
        self.max_samples = Some(max_samples);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> ShardLimits {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Would a shard holding `samples` samples and `bytes` bytes overflow by taking one more
    /// sample of `sample_bytes`?
    pub(crate) fn exceeded_by(&self, samples: usize, bytes: u64, sample_bytes: u64) -> Option<String> {
        if let Some(max_samples) = self.max_samples {
            if samples + 1 > max_samples {
                return Some(format!("max samples {}", max_samples));
            }
        }
        if let Some(max_bytes) = self.max_bytes {
            if bytes + sample_bytes > max_bytes {
                return Some(format!("max bytes {}, shard bytes {}, sample bytes {}", max_bytes, bytes, sample_bytes));
            }
        }
        None
    }
}
