use std::io;
use std::io::Write;

use crate::error::{TarError, TarResult};
use crate::sample::Sample;
use crate::shard_policy::{ShardLimits, ShardPolicy};
use crate::tar_writer::TarWriter;

/// A finished shard: its terminated writer and what went into it.
pub struct ShardOutput<W> {
    shard: usize,
    writer: W,
    samples: usize,
    bytes: u64,
}

impl<W> ShardOutput<W> {
    pub fn shard(&self) -> usize {
        self.shard
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Archive bytes of the samples, without the terminator.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

struct OpenShard<W: Write> {
    shard: usize,
    writer: TarWriter<W>,
    samples: usize,
    bytes: u64,
}

impl<W: Write> OpenShard<W> {
    fn finish(self) -> TarResult<ShardOutput<W>> {
        log::debug!("Close shard {}, samples: {}, bytes: {}", self.shard, self.samples, self.bytes);
        Ok(ShardOutput {
            shard: self.shard,
            writer: self.writer.finish()?,
            samples: self.samples,
            bytes: self.bytes,
        })
    }
}

/// Routes samples to shard writers created on demand by `open`.
///
/// Fixed size policies open all their shards up front, so every shard is a valid archive even
/// when no sample was routed to it. Sequential splitting keeps one shard open at a time; shards
/// it has closed wait in [Splitter::take_finished] until the caller collects them. Samples are
/// written whole, in input order.
///
/// # Examples
/// ```
/// use tar_sample_sort::sample::Sample;
/// use tar_sample_sort::shard_policy::ShardPolicy;
/// use tar_sample_sort::splitter::Splitter;
///
/// fn split_in_two(samples: Vec<Sample>) -> Result<Vec<Vec<u8>>, anyhow::Error> {
///     let mut splitter = Splitter::new(ShardPolicy::RoundRobin { shards: 2 }, |_| Ok(Vec::<u8>::new()))?;
///     for sample in samples {
///         splitter.push(sample)?;
///     }
///     let shards = splitter.finish()?;
///     Ok(shards.into_iter().map(|shard| shard.into_writer()).collect())
/// }
/// ```
pub struct Splitter<W, F>
where
    W: Write,
    F: FnMut(usize) -> io::Result<W>,
{
    policy: ShardPolicy,
    limits: ShardLimits,
    open: F,
    shards: Vec<OpenShard<W>>,
    closed: Vec<ShardOutput<W>>,
    pushed: usize,
}

impl<W, F> Splitter<W, F>
where
    W: Write,
    F: FnMut(usize) -> io::Result<W>,
{
    pub fn new(policy: ShardPolicy, mut open: F) -> TarResult<Splitter<W, F>> {
        let count = match policy.shards() {
            Some(0) => {
                return Err(TarError::invalid_config("shard count must be greater than 0"));
            }
            Some(shards) => shards,
            None => 1,
        };
        let mut shards = Vec::with_capacity(count);
        for shard in 0..count {
            shards.push(Self::open_shard(&mut open, shard)?);
        }
        Ok(Splitter {
            policy,
            limits: ShardLimits::default(),
            open,
            shards,
            closed: Vec::new(),
            pushed: 0,
        })
    }

    /// Set per shard caps. Sequential splitting starts a new shard when a cap is reached, the
    /// other policies fail with [TarError::ShardLimit].
    pub fn with_limits(mut self, limits: ShardLimits) -> Splitter<W, F> {
        self.limits = limits;
        self
    }

    /// Samples routed so far.
    pub fn pushed(&self) -> usize {
        self.pushed
    }

    /// Hand over the shards closed by sequential roll-over since the last call. Callers writing
    /// many shards take them after every push, so finished writers are not kept open.
    pub fn take_finished(&mut self) -> Vec<ShardOutput<W>> {
        std::mem::take(&mut self.closed)
    }

    fn open_shard(open: &mut F, shard: usize) -> TarResult<OpenShard<W>> {
        log::debug!("Open shard {}", shard);
        let writer = open(shard)?;
        Ok(OpenShard {
            shard,
            writer: TarWriter::new(writer),
            samples: 0,
            bytes: 0,
        })
    }

    /// Route one sample, returning the shard it was written to.
    pub fn push(&mut self, sample: Sample) -> TarResult<usize> {
        let sample_bytes = sample.size_bytes();
        let position = match self.policy.assign(self.pushed, sample.key()) {
            Some(shard) => {
                let current = &self.shards[shard];
                if let Some(reason) = self.limits.exceeded_by(current.samples, current.bytes, sample_bytes) {
                    return Err(TarError::ShardLimit { shard, reason });
                }
                shard
            }
            None => {
                let last = self.shards.len() - 1;
                let current = &self.shards[last];
                // a sample never fits in less than a shard of its own
                if current.samples > 0
                    && self.limits.exceeded_by(current.samples, current.bytes, sample_bytes).is_some()
                {
                    self.roll_over()?;
                }
                self.shards.len() - 1
            }
        };

        let current = &mut self.shards[position];
        current.writer.write_sample(&sample)?;
        current.samples += 1;
        current.bytes += sample_bytes;
        self.pushed += 1;
        Ok(current.shard)
    }

    fn roll_over(&mut self) -> TarResult<()> {
        let next = match self.shards.last() {
            Some(current) => current.shard + 1,
            None => 0,
        };
        if let Some(current) = self.shards.pop() {
            self.closed.push(current.finish()?);
        }
        let shard = Self::open_shard(&mut self.open, next)?;
        self.shards.push(shard);
        Ok(())
    }

    /// Terminate every shard and hand back the writers not taken yet, ordered by shard number.
    pub fn finish(self) -> TarResult<Vec<ShardOutput<W>>> {
        let mut outputs = self.closed;
        for shard in self.shards {
            outputs.push(shard.finish()?);
        }
        log::info!("Split {} samples, last shard: {}", self.pushed, outputs.last().map_or(0, |s| s.shard()));
        Ok(outputs)
    }
}

/// Split a sample stream. The first error ends the split, shards written so far are not
/// terminated.
pub fn split_samples<I, W, F>(
    samples: I,
    policy: ShardPolicy,
    limits: ShardLimits,
    open: F,
) -> TarResult<Vec<ShardOutput<W>>>
where
    I: IntoIterator<Item = TarResult<Sample>>,
    W: Write,
    F: FnMut(usize) -> io::Result<W>,
{
    let mut splitter = Splitter::new(policy, open)?.with_limits(limits);
    for sample in samples {
        splitter.push(sample?)?;
    }
    splitter.finish()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::entry::Entry;
    use crate::sample_iterator::SampleIterator;
    use crate::key_policy::KeyPolicy;

    fn sample(key: &str, size: usize) -> Result<Sample, anyhow::Error> {
        let mut sample = Sample::new(key.to_string());
        sample.add_part("bin".to_string(), Entry::new(&format!("{}.bin", key), vec![7; size])?)?;
        Ok(sample)
    }

    fn keys(shard: &ShardOutput<Vec<u8>>) -> Result<Vec<String>, anyhow::Error> {
        let mut keys = Vec::new();
        for sample in SampleIterator::from_reader(shard.writer().as_slice(), KeyPolicy::FirstDot) {
            keys.push(sample?.key().to_string());
        }
        Ok(keys)
    }

    fn input(count: usize) -> Result<Vec<Sample>, anyhow::Error> {
        (0..count).map(|i| sample(&format!("s{:03}", i), i % 7)).collect()
    }

    #[test]
    fn test_round_robin_balances() -> Result<(), anyhow::Error> {
        let shards = split_samples(
            input(10)?.into_iter().map(Ok),
            ShardPolicy::RoundRobin { shards: 3 },
            ShardLimits::default(),
            |_| Ok(Vec::<u8>::new()),
        )?;
        let counts: Vec<usize> = shards.iter().map(|s| s.samples()).collect();
        assert_eq!(counts, vec![4, 3, 3]);
        assert_eq!(keys(&shards[1])?, vec!["s001", "s004", "s007"]);
        Ok(())
    }

    #[test]
    fn test_empty_shards_are_terminated() -> Result<(), anyhow::Error> {
        let shards = split_samples(
            input(1)?.into_iter().map(Ok),
            ShardPolicy::RoundRobin { shards: 3 },
            ShardLimits::default(),
            |_| Ok(Vec::<u8>::new()),
        )?;
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[2].writer().len(), 1024);
        assert!(shards[2].writer().iter().all(|b| *b == 0));
        Ok(())
    }

    #[test]
    fn test_hashed_key_is_deterministic() -> Result<(), anyhow::Error> {
        let samples = input(20)?;
        let split = || {
            split_samples(
                samples.clone().into_iter().map(Ok),
                ShardPolicy::HashedKey { shards: 4 },
                ShardLimits::default(),
                |_| Ok(Vec::<u8>::new()),
            )
        };
        let first = split()?;
        let second = split()?;
        let mut total = 0;
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.writer(), b.writer());
            total += a.samples();
        }
        assert_eq!(total, 20);
        Ok(())
    }

    #[test]
    fn test_sequential_rolls_over() -> Result<(), anyhow::Error> {
        let shards = split_samples(
            input(5)?.into_iter().map(Ok),
            ShardPolicy::Sequential,
            ShardLimits::new().with_max_samples(2),
            |_| Ok(Vec::<u8>::new()),
        )?;
        let counts: Vec<(usize, usize)> = shards.iter().map(|s| (s.shard(), s.samples())).collect();
        assert_eq!(counts, vec![(0, 2), (1, 2), (2, 1)]);
        assert_eq!(keys(&shards[2])?, vec!["s004"]);
        Ok(())
    }

    // counts writers alive at the same time
    struct TrackedShard {
        live: Rc<Cell<usize>>,
    }

    impl TrackedShard {
        fn open(live: &Rc<Cell<usize>>, peak: &Rc<Cell<usize>>) -> TrackedShard {
            live.set(live.get() + 1);
            peak.set(peak.get().max(live.get()));
            TrackedShard { live: live.clone() }
        }
    }

    impl Write for TrackedShard {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for TrackedShard {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    #[test]
    fn test_sequential_releases_finished_shards() -> Result<(), anyhow::Error> {
        let live = Rc::new(Cell::new(0));
        let peak = Rc::new(Cell::new(0));
        let mut splitter = Splitter::new(ShardPolicy::Sequential, |_| Ok(TrackedShard::open(&live, &peak)))?
            .with_limits(ShardLimits::new().with_max_samples(1));
        let mut finished = Vec::new();
        for sample in input(300)? {
            splitter.push(sample)?;
            for shard in splitter.take_finished() {
                finished.push((shard.shard(), shard.samples()));
            }
        }
        for shard in splitter.finish()? {
            finished.push((shard.shard(), shard.samples()));
        }
        assert_eq!(finished.len(), 300);
        assert!(finished.iter().enumerate().all(|(i, (shard, samples))| *shard == i && *samples == 1));
        assert_eq!(live.get(), 0);
        assert!(peak.get() <= 2);
        Ok(())
    }

    #[test]
    fn test_sequential_oversized_sample_gets_own_shard() -> Result<(), anyhow::Error> {
        let samples = vec![sample("a", 10)?, sample("b", 4000)?, sample("c", 10)?];
        let shards = split_samples(
            samples.into_iter().map(Ok),
            ShardPolicy::Sequential,
            ShardLimits::new().with_max_bytes(2048),
            |_| Ok(Vec::<u8>::new()),
        )?;
        let counts: Vec<usize> = shards.iter().map(|s| s.samples()).collect();
        assert_eq!(counts, vec![1, 1, 1]);
        Ok(())
    }

    #[test]
    fn test_fixed_shards_enforce_limits() -> Result<(), anyhow::Error> {
        let result = split_samples(
            input(5)?.into_iter().map(Ok),
            ShardPolicy::RoundRobin { shards: 2 },
            ShardLimits::new().with_max_samples(2),
            |_| Ok(Vec::<u8>::new()),
        );
        match result {
            Err(TarError::ShardLimit { shard, .. }) => assert_eq!(shard, 0),
            _ => panic!("expected a shard limit error"),
        }
        Ok(())
    }

    #[test]
    fn test_zero_shards_rejected() {
        let result = Splitter::new(ShardPolicy::HashedKey { shards: 0 }, |_| Ok(Vec::<u8>::new()));
        assert!(matches!(result, Err(TarError::InvalidConfig(_))));
    }

    #[test]
    fn test_open_failure() {
        let result = Splitter::new(ShardPolicy::RoundRobin { shards: 2 }, |shard| {
            if shard == 1 {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "read only"))
            } else {
                Ok(Vec::<u8>::new())
            }
        });
        assert!(matches!(result, Err(TarError::Io(_))));
    }
}
