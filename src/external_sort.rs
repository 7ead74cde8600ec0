use std::mem;

use tempfile::{Builder, TempDir};

use crate::config::Config;
use crate::error::TarResult;
use crate::merger::{Merger, RunSource};
use crate::run_cursor::RunCursor;
use crate::run_file::RunFile;
use crate::sample::Sample;
use crate::sample_record::SampleRecord;

/// Globally sorted samples, produced lazily by the merge phase of an external sort.
///
/// Holds the private temporary directory of the sort; it is removed, together with any run not
/// consumed yet, when this value is dropped.
pub struct SortedSamples {
    merger: Merger,
    runs: usize,
    _tmp_dir: Option<TempDir>,
}

impl SortedSamples {
    /// Number of runs taking part in the merge, the in-memory remainder included.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Samples produced so far.
    pub fn merged(&self) -> usize {
        self.merger.merged()
    }
}

impl Iterator for SortedSamples {
    type Item = TarResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.merger
            .next()
            .map(|record| record.map(|record| record.into_sample()))
    }
}

pub(crate) fn create_tmp_dir(config: &Config) -> TarResult<TempDir> {
    let dir = Builder::new()
        .prefix(config.tmp_prefix())
        .tempdir_in(config.tmp())?;
    Ok(dir)
}

/// Partition phase of the external sort.
///
/// Samples are buffered until either budget is reached, then stable sorted and spilled as a
/// run. Reaching `files` spilled runs merges them all into one run that takes their place. The
/// final buffer stays in memory and joins the merge as the last run.
pub(crate) fn external_sort<I>(samples: I, config: &Config) -> TarResult<SortedSamples>
where
    I: Iterator<Item = TarResult<Sample>>,
{
    let mut tmp_dir: Option<TempDir> = None;
    let mut runs: Vec<RunFile> = Vec::new();
    let mut buffer: Vec<SampleRecord> = Vec::new();
    let mut buffer_bytes: u64 = 0;
    let mut next_seq = 0;
    let mut total = 0;

    for sample in samples {
        let record = SampleRecord::new(sample?, config.key_source(), config.order().clone())?;
        buffer_bytes += record.sample().size_bytes();
        buffer.push(record);
        total += 1;

        if buffer.len() >= config.chunk_size_samples() || buffer_bytes >= config.chunk_size_bytes() {
            let dir = match tmp_dir.take() {
                Some(dir) => dir,
                None => create_tmp_dir(config)?,
            };

            let mut chunk = mem::take(&mut buffer);
            chunk.sort();
            runs.push(RunFile::spill(next_seq, chunk.into_iter().map(Ok), dir.path(), config)?);
            next_seq += 1;
            buffer_bytes = 0;

            if runs.len() >= config.files() {
                log::info!("Consolidating {} runs", runs.len());
                let merger = Merger::new(open_runs(runs.drain(..), config)?)?;
                runs.push(RunFile::spill(next_seq, merger, dir.path(), config)?);
                next_seq += 1;
            }
            tmp_dir = Some(dir);
        }
    }

    buffer.sort();
    let spilled = runs.len();
    let mut sources = open_runs(runs.into_iter(), config)?;
    sources.push(RunSource::Memory(buffer.into_iter()));
    log::info!(
        "Partitioned {} samples, spilled runs: {}, runs created: {}",
        total,
        spilled,
        next_seq
    );

    Ok(SortedSamples {
        runs: sources.len(),
        merger: Merger::new(sources)?,
        _tmp_dir: tmp_dir,
    })
}

fn open_runs<I>(runs: I, config: &Config) -> TarResult<Vec<RunSource>>
where
    I: Iterator<Item = RunFile>,
{
    runs.map(|run| RunCursor::new(run, config.order().clone()).map(RunSource::Spilled))
        .collect()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::entry::Entry;
    use crate::field::Field;
    use crate::field_type::FieldType;
    use crate::key_policy::KeyPolicy;
    use crate::order::Order;
    use crate::sample_record::KeySource;

    fn config(dir: &TempDir, chunk_size_samples: usize, files: usize) -> Config {
        Config::new(
            dir.path().to_path_buf(),
            "sort-".to_string(),
            ".run".to_string(),
            u64::MAX,
            chunk_size_samples,
            files,
            KeySource::Fields(vec![Field::new("cls", FieldType::Integer)]),
            Order::Asc,
            KeyPolicy::FirstDot,
        )
    }

    fn samples(classes: &[i64]) -> Result<Vec<Sample>, anyhow::Error> {
        let mut samples = Vec::new();
        for (i, cls) in classes.iter().enumerate() {
            let key = format!("{:04}", i);
            let mut sample = Sample::new(key.clone());
            sample.add_part("cls".to_string(), Entry::new(&format!("{}.cls", key), cls.to_string().into_bytes())?)?;
            samples.push(sample);
        }
        Ok(samples)
    }

    fn sorted_keys(sorted: SortedSamples) -> Result<Vec<String>, anyhow::Error> {
        let mut keys = Vec::new();
        for sample in sorted {
            keys.push(sample?.key().to_string());
        }
        Ok(keys)
    }

    #[test]
    fn test_stable_for_every_budget() -> Result<(), anyhow::Error> {
        let classes = [3, 1, 2, 1, 3, 2, 1, 0, 3, 2];
        let mut expected: Vec<(i64, String)> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, format!("{:04}", i)))
            .collect();
        expected.sort_by_key(|(c, _)| *c);
        let expected: Vec<String> = expected.into_iter().map(|(_, k)| k).collect();

        for chunk_size_samples in [1, 2, 3, 5, 10, 100] {
            let dir = TempDir::new()?;
            let config = config(&dir, chunk_size_samples, 1024);
            let sorted = external_sort(samples(&classes)?.into_iter().map(Ok), &config)?;
            assert_eq!(sorted_keys(sorted)?, expected, "chunk size {}", chunk_size_samples);
            assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        }
        Ok(())
    }

    #[test]
    fn test_no_spill_when_input_fits() -> Result<(), anyhow::Error> {
        let dir = TempDir::new()?;
        let config = config(&dir, 100, 1024);
        let sorted = external_sort(samples(&[2, 1])?.into_iter().map(Ok), &config)?;
        assert_eq!(sorted.runs(), 1);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        assert_eq!(sorted_keys(sorted)?, vec!["0001", "0000"]);
        Ok(())
    }

    #[test]
    fn test_consolidation_keeps_stability() -> Result<(), anyhow::Error> {
        let classes: Vec<i64> = (0..40).map(|i| i % 3).collect();
        let dir = TempDir::new()?;
        let config = config(&dir, 2, 3);
        let sorted = external_sort(samples(&classes)?.into_iter().map(Ok), &config)?;
        assert!(sorted.runs() <= 3);
        let keys = sorted_keys(sorted)?;
        let mut expected: Vec<String> = Vec::new();
        for cls in 0..3 {
            for (i, c) in classes.iter().enumerate() {
                if *c == cls {
                    expected.push(format!("{:04}", i));
                }
            }
        }
        assert_eq!(keys, expected);
        Ok(())
    }

    #[test]
    fn test_key_error_aborts() -> Result<(), anyhow::Error> {
        let dir = TempDir::new()?;
        let config = config(&dir, 1, 1024);
        let mut input = samples(&[1, 2])?;
        input.push(Sample::new("no-cls".to_string()));
        let result = external_sort(input.into_iter().map(Ok), &config);
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
