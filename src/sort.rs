use std::cmp::{max, min};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use rlimit::{getrlimit, Resource, setrlimit};

use crate::config::Config;
use crate::error::TarResult;
use crate::external_sort::{external_sort, SortedSamples};
use crate::field::Field;
use crate::key::Key;
use crate::key_policy::KeyPolicy;
use crate::order::Order;
use crate::output_file::{create_output_file, open_input, persist_output};
use crate::sample::Sample;
use crate::sample_iterator::SampleIterator;
use crate::sample_record::{KeyFn, KeySource, SampleRecord};
use crate::tar_writer::TarWriter;

/// Sort the samples of tar archives
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use tar_sample_sort::field::Field;
/// use tar_sample_sort::field_type::FieldType;
/// use tar_sample_sort::sort::Sort;
///
/// // sort samples by the integer class label stored in their ".cls" part
/// fn sort_by_class(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
///     let mut tar_sort = Sort::new(vec![input], output);
///     tar_sort.add_field(Field::new("cls", FieldType::Integer));
///     // samples are buffered up to this many bytes before a sorted run is spilled
///     tar_sort.with_chunk_size_mb(512);
///     // for large archives use a dedicated directory on the same file system as the output
///     tar_sort.with_tmp_dir(tmp);
///     tar_sort.sort()
/// }
/// ```
pub struct Sort {
    input_files: Vec<PathBuf>,
    output: PathBuf,
    tmp: PathBuf,
    chunk_size_bytes: u64,
    chunk_size_samples: usize,
    files: usize,
    fields: Vec<Field>,
    key_fn: Option<KeyFn>,
    order: Order,
    key_policy: KeyPolicy,
}

impl Sort {
    /// Create a default Sort definition.
    ///
    /// * temporary runs go to std::env::temp_dir(), inside a directory private to each sort
    /// * samples are sorted by their key, as a string
    /// * a run is spilled every 100 MB or 10 000 samples, whichever comes first
    /// * at most 1024 spilled runs exist at once
    /// * default Order is Asc
    /// * keys are split from extensions at the first dot of the file name
    ///
    /// The Sort implementation will increase the file descriptor rlimit to accommodate the
    /// configured number of runs
    pub fn new(input_files: Vec<PathBuf>, output: PathBuf) -> Sort {
        Sort {
            input_files,
            output,
            tmp: std::env::temp_dir(),
            chunk_size_bytes: 100_000_000,
            chunk_size_samples: 10_000,
            files: 1024,
            fields: vec![],
            key_fn: None,
            order: Order::Asc,
            key_policy: KeyPolicy::FirstDot,
        }
    }

    /// Set the directory for spilled runs. By default use std::env::temp_dir()
    pub fn with_tmp_dir(&mut self, tmp: PathBuf) {
        self.tmp = tmp;
    }

    /// Spill a sorted run once the buffered samples reach `chunk_size_bytes` archive bytes
    pub fn with_chunk_size_bytes(&mut self, chunk_size_bytes: u64) {
        self.chunk_size_bytes = chunk_size_bytes;
    }

    pub fn with_chunk_size_mb(&mut self, chunk_size_mb: u64) {
        self.chunk_size_bytes = chunk_size_mb * 1_000_000;
    }

    /// Spill a sorted run once `chunk_size_samples` samples are buffered
    pub fn with_chunk_size_samples(&mut self, chunk_size_samples: usize) {
        self.chunk_size_samples = chunk_size_samples;
    }

    /// Set the number of spilled runs that triggers their consolidation. The default is 1024.
    pub fn with_intermediate_files(&mut self, files: usize) {
        self.files = files;
    }

    /// Add field specification. The default is to sort by the sample key as a string
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Replace all fields with the `fields` value.
    pub fn with_fields(&mut self, fields: Vec<Field>) {
        self.fields = fields
    }

    /// Sort by the key computed by `key_fn` instead of fields.
    pub fn with_key_fn<F>(&mut self, key_fn: F)
    where
        F: Fn(&Sample) -> Result<Key, anyhow::Error> + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
    }

    /// Set [Order]
    pub fn with_order(&mut self, order: Order) {
        self.order = order
    }

    /// Set the rule deriving sample keys from entry names
    pub fn with_key_policy(&mut self, key_policy: KeyPolicy) {
        self.key_policy = key_policy
    }

    /// Sort the input files into the output file.
    ///
    /// Samples of all inputs are sorted together. The output is written to a temporary file
    /// first and renamed into place when complete.
    pub fn sort(&self) -> Result<(), anyhow::Error> {
        let config = self.create_config();
        let mut samples = Vec::with_capacity(self.input_files.len());
        for path in &self.input_files {
            samples.push(SampleIterator::from_reader(open_input(path)?, config.key_policy().clone()));
        }
        let writer = create_output_file(&self.output)?;

        let (current_soft, current_hard) = Self::raise_rlimits(&config)?;
        let result = Self::internal_sort(samples.into_iter().flatten(), &config, writer);
        log::info!("Restore rlimit NOFILE, soft: {}, hard: {}", current_soft, current_hard);
        Self::set_rlimits(current_soft, current_hard)?;

        let (writer, count) = result
            .with_context(|| anyhow!("Sort into {}", self.output.display()))?;
        persist_output(writer, &self.output)?;
        log::info!("Sorted {} samples into {}", count, self.output.display());
        Ok(())
    }

    /// Sort one tar stream into another, e.g. STDIN to STDOUT in a pipeline.
    pub fn sort_stream<R: Read, W: Write>(&self, input: R, output: W) -> Result<W, anyhow::Error> {
        let config = self.create_config();
        let samples = SampleIterator::from_reader(input, config.key_policy().clone());
        let (current_soft, current_hard) = Self::raise_rlimits(&config)?;
        let result = Self::internal_sort(samples, &config, output);
        Self::set_rlimits(current_soft, current_hard)?;
        let (output, _count) = result?;
        Ok(output)
    }

    /// Sort already grouped samples, returning them lazily for a further stage.
    ///
    /// The caller owns the returned [SortedSamples]; spilled runs are removed as they are
    /// consumed, or when it is dropped.
    pub fn sorted<I>(&self, samples: I) -> TarResult<SortedSamples>
    where
        I: Iterator<Item = TarResult<Sample>>,
    {
        external_sort(samples, &self.create_config())
    }

    fn get_rlimits() -> Result<(u64, u64), anyhow::Error> {
        getrlimit(Resource::NOFILE).with_context(|| "getrlimit")
    }

    fn set_rlimits(soft: u64, hard: u64) -> Result<(), anyhow::Error> {
        setrlimit(Resource::NOFILE, soft, hard)
            .with_context(|| format!("set rlimit NOFILE, soft: {}, hard: {}", soft, hard))?;
        Ok(())
    }

    fn raise_rlimits(config: &Config) -> Result<(u64, u64), anyhow::Error> {
        let (current_soft, current_hard) = Self::get_rlimits()?;
        log::info!("Current rlimit NOFILE, soft: {}, hard: {}", current_soft, current_hard);
        let new_soft = min(max((config.files() + 256) as u64, current_soft), current_hard);
        log::info!("Set new rlimit NOFILE, soft: {}, hard: {}", new_soft, current_hard);
        Self::set_rlimits(new_soft, current_hard)?;
        Ok((current_soft, current_hard))
    }

    fn create_config(&self) -> Config {
        let key_source = match &self.key_fn {
            Some(key_fn) => KeySource::Function(key_fn.clone()),
            None => {
                if self.fields.is_empty() {
                    KeySource::Fields(vec![Field::key()])
                } else {
                    KeySource::Fields(self.fields.clone())
                }
            }
        };

        Config::new(
            self.tmp.clone(),
            "tar-sort-".to_string(),
            ".run".to_string(),
            max(self.chunk_size_bytes, 1),
            max(self.chunk_size_samples, 1),
            max(self.files, 2),
            key_source,
            self.order.clone(),
            self.key_policy.clone(),
        )
    }

    /// Check whether each input file is already sorted by the configured keys.
    pub fn check(&self) -> Result<bool, anyhow::Error> {
        let mut result = true;
        for path in &self.input_files {
            result = self
                .check_stream(open_input(path)?)
                .with_context(|| anyhow!("path: {}", path.display()))?;
            if !result {
                log::info!("{} is not sorted", path.display());
                break;
            }
        }
        Ok(result)
    }

    pub fn check_stream<R: Read>(&self, input: R) -> Result<bool, anyhow::Error> {
        let config = self.create_config();
        let mut previous: Option<SampleRecord> = None;
        for sample in SampleIterator::from_reader(input, config.key_policy().clone()) {
            let current = SampleRecord::new(sample?, config.key_source(), config.order().clone())?;
            if let Some(previous) = &previous {
                if previous > &current {
                    return Ok(false);
                }
            }
            previous = Some(current);
        }
        Ok(true)
    }

    fn internal_sort<I, W>(samples: I, config: &Config, output: W) -> TarResult<(W, usize)>
    where
        I: Iterator<Item = TarResult<Sample>>,
        W: Write,
    {
        log::info!("Start sort");
        let sorted = external_sort(samples, config)?;
        log::info!("Merging {} runs", sorted.runs());
        let mut writer = TarWriter::new(output);
        let mut count = 0;
        for sample in sorted {
            writer.write_sample(&sample?)?;
            count += 1;
        }
        let output = writer.finish()?;
        log::info!("Finish sort, samples: {}", count);
        Ok((output, count))
    }
}
