use std::cmp::max;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool::ThreadPool;
use command_executor::thread_pool_builder::ThreadPoolBuilder;
use crossbeam::channel::{bounded, Receiver, Sender};

use crate::error::{TarError, TarResult};
use crate::key_policy::KeyPolicy;
use crate::output_file::{create_output_file, open_input, persist_output};
use crate::sample::Sample;
use crate::sample_command::{apply, Processed, SampleCommand};
use crate::sample_iterator::SampleIterator;
use crate::tar_writer::TarWriter;

/// Transforms one sample. `Ok(None)` drops the sample from the output.
pub type ProcessFn = Arc<dyn Fn(Sample) -> Result<Option<Sample>, anyhow::Error> + Send + Sync>;

/// What a processing run read and wrote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessStats {
    processed: usize,
    written: usize,
}

impl ProcessStats {
    /// Samples passed to the processing function.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Samples written to the output.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn dropped(&self) -> usize {
        self.processed - self.written
    }
}

/// Pass every sample through `process` and write the results as one archive.
///
/// With `tasks <= 1` samples are processed by the calling thread and keep their order. With
/// more, each sample becomes a command on a thread pool of `tasks` threads and results are
/// written in completion order by the calling thread. At most `queue_size` samples are in
/// flight, so memory stays bounded whatever the input size.
///
/// The first failure, of the input or of `process`, ends the run. What was written stays and
/// no terminator is added.
pub fn process_samples<I, W>(
    samples: I,
    output: W,
    process: ProcessFn,
    tasks: usize,
    queue_size: usize,
) -> TarResult<(W, ProcessStats)>
where
    I: IntoIterator<Item = TarResult<Sample>>,
    W: Write,
{
    let mut writer = TarWriter::new(output);
    let mut stats = ProcessStats::default();
    if tasks <= 1 {
        for sample in samples {
            let sample = sample?;
            let key = sample.key().to_string();
            stats.processed += 1;
            let processed = apply(&process, sample).map_err(|reason| TarError::Process { key, reason })?;
            if let Some(sample) = processed {
                writer.write_sample(&sample)?;
                stats.written += 1;
            }
        }
    } else {
        log::info!("Start parallel processing, tasks: {}, queue size: {}", tasks, queue_size);
        let in_flight = max(queue_size, 1);
        let mut thread_pool_builder = ThreadPoolBuilder::new();
        let mut processing_pool = thread_pool_builder
            .with_name("process".to_string())
            .with_tasks(tasks)
            .with_queue_size(in_flight)
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()
            .map_err(|e| TarError::invalid_config(format!("thread pool: {}", e)))?;

        // room for every sample in flight, workers never block on a send
        let (sender, receiver) = bounded(in_flight);
        let result = dispatch(samples, &processing_pool, process, sender, &receiver, &mut writer, &mut stats);
        drop(receiver);

        log::info!("Shutting down processing pool");
        processing_pool.shutdown();
        processing_pool
            .join()
            .map_err(|e| TarError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
        result?;
    }

    let output = writer.finish()?;
    log::info!("Processed {} samples, written: {}", stats.processed, stats.written);
    Ok((output, stats))
}

fn dispatch<I, W>(
    samples: I,
    pool: &ThreadPool,
    process: ProcessFn,
    sender: Sender<Processed>,
    receiver: &Receiver<Processed>,
    writer: &mut TarWriter<W>,
    stats: &mut ProcessStats,
) -> TarResult<()>
where
    I: IntoIterator<Item = TarResult<Sample>>,
    W: Write,
{
    let in_flight = sender.capacity().unwrap_or(1);
    let mut pending = 0;
    for (index, sample) in samples.into_iter().enumerate() {
        let sample = sample?;
        while pending >= in_flight {
            collect(receiver, writer, stats)?;
            pending -= 1;
        }
        pool.submit(Box::new(SampleCommand::new(index, sample, process.clone(), sender.clone())));
        pending += 1;
    }
    while pending > 0 {
        collect(receiver, writer, stats)?;
        pending -= 1;
    }
    Ok(())
}

fn collect<W: Write>(receiver: &Receiver<Processed>, writer: &mut TarWriter<W>, stats: &mut ProcessStats) -> TarResult<()> {
    let processed = receiver
        .recv()
        .map_err(|_| TarError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "processing workers stopped")))?;
    stats.processed += 1;
    match processed.result {
        Ok(Some(sample)) => {
            writer.write_sample(&sample)?;
            stats.written += 1;
        }
        Ok(None) => {
            log::debug!("Sample {} '{}' dropped", processed.index, processed.key);
        }
        Err(reason) => {
            return Err(TarError::Process { key: processed.key, reason });
        }
    }
    Ok(())
}

/// Process the samples of tar archive files into one archive
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use tar_sample_sort::process::Process;
/// use tar_sample_sort::sample::Sample;
///
/// // keep only samples that carry a class label
/// fn labeled(inputs: Vec<PathBuf>, output: PathBuf) -> Result<(), anyhow::Error> {
///     let mut tar_process = Process::new(inputs, output, |sample: Sample| {
///         Ok(if sample.get("cls").is_some() { Some(sample) } else { None })
///     });
///     tar_process.with_tasks(4);
///     let stats = tar_process.process()?;
///     log::info!("Dropped {} unlabeled samples", stats.dropped());
///     Ok(())
/// }
/// ```
pub struct Process {
    input_files: Vec<PathBuf>,
    output: PathBuf,
    process: ProcessFn,
    tasks: usize,
    queue_size: usize,
    key_policy: KeyPolicy,
}

impl Process {
    /// Create a default Process definition.
    ///
    /// * samples are processed by as many threads as there are CPU cores
    /// * at most 64 samples are in flight
    /// * keys are split from extensions at the first dot of the file name
    pub fn new<F>(input_files: Vec<PathBuf>, output: PathBuf, process: F) -> Process
    where
        F: Fn(Sample) -> Result<Option<Sample>, anyhow::Error> + Send + Sync + 'static,
    {
        Process {
            input_files,
            output,
            process: Arc::new(process),
            tasks: num_cpus::get(),
            queue_size: 64,
            key_policy: KeyPolicy::FirstDot,
        }
    }

    /// Set the number of processing threads. With one task or less the output keeps the input
    /// order.
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// Set the number of samples in flight.
    pub fn with_queue_size(&mut self, queue_size: usize) {
        self.queue_size = queue_size;
    }

    /// Set the rule deriving sample keys from entry names
    pub fn with_key_policy(&mut self, key_policy: KeyPolicy) {
        self.key_policy = key_policy;
    }

    /// Process the samples of all inputs into the output file, renamed into place on success.
    pub fn process(&self) -> Result<ProcessStats, anyhow::Error> {
        let mut samples = Vec::with_capacity(self.input_files.len());
        for path in &self.input_files {
            samples.push(SampleIterator::from_reader(open_input(path)?, self.key_policy.clone()));
        }

        let writer = create_output_file(&self.output)?;
        let (writer, stats) = process_samples(
            samples.into_iter().flatten(),
            writer,
            self.process.clone(),
            self.tasks,
            self.queue_size,
        )
        .with_context(|| anyhow!("Process into {}", self.output.display()))?;

        persist_output(writer, &self.output)?;
        Ok(stats)
    }
}
