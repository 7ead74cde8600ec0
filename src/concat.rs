use std::cmp::max;
use std::io;
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool_builder::ThreadPoolBuilder;
use crossbeam::channel::{bounded, Receiver};

use crate::error::{TarError, TarResult};
use crate::key_policy::KeyPolicy;
use crate::output_file::{create_output_file, open_input, persist_output};
use crate::source_command::{SourceCommand, SourceMessage};
use crate::tar_reader::TarReader;
use crate::tar_writer::TarWriter;

/// What a concatenation wrote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConcatStats {
    entries: usize,
    bytes: u64,
}

impl ConcatStats {
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Payload bytes, headers and padding excluded.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Concatenate archives stream by stream into one archive.
///
/// Payloads are copied without being buffered. The terminators of the inputs are dropped and a
/// single one is written at the end. On error nothing more is written, the output has no
/// terminator.
pub fn concat_streams<I, R, W>(inputs: I, output: W) -> TarResult<(W, ConcatStats)>
where
    I: IntoIterator<Item = R>,
    R: Read,
    W: Write,
{
    let mut writer = TarWriter::new(output);
    let mut stats = ConcatStats::default();
    for (source_index, input) in inputs.into_iter().enumerate() {
        let mut reader = TarReader::new(input);
        while let Some(mut entry) = reader.next_entry()? {
            let header = entry.header().clone();
            stats.bytes += writer.write_stream(&header, &mut entry)?;
            stats.entries += 1;
        }
        log::debug!("Source {} copied, entries so far: {}", source_index, stats.entries);
    }
    let output = writer.finish()?;
    Ok((output, stats))
}

/// Merge archives read concurrently into one archive.
///
/// Each source is read by its own command on a thread pool of `tasks` threads and grouped into
/// samples with `key_policy`. Samples travel whole over a channel bounded to `queue_size`
/// messages and are written by the calling thread, so samples of one source keep their order
/// while sources interleave only between samples.
///
/// A failing source ends the merge with [TarError::PartialMerge]. What was written stays, no
/// terminator is added, and the remaining readers stop at their next send. The same holds when
/// writing the output fails.
pub fn concat_parallel<W: Write>(
    sources: Vec<Box<dyn Read + Send>>,
    output: W,
    tasks: usize,
    queue_size: usize,
    key_policy: &KeyPolicy,
) -> TarResult<(W, ConcatStats)> {
    let source_count = sources.len();
    log::info!("Start parallel concat, sources: {}, tasks: {}", source_count, tasks);

    let mut thread_pool_builder = ThreadPoolBuilder::new();
    let mut merging_pool = thread_pool_builder
        .with_name("concat".to_string())
        .with_tasks(max(tasks, 1))
        .with_queue_size(max(source_count, queue_size))
        .with_shutdown_mode(ShutdownMode::CompletePending)
        .build()
        .map_err(|e| TarError::invalid_config(format!("thread pool: {}", e)))?;

    let (sender, receiver) = bounded(max(queue_size, 1));
    for (source_index, source) in sources.into_iter().enumerate() {
        let source_command = Box::new(SourceCommand::new(source_index, source, key_policy.clone(), sender.clone()));
        merging_pool.submit(source_command);
    }
    drop(sender);

    let result = consume(receiver, output, source_count);

    log::info!("Shutting down concat pool");
    merging_pool.shutdown();
    merging_pool
        .join()
        .map_err(|e| TarError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;

    let (output, stats) = result?;
    log::info!("Finish parallel concat, entries: {}, bytes: {}", stats.entries, stats.bytes);
    Ok((output, stats))
}

// The receiver is dropped on return, every pending send then fails.
fn consume<W: Write>(receiver: Receiver<SourceMessage>, output: W, source_count: usize) -> TarResult<(W, ConcatStats)> {
    let mut writer = TarWriter::new(output);
    let mut stats = ConcatStats::default();
    let mut pending = vec![true; source_count];
    let mut remaining = source_count;

    while remaining > 0 {
        let message = match receiver.recv() {
            Ok(message) => message,
            Err(_) => {
                let source_index = pending.iter().position(|p| *p).unwrap_or(0);
                return Err(TarError::PartialMerge {
                    source_index,
                    reason: "reader stopped without finishing".to_string(),
                });
            }
        };
        match message {
            SourceMessage::Sample { sample, .. } => {
                writer.write_sample(&sample)?;
                stats.entries += sample.len();
                stats.bytes += sample.parts().iter().map(|(_, entry)| entry.size()).sum::<u64>();
            }
            SourceMessage::Done { source_index, samples } => {
                log::debug!("Source {} drained, samples: {}", source_index, samples);
                pending[source_index] = false;
                remaining -= 1;
            }
            SourceMessage::Failed { source_index, reason } => {
                return Err(TarError::PartialMerge { source_index, reason });
            }
        }
    }

    let output = writer.finish()?;
    Ok((output, stats))
}

/// Concatenate tar archive files
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use tar_sample_sort::concat::Concat;
///
/// // merge shards written by parallel workers, reading 4 of them at a time; samples of
/// // different shards may interleave
/// fn merge_shards(shards: Vec<PathBuf>, output: PathBuf) -> Result<(), anyhow::Error> {
///     let mut tar_concat = Concat::new(shards, output);
///     tar_concat.with_tasks(4);
///     let stats = tar_concat.concat()?;
///     log::info!("Merged {} entries", stats.entries());
///     Ok(())
/// }
/// ```
pub struct Concat {
    input_files: Vec<PathBuf>,
    output: PathBuf,
    tasks: usize,
    queue_size: usize,
    key_policy: KeyPolicy,
}

impl Concat {
    /// Create a default Concat definition.
    ///
    /// * inputs are copied one after the other, in order
    /// * at most 64 samples wait to be written when reading concurrently
    /// * keys are split from extensions at the first dot of the file name
    pub fn new(input_files: Vec<PathBuf>, output: PathBuf) -> Concat {
        Concat {
            input_files,
            output,
            tasks: 1,
            queue_size: 64,
            key_policy: KeyPolicy::FirstDot,
        }
    }

    /// Set the number of reader threads. With one task or less inputs are copied one after the
    /// other by the calling thread and the output keeps their order. With more, samples of
    /// different inputs interleave. `num_cpus::get()` is a reasonable value for many inputs.
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// Set the number of samples that may wait between the readers and the writer.
    pub fn with_queue_size(&mut self, queue_size: usize) {
        self.queue_size = queue_size;
    }

    /// Set the rule grouping entries into samples when reading concurrently.
    pub fn with_key_policy(&mut self, key_policy: KeyPolicy) {
        self.key_policy = key_policy;
    }

    /// Concatenate the input files into the output file, renamed into place on success.
    pub fn concat(&self) -> Result<ConcatStats, anyhow::Error> {
        let writer = create_output_file(&self.output)?;
        let result = if self.tasks <= 1 {
            let mut inputs = Vec::with_capacity(self.input_files.len());
            for path in &self.input_files {
                inputs.push(open_input(path)?);
            }
            concat_streams(inputs, writer)
        } else {
            let mut sources: Vec<Box<dyn Read + Send>> = Vec::with_capacity(self.input_files.len());
            for path in &self.input_files {
                sources.push(Box::new(open_input(path)?));
            }
            concat_parallel(sources, writer, self.tasks, self.queue_size, &self.key_policy)
        };
        let (writer, stats) = result.with_context(|| anyhow!("Concat into {}", self.output.display()))?;

        persist_output(writer, &self.output)?;
        log::info!(
            "Concatenated {} files into {}, entries: {}",
            self.input_files.len(),
            self.output.display(),
            stats.entries()
        );
        Ok(stats)
    }
}
