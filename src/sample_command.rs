use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use anyhow::anyhow;
use command_executor::command::Command;
use crossbeam::channel::Sender;

use crate::process::ProcessFn;
use crate::sample::Sample;

pub(crate) struct Processed {
    pub(crate) index: usize,
    pub(crate) key: String,
    pub(crate) result: Result<Option<Sample>, String>,
}

/// Applies the processing function to one sample and sends exactly one [Processed] back.
pub(crate) struct SampleCommand {
    index: usize,
    sample: Mutex<Option<Sample>>,
    process: ProcessFn,
    sender: Sender<Processed>,
}

impl SampleCommand {
    pub(crate) fn new(index: usize, sample: Sample, process: ProcessFn, sender: Sender<Processed>) -> SampleCommand {
        SampleCommand {
            index,
            sample: Mutex::new(Some(sample)),
            process,
            sender,
        }
    }
}

pub(crate) fn apply(process: &ProcessFn, sample: Sample) -> Result<Option<Sample>, String> {
    // a panicking function must still produce a message, the writer counts on one per sample
    match catch_unwind(AssertUnwindSafe(|| process(sample))) {
        Ok(Ok(processed)) => Ok(processed),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(_) => Err("processing function panicked".to_string()),
    }
}

impl Command for SampleCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        let sample = self
            .sample
            .lock()
            .map_err(|_| anyhow!("sample {}: lock poisoned", self.index))?
            .take();
        let sample = match sample {
            Some(sample) => sample,
            None => return Ok(()),
        };

        let key = sample.key().to_string();
        let result = apply(&self.process, sample);
        if self.sender.send(Processed { index: self.index, key, result }).is_err() {
            log::debug!("Receiver closed, dropping sample {}", self.index);
        }
        Ok(())
    }
}
