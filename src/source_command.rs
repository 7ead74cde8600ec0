use std::io::Read;
use std::sync::Mutex;

use anyhow::anyhow;
use command_executor::command::Command;
use crossbeam::channel::Sender;

use crate::key_policy::KeyPolicy;
use crate::sample::Sample;
use crate::sample_iterator::SampleIterator;

pub(crate) enum SourceMessage {
    Sample { source_index: usize, sample: Sample },
    Done { source_index: usize, samples: usize },
    Failed { source_index: usize, reason: String },
}

/// Reads one source archive and sends its samples, whole and in order, to the merging thread.
///
/// Every source ends with exactly one `Done` or `Failed` message, unless the receiver is gone,
/// in which case reading stops at the first failed send.
pub(crate) struct SourceCommand {
    source_index: usize,
    source: Mutex<Option<Box<dyn Read + Send>>>,
    key_policy: KeyPolicy,
    sender: Sender<SourceMessage>,
}

impl SourceCommand {
    pub(crate) fn new(
        source_index: usize,
        source: Box<dyn Read + Send>,
        key_policy: KeyPolicy,
        sender: Sender<SourceMessage>,
    ) -> SourceCommand {
        SourceCommand {
            source_index,
            source: Mutex::new(Some(source)),
            key_policy,
            sender,
        }
    }

    fn send(&self, message: SourceMessage) -> bool {
        if self.sender.send(message).is_err() {
            log::debug!("Receiver closed, stop reading source {}", self.source_index);
            return false;
        }
        true
    }
}

impl Command for SourceCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        let source = self
            .source
            .lock()
            .map_err(|_| anyhow!("source {}: lock poisoned", self.source_index))?
            .take();
        let source = match source {
            Some(source) => source,
            None => return Ok(()),
        };

        let mut samples = 0;
        for sample in SampleIterator::from_reader(source, self.key_policy.clone()) {
            match sample {
                Ok(sample) => {
                    let message = SourceMessage::Sample {
                        source_index: self.source_index,
                        sample,
                    };
                    if !self.send(message) {
                        return Ok(());
                    }
                    samples += 1;
                }
                Err(e) => {
                    log::warn!("Source {} failed after {} samples: {}", self.source_index, samples, e);
                    self.send(SourceMessage::Failed {
                        source_index: self.source_index,
                        reason: e.to_string(),
                    });
                    return Ok(());
                }
            }
        }
        self.send(SourceMessage::Done {
            source_index: self.source_index,
            samples,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel::bounded;

    use super::*;
    use crate::entry::Entry;
    use crate::tar_writer::TarWriter;

    fn archive(names: &[&str]) -> Result<Vec<u8>, anyhow::Error> {
        let mut writer = TarWriter::new(Vec::new());
        for name in names {
            writer.write_entry(&Entry::new(name, name.as_bytes().to_vec())?)?;
        }
        Ok(writer.finish()?)
    }

    #[test]
    fn test_sends_samples_then_done() -> Result<(), anyhow::Error> {
        let (sender, receiver) = bounded(16);
        let source = Box::new(std::io::Cursor::new(archive(&["a.x", "a.y", "b.x"])?));
        let command = SourceCommand::new(3, source, KeyPolicy::FirstDot, sender);
        command.execute()?;
        drop(command);

        let messages: Vec<SourceMessage> = receiver.iter().collect();
        assert_eq!(messages.len(), 3);
        match &messages[0] {
            SourceMessage::Sample { source_index, sample } => {
                assert_eq!(*source_index, 3);
                assert_eq!(sample.key(), "a");
                assert_eq!(sample.extensions().collect::<Vec<&str>>(), vec!["x", "y"]);
            }
            _ => panic!("expected a sample"),
        }
        assert!(matches!(messages[2], SourceMessage::Done { source_index: 3, samples: 2 }));
        Ok(())
    }

    #[test]
    fn test_truncated_source_fails() -> Result<(), anyhow::Error> {
        let mut data = archive(&["a.x"])?;
        data.truncate(514);
        let (sender, receiver) = bounded(16);
        SourceCommand::new(0, Box::new(std::io::Cursor::new(data)), KeyPolicy::FirstDot, sender).execute()?;
        let messages: Vec<SourceMessage> = receiver.try_iter().collect();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], SourceMessage::Failed { source_index: 0, .. }));
        Ok(())
    }

    #[test]
    fn test_stops_when_receiver_is_gone() -> Result<(), anyhow::Error> {
        let (sender, receiver) = bounded(1);
        drop(receiver);
        let source = Box::new(std::io::Cursor::new(archive(&["a.x", "b.x"])?));
        let command = SourceCommand::new(0, source, KeyPolicy::FirstDot, sender);
        command.execute()?;
        Ok(())
    }
}
