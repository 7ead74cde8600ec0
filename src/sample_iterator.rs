use std::io::Read;

use crate::error::TarResult;
use crate::key_policy::KeyPolicy;
use crate::sample::Sample;
use crate::tar_reader::TarReader;

enum State {
    AwaitingFirst,
    Accumulating(Sample),
    Done,
}

/// Groups the entries of a tar stream into [Sample]s by contiguous key.
///
/// Only the current sample is held; there is no global key table, so entries with the same key
/// that are not adjacent in the stream come out as separate samples. After the first error the
/// iterator is exhausted.
///
/// # Examples
/// ```
/// use tar_sample_sort::entry::Entry;
/// use tar_sample_sort::key_policy::KeyPolicy;
/// use tar_sample_sort::sample_iterator::SampleIterator;
/// use tar_sample_sort::tar_writer::TarWriter;
///
/// let mut writer = TarWriter::new(Vec::new());
/// for name in ["a.jpg", "a.cls", "b.jpg", "b.cls"] {
///     writer.write_entry(&Entry::new(name, vec![]).unwrap()).unwrap();
/// }
/// let archive = writer.finish().unwrap();
///
/// let keys: Vec<String> = SampleIterator::from_reader(archive.as_slice(), KeyPolicy::FirstDot)
///     .map(|sample| sample.unwrap().key().to_string())
///     .collect();
/// assert_eq!(keys, vec!["a", "b"]);
/// ```
pub struct SampleIterator<R: Read> {
    reader: TarReader<R>,
    key_policy: KeyPolicy,
    state: State,
}

impl<R: Read> SampleIterator<R> {
    pub fn new(reader: TarReader<R>, key_policy: KeyPolicy) -> SampleIterator<R> {
        SampleIterator {
            reader,
            key_policy,
            state: State::AwaitingFirst,
        }
    }

    pub fn from_reader(inner: R, key_policy: KeyPolicy) -> SampleIterator<R> {
        Self::new(TarReader::new(inner), key_policy)
    }

    pub fn into_reader(self) -> TarReader<R> {
        self.reader
    }
}

impl<R: Read> Iterator for SampleIterator<R> {
    type Item = TarResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let State::Done = self.state {
                return None;
            }

            let entry = match self.reader.read_entry() {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    return match std::mem::replace(&mut self.state, State::Done) {
                        State::Accumulating(sample) => Some(Ok(sample)),
                        _ => None,
                    };
                }
                Err(e) => {
                    self.state = State::Done;
                    return Some(Err(e));
                }
            };

            let name = entry.name();
            let (key, extension) = self.key_policy.split(&name);
            let (key, extension) = (key.to_string(), extension.to_string());

            match std::mem::replace(&mut self.state, State::Done) {
                State::AwaitingFirst => {
                    self.state = State::Accumulating(Sample::with_part(key, extension, entry));
                }
                State::Accumulating(mut current) => {
                    if current.key() == key {
                        if let Err(e) = current.add_part(extension, entry) {
                            return Some(Err(e));
                        }
                        self.state = State::Accumulating(current);
                    } else {
                        self.state = State::Accumulating(Sample::with_part(key, extension, entry));
                        return Some(Ok(current));
                    }
                }
                State::Done => {
                    return None;
                }
            }
        }
    }
}
