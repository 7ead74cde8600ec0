use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::TarResult;
use crate::run_cursor::RunCursor;
use crate::sample_record::SampleRecord;

/// Input of a merge: a spilled run, or the last buffer that never left memory.
pub(crate) enum RunSource {
    Spilled(RunCursor),
    Memory(std::vec::IntoIter<SampleRecord>),
}

impl RunSource {
    fn next_record(&mut self) -> TarResult<Option<SampleRecord>> {
        match self {
            RunSource::Spilled(cursor) => cursor.next_record(),
            RunSource::Memory(records) => Ok(records.next()),
        }
    }
}

struct Head {
    record: SampleRecord,
    seq: usize,
}

impl Eq for Head {}

impl PartialEq<Self> for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd<Self> for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    // equal keys: the earlier run wins, which keeps the merge stable
    fn cmp(&self, other: &Self) -> Ordering {
        self.record.cmp(&other.record).then(self.seq.cmp(&other.seq))
    }
}

/// K-way merge over sorted runs.
///
/// Sources live in an arena indexed by their sequence number, the heap only holds one head
/// record per source. A source is dropped from the arena, and a spilled run deleted, once it is
/// exhausted. The first error ends the merge.
pub(crate) struct Merger {
    sources: Vec<Option<RunSource>>,
    heap: BinaryHeap<Reverse<Head>>,
    merged: usize,
}

impl Merger {
    pub(crate) fn new(sources: Vec<RunSource>) -> TarResult<Merger> {
        let mut merger = Merger {
            sources: sources.into_iter().map(Some).collect(),
            heap: BinaryHeap::new(),
            merged: 0,
        };
        for seq in 0..merger.sources.len() {
            merger.advance(seq)?;
        }
        Ok(merger)
    }

    /// Samples produced so far.
    pub(crate) fn merged(&self) -> usize {
        self.merged
    }

    fn advance(&mut self, seq: usize) -> TarResult<()> {
        let next = match self.sources[seq].as_mut() {
            Some(source) => source.next_record()?,
            None => None,
        };
        match next {
            Some(record) => {
                self.heap.push(Reverse(Head { record, seq }));
            }
            None => {
                self.sources[seq] = None;
            }
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.heap.clear();
        self.sources.clear();
    }
}

impl Iterator for Merger {
    type Item = TarResult<SampleRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(head) = self.heap.pop()?;
        if let Err(e) = self.advance(head.seq) {
            self.abort();
            return Some(Err(e));
        }
        self.merged += 1;
        Some(Ok(head.record))
    }
}
