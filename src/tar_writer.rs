use std::io::{self, Read, Write};

use tar::Header;

use crate::entry::{padding, Entry, BLOCK_SIZE};
use crate::error::{TarError, TarResult};
use crate::sample::Sample;

const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Forward-only writer of a tar stream.
///
/// The terminator is written by [TarWriter::finish] only. A writer dropped before `finish`
/// leaves an unterminated stream behind, which every reader reports as malformed.
pub struct TarWriter<W: Write> {
    inner: W,
    offset: u64,
    entries: usize,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> TarWriter<W> {
        TarWriter {
            inner,
            offset: 0,
            entries: 0,
        }
    }

    /// Bytes written so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Entries written so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn write_entry(&mut self, entry: &Entry) -> TarResult<()> {
        self.inner.write_all(entry.header().as_bytes())?;
        self.inner.write_all(entry.data())?;
        self.write_padding(entry.size())?;
        self.offset += BLOCK_SIZE as u64 + entry.size();
        self.entries += 1;
        Ok(())
    }

    /// Write all parts of a sample in their stream order.
    pub fn write_sample(&mut self, sample: &Sample) -> TarResult<()> {
        for (_, entry) in sample.parts() {
            self.write_entry(entry)?;
        }
        Ok(())
    }

    /// Write a header and copy its payload from `payload` without buffering it.
    ///
    /// Fails with [TarError::Format] when `payload` ends before the size the header declares.
    pub fn write_stream<R: Read>(&mut self, header: &Header, payload: &mut R) -> TarResult<u64> {
        let size = header
            .entry_size()
            .map_err(|e| TarError::format(self.offset, format!("unreadable size field: {}", e)))?;
        self.inner.write_all(header.as_bytes())?;
        let copied = io::copy(&mut payload.take(size), &mut self.inner)?;
        if copied != size {
            return Err(TarError::format(
                self.offset,
                format!("payload ended after {} of {} bytes", copied, size),
            ));
        }
        self.write_padding(size)?;
        self.offset += BLOCK_SIZE as u64 + size;
        self.entries += 1;
        Ok(size)
    }

    /// Write the archive terminator, flush, and hand back the underlying writer.
    pub fn finish(mut self) -> TarResult<W> {
        self.inner.write_all(&ZERO_BLOCK)?;
        self.inner.write_all(&ZERO_BLOCK)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_padding(&mut self, size: u64) -> TarResult<()> {
        let padding = padding(size) as usize;
        if padding > 0 {
            self.inner.write_all(&ZERO_BLOCK[..padding])?;
            self.offset += padding as u64;
        }
        Ok(())
    }
}
