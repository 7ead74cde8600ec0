use std::cmp::min;
use std::io::{self, Read};

use tar::Header;

use crate::entry::{header_name, is_zero_block, padding, parse_header, Entry, BLOCK_SIZE, MAX_PREALLOCATION};
use crate::error::{TarError, TarResult};

/// Forward-only reader of a tar stream.
///
/// Reads one 512 byte block at a time and never seeks. Payloads are exposed lazily through
/// [EntryReader]; whatever a caller leaves unread is skipped before the next header is parsed.
/// The stream must end with two all-zero blocks, anything else is a [TarError::Format].
///
/// # Examples
/// ```
/// use tar_sample_sort::entry::Entry;
/// use tar_sample_sort::tar_reader::TarReader;
/// use tar_sample_sort::tar_writer::TarWriter;
///
/// let mut writer = TarWriter::new(Vec::new());
/// writer.write_entry(&Entry::new("a.txt", b"abc".to_vec()).unwrap()).unwrap();
/// let archive = writer.finish().unwrap();
///
/// let mut reader = TarReader::new(archive.as_slice());
/// let entry = reader.read_entry().unwrap().unwrap();
/// assert_eq!(entry.data(), b"abc");
/// assert!(reader.read_entry().unwrap().is_none());
/// ```
pub struct TarReader<R: Read> {
    inner: R,
    offset: u64,
    remaining: u64,
    padding: u64,
    done: bool,
}

impl<R: Read> TarReader<R> {
    pub fn new(inner: R) -> TarReader<R> {
        TarReader {
            inner,
            offset: 0,
            remaining: 0,
            padding: 0,
            done: false,
        }
    }

    /// Number of bytes consumed from the underlying stream so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// True once the archive terminator was read.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Parse the next header. Returns `None` at the archive terminator.
    pub fn next_entry(&mut self) -> TarResult<Option<EntryReader<'_, R>>> {
        if self.done {
            return Ok(None);
        }
        self.skip_rest()?;

        let start = self.offset;
        let mut block = [0u8; BLOCK_SIZE];
        self.read_block(&mut block)?;
        if is_zero_block(&block) {
            self.read_block(&mut block)?;
            if is_zero_block(&block) {
                self.done = true;
                return Ok(None);
            }
            return Err(TarError::format(start, "isolated zero block inside archive"));
        }

        let (header, size) = parse_header(&block, start)?;
        self.remaining = size;
        self.padding = padding(size);
        Ok(Some(EntryReader {
            header,
            reader: self,
        }))
    }

    /// Read the next entry with its payload in memory.
    pub fn read_entry(&mut self) -> TarResult<Option<Entry>> {
        match self.next_entry()? {
            None => Ok(None),
            Some(entry_reader) => Ok(Some(entry_reader.into_entry()?)),
        }
    }

    /// Iterate over owned entries until the terminator or the first error.
    pub fn entries(self) -> Entries<R> {
        Entries {
            reader: self,
            failed: false,
        }
    }

    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> TarResult<()> {
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.inner.read(&mut block[filled..]) {
                Ok(0) => {
                    let reason = if filled == 0 {
                        "unexpected end of input before archive terminator"
                    } else {
                        "truncated block"
                    };
                    return Err(TarError::format(self.offset + filled as u64, reason));
                }
                Ok(n) => {
                    filled += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(e.into());
                }
            }
        }
        self.offset += BLOCK_SIZE as u64;
        Ok(())
    }

    fn skip_rest(&mut self) -> TarResult<()> {
        let pending = self.remaining + self.padding;
        if pending > 0 {
            let skipped = io::copy(&mut (&mut self.inner).take(pending), &mut io::sink())?;
            self.offset += skipped;
            self.remaining = 0;
            self.padding = 0;
            if skipped < pending {
                return Err(TarError::format(self.offset, "unexpected end of input inside entry"));
            }
        }
        Ok(())
    }
}

/// Lazily readable payload of the current entry, exactly `size` bytes long.
pub struct EntryReader<'a, R: Read> {
    header: Header,
    reader: &'a mut TarReader<R>,
}

impl<'a, R: Read> EntryReader<'a, R> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn name(&self) -> String {
        header_name(&self.header).into_owned()
    }

    /// Payload bytes not read yet.
    pub fn remaining(&self) -> u64 {
        self.reader.remaining
    }

    /// Read the rest of the payload into an owned [Entry].
    pub fn into_entry(mut self) -> TarResult<Entry> {
        let mut data = Vec::with_capacity(min(self.reader.remaining, MAX_PREALLOCATION) as usize);
        self.read_to_end(&mut data)?;
        Ok(Entry::from_parts(self.header, data))
    }
}

impl<'a, R: Read> Read for EntryReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reader.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = min(buf.len() as u64, self.reader.remaining) as usize;
        let n = self.reader.inner.read(&mut buf[..max])?;
        if n == 0 {
            let offset = self.reader.offset;
            self.reader.remaining = 0;
            self.reader.padding = 0;
            return Err(TarError::format(offset, "unexpected end of input inside entry payload").into());
        }
        self.reader.remaining -= n as u64;
        self.reader.offset += n as u64;
        Ok(n)
    }
}

/// Owned entry iterator, see [TarReader::entries].
pub struct Entries<R: Read> {
    reader: TarReader<R>,
    failed: bool,
}

impl<R: Read> Entries<R> {
    pub fn into_reader(self) -> TarReader<R> {
        self.reader
    }
}

impl<R: Read> Iterator for Entries<R> {
    type Item = TarResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.read_entry() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
