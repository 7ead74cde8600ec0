use std::borrow::Cow;

use tar::{EntryType, Header};

use crate::error::{TarError, TarResult};

/// Size of a tar block. Headers, payload padding and the terminator are all block aligned.
pub const BLOCK_SIZE: usize = 512;

// Header sizes are not trusted for allocation, payload buffers grow as data actually arrives.
pub(crate) const MAX_PREALLOCATION: u64 = 64 * 1024;

const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// One archive record with its payload read into memory.
///
/// The 512 header bytes are kept as read and written back verbatim, so mode, mtime, owner and
/// type flag pass through any stage unchanged.
///
/// # Examples
/// ```
/// use tar_sample_sort::entry::Entry;
///
/// let entry = Entry::new("images/0001.jpg", b"jpeg bytes".to_vec()).unwrap();
/// assert_eq!(entry.name(), "images/0001.jpg");
/// assert_eq!(entry.size(), 10);
/// ```
#[derive(Clone, Debug)]
pub struct Entry {
    header: Header,
    data: Vec<u8>,
}

impl Entry {
    /// Create a regular file entry with mode 0o644 and mtime 0.
    pub fn new(name: &str, data: Vec<u8>) -> TarResult<Entry> {
        let mut header = Header::new_ustar();
        header.set_path(name)?;
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        Ok(Entry { header, data })
    }

    pub(crate) fn from_parts(header: Header, data: Vec<u8>) -> Entry {
        Entry { header, data }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Full path of the entry, including the ustar prefix field.
    pub fn name(&self) -> String {
        header_name(&self.header).into_owned()
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn mode(&self) -> Option<u32> {
        self.header.mode().ok()
    }

    pub fn mtime(&self) -> Option<u64> {
        self.header.mtime().ok()
    }

    /// Number of bytes this entry occupies in an archive: header, payload and padding.
    pub fn encoded_len(&self) -> u64 {
        BLOCK_SIZE as u64 + self.size() + padding(self.size())
    }
}

/// Zero bytes needed after a payload of `size` bytes to reach the next block boundary.
pub fn padding(size: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    (block - size % block) % block
}

pub(crate) fn header_name(header: &Header) -> Cow<'_, str> {
    match header.path_bytes() {
        Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

pub(crate) fn is_zero_block(block: &[u8; BLOCK_SIZE]) -> bool {
    block.iter().all(|b| *b == 0)
}

/// Validate a raw header block and return it together with its payload size.
///
/// Both the unsigned and the historic signed checksum variants are accepted.
pub(crate) fn parse_header(block: &[u8; BLOCK_SIZE], offset: u64) -> TarResult<(Header, u64)> {
    let header = Header::from_byte_slice(block).clone();
    let stored = header
        .cksum()
        .map_err(|e| TarError::format(offset, format!("unreadable checksum field: {}", e)))?;

    let (unsigned, signed) = block
        .iter()
        .enumerate()
        .fold((0u32, 0i64), |(unsigned, signed), (i, b)| {
            if CHECKSUM_RANGE.contains(&i) {
                (unsigned + b' ' as u32, signed + b' ' as i64)
            } else {
                (unsigned + *b as u32, signed + (*b as i8) as i64)
            }
        });
    if stored != unsigned && stored as i64 != signed {
        return Err(TarError::format(
            offset,
            format!("header checksum mismatch, stored: {}, computed: {}", stored, unsigned),
        ));
    }

    let size = header
        .entry_size()
        .map_err(|e| TarError::format(offset, format!("unreadable size field: {}", e)))?;
    Ok((header, size))
}
