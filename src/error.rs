use std::io;

use thiserror::Error;

/// Errors produced while reading, grouping, sorting, splitting or merging tar streams.
///
/// Every error is fatal to the stage that detects it. A stage that fails stops writing and
/// never emits the archive terminator, so its consumer sees an incomplete stream.
#[derive(Debug, Error)]
pub enum TarError {
    /// Malformed archive framing: bad checksum, unparsable header field, truncated block or
    /// end of input before the terminator.
    #[error("Malformed archive at offset {offset}: {reason}")]
    Format {
        offset: u64,
        reason: String,
    },

    /// Two entries of the same sample map to the same extension.
    #[error("Duplicate extension '{extension}' in sample '{key}'")]
    DuplicateExtension {
        key: String,
        extension: String,
    },

    #[error("IO error: {0}")]
    Io(io::Error),

    /// Temporary or output storage cannot accept more data.
    #[error("Out of space: {0}")]
    OutOfSpace(io::Error),

    /// One of several concurrently merged sources failed.
    #[error("Merge source {source_index} failed: {reason}")]
    PartialMerge {
        source_index: usize,
        reason: String,
    },

    /// The sort key of a sample could not be extracted.
    #[error("Sort key for sample '{key}': {reason}")]
    SortKey {
        key: String,
        reason: String,
    },

    /// A sample would push a shard past its configured cap.
    #[error("Shard {shard} limit exceeded: {reason}")]
    ShardLimit {
        shard: usize,
        reason: String,
    },

    /// The per-sample processing function failed.
    #[error("Processing sample '{key}': {reason}")]
    Process {
        key: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TarError {
    pub fn format(offset: u64, reason: impl Into<String>) -> Self {
        Self::Format {
            offset,
            reason: reason.into(),
        }
    }

    pub fn sort_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SortKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<TarError> for io::Error {
    fn from(e: TarError) -> Self {
        match e {
            TarError::Io(e) | TarError::OutOfSpace(e) => e,
            TarError::Format { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

// A TarError carried inside an io::Error (payload readers report framing problems that way)
// is unwrapped back into itself.
impl From<io::Error> for TarError {
    fn from(e: io::Error) -> Self {
        if is_out_of_space(&e) {
            return TarError::OutOfSpace(e);
        }
        if !e.get_ref().map_or(false, |inner| inner.is::<TarError>()) {
            return TarError::Io(e);
        }
        let kind = e.kind();
        match e.into_inner().map(|inner| inner.downcast::<TarError>()) {
            Some(Ok(tar_error)) => *tar_error,
            _ => TarError::Io(io::Error::from(kind)),
        }
    }
}

fn is_out_of_space(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::StorageFull
}

/// Result type for tar stream operations
pub type TarResult<T> = Result<T, TarError>;
