use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeqLockError {
    #[error("Invalid shared memory name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Shared memory name is {len} bytes long, the limit is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("Size {size} overflows when rounded up to page size {page_size}")]
    PageRoundingOverflow { size: usize, page_size: usize },

    #[error("Could not determine the host page size: {0}")]
    PageSize(#[source] io::Error),

    #[error("{op} failed for shared memory {name:?}: {source}")]
    ObjectCreate {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Failed to map {len} bytes for {name:?}: {source}")]
    Mapping {
        name: String,
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error("Failed to unmap {name:?}: {source}")]
    Unmap {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to unlink shared memory {name:?}: {source}")]
    Unlink {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Header layout mismatch: expected header length {expected}, found {found}")]
    LayoutMismatch { expected: u64, found: u64 },

    #[error("Invalid buffer: {0}")]
    InvalidBuffer(&'static str),

    #[error("Write in progress")]
    Busy,

    #[error("Torn read: sequence moved from {before} to {after}")]
    TornRead { before: u64, after: u64 },
}

impl SeqLockError {
    /// `Busy` and `TornRead` are expected under contention; the caller is meant to
    /// retry. Everything else is fatal for the operation that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SeqLockError::Busy | SeqLockError::TornRead { .. })
    }

    pub(crate) fn os(op: &'static str, name: &str, errno: nix::errno::Errno) -> Self {
        SeqLockError::ObjectCreate {
            op,
            name: name.to_string(),
            source: errno.into(),
        }
    }
}
