use crate::errors::SeqLockError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bytes reserved in front of the payload. Every process sharing a region must
/// agree on this value; it is recorded in the header and checked on attach.
pub const HEADER_LEN: usize = 64;

/// Payload granularity. Payload bytes are moved as `AtomicU64` words.
pub(crate) const WORD: usize = std::mem::size_of::<u64>();

/// SAFETY & MEMORY ORDERING:
///
/// Shared memory layout:
///
/// | Offset | Field        | Size                     |
/// |--------|--------------|--------------------------|
/// | 0      | `sequence`   | 8                        |
/// | 8      | `header_len` | 8                        |
/// | 16     | reserved     | 48                       |
/// | 64     | payload      | region length - 64       |
///
/// Writer protocol:
/// 1. Increment `sequence` (now odd), then a `Release` fence
/// 2. Write payload words with `Relaxed` stores
/// 3. Increment `sequence` (now even) with `Ordering::Release`
///
/// Reader protocol:
/// 1. Load `sequence` with `Ordering::Acquire`, bail out if odd
/// 2. Read payload words with `Relaxed` loads, then an `Acquire` fence
/// 3. Reload `sequence`; the snapshot is valid only if it did not move
///
/// Alignment:
/// `#[repr(C, align(64))]` keeps the counter on its own cache line and
/// guarantees the payload that follows starts 8-byte aligned.
#[repr(C, align(64))]
pub(crate) struct Header {
    /// Even: payload is stable. Odd: a write is in progress.
    pub(crate) sequence: AtomicU64,
    /// `HEADER_LEN` as written by the creator; 0 until the creator finished setup.
    pub(crate) header_len: AtomicU64,
    _reserved: [u64; 6],
}

const _: () = assert!(std::mem::size_of::<Header>() == HEADER_LEN);

impl Header {
    /// Publish the header length. Called by whoever owns a fresh region.
    pub(crate) fn initialize(&self) {
        self.header_len.store(HEADER_LEN as u64, Ordering::Release);
    }

    /// Confirm the counterpart wrote the same header length we use.
    pub(crate) fn verify(&self) -> Result<(), SeqLockError> {
        let found = self.header_len.load(Ordering::Acquire);
        if found != HEADER_LEN as u64 {
            return Err(SeqLockError::LayoutMismatch {
                expected: HEADER_LEN as u64,
                found,
            });
        }
        Ok(())
    }

    /// Initialize a header that was never set up, verify a previously
    /// initialized one. Whatever the caller left in the counter bytes of an
    /// uninitialized buffer is discarded so the counter starts even.
    pub(crate) fn adopt(&self) -> Result<(), SeqLockError> {
        if self.header_len.load(Ordering::Acquire) == 0 {
            self.sequence.store(0, Ordering::Relaxed);
            self.initialize();
            return Ok(());
        }
        self.verify()
    }
}

/// Header and payload bounds inside one mapping, computed once per region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Layout {
    total: usize,
    payload_offset: usize,
    payload_len: usize,
}

impl Layout {
    pub(crate) fn for_total(total: usize) -> Result<Self, SeqLockError> {
        if total <= HEADER_LEN {
            return Err(SeqLockError::InvalidBuffer(
                "region must be larger than the header",
            ));
        }
        if total % WORD != 0 {
            return Err(SeqLockError::InvalidBuffer(
                "region length must be a multiple of 8 bytes",
            ));
        }

        Ok(Self {
            total,
            payload_offset: HEADER_LEN,
            payload_len: total - HEADER_LEN,
        })
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    pub(crate) fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub(crate) fn payload_words(&self) -> usize {
        self.payload_len / WORD
    }
}
