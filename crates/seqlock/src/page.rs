//! Page-granularity sizing for shared memory objects.
//!
//! Shared memory objects are always sized in whole pages. The host page size is
//! queried once and cached for the lifetime of the process.

use crate::errors::SeqLockError;
use nix::unistd::{SysconfVar, sysconf};
use std::io;
use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Returns the host page size in bytes.
pub fn page_size() -> Result<usize, SeqLockError> {
    if let Some(size) = PAGE_SIZE.get() {
        return Ok(*size);
    }

    let size = sysconf(SysconfVar::PAGE_SIZE)
        .map_err(|e| SeqLockError::PageSize(e.into()))?
        .and_then(|v| usize::try_from(v).ok())
        .filter(|v| v.is_power_of_two())
        .ok_or_else(|| SeqLockError::PageSize(io::Error::other("sysconf reported no page size")))?;

    Ok(*PAGE_SIZE.get_or_init(|| size))
}

/// Rounds `size` up to the next multiple of the host page size.
///
/// `0` rounds to exactly one page, exact multiples are returned unchanged.
pub fn round_up_to_page(size: usize) -> Result<usize, SeqLockError> {
    round_up(size, page_size()?)
}

/// Rounds `size` up to the next multiple of `page_size`.
///
/// # Errors
///
/// Returns `PageRoundingOverflow` if the rounded value does not fit in a `usize`
/// and `PageSize` if `page_size` is zero.
pub fn round_up(size: usize, page_size: usize) -> Result<usize, SeqLockError> {
    let remainder = size
        .checked_rem(page_size)
        .ok_or_else(|| {
            SeqLockError::PageSize(io::Error::new(
                io::ErrorKind::InvalidInput,
                "page size must be non-zero",
            ))
        })?;

    if size == 0 {
        return Ok(page_size);
    }
    if remainder == 0 {
        return Ok(size);
    }

    size.checked_add(page_size - remainder)
        .ok_or(SeqLockError::PageRoundingOverflow { size, page_size })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_sane() {
        let size = page_size().unwrap();
        assert!(size.is_power_of_two(), "Page size must be a power of two");
        assert!(size >= 4096, "Page size should be at least 4KiB, got {}", size);
        assert_eq!(page_size().unwrap(), size, "Page size is cached");
    }

    #[test]
    fn test_round_up_edges() {
        let page = page_size().unwrap();

        assert_eq!(round_up_to_page(0).unwrap(), page, "0 rounds to one page");
        assert_eq!(round_up_to_page(1).unwrap(), page);
        assert_eq!(round_up_to_page(page - 1).unwrap(), page);
        assert_eq!(round_up_to_page(page).unwrap(), page, "Exact multiples are unchanged");
        assert_eq!(round_up_to_page(page + 1).unwrap(), 2 * page);
        assert_eq!(round_up_to_page(3 * page).unwrap(), 3 * page);
    }

    #[test]
    fn test_round_up_with_explicit_page() {
        assert_eq!(round_up(64 + 4096, 4096).unwrap(), 8192);
        assert_eq!(round_up(4096, 16384).unwrap(), 16384);
        assert_eq!(round_up(0, 16384).unwrap(), 16384);
    }

    #[test]
    fn test_round_up_overflow() {
        let err = round_up(usize::MAX, 4096).unwrap_err();
        assert!(
            matches!(
                err,
                SeqLockError::PageRoundingOverflow {
                    size: usize::MAX,
                    page_size: 4096
                }
            ),
            "Expected PageRoundingOverflow, got {:?}",
            err
        );

        // The largest page-aligned value still fits.
        let max_aligned = usize::MAX - (usize::MAX % 4096);
        assert_eq!(round_up(max_aligned, 4096).unwrap(), max_aligned);
        assert!(round_up(max_aligned + 1, 4096).is_err());
    }

    #[test]
    fn test_round_up_rejects_zero_page() {
        assert!(matches!(
            round_up(10, 0),
            Err(SeqLockError::PageSize(_))
        ));
    }
}
