//! Shared memory object names.

use crate::errors::SeqLockError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Longest accepted name, in bytes. Matches the traditional POSIX `NAME_MAX`.
pub const NAME_MAX: usize = 255;

/// Check that `name` can be handed to `shm_open`.
///
/// A single leading `/` is allowed (and conventional); any other `/` is not.
pub fn validate(name: &str) -> Result<(), SeqLockError> {
    let invalid = |reason| SeqLockError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > NAME_MAX {
        return Err(SeqLockError::NameTooLong {
            len: name.len(),
            max: NAME_MAX,
        });
    }
    if name.contains('\0') {
        return Err(invalid("name must not contain NUL bytes"));
    }

    let stem = name.strip_prefix('/').unwrap_or(name);
    if stem.is_empty() {
        return Err(invalid("name must not be just '/'"));
    }
    if stem.contains('/') {
        return Err(invalid("only a leading '/' is allowed"));
    }

    Ok(())
}

static NEXT_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Generate a name unlikely to collide with any other process:
/// `/seqlock-<pid>-<nanos>-<counter>`.
pub fn unique_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let suffix = NEXT_SUFFIX.fetch_add(1, Ordering::Relaxed);
    let name = format!("/seqlock-{}-{}-{}", std::process::id(), nanos, suffix);
    tracing::debug!("Generated shared memory name {}", name);
    name
}
