//! Sequence lock over shared memory.
//!
//! One writer publishes a fixed-size byte payload; any number of readers, in
//! the same process or in other processes mapping the same POSIX shared
//! memory object, take consistent snapshots of it without ever blocking the
//! writer.
//!
//! ```no_run
//! use seqlock::SeqLock;
//!
//! let lock = SeqLock::create("/telemetry", 1024)?;
//! let frame = vec![0u8; lock.size()];
//! lock.store(&frame)?;
//!
//! let mut snapshot = vec![0u8; lock.size()];
//! match lock.load(&mut snapshot) {
//!     Ok(()) => {}
//!     Err(e) if e.is_retryable() => { /* writer was mid-update, try again */ }
//!     Err(e) => return Err(e),
//! }
//! lock.destroy()?;
//! # Ok::<(), seqlock::SeqLockError>(())
//! ```

pub mod config;
pub mod errors;
pub mod header;
pub mod lock;
pub mod name;
pub mod page;
pub mod region;
pub mod retry;

pub use config::RegionConfig;
pub use errors::SeqLockError;
pub use header::HEADER_LEN;
pub use lock::SeqLock;
pub use page::{page_size, round_up_to_page};
pub use region::{SharedRegion, total_size};
pub use retry::RetryConfig;
