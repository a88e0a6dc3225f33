use crate::errors::SeqLockError;
use crate::header::WORD;
use crate::region::SharedRegion;
use crate::retry::RetryConfig;
use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Single-writer, multi-reader sequence lock over a `SharedRegion`.
///
/// The writer never waits: `store` is two counter increments around one
/// payload copy. Readers never wait either: `load` fails fast with `Busy` or
/// `TornRead` and the caller decides whether to retry.
///
/// At most one thread across all processes sharing the region may call
/// `store`/`fill` at a time. This is not checked.
#[derive(Debug)]
pub struct SeqLock {
    region: SharedRegion,
}

impl SeqLock {
    pub fn new(region: SharedRegion) -> Self {
        Self { region }
    }

    /// Create or attach to the named region and wrap it.
    pub fn create(name: &str, payload_size: usize) -> Result<Self, SeqLockError> {
        SharedRegion::create(name, payload_size).map(Self::new)
    }

    /// Process-local lock, mostly useful between threads and in tests.
    pub fn anonymous(payload_size: usize) -> Result<Self, SeqLockError> {
        SharedRegion::anonymous(payload_size).map(Self::new)
    }

    /// Payload capacity. Every `store`/`load` buffer must have exactly this length.
    pub fn size(&self) -> usize {
        self.region.size()
    }

    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    /// Current counter value. Even unless a write is in progress.
    pub fn sequence(&self) -> u64 {
        self.counter().load(Ordering::Relaxed)
    }

    /// Racy by nature: the answer may be stale by the time it is returned.
    pub fn write_in_progress(&self) -> bool {
        self.sequence() & 1 == 1
    }

    /// Publish `bytes` as the new payload.
    ///
    /// # Errors
    ///
    /// `SizeMismatch` if `bytes.len() != self.size()`; nothing is written.
    pub fn store(&self, bytes: &[u8]) -> Result<(), SeqLockError> {
        self.check_len(bytes.len())?;
        self.write(|payload| {
            for (word, chunk) in payload.iter().zip(bytes.chunks_exact(WORD)) {
                word.store(to_word(chunk), Ordering::Relaxed);
            }
        });
        Ok(())
    }

    /// Publish a payload with every byte set to `byte`.
    pub fn fill(&self, byte: u8) {
        let value = u64::from_ne_bytes([byte; WORD]);
        self.write(|payload| {
            for word in payload {
                word.store(value, Ordering::Relaxed);
            }
        });
    }

    /// Copy a consistent snapshot of the payload into `buffer`.
    ///
    /// # Errors
    ///
    /// - `SizeMismatch` if `buffer.len() != self.size()`
    /// - `Busy` if a write was in progress; `buffer` is untouched
    /// - `TornRead` if a write started during the copy; `buffer` holds garbage
    pub fn load(&self, buffer: &mut [u8]) -> Result<(), SeqLockError> {
        self.read(buffer, || {})
    }

    /// `load`, retried on `Busy`/`TornRead` with the backoff from `config`.
    ///
    /// Returns the last retryable error once the attempts are exhausted. Other
    /// errors are returned immediately.
    pub fn load_with_retry(
        &self,
        buffer: &mut [u8],
        config: &RetryConfig,
    ) -> Result<(), SeqLockError> {
        let attempts = config.attempts();
        let mut last = SeqLockError::Busy;
        for attempt in 0..attempts {
            match self.load(buffer) {
                Err(e) if e.is_retryable() => {
                    last = e;
                    if attempt < attempts - 1 {
                        config.backoff(attempt);
                    }
                }
                other => return other,
            }
        }
        Err(last)
    }

    /// Async version of `load_with_retry` using tokio
    ///
    /// Uses `tokio::time::sleep` between attempts instead of blocking the
    /// thread. A zero delay yields to the runtime.
    #[cfg(feature = "tokio")]
    pub async fn load_with_retry_async(
        &self,
        buffer: &mut [u8],
        config: &RetryConfig,
    ) -> Result<(), SeqLockError> {
        let attempts = config.attempts();
        let mut last = SeqLockError::Busy;
        for attempt in 0..attempts {
            match self.load(buffer) {
                Err(e) if e.is_retryable() => {
                    last = e;
                    if attempt < attempts - 1 {
                        let delay = config.delay_for_attempt(attempt);
                        if delay.is_zero() {
                            tokio::task::yield_now().await;
                        } else {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                other => return other,
            }
        }
        Err(last)
    }

    /// `load` retried until it succeeds, spinning between attempts.
    ///
    /// Only returns early on a non-retryable error. Under a writer that never
    /// pauses this may spin indefinitely.
    pub fn load_spin(&self, buffer: &mut [u8]) -> Result<(), SeqLockError> {
        loop {
            match self.load(buffer) {
                Err(e) if e.is_retryable() => std::hint::spin_loop(),
                other => return other,
            }
        }
    }

    /// Give the region back, e.g. to `destroy` it.
    pub fn into_region(self) -> SharedRegion {
        self.region
    }

    /// Release the lock and tear down its region.
    pub fn destroy(self) -> Result<(), SeqLockError> {
        self.region.destroy()
    }

    fn counter(&self) -> &AtomicU64 {
        &self.region.header().sequence
    }

    fn check_len(&self, len: usize) -> Result<(), SeqLockError> {
        if len != self.size() {
            return Err(SeqLockError::SizeMismatch {
                expected: self.size(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Run `f` over the payload inside an odd counter window.
    fn write<F: FnOnce(&[AtomicU64])>(&self, f: F) {
        let counter = self.counter();
        counter.fetch_add(1, Ordering::Release);
        // Keeps the payload stores below from becoming visible before the odd count.
        fence(Ordering::Release);
        f(self.region.payload());
        counter.fetch_add(1, Ordering::Release);
    }

    /// The read half of the protocol. `during_copy` runs between the payload
    /// copy and the second counter sample.
    fn read<F: FnOnce()>(&self, buffer: &mut [u8], during_copy: F) -> Result<(), SeqLockError> {
        self.check_len(buffer.len())?;
        let counter = self.counter();

        let before = counter.load(Ordering::Acquire);
        if before & 1 == 1 {
            return Err(SeqLockError::Busy);
        }

        for (chunk, word) in buffer.chunks_exact_mut(WORD).zip(self.region.payload()) {
            chunk.copy_from_slice(&word.load(Ordering::Relaxed).to_ne_bytes());
        }
        during_copy();
        // Orders the payload loads above before the second sample.
        fence(Ordering::Acquire);

        let after = counter.load(Ordering::Acquire);
        if before != after {
            return Err(SeqLockError::TornRead { before, after });
        }
        Ok(())
    }
}

fn to_word(chunk: &[u8]) -> u64 {
    let mut bytes = [0u8; WORD];
    bytes.copy_from_slice(chunk);
    u64::from_ne_bytes(bytes)
}
