use seqlock::{RetryConfig, SeqLock, SeqLockError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

const WRITES: u64 = 20_000;
const READERS: usize = 4;

#[derive(Default)]
struct ReaderStats {
    snapshots: AtomicU64,
    busy: AtomicU64,
    torn: AtomicU64,
}

/// Every store writes one repeated byte, so a successful load must see a
/// single byte value across the whole payload.
fn assert_uniform(buffer: &[u8]) {
    let first = buffer[0];
    assert!(
        buffer.iter().all(|&b| b == first),
        "Load returned a mix of two writes (first byte {})",
        first
    );
}

fn run_contention(writer: &SeqLock, readers: Vec<SeqLock>) -> ReaderStats {
    let done = AtomicBool::new(false);
    let stats = ReaderStats::default();

    thread::scope(|s| {
        for reader in &readers {
            let done = &done;
            let stats = &stats;
            s.spawn(move || {
                let mut buffer = vec![0u8; reader.size()];
                let mut last_sequence = 0;
                while !done.load(Ordering::Acquire) {
                    match reader.load(&mut buffer) {
                        Ok(()) => {
                            assert_uniform(&buffer);
                            let sequence = reader.sequence();
                            assert!(sequence >= last_sequence, "Sequence went backwards");
                            last_sequence = sequence;
                            stats.snapshots.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(SeqLockError::Busy) => {
                            stats.busy.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(SeqLockError::TornRead { before, after }) => {
                            assert!(after > before, "Torn read must see the counter advance");
                            stats.torn.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => panic!("Unexpected load error: {}", e),
                    }
                }
            });
        }

        let mut payload = vec![0u8; writer.size()];
        for i in 0..WRITES {
            payload.fill((i % 251) as u8);
            writer.store(&payload).unwrap();
        }
        done.store(true, Ordering::Release);
    });

    for reader in readers {
        reader.into_region().destroy().unwrap();
    }
    stats
}

/// Test one writer against several readers in one process
///
/// Tests:
/// - No successful load ever mixes two stores
/// - Sequence ends at twice the number of stores
/// - Busy/TornRead are the only retryable outcomes
#[test]
fn test_no_torn_reads_between_threads() {
    let writer = Arc::new(SeqLock::anonymous(4096).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..READERS)
        .map(|_| {
            let lock = Arc::clone(&writer);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut buffer = vec![0u8; lock.size()];
                let mut snapshots = 0u64;
                while !done.load(Ordering::Acquire) {
                    match lock.load(&mut buffer) {
                        Ok(()) => {
                            assert_uniform(&buffer);
                            snapshots += 1;
                        }
                        Err(e) => assert!(e.is_retryable(), "Unexpected error: {}", e),
                    }
                }
                snapshots
            })
        })
        .collect();

    let mut payload = vec![0u8; writer.size()];
    for i in 0..WRITES {
        payload.fill((i % 251) as u8);
        writer.store(&payload).unwrap();
    }
    done.store(true, Ordering::Release);

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(writer.sequence(), 2 * WRITES);
    assert!(!writer.write_in_progress());
}

/// Test one writer against readers holding their own mappings
///
/// Tests:
/// - Separate attachments of a named object see consistent snapshots
/// - Final load after the writer stops returns the last store
#[test]
fn test_no_torn_reads_across_mappings() {
    let name = format!("/seqlock-it-contention-{}", std::process::id());
    let writer = SeqLock::create(&name, 8192).unwrap();
    let readers: Vec<_> = (0..READERS)
        .map(|_| SeqLock::create(&name, 8192).unwrap())
        .collect();
    assert!(readers.iter().all(|r| !r.region().is_creator()));

    let stats = run_contention(&writer, readers);
    let attempts = stats.snapshots.load(Ordering::Relaxed)
        + stats.busy.load(Ordering::Relaxed)
        + stats.torn.load(Ordering::Relaxed);
    assert!(attempts > 0, "Readers should have attempted at least one load");

    let last = ((WRITES - 1) % 251) as u8;
    let mut buffer = vec![0u8; writer.size()];
    writer.load(&mut buffer).unwrap();
    assert!(buffer.iter().all(|&b| b == last));

    writer.destroy().unwrap();
}

/// Test the bounded retry helper under contention
#[test]
fn test_load_with_retry_under_contention() {
    let lock = SeqLock::anonymous(4096).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            let mut payload = vec![0u8; lock.size()];
            let mut i = 0u8;
            while !done.load(Ordering::Acquire) {
                payload.fill(i);
                lock.store(&payload).unwrap();
                i = i.wrapping_add(1);
                thread::sleep(Duration::from_micros(20));
            }
        });

        let config = RetryConfig {
            max_attempts: 10_000,
            ..RetryConfig::default()
        };
        let mut buffer = vec![0u8; lock.size()];
        let mut failures = Vec::new();
        let mut mixed = 0;
        for _ in 0..100 {
            match lock.load_with_retry(&mut buffer, &config) {
                Ok(()) if buffer.iter().any(|&b| b != buffer[0]) => mixed += 1,
                Ok(()) => {}
                Err(e) => failures.push(e),
            }
        }
        // Stop the writer before asserting so a failure cannot hang the scope.
        done.store(true, Ordering::Release);
        assert!(failures.is_empty(), "Retries exhausted: {:?}", failures);
        assert_eq!(mixed, 0, "Load returned a mix of two writes");
    });
}
