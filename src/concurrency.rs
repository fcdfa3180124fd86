//! Worker pool that claims loci one at a time from a shared atomic
//! counter and propagates the first worker failure.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;

/// Claims indices `0..len` exactly once each, across any number of
/// threads, via a single atomic fetch-add.
pub struct ClaimCounter {
    next: AtomicUsize,
    len: usize,
}

impl ClaimCounter {
    pub fn new(len: usize) -> Self {
        ClaimCounter { next: AtomicUsize::new(0), len }
    }

    /// Claim the next unclaimed index, or `None` once every index has
    /// been claimed.
    pub fn claim(&self) -> Option<usize> {
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        if idx < self.len {
            Some(idx)
        } else {
            None
        }
    }
}

/// Shared across all workers: set by the first worker that fails, so the
/// rest stop claiming new loci and exit cleanly.
#[derive(Default)]
pub struct CancellationFlag {
    failed: AtomicBool,
}

impl CancellationFlag {
    pub fn new() -> Self {
        CancellationFlag::default()
    }

    pub fn is_set(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }
}

/// Runs `work` once per claimed index in `0..num_items`, across
/// `num_threads` OS threads, collecting each result into slot `i` of the
/// output vector regardless of completion order. The first worker error
/// (in thread-join order) is rethrown to the caller after every thread
/// has joined.
pub fn run_claimed<T, F>(num_items: usize, num_threads: usize, work: F) -> Result<Vec<Option<T>>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    let counter = ClaimCounter::new(num_items);
    let cancellation = CancellationFlag::new();
    let results: Mutex<Vec<Option<T>>> = Mutex::new((0..num_items).map(|_| None).collect());
    let first_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..num_threads.max(1) {
            scope.spawn(|| {
                while !cancellation.is_set() {
                    let Some(idx) = counter.claim() else { break };
                    match work(idx) {
                        Ok(value) => {
                            results.lock().unwrap()[idx] = Some(value);
                        }
                        Err(err) => {
                            cancellation.set();
                            let mut slot = first_error.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                            break;
                        }
                    }
                }
            });
        }
    });

    if let Some(err) = first_error.into_inner().unwrap() {
        return Err(err);
    }
    Ok(results.into_inner().unwrap())
}
