//! Throttled progress reporting shared by the worker threads.
//!
//! Workers count records into a relaxed atomic; whenever the running total
//! crosses a reporting interval one line goes to standard error. Output here
//! is purely observational and not part of the programmatic interface.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::PROGRESS_RECORD_INTERVAL;
use crate::timing::Stopwatch;

pub struct Progress {
    records: AtomicU64,
    stopwatch: Stopwatch,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            records: AtomicU64::new(0),
            stopwatch: Stopwatch::start(),
        }
    }

    /// Adds `count` processed records; emits one stderr line when the total
    /// crosses a reporting-interval boundary. `unique` is the caller's
    /// current distinct-record count, shown as-is.
    pub fn record(&self, count: u64, unique: u64) {
        if count == 0 {
            return;
        }

        let before = self.records.fetch_add(count, Ordering::Relaxed);
        let after = before + count;

        if before / PROGRESS_RECORD_INTERVAL != after / PROGRESS_RECORD_INTERVAL {
            eprintln!(
                "pw-dedup: processed {} records ({} kept) in {:.1}s",
                after,
                unique,
                self.stopwatch.elapsed_seconds()
            );
        }
    }

    pub fn records_seen(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_accumulate() {
        let progress = Progress::new();
        progress.record(0, 0);
        progress.record(3, 1);
        progress.record(7, 2);
        assert_eq!(progress.records_seen(), 10);
    }
}
