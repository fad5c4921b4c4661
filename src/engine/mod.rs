//! # Dedup Engine
//!
//! The driver that ties the pipeline together:
//!
//! ```text
//! input files ──> BlockStream ──> worker threads ──> DedupSet ──> StringStore
//!                                                                     │
//! output file <─────────────────── dump <────────────────────────────-┘
//! ```
//!
//! One worker is spawned per logical CPU (capped). Each worker pulls blocks
//! from the shared stream, splits them on newlines, discards empty records
//! and feeds the rest to the set. When the stream runs dry the workers exit,
//! the driver joins them, and a single buffered pass streams the store to
//! the output file.
//!
//! ## Failure Model
//!
//! Any error in any worker is fatal to the run: the scope joins all workers
//! and the first error propagates. There are no retries; the engine assumes
//! local filesystem semantics. The store's temp directory is torn down when
//! the store drops, on success and on error alike.
//!
//! ## Output Ordering
//!
//! The output contains every distinct record exactly once, in slab order
//! (i.e. insertion order per slab, slabs in creation order). No relation to
//! input order is guaranteed; consumers needing a deterministic order must
//! sort externally.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use eyre::{bail, ensure, Result, WrapErr};

use crate::config::{default_block_bytes, DEFAULT_SET_SHARDS, MAX_WORKERS};
use crate::progress::Progress;
use crate::set::DedupSet;
use crate::store::StringStore;
use crate::stream::BlockStream;
use crate::timing::Stopwatch;

/// Tunables for one dedup run.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Block window size in bytes; must be a whole multiple of the page size.
    pub size_hint: usize,
    /// Directory for the store's slab files; created on start, removed on
    /// completion.
    pub temp_dir: PathBuf,
    /// Set width; must be a power of two.
    pub set_shards: usize,
    /// Upper bound on worker threads.
    pub max_workers: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            size_hint: default_block_bytes(),
            temp_dir: PathBuf::from("./.pw-dedup-temp"),
            set_shards: DEFAULT_SET_SHARDS,
            max_workers: MAX_WORKERS,
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct DedupStats {
    pub records_seen: u64,
    pub records_kept: u64,
    pub bytes_written: u64,
    pub elapsed_seconds: f64,
    pub workers: usize,
}

/// Deduplicates the records of `inputs` into `output`.
///
/// Every distinct, non-empty, newline-delimited record across the inputs
/// appears exactly once in the output, newline-terminated.
pub fn dedup_files(inputs: &[PathBuf], output: &Path, config: &DedupConfig) -> Result<DedupStats> {
    ensure!(!inputs.is_empty(), "at least one input file is required");

    let stopwatch = Stopwatch::start();

    let store = StringStore::create(&config.temp_dir)?;
    let set = DedupSet::new(&store, config.set_shards)?;
    let stream = BlockStream::new(inputs.to_vec(), config.size_hint)?;
    let progress = Progress::new();

    let workers = worker_count(config.max_workers);

    thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = (0..workers)
            .map(|_| scope.spawn(|| worker_loop(&stream, &set, &progress)))
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => bail!("worker thread panicked"),
            }
        }

        Ok(())
    })?;

    let records_seen = progress.records_seen();
    let records_kept = set.unique_len();

    let out = File::create(output)
        .wrap_err_with(|| format!("failed to create output file '{}'", output.display()))?;
    let mut writer = BufWriter::new(out);
    let bytes_written = store.dump(&mut writer)?;
    writer
        .flush()
        .wrap_err_with(|| format!("failed to flush output file '{}'", output.display()))?;

    let stats = DedupStats {
        records_seen,
        records_kept,
        bytes_written,
        elapsed_seconds: stopwatch.elapsed_seconds(),
        workers,
    };

    eprintln!(
        "pw-dedup: kept {} of {} records ({} bytes) in {:.1}s with {} workers",
        stats.records_kept,
        stats.records_seen,
        stats.bytes_written,
        stats.elapsed_seconds,
        stats.workers
    );

    Ok(stats)
}

fn worker_count(cap: usize) -> usize {
    let cpus = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.min(cap).max(1)
}

fn worker_loop(stream: &BlockStream, set: &DedupSet<'_>, progress: &Progress) -> Result<()> {
    while let Some(block) = stream.next_block()? {
        let mut seen = 0u64;

        for record in block.bytes().split(|&b| b == b'\n') {
            if record.is_empty() {
                continue;
            }
            seen += 1;
            set.add(record)?;
        }

        progress.record(seen, set.unique_len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_is_capped_and_nonzero() {
        assert_eq!(worker_count(1), 1);
        assert!(worker_count(MAX_WORKERS) >= 1);
        assert!(worker_count(MAX_WORKERS) <= MAX_WORKERS);
    }
}
