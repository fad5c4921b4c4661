//! # pw-dedup - Parallel Memory-Mapped Line Deduplication
//!
//! pw-dedup collapses one or more large newline-delimited files (nominally
//! password corpora) into a single file containing one copy of each distinct
//! line. It is built for inputs far larger than comfortable RAM residency,
//! where the set of *distinct* lines nevertheless fits in virtual memory
//! when each is stored once. This implementation prioritizes:
//!
//! - **Zero-copy input**: records are tokenized straight out of read-only
//!   mappings, never copied into intermediate buffers
//! - **One copy per distinct line**: canonical bytes live once, in
//!   file-backed slabs addressed by packed 64-bit handles
//! - **Parallel insertion**: a worker per logical CPU over a mutex-sharded
//!   set; workers only contend when records hash into the same shard
//!
//! ## Quick Start
//!
//! ```ignore
//! use pw_dedup::{dedup_files, DedupConfig};
//!
//! let stats = dedup_files(
//!     &[PathBuf::from("leaked-a.txt"), PathBuf::from("leaked-b.txt")],
//!     Path::new("unique.txt"),
//!     &DedupConfig::default(),
//! )?;
//! eprintln!("{} distinct lines", stats.records_kept);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │        Front-End (bin/pw-dedup)       │
//! ├──────────────────────────────────────┤
//! │         Dedup Engine (engine)         │
//! ├──────────────┬───────────────────────┤
//! │ Block Stream │  Sharded Set (set)     │
//! │   (stream)   ├───────────────────────┤
//! │              │  String Store (store)  │
//! ├──────────────┴───────────────────────┤
//! │       Memory-Mapped File I/O          │
//! └──────────────────────────────────────┘
//! ```
//!
//! Data flows `files → block stream → workers → set.add → string store`,
//! then a single buffered pass streams the store to the output file.
//!
//! ## Guarantees
//!
//! - Every non-empty input line appears exactly once in the output
//! - The output contains nothing that was not an input line
//! - Line order is *not* preserved (sort externally if needed)
//! - Duplicate detection compares raw bytes; encodings are never interpreted
//!
//! ## Module Overview
//!
//! - [`config`]: centralized constants and the runtime page-size query
//! - [`stream`]: line-aligned, memory-mapped block production
//! - [`store`]: append-only slab storage for canonical record bytes
//! - [`set`]: mutex-sharded concurrent set of `(hash, handle)` chains
//! - [`engine`]: worker orchestration and the final dump
//! - [`progress`]: throttled stderr reporting
//! - [`timing`]: monotonic stopwatch

pub mod config;
pub mod engine;
pub mod progress;
pub mod set;
pub mod store;
pub mod stream;
pub mod timing;

pub use engine::{dedup_files, DedupConfig, DedupStats};
pub use set::DedupSet;
pub use store::{Handle, StringStore};
pub use stream::{Block, BlockStream};
