//! # Configuration Constants
//!
//! This module centralizes all configuration constants, grouping
//! interdependent values together and documenting their relationships.
//!
//! ## Dependency Graph
//!
//! ```text
//! os_page_size() (runtime, sysconf)
//!       │
//!       ├─> default_slab_bytes()  = SLAB_PAGE_COUNT * page
//!       │     Hard ceiling on record length: a record plus its newline
//!       │     terminator must fit in one slab.
//!       │
//!       └─> default_block_bytes() = DEFAULT_BLOCK_PAGES * page
//!             Block windows must be a whole multiple of the page size;
//!             the block stream rejects any other size hint.
//!
//! DEFAULT_SET_SHARDS (1 << 20)
//!       │
//!       └─> Must be a power of two: shard selection is `hash & (shards - 1)`.
//!           Expected chain length is distinct-records / shard-count.
//! ```
//!
//! ## Usage
//!
//! Import constants from this module rather than defining them locally:
//!
//! ```ignore
//! use crate::config::{DEFAULT_SET_SHARDS, os_page_size};
//! ```

use std::sync::OnceLock;

// ============================================================================
// STORE LAYOUT
// ============================================================================

/// Size of each store slab in OS pages.
/// A slab is the unit of temp-file backing; records never span slabs, so
/// this bounds the longest storable record to one slab minus its terminator.
pub const SLAB_PAGE_COUNT: usize = 64;

/// Zero-padded width of slab file names inside the temp directory
/// (`000000000000`, `000000000001`, ...).
pub const SLAB_FILE_NAME_WIDTH: usize = 12;

// ============================================================================
// BLOCK STREAM
// ============================================================================

/// Default block window size in OS pages.
/// Larger windows mean fewer mutex acquisitions on the stream cursor but
/// coarser work distribution across workers.
pub const DEFAULT_BLOCK_PAGES: usize = 512;

// ============================================================================
// SET SHARDING
// ============================================================================

/// Default number of shards in the dedup set.
/// Must be a power of two so shard selection reduces to a mask. With 2^20
/// shards, a corpus of a few million distinct records averages a handful of
/// entries per chain.
pub const DEFAULT_SET_SHARDS: usize = 1 << 20;

/// Inline capacity of a chain before it spills to the heap.
/// Chains average well under one entry at the default width.
pub const CHAIN_INLINE_ENTRIES: usize = 2;

// ============================================================================
// CONCURRENCY
// ============================================================================

/// Upper bound on spawned worker threads regardless of reported CPU count.
pub const MAX_WORKERS: usize = 256;

// ============================================================================
// PROGRESS REPORTING
// ============================================================================

/// Records processed between progress lines on stderr.
pub const PROGRESS_RECORD_INTERVAL: u64 = 1 << 22;

const _: () = assert!(
    DEFAULT_SET_SHARDS.is_power_of_two(),
    "DEFAULT_SET_SHARDS must be a power of two for mask-based shard selection"
);

const _: () = assert!(SLAB_PAGE_COUNT > 0, "slabs must span at least one page");

const _: () = assert!(
    DEFAULT_BLOCK_PAGES > 0,
    "block windows must span at least one page"
);

const _: () = assert!(MAX_WORKERS > 0, "at least one worker is required");

/// Returns the OS page size in bytes, queried once and cached.
pub fn os_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf is a pure query with no pointer arguments; _SC_PAGESIZE
    // is a valid name on every supported platform. A negative return means
    // the name is unsupported, which we paper over with the common default.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 {
        raw as usize
    } else {
        4096
    }
}

#[cfg(not(unix))]
fn query_page_size() -> usize {
    4096
}

/// Default slab size in bytes (`SLAB_PAGE_COUNT` pages).
pub fn default_slab_bytes() -> usize {
    SLAB_PAGE_COUNT * os_page_size()
}

/// Default block window size in bytes (`DEFAULT_BLOCK_PAGES` pages).
pub fn default_block_bytes() -> usize {
    DEFAULT_BLOCK_PAGES * os_page_size()
}
