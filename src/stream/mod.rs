//! # Block Stream
//!
//! This module turns a list of input files into a single, shared stream of
//! read-only, memory-mapped `Block` values that worker threads consume
//! concurrently. Each block covers whole newline-delimited records only, so
//! workers can tokenize independently without coordinating across block
//! boundaries.
//!
//! ## Design
//!
//! Files are processed lazily, one at a time, in the order given. When the
//! stream advances to a file it scans the file once with probe mappings to
//! precompute line-aligned `(offset, length)` ranges:
//!
//! ```text
//! file:   |----records----\n----records----\n--tail--|
//! ranges: [0 ........... a+1) [a+1 ....... b+1) [b+1 .. EOF)
//! ```
//!
//! Each non-final range ends exactly on a newline; the final range ends at
//! EOF (covering a possibly unterminated last line). A range is at most one
//! window (`size_hint` bytes) unless a single line exceeds the window, in
//! which case the range widens until the line's newline or EOF is found.
//!
//! ## Handing Out Blocks
//!
//! `next_block` is callable from any number of threads. A single mutex
//! protects the cursor (current file, remaining ranges, remaining paths);
//! the mapping syscall for the returned block happens under that mutex, the
//! page faults that actually read data do not. Blocks are delivered in
//! file-listed order and in increasing offset within a file, but concurrent
//! callers may observe adjacent blocks in any interleaving.
//!
//! ## Alignment
//!
//! `size_hint` must be a whole multiple of the OS page size; construction
//! fails otherwise. Range offsets land on arbitrary byte positions (one past
//! a newline); `memmap2` rounds the mapping offset down to a page boundary
//! internally and hides the delta, so every mapping is page-aligned.
//!
//! ## Thread Safety
//!
//! `BlockStream` is `Send + Sync`. `Block` is `Send`, and unmapping happens
//! on drop; a leaked block leaks virtual address space only.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::{Mmap, MmapOptions};
use parking_lot::Mutex;

use crate::config::os_page_size;

/// A read-only mapping over one line-aligned sub-range of an input file.
#[derive(Debug)]
pub struct Block {
    map: Mmap,
}

impl Block {
    /// The block's content: whole records only, each `\n`-terminated except
    /// possibly the last record of a file.
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A line-aligned byte range within one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ByteRange {
    offset: u64,
    len: usize,
}

#[derive(Debug)]
struct OpenFile {
    file: File,
    path: PathBuf,
    ranges: VecDeque<ByteRange>,
}

#[derive(Debug)]
struct Cursor {
    paths: VecDeque<PathBuf>,
    current: Option<OpenFile>,
}

/// Thread-safe producer of [`Block`]s over a list of input files.
#[derive(Debug)]
pub struct BlockStream {
    cursor: Mutex<Cursor>,
    size_hint: usize,
}

impl BlockStream {
    /// Creates a stream over `paths` with block windows of `size_hint` bytes.
    ///
    /// `size_hint` must be a nonzero whole multiple of the OS page size.
    /// Files are opened lazily; a missing or unreadable file surfaces from
    /// `next_block` when the stream reaches it.
    pub fn new(paths: Vec<PathBuf>, size_hint: usize) -> Result<Self> {
        let page = os_page_size();
        ensure!(
            size_hint > 0 && size_hint % page == 0,
            "block size hint {} is not a whole multiple of the page size {}",
            size_hint,
            page
        );

        Ok(Self {
            cursor: Mutex::new(Cursor {
                paths: paths.into(),
                current: None,
            }),
            size_hint,
        })
    }

    /// Returns the next block, or `Ok(None)` once every file is exhausted.
    ///
    /// Safe to call from any thread; callers pull first-come, first-served.
    pub fn next_block(&self) -> Result<Option<Block>> {
        let mut cursor = self.cursor.lock();

        loop {
            if let Some(open) = cursor.current.as_mut() {
                if let Some(range) = open.ranges.pop_front() {
                    let block = map_block(&open.file, &open.path, range)?;
                    return Ok(Some(block));
                }
                cursor.current = None;
            }

            let Some(path) = cursor.paths.pop_front() else {
                return Ok(None);
            };

            let file = File::open(&path)
                .wrap_err_with(|| format!("failed to open input file '{}'", path.display()))?;
            let ranges = scan_ranges(&file, &path, self.size_hint)?;
            cursor.current = Some(OpenFile { file, path, ranges });
        }
    }
}

fn map_block(file: &File, path: &Path, range: ByteRange) -> Result<Block> {
    // SAFETY: Mmap::map is unsafe because the underlying file could be
    // truncated or modified externally while mapped. This is accepted here
    // because:
    // 1. Input files are opened read-only and the tool never writes them
    // 2. The range was derived from the file's length at scan time; inputs
    //    are assumed stable for the duration of a batch run
    // 3. The mapping's lifetime is tied to Block, preventing use-after-unmap
    let map = unsafe {
        MmapOptions::new()
            .offset(range.offset)
            .len(range.len)
            .map(file)
            .wrap_err_with(|| {
                format!(
                    "failed to map {} bytes at offset {} of '{}'",
                    range.len,
                    range.offset,
                    path.display()
                )
            })?
    };

    advise_sequential(&map);

    Ok(Block { map })
}

#[cfg(unix)]
fn advise_sequential(map: &Mmap) {
    if map.is_empty() {
        return;
    }

    // SAFETY: madvise with MADV_SEQUENTIAL is a read-ahead hint and does not
    // affect memory safety. The pointer and length come straight from a live
    // mapping, so the range is valid.
    unsafe {
        libc::madvise(
            map.as_ptr() as *mut libc::c_void,
            map.len(),
            libc::MADV_SEQUENTIAL,
        );
    }
}

#[cfg(not(unix))]
fn advise_sequential(_map: &Mmap) {}

/// Scans one file with probe mappings and returns its line-aligned ranges.
///
/// Each non-final range ends just after a newline; the final range ends at
/// EOF. A range grows beyond `size_hint` only when a single line exceeds the
/// window.
fn scan_ranges(file: &File, path: &Path, size_hint: usize) -> Result<VecDeque<ByteRange>> {
    let len = file
        .metadata()
        .wrap_err_with(|| format!("failed to stat input file '{}'", path.display()))?
        .len();

    let hint = size_hint as u64;
    let mut ranges = VecDeque::new();
    let mut start: u64 = 0;

    while start < len {
        let mut end_target = start.saturating_add(hint).min(len);

        loop {
            if end_target == len {
                ranges.push_back(ByteRange {
                    offset: start,
                    len: (len - start) as usize,
                });
                start = len;
                break;
            }

            // Probe only the newest window: earlier windows of this range
            // were already scanned and held no newline.
            let win_start = end_target.saturating_sub(hint).max(start);
            let win_len = (end_target - win_start) as usize;

            // SAFETY: same justification as in map_block; probe windows are
            // read-only, short-lived, and dropped before the next mapping.
            let probe = unsafe {
                MmapOptions::new()
                    .offset(win_start)
                    .len(win_len)
                    .map(file)
                    .wrap_err_with(|| {
                        format!(
                            "failed to map probe window at offset {} of '{}'",
                            win_start,
                            path.display()
                        )
                    })?
            };

            if let Some(pos) = probe.iter().rposition(|&b| b == b'\n') {
                let end = win_start + pos as u64 + 1;
                ranges.push_back(ByteRange {
                    offset: start,
                    len: (end - start) as usize,
                });
                start = end;
                break;
            }

            // No newline in the window: the line is longer than the window.
            // Widen the range by another window and rescan.
            end_target = end_target.saturating_add(hint).min(len);
        }
    }

    Ok(ranges)
}
