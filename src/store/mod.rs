//! # String Store
//!
//! This module owns the canonical bytes of every distinct record. Records
//! live in file-backed, memory-mapped slabs of a fixed size and are addressed
//! by compact 64-bit [`Handle`]s, so the rest of the system passes around
//! plain integers instead of byte buffers.
//!
//! ## Slab Layout
//!
//! Each slab is one temp file, truncated to the slab size and mapped shared
//! read-write over its whole range. Records are bump-appended:
//!
//! ```text
//! +-----------+----+-----------+----+----------------+
//! | record 0  | \n | record 1  | \n |   ...unused    |
//! +-----------+----+-----------+----+----------------+
//! 0                                 ^used            ^slab_bytes
//! ```
//!
//! The newline after each record is both the separator in the final dump and
//! the sentinel that terminates handle-based lookups. When the tail slab
//! cannot fit the next record a new slab file is created; records never span
//! slabs, so a record longer than `slab_bytes - 1` is rejected.
//!
//! ## Temp Files
//!
//! Slab files live in a directory used exclusively by one store instance,
//! named by zero-padded decimal index (`000000000000`, `000000000001`, ...).
//! Each file is exactly `slab_bytes` long on disk. The whole directory tree
//! is removed when the store is dropped; after a kill signal it may be left
//! behind and must be reaped externally.
//!
//! ## Concurrency
//!
//! A single `RwLock` guards the slab list. Appends (which may create a slab
//! and always move the tail's bump pointer) take the write lock; handle
//! resolution and the final dump take the read lock. Handles are only
//! published after their bytes are fully written, so readers never observe a
//! partially written record.
//!
//! ## Thread Safety
//!
//! `StringStore` is `Send + Sync`; all mutation goes through `&self` under
//! the slab-list lock.

mod handle;

pub use handle::Handle;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;
use parking_lot::RwLock;

use crate::config::{default_slab_bytes, SLAB_FILE_NAME_WIDTH};

struct Slab {
    map: MmapMut,
    used: usize,
}

/// Append-only, file-backed storage for distinct record bytes.
pub struct StringStore {
    dir: PathBuf,
    slab_bytes: usize,
    slabs: RwLock<Vec<Slab>>,
}

impl StringStore {
    /// Creates a store backed by temp files under `dir`, creating the
    /// directory (and intermediate directories) as needed. The directory is
    /// used exclusively by this store instance and removed on drop.
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::with_slab_bytes(dir, default_slab_bytes())
    }

    /// Like [`StringStore::create`] with an explicit slab size. The longest
    /// storable record is `slab_bytes - 1` bytes.
    pub fn with_slab_bytes<P: AsRef<Path>>(dir: P, slab_bytes: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        ensure!(
            slab_bytes >= 2,
            "slab size {} cannot hold even a one-byte record and its terminator",
            slab_bytes
        );

        fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("failed to create temp directory '{}'", dir.display()))?;

        Ok(Self {
            dir,
            slab_bytes,
            slabs: RwLock::new(Vec::new()),
        })
    }

    /// Appends `bytes` plus a newline terminator and returns the record's
    /// handle. Creates a new slab when the tail cannot fit the record.
    pub fn insert(&self, bytes: &[u8]) -> Result<Handle> {
        let need = bytes.len() + 1;
        ensure!(
            need <= self.slab_bytes,
            "record of {} bytes exceeds the maximum storable length {}",
            bytes.len(),
            self.slab_bytes - 1
        );

        let mut slabs = self.slabs.write();

        let tail_full = match slabs.last() {
            Some(slab) => slab.used + need > self.slab_bytes,
            None => true,
        };
        if tail_full {
            let slab = self.new_slab(slabs.len())?;
            slabs.push(slab);
        }

        let slab_index = slabs.len() - 1;
        let slab = &mut slabs[slab_index];
        let offset = slab.used;

        slab.map[offset..offset + bytes.len()].copy_from_slice(bytes);
        slab.map[offset + bytes.len()] = b'\n';
        slab.used += need;

        Ok(Handle::new(slab_index as u32, offset as u32))
    }

    /// Returns an owned copy of the record at `handle` (its bytes up to, not
    /// including, the newline terminator).
    pub fn get(&self, handle: Handle) -> Result<Vec<u8>> {
        let slabs = self.slabs.read();
        let tail = record_tail(&slabs, handle)?;

        let end = tail
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| eyre::eyre!("record at {:?} has no newline terminator", handle))?;

        Ok(tail[..end].to_vec())
    }

    /// Compares the record at `handle` against `candidate` byte-for-byte,
    /// in place. `candidate` must not contain a newline.
    pub fn matches(&self, handle: Handle, candidate: &[u8]) -> Result<bool> {
        let slabs = self.slabs.read();
        let tail = record_tail(&slabs, handle)?;

        if tail.len() <= candidate.len() {
            return Ok(false);
        }

        Ok(&tail[..candidate.len()] == candidate && tail[candidate.len()] == b'\n')
    }

    /// Streams the live bytes of every slab, in slab order, to `writer`.
    /// Records were newline-terminated at insert time, so the result is a
    /// valid newline-delimited file of exactly the distinct inserted records.
    /// Returns the number of bytes written.
    pub fn dump<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let slabs = self.slabs.read();

        let mut written = 0u64;
        for slab in slabs.iter() {
            writer
                .write_all(&slab.map[..slab.used])
                .wrap_err("failed to write store contents")?;
            written += slab.used as u64;
        }

        Ok(written)
    }

    pub fn slab_count(&self) -> usize {
        self.slabs.read().len()
    }

    /// Total live bytes across all slabs (records plus terminators).
    pub fn bytes_used(&self) -> u64 {
        self.slabs.read().iter().map(|s| s.used as u64).sum()
    }

    fn new_slab(&self, index: usize) -> Result<Slab> {
        let path = self
            .dir
            .join(format!("{index:0width$}", width = SLAB_FILE_NAME_WIDTH));

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let file = options
            .open(&path)
            .wrap_err_with(|| format!("failed to create slab file '{}'", path.display()))?;

        file.set_len(self.slab_bytes as u64)
            .wrap_err_with(|| {
                format!(
                    "failed to size slab file '{}' to {} bytes",
                    path.display(),
                    self.slab_bytes
                )
            })?;

        // SAFETY: MmapMut::map_mut is unsafe because the mapped file could be
        // modified externally. This is safe because:
        // 1. The file was just created inside the store's private temp
        //    directory with owner-only permissions
        // 2. The file size was set before mapping, so the full range is valid
        // 3. The mapping's lifetime is tied to Slab, preventing
        //    use-after-unmap
        let map = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map slab file '{}'", path.display()))?
        };

        Ok(Slab { map, used: 0 })
    }
}

impl Drop for StringStore {
    fn drop(&mut self) {
        // Best effort: on abnormal termination the directory stays behind.
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn record_tail<'a>(slabs: &'a [Slab], handle: Handle) -> Result<&'a [u8]> {
    let slab = slabs
        .get(handle.slab_index() as usize)
        .ok_or_else(|| eyre::eyre!("handle {:?} names a slab that does not exist", handle))?;

    let offset = handle.byte_offset() as usize;
    ensure!(
        offset < slab.used,
        "handle {:?} points past the slab's bump pointer {}",
        handle,
        slab.used
    );

    Ok(&slab.map[offset..slab.used])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn insert_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = StringStore::create(dir.path().join("store")).unwrap();

        let a = store.insert(b"correct horse").unwrap();
        let b = store.insert(b"battery staple").unwrap();

        assert_eq!(store.get(a).unwrap(), b"correct horse");
        assert_eq!(store.get(b).unwrap(), b"battery staple");
        assert_ne!(a, b);
    }

    #[test]
    fn handles_stay_valid_across_slab_rollover() {
        let dir = tempdir().unwrap();
        let store = StringStore::with_slab_bytes(dir.path().join("store"), 16).unwrap();

        let records: Vec<Vec<u8>> = (0..7).map(|i| format!("rec{i}").into_bytes()).collect();
        let handles: Vec<Handle> = records
            .iter()
            .map(|r| store.insert(r).unwrap())
            .collect();

        assert!(store.slab_count() > 1);
        for (record, handle) in records.iter().zip(&handles) {
            assert_eq!(&store.get(*handle).unwrap(), record);
        }
    }

    #[test]
    fn record_at_capacity_is_accepted_and_one_past_is_rejected() {
        let dir = tempdir().unwrap();
        let store = StringStore::with_slab_bytes(dir.path().join("store"), 16).unwrap();

        let fits = vec![b'a'; 15];
        let handle = store.insert(&fits).unwrap();
        assert_eq!(store.get(handle).unwrap(), fits);

        let too_large = vec![b'b'; 16];
        let err = store.insert(&too_large).unwrap_err();
        assert!(err.to_string().contains("maximum storable length"));
    }

    #[test]
    fn matches_compares_full_record_bytes() {
        let dir = tempdir().unwrap();
        let store = StringStore::create(dir.path().join("store")).unwrap();

        let handle = store.insert(b"swordfish").unwrap();

        assert!(store.matches(handle, b"swordfish").unwrap());
        assert!(!store.matches(handle, b"sword").unwrap());
        assert!(!store.matches(handle, b"swordfishes").unwrap());
        assert!(!store.matches(handle, b"swordfisi").unwrap());
        assert!(!store.matches(handle, b"").unwrap());
    }

    #[test]
    fn dump_is_the_concatenation_of_inserted_records() {
        let dir = tempdir().unwrap();
        let store = StringStore::with_slab_bytes(dir.path().join("store"), 16).unwrap();

        for record in [&b"one"[..], b"two", b"three", b"four"] {
            store.insert(record).unwrap();
        }

        let mut out = Vec::new();
        let written = store.dump(&mut out).unwrap();

        assert_eq!(out, b"one\ntwo\nthree\nfour\n");
        assert_eq!(written as usize, out.len());
        assert_eq!(written, store.bytes_used());
    }

    #[test]
    fn slab_files_are_zero_padded_and_fixed_size() {
        let dir = tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let store = StringStore::with_slab_bytes(&store_dir, 16).unwrap();

        for _ in 0..5 {
            store.insert(b"abcdefghij").unwrap();
        }

        let first = store_dir.join("000000000000");
        let second = store_dir.join("000000000001");
        assert!(first.exists());
        assert!(second.exists());
        assert_eq!(fs::metadata(&first).unwrap().len(), 16);
        assert_eq!(fs::metadata(&second).unwrap().len(), 16);
    }

    #[test]
    fn temp_directory_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let store_dir = dir.path().join("store");

        {
            let store = StringStore::create(&store_dir).unwrap();
            store.insert(b"ephemeral").unwrap();
            assert!(store_dir.exists());
        }

        assert!(!store_dir.exists());
    }
}
