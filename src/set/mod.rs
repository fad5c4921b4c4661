//! # Sharded Dedup Set
//!
//! This module decides, for each record, whether it is novel (store it) or a
//! duplicate (do nothing observable). It is the only component the worker
//! threads contend on, so it is built for parallel insertion from the start.
//!
//! ## Lock Sharding
//!
//! A single lock over one big table would serialize every worker. Instead
//! the set is a fixed-width array of independent shards, each a short chain
//! of `(hash, handle)` pairs behind its own mutex:
//!
//! ```text
//! DedupSet
//! ├── Shard 0:       Mutex<[(hash, handle), ...]>
//! ├── Shard 1:       Mutex<[(hash, handle), ...]>
//! ├── ...
//! └── Shard 2^20-1:  Mutex<[(hash, handle), ...]>
//! ```
//!
//! Records are assigned to shards by `hash & (shard_count - 1)`; workers
//! only collide when their records hash to the same shard. The width is
//! fixed at construction and must be a power of two.
//!
//! ## Duplicate Detection
//!
//! The record digest is CRC-32/ISCSI: fast, well-dispersed, and in no way
//! cryptographic. Equal hashes do not imply equal records, so a chain scan
//! compares candidate bytes against the stored record before declaring a
//! duplicate; colliding records coexist in the same chain.
//!
//! ## Interaction With the Store
//!
//! The set holds a shared, non-owning reference to the [`StringStore`] and
//! stores plain handles, never record bytes. Lock order is fixed: the chain
//! mutex is taken first, the store's slab-list lock only inside it. The
//! store lock is never held across chain operations, so the two layers
//! cannot deadlock.
//!
//! ## Thread Safety
//!
//! `DedupSet` is `Send + Sync`. The kept-record counter is a relaxed atomic,
//! read only for progress lines and the final summary.

use std::sync::atomic::{AtomicU64, Ordering};

use crc::{Crc, CRC_32_ISCSI};
use eyre::{ensure, Result};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::config::CHAIN_INLINE_ENTRIES;
use crate::store::{Handle, StringStore};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Digest of a record's bytes. Equal bytes produce equal hashes; unequal
/// bytes may collide and are disambiguated by byte comparison.
pub fn record_hash(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    hash: u32,
    handle: Handle,
}

type Chain = SmallVec<[Entry; CHAIN_INLINE_ENTRIES]>;

#[derive(Default)]
struct Shard {
    chain: Mutex<Chain>,
}

/// A fixed-width, mutex-sharded set of distinct records, backed by a
/// [`StringStore`] that owns the record bytes.
pub struct DedupSet<'s> {
    store: &'s StringStore,
    shards: Box<[Shard]>,
    mask: usize,
    records_kept: AtomicU64,
}

impl<'s> DedupSet<'s> {
    /// Creates a set with `shard_count` shards (a nonzero power of two).
    pub fn new(store: &'s StringStore, shard_count: usize) -> Result<Self> {
        ensure!(
            shard_count.is_power_of_two(),
            "set shard count {} is not a power of two",
            shard_count
        );

        let mut shards = Vec::with_capacity(shard_count);
        shards.resize_with(shard_count, Shard::default);

        Ok(Self {
            store,
            shards: shards.into_boxed_slice(),
            mask: shard_count - 1,
            records_kept: AtomicU64::new(0),
        })
    }

    /// Inserts `bytes` if no equal record is present. Returns `Ok(true)` for
    /// a novel record, `Ok(false)` for a duplicate.
    ///
    /// Callers filter empty records; the set does not special-case them.
    pub fn add(&self, bytes: &[u8]) -> Result<bool> {
        let hash = record_hash(bytes);
        let shard = &self.shards[hash as usize & self.mask];

        let mut chain = shard.chain.lock();

        for entry in chain.iter() {
            if entry.hash == hash && self.store.matches(entry.handle, bytes)? {
                return Ok(false);
            }
        }

        let handle = self.store.insert(bytes)?;
        chain.push(Entry { hash, handle });
        self.records_kept.fetch_add(1, Ordering::Relaxed);

        Ok(true)
    }

    /// Number of distinct records kept so far.
    pub fn unique_len(&self) -> u64 {
        self.records_kept.load(Ordering::Relaxed)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    fn test_store(dir: &tempfile::TempDir) -> StringStore {
        StringStore::create(dir.path().join("store")).unwrap()
    }

    #[test]
    fn first_add_keeps_later_adds_reject() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let set = DedupSet::new(&store, 16).unwrap();

        assert!(set.add(b"hunter2").unwrap());
        assert!(!set.add(b"hunter2").unwrap());
        assert!(!set.add(b"hunter2").unwrap());
        assert_eq!(set.unique_len(), 1);
    }

    #[test]
    fn distinct_records_are_all_kept() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let set = DedupSet::new(&store, 16).unwrap();

        for i in 0..100 {
            assert!(set.add(format!("record-{i}").as_bytes()).unwrap());
        }

        assert_eq!(set.unique_len(), 100);
        assert_eq!(store.bytes_used(), (0..100).map(|i| format!("record-{i}").len() as u64 + 1).sum());
    }

    #[test]
    fn single_shard_disambiguates_by_bytes() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        // One shard forces every record into the same chain, making every
        // insert a same-chain "collision" resolved by byte comparison.
        let set = DedupSet::new(&store, 1).unwrap();

        assert!(set.add(b"alpha").unwrap());
        assert!(set.add(b"beta").unwrap());
        assert!(set.add(b"gamma").unwrap());
        assert!(!set.add(b"beta").unwrap());
        assert_eq!(set.unique_len(), 3);
    }

    #[test]
    fn rejects_non_power_of_two_width() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        assert!(DedupSet::new(&store, 0).is_err());
        assert!(DedupSet::new(&store, 3).is_err());
        assert!(DedupSet::new(&store, 1).is_ok());
    }

    #[test]
    fn concurrent_adds_of_one_record_keep_exactly_one() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let set = DedupSet::new(&store, 16).unwrap();

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..10_000 {
                        set.add(b"the-one-record").unwrap();
                    }
                });
            }
        });

        assert_eq!(set.unique_len(), 1);
        assert_eq!(store.bytes_used(), b"the-one-record\n".len() as u64);
    }

    #[test]
    fn concurrent_distinct_adds_are_all_kept() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let set = DedupSet::new(&store, 64).unwrap();

        thread::scope(|scope| {
            let set = &set;
            for worker in 0..4 {
                scope.spawn(move || {
                    for i in 0..1_000 {
                        // Every worker adds the shared corpus; each record
                        // must be kept exactly once regardless of which
                        // worker wins.
                        set.add(format!("shared-{i}").as_bytes()).unwrap();
                        set.add(format!("w{worker}-{i}").as_bytes()).unwrap();
                    }
                });
            }
        });

        assert_eq!(set.unique_len(), 1_000 + 4 * 1_000);
    }
}
