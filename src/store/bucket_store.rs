//! # Bucket Store
//!
//! In-memory chain store backing one store alias. The bucket table lives
//! under a read-write lock; each bucket carries its own mutex so appends to
//! one bucket serialize while distinct buckets proceed concurrently. The
//! table's write lock is only taken to insert a bucket on first append or
//! to clear the store.
//!
//! All data is process-lifetime only: the authoritative persistence layer
//! is an external collaborator, and this store holds the live chains.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::debug;

use super::store_trait::ChainStore;
use crate::chain::Chain;

type Bucket = Arc<Mutex<Vec<Vec<u8>>>>;

/// Thread-safe in-memory `hash → chain` store
#[derive(Default)]
pub struct BucketStore {
    buckets: RwLock<HashMap<u64, Bucket>>,
}

impl BucketStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Find a bucket without creating it
    fn find(&self, hash: u64) -> Option<Bucket> {
        let table = self.buckets.read().unwrap();
        table.get(&hash).cloned()
    }

    /// Find a bucket, creating it on first use
    fn find_or_create(&self, hash: u64) -> Bucket {
        if let Some(bucket) = self.find(hash) {
            return bucket;
        }
        let mut table = self.buckets.write().unwrap();
        table
            .entry(hash)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// Current chain length of a bucket, for tests and diagnostics
    pub fn chain_len(&self, hash: u64) -> usize {
        self.find(hash).map_or(0, |bucket| bucket.lock().unwrap().len())
    }
}

impl ChainStore for BucketStore {
    fn get(&self, hash: u64) -> Chain {
        match self.find(hash) {
            Some(bucket) => Chain::from_blobs(bucket.lock().unwrap().clone()),
            None => Chain::new(),
        }
    }

    fn append(&self, hash: u64, blob: Vec<u8>) {
        let bucket = self.find_or_create(hash);
        bucket.lock().unwrap().push(blob);
    }

    fn get_and_append(&self, hash: u64, blob: Vec<u8>) -> Chain {
        let bucket = self.find_or_create(hash);
        // Snapshot and append under the same bucket lock: the returned
        // chain is exactly the state this append extended.
        let mut blobs = bucket.lock().unwrap();
        let snapshot = Chain::from_blobs(blobs.clone());
        blobs.push(blob);
        snapshot
    }

    fn replace_at_head(&self, hash: u64, expected: &Chain, replacement: Chain) -> bool {
        let Some(bucket) = self.find(hash) else {
            return false;
        };
        let mut blobs = bucket.lock().unwrap();
        let current = Chain::from_blobs(blobs.clone());
        if !expected.is_prefix_of(&current) {
            debug!(
                "replace_at_head ignored for bucket {:016x}: expected prefix of {} blobs does not match",
                hash,
                expected.len()
            );
            return false;
        }
        let mut spliced = replacement.blobs().to_vec();
        spliced.extend_from_slice(&blobs[expected.len()..]);
        *blobs = spliced;
        true
    }

    fn clear(&self) {
        self.buckets.write().unwrap().clear();
    }

    fn bucket_count(&self) -> usize {
        self.buckets.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn blob(tag: u8) -> Vec<u8> {
        vec![tag; 4]
    }

    #[test]
    fn test_get_on_missing_bucket_is_empty() {
        let store = BucketStore::new();
        assert!(store.get(1).is_empty());
        assert_eq!(store.bucket_count(), 0);
    }

    #[test]
    fn test_get_and_append_returns_pre_chain() {
        let store = BucketStore::new();
        assert!(store.get_and_append(7, blob(0)).is_empty());

        let pre = store.get_and_append(7, blob(1));
        assert_eq!(pre.blobs(), &[blob(0)]);

        let now = store.get(7);
        assert_eq!(now.blobs(), &[blob(0), blob(1)]);
    }

    #[test]
    fn test_buckets_are_independent() {
        let store = BucketStore::new();
        store.append(1, blob(1));
        store.append(2, blob(2));
        assert_eq!(store.get(1).blobs(), &[blob(1)]);
        assert_eq!(store.get(2).blobs(), &[blob(2)]);
        assert_eq!(store.bucket_count(), 2);
    }

    #[test]
    fn test_replace_at_head_applies_on_exact_prefix() {
        let store = BucketStore::new();
        store.append(5, blob(0));
        store.append(5, blob(1));
        store.append(5, blob(2));

        let expected = Chain::from_blobs(vec![blob(0), blob(1)]);
        let replacement = Chain::from_blobs(vec![blob(9)]);
        assert!(store.replace_at_head(5, &expected, replacement));

        // The suffix appended after the prefix survives the splice.
        assert_eq!(store.get(5).blobs(), &[blob(9), blob(2)]);
    }

    #[test]
    fn test_replace_at_head_ignores_mismatch() {
        let store = BucketStore::new();
        store.append(5, blob(0));

        let stale = Chain::from_blobs(vec![blob(7)]);
        assert!(!store.replace_at_head(5, &stale, Chain::new()));
        assert_eq!(store.get(5).blobs(), &[blob(0)]);

        // Missing bucket: also a silent no-op.
        assert!(!store.replace_at_head(99, &Chain::new(), Chain::new()));
        assert_eq!(store.bucket_count(), 1);
    }

    #[test]
    fn test_clear_drops_all_buckets() {
        let store = BucketStore::new();
        store.append(1, blob(1));
        store.append(2, blob(2));
        store.clear();
        assert_eq!(store.bucket_count(), 0);
        assert!(store.get(1).is_empty());
    }

    #[test]
    fn test_concurrent_appends_linearize_per_bucket() {
        let store = Arc::new(BucketStore::new());

        let mut handles = vec![];
        for t in 0..5u8 {
            let store_clone = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let mut pre_lengths = vec![];
                for i in 0..20u8 {
                    let pre = store_clone.get_and_append(42, vec![t, i]);
                    pre_lengths.push(pre.len());
                }
                pre_lengths
            }));
        }

        let mut all_pre_lengths: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        // Every append observed a distinct pre-chain length: the bucket
        // serialized all 100 appends into a single total order.
        all_pre_lengths.sort_unstable();
        assert_eq!(all_pre_lengths, (0..100usize).collect::<Vec<_>>());
        assert_eq!(store.chain_len(42), 100);
    }

    #[test]
    fn test_concurrent_distinct_buckets() {
        let store = Arc::new(BucketStore::new());
        let mut handles = vec![];
        for t in 0..4u64 {
            let store_clone = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..50u8 {
                    store_clone.append(t, vec![i]);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        for t in 0..4u64 {
            assert_eq!(store.chain_len(t), 50);
        }
    }
}
