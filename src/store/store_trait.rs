//! # Chain Store Trait
//!
//! The primitive interface of a server-side chain store: one chain per key
//! hash, with atomic append-and-fetch as the sole read-modify-write. All
//! implementations must serialize operations per bucket and keep distinct
//! buckets independent; no cross-bucket ordering is promised or observable.

use crate::chain::Chain;

/// Server-side store of `hash → chain`, safe to share across connections.
///
/// The store treats blobs as opaque bytes. It guarantees:
/// - per-bucket linearizability: appends to one bucket happen in a total
///   order, and `get_and_append` returns exactly the chain that preceded
///   its own append in that order;
/// - bucket independence: operations on distinct hashes never wait on each
///   other's order.
pub trait ChainStore: Send + Sync {
    /// Snapshot the current chain for a bucket. A missing bucket reads as
    /// the empty chain.
    fn get(&self, hash: u64) -> Chain;

    /// Append a blob to a bucket, creating the bucket on first use.
    fn append(&self, hash: u64, blob: Vec<u8>);

    /// Atomically snapshot a bucket's chain and append a blob to it,
    /// returning the pre-append chain. This is the primitive that makes
    /// client-side conditional operations truthful: the caller folds the
    /// returned chain, and every later appender will fold the same
    /// operation into the same place.
    fn get_and_append(&self, hash: u64, blob: Vec<u8>) -> Chain;

    /// Replace an exact prefix of a bucket's chain with an equivalent
    /// compacted form, keeping any suffix appended since. Returns whether
    /// the splice was applied; a mismatched prefix is ignored without
    /// error, which keeps compaction lock-free and correctness-neutral.
    fn replace_at_head(&self, hash: u64, expected: &Chain, replacement: Chain) -> bool;

    /// Drop every bucket in the store.
    fn clear(&self);

    /// Number of live buckets.
    fn bucket_count(&self) -> usize;
}
