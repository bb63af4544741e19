//! # Server Store Module
//!
//! The server-side half of the pipeline: per-alias chain stores mapping
//! key hashes to buckets.
//!
//! - **`store_trait`**: the primitive interface every chain store exposes
//! - **`bucket_store`**: in-memory store with per-bucket serialization
//!
//! The store layer never decodes operation payloads. Appends, snapshots,
//! and head splices are pure byte manipulation; all semantics live in the
//! client-side resolver. That split is what keeps the server minimal and
//! lets clients evolve operation semantics without touching it.

pub mod bucket_store;
pub mod store_trait;

pub use bucket_store::BucketStore;
pub use store_trait::ChainStore;
