//! # Key Hashing
//!
//! The stable 64-bit hash that maps serialized keys to chain buckets. Client
//! and server must agree on this function byte-for-byte: the client derives
//! the bucket for every operation it appends, and the server indexes chains
//! by the value the client sends. Changing it is a wire break.

use sha2::{Digest, Sha256};

/// Hash serialized key bytes to a nonnegative 64-bit bucket index.
///
/// Takes the first 8 bytes of the SHA-256 digest, read big-endian, with the
/// top bit cleared so the result is always nonnegative. Distinct keys may
/// collide; the resolver's locality property keeps colliding keys
/// semantically isolated within a shared bucket.
pub fn key_hash(key: &[u8]) -> u64 {
    let digest = Sha256::digest(key);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) & 0x7fff_ffff_ffff_ffff
}
