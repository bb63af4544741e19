//! # Chain
//!
//! An immutable, ordered sequence of operation blobs for one key-hash
//! bucket, oldest to newest, as returned by the server. A chain is a value:
//! it never mutates in place. The server may hand back a *different* chain
//! for the same bucket after compaction, with the same resolved state for
//! every key.

use crate::codec;
use crate::error::Error;
use crate::operation::Operation;

/// Ordered blob sequence for one bucket, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    blobs: Vec<Vec<u8>>,
}

impl Chain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self { blobs: Vec::new() }
    }

    /// Wrap an ordered blob sequence, oldest first
    pub fn from_blobs(blobs: Vec<Vec<u8>>) -> Self {
        Self { blobs }
    }

    /// Number of blobs in the chain
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True when the chain holds no blobs
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// The raw blobs, oldest first
    pub fn blobs(&self) -> &[Vec<u8>] {
        &self.blobs
    }

    /// Iterate the blobs oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.blobs.iter().map(|b| b.as_slice())
    }

    /// Lazily decode the chain, oldest to newest.
    ///
    /// The iterator stops at the first malformed blob, yielding one
    /// [`Error::MalformedOperation`] that reports the blob's position and
    /// then ending. Callers that need fail-fast semantics simply `?` each
    /// item.
    pub fn decode(&self) -> ChainDecoder<'_> {
        ChainDecoder {
            blobs: &self.blobs,
            position: 0,
            failed: false,
        }
    }

    /// True when every blob of `self` equals the corresponding leading blob
    /// of `other`. The empty chain is a prefix of everything.
    pub fn is_prefix_of(&self, other: &Chain) -> bool {
        other.blobs.len() >= self.blobs.len()
            && other.blobs[..self.blobs.len()] == self.blobs[..]
    }
}

impl From<Vec<Vec<u8>>> for Chain {
    fn from(blobs: Vec<Vec<u8>>) -> Self {
        Self::from_blobs(blobs)
    }
}

/// Lazy decoding iterator over a chain's blobs; fuses after an error
pub struct ChainDecoder<'a> {
    blobs: &'a [Vec<u8>],
    position: usize,
    failed: bool,
}

impl<'a> Iterator for ChainDecoder<'a> {
    type Item = Result<Operation, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.blobs.len() {
            return None;
        }
        let position = self.position;
        self.position += 1;
        match codec::decode(&self.blobs[position]) {
            Ok(op) => Some(Ok(op)),
            Err(source) => {
                self.failed = true;
                Some(Err(Error::MalformedOperation { position, source }))
            }
        }
    }
}
