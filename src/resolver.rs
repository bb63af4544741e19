//! # Resolver
//!
//! The deterministic fold that turns a chain and a key into the key's
//! current value, and the canonical compaction that shrinks a chain without
//! changing any key's resolution.
//!
//! Resolution walks the chain oldest to newest and applies every operation
//! whose key equals the target (byte equality), threading the value through
//! [`Operation::apply`]. The properties the rest of the system leans on:
//!
//! - **Determinism**: same chain, same key, same answer, on any thread and
//!   whether or not the chain has been compacted.
//! - **Locality**: operations for other keys never influence the result, so
//!   hash-colliding keys sharing a bucket stay semantically isolated.
//! - **Fold equivalence under compaction**: replacing a chain prefix with a
//!   resolution-equivalent prefix leaves every key's answer unchanged.
//!
//! Compaction here is the client-side half of the head-replacement protocol:
//! the proxy folds the chain it received, builds the canonical minimal chain
//! and proposes it via `replaceAtHead`. The server only splices bytes.

use std::collections::HashMap;

use log::debug;

use crate::chain::Chain;
use crate::codec;
use crate::error::Result;
use crate::operation::Operation;

/// Resolve the current value of `key` from `chain`.
///
/// Returns `Ok(None)` when the key has no effective mapping. Fails only if
/// a blob in the chain is malformed.
pub fn resolve(chain: &Chain, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut value = None;
    for op in chain.decode() {
        let op = op?;
        if op.key() == key {
            value = op.apply(value);
        }
    }
    Ok(value)
}

/// Compute the canonical compaction of `chain`.
///
/// For every key appearing in the chain, in order of last occurrence, the
/// result holds exactly one `PUT(key, resolved_value)` stamped with the
/// key's last-seen timestamp; keys resolving to nothing are dropped
/// entirely. Resolving any key against the result equals resolving it
/// against the input.
pub fn compact(chain: &Chain) -> Result<Chain> {
    struct KeyState {
        value: Option<Vec<u8>>,
        last_position: usize,
        last_timestamp: u64,
    }

    let mut states: HashMap<Vec<u8>, KeyState> = HashMap::new();
    for (position, op) in chain.decode().enumerate() {
        let op = op?;
        let timestamp = op.timestamp();
        match states.get_mut(op.key()) {
            Some(state) => {
                state.value = op.apply(state.value.take());
                state.last_position = position;
                state.last_timestamp = timestamp;
            }
            None => {
                states.insert(
                    op.key().to_vec(),
                    KeyState {
                        value: op.apply(None),
                        last_position: position,
                        last_timestamp: timestamp,
                    },
                );
            }
        }
    }

    let mut survivors: Vec<(Vec<u8>, KeyState)> = states
        .into_iter()
        .filter(|(_, state)| state.value.is_some())
        .collect();
    survivors.sort_by_key(|(_, state)| state.last_position);

    let blobs = survivors
        .into_iter()
        .map(|(key, state)| {
            codec::encode(&Operation::Put {
                key,
                value: state.value.unwrap_or_default(),
                timestamp: state.last_timestamp,
            })
        })
        .collect::<Vec<_>>();

    let compacted = Chain::from_blobs(blobs);
    debug!(
        "compacted chain of {} blobs down to {}",
        chain.len(),
        compacted.len()
    );
    Ok(compacted)
}
