//! # Operation Model
//!
//! The closed set of mutations a client can append to a key's chain. Each
//! operation carries the serialized key bytes, any payload bytes, and a
//! client timestamp. The opcode is the sole discriminator on the wire;
//! future variants must reserve a new opcode and must never reuse or mutate
//! the layout of an existing one.
//!
//! The semantics of every variant live in [`Operation::apply`], the fold
//! step the resolver runs over a chain:
//!
//! | Variant                 | apply(None)  | apply(Some(v))               |
//! |-------------------------|--------------|------------------------------|
//! | Put(_, nv)              | Some(nv)     | Some(nv)                     |
//! | Remove                  | None         | None                         |
//! | PutIfAbsent(_, nv)      | Some(nv)     | Some(v)                      |
//! | Replace(_, nv)          | None         | Some(nv)                     |
//! | ReplaceConditional(ov, nv) | None      | Some(nv) if v == ov else Some(v) |
//!
//! `apply` is pure, total, and deterministic; that property is what makes
//! the chain fold well-defined, and what lets every client that folds the
//! same chain reach the same answer without any server-side logic.

/// Wire opcodes, one per operation variant
pub mod opcode {
    pub const PUT: u8 = 1;
    pub const REMOVE: u8 = 2;
    pub const PUT_IF_ABSENT: u8 = 3;
    pub const REPLACE: u8 = 4;
    pub const REPLACE_CONDITIONAL: u8 = 5;
}

/// A single mutation recorded in a key's chain.
///
/// Keys and values are serialized bytes; equality throughout the pipeline is
/// byte equality. The timestamp is a client-side millisecond stamp kept for
/// diagnostics only; append order on the server is the only order that
/// matters for correctness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Unconditionally install a value
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        timestamp: u64,
    },

    /// Unconditionally delete the mapping
    Remove { key: Vec<u8>, timestamp: u64 },

    /// Install only if the key has no effective value
    PutIfAbsent {
        key: Vec<u8>,
        value: Vec<u8>,
        timestamp: u64,
    },

    /// Install only if the key has some effective value
    Replace {
        key: Vec<u8>,
        value: Vec<u8>,
        timestamp: u64,
    },

    /// Install only if the effective value equals `old_value`
    ReplaceConditional {
        key: Vec<u8>,
        old_value: Vec<u8>,
        new_value: Vec<u8>,
        timestamp: u64,
    },
}

impl Operation {
    /// The serialized key this operation targets
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. }
            | Operation::Remove { key, .. }
            | Operation::PutIfAbsent { key, .. }
            | Operation::Replace { key, .. }
            | Operation::ReplaceConditional { key, .. } => key,
        }
    }

    /// The client timestamp carried for diagnostics
    pub fn timestamp(&self) -> u64 {
        match self {
            Operation::Put { timestamp, .. }
            | Operation::Remove { timestamp, .. }
            | Operation::PutIfAbsent { timestamp, .. }
            | Operation::Replace { timestamp, .. }
            | Operation::ReplaceConditional { timestamp, .. } => *timestamp,
        }
    }

    /// The wire opcode for this variant
    pub fn opcode(&self) -> u8 {
        match self {
            Operation::Put { .. } => opcode::PUT,
            Operation::Remove { .. } => opcode::REMOVE,
            Operation::PutIfAbsent { .. } => opcode::PUT_IF_ABSENT,
            Operation::Replace { .. } => opcode::REPLACE,
            Operation::ReplaceConditional { .. } => opcode::REPLACE_CONDITIONAL,
        }
    }

    /// Apply this operation to the value folded so far.
    ///
    /// This is the single fold step of the resolver. It must stay pure and
    /// total: the result depends on nothing but `prev` and the operation's
    /// own payload.
    pub fn apply(&self, prev: Option<Vec<u8>>) -> Option<Vec<u8>> {
        match self {
            Operation::Put { value, .. } => Some(value.clone()),
            Operation::Remove { .. } => None,
            Operation::PutIfAbsent { value, .. } => match prev {
                None => Some(value.clone()),
                Some(existing) => Some(existing),
            },
            Operation::Replace { value, .. } => prev.map(|_| value.clone()),
            Operation::ReplaceConditional {
                old_value,
                new_value,
                ..
            } => match prev {
                None => None,
                Some(existing) if existing == *old_value => Some(new_value.clone()),
                Some(existing) => Some(existing),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[test]
    fn test_put_overwrites_any_state() {
        let op = Operation::Put {
            key: b("k"),
            value: b("new"),
            timestamp: 1,
        };
        assert_eq!(op.apply(None), Some(b("new")));
        assert_eq!(op.apply(Some(b("old"))), Some(b("new")));
    }

    #[test]
    fn test_remove_clears_any_state() {
        let op = Operation::Remove {
            key: b("k"),
            timestamp: 1,
        };
        assert_eq!(op.apply(None), None);
        assert_eq!(op.apply(Some(b("old"))), None);
    }

    #[test]
    fn test_put_if_absent_only_installs_on_empty() {
        let op = Operation::PutIfAbsent {
            key: b("k"),
            value: b("new"),
            timestamp: 1,
        };
        assert_eq!(op.apply(None), Some(b("new")));
        assert_eq!(op.apply(Some(b("old"))), Some(b("old")));
    }

    #[test]
    fn test_replace_requires_existing_value() {
        let op = Operation::Replace {
            key: b("k"),
            value: b("new"),
            timestamp: 1,
        };
        assert_eq!(op.apply(None), None);
        assert_eq!(op.apply(Some(b("old"))), Some(b("new")));
    }

    #[test]
    fn test_replace_conditional_compares_bytes() {
        let op = Operation::ReplaceConditional {
            key: b("k"),
            old_value: b("expected"),
            new_value: b("new"),
            timestamp: 1,
        };
        assert_eq!(op.apply(None), None);
        assert_eq!(op.apply(Some(b("expected"))), Some(b("new")));
        assert_eq!(op.apply(Some(b("other"))), Some(b("other")));
    }

    #[test]
    fn test_accessors() {
        let op = Operation::ReplaceConditional {
            key: b("key"),
            old_value: b("a"),
            new_value: b("b"),
            timestamp: 42,
        };
        assert_eq!(op.key(), b"key");
        assert_eq!(op.timestamp(), 42);
        assert_eq!(op.opcode(), opcode::REPLACE_CONDITIONAL);

        let remove = Operation::Remove {
            key: b("key"),
            timestamp: 7,
        };
        assert_eq!(remove.opcode(), opcode::REMOVE);
    }
}
