//! # Operation Codec
//!
//! Bidirectional mapping between an [`Operation`] and its length-prefixed
//! binary blob. The layout is a wire contract shared by every client and
//! server in the cluster:
//!
//! ```text
//! blob := opcode:u8 payload
//! payload(PUT)                 := ts:u64 keyLen:u32 key valLen:u32 val
//! payload(REMOVE)              := ts:u64 keyLen:u32 key
//! payload(PUT_IF_ABSENT)       := ts:u64 keyLen:u32 key valLen:u32 val
//! payload(REPLACE)             := ts:u64 keyLen:u32 key valLen:u32 val
//! payload(REPLACE_CONDITIONAL) := ts:u64 keyLen:u32 key oldLen:u32 old newLen:u32 new
//! ```
//!
//! All integers are big-endian. Decoding is dispatched through a data-driven
//! registry keyed by the opcode byte, so a new opcode is one new decoder
//! entry; the chain and resolver never change.
//!
//! `decode(encode(op)) == op` for every valid operation. Decoding rejects
//! unknown opcodes, truncated payloads, length prefixes that overrun the
//! buffer, and trailing bytes after a complete payload: a blob is exactly
//! one operation.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

use crate::operation::{opcode, Operation};

/// Failures rejecting a single blob
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The opcode byte maps to no registered decoder
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// The payload ended before a fixed-width field or prefixed run
    #[error("truncated payload: wanted {wanted} bytes, {remaining} remain")]
    Truncated { wanted: usize, remaining: usize },

    /// Bytes remained after the payload was fully decoded
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// The blob had no opcode byte at all
    #[error("empty blob")]
    Empty,

    /// A field declared as UTF-8 text did not decode as UTF-8
    #[error("invalid UTF-8 in text field")]
    InvalidText,
}

/// Big-endian cursor over a byte slice.
///
/// Every read checks the remaining length, so a corrupt length prefix
/// surfaces as [`CodecError::Truncated`] instead of a panic. Shared with the
/// entity message layer, which speaks the same integer conventions.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::Truncated {
                wanted: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    /// Read a u32 length prefix followed by that many bytes
    pub(crate) fn read_prefixed(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Read `len` bytes and require them to be valid UTF-8
    pub(crate) fn read_text(&mut self, len: usize) -> Result<String, CodecError> {
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| CodecError::InvalidText)
    }

    /// Fail if any input remains unconsumed
    pub(crate) fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

/// Append a u32 length prefix and the bytes themselves
pub(crate) fn put_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

type PayloadDecoder = fn(&mut ByteReader<'_>) -> Result<Operation, CodecError>;

/// Opcode → payload decoder registry.
///
/// New opcodes register here and nowhere else; the chain and resolver stay
/// untouched when the operation set grows.
static DECODERS: Lazy<HashMap<u8, PayloadDecoder>> = Lazy::new(|| {
    let mut table: HashMap<u8, PayloadDecoder> = HashMap::new();
    table.insert(opcode::PUT, decode_put);
    table.insert(opcode::REMOVE, decode_remove);
    table.insert(opcode::PUT_IF_ABSENT, decode_put_if_absent);
    table.insert(opcode::REPLACE, decode_replace);
    table.insert(opcode::REPLACE_CONDITIONAL, decode_replace_conditional);
    table
});

fn decode_put(reader: &mut ByteReader<'_>) -> Result<Operation, CodecError> {
    let timestamp = reader.read_u64()?;
    let key = reader.read_prefixed()?;
    let value = reader.read_prefixed()?;
    Ok(Operation::Put {
        key,
        value,
        timestamp,
    })
}

fn decode_remove(reader: &mut ByteReader<'_>) -> Result<Operation, CodecError> {
    let timestamp = reader.read_u64()?;
    let key = reader.read_prefixed()?;
    Ok(Operation::Remove { key, timestamp })
}

fn decode_put_if_absent(reader: &mut ByteReader<'_>) -> Result<Operation, CodecError> {
    let timestamp = reader.read_u64()?;
    let key = reader.read_prefixed()?;
    let value = reader.read_prefixed()?;
    Ok(Operation::PutIfAbsent {
        key,
        value,
        timestamp,
    })
}

fn decode_replace(reader: &mut ByteReader<'_>) -> Result<Operation, CodecError> {
    let timestamp = reader.read_u64()?;
    let key = reader.read_prefixed()?;
    let value = reader.read_prefixed()?;
    Ok(Operation::Replace {
        key,
        value,
        timestamp,
    })
}

fn decode_replace_conditional(reader: &mut ByteReader<'_>) -> Result<Operation, CodecError> {
    let timestamp = reader.read_u64()?;
    let key = reader.read_prefixed()?;
    let old_value = reader.read_prefixed()?;
    let new_value = reader.read_prefixed()?;
    Ok(Operation::ReplaceConditional {
        key,
        old_value,
        new_value,
        timestamp,
    })
}

/// Encode an operation into its wire blob. Total: every operation encodes.
pub fn encode(op: &Operation) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + op.key().len());
    out.push(op.opcode());
    out.extend_from_slice(&op.timestamp().to_be_bytes());
    match op {
        Operation::Put { key, value, .. }
        | Operation::PutIfAbsent { key, value, .. }
        | Operation::Replace { key, value, .. } => {
            put_prefixed(&mut out, key);
            put_prefixed(&mut out, value);
        }
        Operation::Remove { key, .. } => {
            put_prefixed(&mut out, key);
        }
        Operation::ReplaceConditional {
            key,
            old_value,
            new_value,
            ..
        } => {
            put_prefixed(&mut out, key);
            put_prefixed(&mut out, old_value);
            put_prefixed(&mut out, new_value);
        }
    }
    out
}

/// Decode a wire blob back into an operation.
///
/// # Errors
/// Returns a [`CodecError`] for empty blobs, unknown opcodes, truncated or
/// overrunning payloads, and trailing bytes.
pub fn decode(blob: &[u8]) -> Result<Operation, CodecError> {
    if blob.is_empty() {
        return Err(CodecError::Empty);
    }
    let mut reader = ByteReader::new(blob);
    let op = reader.read_u8()?;
    let decoder = DECODERS.get(&op).ok_or(CodecError::UnknownOpcode(op))?;
    let operation = decoder(&mut reader)?;
    reader.finish()?;
    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    fn all_variants() -> Vec<Operation> {
        vec![
            Operation::Put {
                key: b("a"),
                value: b("1"),
                timestamp: 100,
            },
            Operation::Remove {
                key: b("a"),
                timestamp: 101,
            },
            Operation::PutIfAbsent {
                key: b("key-two"),
                value: b(""),
                timestamp: 102,
            },
            Operation::Replace {
                key: b(""),
                value: b("value"),
                timestamp: 0,
            },
            Operation::ReplaceConditional {
                key: b("a"),
                old_value: b("old"),
                new_value: b("new"),
                timestamp: u64::MAX,
            },
        ]
    }

    #[test]
    fn test_roundtrip_every_variant() {
        for op in all_variants() {
            let blob = encode(&op);
            assert_eq!(blob[0], op.opcode());
            assert_eq!(decode(&blob).unwrap(), op);
        }
    }

    #[test]
    fn test_put_wire_layout() {
        let op = Operation::Put {
            key: b("ab"),
            value: b("c"),
            timestamp: 0x0102,
        };
        let blob = encode(&op);
        let expected: Vec<u8> = vec![
            1, // opcode
            0, 0, 0, 0, 0, 0, 1, 2, // ts
            0, 0, 0, 2, b'a', b'b', // key
            0, 0, 0, 1, b'c', // value
        ];
        assert_eq!(blob, expected);
    }

    #[test]
    fn test_empty_blob_rejected() {
        assert_eq!(decode(&[]), Err(CodecError::Empty));
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let blob = vec![99, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(decode(&blob), Err(CodecError::UnknownOpcode(99)));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let op = Operation::Put {
            key: b("key"),
            value: b("value"),
            timestamp: 9,
        };
        let blob = encode(&op);
        // Every proper prefix must fail; none may panic.
        for cut in 1..blob.len() {
            let err = decode(&blob[..cut]).unwrap_err();
            assert!(
                matches!(err, CodecError::Truncated { .. }),
                "prefix of {} bytes gave {:?}",
                cut,
                err
            );
        }
    }

    #[test]
    fn test_length_prefix_overrun_rejected() {
        // REMOVE with keyLen claiming 1000 bytes but only 3 present
        let mut blob = vec![2];
        blob.extend_from_slice(&7u64.to_be_bytes());
        blob.extend_from_slice(&1000u32.to_be_bytes());
        blob.extend_from_slice(b"abc");
        assert_eq!(
            decode(&blob),
            Err(CodecError::Truncated {
                wanted: 1000,
                remaining: 3
            })
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut blob = encode(&Operation::Remove {
            key: b("k"),
            timestamp: 1,
        });
        blob.push(0xFF);
        assert_eq!(decode(&blob), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_binary_keys_and_values_survive() {
        let op = Operation::Put {
            key: vec![0, 159, 146, 150], // not valid UTF-8
            value: vec![0xFF; 1024],
            timestamp: 3,
        };
        assert_eq!(decode(&encode(&op)).unwrap(), op);
    }
}
