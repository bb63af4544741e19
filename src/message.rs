//! # Entity Message Framing
//!
//! The framed protocol between a proxy and the entity endpoint. Every
//! request names the target store alias, a message opcode, and an
//! opcode-specific payload; every response is a status byte followed by a
//! chain (on success) or an error string (on failure). All integers are
//! big-endian and all variable-length runs are length-prefixed; there is no
//! trailing delimiter.
//!
//! ```text
//! request  := aliasLen:u16 alias:utf8 opcode:u8 payload
//! response := status:u8 ( chain | errLen:u32 err:utf8 )
//! chain    := chainLen:u32 (blobLen:u32 blob)*
//!
//! payload(GET)             := hash:u64
//! payload(APPEND)          := hash:u64 blobLen:u32 blob
//! payload(GET_AND_APPEND)  := hash:u64 blobLen:u32 blob
//! payload(REPLACE_AT_HEAD) := hash:u64 chain(expected) chain(replacement)
//! payload(CLEAR)           := (empty)
//! ```
//!
//! On the TCP stream each encoded message is preceded by a u32 byte length;
//! that outer framing lives in the server and proxy, not here.

use crate::chain::Chain;
use crate::codec::{put_prefixed, ByteReader, CodecError};

/// Message opcodes for the entity protocol.
///
/// Distinct from operation opcodes: these select a store primitive, not a
/// mutation semantics.
pub mod msg_opcode {
    pub const GET: u8 = 1;
    pub const APPEND: u8 = 2;
    pub const GET_AND_APPEND: u8 = 3;
    pub const REPLACE_AT_HEAD: u8 = 4;
    pub const CLEAR: u8 = 5;
}

/// Response status bytes
pub mod status {
    pub const OK: u8 = 0;
    pub const STORE_UNAVAILABLE: u8 = 1;
    pub const UNSUPPORTED_OPCODE: u8 = 2;
    pub const BAD_REQUEST: u8 = 3;
}

/// A client → server invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Snapshot the chain for a bucket
    Get { alias: String, hash: u64 },

    /// Append a blob without returning the pre-chain
    Append {
        alias: String,
        hash: u64,
        blob: Vec<u8>,
    },

    /// Atomically append a blob and return the pre-append chain
    GetAndAppend {
        alias: String,
        hash: u64,
        blob: Vec<u8>,
    },

    /// Propose replacing an exact chain prefix with a compacted equivalent.
    /// Ignored without error on prefix mismatch.
    ReplaceAtHead {
        alias: String,
        hash: u64,
        expected: Chain,
        replacement: Chain,
    },

    /// Drop every bucket of the store
    Clear { alias: String },
}

impl Request {
    /// The store alias this request addresses
    pub fn alias(&self) -> &str {
        match self {
            Request::Get { alias, .. }
            | Request::Append { alias, .. }
            | Request::GetAndAppend { alias, .. }
            | Request::ReplaceAtHead { alias, .. }
            | Request::Clear { alias } => alias,
        }
    }

    fn opcode(&self) -> u8 {
        match self {
            Request::Get { .. } => msg_opcode::GET,
            Request::Append { .. } => msg_opcode::APPEND,
            Request::GetAndAppend { .. } => msg_opcode::GET_AND_APPEND,
            Request::ReplaceAtHead { .. } => msg_opcode::REPLACE_AT_HEAD,
            Request::Clear { .. } => msg_opcode::CLEAR,
        }
    }

    /// Encode into the wire form (without the outer u32 transport prefix)
    pub fn encode(&self) -> Vec<u8> {
        let alias = self.alias().as_bytes();
        let mut out = Vec::with_capacity(3 + alias.len() + 16);
        out.extend_from_slice(&(alias.len() as u16).to_be_bytes());
        out.extend_from_slice(alias);
        out.push(self.opcode());
        match self {
            Request::Get { hash, .. } => {
                out.extend_from_slice(&hash.to_be_bytes());
            }
            Request::Append { hash, blob, .. } | Request::GetAndAppend { hash, blob, .. } => {
                out.extend_from_slice(&hash.to_be_bytes());
                put_prefixed(&mut out, blob);
            }
            Request::ReplaceAtHead {
                hash,
                expected,
                replacement,
                ..
            } => {
                out.extend_from_slice(&hash.to_be_bytes());
                put_chain(&mut out, expected);
                put_chain(&mut out, replacement);
            }
            Request::Clear { .. } => {}
        }
        out
    }

    /// Decode a request from its wire form.
    ///
    /// An unknown message opcode is reported as
    /// [`CodecError::UnknownOpcode`] so the server can answer with the
    /// unsupported-opcode status instead of dropping the connection.
    pub fn decode(bytes: &[u8]) -> Result<Request, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let alias_len = reader.read_u16()? as usize;
        let alias = reader.read_text(alias_len)?;
        let opcode = reader.read_u8()?;
        let request = match opcode {
            msg_opcode::GET => Request::Get {
                alias,
                hash: reader.read_u64()?,
            },
            msg_opcode::APPEND => Request::Append {
                alias,
                hash: reader.read_u64()?,
                blob: reader.read_prefixed()?,
            },
            msg_opcode::GET_AND_APPEND => Request::GetAndAppend {
                alias,
                hash: reader.read_u64()?,
                blob: reader.read_prefixed()?,
            },
            msg_opcode::REPLACE_AT_HEAD => Request::ReplaceAtHead {
                alias,
                hash: reader.read_u64()?,
                expected: read_chain(&mut reader)?,
                replacement: read_chain(&mut reader)?,
            },
            msg_opcode::CLEAR => Request::Clear { alias },
            other => return Err(CodecError::UnknownOpcode(other)),
        };
        reader.finish()?;
        Ok(request)
    }
}

/// A server → client reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Success; primitives without a result carry an empty chain
    Chain(Chain),

    /// Failure with a status from [`status`] and a descriptor
    Failure { status: u8, message: String },
}

impl Response {
    /// Shorthand for a failure response
    pub fn failure<S: Into<String>>(status: u8, message: S) -> Self {
        Response::Failure {
            status,
            message: message.into(),
        }
    }

    /// Encode into the wire form (without the outer u32 transport prefix)
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Response::Chain(chain) => {
                let mut out = vec![status::OK];
                put_chain(&mut out, chain);
                out
            }
            Response::Failure { status, message } => {
                let mut out = vec![*status];
                put_prefixed(&mut out, message.as_bytes());
                out
            }
        }
    }

    /// Decode a response from its wire form
    pub fn decode(bytes: &[u8]) -> Result<Response, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let status_byte = reader.read_u8()?;
        let response = if status_byte == status::OK {
            Response::Chain(read_chain(&mut reader)?)
        } else {
            let len = reader.read_u32()? as usize;
            Response::Failure {
                status: status_byte,
                message: reader.read_text(len)?,
            }
        };
        reader.finish()?;
        Ok(response)
    }
}

fn put_chain(out: &mut Vec<u8>, chain: &Chain) {
    out.extend_from_slice(&(chain.len() as u32).to_be_bytes());
    for blob in chain.iter() {
        put_prefixed(out, blob);
    }
}

fn read_chain(reader: &mut ByteReader<'_>) -> Result<Chain, CodecError> {
    let count = reader.read_u32()? as usize;
    let mut blobs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        blobs.push(reader.read_prefixed()?);
    }
    Ok(Chain::from_blobs(blobs))
}
