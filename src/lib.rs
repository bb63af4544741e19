//! # Chain Cache - Clustered Key-Value Cache
//!
//! A clustered key-value cache whose shared state is a set of per-key-hash
//! append logs ("chains") held on a server. Clients never read-modify-write
//! on the server: every mutation is encoded as an operation blob and
//! appended to its key's chain, and the current value of a key is a pure
//! fold of that chain. The single server primitive `getAndAppend` (append
//! one blob, return the chain that preceded it) is enough to give
//! conditional operations (putIfAbsent, replace) at-most-once semantics
//! with no server-side logic at all.
//!
//! ## Architecture Overview
//!
//! - **Operation model** (`operation`): the closed set of mutations and
//!   their pure `apply` semantics
//! - **Codec** (`codec`): operation ↔ binary blob, table-driven dispatch
//! - **Chain** (`chain`): immutable blob sequence for one bucket
//! - **Resolver** (`resolver`): the fold, and canonical compaction
//! - **ServerStoreProxy** (`proxy`): typed async client facade
//! - **Store** (`store`): server-side hash → chain buckets
//! - **Entity framing** (`message`) and the TCP endpoint (`server`)

pub mod chain;
pub mod codec;
pub mod config;
pub mod error;
pub mod hashing;
pub mod message;
pub mod operation;
pub mod proxy;
pub mod resolver;
pub mod serializer;
pub mod server;
pub mod store;

pub use chain::Chain;
pub use config::{ClientConfig, Config};
pub use error::{Error, Result};
pub use operation::Operation;
pub use proxy::ServerStoreProxy;
pub use serializer::{BytesSerializer, Serializer, StringSerializer};
pub use server::Server;
pub use store::{BucketStore, ChainStore};
