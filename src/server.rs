//! # TCP Entity Endpoint
//!
//! The server that hosts the per-alias chain stores and speaks the framed
//! entity protocol. It implements a simple request-response cycle over TCP
//! sockets.
//!
//! ## Architecture
//!
//! The server uses an asynchronous, multi-connection design:
//! - Main server loop accepts incoming connections
//! - Each connection spawns a separate async task
//! - Requests are decoded and dispatched against the shared stores
//! - Responses are framed and sent back to the client
//!
//! ## Protocol
//!
//! Every request and response is one binary message preceded by a u32 byte
//! length. Requests name a store alias, a message opcode, and a payload;
//! responses carry a status byte and either a chain or an error string. The
//! server enforces a configurable frame-size cap on requests.
//!
//! ## What the server does NOT do
//!
//! It never decodes operation blobs. Appends, pre-append snapshots, and
//! head splices are byte manipulation on chains; the semantics of every
//! operation live in the clients' resolvers. The only process-wide state is
//! the alias → store map, built from configuration at startup.

use anyhow::Result;
use log::{debug, error, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::chain::Chain;
use crate::codec::CodecError;
use crate::config::Config;
use crate::message::{status, Request, Response};
use crate::store::{BucketStore, ChainStore};

/// Alias → store table shared by every connection
type StoreTable = Arc<HashMap<String, Arc<BucketStore>>>;

/// TCP endpoint hosting one chain store per configured alias.
pub struct Server {
    /// Server configuration including bind address and served aliases
    config: Config,

    /// The chain stores, one per alias, shared across all connections
    stores: StoreTable,
}

impl Server {
    /// Create a new server instance serving the aliases named in `config`.
    pub fn new(config: Config) -> Self {
        let stores: HashMap<String, Arc<BucketStore>> = config
            .stores
            .iter()
            .map(|alias| (alias.clone(), Arc::new(BucketStore::new())))
            .collect();
        Self {
            config,
            stores: Arc::new(stores),
        }
    }

    /// The store backing `alias`, if this server serves it. Handy for
    /// inspection in tests and diagnostics.
    pub fn store(&self, alias: &str) -> Option<Arc<BucketStore>> {
        self.stores.get(alias).cloned()
    }

    /// Bind the configured address and serve until the process ends.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(
            "Chain store endpoint listening on {} serving {} store(s)",
            addr,
            self.stores.len()
        );
        self.run_on(listener).await
    }

    /// Serve connections accepted from an already-bound listener.
    ///
    /// Split from [`Server::run`] so tests can bind an ephemeral port and
    /// learn it before the accept loop starts.
    pub async fn run_on(self, listener: TcpListener) -> Result<()> {
        let max_frame = self.config.max_frame_bytes;
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    info!("Accepted connection from {}", addr);
                    let stores = Arc::clone(&self.stores);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, addr, stores, max_frame).await {
                            error!("Error handling connection from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

/// Process framed requests from one client until it disconnects.
async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    stores: StoreTable,
    max_frame: usize,
) -> Result<()> {
    socket.set_nodelay(true)?;
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut requests_served: u64 = 0;

    loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                info!(
                    "Client {} disconnected after {} request(s)",
                    addr, requests_served
                );
                break;
            }
            Err(e) => {
                error!("Error reading from client {}: {}", addr, e);
                break;
            }
        }

        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if frame_len > max_frame {
            // Oversized frames are refused without reading them; the stream
            // position is unrecoverable afterwards, so drop the connection.
            let refusal = Response::failure(
                status::BAD_REQUEST,
                format!("frame of {} bytes exceeds limit {}", frame_len, max_frame),
            );
            write_frame(&mut write_half, &refusal.encode()).await?;
            error!(
                "Dropping connection {}: frame too large ({} bytes)",
                addr, frame_len
            );
            break;
        }

        let mut frame = vec![0u8; frame_len];
        reader.read_exact(&mut frame).await?;
        requests_served += 1;

        let response = match Request::decode(&frame) {
            Ok(request) => dispatch(&stores, request),
            Err(CodecError::UnknownOpcode(op)) => Response::failure(
                status::UNSUPPORTED_OPCODE,
                format!("message opcode {} not supported by this endpoint", op),
            ),
            Err(e) => Response::failure(status::BAD_REQUEST, format!("malformed request: {}", e)),
        };

        write_frame(&mut write_half, &response.encode()).await?;
    }

    Ok(())
}

/// Route a decoded request to its store primitive.
fn dispatch(stores: &StoreTable, request: Request) -> Response {
    let Some(store) = stores.get(request.alias()) else {
        return Response::failure(
            status::STORE_UNAVAILABLE,
            format!("unknown store alias '{}'", request.alias()),
        );
    };

    match request {
        Request::Get { hash, .. } => Response::Chain(store.get(hash)),
        Request::Append { hash, blob, .. } => {
            store.append(hash, blob);
            Response::Chain(Chain::new())
        }
        Request::GetAndAppend { hash, blob, .. } => Response::Chain(store.get_and_append(hash, blob)),
        Request::ReplaceAtHead {
            hash,
            expected,
            replacement,
            alias,
        } => {
            let applied = store.replace_at_head(hash, &expected, replacement);
            debug!(
                "replace_at_head on '{}' bucket {:016x}: {}",
                alias,
                hash,
                if applied { "applied" } else { "ignored" }
            );
            Response::Chain(Chain::new())
        }
        Request::Clear { alias } => {
            store.clear();
            info!("Cleared store '{}'", alias);
            Response::Chain(Chain::new())
        }
    }
}

async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(&(frame.len() as u32).to_be_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(aliases: &[&str]) -> StoreTable {
        Arc::new(
            aliases
                .iter()
                .map(|a| (a.to_string(), Arc::new(BucketStore::new())))
                .collect(),
        )
    }

    #[test]
    fn test_dispatch_unknown_alias() {
        let stores = table(&["cache"]);
        let response = dispatch(
            &stores,
            Request::Get {
                alias: "nope".into(),
                hash: 1,
            },
        );
        assert!(matches!(
            response,
            Response::Failure {
                status: status::STORE_UNAVAILABLE,
                ..
            }
        ));
    }

    #[test]
    fn test_dispatch_get_and_append_cycle() {
        let stores = table(&["cache"]);
        let append = dispatch(
            &stores,
            Request::GetAndAppend {
                alias: "cache".into(),
                hash: 9,
                blob: vec![1, 2, 3],
            },
        );
        assert_eq!(append, Response::Chain(Chain::new()));

        let get = dispatch(
            &stores,
            Request::Get {
                alias: "cache".into(),
                hash: 9,
            },
        );
        assert_eq!(
            get,
            Response::Chain(Chain::from_blobs(vec![vec![1, 2, 3]]))
        );
    }

    #[test]
    fn test_dispatch_clear_is_per_alias() {
        let stores = table(&["a", "b"]);
        dispatch(
            &stores,
            Request::Append {
                alias: "a".into(),
                hash: 1,
                blob: vec![0],
            },
        );
        dispatch(
            &stores,
            Request::Append {
                alias: "b".into(),
                hash: 1,
                blob: vec![0],
            },
        );
        dispatch(&stores, Request::Clear { alias: "a".into() });

        assert_eq!(stores.get("a").unwrap().bucket_count(), 0);
        assert_eq!(stores.get("b").unwrap().bucket_count(), 1);
    }
}
