//! # Server Store Proxy
//!
//! The client-side facade over the entity protocol. Every caller-facing
//! operation becomes: serialize the key, hash it, encode the operation
//! blob, run one framed round-trip, fold the returned chain, answer.
//!
//! ## Conditional operations without server logic
//!
//! `getAndAppend` returns the chain that existed immediately before the
//! append. For a conditional operation (putIfAbsent, replace) the effect on
//! the final state is a pure function of that pre-chain and the operation
//! the proxy itself authored, so the proxy can truthfully report whether
//! the install happened: every other client that folds the chain later
//! applies the same operation the same way. The server only appends bytes.
//!
//! ## Concurrency
//!
//! The proxy is safe to share across tasks. Requests on the underlying
//! connection are serialized by an async mutex; the only suspension point
//! is the network round-trip, bounded by the configured deadline. A call
//! that times out after its bytes left the socket has an *unknown* outcome:
//! the server may have appended, and the next `get` will observe it.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::chain::Chain;
use crate::codec;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::hashing::key_hash;
use crate::message::{status, Request, Response};
use crate::operation::Operation;
use crate::resolver;
use crate::serializer::Serializer;

/// Upper bound on a response frame accepted by the proxy, mirroring the
/// server's request-side cap.
const MAX_RESPONSE_FRAME: usize = 8 * 1024 * 1024;

/// One framed request-response connection to the endpoint
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    /// Set when a round-trip was abandoned mid-frame (deadline expiry).
    /// The stream position is unknown afterwards, so the connection is
    /// unusable; the caller must reconnect.
    poisoned: bool,
}

impl Connection {
    /// Send one frame and read the next one back. Must run under the
    /// connection lock: the protocol is strictly one response per request.
    async fn round_trip(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        if self.poisoned {
            return Err(Error::connection(
                "connection abandoned mid-request by an earlier deadline; reconnect required",
            ));
        }
        self.writer
            .write_all(&(frame.len() as u32).to_be_bytes())
            .await?;
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_RESPONSE_FRAME {
            return Err(Error::connection(format!(
                "response frame of {} bytes exceeds limit {}",
                len, MAX_RESPONSE_FRAME
            )));
        }
        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await?;
        Ok(body)
    }
}

/// Strictly monotonic millisecond clock for operation timestamps.
///
/// Timestamps are diagnostics only; append order on the server is the only
/// order that matters. Ties within one millisecond are bumped so a single
/// proxy never stamps two operations identically.
struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    fn next(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}

/// Typed client for one named store on a chain cache endpoint.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use chain_cache::config::ClientConfig;
/// use chain_cache::proxy::ServerStoreProxy;
/// use chain_cache::serializer::{Serializer, StringSerializer};
///
/// # #[tokio::main]
/// # async fn main() -> chain_cache::error::Result<()> {
/// let serializer: Arc<dyn Serializer<String>> = Arc::new(StringSerializer);
/// let proxy = ServerStoreProxy::connect(
///     "127.0.0.1:7879",
///     "cache",
///     Arc::clone(&serializer),
///     serializer,
///     ClientConfig::default(),
/// )
/// .await?;
///
/// proxy.put(&"user:1".to_string(), &"ada".to_string()).await?;
/// let value = proxy.get(&"user:1".to_string()).await?;
/// # Ok(())
/// # }
/// ```
pub struct ServerStoreProxy<K, V> {
    alias: String,
    conn: Mutex<Connection>,
    key_serializer: Arc<dyn Serializer<K>>,
    value_serializer: Arc<dyn Serializer<V>>,
    request_timeout: Duration,
    compaction_threshold: usize,
    clock: MonotonicClock,
}

impl<K, V> ServerStoreProxy<K, V> {
    /// Connect to an endpoint and bind this proxy to one store alias.
    ///
    /// # Arguments
    /// * `addr` - Endpoint address in "host:port" form
    /// * `alias` - The named store all operations address
    /// * `key_serializer` / `value_serializer` - Byte codecs for K and V
    /// * `config` - Request deadline and compaction trigger
    pub async fn connect<A: Into<String>, S: Into<String>>(
        addr: A,
        alias: S,
        key_serializer: Arc<dyn Serializer<K>>,
        value_serializer: Arc<dyn Serializer<V>>,
        config: ClientConfig,
    ) -> Result<Self> {
        let addr = addr.into();
        let alias = alias.into();
        info!("Connecting to chain store endpoint at {}", addr);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::connection(format!("Failed to connect to {}: {}", addr, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

        let (read_half, write_half) = stream.into_split();
        info!("Connected to {} for store '{}'", addr, alias);

        Ok(Self {
            alias,
            conn: Mutex::new(Connection {
                reader: BufReader::new(read_half),
                writer: BufWriter::new(write_half),
                poisoned: false,
            }),
            key_serializer,
            value_serializer,
            request_timeout: config.request_timeout(),
            compaction_threshold: config.compaction_threshold,
            clock: MonotonicClock::new(),
        })
    }

    /// The store alias this proxy addresses
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Run one request under the deadline and map failure statuses into the
    /// error taxonomy.
    async fn invoke(&self, request: Request) -> Result<Chain> {
        let frame = request.encode();
        let mut conn = self.conn.lock().await;
        let outcome = timeout(self.request_timeout, conn.round_trip(&frame)).await;
        let body = match outcome {
            Ok(result) => result?,
            Err(_) => {
                conn.poisoned = true;
                return Err(Error::Timeout(self.request_timeout));
            }
        };
        drop(conn);

        match Response::decode(&body).map_err(|e| Error::protocol(e.to_string()))? {
            Response::Chain(chain) => Ok(chain),
            Response::Failure { status: s, message } => Err(match s {
                status::STORE_UNAVAILABLE => Error::unavailable(self.alias.clone(), message),
                status::UNSUPPORTED_OPCODE => Error::UnsupportedOpcode {
                    descriptor: message,
                },
                _ => Error::protocol(format!("status {}: {}", s, message)),
            }),
        }
    }

    /// Atomically append `op` to its bucket and return the pre-append
    /// chain together with the bucket hash.
    async fn get_and_append(&self, op: Operation) -> Result<(u64, Chain)> {
        let hash = key_hash(op.key());
        debug!(
            "get_and_append opcode {} on '{}' bucket {:016x}",
            op.opcode(),
            self.alias,
            hash
        );
        let chain = self
            .invoke(Request::GetAndAppend {
                alias: self.alias.clone(),
                hash,
                blob: codec::encode(&op),
            })
            .await?;
        Ok((hash, chain))
    }

    /// Fire one unconditional operation without fetching the pre-chain.
    async fn append(&self, op: Operation) -> Result<()> {
        let hash = key_hash(op.key());
        debug!(
            "append opcode {} on '{}' bucket {:016x}",
            op.opcode(),
            self.alias,
            hash
        );
        self.invoke(Request::Append {
            alias: self.alias.clone(),
            hash,
            blob: codec::encode(&op),
        })
        .await?;
        Ok(())
    }

    /// Propose head compaction when a returned chain has grown past the
    /// threshold. Advisory: every failure is logged and swallowed, and a
    /// server-side prefix mismatch is already silent.
    async fn maybe_compact(&self, hash: u64, chain: &Chain) {
        if self.compaction_threshold == 0 || chain.len() < self.compaction_threshold {
            return;
        }
        let replacement = match resolver::compact(chain) {
            Ok(compacted) if compacted.len() < chain.len() => compacted,
            Ok(_) => return,
            Err(e) => {
                warn!("skipping compaction of bucket {:016x}: {}", hash, e);
                return;
            }
        };
        let request = Request::ReplaceAtHead {
            alias: self.alias.clone(),
            hash,
            expected: chain.clone(),
            replacement,
        };
        if let Err(e) = self.invoke(request).await {
            warn!("compaction advisory for bucket {:016x} failed: {}", hash, e);
        }
    }

    fn deserialize_value(&self, bytes: Option<Vec<u8>>) -> Result<Option<V>> {
        match bytes {
            Some(bytes) => Ok(Some(self.value_serializer.deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get the current value mapped to `key`.
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        let key_bytes = self.key_serializer.serialize(key)?;
        let hash = key_hash(&key_bytes);
        let chain = self
            .invoke(Request::Get {
                alias: self.alias.clone(),
                hash,
            })
            .await?;
        let value = resolver::resolve(&chain, &key_bytes)?;
        self.maybe_compact(hash, &chain).await;
        self.deserialize_value(value)
    }

    /// Unconditionally map `key` to `value`.
    pub async fn put(&self, key: &K, value: &V) -> Result<()> {
        let key_bytes = self.key_serializer.serialize(key)?;
        let value_bytes = self.value_serializer.serialize(value)?;
        self.append(Operation::Put {
            key: key_bytes,
            value: value_bytes,
            timestamp: self.clock.next(),
        })
        .await
    }

    /// Unconditionally remove any mapping for `key`.
    pub async fn remove(&self, key: &K) -> Result<()> {
        let key_bytes = self.key_serializer.serialize(key)?;
        self.append(Operation::Remove {
            key: key_bytes,
            timestamp: self.clock.next(),
        })
        .await
    }

    /// Map `key` to `value` only if it has no current mapping.
    ///
    /// Returns `None` when the install happened, or the pre-existing value
    /// when it did not.
    pub async fn put_if_absent(&self, key: &K, value: &V) -> Result<Option<V>> {
        let key_bytes = self.key_serializer.serialize(key)?;
        let value_bytes = self.value_serializer.serialize(value)?;
        let op = Operation::PutIfAbsent {
            key: key_bytes.clone(),
            value: value_bytes,
            timestamp: self.clock.next(),
        };
        let (hash, pre_chain) = self.get_and_append(op).await?;
        let prev = resolver::resolve(&pre_chain, &key_bytes)?;
        self.maybe_compact(hash, &pre_chain).await;
        self.deserialize_value(prev)
    }

    /// Map `key` to `value` only if it has some current mapping.
    ///
    /// Returns the value the key held before the call, which is also the
    /// verdict: `Some` means the replace took effect.
    pub async fn replace(&self, key: &K, value: &V) -> Result<Option<V>> {
        let key_bytes = self.key_serializer.serialize(key)?;
        let value_bytes = self.value_serializer.serialize(value)?;
        let op = Operation::Replace {
            key: key_bytes.clone(),
            value: value_bytes,
            timestamp: self.clock.next(),
        };
        let (hash, pre_chain) = self.get_and_append(op).await?;
        let prev = resolver::resolve(&pre_chain, &key_bytes)?;
        self.maybe_compact(hash, &pre_chain).await;
        self.deserialize_value(prev)
    }

    /// Map `key` to `new_value` only if its current value equals
    /// `old_value` by serialized byte equality. Returns whether the swap
    /// took effect.
    pub async fn replace_conditional(
        &self,
        key: &K,
        old_value: &V,
        new_value: &V,
    ) -> Result<bool> {
        let key_bytes = self.key_serializer.serialize(key)?;
        let old_bytes = self.value_serializer.serialize(old_value)?;
        let new_bytes = self.value_serializer.serialize(new_value)?;
        let op = Operation::ReplaceConditional {
            key: key_bytes.clone(),
            old_value: old_bytes.clone(),
            new_value: new_bytes,
            timestamp: self.clock.next(),
        };
        let (hash, pre_chain) = self.get_and_append(op).await?;
        let prev = resolver::resolve(&pre_chain, &key_bytes)?;
        self.maybe_compact(hash, &pre_chain).await;
        Ok(prev.as_deref() == Some(old_bytes.as_slice()))
    }

    /// Drop every mapping in the store.
    pub async fn clear(&self) -> Result<()> {
        self.invoke(Request::Clear {
            alias: self.alias.clone(),
        })
        .await?;
        Ok(())
    }

    /// Recompute the mapping of every key in `keys` with `remap`.
    ///
    /// Each key is updated atomically with an optimistic loop: the proxy
    /// resolves the current value, applies `remap`, and appends through
    /// one `getAndAppend` the operation whose effect is conditioned on the
    /// observed value: `PUT_IF_ABSENT` to install on an absent key,
    /// `REPLACE_CONDITIONAL` to swap a mapped one, `REMOVE` to delete.
    /// The returned pre-chain proves whether the observation still held at
    /// the append; if a concurrent writer got in first, the conditional
    /// operations fold to no-ops and the proxy retries `remap` against the
    /// state the chain actually holds. The batch as a whole is not atomic,
    /// and keys may be interleaved with other clients' mutations. Per-key
    /// failures are collected in the result map and never abort the rest
    /// of the batch.
    pub async fn bulk_compute<F>(&self, keys: Vec<K>, remap: F) -> HashMap<K, Result<Option<V>>>
    where
        K: Eq + Hash,
        F: Fn(&K, Option<V>) -> Option<V>,
    {
        let mut results = HashMap::with_capacity(keys.len());
        for key in keys {
            let outcome = self.compute_one(&key, &remap).await;
            results.insert(key, outcome);
        }
        results
    }

    async fn compute_one<F>(&self, key: &K, remap: &F) -> Result<Option<V>>
    where
        F: Fn(&K, Option<V>) -> Option<V>,
    {
        let key_bytes = self.key_serializer.serialize(key)?;
        let hash = key_hash(&key_bytes);

        // Seed the loop with the current state; every mutation below is a
        // single getAndAppend whose pre-chain verifies the premise.
        let chain = self
            .invoke(Request::Get {
                alias: self.alias.clone(),
                hash,
            })
            .await?;
        let mut observed = resolver::resolve(&chain, &key_bytes)?;

        loop {
            let prev = self.deserialize_value(observed.clone())?;
            let next = remap(key, prev);
            let next_bytes = match &next {
                Some(value) => Some(self.value_serializer.serialize(value)?),
                None => None,
            };

            let op = match (observed.as_ref(), next_bytes.as_ref()) {
                // Absent stays absent: nothing to append.
                (None, None) => return Ok(None),
                (None, Some(new)) => Operation::PutIfAbsent {
                    key: key_bytes.clone(),
                    value: new.clone(),
                    timestamp: self.clock.next(),
                },
                (Some(old), Some(new)) => Operation::ReplaceConditional {
                    key: key_bytes.clone(),
                    old_value: old.clone(),
                    new_value: new.clone(),
                    timestamp: self.clock.next(),
                },
                (Some(_), None) => Operation::Remove {
                    key: key_bytes.clone(),
                    timestamp: self.clock.next(),
                },
            };

            let (hash, pre_chain) = self.get_and_append(op.clone()).await?;
            let actual = resolver::resolve(&pre_chain, &key_bytes)?;
            self.maybe_compact(hash, &pre_chain).await;

            if actual == observed {
                return Ok(next);
            }

            // A concurrent writer won the race. The conditional operation
            // folded to a no-op against the unexpected value, so the chain
            // now holds whatever our operation left of `actual`; retry the
            // remap from there.
            debug!(
                "bulk_compute raced on bucket {:016x}, retrying against the winning value",
                hash
            );
            observed = op.apply(actual);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_strictly_monotonic() {
        let clock = MonotonicClock::new();
        let mut last = 0;
        for _ in 0..10_000 {
            let next = clock.next();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_clock_tracks_wall_time() {
        let clock = MonotonicClock::new();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        assert!(clock.next() >= now);
    }
}
