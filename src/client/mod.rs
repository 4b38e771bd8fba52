//! Client implementations behind one uniform contract.
//!
//! Each supported client library gets one [`StoreClient`] impl, and the
//! impl is where that library's error convention, return shapes, and
//! connection parameters are normalized; nothing library-specific
//! crosses into the key operations engine.
//!
//! The active client is feature-detected at build time through
//! [`connect`], first available wins: `direct` (the `redis` crate),
//! then `pooled` (`deadpool-redis`), then the in-process `memory`
//! client.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::types::KeyType;
use std::collections::BTreeMap;

#[cfg(feature = "direct")]
pub mod direct;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "pooled")]
pub mod pooled;

#[cfg(feature = "direct")]
pub use direct::DirectClient;
#[cfg(feature = "memory")]
pub use memory::MemoryClient;
#[cfg(feature = "pooled")]
pub use pooled::PooledClient;

/// Nested server-statistics snapshot: section name to key/value pairs.
pub type ServerInfo = BTreeMap<String, BTreeMap<String, String>>;

/// Minimal reply shape for [`StoreClient::raw_command`].
///
/// Only used for capabilities with no typed accessor; callers must
/// tolerate [`Reply::Nil`] when the store lacks the command.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Nil,
    Int(i64),
    Data(Vec<u8>),
    Simple(String),
    Array(Vec<Reply>),
}

/// Uniform capability contract over one connected, authenticated,
/// database-selected client.
///
/// A value implementing this trait is owned by exactly one request and
/// dropped at its end; nothing is shared across requests. All methods
/// are async and awaited sequentially by the engine.
#[allow(async_fn_in_trait)]
pub trait StoreClient {
    /// Human label of the active client library, for the info panel.
    fn client_kind(&self) -> &'static str;

    /// Resolve a key's value type.
    ///
    /// # Errors
    /// `Error::TypeLookup` when the key does not exist (vanished between
    /// listing and inspection).
    async fn key_type(&mut self, key: &[u8]) -> Result<KeyType>;

    /// List keys matching the store's native glob pattern.
    ///
    /// An empty match is `Ok(vec![])`, never an error.
    async fn keys(&mut self, pattern: &str) -> Result<Vec<Vec<u8>>>;

    /// Server-statistics snapshot. `section` is a pass-through hint;
    /// implementations may return more than requested.
    async fn server_info(&mut self, section: Option<&str>) -> Result<ServerInfo>;

    /// Number of databases the server exposes.
    async fn database_count(&mut self) -> Result<u32>;

    /// Key count of the currently selected database.
    async fn db_size(&mut self) -> Result<u64>;

    /// TTL in seconds; -1 when the key has no expiry, -2 when it does
    /// not exist.
    async fn ttl(&mut self, key: &[u8]) -> Result<i64>;

    /// Set a TTL in seconds; any negative value clears an existing TTL.
    async fn set_expire(&mut self, key: &[u8], seconds: i64) -> Result<()>;

    /// Existence count (0 or 1 for a single key).
    async fn exists(&mut self, key: &[u8]) -> Result<u64>;

    /// Delete keys, returning how many existed.
    async fn delete(&mut self, keys: &[&[u8]]) -> Result<u64>;

    /// Native binary serialization of one key's full value; `None` when
    /// the key does not exist.
    async fn dump(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Recreate a key from a [`dump`](StoreClient::dump) blob.
    /// `ttl_ms` of 0 means no expiry.
    async fn restore(&mut self, key: &[u8], ttl_ms: u64, blob: &[u8]) -> Result<bool>;

    /// Remove every key from the currently selected database only.
    async fn flush_db(&mut self) -> Result<bool>;

    /// Raw command passthrough for capabilities with no typed accessor.
    async fn raw_command(&mut self, args: &[&[u8]]) -> Result<Reply>;

    /// Approximate memory footprint of a key.
    ///
    /// `Ok(None)` when the store lacks the capability: an optional
    /// feature gap, not an error.
    async fn memory_usage(&mut self, key: &[u8]) -> Result<Option<u64>> {
        match self.raw_command(&[b"MEMORY", b"USAGE", key]).await {
            Ok(Reply::Int(n)) if n >= 0 => Ok(Some(n as u64)),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!("memory usage unavailable: {}", e);
                Ok(None)
            }
        }
    }

    // --- scalar ---

    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    // --- list ---

    async fn list_len(&mut self, key: &[u8]) -> Result<u64>;
    async fn list_range(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>>;
    async fn list_index(&mut self, key: &[u8], index: i64) -> Result<Option<Vec<u8>>>;
    async fn list_push(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
    async fn list_set(&mut self, key: &[u8], index: i64, value: &[u8]) -> Result<()>;

    /// Remove occurrences of `value`. Argument order is normalized here;
    /// the underlying libraries disagree on it. Negative `count` removes
    /// from the tail.
    async fn list_rem(&mut self, key: &[u8], value: &[u8], count: i64) -> Result<u64>;

    // --- set ---

    async fn set_members(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>>;
    async fn set_card(&mut self, key: &[u8]) -> Result<u64>;
    async fn set_add(&mut self, key: &[u8], member: &[u8]) -> Result<()>;
    async fn set_rem(&mut self, key: &[u8], member: &[u8]) -> Result<u64>;

    // --- sorted set ---

    /// Members in score order, without scores; scores are looked up per
    /// member with [`zset_score`](StoreClient::zset_score).
    async fn zset_range(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>>;
    async fn zset_card(&mut self, key: &[u8]) -> Result<u64>;
    async fn zset_add(&mut self, key: &[u8], score: f64, member: &[u8]) -> Result<()>;
    async fn zset_rem(&mut self, key: &[u8], member: &[u8]) -> Result<u64>;
    async fn zset_score(&mut self, key: &[u8], member: &[u8]) -> Result<Option<f64>>;

    // --- hash ---

    async fn hash_all(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
    async fn hash_len(&mut self, key: &[u8]) -> Result<u64>;
    async fn hash_get(&mut self, key: &[u8], field: &[u8]) -> Result<Option<Vec<u8>>>;
    async fn hash_set(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> Result<()>;
    async fn hash_del(&mut self, key: &[u8], field: &[u8]) -> Result<u64>;
}

/// Connect to the first available client implementation.
///
/// Selection is a build-time feature probe, mirroring how the original
/// tool picks whichever client library is installed.
#[cfg(feature = "direct")]
pub async fn connect(server: &ServerConfig) -> Result<DirectClient> {
    DirectClient::connect(server).await
}

#[cfg(all(feature = "pooled", not(feature = "direct")))]
pub async fn connect(server: &ServerConfig) -> Result<PooledClient> {
    PooledClient::connect(server).await
}

#[cfg(all(
    feature = "memory",
    not(feature = "direct"),
    not(feature = "pooled")
))]
pub async fn connect(server: &ServerConfig) -> Result<MemoryClient> {
    MemoryClient::connect(server)
}

/// Parse the text form of an INFO reply into sections.
///
/// Lines starting with `#` open a section; other lines split once at
/// `:`. Keys before any section header land in a `""` section.
#[cfg(any(feature = "direct", feature = "pooled"))]
pub(crate) fn parse_info(raw: &str) -> ServerInfo {
    let mut info = ServerInfo::new();
    let mut section = String::new();

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');

        if let Some(header) = line.strip_prefix('#') {
            section = header.trim().to_lowercase();
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            info.entry(section.clone())
                .or_default()
                .insert(key.to_string(), value.to_string());
        }
    }

    info
}
