//! Pooled client over `deadpool-redis`.
//!
//! Unlike the direct client, this library owns connection setup:
//! credentials and the database index are baked into the pool URL, so
//! auth and select failures all surface from the same first checkout
//! and have to be classified after the fact by inspecting the
//! underlying error. That asymmetry is exactly what the shared taxonomy
//! hides from the engine.

use super::{parse_info, Reply, ServerInfo, StoreClient};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::types::KeyType;
use deadpool_redis::redis::{cmd, AsyncCommands, ErrorKind};
use deadpool_redis::{Config as PoolConfig, Connection, Pool, PoolError, Runtime};

/// The engine issues commands sequentially, so one request never needs
/// more than one live connection.
const POOL_SIZE: usize = 1;

/// One request's pool handle; connections are checked out per call.
pub struct PooledClient {
    pool: Pool,
}

impl PooledClient {
    /// Create the pool and verify it with a first checkout and PING so
    /// connect, auth, and select failures surface now instead of on the
    /// first real command.
    ///
    /// # Errors
    /// - `Error::Connection` on socket failure or connect timeout
    /// - `Error::Auth` when credentials are rejected
    /// - `Error::DatabaseSelect` when the database index is invalid
    pub async fn connect(server: &ServerConfig) -> Result<Self> {
        let mut cfg = PoolConfig::from_url(server.url_with_auth());
        cfg.pool = Some(deadpool_redis::PoolConfig::new(POOL_SIZE));

        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            Error::Config(format!(
                "failed to create pool for {}: {}",
                server.label(),
                e
            ))
        })?;

        let mut conn = tokio::time::timeout(server.connect_timeout, pool.get())
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "timed out connecting to {} after {:?}",
                    server.label(),
                    server.connect_timeout
                ))
            })?
            .map_err(|e| classify_checkout_error(server, e))?;

        cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                Error::Connection(format!("failed to reach {}: {}", server.label(), e))
            })?;

        debug!("connected to {} (db {})", server.label(), server.database);
        Ok(PooledClient { pool })
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool.get().await.map_err(Error::from)
    }
}

/// Classification table for first-checkout failures: the pool reports
/// one opaque error for what the direct client sees as three distinct
/// steps.
fn classify_checkout_error(server: &ServerConfig, e: PoolError) -> Error {
    match e {
        PoolError::Backend(redis_err) => {
            let message = redis_err.to_string();
            if redis_err.kind() == ErrorKind::AuthenticationFailed
                || message.contains("WRONGPASS")
                || message.contains("NOAUTH")
            {
                Error::Auth(format!(
                    "could not authenticate with {}: {}",
                    server.label(),
                    message
                ))
            } else if message.contains("DB index") || message.contains("SELECT") {
                Error::DatabaseSelect(format!(
                    "could not select database {} on {}: {}",
                    server.database,
                    server.label(),
                    message
                ))
            } else {
                Error::Connection(format!(
                    "failed to connect to {}: {}",
                    server.label(),
                    message
                ))
            }
        }
        other => Error::Connection(format!(
            "failed to connect to {}: {}",
            server.label(),
            other
        )),
    }
}

impl StoreClient for PooledClient {
    fn client_kind(&self) -> &'static str {
        "pooled"
    }

    async fn key_type(&mut self, key: &[u8]) -> Result<KeyType> {
        let mut conn = self.conn().await?;
        let reported: String = cmd("TYPE")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))?;

        if reported == "none" {
            return Err(Error::TypeLookup(format!(
                "key \"{}\" no longer exists",
                String::from_utf8_lossy(key)
            )));
        }

        Ok(reported.parse().unwrap_or(KeyType::Unknown))
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.keys(pattern)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn server_info(&mut self, section: Option<&str>) -> Result<ServerInfo> {
        let mut conn = self.conn().await?;
        let mut info_cmd = cmd("INFO");
        if let Some(section) = section {
            info_cmd.arg(section);
        }
        let raw: String = info_cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(parse_info(&raw))
    }

    async fn database_count(&mut self) -> Result<u32> {
        let mut conn = self.conn().await?;
        let pair: Vec<String> = cmd("CONFIG")
            .arg("GET")
            .arg("databases")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))?;

        pair.get(1)
            .and_then(|count| count.parse().ok())
            .ok_or_else(|| Error::Client("unexpected CONFIG GET databases reply".to_string()))
    }

    async fn db_size(&mut self) -> Result<u64> {
        let mut conn = self.conn().await?;
        cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn ttl(&mut self, key: &[u8]) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.ttl(key).await.map_err(|e| Error::Client(e.to_string()))
    }

    async fn set_expire(&mut self, key: &[u8], seconds: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        if seconds < 0 {
            conn.persist::<_, bool>(key)
                .await
                .map_err(|e| Error::Client(e.to_string()))?;
        } else {
            conn.expire::<_, bool>(key, seconds)
                .await
                .map_err(|e| Error::Client(e.to_string()))?;
        }
        Ok(())
    }

    async fn exists(&mut self, key: &[u8]) -> Result<u64> {
        let mut conn = self.conn().await?;
        cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn delete(&mut self, keys: &[&[u8]]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let mut del = cmd("DEL");
        for key in keys {
            del.arg(*key);
        }
        del.query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn dump(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        cmd("DUMP")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn restore(&mut self, key: &[u8], ttl_ms: u64, blob: &[u8]) -> Result<bool> {
        let mut conn = self.conn().await?;
        let reply: String = cmd("RESTORE")
            .arg(key)
            .arg(ttl_ms)
            .arg(blob)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(reply == "OK")
    }

    async fn flush_db(&mut self) -> Result<bool> {
        let mut conn = self.conn().await?;
        let reply: String = cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))?;
        warn!("FLUSHDB executed on current database");
        Ok(reply == "OK")
    }

    async fn raw_command(&mut self, args: &[&[u8]]) -> Result<Reply> {
        let mut conn = self.conn().await?;
        let mut raw = deadpool_redis::redis::Cmd::new();
        for arg in args {
            raw.arg(*arg);
        }
        let value: deadpool_redis::redis::Value = raw
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(convert_reply(value))
    }

    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(|e| Error::Client(e.to_string()))
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn list_len(&mut self, key: &[u8]) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.llen(key).await.map_err(|e| Error::Client(e.to_string()))
    }

    async fn list_range(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.lrange(key, 0, -1)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn list_index(&mut self, key: &[u8], index: i64) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.lindex(key, index as isize)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn list_push(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.rpush::<_, _, ()>(key, value)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn list_set(&mut self, key: &[u8], index: i64, value: &[u8]) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.lset::<_, _, ()>(key, index as isize, value)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn list_rem(&mut self, key: &[u8], value: &[u8], count: i64) -> Result<u64> {
        let mut conn = self.conn().await?;
        // Same (key, count, value) order quirk as the direct library.
        conn.lrem(key, count as isize, value)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn set_members(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.smembers(key)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn set_card(&mut self, key: &[u8]) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.scard(key).await.map_err(|e| Error::Client(e.to_string()))
    }

    async fn set_add(&mut self, key: &[u8], member: &[u8]) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn set_rem(&mut self, key: &[u8], member: &[u8]) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.srem(key, member)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn zset_range(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.zrange(key, 0, -1)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn zset_card(&mut self, key: &[u8]) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.zcard(key).await.map_err(|e| Error::Client(e.to_string()))
    }

    async fn zset_add(&mut self, key: &[u8], score: f64, member: &[u8]) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn zset_rem(&mut self, key: &[u8], member: &[u8]) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.zrem(key, member)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn zset_score(&mut self, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
        let mut conn = self.conn().await?;
        conn.zscore(key, member)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn hash_all(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut conn = self.conn().await?;
        conn.hgetall(key)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn hash_len(&mut self, key: &[u8]) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.hlen(key).await.map_err(|e| Error::Client(e.to_string()))
    }

    async fn hash_get(&mut self, key: &[u8], field: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.hget(key, field)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn hash_set(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }

    async fn hash_del(&mut self, key: &[u8], field: &[u8]) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.hdel(key, field)
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }
}

fn convert_reply(value: deadpool_redis::redis::Value) -> Reply {
    use deadpool_redis::redis::Value;

    match value {
        Value::Nil => Reply::Nil,
        Value::Int(n) => Reply::Int(n),
        Value::BulkString(data) => Reply::Data(data),
        Value::SimpleString(s) => Reply::Simple(s),
        Value::Okay => Reply::Simple("OK".to_string()),
        Value::Array(items) => Reply::Array(items.into_iter().map(convert_reply).collect()),
        _ => Reply::Nil,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkout_refused_is_connection_error() {
        let server = ServerConfig {
            port: 1,
            connect_timeout: std::time::Duration::from_millis(500),
            ..Default::default()
        };

        match PooledClient::connect(&server).await {
            Err(Error::Connection(_)) => {}
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
    }
}
