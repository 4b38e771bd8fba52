//! Direct client over the `redis` crate.
//!
//! Connects, authenticates, and selects the database as three separate
//! steps, translating each step's failure into its own taxonomy variant.
//! Command errors after connect go through the `From<redis::RedisError>`
//! fallback translation.

use super::{parse_info, Reply, ServerInfo, StoreClient};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::types::KeyType;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// One request's connection, authenticated and database-selected.
pub struct DirectClient {
    conn: MultiplexedConnection,
}

impl DirectClient {
    /// Connect to the configured server.
    ///
    /// # Errors
    /// - `Error::Connection` on socket failure or connect timeout
    /// - `Error::Auth` when credentials are rejected
    /// - `Error::DatabaseSelect` when the database index is invalid
    pub async fn connect(server: &ServerConfig) -> Result<Self> {
        let client = redis::Client::open(server.url()).map_err(|e| {
            Error::Config(format!("invalid server address {}: {}", server.label(), e))
        })?;

        let conn = tokio::time::timeout(
            server.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            Error::Connection(format!(
                "timed out connecting to {} after {:?}",
                server.label(),
                server.connect_timeout
            ))
        })?
        .map_err(|e| {
            Error::Connection(format!("failed to connect to {}: {}", server.label(), e))
        })?;

        let mut this = DirectClient { conn };

        if let Some(password) = &server.password {
            let mut cmd = redis::cmd("AUTH");
            if let Some(username) = &server.username {
                cmd.arg(username);
            }
            cmd.arg(password);
            cmd.query_async::<()>(&mut this.conn).await.map_err(|e| {
                Error::Auth(format!(
                    "could not authenticate with {}: {}",
                    server.label(),
                    e
                ))
            })?;
        }

        redis::cmd("SELECT")
            .arg(server.database)
            .query_async::<()>(&mut this.conn)
            .await
            .map_err(|e| {
                Error::DatabaseSelect(format!(
                    "could not select database {} on {}: {}",
                    server.database,
                    server.label(),
                    e
                ))
            })?;

        debug!("connected to {} (db {})", server.label(), server.database);
        Ok(this)
    }
}

impl StoreClient for DirectClient {
    fn client_kind(&self) -> &'static str {
        "redis"
    }

    async fn key_type(&mut self, key: &[u8]) -> Result<KeyType> {
        let reported: String = redis::cmd("TYPE")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;

        if reported == "none" {
            return Err(Error::TypeLookup(format!(
                "key \"{}\" no longer exists",
                String::from_utf8_lossy(key)
            )));
        }

        Ok(reported.parse().unwrap_or(KeyType::Unknown))
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self.conn.keys(pattern).await?)
    }

    async fn server_info(&mut self, section: Option<&str>) -> Result<ServerInfo> {
        let mut cmd = redis::cmd("INFO");
        if let Some(section) = section {
            cmd.arg(section);
        }
        let raw: String = cmd.query_async(&mut self.conn).await?;
        Ok(parse_info(&raw))
    }

    async fn database_count(&mut self) -> Result<u32> {
        let pair: Vec<String> = redis::cmd("CONFIG")
            .arg("GET")
            .arg("databases")
            .query_async(&mut self.conn)
            .await?;

        pair.get(1)
            .and_then(|count| count.parse().ok())
            .ok_or_else(|| Error::Client("unexpected CONFIG GET databases reply".to_string()))
    }

    async fn db_size(&mut self) -> Result<u64> {
        Ok(redis::cmd("DBSIZE").query_async(&mut self.conn).await?)
    }

    async fn ttl(&mut self, key: &[u8]) -> Result<i64> {
        Ok(self.conn.ttl(key).await?)
    }

    async fn set_expire(&mut self, key: &[u8], seconds: i64) -> Result<()> {
        if seconds < 0 {
            self.conn.persist::<_, bool>(key).await?;
        } else {
            self.conn.expire::<_, bool>(key, seconds).await?;
        }
        Ok(())
    }

    async fn exists(&mut self, key: &[u8]) -> Result<u64> {
        Ok(redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut self.conn)
            .await?)
    }

    async fn delete(&mut self, keys: &[&[u8]]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(*key);
        }
        Ok(cmd.query_async(&mut self.conn).await?)
    }

    async fn dump(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(redis::cmd("DUMP")
            .arg(key)
            .query_async(&mut self.conn)
            .await?)
    }

    async fn restore(&mut self, key: &[u8], ttl_ms: u64, blob: &[u8]) -> Result<bool> {
        let reply: String = redis::cmd("RESTORE")
            .arg(key)
            .arg(ttl_ms)
            .arg(blob)
            .query_async(&mut self.conn)
            .await?;
        Ok(reply == "OK")
    }

    async fn flush_db(&mut self) -> Result<bool> {
        let reply: String = redis::cmd("FLUSHDB").query_async(&mut self.conn).await?;
        warn!("FLUSHDB executed on current database");
        Ok(reply == "OK")
    }

    async fn raw_command(&mut self, args: &[&[u8]]) -> Result<Reply> {
        let mut cmd = redis::Cmd::new();
        for arg in args {
            cmd.arg(*arg);
        }
        let value: redis::Value = cmd.query_async(&mut self.conn).await?;
        Ok(convert_reply(value))
    }

    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.conn.get(key).await?)
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn list_len(&mut self, key: &[u8]) -> Result<u64> {
        Ok(self.conn.llen(key).await?)
    }

    async fn list_range(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.conn.lrange(key, 0, -1).await?)
    }

    async fn list_index(&mut self, key: &[u8], index: i64) -> Result<Option<Vec<u8>>> {
        Ok(self.conn.lindex(key, index as isize).await?)
    }

    async fn list_push(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn.rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn list_set(&mut self, key: &[u8], index: i64, value: &[u8]) -> Result<()> {
        self.conn.lset::<_, _, ()>(key, index as isize, value).await?;
        Ok(())
    }

    async fn list_rem(&mut self, key: &[u8], value: &[u8], count: i64) -> Result<u64> {
        // This library wants (key, count, value).
        Ok(self.conn.lrem(key, count as isize, value).await?)
    }

    async fn set_members(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.conn.smembers(key).await?)
    }

    async fn set_card(&mut self, key: &[u8]) -> Result<u64> {
        Ok(self.conn.scard(key).await?)
    }

    async fn set_add(&mut self, key: &[u8], member: &[u8]) -> Result<()> {
        self.conn.sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn set_rem(&mut self, key: &[u8], member: &[u8]) -> Result<u64> {
        Ok(self.conn.srem(key, member).await?)
    }

    async fn zset_range(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.conn.zrange(key, 0, -1).await?)
    }

    async fn zset_card(&mut self, key: &[u8]) -> Result<u64> {
        Ok(self.conn.zcard(key).await?)
    }

    async fn zset_add(&mut self, key: &[u8], score: f64, member: &[u8]) -> Result<()> {
        // This library wants (key, member, score); the wire order is
        // (key, score, member).
        self.conn.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    async fn zset_rem(&mut self, key: &[u8], member: &[u8]) -> Result<u64> {
        Ok(self.conn.zrem(key, member).await?)
    }

    async fn zset_score(&mut self, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
        Ok(self.conn.zscore(key, member).await?)
    }

    async fn hash_all(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.conn.hgetall(key).await?)
    }

    async fn hash_len(&mut self, key: &[u8]) -> Result<u64> {
        Ok(self.conn.hlen(key).await?)
    }

    async fn hash_get(&mut self, key: &[u8], field: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.conn.hget(key, field).await?)
    }

    async fn hash_set(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> Result<()> {
        self.conn.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hash_del(&mut self, key: &[u8], field: &[u8]) -> Result<u64> {
        Ok(self.conn.hdel(key, field).await?)
    }
}

fn convert_reply(value: redis::Value) -> Reply {
    match value {
        redis::Value::Nil => Reply::Nil,
        redis::Value::Int(n) => Reply::Int(n),
        redis::Value::BulkString(data) => Reply::Data(data),
        redis::Value::SimpleString(s) => Reply::Simple(s),
        redis::Value::Okay => Reply::Simple("OK".to_string()),
        redis::Value::Array(items) => {
            Reply::Array(items.into_iter().map(convert_reply).collect())
        }
        // Anything fancier has no typed accessor caller; callers must
        // tolerate an absent result.
        _ => Reply::Nil,
    }
}
