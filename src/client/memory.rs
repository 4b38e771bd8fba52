//! In-process client (default, thread-safe, async).
//!
//! Implements the full typed contract against a DashMap so the engine
//! can run embedded and under test without a live server. TTL
//! expiration is handled lazily on access.

use super::{Reply, ServerInfo, StoreClient};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::types::KeyType;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fixed database count, matching the common server default.
const DATABASES: u32 = 16;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum StoredValue {
    String(Vec<u8>),
    List(Vec<Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
    /// Kept sorted by (score, member).
    ZSet(Vec<(Vec<u8>, f64)>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
}

impl StoredValue {
    fn key_type(&self) -> KeyType {
        match self {
            StoredValue::String(_) => KeyType::String,
            StoredValue::List(_) => KeyType::List,
            StoredValue::Set(_) => KeyType::Set,
            StoredValue::ZSet(_) => KeyType::ZSet,
            StoredValue::Hash(_) => KeyType::Hash,
        }
    }

    fn approx_bytes(&self) -> u64 {
        let payload = match self {
            StoredValue::String(v) => v.len(),
            StoredValue::List(items) => items.iter().map(Vec::len).sum(),
            StoredValue::Set(members) => members.iter().map(Vec::len).sum(),
            StoredValue::ZSet(entries) => entries.iter().map(|(m, _)| m.len() + 8).sum(),
            StoredValue::Hash(fields) => fields.iter().map(|(f, v)| f.len() + v.len()).sum(),
        };
        payload as u64
    }
}

struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: StoredValue) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }

    /// Remaining TTL in whole seconds, rounded up; -1 without expiry.
    fn ttl_secs(&self) -> i64 {
        match self.expires_at {
            None => -1,
            Some(exp) => {
                let now = Instant::now();
                if exp <= now {
                    0
                } else {
                    let left = exp - now;
                    let mut secs = left.as_secs() as i64;
                    if left.subsec_nanos() > 0 {
                        secs += 1;
                    }
                    secs
                }
            }
        }
    }
}

/// Thread-safe in-process store client.
///
/// `Clone` shares the underlying store, which is how tests seed data
/// while the engine owns its own handle.
#[derive(Clone)]
pub struct MemoryClient {
    store: Arc<DashMap<(u32, Vec<u8>), Entry>>,
    db: u32,
    started: Instant,
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("db", &self.db)
            .field("entries", &self.store.len())
            .finish()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        MemoryClient {
            store: Arc::new(DashMap::new()),
            db: 0,
            started: Instant::now(),
        }
    }

    /// "Connect" against a server config: validates the database index
    /// the way a real client's SELECT would.
    pub fn connect(server: &ServerConfig) -> Result<Self> {
        let client = MemoryClient::new();
        client.select(server.database)
    }

    /// Re-target a shared store at another database index.
    pub fn select(mut self, db: u32) -> Result<Self> {
        if db >= DATABASES {
            return Err(Error::DatabaseSelect(format!(
                "DB index {} is out of range",
                db
            )));
        }
        self.db = db;
        Ok(self)
    }

    fn slot(&self, key: &[u8]) -> (u32, Vec<u8>) {
        (self.db, key.to_vec())
    }

    /// Drop the entry if expired; returns whether a live entry remains.
    fn prune(&self, key: &[u8]) -> bool {
        let slot = self.slot(key);
        let expired = match self.store.get(&slot) {
            Some(entry) => entry.is_expired(),
            None => return false,
        };
        if expired {
            self.store.remove(&slot);
            return false;
        }
        true
    }

    fn read<T>(&self, key: &[u8], f: impl FnOnce(&StoredValue) -> Result<T>) -> Result<T>
    where
        T: Default,
    {
        if !self.prune(key) {
            return Ok(T::default());
        }
        match self.store.get(&self.slot(key)) {
            Some(entry) => f(&entry.value),
            None => Ok(T::default()),
        }
    }

    fn write<T>(&self, key: &[u8], f: impl FnOnce(&mut StoredValue) -> Result<T>) -> Result<T> {
        self.prune(key);
        let mut entry = self.store.get_mut(&self.slot(key)).ok_or_else(|| {
            Error::Client(format!(
                "no such key \"{}\"",
                String::from_utf8_lossy(key)
            ))
        })?;
        f(&mut entry.value)
    }

    /// Upsert path for commands that create the key when absent.
    fn upsert<T>(
        &self,
        key: &[u8],
        empty: StoredValue,
        f: impl FnOnce(&mut StoredValue) -> Result<T>,
    ) -> Result<T> {
        self.prune(key);
        let mut entry = self
            .store
            .entry(self.slot(key))
            .or_insert_with(|| Entry::new(empty));
        f(&mut entry.value)
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type() -> Error {
    Error::Client("WRONGTYPE Operation against a key holding the wrong kind of value".to_string())
}

/// Resolve a possibly negative index against a length.
fn abs_index(index: i64, len: usize) -> Option<usize> {
    let idx = if index < 0 {
        index + len as i64
    } else {
        index
    };
    if idx < 0 || idx as usize >= len {
        None
    } else {
        Some(idx as usize)
    }
}

impl StoreClient for MemoryClient {
    fn client_kind(&self) -> &'static str {
        "memory"
    }

    async fn key_type(&mut self, key: &[u8]) -> Result<KeyType> {
        match self.store.get(&self.slot(key)) {
            Some(entry) if !entry.is_expired() => Ok(entry.value.key_type()),
            _ => Err(Error::TypeLookup(format!(
                "key \"{}\" no longer exists",
                String::from_utf8_lossy(key)
            ))),
        }
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<Vec<u8>>> {
        let names: Vec<Vec<u8>> = self
            .store
            .iter()
            .filter(|e| e.key().0 == self.db && !e.is_expired())
            .map(|e| e.key().1.clone())
            .collect();

        let mut matched: Vec<Vec<u8>> = names
            .into_iter()
            .filter(|name| glob_match(pattern.as_bytes(), name))
            .collect();
        matched.sort();
        Ok(matched)
    }

    async fn server_info(&mut self, _section: Option<&str>) -> Result<ServerInfo> {
        let mut info = ServerInfo::new();

        let mut server = BTreeMap::new();
        server.insert(
            "redis_version".to_string(),
            format!("memory-{}", crate::VERSION),
        );
        server.insert(
            "uptime_in_seconds".to_string(),
            self.started.elapsed().as_secs().to_string(),
        );
        info.insert("server".to_string(), server);

        let mut clients = BTreeMap::new();
        clients.insert("connected_clients".to_string(), "1".to_string());
        info.insert("clients".to_string(), clients);

        let used: u64 = self
            .store
            .iter()
            .filter(|e| !e.is_expired())
            .map(|e| e.key().1.len() as u64 + e.value.approx_bytes())
            .sum();
        let mut memory = BTreeMap::new();
        memory.insert("used_memory".to_string(), used.to_string());
        info.insert("memory".to_string(), memory);

        let mut keyspace = BTreeMap::new();
        for db in 0..DATABASES {
            let (total, expiring) = self.store.iter().filter(|e| e.key().0 == db && !e.is_expired()).fold(
                (0u64, 0u64),
                |(total, expiring), e| {
                    (total + 1, expiring + u64::from(e.expires_at.is_some()))
                },
            );
            if total > 0 {
                keyspace.insert(
                    format!("db{}", db),
                    format!("keys={},expires={},avg_ttl=0", total, expiring),
                );
            }
        }
        info.insert("keyspace".to_string(), keyspace);

        Ok(info)
    }

    async fn database_count(&mut self) -> Result<u32> {
        Ok(DATABASES)
    }

    async fn db_size(&mut self) -> Result<u64> {
        let count = self
            .store
            .iter()
            .filter(|e| e.key().0 == self.db && !e.is_expired())
            .count();
        Ok(count as u64)
    }

    async fn ttl(&mut self, key: &[u8]) -> Result<i64> {
        if !self.prune(key) {
            return Ok(-2);
        }
        match self.store.get(&self.slot(key)) {
            Some(entry) => Ok(entry.ttl_secs()),
            None => Ok(-2),
        }
    }

    async fn set_expire(&mut self, key: &[u8], seconds: i64) -> Result<()> {
        if !self.prune(key) {
            return Ok(());
        }

        if seconds == 0 {
            self.store.remove(&self.slot(key));
            return Ok(());
        }

        if let Some(mut entry) = self.store.get_mut(&self.slot(key)) {
            entry.expires_at = if seconds < 0 {
                None
            } else {
                Some(Instant::now() + Duration::from_secs(seconds as u64))
            };
        }
        Ok(())
    }

    async fn exists(&mut self, key: &[u8]) -> Result<u64> {
        Ok(u64::from(self.prune(key)))
    }

    async fn delete(&mut self, keys: &[&[u8]]) -> Result<u64> {
        let mut removed = 0;
        for key in keys {
            if self.prune(key) && self.store.remove(&self.slot(key)).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn dump(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.prune(key) {
            return Ok(None);
        }
        match self.store.get(&self.slot(key)) {
            Some(entry) => {
                let blob = postcard::to_allocvec(&entry.value)
                    .map_err(|e| Error::Client(format!("dump failed: {}", e)))?;
                Ok(Some(blob))
            }
            None => Ok(None),
        }
    }

    async fn restore(&mut self, key: &[u8], ttl_ms: u64, blob: &[u8]) -> Result<bool> {
        if self.prune(key) {
            return Err(Error::Client(
                "BUSYKEY Target key name already exists".to_string(),
            ));
        }

        let value: StoredValue = postcard::from_bytes(blob)
            .map_err(|e| Error::Client(format!("Bad data format: {}", e)))?;

        let mut entry = Entry::new(value);
        if ttl_ms > 0 {
            entry.expires_at = Some(Instant::now() + Duration::from_millis(ttl_ms));
        }
        self.store.insert(self.slot(key), entry);
        Ok(true)
    }

    async fn flush_db(&mut self) -> Result<bool> {
        let db = self.db;
        self.store.retain(|slot, _| slot.0 != db);
        warn!("memory client flushed database {}", db);
        Ok(true)
    }

    async fn raw_command(&mut self, args: &[&[u8]]) -> Result<Reply> {
        if args.len() == 3
            && args[0].eq_ignore_ascii_case(b"MEMORY")
            && args[1].eq_ignore_ascii_case(b"USAGE")
        {
            if !self.prune(args[2]) {
                return Ok(Reply::Nil);
            }
            return Ok(match self.store.get(&self.slot(args[2])) {
                Some(entry) => Reply::Int(
                    (args[2].len() as u64 + entry.value.approx_bytes()) as i64,
                ),
                None => Reply::Nil,
            });
        }

        Ok(Reply::Nil)
    }

    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.read(key, |value| match value {
            StoredValue::String(v) => Ok(Some(v.clone())),
            _ => Err(wrong_type()),
        })
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        // SET discards any previous value and TTL, regardless of type.
        self.store
            .insert(self.slot(key), Entry::new(StoredValue::String(value.to_vec())));
        Ok(())
    }

    async fn list_len(&mut self, key: &[u8]) -> Result<u64> {
        self.read(key, |value| match value {
            StoredValue::List(items) => Ok(items.len() as u64),
            _ => Err(wrong_type()),
        })
    }

    async fn list_range(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.read(key, |value| match value {
            StoredValue::List(items) => Ok(items.clone()),
            _ => Err(wrong_type()),
        })
    }

    async fn list_index(&mut self, key: &[u8], index: i64) -> Result<Option<Vec<u8>>> {
        self.read(key, |value| match value {
            StoredValue::List(items) => {
                Ok(abs_index(index, items.len()).map(|i| items[i].clone()))
            }
            _ => Err(wrong_type()),
        })
    }

    async fn list_push(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.upsert(key, StoredValue::List(Vec::new()), |stored| match stored {
            StoredValue::List(items) => {
                items.push(value.to_vec());
                Ok(())
            }
            _ => Err(wrong_type()),
        })
    }

    async fn list_set(&mut self, key: &[u8], index: i64, value: &[u8]) -> Result<()> {
        self.write(key, |stored| match stored {
            StoredValue::List(items) => match abs_index(index, items.len()) {
                Some(i) => {
                    items[i] = value.to_vec();
                    Ok(())
                }
                None => Err(Error::Client("index out of range".to_string())),
            },
            _ => Err(wrong_type()),
        })
    }

    async fn list_rem(&mut self, key: &[u8], value: &[u8], count: i64) -> Result<u64> {
        if !self.prune(key) {
            return Ok(0);
        }

        self.write(key, |stored| match stored {
            StoredValue::List(items) => {
                let limit = if count == 0 {
                    usize::MAX
                } else {
                    count.unsigned_abs() as usize
                };
                let mut positions: Vec<usize> = items
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| item.as_slice() == value)
                    .map(|(i, _)| i)
                    .collect();
                if count < 0 {
                    positions.reverse(); // remove from the tail
                }
                positions.truncate(limit);
                positions.sort_unstable_by(|a, b| b.cmp(a));
                let removed = positions.len() as u64;
                for i in positions {
                    items.remove(i);
                }
                Ok(removed)
            }
            _ => Err(wrong_type()),
        })
    }

    async fn set_members(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.read(key, |value| match value {
            StoredValue::Set(members) => Ok(members.iter().cloned().collect()),
            _ => Err(wrong_type()),
        })
    }

    async fn set_card(&mut self, key: &[u8]) -> Result<u64> {
        self.read(key, |value| match value {
            StoredValue::Set(members) => Ok(members.len() as u64),
            _ => Err(wrong_type()),
        })
    }

    async fn set_add(&mut self, key: &[u8], member: &[u8]) -> Result<()> {
        self.upsert(key, StoredValue::Set(BTreeSet::new()), |stored| match stored {
            StoredValue::Set(members) => {
                members.insert(member.to_vec());
                Ok(())
            }
            _ => Err(wrong_type()),
        })
    }

    async fn set_rem(&mut self, key: &[u8], member: &[u8]) -> Result<u64> {
        if !self.prune(key) {
            return Ok(0);
        }
        self.write(key, |stored| match stored {
            StoredValue::Set(members) => Ok(u64::from(members.remove(member))),
            _ => Err(wrong_type()),
        })
    }

    async fn zset_range(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.read(key, |value| match value {
            StoredValue::ZSet(entries) => {
                Ok(entries.iter().map(|(member, _)| member.clone()).collect())
            }
            _ => Err(wrong_type()),
        })
    }

    async fn zset_card(&mut self, key: &[u8]) -> Result<u64> {
        self.read(key, |value| match value {
            StoredValue::ZSet(entries) => Ok(entries.len() as u64),
            _ => Err(wrong_type()),
        })
    }

    async fn zset_add(&mut self, key: &[u8], score: f64, member: &[u8]) -> Result<()> {
        self.upsert(key, StoredValue::ZSet(Vec::new()), |stored| match stored {
            StoredValue::ZSet(entries) => {
                entries.retain(|(m, _)| m.as_slice() != member);
                entries.push((member.to_vec(), score));
                entries.sort_by(|(ma, sa), (mb, sb)| {
                    sa.partial_cmp(sb)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| ma.cmp(mb))
                });
                Ok(())
            }
            _ => Err(wrong_type()),
        })
    }

    async fn zset_rem(&mut self, key: &[u8], member: &[u8]) -> Result<u64> {
        if !self.prune(key) {
            return Ok(0);
        }
        self.write(key, |stored| match stored {
            StoredValue::ZSet(entries) => {
                let before = entries.len();
                entries.retain(|(m, _)| m.as_slice() != member);
                Ok((before - entries.len()) as u64)
            }
            _ => Err(wrong_type()),
        })
    }

    async fn zset_score(&mut self, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
        self.read(key, |value| match value {
            StoredValue::ZSet(entries) => Ok(entries
                .iter()
                .find(|(m, _)| m.as_slice() == member)
                .map(|(_, score)| *score)),
            _ => Err(wrong_type()),
        })
    }

    async fn hash_all(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.read(key, |value| match value {
            StoredValue::Hash(fields) => Ok(fields
                .iter()
                .map(|(field, val)| (field.clone(), val.clone()))
                .collect()),
            _ => Err(wrong_type()),
        })
    }

    async fn hash_len(&mut self, key: &[u8]) -> Result<u64> {
        self.read(key, |value| match value {
            StoredValue::Hash(fields) => Ok(fields.len() as u64),
            _ => Err(wrong_type()),
        })
    }

    async fn hash_get(&mut self, key: &[u8], field: &[u8]) -> Result<Option<Vec<u8>>> {
        self.read(key, |value| match value {
            StoredValue::Hash(fields) => Ok(fields.get(field).cloned()),
            _ => Err(wrong_type()),
        })
    }

    async fn hash_set(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> Result<()> {
        self.upsert(key, StoredValue::Hash(BTreeMap::new()), |stored| match stored {
            StoredValue::Hash(fields) => {
                fields.insert(field.to_vec(), value.to_vec());
                Ok(())
            }
            _ => Err(wrong_type()),
        })
    }

    async fn hash_del(&mut self, key: &[u8], field: &[u8]) -> Result<u64> {
        if !self.prune(key) {
            return Ok(0);
        }
        self.write(key, |stored| match stored {
            StoredValue::Hash(fields) => Ok(u64::from(fields.remove(field).is_some())),
            _ => Err(wrong_type()),
        })
    }
}

/// Store-native glob matching: `*`, `?`, `[...]` classes with `^`
/// negation and `a-b` ranges, and `\` escapes.
fn glob_match(pattern: &[u8], name: &[u8]) -> bool {
    let mut pi = 0;
    let mut ni = 0;
    let mut star: Option<(usize, usize)> = None;

    while ni < name.len() {
        let matched = match pattern.get(pi) {
            Some(b'\\') if pi + 1 < pattern.len() => {
                if pattern[pi + 1] == name[ni] {
                    pi += 2;
                    ni += 1;
                    true
                } else {
                    false
                }
            }
            Some(b'*') => {
                star = Some((pi, ni));
                pi += 1;
                continue;
            }
            Some(b'?') => {
                pi += 1;
                ni += 1;
                true
            }
            Some(b'[') => match class_match(pattern, pi, name[ni]) {
                Some((true, end)) => {
                    pi = end;
                    ni += 1;
                    true
                }
                _ => false,
            },
            Some(&c) if c == name[ni] => {
                pi += 1;
                ni += 1;
                true
            }
            _ => false,
        };

        if !matched {
            match star {
                Some((star_pi, star_ni)) => {
                    // Widen the last star by one byte and retry.
                    pi = star_pi + 1;
                    ni = star_ni + 1;
                    star = Some((star_pi, star_ni + 1));
                }
                None => return false,
            }
        }
    }

    while pattern.get(pi) == Some(&b'*') {
        pi += 1;
    }
    pi == pattern.len()
}

/// Match a `[...]` class at `pattern[pi]` against `c`.
/// Returns `(matched, index after closing bracket)`, or `None` when the
/// class is unterminated.
fn class_match(pattern: &[u8], pi: usize, c: u8) -> Option<(bool, usize)> {
    let mut i = pi + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            i += 1;
            matched |= pattern[i] == c;
            i += 1;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = (pattern[i].min(pattern[i + 2]), pattern[i].max(pattern[i + 2]));
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= pattern[i] == c;
            i += 1;
        }
    }

    if i >= pattern.len() {
        return None;
    }
    Some((matched != negate, i + 1))
}
