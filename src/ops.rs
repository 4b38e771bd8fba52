//! Key operations engine.
//!
//! Stateless per-request orchestration over one connected client:
//! listing with metadata, per-type view payloads, save/delete/export/
//! import, and the server-statistics payloads. Composed via dependency
//! injection (a [`StoreClient`] plus a [`ValueCodec`]) and returns
//! structured payloads only; rendering happens elsewhere.

use crate::client::{ServerInfo, StoreClient};
use crate::codec::{EncodedValue, ValueCodec};
use crate::error::{Error, Result};
use crate::format;
use crate::paginate::{paginate, Page};
use crate::types::KeyType;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use std::collections::BTreeMap;

/// One row of the key listing.
#[derive(Clone, Debug, Serialize)]
pub struct KeyDescriptor {
    /// Lossy UTF-8 display form of the key name.
    pub name: String,
    /// Base64 of the raw name bytes, so binary-safe names survive the
    /// round trip through URL parameters.
    pub name_encoded: String,
    pub key_type: KeyType,
    /// Seconds, -1 for no expiry.
    pub ttl: i64,
    /// Composite item count; `None` for scalar types.
    pub items: Option<u64>,
}

/// Listing payload: one page of descriptors plus the database total.
#[derive(Clone, Debug, Serialize)]
pub struct KeyListing {
    pub keys: Page<KeyDescriptor>,
    pub db_size: u64,
}

/// One row of a composite value.
#[derive(Clone, Debug, Serialize)]
pub struct ValueItem {
    /// Position in the store's own ordering.
    pub index: usize,
    /// Per-item identifier: list index, member ordinal, hash field, or
    /// the member's score for sorted sets.
    pub sub_key: String,
    pub raw: Vec<u8>,
    /// Display text from the codec.
    pub value: String,
    /// Re-encode hint when a display decoder matched.
    pub encoder: Option<String>,
    pub formatted: bool,
}

/// The value half of a view payload.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewValue {
    Scalar(EncodedValue),
    Items(Page<ValueItem>),
}

/// View payload for one key.
#[derive(Clone, Debug, Serialize)]
pub struct KeyView {
    pub key: String,
    pub key_type: KeyType,
    pub ttl: i64,
    pub ttl_text: String,
    /// Approximate memory footprint; absent when the store lacks the
    /// capability.
    pub size: Option<u64>,
    pub value: ViewValue,
}

/// Identifier of one sub-entry inside a composite value.
#[derive(Clone, Debug, PartialEq)]
pub enum SubKey {
    /// List position.
    Index(i64),
    /// Set or sorted-set member.
    Member(String),
    /// Hash field.
    Field(String),
}

/// Parsed form input for a save.
///
/// Edit-in-place vs append is decided by which identifiers are present:
/// a list `index`, a hash `hash_field`, or an `old_value` member.
#[derive(Clone, Debug)]
pub struct SaveRequest {
    pub key: String,
    pub key_type: KeyType,
    pub value: String,
    /// Named reversible transform to undo before writing.
    pub encoder: Option<String>,
    /// TTL seconds; -1 clears any existing TTL.
    pub expire: i64,
    pub index: Option<i64>,
    pub hash_field: Option<String>,
    pub score: Option<f64>,
    /// Previous member value being replaced (set / sorted set edits).
    pub old_value: Option<String>,
}

impl Default for SaveRequest {
    fn default() -> Self {
        SaveRequest {
            key: String::new(),
            key_type: KeyType::String,
            value: String::new(),
            encoder: None,
            expire: -1,
            index: None,
            hash_field: None,
            score: None,
            old_value: None,
        }
    }
}

/// One entry of the edit-form type selector.
#[derive(Clone, Debug, Serialize)]
pub struct TypeOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Pre-filled edit form payload.
#[derive(Clone, Debug, Serialize)]
pub struct EditForm {
    pub key: String,
    pub key_type: KeyType,
    /// Raw (unescaped) text of the addressed value.
    pub value: String,
    pub index: Option<i64>,
    pub score: Option<f64>,
    pub hash_field: Option<String>,
    pub expire: i64,
    pub types: Vec<TypeOption>,
}

/// One selectable database with its key count label.
#[derive(Clone, Debug, Serialize)]
pub struct DatabaseSlot {
    pub index: u32,
    pub label: String,
}

/// Per-request engine over one connected client.
///
/// The client is owned end-to-end and dropped with the inspector at
/// request end. Accessors are awaited sequentially; the only fan-out is
/// the per-key metadata resolution during listing, which isolates
/// failures per key.
pub struct Inspector<C: StoreClient> {
    client: C,
    codec: ValueCodec,
}

impl<C: StoreClient> Inspector<C> {
    pub fn new(client: C, codec: ValueCodec) -> Self {
        Inspector { client, codec }
    }

    /// Hand the connection back, for flows (export download) that need
    /// nothing further from the engine.
    pub fn into_client(self) -> C {
        self.client
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    /// Human label of the active client library.
    pub fn client_kind(&self) -> &'static str {
        self.client.client_kind()
    }

    /// List keys matching `pattern` with per-key metadata.
    ///
    /// A type lookup failing for one key (it vanished since the KEYS
    /// call) degrades that entry to `Unknown` and continues; one bad
    /// key never aborts the listing. An empty match yields an empty
    /// page, not an error.
    pub async fn list_keys(
        &mut self,
        pattern: &str,
        page: usize,
        per_page: usize,
    ) -> Result<KeyListing> {
        let names = self.client.keys(pattern).await?;
        let mut descriptors = Vec::with_capacity(names.len());

        for name in names {
            let key_type = match self.client.key_type(&name).await {
                Ok(key_type) => key_type,
                Err(Error::TypeLookup(msg)) => {
                    debug!("degrading listing entry to unknown: {}", msg);
                    KeyType::Unknown
                }
                Err(e) => return Err(e),
            };

            let ttl = self.client.ttl(&name).await?;
            let items = self.count_raw(key_type, &name).await?;

            descriptors.push(KeyDescriptor {
                name: String::from_utf8_lossy(&name).into_owned(),
                name_encoded: BASE64.encode(&name),
                key_type,
                ttl,
                items,
            });
        }

        let db_size = self.client.db_size().await?;
        Ok(KeyListing {
            keys: paginate(descriptors, per_page, page),
            db_size,
        })
    }

    /// Item count for composite keys, `None` for scalars; drives
    /// whether pagination applies.
    pub async fn count_items(&mut self, key_type: KeyType, key: &str) -> Result<Option<u64>> {
        self.count_raw(key_type, key.as_bytes()).await
    }

    async fn count_raw(&mut self, key_type: KeyType, key: &[u8]) -> Result<Option<u64>> {
        Ok(match key_type {
            KeyType::List => Some(self.client.list_len(key).await?),
            KeyType::Set => Some(self.client.set_card(key).await?),
            KeyType::ZSet => Some(self.client.zset_card(key).await?),
            KeyType::Hash => Some(self.client.hash_len(key).await?),
            KeyType::String | KeyType::Unknown => None,
        })
    }

    /// Build the view payload for one key.
    ///
    /// # Errors
    /// `Error::NotFound` when the key does not exist; the caller
    /// redirects back to the listing. A failing type lookup here is
    /// fatal to the view and surfaces inline.
    pub async fn view_key(&mut self, key: &str, page: usize, per_page: usize) -> Result<KeyView> {
        let kb = key.as_bytes();

        if self.client.exists(kb).await? == 0 {
            return Err(Error::NotFound(key.to_string()));
        }

        let key_type = self.client.key_type(kb).await?;
        let ttl = self.client.ttl(kb).await?;
        let size = self.client.memory_usage(kb).await?;

        let value = if key_type.is_composite() {
            let items = self.read_items(key_type, kb).await?;
            ViewValue::Items(paginate(items, per_page, page))
        } else {
            let raw = self.client.get(kb).await?.unwrap_or_default();
            ViewValue::Scalar(self.codec.format_for_display(&raw))
        };

        Ok(KeyView {
            key: key.to_string(),
            key_type,
            ttl,
            ttl_text: format::seconds(ttl),
            size,
            value,
        })
    }

    async fn read_items(&mut self, key_type: KeyType, key: &[u8]) -> Result<Vec<ValueItem>> {
        let mut items = Vec::new();

        match key_type {
            KeyType::List => {
                for (index, raw) in self.client.list_range(key).await?.into_iter().enumerate() {
                    items.push(self.item(index, index.to_string(), raw));
                }
            }
            KeyType::Set => {
                for (index, raw) in self.client.set_members(key).await?.into_iter().enumerate() {
                    items.push(self.item(index, index.to_string(), raw));
                }
            }
            KeyType::ZSet => {
                // Score lookups happen per member, in range order.
                let members = self.client.zset_range(key).await?;
                for (index, raw) in members.into_iter().enumerate() {
                    let score = self.client.zset_score(key, &raw).await?;
                    let sub_key = score.map(score_text).unwrap_or_default();
                    items.push(self.item(index, sub_key, raw));
                }
            }
            KeyType::Hash => {
                for (index, (field, raw)) in
                    self.client.hash_all(key).await?.into_iter().enumerate()
                {
                    let sub_key = String::from_utf8_lossy(&field).into_owned();
                    items.push(self.item(index, sub_key, raw));
                }
            }
            KeyType::String | KeyType::Unknown => {}
        }

        Ok(items)
    }

    fn item(&self, index: usize, sub_key: String, raw: Vec<u8>) -> ValueItem {
        let display = self.codec.format_for_display(&raw);
        ValueItem {
            index,
            sub_key,
            raw,
            value: display.text,
            encoder: display.decoder,
            formatted: display.formatted,
        }
    }

    /// Pre-fill the add/edit form.
    ///
    /// With no key, returns creation defaults. With a key, resolves the
    /// current type and TTL; with a sub-key selector, also loads the
    /// addressed sub-value. The form shows raw text; display
    /// formatting never applies on the edit path.
    pub async fn edit_payload(&mut self, key: &str, sub: Option<&SubKey>) -> Result<EditForm> {
        let mut form = EditForm {
            key: key.to_string(),
            key_type: KeyType::String,
            value: String::new(),
            index: None,
            score: None,
            hash_field: None,
            expire: -1,
            types: type_options(),
        };

        let kb = key.as_bytes();
        if key.is_empty() || self.client.exists(kb).await? == 0 {
            return Ok(form);
        }

        form.key_type = match self.client.key_type(kb).await {
            Ok(key_type) => key_type,
            Err(Error::TypeLookup(msg)) => {
                debug!("edit form falls back to unknown type: {}", msg);
                KeyType::Unknown
            }
            Err(e) => return Err(e),
        };
        form.expire = self.client.ttl(kb).await?;

        match (form.key_type, sub) {
            (KeyType::String, _) | (KeyType::Unknown, _) => {
                if let Some(raw) = self.client.get(kb).await.unwrap_or(None) {
                    form.value = String::from_utf8_lossy(&raw).into_owned();
                }
            }
            (KeyType::List, Some(SubKey::Index(index))) => {
                form.index = Some(*index);
                if let Some(raw) = self.client.list_index(kb, *index).await? {
                    form.value = String::from_utf8_lossy(&raw).into_owned();
                }
            }
            (KeyType::Set, Some(SubKey::Member(member))) => {
                form.value = member.clone();
            }
            (KeyType::ZSet, Some(SubKey::Member(member))) => {
                form.value = member.clone();
                form.score = self.client.zset_score(kb, member.as_bytes()).await?;
            }
            (KeyType::Hash, Some(SubKey::Field(field))) => {
                form.hash_field = Some(field.clone());
                if let Some(raw) = self.client.hash_get(kb, field.as_bytes()).await? {
                    form.value = String::from_utf8_lossy(&raw).into_owned();
                }
            }
            _ => {}
        }

        Ok(form)
    }

    /// Type-dispatched write.
    ///
    /// The value is first passed through the caller-chosen reversible
    /// encoder. The expire sentinel -1 clears any existing TTL; a
    /// non-negative value sets it in seconds.
    pub async fn save_key(&mut self, req: &SaveRequest) -> Result<String> {
        if req.key.is_empty() {
            return Err(Error::Other("key name is required".to_string()));
        }

        let kb = req.key.as_bytes();
        let bytes = self
            .codec
            .decode(&req.value, req.encoder.as_deref().unwrap_or("none"))?;

        match req.key_type {
            KeyType::String => self.client.set(kb, &bytes).await?,
            KeyType::List => match req.index {
                Some(index) => self.client.list_set(kb, index, &bytes).await?,
                None => self.client.list_push(kb, &bytes).await?,
            },
            KeyType::Set => {
                if let Some(old) = &req.old_value {
                    if old != &req.value {
                        self.client.set_rem(kb, old.as_bytes()).await?;
                    }
                }
                self.client.set_add(kb, &bytes).await?;
            }
            KeyType::ZSet => {
                if let Some(old) = &req.old_value {
                    if old != &req.value {
                        self.client.zset_rem(kb, old.as_bytes()).await?;
                    }
                }
                self.client
                    .zset_add(kb, req.score.unwrap_or(0.0), &bytes)
                    .await?;
            }
            KeyType::Hash => {
                let field = req
                    .hash_field
                    .as_deref()
                    .filter(|field| !field.is_empty())
                    .ok_or_else(|| Error::Other("hash field is required".to_string()))?;
                self.client.hash_set(kb, field.as_bytes(), &bytes).await?;
            }
            KeyType::Unknown => {
                return Err(Error::Unsupported(
                    "cannot save a key of unknown type".to_string(),
                ))
            }
        }

        self.client.set_expire(kb, req.expire).await?;
        debug!("saved {} key \"{}\"", req.key_type, req.key);
        Ok(format!("Key \"{}\" has been saved.", req.key))
    }

    /// Delete one key or a comma-joined list.
    ///
    /// Deleting keys that no longer exist still reports completion;
    /// the operation is idempotent. In the multi-key form, one key's
    /// failure is counted and reported, never allowed to abort the
    /// batch.
    pub async fn delete_keys(&mut self, list: &str) -> Result<String> {
        let names: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();

        if names.is_empty() {
            return Ok("Nothing to delete.".to_string());
        }

        if names.len() == 1 {
            self.client.delete(&[names[0].as_bytes()]).await?;
            return Ok(format!("Key \"{}\" has been deleted.", names[0]));
        }

        let mut removed = 0u64;
        let mut failed = 0usize;

        for name in &names {
            match self.client.delete(&[name.as_bytes()]).await {
                Ok(count) => removed += count,
                Err(e) => {
                    warn!("failed to delete key \"{}\": {}", name, e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            Ok(format!(
                "Deleted {} of {} keys ({} failed).",
                removed,
                names.len(),
                failed
            ))
        } else {
            Ok(format!(
                "Keys have been deleted ({} of {} existed).",
                removed,
                names.len()
            ))
        }
    }

    /// Remove one sub-entry of a composite key.
    ///
    /// Calling this for a scalar type is a contract violation by the
    /// caller, not something a user can reach through normal flows.
    pub async fn delete_sub_key(
        &mut self,
        key_type: KeyType,
        key: &str,
        sub: &SubKey,
    ) -> Result<()> {
        let kb = key.as_bytes();

        match (key_type, sub) {
            (KeyType::List, SubKey::Index(index)) => {
                let value = self.client.list_index(kb, *index).await?.ok_or_else(|| {
                    Error::Other(format!("no list item at index {}", index))
                })?;
                self.client.list_rem(kb, &value, -1).await?;
            }
            (KeyType::Set, SubKey::Member(member)) => {
                self.client.set_rem(kb, member.as_bytes()).await?;
            }
            (KeyType::ZSet, SubKey::Member(member)) => {
                self.client.zset_rem(kb, member.as_bytes()).await?;
            }
            (KeyType::Hash, SubKey::Field(field)) => {
                self.client.hash_del(kb, field.as_bytes()).await?;
            }
            _ => {
                return Err(Error::Unsupported(format!(
                    "cannot delete a sub-key of a {} key",
                    key_type
                )))
            }
        }

        Ok(())
    }

    /// Flush the currently selected database, never any other database
    /// on the same server.
    pub async fn delete_all_keys(&mut self) -> Result<String> {
        if self.client.flush_db().await? {
            Ok("All keys from the current database have been removed.".to_string())
        } else {
            Ok("An error occurred while deleting all keys.".to_string())
        }
    }

    /// Native binary serialization of one key, byte-exact for
    /// re-import. This path bypasses the display codec entirely.
    pub async fn export_key(&mut self, key: &str) -> Result<Vec<u8>> {
        self.client
            .dump(key.as_bytes())
            .await?
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Recreate a key from an exported blob.
    ///
    /// Returns `Ok(false)` without touching anything when the target
    /// exists and `overwrite` was not confirmed. `ttl_seconds` of -1
    /// imports without expiry.
    pub async fn import_key(
        &mut self,
        blob: &[u8],
        target: &str,
        ttl_seconds: i64,
        overwrite: bool,
    ) -> Result<bool> {
        let kb = target.as_bytes();

        if self.client.exists(kb).await? > 0 {
            if !overwrite {
                debug!("refusing to overwrite existing key \"{}\"", target);
                return Ok(false);
            }
            self.client.delete(&[kb]).await?;
        }

        let ttl_ms = if ttl_seconds > 0 {
            ttl_seconds as u64 * 1000
        } else {
            0
        };
        self.client.restore(kb, ttl_ms, blob).await
    }

    /// Label every database index with its keyspace key count.
    ///
    /// `override_count` comes from the server config for stores where
    /// `CONFIG GET databases` is unavailable; without either, a single
    /// database is assumed.
    pub async fn databases(&mut self, override_count: Option<u32>) -> Result<Vec<DatabaseSlot>> {
        let count = match override_count {
            Some(count) => count,
            None => self.client.database_count().await.unwrap_or(1),
        };

        let info = self.client.server_info(Some("keyspace")).await?;
        let empty = BTreeMap::new();
        let keyspace = info.get("keyspace").unwrap_or(&empty);

        let mut slots = Vec::with_capacity(count as usize);
        for index in 0..count {
            let label = match keyspace
                .get(&format!("db{}", index))
                .and_then(|raw| keyspace_keys(raw))
            {
                Some(keys) => format!("Database {} ({} keys)", index, format::number(keys)),
                None => format!("Database {}", index),
            };
            slots.push(DatabaseSlot { index, label });
        }

        Ok(slots)
    }

    /// Flat labeled statistics for the ajax panel probe.
    ///
    /// Never fails: any error collapses to an `{"error": message}`
    /// shaped map.
    pub async fn server_panel(&mut self) -> BTreeMap<String, String> {
        match self.panel_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                let mut out = BTreeMap::new();
                out.insert("error".to_string(), e.to_string());
                out
            }
        }
    }

    async fn panel_stats(&mut self) -> Result<BTreeMap<String, String>> {
        let info = self.client.server_info(None).await?;
        let lookup = |section: &str, key: &str| -> String {
            info.get(section)
                .and_then(|entries| entries.get(key))
                .cloned()
                .unwrap_or_default()
        };

        let uptime: i64 = lookup("server", "uptime_in_seconds").parse().unwrap_or(0);
        let used_memory: u64 = lookup("memory", "used_memory").parse().unwrap_or(0);
        let empty = BTreeMap::new();
        let keyspace = info.get("keyspace").unwrap_or(&empty);

        let mut out = BTreeMap::new();
        out.insert("Version".to_string(), lookup("server", "redis_version"));
        out.insert(
            "Connected clients".to_string(),
            lookup("clients", "connected_clients"),
        );
        out.insert("Uptime".to_string(), format::seconds(uptime));
        out.insert("Memory used".to_string(), format::bytes(used_memory));
        out.insert(
            "Keys".to_string(),
            format!(
                "{} (all databases)",
                format::number(count_of_all_keys(keyspace))
            ),
        );
        Ok(out)
    }

    /// Full statistics snapshot for the more-info page.
    pub async fn server_details(&mut self) -> Result<ServerInfo> {
        self.client.server_info(None).await
    }
}

/// Type selector entries for the edit form.
pub fn type_options() -> Vec<TypeOption> {
    KeyType::all()
        .iter()
        .map(|key_type| TypeOption {
            value: key_type.as_str(),
            label: key_type.label(),
        })
        .collect()
}

/// Parse the key count out of one keyspace line
/// (`keys=12,expires=0,avg_ttl=0`).
fn keyspace_keys(raw: &str) -> Option<u64> {
    raw.split(',').next()?.split_once('=')?.1.parse().ok()
}

/// Sum of key counts over every database's keyspace line.
fn count_of_all_keys(keyspace: &BTreeMap<String, String>) -> u64 {
    keyspace.values().filter_map(|raw| keyspace_keys(raw)).sum()
}

/// Render a sorted-set score the way an operator expects: integral
/// scores without a trailing fraction.
fn score_text(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e15 {
        format!("{}", score as i64)
    } else {
        score.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_keys_parses_count() {
        assert_eq!(keyspace_keys("keys=12,expires=0,avg_ttl=0"), Some(12));
        assert_eq!(keyspace_keys("garbage"), None);
    }

    #[test]
    fn test_count_of_all_keys_sums_databases() {
        let mut keyspace = BTreeMap::new();
        keyspace.insert("db0".to_string(), "keys=10,expires=2,avg_ttl=0".to_string());
        keyspace.insert("db3".to_string(), "keys=5,expires=0,avg_ttl=0".to_string());
        assert_eq!(count_of_all_keys(&keyspace), 15);
        assert_eq!(count_of_all_keys(&BTreeMap::new()), 0);
    }

    #[test]
    fn test_score_text() {
        assert_eq!(score_text(2.0), "2");
        assert_eq!(score_text(-7.0), "-7");
        assert_eq!(score_text(1.5), "1.5");
    }

    #[test]
    fn test_type_options_exclude_unknown() {
        let options = type_options();
        assert_eq!(options.len(), 5);
        assert!(options.iter().all(|option| option.value != "unknown"));
        assert_eq!(options[0].value, "string");
    }

    #[test]
    fn test_save_request_defaults() {
        let req = SaveRequest::default();
        assert_eq!(req.key_type, KeyType::String);
        assert_eq!(req.expire, -1);
        assert!(req.index.is_none());
    }
}
