//! Engine-level integration tests.
//!
//! These run the full inspector flow (listing, viewing, saving,
//! deleting, exporting) against the in-process client, so they verify
//! end-to-end behavior without a live server.

#![cfg(feature = "memory")]

use keylens::client::memory::MemoryClient;
use keylens::client::StoreClient;
use keylens::ops::{Inspector, SaveRequest, SubKey, ViewValue};
use keylens::{Error, KeyType, ValueCodec};

/// The store handle is shared; the inspector owns its own clone, the
/// way a request owns its own connection.
fn inspector(store: &MemoryClient) -> Inspector<MemoryClient> {
    Inspector::new(store.clone(), ValueCodec::default())
}

#[tokio::test]
async fn test_listing_resolves_per_key_metadata() {
    let mut store = MemoryClient::new();
    store.set(b"user:1", b"alice").await.expect("set");
    store.set_add(b"tags", b"a").await.expect("sadd");
    store.set_add(b"tags", b"b").await.expect("sadd");
    store.set_add(b"tags", b"c").await.expect("sadd");

    let listing = inspector(&store)
        .list_keys("*", 1, 25)
        .await
        .expect("Failed to list keys");

    assert_eq!(listing.db_size, 2);
    assert_eq!(listing.keys.total, 2);

    let tags = &listing.keys.items[0];
    assert_eq!(tags.name, "tags");
    assert_eq!(tags.key_type, KeyType::Set);
    assert_eq!(tags.ttl, -1);
    assert_eq!(tags.items, Some(3));

    let user = &listing.keys.items[1];
    assert_eq!(user.name, "user:1");
    assert_eq!(user.key_type, KeyType::String);
    assert_eq!(user.ttl, -1);
    assert_eq!(user.items, None);
}

#[tokio::test]
async fn test_listing_empty_match_is_not_an_error() {
    let store = MemoryClient::new();
    let listing = inspector(&store)
        .list_keys("missing:*", 1, 25)
        .await
        .expect("Failed to list keys");

    assert!(listing.keys.items.is_empty());
    assert_eq!(listing.keys.total, 0);
}

#[tokio::test]
async fn test_view_scalar_key() {
    let mut store = MemoryClient::new();
    store.set(b"greeting", b"plain text").await.expect("set");

    let view = inspector(&store)
        .view_key("greeting", 1, 25)
        .await
        .expect("Failed to view key");

    assert_eq!(view.key_type, KeyType::String);
    assert_eq!(view.ttl, -1);
    assert_eq!(view.ttl_text, "Doesn't expire");
    assert!(view.size.is_some());

    match view.value {
        ViewValue::Scalar(encoded) => {
            assert_eq!(encoded.text, "plain text");
            assert_eq!(encoded.decoder, None);
            assert!(!encoded.formatted);
        }
        ViewValue::Items(_) => panic!("scalar key produced items"),
    }
}

#[tokio::test]
async fn test_view_missing_key_signals_not_found() {
    let store = MemoryClient::new();
    match inspector(&store).view_key("ghost", 1, 25).await {
        Err(Error::NotFound(key)) => assert_eq!(key, "ghost"),
        other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_view_composite_pagination_clamps() {
    let mut store = MemoryClient::new();
    for i in 0..23 {
        store
            .list_push(b"queue", format!("job-{:02}", i).as_bytes())
            .await
            .expect("push");
    }

    let view = inspector(&store)
        .view_key("queue", 999, 10)
        .await
        .expect("Failed to view key");

    match view.value {
        ViewValue::Items(page) => {
            assert_eq!(page.total, 23);
            assert_eq!(page.page, 3);
            assert_eq!(page.items.len(), 3);
            assert_eq!(page.items[0].value, "job-20");
            assert_eq!(page.items[0].sub_key, "20");
        }
        ViewValue::Scalar(_) => panic!("composite key produced a scalar"),
    }
}

#[tokio::test]
async fn test_view_zset_sub_keys_are_scores() {
    let mut store = MemoryClient::new();
    store.zset_add(b"board", 2.0, b"bob").await.expect("zadd");
    store.zset_add(b"board", 1.5, b"alice").await.expect("zadd");

    let view = inspector(&store)
        .view_key("board", 1, 25)
        .await
        .expect("Failed to view key");

    match view.value {
        ViewValue::Items(page) => {
            assert_eq!(page.items[0].value, "alice");
            assert_eq!(page.items[0].sub_key, "1.5");
            assert_eq!(page.items[1].value, "bob");
            assert_eq!(page.items[1].sub_key, "2");
        }
        ViewValue::Scalar(_) => panic!("composite key produced a scalar"),
    }
}

#[tokio::test]
async fn test_save_string_sets_and_clears_expiry() {
    let mut store = MemoryClient::new();
    let mut engine = inspector(&store);

    let message = engine
        .save_key(&SaveRequest {
            key: "session".to_string(),
            value: "token".to_string(),
            expire: 120,
            ..Default::default()
        })
        .await
        .expect("Failed to save key");
    assert_eq!(message, "Key \"session\" has been saved.");

    assert_eq!(store.get(b"session").await.expect("get"), Some(b"token".to_vec()));
    let ttl = store.ttl(b"session").await.expect("ttl");
    assert!((1..=120).contains(&ttl), "unexpected ttl {}", ttl);

    // The no-expiry sentinel clears the TTL that was just set.
    engine
        .save_key(&SaveRequest {
            key: "session".to_string(),
            value: "token".to_string(),
            expire: -1,
            ..Default::default()
        })
        .await
        .expect("Failed to save key");
    assert_eq!(store.ttl(b"session").await.expect("ttl"), -1);
}

#[tokio::test]
async fn test_save_hash_field_overwrites_without_duplicating() {
    let mut store = MemoryClient::new();
    let mut engine = inspector(&store);

    let save = |field: &str, value: &str| SaveRequest {
        key: "profile".to_string(),
        key_type: KeyType::Hash,
        hash_field: Some(field.to_string()),
        value: value.to_string(),
        ..Default::default()
    };

    engine.save_key(&save("name", "alice")).await.expect("save");
    engine.save_key(&save("city", "oslo")).await.expect("save");
    engine.save_key(&save("name", "bob")).await.expect("save");

    assert_eq!(store.hash_len(b"profile").await.expect("hlen"), 2);
    assert_eq!(
        store.hash_get(b"profile", b"name").await.expect("hget"),
        Some(b"bob".to_vec())
    );
    assert_eq!(
        store.hash_get(b"profile", b"city").await.expect("hget"),
        Some(b"oslo".to_vec())
    );
}

#[tokio::test]
async fn test_save_list_index_edits_in_place_and_no_index_appends() {
    let mut store = MemoryClient::new();
    let mut engine = inspector(&store);

    for value in ["a", "b"] {
        engine
            .save_key(&SaveRequest {
                key: "queue".to_string(),
                key_type: KeyType::List,
                value: value.to_string(),
                ..Default::default()
            })
            .await
            .expect("save");
    }
    assert_eq!(store.list_len(b"queue").await.expect("llen"), 2);

    engine
        .save_key(&SaveRequest {
            key: "queue".to_string(),
            key_type: KeyType::List,
            value: "B".to_string(),
            index: Some(1),
            ..Default::default()
        })
        .await
        .expect("save");

    assert_eq!(
        store.list_range(b"queue").await.expect("lrange"),
        vec![b"a".to_vec(), b"B".to_vec()]
    );
}

#[tokio::test]
async fn test_save_set_member_replacement() {
    let mut store = MemoryClient::new();
    store.set_add(b"tags", b"old").await.expect("sadd");

    inspector(&store)
        .save_key(&SaveRequest {
            key: "tags".to_string(),
            key_type: KeyType::Set,
            value: "new".to_string(),
            old_value: Some("old".to_string()),
            ..Default::default()
        })
        .await
        .expect("save");

    assert_eq!(
        store.set_members(b"tags").await.expect("members"),
        vec![b"new".to_vec()]
    );
}

#[tokio::test]
async fn test_save_zset_member_with_score() {
    let mut store = MemoryClient::new();

    inspector(&store)
        .save_key(&SaveRequest {
            key: "board".to_string(),
            key_type: KeyType::ZSet,
            value: "alice".to_string(),
            score: Some(4.5),
            ..Default::default()
        })
        .await
        .expect("save");

    assert_eq!(
        store.zset_score(b"board", b"alice").await.expect("zscore"),
        Some(4.5)
    );
}

#[tokio::test]
async fn test_save_applies_named_encoder() {
    let mut store = MemoryClient::new();

    inspector(&store)
        .save_key(&SaveRequest {
            key: "blob".to_string(),
            value: "aGVsbG8=".to_string(),
            encoder: Some("base64".to_string()),
            ..Default::default()
        })
        .await
        .expect("save");

    assert_eq!(store.get(b"blob").await.expect("get"), Some(b"hello".to_vec()));
}

#[tokio::test]
async fn test_delete_single_key_message() {
    let mut store = MemoryClient::new();
    store.set(b"doomed", b"x").await.expect("set");

    let message = inspector(&store)
        .delete_keys("doomed")
        .await
        .expect("Failed to delete");

    assert_eq!(message, "Key \"doomed\" has been deleted.");
    assert_eq!(store.exists(b"doomed").await.expect("exists"), 0);
}

#[tokio::test]
async fn test_delete_many_is_plural_and_idempotent() {
    let mut store = MemoryClient::new();
    store.set(b"a", b"1").await.expect("set");
    store.set(b"b", b"2").await.expect("set");

    // Three named, two exist.
    let message = inspector(&store)
        .delete_keys("a,b,ghost")
        .await
        .expect("Failed to delete");

    assert_eq!(message, "Keys have been deleted (2 of 3 existed).");
    assert_eq!(store.exists(b"a").await.expect("exists"), 0);
    assert_eq!(store.exists(b"b").await.expect("exists"), 0);

    // Running it again still reports completion.
    let message = inspector(&store)
        .delete_keys("a,b,ghost")
        .await
        .expect("Failed to delete");
    assert_eq!(message, "Keys have been deleted (0 of 3 existed).");
}

#[tokio::test]
async fn test_delete_sub_key_per_type() {
    let mut store = MemoryClient::new();
    store.list_push(b"l", b"x").await.expect("push");
    store.list_push(b"l", b"y").await.expect("push");
    store.set_add(b"s", b"m").await.expect("sadd");
    store.zset_add(b"z", 1.0, b"m").await.expect("zadd");
    store.hash_set(b"h", b"f", b"v").await.expect("hset");

    let mut engine = inspector(&store);
    engine
        .delete_sub_key(KeyType::List, "l", &SubKey::Index(0))
        .await
        .expect("list sub delete");
    engine
        .delete_sub_key(KeyType::Set, "s", &SubKey::Member("m".to_string()))
        .await
        .expect("set sub delete");
    engine
        .delete_sub_key(KeyType::ZSet, "z", &SubKey::Member("m".to_string()))
        .await
        .expect("zset sub delete");
    engine
        .delete_sub_key(KeyType::Hash, "h", &SubKey::Field("f".to_string()))
        .await
        .expect("hash sub delete");

    assert_eq!(store.list_range(b"l").await.expect("lrange"), vec![b"y".to_vec()]);
    assert_eq!(store.set_card(b"s").await.expect("scard"), 0);
    assert_eq!(store.zset_card(b"z").await.expect("zcard"), 0);
    assert_eq!(store.hash_len(b"h").await.expect("hlen"), 0);
}

#[tokio::test]
async fn test_delete_sub_key_on_scalar_is_unsupported() {
    let mut store = MemoryClient::new();
    store.set(b"scalar", b"x").await.expect("set");

    let result = inspector(&store)
        .delete_sub_key(KeyType::String, "scalar", &SubKey::Index(0))
        .await;

    assert!(matches!(result, Err(Error::Unsupported(_))));
    assert_eq!(store.exists(b"scalar").await.expect("exists"), 1);
}

#[tokio::test]
async fn test_delete_all_keys_flushes_current_database() {
    let mut store = MemoryClient::new();
    store.set(b"a", b"1").await.expect("set");
    store.set(b"b", b"2").await.expect("set");

    let message = inspector(&store)
        .delete_all_keys()
        .await
        .expect("Failed to flush");

    assert_eq!(
        message,
        "All keys from the current database have been removed."
    );
    assert_eq!(store.db_size().await.expect("dbsize"), 0);
}

#[tokio::test]
async fn test_export_import_roundtrip_preserves_each_type() {
    let mut store = MemoryClient::new();
    store.set(b"t:string", b"value").await.expect("set");
    store.list_push(b"t:list", b"a").await.expect("push");
    store.list_push(b"t:list", b"b").await.expect("push");
    store.set_add(b"t:set", b"m").await.expect("sadd");
    store.zset_add(b"t:zset", 1.5, b"m").await.expect("zadd");
    store.hash_set(b"t:hash", b"f", b"v").await.expect("hset");

    let expected = [
        ("t:string", KeyType::String),
        ("t:list", KeyType::List),
        ("t:set", KeyType::Set),
        ("t:zset", KeyType::ZSet),
        ("t:hash", KeyType::Hash),
    ];

    let mut engine = inspector(&store);
    for (key, key_type) in expected {
        let blob = engine.export_key(key).await.expect("Failed to export");
        let copy = format!("{}:copy", key);

        let imported = engine
            .import_key(&blob, &copy, -1, false)
            .await
            .expect("Failed to import");
        assert!(imported, "import of {} refused", key);

        assert_eq!(
            store.key_type(copy.as_bytes()).await.expect("type"),
            key_type
        );
        assert_eq!(store.ttl(copy.as_bytes()).await.expect("ttl"), -1);
        assert_eq!(
            store.dump(copy.as_bytes()).await.expect("dump"),
            store.dump(key.as_bytes()).await.expect("dump"),
            "dump of {} differs after roundtrip",
            key
        );
    }
}

#[tokio::test]
async fn test_import_with_ttl() {
    let mut store = MemoryClient::new();
    store.set(b"orig", b"v").await.expect("set");

    let mut engine = inspector(&store);
    let blob = engine.export_key("orig").await.expect("export");
    engine
        .import_key(&blob, "copy", 60, false)
        .await
        .expect("import");

    let ttl = store.ttl(b"copy").await.expect("ttl");
    assert!((1..=60).contains(&ttl), "unexpected ttl {}", ttl);
}

#[tokio::test]
async fn test_import_refuses_overwrite_without_confirmation() {
    let mut store = MemoryClient::new();
    store.set(b"orig", b"old").await.expect("set");
    store.set(b"other", b"payload").await.expect("set");

    let mut engine = inspector(&store);
    let blob = engine.export_key("other").await.expect("export");

    let imported = engine
        .import_key(&blob, "orig", -1, false)
        .await
        .expect("import");
    assert!(!imported);
    assert_eq!(store.get(b"orig").await.expect("get"), Some(b"old".to_vec()));

    let imported = engine
        .import_key(&blob, "orig", -1, true)
        .await
        .expect("import");
    assert!(imported);
    assert_eq!(
        store.get(b"orig").await.expect("get"),
        Some(b"payload".to_vec())
    );
}

#[tokio::test]
async fn test_export_missing_key_is_not_found() {
    let store = MemoryClient::new();
    assert!(matches!(
        inspector(&store).export_key("ghost").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_count_items_is_null_for_scalars() {
    let mut store = MemoryClient::new();
    store.set(b"s", b"x").await.expect("set");
    store.set_add(b"members", b"a").await.expect("sadd");

    let mut engine = inspector(&store);
    assert_eq!(
        engine.count_items(KeyType::String, "s").await.expect("count"),
        None
    );
    assert_eq!(
        engine
            .count_items(KeyType::Set, "members")
            .await
            .expect("count"),
        Some(1)
    );
}

#[tokio::test]
async fn test_edit_payload_prefills_hash_field() {
    let mut store = MemoryClient::new();
    store.hash_set(b"profile", b"name", b"alice").await.expect("hset");
    store.set_expire(b"profile", 300).await.expect("expire");

    let form = inspector(&store)
        .edit_payload("profile", Some(&SubKey::Field("name".to_string())))
        .await
        .expect("Failed to build form");

    assert_eq!(form.key_type, KeyType::Hash);
    assert_eq!(form.value, "alice");
    assert_eq!(form.hash_field.as_deref(), Some("name"));
    assert!((1..=300).contains(&form.expire), "unexpected ttl {}", form.expire);
    assert_eq!(form.types.len(), 5);
}

#[tokio::test]
async fn test_edit_payload_for_new_key_uses_defaults() {
    let store = MemoryClient::new();
    let form = inspector(&store)
        .edit_payload("", None)
        .await
        .expect("Failed to build form");

    assert_eq!(form.key_type, KeyType::String);
    assert_eq!(form.expire, -1);
    assert!(form.value.is_empty());
}

#[tokio::test]
async fn test_edit_payload_zset_member_loads_score() {
    let mut store = MemoryClient::new();
    store.zset_add(b"board", 7.0, b"alice").await.expect("zadd");

    let form = inspector(&store)
        .edit_payload("board", Some(&SubKey::Member("alice".to_string())))
        .await
        .expect("Failed to build form");

    assert_eq!(form.value, "alice");
    assert_eq!(form.score, Some(7.0));
}

#[tokio::test]
async fn test_server_panel_labels() {
    let mut store = MemoryClient::new();
    store.set(b"k", b"v").await.expect("set");

    let panel = inspector(&store).server_panel().await;

    assert!(panel.contains_key("Version"));
    assert_eq!(panel["Connected clients"], "1");
    assert!(panel.contains_key("Uptime"));
    assert!(panel.contains_key("Memory used"));
    assert_eq!(panel["Keys"], "1 (all databases)");
    assert!(!panel.contains_key("error"));
}

#[tokio::test]
async fn test_databases_labels_include_key_counts() {
    let mut store = MemoryClient::new();
    store.set(b"k", b"v").await.expect("set");

    let slots = inspector(&store)
        .databases(None)
        .await
        .expect("Failed to list databases");

    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0].label, "Database 0 (1 keys)");
    assert_eq!(slots[1].label, "Database 1");

    let limited = inspector(&store)
        .databases(Some(2))
        .await
        .expect("Failed to list databases");
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_server_details_snapshot() {
    let store = MemoryClient::new();
    let details = inspector(&store)
        .server_details()
        .await
        .expect("Failed to fetch details");

    assert!(details.contains_key("server"));
    assert!(details["server"].contains_key("redis_version"));
}
