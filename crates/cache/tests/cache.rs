//! End-to-end cache behavior over normalized client keys.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use refresh_session_cache::{
    CacheConfig, CacheError, CacheValue, ClientCache, ClientCacheKey, EvictionPolicy,
};

fn key(service: &str) -> ClientCacheKey {
    ClientCacheKey::for_service(service, [])
}

fn hash_of(key: &ClientCacheKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, PartialEq)]
struct FakeClient(&'static str);

#[test]
fn client_cache_key_normalizes_nested_config() {
    let config_a = CacheValue::from_json(&json!({
        "retries": {"max_attempts": 2, "mode": "standard"}
    }));
    let config_b = CacheValue::from_json(&json!({
        "retries": {"mode": "standard", "max_attempts": 2}
    }));

    let key_a = ClientCacheKey::for_service("s3", [("config".to_string(), config_a)]);
    let key_b = ClientCacheKey::for_service("s3", [("config".to_string(), config_b)]);

    assert_eq!(key_a, key_b);
    assert_eq!(hash_of(&key_a), hash_of(&key_b));
}

#[test]
fn client_cache_key_strips_trailing_null() {
    let with_null = ClientCacheKey::new([CacheValue::from("s3"), CacheValue::Null], []);
    let without = ClientCacheKey::new([CacheValue::from("s3")], []);
    assert_eq!(with_null, without);
    assert_eq!(hash_of(&with_null), hash_of(&without));
}

#[test]
fn client_cache_evicts_lru() {
    let cache = ClientCache::new(&CacheConfig {
        max_size: 2,
        ..CacheConfig::default()
    })
    .unwrap();

    let obj_a = Arc::new(FakeClient("s3"));
    let obj_b = Arc::new(FakeClient("sts"));
    let obj_c = Arc::new(FakeClient("ec2"));

    cache.insert(key("s3"), obj_a.clone()).unwrap();
    cache.insert(key("sts"), obj_b).unwrap();

    let hit = cache.get(&key("s3")).expect("s3 cached");
    assert!(Arc::ptr_eq(&hit, &obj_a));

    cache.insert(key("ec2"), obj_c).unwrap();

    assert!(!cache.contains(&key("sts")));
    assert!(cache.contains(&key("s3")));
    assert!(cache.contains(&key("ec2")));
}

#[test]
fn client_cache_evicts_lfu() {
    let cache = ClientCache::new(&CacheConfig {
        max_size: 2,
        eviction_policy: EvictionPolicy::Lfu,
        ..CacheConfig::default()
    })
    .unwrap();

    let obj_a = Arc::new(FakeClient("s3"));
    cache.insert(key("s3"), obj_a.clone()).unwrap();
    cache.insert(key("sts"), Arc::new(FakeClient("sts"))).unwrap();

    for _ in 0..5 {
        let hit = cache.get(&key("s3")).expect("s3 cached");
        assert!(Arc::ptr_eq(&hit, &obj_a));
    }

    cache.insert(key("ec2"), Arc::new(FakeClient("ec2"))).unwrap();

    assert!(!cache.contains(&key("sts")));
    assert!(cache.contains(&key("s3")));
    assert!(cache.contains(&key("ec2")));
}

#[test]
fn insert_of_present_key_is_rejected_and_original_retained() {
    let cache = ClientCache::new(&CacheConfig::default()).unwrap();
    let original = Arc::new(FakeClient("one"));

    cache.insert(key("s3"), original.clone()).unwrap();
    let err = cache
        .insert(key("s3"), Arc::new(FakeClient("two")))
        .unwrap_err();

    assert!(matches!(err, CacheError::AlreadyExists { .. }));
    let cached = cache.get(&key("s3")).expect("still cached");
    assert!(Arc::ptr_eq(&cached, &original));
}

#[test]
fn pop_then_reinsert_is_the_replacement_path() {
    let cache = ClientCache::new(&CacheConfig::default()).unwrap();
    cache.insert(key("s3"), Arc::new(FakeClient("old"))).unwrap();

    let popped = cache.pop(&key("s3")).unwrap();
    assert_eq!(*popped, FakeClient("old"));

    cache.insert(key("s3"), Arc::new(FakeClient("new"))).unwrap();
    assert_eq!(*cache.get(&key("s3")).unwrap(), FakeClient("new"));
}

#[test]
fn snapshot_iteration_is_detached_from_the_cache() {
    let cache = ClientCache::new(&CacheConfig::default()).unwrap();
    cache.insert(key("s3"), Arc::new(FakeClient("s3"))).unwrap();
    cache.insert(key("sts"), Arc::new(FakeClient("sts"))).unwrap();

    let keys = cache.keys();
    cache.clear();

    // The snapshot stays intact after the cache itself is emptied.
    assert_eq!(keys.len(), 2);
    assert!(cache.is_empty());
}

#[test]
fn equivalent_parameter_orderings_share_one_slot() {
    let cache = ClientCache::new(&CacheConfig::default()).unwrap();
    let first = ClientCacheKey::for_service(
        "s3",
        [
            ("region_name".to_string(), CacheValue::from("us-west-2")),
            ("use_ssl".to_string(), CacheValue::from(true)),
        ],
    );
    let second = ClientCacheKey::for_service(
        "s3",
        [
            ("use_ssl".to_string(), CacheValue::from(true)),
            ("region_name".to_string(), CacheValue::from("us-west-2")),
        ],
    );

    cache.insert(first, Arc::new(FakeClient("s3"))).unwrap();
    assert!(cache.get(&second).is_some());
    assert_eq!(cache.len(), 1);
}
