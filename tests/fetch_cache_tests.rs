// Fetch cache: freshness, stale reads, corruption and persisted sections

use checkengine::fetch_cache::FetchCache;
use checkengine::models::{Section, SourceKind};
use std::time::Duration;
use tempfile::TempDir;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[tokio::test]
async fn test_put_then_get_if_fresh() {
    let dir = TempDir::new().unwrap();
    let cache = FetchCache::new(dir.path(), true);
    let at = now_ms();
    cache
        .put("web01", SourceKind::Agent, b"<<<mem>>>\nMemTotal: 1 kB\n", at)
        .await
        .unwrap();

    let entry = cache
        .get_if_fresh("web01", SourceKind::Agent, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(entry.fetched_at_ms, at);
    assert_eq!(entry.payload, b"<<<mem>>>\nMemTotal: 1 kB\n");
    assert!(cache.entry_path("web01", SourceKind::Agent).ends_with("agent/web01"));

    // Other source types and hosts have their own entries.
    assert!(cache.get("web01", SourceKind::Program).await.is_none());
    assert!(cache.get("web02", SourceKind::Agent).await.is_none());
}

#[tokio::test]
async fn test_stale_entry_is_not_fresh_but_still_readable() {
    let dir = TempDir::new().unwrap();
    let cache = FetchCache::new(dir.path(), true);
    let at = now_ms() - 120_000;
    cache.put("web01", SourceKind::Agent, b"old", at).await.unwrap();

    assert!(
        cache
            .get_if_fresh("web01", SourceKind::Agent, Duration::from_secs(60))
            .await
            .is_none()
    );
    let entry = cache.get("web01", SourceKind::Agent).await.unwrap();
    assert_eq!(entry.payload, b"old");
}

#[tokio::test]
async fn test_zero_max_age_never_hits() {
    let dir = TempDir::new().unwrap();
    let cache = FetchCache::new(dir.path(), true);
    cache.put("web01", SourceKind::Snmp, b"x", now_ms()).await.unwrap();
    assert!(
        cache
            .get_if_fresh("web01", SourceKind::Snmp, Duration::ZERO)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_put_replaces_entry() {
    let dir = TempDir::new().unwrap();
    let cache = FetchCache::new(dir.path(), true);
    cache.put("web01", SourceKind::Program, b"first", now_ms()).await.unwrap();
    cache.put("web01", SourceKind::Program, b"second", now_ms()).await.unwrap();
    assert_eq!(
        cache.get("web01", SourceKind::Program).await.unwrap().payload,
        b"second"
    );
}

#[tokio::test]
async fn test_disabled_cache_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let cache = FetchCache::new(dir.path(), false);
    assert!(!cache.is_enabled());
    cache.put("web01", SourceKind::Agent, b"x", now_ms()).await.unwrap();
    assert!(cache.get("web01", SourceKind::Agent).await.is_none());
    assert!(!cache.entry_path("web01", SourceKind::Agent).exists());
}

#[tokio::test]
async fn test_piggyback_is_never_cached() {
    let dir = TempDir::new().unwrap();
    let cache = FetchCache::new(dir.path(), true);
    cache.put("web01", SourceKind::Piggyback, b"x", now_ms()).await.unwrap();
    assert!(cache.get("web01", SourceKind::Piggyback).await.is_none());
}

#[tokio::test]
async fn test_corrupt_entry_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let cache = FetchCache::new(dir.path(), true);
    let path = cache.entry_path("web01", SourceKind::Agent);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"\xffgarbage").unwrap();

    assert!(cache.get("web01", SourceKind::Agent).await.is_none());

    // A later put repairs it.
    cache.put("web01", SourceKind::Agent, b"ok", now_ms()).await.unwrap();
    assert_eq!(cache.get("web01", SourceKind::Agent).await.unwrap().payload, b"ok");
}

#[tokio::test]
async fn test_persisted_sections_until_expiry() {
    let dir = TempDir::new().unwrap();
    let cache = FetchCache::new(dir.path(), true);
    let now = 1_700_000_000;
    let section = Section::new("job", SourceKind::Agent).with_rows(vec![vec!["done".into()]]);
    cache
        .store_persisted("web01", SourceKind::Agent, Vec::new(), vec![(section, now + 100)], now)
        .await
        .unwrap();

    let loaded = cache.load_persisted("web01", SourceKind::Agent, now + 50).await;
    assert_eq!(loaded.len(), 1);
    let restored = loaded[0].to_cached_section();
    assert!(restored.cached);
    assert_eq!(restored.rows, vec![vec!["done".to_string()]]);
    assert_eq!(restored.cache_info.unwrap().valid_until(), now + 100);

    // Expired exactly at `until`; the file is cleaned up.
    assert!(cache.load_persisted("web01", SourceKind::Agent, now + 100).await.is_empty());
    assert!(cache.load_persisted("web01", SourceKind::Agent, now).await.is_empty());
}

#[tokio::test]
async fn test_store_persisted_merges_by_name() {
    let dir = TempDir::new().unwrap();
    let cache = FetchCache::new(dir.path(), true);
    let now = 1_700_000_000;
    let a = Section::new("a", SourceKind::Agent).with_rows(vec![vec!["1".into()]]);
    let b = Section::new("b", SourceKind::Agent).with_rows(vec![vec!["1".into()]]);
    cache
        .store_persisted("h", SourceKind::Agent, Vec::new(), vec![(a, now + 100), (b, now + 100)], now)
        .await
        .unwrap();

    let previous = cache.load_persisted("h", SourceKind::Agent, now + 10).await;
    let a2 = Section::new("a", SourceKind::Agent).with_rows(vec![vec!["2".into()]]);
    cache
        .store_persisted("h", SourceKind::Agent, previous, vec![(a2, now + 500)], now + 10)
        .await
        .unwrap();

    let loaded = cache.load_persisted("h", SourceKind::Agent, now + 200).await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].section.name, "a");
    assert_eq!(loaded[0].section.rows, vec![vec!["2".to_string()]]);
}
