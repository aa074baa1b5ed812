//! 缓存系统集成测试
//!
//! 测试多层缓存的读写穿透、逐层回填、LRU淘汰、TTL过期
//! 和redb持久层的跨实例恢复。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use linguacache::catalog::TranslationDocument;
use linguacache::storage::{CacheManager, CacheOptions, DocumentStore, MemoryStore, RedbStore};

fn doc(language: &str, namespace: &str, text: &str) -> Arc<TranslationDocument> {
    Arc::new(
        TranslationDocument::from_json(language, namespace, "1", &json!({ "greeting": text }))
            .expect("test document should parse"),
    )
}

fn options(max_entries: usize, ttl: Duration) -> CacheOptions {
    CacheOptions {
        max_entries,
        max_bytes: 1024 * 1024,
        ttl,
        enable_compression: true,
        namespaces: vec!["common".to_string(), "pages".to_string()],
    }
}

/// 测试基本缓存操作
#[tokio::test]
async fn test_basic_cache_operations() {
    let cache = CacheManager::new(options(16, Duration::from_secs(300)));

    // 初始状态应该为空
    assert!(cache.get_namespace("en", "common").await.is_none());

    cache.set_namespace("en", "common", doc("en", "common", "Hello")).await;

    let retrieved = cache
        .get_namespace("en", "common")
        .await
        .expect("cached document should be found");
    assert_eq!(retrieved.language, "en");
    assert!(retrieved.lookup("greeting").is_some());

    println!("✅ Basic cache operations test passed");
}

/// 测试缓存统计和命中率
#[tokio::test]
async fn test_cache_statistics_monitoring() {
    let cache = CacheManager::new(options(16, Duration::from_secs(300)));

    let initial = cache.stats().await;
    assert_eq!(initial.local.hits, 0);
    assert_eq!(initial.local.misses, 0);

    for language in ["en", "fr", "de"] {
        // 首次访问应该是miss
        assert!(cache.get_namespace(language, "common").await.is_none());
        cache.set_namespace(language, "common", doc(language, "common", "hi")).await;
        // 再次访问应该是hit
        assert!(cache.get_namespace(language, "common").await.is_some());
    }

    let stats = cache.stats().await;
    assert_eq!(stats.local.misses, 3);
    assert_eq!(stats.local.hits, 3);
    assert!(stats.local.hit_rate() > 0.0);

    cache.reset_stats().await;
    let reset = cache.stats().await;
    assert_eq!(reset.local.hits, 0);
    assert_eq!(reset.local.misses, 0);

    println!("✅ Cache statistics monitoring test passed");
}

/// 测试容量限制和LRU淘汰：最近访问的条目受保护
#[tokio::test]
async fn test_cache_capacity_and_lru_eviction() {
    let cache = CacheManager::new(options(3, Duration::from_secs(300)));

    for language in ["en", "fr", "de"] {
        cache.set_namespace(language, "common", doc(language, "common", "x")).await;
    }

    // 访问en和fr，把de留在LRU尾部
    assert!(cache.get_namespace("en", "common").await.is_some());
    assert!(cache.get_namespace("fr", "common").await.is_some());

    cache.set_namespace("es", "common", doc("es", "common", "hola")).await;

    assert!(cache.get_namespace("en", "common").await.is_some());
    assert!(cache.get_namespace("fr", "common").await.is_some());
    assert!(cache.get_namespace("es", "common").await.is_some());
    assert!(cache.get_namespace("de", "common").await.is_none(), "最久未访问的条目应被淘汰");

    let stats = cache.stats().await;
    assert_eq!(stats.local.evictions, 1);
    assert_eq!(stats.local.entries, 3);

    println!("✅ LRU eviction test passed");
}

/// 测试TTL过期边界：过期条目读取时按未命中处理
#[tokio::test]
async fn test_ttl_expiry_boundary() {
    let cache = CacheManager::new(options(16, Duration::from_millis(40)));

    cache.set_namespace("en", "common", doc("en", "common", "Hello")).await;
    assert!(cache.get_namespace("en", "common").await.is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(cache.get_namespace("en", "common").await.is_none());

    let stats = cache.stats().await;
    assert_eq!(stats.local.entries, 0, "过期条目应在读取时被删除");

    println!("✅ TTL expiry test passed");
}

/// 测试写穿透：写入同时落到本地层和持久层
#[tokio::test]
async fn test_write_through_to_persistent_tier() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let cache = CacheManager::new(options(16, Duration::from_secs(300)))
        .with_persistent(Arc::clone(&store));

    cache.set_namespace("en", "common", doc("en", "common", "Hello")).await;

    assert_eq!(store.len().await.unwrap(), 1, "写入应穿透到持久层");

    println!("✅ Write-through test passed");
}

/// 测试持久层回填：本地层失去条目后从持久层恢复并提升
#[tokio::test]
async fn test_promotion_from_persistent_tier() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

    // 第一个实例写入后丢弃，模拟进程重启
    {
        let cache = CacheManager::new(options(16, Duration::from_secs(300)))
            .with_persistent(Arc::clone(&store));
        cache.set_namespace("en", "common", doc("en", "common", "Hello")).await;
    }

    let cache = CacheManager::new(options(16, Duration::from_secs(300)))
        .with_persistent(Arc::clone(&store));

    let restored = cache
        .get_namespace("en", "common")
        .await
        .expect("document should be restored from persistent tier");
    assert!(restored.lookup("greeting").is_some());

    let stats = cache.stats().await;
    assert_eq!(stats.persistent.hits, 1);

    // 回填后再次读取命中本地层，不再下探
    assert!(cache.get_namespace("en", "common").await.is_some());
    let stats = cache.stats().await;
    assert_eq!(stats.persistent.requests, 1);
    assert_eq!(stats.local.hits, 1);

    println!("✅ Promotion test passed");
}

/// 测试redb持久层的完整往返（含gzip压缩值）
#[tokio::test]
async fn test_redb_persistent_round_trip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cache.redb");

    {
        let store: Arc<dyn DocumentStore> =
            Arc::new(RedbStore::open(&path).expect("redb should open"));
        let cache = CacheManager::new(options(16, Duration::from_secs(300)))
            .with_persistent(store);
        cache.set_namespace("fr", "common", doc("fr", "common", "Bonjour tout le monde")).await;
    }

    let store: Arc<dyn DocumentStore> =
        Arc::new(RedbStore::open(&path).expect("redb should reopen"));
    let cache = CacheManager::new(options(16, Duration::from_secs(300))).with_persistent(store);

    let restored = cache
        .get_namespace("fr", "common")
        .await
        .expect("document should survive process restart");
    assert_eq!(restored.language, "fr");

    println!("✅ Redb round-trip test passed");
}

/// 测试语言级删除与清空
#[tokio::test]
async fn test_delete_and_clear() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let cache = CacheManager::new(options(16, Duration::from_secs(300)))
        .with_persistent(Arc::clone(&store));

    cache.set_namespace("en", "common", doc("en", "common", "a")).await;
    cache.set_namespace("en", "pages", doc("en", "pages", "b")).await;
    cache.set_namespace("fr", "common", doc("fr", "common", "c")).await;

    cache.delete("en").await;
    assert!(cache.get_namespace("en", "common").await.is_none());
    assert!(cache.get_namespace("en", "pages").await.is_none());
    assert!(cache.get_namespace("fr", "common").await.is_some());

    cache.clear().await;
    assert!(cache.get_namespace("fr", "common").await.is_none());
    assert_eq!(store.len().await.unwrap(), 0);

    println!("✅ Delete and clear test passed");
}

/// 测试语言级合并读取
#[tokio::test]
async fn test_language_level_merged_read() {
    let cache = CacheManager::new(options(16, Duration::from_secs(300)));

    cache.set_namespace("en", "common", doc("en", "common", "Hello")).await;
    let pages = Arc::new(
        TranslationDocument::from_json("en", "pages", "1", &json!({ "title": "Library" }))
            .unwrap(),
    );
    cache.set_namespace("en", "pages", pages).await;

    let merged = cache.get("en").await.expect("merged snapshot");
    assert!(merged.lookup("greeting").is_some());
    assert!(merged.lookup("title").is_some());

    println!("✅ Merged read test passed");
}
