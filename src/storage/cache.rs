//! 多层翻译文档缓存
//!
//! 三层结构：进程内LRU本地层、持久层、边缘层。读取按速度
//! 从快到慢逐层查找，命中后回填被跳过的更快层；写入穿透
//! 所有启用的层。本地层同时受条目数和字节总量限制，过期
//! 条目在读取时惰性删除。

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::catalog::document::TranslationDocument;
use crate::error::I18nResult;
use crate::storage::store::DocumentStore;

/// 压缩标记：值的首字节
const ENCODING_RAW: u8 = 0;
const ENCODING_GZIP: u8 = 1;

/// 缓存键格式 `lc:{语言}:{命名空间}`
pub fn cache_key(language: &str, namespace: &str) -> String {
    format!("lc:{language}:{namespace}")
}

/// 本地层缓存条目
#[derive(Debug, Clone)]
struct CacheEntry {
    document: Arc<TranslationDocument>,
    inserted_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    size_bytes: usize,
}

impl CacheEntry {
    fn new(document: Arc<TranslationDocument>) -> Self {
        let now = Instant::now();
        let size_bytes = document.size_estimate();
        Self {
            document,
            inserted_at: now,
            last_accessed: now,
            access_count: 0,
            size_bytes,
        }
    }

    fn access(&mut self) {
        self.access_count += 1;
        self.last_accessed = Instant::now();
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

/// 单层统计信息
#[derive(Debug, Default, Clone)]
pub struct TierStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub bytes: usize,
}

impl TierStats {
    /// 计算该层命中率
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }

    /// 重置统计信息
    pub fn reset(&mut self) {
        let entries = self.entries;
        let bytes = self.bytes;
        *self = Self::default();
        self.entries = entries;
        self.bytes = bytes;
    }
}

/// 全部层的统计快照
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub local: TierStats,
    pub persistent: TierStats,
    pub edge: TierStats,
}

/// 缓存配置参数
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub max_entries: usize,
    pub max_bytes: usize,
    pub ttl: Duration,
    pub enable_compression: bool,
    /// 配置的命名空间全集，语言级读写按它展开
    pub namespaces: Vec<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entries: 256,
            max_bytes: 8 * 1024 * 1024,
            ttl: Duration::from_secs(3600),
            enable_compression: true,
            namespaces: vec![
                "common".to_string(),
                "navigation".to_string(),
                "pages".to_string(),
            ],
        }
    }
}

/// 本地LRU层
struct LocalTier {
    entries: LruCache<String, CacheEntry>,
    bytes: usize,
}

/// 多层缓存管理器
pub struct CacheManager {
    local: RwLock<LocalTier>,
    persistent: Option<Arc<dyn DocumentStore>>,
    edge: Option<Arc<dyn DocumentStore>>,
    stats: Mutex<CacheStats>,
    options: CacheOptions,
}

impl CacheManager {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            local: RwLock::new(LocalTier {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            persistent: None,
            edge: None,
            stats: Mutex::new(CacheStats::default()),
            options,
        }
    }

    /// 挂载持久层
    pub fn with_persistent(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.persistent = Some(store);
        self
    }

    /// 挂载边缘层
    pub fn with_edge(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.edge = Some(store);
        self
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, CacheStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 读取一个命名空间文档，逐层查找并回填
    pub async fn get_namespace(
        &self,
        language: &str,
        namespace: &str,
    ) -> Option<Arc<TranslationDocument>> {
        let key = cache_key(language, namespace);

        if let Some(doc) = self.get_local(&key).await {
            return Some(doc);
        }

        if let Some(store) = &self.persistent {
            self.lock_stats().persistent.requests += 1;
            match self.get_from_store(store, &key).await {
                Some(doc) => {
                    self.lock_stats().persistent.hits += 1;
                    let doc = Arc::new(doc);
                    // 回填本地层
                    self.put_local(&key, Arc::clone(&doc)).await;
                    return Some(doc);
                }
                None => self.lock_stats().persistent.misses += 1,
            }
        }

        if let Some(store) = &self.edge {
            self.lock_stats().edge.requests += 1;
            match self.get_from_store(store, &key).await {
                Some(doc) => {
                    self.lock_stats().edge.hits += 1;
                    let doc = Arc::new(doc);
                    // 回填持久层和本地层
                    if let Some(persistent) = &self.persistent {
                        self.put_store(persistent, &key, &doc).await;
                    }
                    self.put_local(&key, Arc::clone(&doc)).await;
                    return Some(doc);
                }
                None => self.lock_stats().edge.misses += 1,
            }
        }

        None
    }

    /// 写入一个命名空间文档，穿透所有启用的层
    pub async fn set_namespace(&self, language: &str, namespace: &str, doc: Arc<TranslationDocument>) {
        let key = cache_key(language, namespace);
        self.put_local(&key, Arc::clone(&doc)).await;

        if let Some(store) = &self.persistent {
            self.put_store(store, &key, &doc).await;
        }
        if let Some(store) = &self.edge {
            self.put_store(store, &key, &doc).await;
        }
    }

    /// 读取一个语言的合并快照：所有缓存命中的命名空间合并成一份
    pub async fn get(&self, language: &str) -> Option<TranslationDocument> {
        let mut merged: Option<TranslationDocument> = None;
        for namespace in &self.options.namespaces {
            if let Some(doc) = self.get_namespace(language, namespace).await {
                match &mut merged {
                    Some(snapshot) => snapshot.merge_from(&doc),
                    None => merged = Some((*doc).clone()),
                }
            }
        }
        merged
    }

    /// 检查某语言是否已有任一命名空间被本地层缓存
    pub async fn has_language(&self, language: &str) -> bool {
        let local = self.local.read().await;
        self.options
            .namespaces
            .iter()
            .any(|ns| local.entries.peek(&cache_key(language, ns)).is_some())
    }

    /// 删除一个语言的全部缓存条目
    pub async fn delete(&self, language: &str) {
        {
            let mut local = self.local.write().await;
            for namespace in &self.options.namespaces {
                if let Some(entry) = local.entries.pop(&cache_key(language, namespace)) {
                    local.bytes = local.bytes.saturating_sub(entry.size_bytes);
                }
            }
            let mut stats = self.lock_stats();
            stats.local.entries = local.entries.len();
            stats.local.bytes = local.bytes;
        }

        for store in self.persistent.iter().chain(self.edge.iter()) {
            for namespace in &self.options.namespaces {
                if let Err(e) = store.delete(&cache_key(language, namespace)).await {
                    warn!("删除 {} 层缓存条目失败: {}", store.name(), e);
                }
            }
        }
    }

    /// 清空所有层
    pub async fn clear(&self) {
        {
            let mut local = self.local.write().await;
            local.entries.clear();
            local.bytes = 0;
        }
        for store in self.persistent.iter().chain(self.edge.iter()) {
            if let Err(e) = store.clear().await {
                warn!("清空 {} 层失败: {}", store.name(), e);
            }
        }
        let mut stats = self.lock_stats();
        stats.local.entries = 0;
        stats.local.bytes = 0;
    }

    /// 统计快照
    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.lock_stats().clone();
        let local = self.local.read().await;
        stats.local.entries = local.entries.len();
        stats.local.bytes = local.bytes;

        if let Some(store) = &self.persistent {
            if let Ok(len) = store.len().await {
                stats.persistent.entries = len;
            }
        }
        if let Some(store) = &self.edge {
            if let Ok(len) = store.len().await {
                stats.edge.entries = len;
            }
        }
        stats
    }

    /// 重置命中计数，条目数保持为当前快照
    pub async fn reset_stats(&self) {
        let mut stats = self.lock_stats();
        stats.local.reset();
        stats.persistent.reset();
        stats.edge.reset();
    }

    // ------------------------------------------------------------------
    // 本地层
    // ------------------------------------------------------------------

    async fn get_local(&self, key: &str) -> Option<Arc<TranslationDocument>> {
        let mut local = self.local.write().await;
        self.lock_stats().local.requests += 1;

        if let Some(entry) = local.entries.get_mut(key) {
            if !entry.is_expired(self.options.ttl) {
                entry.access();
                self.lock_stats().local.hits += 1;
                return Some(Arc::clone(&entry.document));
            }
            // 过期条目读取时删除
            if let Some(stale) = local.entries.pop(key) {
                local.bytes = local.bytes.saturating_sub(stale.size_bytes);
            }
        }

        self.lock_stats().local.misses += 1;
        None
    }

    async fn put_local(&self, key: &str, doc: Arc<TranslationDocument>) {
        let mut local = self.local.write().await;
        let entry = CacheEntry::new(doc);
        let added = entry.size_bytes;

        if let Some(previous) = local.entries.put(key.to_string(), entry) {
            local.bytes = local.bytes.saturating_sub(previous.size_bytes);
        }
        local.bytes += added;

        // 条目数和字节总量双重限制，严格按LRU顺序驱逐
        let mut evicted = 0u64;
        while local.entries.len() > self.options.max_entries
            || (local.bytes > self.options.max_bytes && local.entries.len() > 1)
        {
            match local.entries.pop_lru() {
                Some((victim_key, victim)) => {
                    local.bytes = local.bytes.saturating_sub(victim.size_bytes);
                    evicted += 1;
                    debug!("本地层驱逐缓存条目: {}", victim_key);
                }
                None => break,
            }
        }

        let mut stats = self.lock_stats();
        stats.local.evictions += evicted;
        stats.local.entries = local.entries.len();
        stats.local.bytes = local.bytes;
    }

    // ------------------------------------------------------------------
    // 存储层
    // ------------------------------------------------------------------

    async fn get_from_store(
        &self,
        store: &Arc<dyn DocumentStore>,
        key: &str,
    ) -> Option<TranslationDocument> {
        let bytes = match store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("{} 层读取失败: {}", store.name(), e);
                return None;
            }
        };

        match decode_value(&bytes).and_then(|raw| TranslationDocument::from_bytes(&raw)) {
            Ok(doc) => Some(doc),
            Err(e) => {
                // 损坏的条目当作未命中，顺手删除
                warn!("{} 层条目 '{}' 解码失败，已删除: {}", store.name(), key, e);
                if let Err(e) = store.delete(key).await {
                    warn!("{} 层删除损坏条目失败: {}", store.name(), e);
                }
                None
            }
        }
    }

    async fn put_store(&self, store: &Arc<dyn DocumentStore>, key: &str, doc: &TranslationDocument) {
        let raw = match doc.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("文档序列化失败，跳过 {} 层写入: {}", store.name(), e);
                return;
            }
        };
        let encoded = encode_value(&raw, self.options.enable_compression);
        if let Err(e) = store.set(key, encoded, self.options.ttl).await {
            warn!("{} 层写入失败: {}", store.name(), e);
        }
    }
}

/// 编码存储值，压缩失败时降级为未压缩存储
fn encode_value(raw: &[u8], compress: bool) -> Vec<u8> {
    if compress {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(raw.len() / 2 + 16),
            Compression::default(),
        );
        let compressed = encoder
            .write_all(raw)
            .and_then(|_| encoder.finish());
        match compressed {
            Ok(compressed) if compressed.len() < raw.len() => {
                let mut out = Vec::with_capacity(1 + compressed.len());
                out.push(ENCODING_GZIP);
                out.extend_from_slice(&compressed);
                return out;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("gzip压缩失败，降级为未压缩存储: {}", e);
            }
        }
    }
    let mut out = Vec::with_capacity(1 + raw.len());
    out.push(ENCODING_RAW);
    out.extend_from_slice(raw);
    out
}

fn decode_value(encoded: &[u8]) -> I18nResult<Vec<u8>> {
    use crate::error::I18nError;

    match encoded.split_first() {
        Some((&ENCODING_RAW, rest)) => Ok(rest.to_vec()),
        Some((&ENCODING_GZIP, rest)) => {
            let mut decoder = GzDecoder::new(rest);
            let mut raw = Vec::new();
            decoder
                .read_to_end(&mut raw)
                .map_err(|e| I18nError::MalformedDocument(format!("gzip解压失败: {e}")))?;
            Ok(raw)
        }
        _ => Err(I18nError::MalformedDocument(
            "存储值缺少编码标记".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(language: &str, namespace: &str, text: &str) -> Arc<TranslationDocument> {
        let value = json!({ "greeting": text });
        Arc::new(TranslationDocument::from_json(language, namespace, "1", &value).unwrap())
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

    #[tokio::test]
    async fn test_local_hit_and_miss_counting() {
        let cache = CacheManager::new(options(8, Duration::from_secs(60)));
        cache.set_namespace("en", "common", doc("en", "common", "Hello")).await;

        assert!(cache.get_namespace("en", "common").await.is_some());
        assert!(cache.get_namespace("en", "pages").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.local.hits, 1);
        assert_eq!(stats.local.misses, 1);
        assert!(stats.local.hit_rate() > 0.0);
    }

    #[tokio::test]
    async fn test_lru_eviction_order() {
        let cache = CacheManager::new(options(2, Duration::from_secs(60)));
        cache.set_namespace("en", "common", doc("en", "common", "a")).await;
        cache.set_namespace("fr", "common", doc("fr", "common", "b")).await;

        // 访问en使其成为最近使用
        assert!(cache.get_namespace("en", "common").await.is_some());

        cache.set_namespace("de", "common", doc("de", "common", "c")).await;

        assert!(cache.get_namespace("en", "common").await.is_some());
        assert!(cache.get_namespace("fr", "common").await.is_none());
        assert!(cache.get_namespace("de", "common").await.is_some());

        let stats = cache.stats().await;
        assert_eq!(stats.local.evictions, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_on_read() {
        let cache = CacheManager::new(options(8, Duration::from_millis(10)));
        cache.set_namespace("en", "common", doc("en", "common", "Hello")).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get_namespace("en", "common").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.local.entries, 0);
    }

    #[tokio::test]
    async fn test_byte_cap_eviction() {
        let mut opts = options(100, Duration::from_secs(60));
        opts.max_bytes = 150;
        let cache = CacheManager::new(opts);

        for (lang, text) in [("en", "aaaa"), ("fr", "bbbb"), ("de", "cccc")] {
            cache.set_namespace(lang, "common", doc(lang, "common", text)).await;
        }

        let stats = cache.stats().await;
        assert!(stats.local.bytes <= 150 || stats.local.entries == 1);
        assert!(stats.local.evictions >= 1);
        // 最早写入的条目先被驱逐
        assert!(cache.get_namespace("en", "common").await.is_none());
    }

    #[tokio::test]
    async fn test_persistent_promotion() {
        use crate::storage::store::MemoryStore;

        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let cache =
            CacheManager::new(options(8, Duration::from_secs(60))).with_persistent(store);

        cache.set_namespace("en", "common", doc("en", "common", "Hello")).await;

        // 清掉本地层，模拟进程重启后只剩持久层
        {
            let mut local = cache.local.write().await;
            local.entries.clear();
            local.bytes = 0;
        }

        let found = cache.get_namespace("en", "common").await;
        assert!(found.is_some());
        let stats = cache.stats().await;
        assert_eq!(stats.persistent.hits, 1);

        // 回填后第二次读取命中本地层
        assert!(cache.get_namespace("en", "common").await.is_some());
        let stats = cache.stats().await;
        assert_eq!(stats.persistent.requests, 1);
    }

    #[tokio::test]
    async fn test_language_level_merge() {
        let cache = CacheManager::new(options(8, Duration::from_secs(60)));
        cache.set_namespace("en", "common", doc("en", "common", "Hello")).await;

        let value = json!({ "title": "Pages" });
        let pages =
            Arc::new(TranslationDocument::from_json("en", "pages", "1", &value).unwrap());
        cache.set_namespace("en", "pages", pages).await;

        let merged = cache.get("en").await.unwrap();
        assert!(merged.lookup("greeting").is_some());
        assert!(merged.lookup("title").is_some());
    }

    #[test]
    fn test_value_encoding_round_trip() {
        let raw = b"some translation payload that is long enough to compress well \
                    some translation payload that is long enough to compress well";
        let encoded = encode_value(raw, true);
        assert_eq!(encoded[0], ENCODING_GZIP);
        assert_eq!(decode_value(&encoded).unwrap(), raw.to_vec());

        let plain = encode_value(b"tiny", false);
        assert_eq!(plain[0], ENCODING_RAW);
        assert_eq!(decode_value(&plain).unwrap(), b"tiny".to_vec());
    }
}
