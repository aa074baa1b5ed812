//! 翻译文档加载器
//!
//! 负责把「语言+命名空间」文档从源站取回并写入缓存。核心
//! 行为：同一文档的并发请求合并为一次获取；可重试错误按
//! 指数退避重试；关键命名空间同步等待，其余命名空间在后台
//! 分块加载；预取可被失效操作取消。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::catalog::document::TranslationDocument;
use crate::error::{I18nError, I18nResult};
use crate::fallback::FallbackCoordinator;
use crate::loader::fetcher::DocumentFetcher;
use crate::storage::cache::CacheManager;

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<TranslationDocument>, I18nError>>>;

/// 加载器配置参数
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// 返回前必须就绪的命名空间
    pub critical_namespaces: Vec<String>,
    /// 全部命名空间，按优先级排列
    pub namespaces: Vec<String>,
    pub retry_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// 后台分块之间的间隔
    pub background_chunk_delay: Duration,
    pub max_concurrent_prefetch: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            critical_namespaces: vec!["common".to_string(), "navigation".to_string()],
            namespaces: vec![
                "common".to_string(),
                "navigation".to_string(),
                "pages".to_string(),
            ],
            retry_attempts: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
            background_chunk_delay: Duration::from_millis(50),
            max_concurrent_prefetch: 2,
        }
    }
}

/// 加载统计信息
#[derive(Debug, Default, Clone)]
pub struct LoaderStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub fetches: u64,
    pub retries: u64,
    pub coalesced: u64,
    pub failures: u64,
    pub degraded: u64,
    pub cancelled_writes: u64,
}

/// 翻译文档加载器
pub struct TranslationLoader {
    fetcher: Arc<dyn DocumentFetcher>,
    cache: Arc<CacheManager>,
    fallback: Arc<FallbackCoordinator>,
    /// 每个「语言:命名空间」最多一个在途请求
    in_flight: Arc<DashMap<String, SharedLoad>>,
    /// 按语言递增的代计数，失效时递增使在途结果作废
    generations: Arc<DashMap<String, u64>>,
    /// 全局代计数，整体失效时递增，对所有语言生效
    global_generation: Arc<AtomicU64>,
    prefetch_semaphore: Arc<Semaphore>,
    stats: Arc<Mutex<LoaderStats>>,
    options: LoaderOptions,
}

impl TranslationLoader {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        cache: Arc<CacheManager>,
        fallback: Arc<FallbackCoordinator>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            fetcher,
            cache,
            fallback,
            in_flight: Arc::new(DashMap::new()),
            generations: Arc::new(DashMap::new()),
            global_generation: Arc::new(AtomicU64::new(0)),
            prefetch_semaphore: Arc::new(Semaphore::new(options.max_concurrent_prefetch.max(1))),
            stats: Arc::new(Mutex::new(LoaderStats::default())),
            options,
        }
    }

    fn lock_stats(stats: &Arc<Mutex<LoaderStats>>) -> std::sync::MutexGuard<'_, LoaderStats> {
        stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 全局代与按语言代之和；两者都只增不减，和相等即代未变
    fn current_generation(
        global: &AtomicU64,
        generations: &DashMap<String, u64>,
        language: &str,
    ) -> u64 {
        global.load(Ordering::Acquire) + generations.get(language).map(|g| *g).unwrap_or(0)
    }

    /// 加载一个语言的完整文档
    ///
    /// 关键命名空间并行加载并合并后返回；其余命名空间缓存中
    /// 已有的直接并入，缺的排入后台任务，带小间隔逐个加载，
    /// 不阻塞调用方
    pub async fn load(&self, language: &str) -> Arc<TranslationDocument> {
        let critical = join_all(
            self.options
                .critical_namespaces
                .iter()
                .map(|ns| self.load_namespace(language, ns)),
        )
        .await;

        let mut merged = TranslationDocument::empty(language);
        for result in critical {
            match result {
                Ok(doc) => merged.merge_from(&doc),
                Err(e) => {
                    // 不可恢复的命名空间失败不阻断其余部分
                    warn!(language, "关键命名空间加载失败: {}", e);
                }
            }
        }

        let mut pending = Vec::new();
        for namespace in &self.options.namespaces {
            if self.options.critical_namespaces.contains(namespace) {
                continue;
            }
            match self.cache.get_namespace(language, namespace).await {
                Some(doc) => merged.merge_from(&doc),
                None => pending.push(namespace.clone()),
            }
        }

        self.spawn_background_loads(language, pending);
        Arc::new(merged)
    }

    /// 把缓存中还没有的非关键命名空间排入后台加载
    fn spawn_background_loads(&self, language: &str, background: Vec<String>) {
        if background.is_empty() {
            return;
        }

        let loader = self.clone_handles();
        let language = language.to_string();
        let delay = self.options.background_chunk_delay;
        let semaphore = Arc::clone(&self.prefetch_semaphore);

        tokio::spawn(async move {
            let permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            for namespace in background {
                tokio::time::sleep(delay).await;
                if let Err(e) = loader.load_namespace_inner(&language, &namespace).await {
                    debug!(language = %language, namespace = %namespace, "后台加载失败: {}", e);
                }
            }
            drop(permit);
        });
    }

    /// 加载单个命名空间文档，缓存优先，未命中时合并并发请求
    pub async fn load_namespace(
        &self,
        language: &str,
        namespace: &str,
    ) -> I18nResult<Arc<TranslationDocument>> {
        self.load_namespace_inner(language, namespace).await
    }

    async fn load_namespace_inner(
        &self,
        language: &str,
        namespace: &str,
    ) -> I18nResult<Arc<TranslationDocument>> {
        Self::lock_stats(&self.stats).requests += 1;

        if let Some(doc) = self.cache.get_namespace(language, namespace).await {
            Self::lock_stats(&self.stats).cache_hits += 1;
            return Ok(doc);
        }

        let key = format!("{language}:{namespace}");
        let shared = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(existing) => {
                let shared = existing.get().clone();
                drop(existing);
                Self::lock_stats(&self.stats).coalesced += 1;
                shared
            }
            Entry::Vacant(vacant) => {
                let fut = Self::fetch_and_cache(
                    Arc::clone(&self.fetcher),
                    Arc::clone(&self.cache),
                    Arc::clone(&self.fallback),
                    Arc::clone(&self.in_flight),
                    Arc::clone(&self.generations),
                    Arc::clone(&self.global_generation),
                    Arc::clone(&self.stats),
                    self.options.clone(),
                    key.clone(),
                    language.to_string(),
                    namespace.to_string(),
                )
                .boxed()
                .shared();
                vacant.insert(fut.clone());
                fut
            }
        };

        shared.await
    }

    /// 共享的获取流程：重试、校验、缓存写入、降级
    ///
    /// 缓存写入发生在任何等待者观察到结果之前
    #[allow(clippy::too_many_arguments)]
    async fn fetch_and_cache(
        fetcher: Arc<dyn DocumentFetcher>,
        cache: Arc<CacheManager>,
        fallback: Arc<FallbackCoordinator>,
        in_flight: Arc<DashMap<String, SharedLoad>>,
        generations: Arc<DashMap<String, u64>>,
        global_generation: Arc<AtomicU64>,
        stats: Arc<Mutex<LoaderStats>>,
        options: LoaderOptions,
        key: String,
        language: String,
        namespace: String,
    ) -> Result<Arc<TranslationDocument>, I18nError> {
        let generation = Self::current_generation(&global_generation, &generations, &language);

        let outcome =
            Self::fetch_with_retry(&fetcher, &stats, &options, &language, &namespace).await;

        let result = match outcome {
            Ok(doc) => {
                let doc = Arc::new(doc);
                // 失效操作已推进代计数时丢弃结果，不写缓存
                if Self::current_generation(&global_generation, &generations, &language) == generation
                {
                    cache.set_namespace(&language, &namespace, Arc::clone(&doc)).await;
                } else {
                    Self::lock_stats(&stats).cancelled_writes += 1;
                    debug!(language = %language, namespace = %namespace, "加载结果已过期，丢弃");
                }
                Ok(doc)
            }
            Err(e) => {
                Self::lock_stats(&stats).failures += 1;
                // 重试耗尽后降级，调用方拿到的永远是文档
                let degraded = fallback
                    .on_load_failure(&language, &e, options.retry_attempts)
                    .await;
                Self::lock_stats(&stats).degraded += 1;
                Ok(Arc::new(degraded))
            }
        };

        in_flight.remove(&key);
        result
    }

    /// 单文档获取，按指数退避重试可恢复错误
    async fn fetch_with_retry(
        fetcher: &Arc<dyn DocumentFetcher>,
        stats: &Arc<Mutex<LoaderStats>>,
        options: &LoaderOptions,
        language: &str,
        namespace: &str,
    ) -> I18nResult<TranslationDocument> {
        let attempts = options.retry_attempts.max(1);
        let mut last_error = I18nError::FetchTimeout(format!("{language}/{namespace}"));

        for attempt in 0..attempts {
            Self::lock_stats(stats).fetches += 1;
            match fetcher.fetch(language, namespace).await {
                Ok(value) => return Self::parse_document(language, namespace, &value),
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        language,
                        namespace,
                        attempt = attempt + 1,
                        "获取翻译文档失败: {}",
                        e
                    );
                    last_error = e;
                    if !retryable || attempt + 1 == attempts {
                        break;
                    }
                    Self::lock_stats(stats).retries += 1;
                    tokio::time::sleep(Self::backoff_delay(options, attempt)).await;
                }
            }
        }

        Err(last_error)
    }

    /// 第attempt次失败后的退避时长
    fn backoff_delay(options: &LoaderOptions, attempt: u32) -> Duration {
        let factor = options.backoff_multiplier.max(1.0).powi(attempt as i32);
        let delay = options.base_delay.as_millis() as f64 * factor;
        Duration::from_millis((delay as u64).min(options.max_delay.as_millis() as u64))
    }

    /// 解析源站响应，接受带版本信封或裸树两种形态
    fn parse_document(
        language: &str,
        namespace: &str,
        value: &Value,
    ) -> I18nResult<TranslationDocument> {
        if let (Some(version), Some(tree)) = (
            value.get("version").and_then(Value::as_str),
            value.get("tree"),
        ) {
            return TranslationDocument::from_json(language, namespace, version, tree);
        }
        TranslationDocument::from_json(language, namespace, "0", value)
    }

    /// 后台预取若干语言，跳过已缓存的
    pub fn prefetch(&self, languages: &[String]) {
        for language in languages {
            let loader = self.clone_handles();
            let semaphore = Arc::clone(&self.prefetch_semaphore);
            let language = language.clone();

            tokio::spawn(async move {
                let permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if loader.cache.has_language(&language).await {
                    debug!(language = %language, "预取跳过：语言已缓存");
                } else {
                    info!(language = %language, "预取翻译文档");
                    loader.load(&language).await;
                }
                drop(permit);
            });
        }
    }

    /// 失效缓存并作废在途加载
    pub async fn invalidate(&self, language: Option<&str>) {
        match language {
            Some(lang) => {
                *self.generations.entry(lang.to_string()).or_insert(0) += 1;
                self.cache.delete(lang).await;
                info!(language = lang, "翻译缓存已失效");
            }
            None => {
                // 全局代推进一格，对从未单独失效过的语言同样生效
                self.global_generation.fetch_add(1, Ordering::Release);
                self.cache.clear().await;
                info!("全部翻译缓存已失效");
            }
        }
    }

    pub fn stats(&self) -> LoaderStats {
        Self::lock_stats(&self.stats).clone()
    }

    /// 在途请求数，用于健康检查
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// 复制后台任务需要的共享句柄
    fn clone_handles(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            cache: Arc::clone(&self.cache),
            fallback: Arc::clone(&self.fallback),
            in_flight: Arc::clone(&self.in_flight),
            generations: Arc::clone(&self.generations),
            global_generation: Arc::clone(&self.global_generation),
            prefetch_semaphore: Arc::clone(&self.prefetch_semaphore),
            stats: Arc::clone(&self.stats),
            options: self.options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_growth_and_cap() {
        let options = LoaderOptions {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
            ..Default::default()
        };
        assert_eq!(
            TranslationLoader::backoff_delay(&options, 0),
            Duration::from_millis(1000)
        );
        assert_eq!(
            TranslationLoader::backoff_delay(&options, 1),
            Duration::from_millis(2000)
        );
        assert_eq!(
            TranslationLoader::backoff_delay(&options, 2),
            Duration::from_millis(4000)
        );
        // 超过上限后截断
        assert_eq!(
            TranslationLoader::backoff_delay(&options, 6),
            Duration::from_millis(10000)
        );
    }

    #[test]
    fn test_parse_document_envelope_and_bare_tree() {
        let enveloped = serde_json::json!({
            "version": "7",
            "tree": { "title": "Hello" }
        });
        let doc = TranslationLoader::parse_document("en", "common", &enveloped).unwrap();
        assert_eq!(doc.version, "7");

        let bare = serde_json::json!({ "title": "Hello" });
        let doc = TranslationLoader::parse_document("en", "common", &bare).unwrap();
        assert_eq!(doc.version, "0");
        assert!(doc.lookup("title").is_some());
    }
}
