//! 翻译服务组合根
//!
//! 把注册表、缓存、加载器、降级协调器和解析器显式组装成
//! 一个服务实例。没有全局单例，所有依赖都在这里构造并
//! 注入，测试可以通过构建器替换任意部件。

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::catalog::language::LanguageRegistry;
use crate::config::EngineConfig;
use crate::error::{I18nError, I18nResult, Incident, IncidentStats};
use crate::fallback::FallbackCoordinator;
use crate::loader::fetcher::{DocumentFetcher, HttpFetcher};
use crate::loader::loader::{LoaderStats, TranslationLoader};
use crate::resolver::{ResolveOptions, ResolverStats, TranslationResolver};
use crate::storage::cache::{CacheManager, CacheStats};
use crate::storage::store::{DocumentStore, RedbStore};

/// 服务构建器
///
/// 未显式注入的部件按配置构造默认实现
pub struct I18nServiceBuilder {
    config: EngineConfig,
    registry: Option<Arc<LanguageRegistry>>,
    fetcher: Option<Arc<dyn DocumentFetcher>>,
    persistent: Option<Arc<dyn DocumentStore>>,
    edge: Option<Arc<dyn DocumentStore>>,
}

impl I18nServiceBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            fetcher: None,
            persistent: None,
            edge: None,
        }
    }

    pub fn registry(mut self, registry: Arc<LanguageRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn persistent_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.persistent = Some(store);
        self
    }

    pub fn edge_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.edge = Some(store);
        self
    }

    pub fn build(self) -> I18nResult<I18nService> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(LanguageRegistry::builtin()),
        };

        if registry.descriptor(&self.config.default_language).is_none() {
            return Err(I18nError::ConfigError(format!(
                "默认语言 '{}' 不在语言注册表中",
                self.config.default_language
            )));
        }

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(
                &self.config.origin_base_url,
                self.config.loader.fetch_timeout,
            )?),
        };

        let mut cache = CacheManager::new(self.config.cache_options());

        if let Some(store) = self.persistent {
            cache = cache.with_persistent(store);
        } else if self.config.cache.enable_persistent_tier {
            let path = self.config.persistent_path();
            if let Some(parent) = Path::new(&path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    I18nError::ConfigError(format!("创建持久层目录失败: {e}"))
                })?;
            }
            cache = cache.with_persistent(Arc::new(RedbStore::open(Path::new(&path))?));
        }

        if let Some(store) = self.edge {
            cache = cache.with_edge(store);
        } else if self.config.cache.enable_edge_tier {
            // 边缘层没有内置后端，必须由部署方注入
            return Err(I18nError::ConfigError(
                "启用边缘层时必须通过构建器注入边缘存储".to_string(),
            ));
        }

        let cache = Arc::new(cache);

        let fallback = Arc::new(FallbackCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&cache) as Arc<dyn crate::fallback::CacheReader>,
            self.config.fallback_options(),
        ));

        let loader = Arc::new(TranslationLoader::new(
            fetcher,
            Arc::clone(&cache),
            Arc::clone(&fallback),
            self.config.loader_options(),
        ));

        let resolver = Arc::new(TranslationResolver::new(
            Arc::clone(&registry),
            Arc::clone(&loader),
            Arc::clone(&fallback),
        ));

        Ok(I18nService {
            config: self.config,
            registry,
            cache,
            loader,
            fallback,
            resolver,
        })
    }
}

/// 全部组件的统计快照
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub cache: CacheStats,
    pub loader: LoaderStats,
    pub resolver: ResolverStats,
    pub incidents: IncidentStats,
}

/// 健康检查结果
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub local_entries: usize,
    pub in_flight_loads: usize,
    pub snapshot_languages: usize,
    pub recent_critical_incidents: usize,
}

/// 翻译服务
pub struct I18nService {
    config: EngineConfig,
    registry: Arc<LanguageRegistry>,
    cache: Arc<CacheManager>,
    loader: Arc<TranslationLoader>,
    fallback: Arc<FallbackCoordinator>,
    resolver: Arc<TranslationResolver>,
}

impl I18nService {
    /// 按配置构造服务，所有部件取默认实现
    pub fn new(config: EngineConfig) -> I18nResult<Self> {
        I18nServiceBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> I18nServiceBuilder {
        I18nServiceBuilder::new(config)
    }

    /// 预热默认语言，通常在启动时调用一次
    pub async fn warm_default(&self) {
        info!(language = %self.config.default_language, "预热默认语言");
        self.resolver.warm(&self.config.default_language).await;
    }

    /// 解析一个翻译键，永不失败
    pub async fn translate(&self, key: &str, language: &str, options: &ResolveOptions) -> String {
        self.resolver.resolve(key, language, options).await
    }

    /// 无参数的便捷解析
    pub async fn translate_simple(&self, key: &str, language: &str) -> String {
        self.resolver
            .resolve(key, language, &ResolveOptions::default())
            .await
    }

    /// 预载入若干语言，已缓存的跳过
    pub async fn preload(&self, languages: &[String]) {
        for language in languages {
            if self.cache.has_language(language).await {
                continue;
            }
            self.resolver.warm(language).await;
        }
    }

    /// 后台预取若干语言，立即返回
    pub fn prefetch(&self, languages: &[String]) {
        self.loader.prefetch(languages);
    }

    /// 失效缓存和快照；`None` 表示全部语言
    pub async fn invalidate(&self, language: Option<&str>) {
        self.loader.invalidate(language).await;
        self.resolver.drop_snapshot(language);
    }

    /// 缓存统计
    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// 全组件统计快照
    pub async fn detailed_stats(&self) -> EngineStats {
        EngineStats {
            cache: self.cache.stats().await,
            loader: self.loader.stats(),
            resolver: self.resolver.stats(),
            incidents: self.fallback.incident_stats(),
        }
    }

    /// 最近的降级事件
    pub fn incidents(&self, limit: usize) -> Vec<Incident> {
        self.fallback.recent_incidents(limit)
    }

    /// 某语言的降级事件
    pub fn incidents_for_language(&self, language: &str) -> Vec<Incident> {
        self.fallback.incidents_for_language(language)
    }

    /// 健康检查
    pub async fn health_check(&self) -> HealthStatus {
        let cache_stats = self.cache.stats().await;
        let incident_stats = self.fallback.incident_stats();
        let critical = incident_stats
            .by_severity
            .get(&crate::error::Severity::Critical)
            .copied()
            .unwrap_or(0)
            + incident_stats
                .by_severity
                .get(&crate::error::Severity::High)
                .copied()
                .unwrap_or(0);

        HealthStatus {
            healthy: critical == 0,
            local_entries: cache_stats.local.entries,
            in_flight_loads: self.loader.in_flight_count(),
            snapshot_languages: self.resolver.snapshot_languages().len(),
            recent_critical_incidents: critical,
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
