//! 降级协调器
//!
//! 所有失败路径的终点。加载彻底失败时给出尽可能好的替代
//! 文档，键缺失时给出尽可能好的替代文本，调用方永远拿到
//! 字符串或文档，从不拿到错误。每次降级都记录为事件供
//! 外部观测。

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::catalog::document::TranslationDocument;
use crate::catalog::language::LanguageRegistry;
use crate::error::{I18nError, Incident, IncidentLog, IncidentStats, Severity};
use crate::storage::cache::CacheManager;

/// 缓存读取能力
///
/// 协调器只需要按语言读合并快照这一件事，用窄接口注入
#[async_trait]
pub trait CacheReader: Send + Sync {
    async fn cached_language(&self, language: &str) -> Option<TranslationDocument>;
}

#[async_trait]
impl CacheReader for CacheManager {
    async fn cached_language(&self, language: &str) -> Option<TranslationDocument> {
        self.get(language).await
    }
}

/// 键查找能力，由解析器实现
///
/// 协调器用它在回退链的其他语言快照里找同一个键
pub trait KeyLookup: Send + Sync {
    /// 返回某语言快照中该键的文本，复数节点取other形态
    fn lookup_text(&self, language: &str, key: &str) -> Option<String>;
}

/// 键缺失时的调用方上下文
#[derive(Debug, Default, Clone)]
pub struct MissingKeyContext {
    /// 调用方自带的替代文本
    pub explicit_fallback: Option<String>,
}

/// 协调器配置
#[derive(Debug, Clone)]
pub struct FallbackOptions {
    pub development_mode: bool,
    pub incident_buffer_size: usize,
    /// 连续存储失败达到该值时发出一次高严重度告警
    pub store_alert_threshold: u32,
}

impl Default for FallbackOptions {
    fn default() -> Self {
        Self {
            development_mode: false,
            incident_buffer_size: 256,
            store_alert_threshold: 5,
        }
    }
}

/// 降级协调器
pub struct FallbackCoordinator {
    registry: Arc<LanguageRegistry>,
    cache: Arc<dyn CacheReader>,
    incidents: Mutex<IncidentLog>,
    store_failures: AtomicU32,
    store_alerted: AtomicBool,
    options: FallbackOptions,
}

impl FallbackCoordinator {
    pub fn new(
        registry: Arc<LanguageRegistry>,
        cache: Arc<dyn CacheReader>,
        options: FallbackOptions,
    ) -> Self {
        Self {
            registry,
            cache,
            incidents: Mutex::new(IncidentLog::new(options.incident_buffer_size)),
            store_failures: AtomicU32::new(0),
            store_alerted: AtomicBool::new(false),
            options,
        }
    }

    fn lock_incidents(&self) -> std::sync::MutexGuard<'_, IncidentLog> {
        self.incidents.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, error: &I18nError, language: &str, key: Option<&str>) {
        self.lock_incidents().record(Incident {
            code: error.code(),
            message: error.to_string(),
            language: language.to_string(),
            key: key.map(str::to_string),
            severity: error.severity(),
            timestamp: SystemTime::now(),
        });

        if matches!(error, I18nError::StoreUnavailable(_)) {
            self.note_store_failure(language);
        } else {
            self.store_failures.store(0, Ordering::Relaxed);
        }
    }

    /// 连续存储失败计数，过阈值时只告警一次
    fn note_store_failure(&self, language: &str) {
        let failures = self.store_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.options.store_alert_threshold
            && !self.store_alerted.swap(true, Ordering::Relaxed)
        {
            let message = format!("存储层连续失败 {failures} 次，翻译缓存可能已完全降级");
            error!("{}", message);
            self.lock_incidents().record(Incident {
                code: "STORE_DEGRADED_ALERT",
                message,
                language: language.to_string(),
                key: None,
                severity: Severity::High,
                timestamp: SystemTime::now(),
            });
        }
    }

    /// 加载重试耗尽后的降级路径
    ///
    /// 依次尝试：回退链上各语言的缓存快照、默认语言的缓存
    /// 快照、空文档。日志严重度逐级上升，调用方永远拿到文档
    pub async fn on_load_failure(
        &self,
        language: &str,
        cause: &I18nError,
        attempts: u32,
    ) -> TranslationDocument {
        self.record(cause, language, None);
        warn!(
            language,
            attempts, "加载在重试耗尽后失败，进入降级: {}", cause
        );

        let chain = self.registry.fallback_chain(language);
        for fallback_lang in chain.iter().skip(1) {
            if let Some(doc) = self.cache.cached_language(fallback_lang).await {
                warn!(
                    language,
                    fallback = %fallback_lang,
                    "使用回退语言的缓存文档"
                );
                return doc;
            }
        }

        // 链中没有默认语言时（未注册的语言）单独兜底一次
        let default = self.registry.default_language();
        if default != language && !chain.iter().any(|l| l == default) {
            if let Some(doc) = self.cache.cached_language(default).await {
                error!(language, "回退链全部未命中，使用默认语言缓存文档");
                return doc;
            }
        }

        error!(language, "所有降级路径均未命中，返回空文档");
        TranslationDocument::empty(language)
    }

    /// 键缺失时的降级路径
    ///
    /// 依次尝试：回退链中其他语言的同键文本（开发模式下打
    /// 语言标记）、调用方自带的替代文本、占位文本。开发模式
    /// 的占位是 `[键名]`，生产模式对键的末段做人类可读化
    pub fn on_missing_key(
        &self,
        key: &str,
        language: &str,
        context: &MissingKeyContext,
        lookup: &dyn KeyLookup,
    ) -> String {
        self.record(
            &I18nError::MissingKey {
                key: key.to_string(),
                language: language.to_string(),
            },
            language,
            Some(key),
        );

        for fallback_lang in self.registry.fallback_chain(language).iter().skip(1) {
            if let Some(text) = lookup.lookup_text(fallback_lang, key) {
                if self.options.development_mode {
                    return format!("{text} [{fallback_lang}]");
                }
                return text;
            }
        }

        if let Some(explicit) = &context.explicit_fallback {
            return explicit.clone();
        }

        if self.options.development_mode {
            format!("[{key}]")
        } else {
            humanize_key_segment(key)
        }
    }

    /// 记录一条非降级路径上的错误（比如后台预取失败）
    pub fn note_error(&self, error: &I18nError, language: &str) {
        self.record(error, language, None);
    }

    pub fn recent_incidents(&self, limit: usize) -> Vec<Incident> {
        self.lock_incidents().recent(limit)
    }

    pub fn incidents_for_language(&self, language: &str) -> Vec<Incident> {
        self.lock_incidents().for_language(language)
    }

    pub fn incident_stats(&self) -> IncidentStats {
        self.lock_incidents().stats()
    }

    pub fn clear_incidents(&self, language: Option<&str>) {
        self.lock_incidents().clear(language);
    }
}

/// 把键的末段变成可展示的文本
///
/// `user.profile.firstName` → "First name"，`save_button` → "Save button"
fn humanize_key_segment(key: &str) -> String {
    let segment = key.rsplit('.').next().unwrap_or(key);

    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    for ch in segment.chars() {
        if ch == '_' || ch == '-' {
            if !current.is_empty() {
                words.push(current.clone());
                current.clear();
            }
        } else if ch.is_uppercase() && !current.is_empty() {
            words.push(current.clone());
            current.clear();
            current.extend(ch.to_lowercase());
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    if words.is_empty() {
        return key.to_string();
    }

    let mut result = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                result.extend(first.to_uppercase());
                result.push_str(chars.as_str());
            }
        } else {
            result.push(' ');
            result.push_str(word);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StubCache {
        docs: HashMap<String, TranslationDocument>,
    }

    #[async_trait]
    impl CacheReader for StubCache {
        async fn cached_language(&self, language: &str) -> Option<TranslationDocument> {
            self.docs.get(language).cloned()
        }
    }

    struct StubLookup {
        texts: HashMap<(String, String), String>,
    }

    impl KeyLookup for StubLookup {
        fn lookup_text(&self, language: &str, key: &str) -> Option<String> {
            self.texts
                .get(&(language.to_string(), key.to_string()))
                .cloned()
        }
    }

    fn coordinator(development_mode: bool, cache: StubCache) -> FallbackCoordinator {
        FallbackCoordinator::new(
            Arc::new(LanguageRegistry::builtin()),
            Arc::new(cache),
            FallbackOptions {
                development_mode,
                ..Default::default()
            },
        )
    }

    fn empty_cache() -> StubCache {
        StubCache {
            docs: HashMap::new(),
        }
    }

    #[test]
    fn test_humanize_key_segment() {
        assert_eq!(humanize_key_segment("user.profile.firstName"), "First name");
        assert_eq!(humanize_key_segment("save_button"), "Save button");
        assert_eq!(humanize_key_segment("title"), "Title");
    }

    #[test]
    fn test_missing_key_dev_placeholder() {
        let coord = coordinator(true, empty_cache());
        let lookup = StubLookup {
            texts: HashMap::new(),
        };
        let text = coord.on_missing_key(
            "pages.home.title",
            "fr",
            &MissingKeyContext::default(),
            &lookup,
        );
        assert_eq!(text, "[pages.home.title]");
    }

    #[test]
    fn test_missing_key_production_humanized() {
        let coord = coordinator(false, empty_cache());
        let lookup = StubLookup {
            texts: HashMap::new(),
        };
        let text = coord.on_missing_key(
            "pages.home.pageTitle",
            "fr",
            &MissingKeyContext::default(),
            &lookup,
        );
        assert_eq!(text, "Page title");
    }

    #[test]
    fn test_missing_key_fallback_chain_with_dev_tag() {
        let coord = coordinator(true, empty_cache());
        let mut texts = HashMap::new();
        texts.insert(
            ("en".to_string(), "greeting".to_string()),
            "Hello".to_string(),
        );
        let lookup = StubLookup { texts };

        let text = coord.on_missing_key("greeting", "fr", &MissingKeyContext::default(), &lookup);
        assert_eq!(text, "Hello [en]");
    }

    #[test]
    fn test_missing_key_explicit_fallback_wins_over_placeholder() {
        let coord = coordinator(false, empty_cache());
        let lookup = StubLookup {
            texts: HashMap::new(),
        };
        let context = MissingKeyContext {
            explicit_fallback: Some("Default text".to_string()),
        };
        let text = coord.on_missing_key("unknown.key", "de", &context, &lookup);
        assert_eq!(text, "Default text");
    }

    #[tokio::test]
    async fn test_load_failure_falls_back_to_cached_default() {
        let mut docs = HashMap::new();
        docs.insert(
            "en".to_string(),
            TranslationDocument::from_json(
                "en",
                "common",
                "1",
                &serde_json::json!({ "title": "Hello" }),
            )
            .unwrap(),
        );
        let coord = coordinator(false, StubCache { docs });

        let doc = coord
            .on_load_failure("fr", &I18nError::FetchTimeout("fr/common".into()), 4)
            .await;
        assert_eq!(doc.language, "en");
        assert!(doc.lookup("title").is_some());
    }

    #[tokio::test]
    async fn test_load_failure_returns_empty_when_nothing_cached() {
        let coord = coordinator(false, empty_cache());
        let doc = coord
            .on_load_failure("fr", &I18nError::FetchTimeout("fr/common".into()), 4)
            .await;
        assert!(doc.is_empty());
        assert_eq!(doc.language, "fr");
    }

    #[test]
    fn test_store_alert_fires_once() {
        let coord = coordinator(false, empty_cache());
        for _ in 0..8 {
            coord.note_error(&I18nError::StoreUnavailable("redb".into()), "en");
        }
        let stats = coord.incident_stats();
        assert_eq!(stats.by_code.get("STORE_DEGRADED_ALERT"), Some(&1));
    }
}
