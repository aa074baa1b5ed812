//! 翻译解析器
//!
//! 把「键+语言+参数」解析成最终文本。查找在内存快照上同步
//! 完成；快照缺失时先经加载器取关键命名空间。解析永不失败，
//! 所有缺失路径都交给降级协调器收尾。

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use crate::catalog::document::{Node, TranslationDocument};
use crate::catalog::language::{LanguageRegistry, NumberConventions};
use crate::catalog::plural::PluralCategory;
use crate::error::I18nError;
use crate::fallback::{FallbackCoordinator, KeyLookup, MissingKeyContext};
use crate::interpolate::{Interpolator, ParamValue, Params};
use crate::loader::loader::TranslationLoader;

/// 单次解析的选项
#[derive(Debug, Default, Clone)]
pub struct ResolveOptions {
    /// 复数计数，同时自动注入为 `{count}` 参数
    pub count: Option<u64>,
    pub params: Params,
    /// 键缺失时调用方自带的替代文本
    pub fallback: Option<String>,
    /// 上下文变体，优先查找 `键_上下文`
    pub context: Option<String>,
}

/// 解析统计信息
#[derive(Debug, Default, Clone)]
pub struct ResolverStats {
    pub resolutions: u64,
    pub plural_resolutions: u64,
    pub missing_keys: u64,
    pub snapshot_loads: u64,
    pub snapshot_refreshes: u64,
}

/// 翻译解析器
pub struct TranslationResolver {
    /// 每语言一份合并快照
    snapshots: DashMap<String, Arc<TranslationDocument>>,
    registry: Arc<LanguageRegistry>,
    loader: Arc<TranslationLoader>,
    fallback: Arc<FallbackCoordinator>,
    interpolator: Interpolator,
    stats: Mutex<ResolverStats>,
}

impl TranslationResolver {
    pub fn new(
        registry: Arc<LanguageRegistry>,
        loader: Arc<TranslationLoader>,
        fallback: Arc<FallbackCoordinator>,
    ) -> Self {
        Self {
            snapshots: DashMap::new(),
            registry,
            loader,
            fallback,
            interpolator: Interpolator::new(),
            stats: Mutex::new(ResolverStats::default()),
        }
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, ResolverStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 解析一个键，永不失败
    pub async fn resolve(&self, key: &str, language: &str, options: &ResolveOptions) -> String {
        self.lock_stats().resolutions += 1;

        // 未注册语言记一笔，按默认语言处理
        let language = match self.registry.descriptor(language) {
            Some(descriptor) => descriptor.code.clone(),
            None => {
                self.fallback
                    .note_error(&I18nError::MissingLanguage(language.to_string()), language);
                self.registry.default_language().to_string()
            }
        };

        let mut snapshot = self.ensure_snapshot(&language).await;
        let conventions = self.conventions(&language);

        // 后台命名空间落缓存后快照不会自动更新，未命中时重合并一次
        if Self::displayable_node(&snapshot, key, options).is_none() {
            self.lock_stats().snapshot_refreshes += 1;
            snapshot = self.refresh_snapshot(&language).await;
        }

        let params = self.effective_params(options);

        match Self::displayable_node(&snapshot, key, options) {
            Some(Node::Leaf(text)) => self.interpolator.render(text, &params, &conventions),
            Some(Node::Plural(forms)) => {
                self.lock_stats().plural_resolutions += 1;
                let category = match options.count {
                    Some(count) => self.plural_category(&language, count),
                    // 没有计数时直接用other形态
                    None => PluralCategory::Other,
                };
                self.interpolator
                    .render(forms.form(category), &params, &conventions)
            }
            _ => {
                self.lock_stats().missing_keys += 1;
                debug!(key, language = %language, "翻译键缺失，进入降级");
                let context = MissingKeyContext {
                    explicit_fallback: options.fallback.clone(),
                };
                let text = self
                    .fallback
                    .on_missing_key(key, &language, &context, self);
                self.interpolator.render(&text, &params, &conventions)
            }
        }
    }

    /// 取可展示节点：上下文变体优先，分组节点不是可展示文本，
    /// 和缺失同样处理
    fn displayable_node<'a>(
        snapshot: &'a TranslationDocument,
        key: &str,
        options: &ResolveOptions,
    ) -> Option<&'a Node> {
        let node = options
            .context
            .as_ref()
            .and_then(|ctx| snapshot.lookup(&format!("{key}_{ctx}")))
            .or_else(|| snapshot.lookup(key));
        match node {
            Some(Node::Leaf(_)) | Some(Node::Plural(_)) => node,
            _ => None,
        }
    }

    /// 取语言快照，缺失时同步等待关键命名空间加载
    async fn ensure_snapshot(&self, language: &str) -> Arc<TranslationDocument> {
        if let Some(snapshot) = self.snapshots.get(language) {
            return Arc::clone(&snapshot);
        }

        self.lock_stats().snapshot_loads += 1;
        let doc = self.loader.load(language).await;
        self.snapshots.insert(language.to_string(), Arc::clone(&doc));
        doc
    }

    /// 预载入一个语言的快照
    pub async fn warm(&self, language: &str) {
        self.ensure_snapshot(language).await;
    }

    /// 丢弃快照，下次解析时重新加载
    pub fn drop_snapshot(&self, language: Option<&str>) {
        match language {
            Some(lang) => {
                self.snapshots.remove(lang);
            }
            None => self.snapshots.clear(),
        }
    }

    /// 用缓存中的最新文档刷新某语言的快照
    pub async fn refresh_snapshot(&self, language: &str) -> Arc<TranslationDocument> {
        let doc = self.loader.load(language).await;
        self.snapshots
            .insert(language.to_string(), Arc::clone(&doc));
        doc
    }

    pub fn snapshot_languages(&self) -> Vec<String> {
        self.snapshots.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> ResolverStats {
        self.lock_stats().clone()
    }

    fn plural_category(&self, language: &str, count: u64) -> PluralCategory {
        match self.registry.descriptor(language) {
            Some(descriptor) => descriptor.plural_rules.select(count),
            None => PluralCategory::Other,
        }
    }

    fn conventions(&self, language: &str) -> NumberConventions {
        self.registry
            .descriptor(language)
            .map(|d| d.conventions.clone())
            .unwrap_or_else(NumberConventions::anglo)
    }

    /// 复数计数自动注入为 `{count}` 参数
    fn effective_params(&self, options: &ResolveOptions) -> Params {
        let mut params = options.params.clone();
        if let Some(count) = options.count {
            params
                .entry("count".to_string())
                .or_insert(ParamValue::Integer(count as i64));
        }
        params
    }
}

impl KeyLookup for TranslationResolver {
    fn lookup_text(&self, language: &str, key: &str) -> Option<String> {
        let snapshot = self.snapshots.get(language)?;
        match snapshot.lookup(key)? {
            Node::Leaf(text) => Some(text.clone()),
            Node::Plural(forms) => Some(forms.other.clone()),
            Node::Group(_) => None,
        }
    }
}
