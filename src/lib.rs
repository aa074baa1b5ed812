//! # Linguacache
//!
//! 翻译解析与缓存引擎：把「语言+键」解析成本地化、参数替换
//! 后的文本，用分层缓存隐藏网络和存储延迟。
//!
//! ## 模块组织
//!
//! - `catalog` - 文档模型、语言注册表和复数规则
//! - `storage` - 多层缓存与存储后端
//! - `loader` - 文档获取、请求合并与重试
//! - `resolver` - 键查找、复数选择与插值
//! - `fallback` - 降级协调与事件记录
//! - `interpolate` - 参数插值与本地化格式
//! - `config` - 配置加载与验证
//! - `service` - 组合根，对外入口
//!
//! ## 快速开始
//!
//! ```no_run
//! use linguacache::{ConfigManager, I18nService};
//!
//! # async fn example() -> linguacache::I18nResult<()> {
//! let config = ConfigManager::default_config();
//! let service = I18nService::new(config)?;
//! service.warm_default().await;
//!
//! let text = service.translate_simple("common.greeting", "fr").await;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod fallback;
pub mod interpolate;
pub mod loader;
pub mod resolver;
pub mod service;
pub mod storage;

// Re-export commonly used items for convenience
pub use catalog::{
    LanguageDescriptor, LanguageRegistry, Node, PluralCategory, PluralRuleSet,
    TranslationDocument,
};
pub use config::{ConfigManager, EngineConfig};
pub use error::{I18nError, I18nResult, Incident, Severity};
pub use fallback::{FallbackCoordinator, FallbackOptions};
pub use interpolate::{ParamValue, Params};
pub use loader::{DocumentFetcher, HttpFetcher, TranslationLoader};
pub use resolver::{ResolveOptions, TranslationResolver};
pub use service::{EngineStats, HealthStatus, I18nService, I18nServiceBuilder};
pub use storage::{CacheManager, CacheStats, DocumentStore, MemoryStore, RedbStore};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
