//! 引擎配置管理
//!
//! 提供配置加载、验证和热重载功能，支持多种配置源：
//! 默认值、TOML配置文件、环境变量覆盖。

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{I18nError, I18nResult};
use crate::fallback::FallbackOptions;
use crate::loader::loader::LoaderOptions;
use crate::storage::cache::CacheOptions;

/// 引擎配置常量
pub mod constants {
    pub const DEFAULT_LANGUAGE: &str = "en";
    pub const DEFAULT_ORIGIN_BASE_URL: &str = "http://localhost:4000/i18n";

    pub const DEFAULT_MAX_ENTRIES: usize = 256;
    pub const DEFAULT_MAX_BYTES: usize = 8 * 1024 * 1024;
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600; // 1小时
    pub const DEFAULT_PERSISTENT_PATH: &str = "~/.cache/linguacache/documents.redb";

    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 4;
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
    pub const DEFAULT_MAX_DELAY_MS: u64 = 10000;
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
    pub const DEFAULT_BACKGROUND_CHUNK_DELAY_MS: u64 = 50;
    pub const DEFAULT_MAX_CONCURRENT_PREFETCH: usize = 2;

    pub const DEFAULT_STORE_ALERT_THRESHOLD: u32 = 5;
    pub const DEFAULT_INCIDENT_BUFFER_SIZE: usize = 256;

    /// 首屏解析必须就绪的命名空间
    pub const CRITICAL_NAMESPACES: &[&str] = &["common", "navigation"];

    /// 全部命名空间，按优先级排列
    pub const DEFAULT_NAMESPACES: &[&str] = &["common", "navigation", "pages"];

    pub const CONFIG_PATHS: &[&str] = &[
        "linguacache.toml",
        ".linguacache.toml",
        "~/.config/linguacache/config.toml",
        "/etc/linguacache/config.toml",
    ];
}

/// 缓存配置段
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSection {
    /// 本地层最大条目数
    pub max_entries: usize,

    /// 本地层最大字节总量
    pub max_bytes: usize,

    /// 各层条目TTL
    #[serde(with = "duration_serde")]
    pub ttl: Duration,

    pub enable_persistent_tier: bool,

    pub enable_edge_tier: bool,

    /// 持久层值压缩
    pub enable_compression: bool,

    /// redb数据库路径，支持 `~` 展开
    pub persistent_path: String,
}

/// 加载器配置段
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderSection {
    pub retry_attempts: u32,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,

    pub backoff_multiplier: f64,

    /// 单次请求超时
    #[serde(with = "duration_serde")]
    pub fetch_timeout: Duration,

    pub critical_namespaces: Vec<String>,

    /// 全部命名空间，后台加载按此顺序
    pub namespaces: Vec<String>,

    pub background_chunk_delay_ms: u64,

    pub max_concurrent_prefetch: usize,
}

/// 降级配置段
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackSection {
    pub development_mode: bool,

    pub store_alert_threshold: u32,

    pub incident_buffer_size: usize,
}

/// 引擎配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    pub default_language: String,

    /// 源站基址，文档路径为 `{基址}/{语言}/{命名空间}`
    pub origin_base_url: String,

    pub cache: CacheSection,

    pub loader: LoaderSection,

    pub fallback: FallbackSection,
}

/// Duration的序列化/反序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl EngineConfig {
    /// 缓存层参数
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            max_entries: self.cache.max_entries,
            max_bytes: self.cache.max_bytes,
            ttl: self.cache.ttl,
            enable_compression: self.cache.enable_compression,
            namespaces: self.loader.namespaces.clone(),
        }
    }

    /// 加载器参数
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            critical_namespaces: self.loader.critical_namespaces.clone(),
            namespaces: self.loader.namespaces.clone(),
            retry_attempts: self.loader.retry_attempts,
            base_delay: Duration::from_millis(self.loader.base_delay_ms),
            max_delay: Duration::from_millis(self.loader.max_delay_ms),
            backoff_multiplier: self.loader.backoff_multiplier,
            background_chunk_delay: Duration::from_millis(self.loader.background_chunk_delay_ms),
            max_concurrent_prefetch: self.loader.max_concurrent_prefetch,
        }
    }

    /// 降级协调器参数
    pub fn fallback_options(&self) -> FallbackOptions {
        FallbackOptions {
            development_mode: self.fallback.development_mode,
            incident_buffer_size: self.fallback.incident_buffer_size,
            store_alert_threshold: self.fallback.store_alert_threshold,
        }
    }

    /// 展开后的持久层数据库路径
    pub fn persistent_path(&self) -> String {
        shellexpand::tilde(&self.cache.persistent_path).to_string()
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: Arc<RwLock<EngineConfig>>,
    last_modified: Arc<RwLock<Option<SystemTime>>>,
    config_path: Option<String>,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> I18nResult<Self> {
        let (config, config_path) = Self::load_config()?;

        let manager = Self {
            config: Arc::new(RwLock::new(config)),
            last_modified: Arc::new(RwLock::new(None)),
            config_path,
        };

        manager.update_last_modified()?;

        Ok(manager)
    }

    /// 获取当前配置
    pub fn get_config(&self) -> I18nResult<EngineConfig> {
        self.config
            .read()
            .map_err(|e| I18nError::ConfigError(format!("读取配置失败: {}", e)))
            .map(|config| config.clone())
    }

    /// 检查并重新加载配置（如果有更改）
    pub fn reload_if_changed(&self) -> I18nResult<bool> {
        if let Some(ref path) = self.config_path {
            let metadata = std::fs::metadata(path)
                .map_err(|e| I18nError::ConfigError(format!("无法读取配置文件元数据: {}", e)))?;

            let modified = metadata
                .modified()
                .map_err(|e| I18nError::ConfigError(format!("无法获取文件修改时间: {}", e)))?;

            let last_modified = self
                .last_modified
                .read()
                .map_err(|e| I18nError::ConfigError(format!("读取锁失败: {}", e)))?;

            if last_modified.map_or(true, |last| modified > last) {
                drop(last_modified);

                let (new_config, _) = Self::load_config()?;

                *self
                    .config
                    .write()
                    .map_err(|e| I18nError::ConfigError(format!("写入锁失败: {}", e)))? =
                    new_config;

                self.update_last_modified()?;

                tracing::info!("配置文件已重新加载: {}", path);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// 加载引擎配置
    fn load_config() -> I18nResult<(EngineConfig, Option<String>)> {
        // 首先尝试加载 .env 文件
        Self::load_dotenv();

        let mut builder = Config::builder();

        // 添加默认配置
        builder = builder.add_source(
            Config::try_from(&Self::default_config())
                .map_err(|e| I18nError::ConfigError(format!("默认配置错误: {}", e)))?,
        );

        // 查找并加载配置文件
        let mut config_path = None;
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                builder = builder.add_source(File::with_name(&expanded_path));
                config_path = Some(expanded_path.to_string());
                tracing::info!("加载配置文件: {}", expanded_path);
                break;
            }
        }

        // 添加环境变量覆盖（启用类型转换）
        builder = builder.add_source(
            Environment::with_prefix("LINGUACACHE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| I18nError::ConfigError(format!("构建配置失败: {}", e)))?;

        let engine_config: EngineConfig = config
            .try_deserialize()
            .map_err(|e| I18nError::ConfigError(format!("反序列化配置失败: {}", e)))?;

        Self::validate_config(&engine_config)?;

        Ok((engine_config, config_path))
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env.development", ".env.production", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() {
                match dotenv::from_filename(env_file) {
                    Ok(_) => {
                        tracing::info!("已加载环境变量文件: {}", env_file);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("无法加载环境变量文件 {}: {}", env_file, e);
                    }
                }
            }
        }
    }

    /// 创建默认配置
    pub fn default_config() -> EngineConfig {
        EngineConfig {
            default_language: constants::DEFAULT_LANGUAGE.to_string(),
            origin_base_url: constants::DEFAULT_ORIGIN_BASE_URL.to_string(),
            cache: CacheSection {
                max_entries: constants::DEFAULT_MAX_ENTRIES,
                max_bytes: constants::DEFAULT_MAX_BYTES,
                ttl: Duration::from_secs(constants::DEFAULT_CACHE_TTL_SECS),
                enable_persistent_tier: false,
                enable_edge_tier: false,
                enable_compression: true,
                persistent_path: constants::DEFAULT_PERSISTENT_PATH.to_string(),
            },
            loader: LoaderSection {
                retry_attempts: constants::DEFAULT_RETRY_ATTEMPTS,
                base_delay_ms: constants::DEFAULT_BASE_DELAY_MS,
                max_delay_ms: constants::DEFAULT_MAX_DELAY_MS,
                backoff_multiplier: constants::DEFAULT_BACKOFF_MULTIPLIER,
                fetch_timeout: Duration::from_secs(constants::DEFAULT_FETCH_TIMEOUT_SECS),
                critical_namespaces: constants::CRITICAL_NAMESPACES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                namespaces: constants::DEFAULT_NAMESPACES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                background_chunk_delay_ms: constants::DEFAULT_BACKGROUND_CHUNK_DELAY_MS,
                max_concurrent_prefetch: constants::DEFAULT_MAX_CONCURRENT_PREFETCH,
            },
            fallback: FallbackSection {
                development_mode: false,
                store_alert_threshold: constants::DEFAULT_STORE_ALERT_THRESHOLD,
                incident_buffer_size: constants::DEFAULT_INCIDENT_BUFFER_SIZE,
            },
        }
    }

    /// 验证配置
    pub fn validate_config(config: &EngineConfig) -> I18nResult<()> {
        if config.default_language.is_empty() {
            return Err(I18nError::ConfigError("默认语言不能为空".to_string()));
        }

        if config.cache.max_entries == 0 {
            return Err(I18nError::ConfigError(
                "本地缓存最大条目数不能为0".to_string(),
            ));
        }

        if config.cache.max_bytes == 0 {
            return Err(I18nError::ConfigError(
                "本地缓存最大字节数不能为0".to_string(),
            ));
        }

        if config.loader.retry_attempts == 0 {
            return Err(I18nError::ConfigError("重试次数不能为0".to_string()));
        }

        if config.loader.base_delay_ms > config.loader.max_delay_ms {
            return Err(I18nError::ConfigError(
                "基础退避时长不能大于最大退避时长".to_string(),
            ));
        }

        if config.loader.backoff_multiplier < 1.0 {
            return Err(I18nError::ConfigError(
                "退避倍数不能小于1.0".to_string(),
            ));
        }

        for critical in &config.loader.critical_namespaces {
            if !config.loader.namespaces.contains(critical) {
                return Err(I18nError::ConfigError(format!(
                    "关键命名空间 '{critical}' 不在命名空间列表中"
                )));
            }
        }

        Ok(())
    }

    /// 更新最后修改时间
    fn update_last_modified(&self) -> I18nResult<()> {
        if let Some(ref path) = self.config_path {
            let metadata = std::fs::metadata(path)
                .map_err(|e| I18nError::ConfigError(format!("无法读取配置文件元数据: {}", e)))?;

            let modified = metadata
                .modified()
                .map_err(|e| I18nError::ConfigError(format!("无法获取文件修改时间: {}", e)))?;

            *self
                .last_modified
                .write()
                .map_err(|e| I18nError::ConfigError(format!("写入锁失败: {}", e)))? =
                Some(modified);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ConfigManager::default_config();
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_entries() {
        let mut config = ConfigManager::default_config();
        config.cache.max_entries = 0;
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let mut config = ConfigManager::default_config();
        config.loader.base_delay_ms = 20000;
        config.loader.max_delay_ms = 1000;
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_critical_namespace() {
        let mut config = ConfigManager::default_config();
        config.loader.critical_namespaces.push("checkout".to_string());
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_options_conversion() {
        let config = ConfigManager::default_config();
        let loader = config.loader_options();
        assert_eq!(loader.base_delay, Duration::from_millis(1000));
        assert_eq!(loader.retry_attempts, 4);

        let cache = config.cache_options();
        assert_eq!(cache.namespaces, config.loader.namespaces);
    }
}
