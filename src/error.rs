//! 翻译引擎统一错误处理
//!
//! 提供结构化错误类型、严重程度分级和事件记录机制

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::SystemTime;

use thiserror::Error;

/// 翻译引擎错误类型
///
/// 每个变体都携带稳定的错误码（[`I18nError::code`]），供外部观测系统使用
#[derive(Error, Debug, Clone)]
pub enum I18nError {
    /// 获取文档超时
    #[error("请求超时: {0}")]
    FetchTimeout(String),

    /// 源站返回非2xx状态
    #[error("HTTP错误 (状态码 {status}): {message}")]
    FetchHttpError { status: u16, message: String },

    /// 文档结构校验失败
    #[error("文档格式无效: {0}")]
    MalformedDocument(String),

    /// 翻译键不存在
    #[error("语言 '{language}' 中缺少翻译键 '{key}'")]
    MissingKey { key: String, language: String },

    /// 语言未注册或未启用
    #[error("语言不可用: {0}")]
    MissingLanguage(String),

    /// 参数插值失败
    #[error("插值错误: {0}")]
    InterpolationError(String),

    /// 复数类别选择失败
    #[error("复数规则错误: {0}")]
    PluralizationError(String),

    /// 持久化存储层不可用
    #[error("存储不可用: {0}")]
    StoreUnavailable(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),
}

impl I18nError {
    /// 稳定错误码，变体重命名时保持不变
    pub fn code(&self) -> &'static str {
        match self {
            I18nError::FetchTimeout(_) => "FETCH_TIMEOUT",
            I18nError::FetchHttpError { .. } => "FETCH_HTTP_ERROR",
            I18nError::MalformedDocument(_) => "MALFORMED_DOCUMENT",
            I18nError::MissingKey { .. } => "MISSING_KEY",
            I18nError::MissingLanguage(_) => "MISSING_LANGUAGE",
            I18nError::InterpolationError(_) => "INTERPOLATION_ERROR",
            I18nError::PluralizationError(_) => "PLURALIZATION_ERROR",
            I18nError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            I18nError::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            I18nError::FetchTimeout(_) => true,
            I18nError::FetchHttpError { status, .. } => {
                // 4xx属于源站内容问题，重试没有意义
                *status == 0 || *status >= 500 || *status == 429
            }
            I18nError::StoreUnavailable(_) => true,
            I18nError::MalformedDocument(_) => false,
            I18nError::MissingKey { .. } => false,
            I18nError::MissingLanguage(_) => false,
            I18nError::InterpolationError(_) => false,
            I18nError::PluralizationError(_) => false,
            I18nError::ConfigError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> Severity {
        match self {
            I18nError::FetchTimeout(_) => Severity::Medium,
            I18nError::FetchHttpError { .. } => Severity::Medium,
            I18nError::MalformedDocument(_) => Severity::High,
            I18nError::MissingKey { .. } => Severity::Low,
            I18nError::MissingLanguage(_) => Severity::Low,
            I18nError::InterpolationError(_) => Severity::Low,
            I18nError::PluralizationError(_) => Severity::Medium,
            I18nError::StoreUnavailable(_) => Severity::High,
            I18nError::ConfigError(_) => Severity::Critical,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{name}")
    }
}

/// 错误结果类型别名
pub type I18nResult<T> = Result<T, I18nError>;

/// 单条降级事件记录
///
/// 事件只用于外部观测，从不影响调用方的控制流
#[derive(Debug, Clone)]
pub struct Incident {
    pub code: &'static str,
    pub message: String,
    pub language: String,
    pub key: Option<String>,
    pub severity: Severity,
    pub timestamp: SystemTime,
}

/// 有界事件环形缓冲
///
/// 超过容量时丢弃最旧的记录
#[derive(Debug)]
pub struct IncidentLog {
    entries: VecDeque<Incident>,
    capacity: usize,
    total_recorded: u64,
}

impl IncidentLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            total_recorded: 0,
        }
    }

    /// 记录一条事件，同时按严重程度输出日志
    pub fn record(&mut self, incident: Incident) {
        match incident.severity {
            Severity::Low => tracing::debug!(
                code = incident.code,
                language = %incident.language,
                "降级事件: {}",
                incident.message
            ),
            Severity::Medium => tracing::warn!(
                code = incident.code,
                language = %incident.language,
                "降级事件: {}",
                incident.message
            ),
            Severity::High | Severity::Critical => tracing::error!(
                code = incident.code,
                language = %incident.language,
                "降级事件: {}",
                incident.message
            ),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(incident);
        self.total_recorded += 1;
    }

    /// 获取指定语言的事件
    pub fn for_language(&self, language: &str) -> Vec<Incident> {
        self.entries
            .iter()
            .filter(|i| i.language == language)
            .cloned()
            .collect()
    }

    /// 最近的若干条事件，新的在前
    pub fn recent(&self, limit: usize) -> Vec<Incident> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// 汇总统计
    pub fn stats(&self) -> IncidentStats {
        let mut by_language: HashMap<String, usize> = HashMap::new();
        let mut by_severity: HashMap<Severity, usize> = HashMap::new();
        let mut by_code: HashMap<&'static str, usize> = HashMap::new();

        for incident in &self.entries {
            *by_language.entry(incident.language.clone()).or_insert(0) += 1;
            *by_severity.entry(incident.severity).or_insert(0) += 1;
            *by_code.entry(incident.code).or_insert(0) += 1;
        }

        IncidentStats {
            total_recorded: self.total_recorded,
            retained: self.entries.len(),
            by_language,
            by_severity,
            by_code,
        }
    }

    /// 清空事件，可限定语言
    pub fn clear(&mut self, language: Option<&str>) {
        match language {
            Some(lang) => self.entries.retain(|i| i.language != lang),
            None => self.entries.clear(),
        }
    }
}

/// 事件统计信息
#[derive(Debug, Clone)]
pub struct IncidentStats {
    pub total_recorded: u64,
    pub retained: usize,
    pub by_language: HashMap<String, usize>,
    pub by_severity: HashMap<Severity, usize>,
    pub by_code: HashMap<&'static str, usize>,
}
