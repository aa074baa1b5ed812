//! 源站文档获取
//!
//! 加载器通过 [`DocumentFetcher`] 接口取回原始JSON树，便于
//! 在测试中用计数桩替换真实HTTP客户端。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{I18nError, I18nResult};

/// 文档获取接口
///
/// 一次调用对应一次源站请求，重试由加载器负责
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// 取回一个「语言+命名空间」的原始JSON树
    async fn fetch(&self, language: &str, namespace: &str) -> I18nResult<Value>;
}

/// 基于reqwest的HTTP获取器
///
/// 请求路径为 `{base}/{语言}/{命名空间}`，单次请求受超时约束
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> I18nResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| I18nError::ConfigError(format!("构建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, language: &str, namespace: &str) -> I18nResult<Value> {
        let url = format!("{}/{}/{}", self.base_url, language, namespace);
        debug!("获取翻译文档: {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                I18nError::FetchTimeout(format!("{language}/{namespace}"))
            } else {
                // 连接层失败没有状态码，记为0以便归入可重试类
                I18nError::FetchHttpError {
                    status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(I18nError::FetchHttpError {
                status: status.as_u16(),
                message: format!("源站对 {language}/{namespace} 返回 {status}"),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            I18nError::MalformedDocument(format!("{language}/{namespace} 响应不是有效JSON: {e}"))
        })
    }
}
