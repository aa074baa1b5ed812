//! 文档存储后端
//!
//! 持久层和边缘层统一走 [`DocumentStore`] 接口：带TTL的不透明
//! 键值存储。内置内存实现和redb磁盘实现，其他后端按同一
//! 契约接入。

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::error::{I18nError, I18nResult};

/// 存储接口
///
/// 过期条目在读取时视为不存在，实现负责惰性清理
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 后端名称，用于日志和健康检查
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> I18nResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> I18nResult<()>;

    async fn delete(&self, key: &str) -> I18nResult<()>;

    async fn clear(&self) -> I18nResult<()>;

    /// 当前条目数（含未清理的过期条目）
    async fn len(&self) -> I18nResult<usize>;
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn expiry_after(ttl: Duration) -> u64 {
    epoch_millis(SystemTime::now()).saturating_add(ttl.as_millis() as u64)
}

fn now_millis() -> u64 {
    epoch_millis(SystemTime::now())
}

/// 进程内存储，主要用于测试和无持久化部署
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, (Vec<u8>, u64)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> I18nResult<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if *expires_at > now_millis() {
                return Ok(Some(value.clone()));
            }
        }
        // 过期条目惰性删除
        self.entries
            .remove_if(key, |_, (_, expires_at)| *expires_at <= now_millis());
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> I18nResult<()> {
        self.entries
            .insert(key.to_string(), (value, expiry_after(ttl)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> I18nResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> I18nResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn len(&self) -> I18nResult<usize> {
        Ok(self.entries.len())
    }
}

const DOCUMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// redb磁盘存储
///
/// 值的前8个字节是大端编码的过期时间戳（毫秒），其余是负载
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open(path: &Path) -> I18nResult<Self> {
        let db = Database::create(path)
            .map_err(|e| I18nError::StoreUnavailable(format!("打开redb数据库失败: {e}")))?;

        // 建表，保证后续读事务不会因表缺失而失败
        let txn = db
            .begin_write()
            .map_err(|e| I18nError::StoreUnavailable(format!("redb写事务失败: {e}")))?;
        txn.open_table(DOCUMENTS_TABLE)
            .map_err(|e| I18nError::StoreUnavailable(format!("redb建表失败: {e}")))?;
        txn.commit()
            .map_err(|e| I18nError::StoreUnavailable(format!("redb提交失败: {e}")))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn encode(value: &[u8], expires_at: u64) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(8 + value.len());
        encoded.extend_from_slice(&expires_at.to_be_bytes());
        encoded.extend_from_slice(value);
        encoded
    }

    fn decode(encoded: &[u8]) -> Option<(Vec<u8>, u64)> {
        if encoded.len() < 8 {
            return None;
        }
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&encoded[..8]);
        Some((encoded[8..].to_vec(), u64::from_be_bytes(stamp)))
    }
}

#[async_trait]
impl DocumentStore for RedbStore {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn get(&self, key: &str) -> I18nResult<Option<Vec<u8>>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let txn = db
                .begin_read()
                .map_err(|e| I18nError::StoreUnavailable(format!("redb读事务失败: {e}")))?;
            let table = txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(|e| I18nError::StoreUnavailable(format!("redb打开表失败: {e}")))?;
            let found = table
                .get(key.as_str())
                .map_err(|e| I18nError::StoreUnavailable(format!("redb读取失败: {e}")))?
                .and_then(|guard| RedbStore::decode(guard.value()));
            drop(table);

            match found {
                Some((value, expires_at)) if expires_at > now_millis() => Ok(Some(value)),
                Some(_) => {
                    // 过期条目在读路径上直接删除
                    let txn = db
                        .begin_write()
                        .map_err(|e| I18nError::StoreUnavailable(format!("redb写事务失败: {e}")))?;
                    {
                        let mut table = txn.open_table(DOCUMENTS_TABLE).map_err(|e| {
                            I18nError::StoreUnavailable(format!("redb打开表失败: {e}"))
                        })?;
                        table
                            .remove(key.as_str())
                            .map_err(|e| I18nError::StoreUnavailable(format!("redb删除失败: {e}")))?;
                    }
                    txn.commit()
                        .map_err(|e| I18nError::StoreUnavailable(format!("redb提交失败: {e}")))?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| I18nError::StoreUnavailable(format!("redb任务失败: {e}")))?
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> I18nResult<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        let encoded = Self::encode(&value, expiry_after(ttl));
        tokio::task::spawn_blocking(move || {
            let txn = db
                .begin_write()
                .map_err(|e| I18nError::StoreUnavailable(format!("redb写事务失败: {e}")))?;
            {
                let mut table = txn
                    .open_table(DOCUMENTS_TABLE)
                    .map_err(|e| I18nError::StoreUnavailable(format!("redb打开表失败: {e}")))?;
                table
                    .insert(key.as_str(), encoded.as_slice())
                    .map_err(|e| I18nError::StoreUnavailable(format!("redb写入失败: {e}")))?;
            }
            txn.commit()
                .map_err(|e| I18nError::StoreUnavailable(format!("redb提交失败: {e}")))
        })
        .await
        .map_err(|e| I18nError::StoreUnavailable(format!("redb任务失败: {e}")))?
    }

    async fn delete(&self, key: &str) -> I18nResult<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let txn = db
                .begin_write()
                .map_err(|e| I18nError::StoreUnavailable(format!("redb写事务失败: {e}")))?;
            {
                let mut table = txn
                    .open_table(DOCUMENTS_TABLE)
                    .map_err(|e| I18nError::StoreUnavailable(format!("redb打开表失败: {e}")))?;
                table
                    .remove(key.as_str())
                    .map_err(|e| I18nError::StoreUnavailable(format!("redb删除失败: {e}")))?;
            }
            txn.commit()
                .map_err(|e| I18nError::StoreUnavailable(format!("redb提交失败: {e}")))
        })
        .await
        .map_err(|e| I18nError::StoreUnavailable(format!("redb任务失败: {e}")))?
    }

    async fn clear(&self) -> I18nResult<()> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let txn = db
                .begin_write()
                .map_err(|e| I18nError::StoreUnavailable(format!("redb写事务失败: {e}")))?;
            {
                let mut table = txn
                    .open_table(DOCUMENTS_TABLE)
                    .map_err(|e| I18nError::StoreUnavailable(format!("redb打开表失败: {e}")))?;
                table
                    .retain(|_, _| false)
                    .map_err(|e| I18nError::StoreUnavailable(format!("redb清空失败: {e}")))?;
            }
            txn.commit()
                .map_err(|e| I18nError::StoreUnavailable(format!("redb提交失败: {e}")))
        })
        .await
        .map_err(|e| I18nError::StoreUnavailable(format!("redb任务失败: {e}")))?
    }

    async fn len(&self) -> I18nResult<usize> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let txn = db
                .begin_read()
                .map_err(|e| I18nError::StoreUnavailable(format!("redb读事务失败: {e}")))?;
            let table = txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(|e| I18nError::StoreUnavailable(format!("redb打开表失败: {e}")))?;
            let count = table
                .len()
                .map_err(|e| I18nError::StoreUnavailable(format!("redb统计失败: {e}")))?;
            Ok(count as usize)
        })
        .await
        .map_err(|e| I18nError::StoreUnavailable(format!("redb任务失败: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store
            .set("lc:en:common", b"payload".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("lc:en:common").await.unwrap(),
            Some(b"payload".to_vec())
        );
        store.delete("lc:en:common").await.unwrap();
        assert_eq!(store.get("lc:en:common").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        // 过期读取后条目被清理
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redb_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("docs.redb")).unwrap();

        store
            .set("lc:fr:common", b"bonjour".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("lc:fr:common").await.unwrap(),
            Some(b"bonjour".to_vec())
        );
        assert_eq!(store.len().await.unwrap(), 1);

        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redb_store_expired_entry_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("docs.redb")).unwrap();

        store
            .set("k", b"v".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
