//! # Key-Value Store
//!
//! 会话持久化依赖的最小存储接口：按字符串键读写字符串值。

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StorageResult;

/// 字符串键值存储
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 读取键，不存在时返回 `None`
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// 写入（完整替换）
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// 删除键，键不存在时不报错
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// 检查键是否存在
    async fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// 内存存储，进程退出即丢失
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
