//! # FileStore Implementation
//!
//! 每个键对应存储目录下的一个文件。
//!
//! 存储结构:
//! ```text
//! <base_path>/
//! ├── chat_history.json
//! ├── chat_history_timestamp.json
//! └── ...
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::store::KeyValueStore;

/// 基于文件的键值存储
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// 创建存储，目录不存在时自动创建
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        debug!("FileStore initialized at {:?}", base_path);
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::other(format!("invalid storage key: '{}'", key)));
        }
        Ok(self.base_path.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        // 写入临时文件后原子替换
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("nested")).await.unwrap();

        assert_eq!(store.get("chat_history").await.unwrap(), None);

        store.set("chat_history", "[]").await.unwrap();
        assert_eq!(store.get("chat_history").await.unwrap(), Some("[]".to_string()));
        assert!(temp_dir.path().join("nested/chat_history.json").exists());

        store.delete("chat_history").await.unwrap();
        assert_eq!(store.get("chat_history").await.unwrap(), None);
        // 删除不存在的键
        store.delete("chat_history").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileStore::new(temp_dir.path()).await.unwrap();
            store.set("k", "persisted").await.unwrap();
        }
        let store = FileStore::new(temp_dir.path()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("persisted".to_string()));
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).await.unwrap();

        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(store.set(key, "x").await.is_err(), "key {:?}", key);
        }
    }
}
