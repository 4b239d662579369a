//! # Persisted Session
//!
//! 对话历史与最后写入时间戳，保存在固定的键下。
//!
//! - 历史：`Message` 的 JSON 数组
//! - 时间戳：RFC 3339 字符串
//! - 归档：开启新会话前旧历史的副本

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use scribe_core::{ConversationHistory, Message};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StorageResult;
use crate::store::KeyValueStore;

/// 会话使用的存储键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKeys {
    pub history: String,
    pub timestamp: String,
    pub archive: String,
}

impl Default for SessionKeys {
    fn default() -> Self {
        Self {
            history: "chat_history".to_string(),
            timestamp: "chat_history_timestamp".to_string(),
            archive: "chat_history_archive".to_string(),
        }
    }
}

/// 加载结果
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// 成功恢复
    Loaded(ConversationHistory),
    /// 没有保存过
    Missing,
    /// 超过最大保留时间，已清除
    Expired,
    /// 内容无法解析，已清除
    Corrupted,
}

impl LoadOutcome {
    pub fn history(self) -> Option<ConversationHistory> {
        match self {
            LoadOutcome::Loaded(history) => Some(history),
            _ => None,
        }
    }

    /// 是否需要从初始对话重新开始
    pub fn needs_reset(&self) -> bool {
        !matches!(self, LoadOutcome::Loaded(_))
    }
}

/// 会话持久化
///
/// 只有 Session Controller 持有并写入它。
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    keys: SessionKeys,
    max_age: Option<Duration>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            keys: SessionKeys::default(),
            max_age: None,
        }
    }

    pub fn with_keys(mut self, keys: SessionKeys) -> Self {
        self.keys = keys;
        self
    }

    /// 设置最大保留时间，超过后加载时视为过期
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub async fn load(&self) -> StorageResult<LoadOutcome> {
        self.load_at(Utc::now()).await
    }

    /// 以 `now` 为当前时间加载
    ///
    /// 设置了过期策略时，缺失或无法解析的时间戳按过期处理。
    pub async fn load_at(&self, now: DateTime<Utc>) -> StorageResult<LoadOutcome> {
        let raw = match self.store.get(&self.keys.history).await? {
            Some(raw) => raw,
            None => return Ok(LoadOutcome::Missing),
        };

        if let Some(max_age) = self.max_age {
            let saved_at = self.saved_at().await?;
            let fresh = matches!(saved_at, Some(at) if now - at <= max_age);
            if !fresh {
                info!(saved_at = ?saved_at, "stored session expired, discarding");
                self.delete().await?;
                return Ok(LoadOutcome::Expired);
            }
        }

        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(messages) => {
                let history = ConversationHistory::from_messages(messages);
                debug!(messages = history.len(), "session restored");
                Ok(LoadOutcome::Loaded(history))
            }
            Err(e) => {
                warn!(error = %e, key = %self.keys.history, "stored session is corrupted, discarding");
                self.delete().await?;
                Ok(LoadOutcome::Corrupted)
            }
        }
    }

    pub async fn save(&self, history: &ConversationHistory) -> StorageResult<()> {
        self.save_at(history, Utc::now()).await
    }

    pub async fn save_at(
        &self,
        history: &ConversationHistory,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let content = serde_json::to_string(history)?;
        self.store.set(&self.keys.history, &content).await?;
        self.store
            .set(&self.keys.timestamp, &now.to_rfc3339())
            .await?;
        debug!(messages = history.len(), "session saved");
        Ok(())
    }

    /// 删除历史和时间戳
    pub async fn delete(&self) -> StorageResult<()> {
        self.store.delete(&self.keys.history).await?;
        self.store.delete(&self.keys.timestamp).await?;
        Ok(())
    }

    /// 把当前保存的历史复制到归档键，返回是否有内容被归档
    pub async fn archive(&self) -> StorageResult<bool> {
        match self.store.get(&self.keys.history).await? {
            Some(raw) => {
                self.store.set(&self.keys.archive, &raw).await?;
                info!(key = %self.keys.archive, "session archived");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 读取归档，归档损坏时返回 `None`
    pub async fn archived(&self) -> StorageResult<Option<ConversationHistory>> {
        let raw = match self.store.get(&self.keys.archive).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(messages) => Ok(Some(ConversationHistory::from_messages(messages))),
            Err(e) => {
                warn!(error = %e, "archived session is corrupted");
                Ok(None)
            }
        }
    }

    /// 最后写入时间，缺失或无法解析时为 `None`
    pub async fn saved_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let raw = self.store.get(&self.keys.timestamp).await?;
        Ok(raw
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
            .map(|ts| ts.with_timezone(&Utc)))
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("keys", &self.keys)
            .field("max_age", &self.max_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn history() -> ConversationHistory {
        let mut history = ConversationHistory::initial(Some("sys"), Some("hello"));
        history.push_user("question");
        history.push_assistant("answer");
        history
    }

    fn session() -> (SessionStore, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SessionStore::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_missing() {
        let (session, _) = session();
        assert_eq!(session.load().await.unwrap(), LoadOutcome::Missing);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (session, store) = session();
        session.save(&history()).await.unwrap();

        assert_eq!(
            session.load().await.unwrap(),
            LoadOutcome::Loaded(history())
        );

        let raw = store.get("chat_history").await.unwrap().unwrap();
        assert!(raw.starts_with(r#"[{"role":"system","content":"sys"}"#));
        assert!(session.saved_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupted_history_is_discarded() {
        let (session, store) = session();
        store.set("chat_history", "{not json").await.unwrap();
        store.set("chat_history_timestamp", &Utc::now().to_rfc3339()).await.unwrap();

        assert_eq!(session.load().await.unwrap(), LoadOutcome::Corrupted);
        assert!(store.is_empty());
        assert_eq!(session.load().await.unwrap(), LoadOutcome::Missing);
    }

    #[tokio::test]
    async fn test_duplicate_system_entries_collapse_on_load() {
        let (session, store) = session();
        store
            .set(
                "chat_history",
                r#"[{"role":"system","content":"a"},{"role":"user","content":"q"},{"role":"system","content":"b"}]"#,
            )
            .await
            .unwrap();

        let history = session.load().await.unwrap().history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.system_prompt(), Some("a"));
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = Arc::new(MemoryStore::new());
        let session = SessionStore::new(store.clone()).with_max_age(Duration::hours(24));

        let saved = Utc::now();
        session.save_at(&history(), saved).await.unwrap();

        let outcome = session.load_at(saved + Duration::hours(23)).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded(_)));

        let outcome = session.load_at(saved + Duration::hours(25)).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Expired);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_timestamp_counts_as_expired() {
        let store = Arc::new(MemoryStore::new());
        let session = SessionStore::new(store.clone()).with_max_age(Duration::hours(1));
        store.set("chat_history", "[]").await.unwrap();

        assert_eq!(session.load().await.unwrap(), LoadOutcome::Expired);
    }

    #[tokio::test]
    async fn test_no_expiry_policy_ignores_timestamp() {
        let (session, store) = session();
        store.set("chat_history", "[]").await.unwrap();
        store.set("chat_history_timestamp", "garbage").await.unwrap();

        assert!(matches!(session.load().await.unwrap(), LoadOutcome::Loaded(_)));
    }

    #[tokio::test]
    async fn test_archive_and_delete() {
        let (session, _) = session();
        assert!(!session.archive().await.unwrap());

        session.save(&history()).await.unwrap();
        assert!(session.archive().await.unwrap());
        session.delete().await.unwrap();

        assert_eq!(session.load().await.unwrap(), LoadOutcome::Missing);
        assert_eq!(session.archived().await.unwrap(), Some(history()));
    }

    #[tokio::test]
    async fn test_custom_keys() {
        let (session, store) = session();
        let session = session.with_keys(SessionKeys {
            history: "h".to_string(),
            timestamp: "t".to_string(),
            archive: "a".to_string(),
        });
        session.save(&history()).await.unwrap();
        assert!(store.contains("h").await.unwrap());
        assert!(store.contains("t").await.unwrap());
    }
}
