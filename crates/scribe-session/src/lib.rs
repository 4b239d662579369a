//! # Scribe Session Storage
//!
//! Scribe 对话会话的持久化存储。
//!
//! ## 功能特性
//!
//! - **键值存储接口**：`get` / `set` / `delete`，内存与文件两种实现
//! - **会话持久化**：对话历史 + 最后写入时间戳
//! - **自动过期**：超过最大保留时间的会话在加载时清除
//! - **损坏恢复**：无法解析的历史被丢弃，不影响启动
//! - **归档**：开启新会话前保留旧历史
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use scribe_session::{FileStore, LoadOutcome, SessionStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(FileStore::new("~/.scribe/session").await?);
//!     let session = SessionStore::new(store).with_max_age(chrono::Duration::hours(24));
//!
//!     match session.load().await? {
//!         LoadOutcome::Loaded(history) => println!("{} messages", history.len()),
//!         other => println!("starting fresh: {:?}", other),
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod file_store;
pub mod session;
pub mod store;

// 重新导出主要类型
pub use error::{StorageError, StorageResult};
pub use file_store::FileStore;
pub use session::{LoadOutcome, SessionKeys, SessionStore};
pub use store::{KeyValueStore, MemoryStore};

/// 默认存储路径
pub fn default_storage_path() -> std::path::PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".scribe").join("session"))
        .unwrap_or_else(|| std::path::PathBuf::from("./scribe_session"))
}
