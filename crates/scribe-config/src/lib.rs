pub mod config;
pub mod manager;

pub use config::{
    Config, ConfigError, ConfigResult, EndpointConfig, LogLevel, LoggingConfig, PlaybackConfig,
    SessionConfig,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// 获取 Scribe 配置目录路径
pub fn scribe_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".scribe"))
}

/// 获取默认配置文件路径
pub fn default_config_path() -> Option<PathBuf> {
    scribe_dir().map(|dir| dir.join("config.json"))
}

/// 获取默认会话目录
pub fn default_session_dir() -> Option<PathBuf> {
    scribe_dir().map(|dir| dir.join("session"))
}

/// 获取默认日志文件路径
pub fn default_log_path() -> Option<PathBuf> {
    scribe_dir().map(|dir| dir.join("logs").join("scribe.log"))
}

/// 初始化 Scribe 目录结构
pub async fn init_scribe_dirs() -> ConfigResult<()> {
    if let Some(scribe) = scribe_dir() {
        tokio::fs::create_dir_all(&scribe).await?;
        tokio::fs::create_dir_all(scribe.join("session")).await?;
        tokio::fs::create_dir_all(scribe.join("logs")).await?;
    }
    Ok(())
}

/// 展开路径中的 ~ 为用户主目录
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None if path == "~" => dirs::home_dir(),
        None => Some(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scribe_dir() {
        let dir = scribe_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().to_string_lossy().contains(".scribe"));
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/.scribe/config.json");
        assert!(expanded.is_some());
        assert!(!expanded.unwrap().to_string_lossy().starts_with("~"));

        assert_eq!(expand_tilde("/tmp/x"), Some(PathBuf::from("/tmp/x")));
    }
}
