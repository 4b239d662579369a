use crate::config::{Config, ConfigError, ConfigResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 配置管理器
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    /// 加载配置文件，不存在时写入默认配置
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            Self::read_file(path).await?
        } else {
            info!("Config file not found, creating default config at {:?}", path);
            let default_config = Config::default();
            // 确保父目录存在
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = serde_json::to_string_pretty(&default_config)?;
            tokio::fs::write(path, &content).await?;
            default_config
        };

        Ok(Self {
            path: path.to_path_buf(),
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 从默认位置加载配置
    pub async fn load_default() -> ConfigResult<Self> {
        let config_path = Self::default_config_path()?;
        Self::load(&config_path).await
    }

    /// 获取默认配置路径 (~/.scribe/config.json)
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        crate::default_config_path()
            .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))
    }

    /// 创建一个新的配置管理器（用于测试）
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// 获取配置的只读引用
    pub fn get(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// 当前配置的副本
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    /// 保存配置到文件
    pub async fn save(&self) -> ConfigResult<()> {
        self.save_to(&self.path).await?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    /// 保存配置到指定路径
    pub async fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let config = self.config.read().await;
        let content = serde_json::to_string_pretty(&*config)?;
        drop(config);

        // 确保父目录存在
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload(&self) -> ConfigResult<()> {
        if !self.path.exists() {
            return Err(ConfigError::InvalidPath(format!(
                "Config file not found: {:?}",
                self.path
            )));
        }

        let new_config = Self::read_file(&self.path).await?;

        let mut config = self.config.write().await;
        *config = new_config;
        drop(config);

        info!("Config reloaded from {:?}", self.path);
        Ok(())
    }

    /// 更新配置并保存，校验失败时不改动
    pub async fn update<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config) -> ConfigResult<()>,
    {
        let mut config = self.config.write().await;
        let mut updated = config.clone();
        f(&mut updated)?;
        Self::validate(&updated)?;
        *config = updated;
        drop(config);
        self.save().await
    }

    /// 验证配置
    pub fn validate(config: &Config) -> ConfigResult<()> {
        let url = config.endpoint.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "Endpoint url must be http(s): '{}'",
                config.endpoint.url
            )));
        }

        if config.endpoint.done_sentinel.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Endpoint done_sentinel cannot be empty".to_string(),
            ));
        }

        if config.endpoint.text_field.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Endpoint text_field cannot be empty".to_string(),
            ));
        }

        if config.session.max_age_hours == Some(0) {
            return Err(ConfigError::Validation(
                "Session max_age_hours must be greater than 0".to_string(),
            ));
        }

        let keys = [
            &config.session.history_key,
            &config.session.timestamp_key,
            &config.session.archive_key,
        ];
        if keys.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "Session storage keys cannot be empty".to_string(),
            ));
        }
        if keys[0] == keys[1] || keys[0] == keys[2] || keys[1] == keys[2] {
            return Err(ConfigError::Validation(
                "Session storage keys must be distinct".to_string(),
            ));
        }

        Ok(())
    }

    async fn read_file(path: &Path) -> ConfigResult<Config> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::expand_env_vars(&content)?;
        let config: Config = serde_json::from_str(&content)?;
        Self::validate(&config)?;
        debug!("Config parsed from {:?}", path);
        Ok(config)
    }

    /// 展开环境变量 ${VAR} 或 ${VAR:-default}
    fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_expr = &cap[1];

            // 处理 ${VAR:-default} 语法
            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match std::env::var(var_name) {
                Ok(val) => val,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                },
            };

            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }

    /// 获取配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let manager = ConfigManager::load(&config_path).await.unwrap();
        let config = manager.snapshot().await;

        assert!(config_path.exists());
        assert_eq!(config.endpoint.url, "http://localhost:8787/api/chat");
        assert_eq!(config.playback.reveal_interval_ms, 20);
    }

    #[tokio::test]
    async fn test_load_existing_with_env_expansion() {
        std::env::set_var("SCRIBE_TEST_ENDPOINT", "https://chat.example.com/api/chat");

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(
            &config_path,
            r#"{
                "endpoint": {"url": "${SCRIBE_TEST_ENDPOINT}"},
                "playback": {"reveal_interval_ms": ${SCRIBE_TEST_UNSET_INTERVAL:-7}}
            }"#,
        )
        .await
        .unwrap();

        let config = ConfigManager::load(&config_path).await.unwrap().snapshot().await;
        assert_eq!(config.endpoint.url, "https://chat.example.com/api/chat");
        assert_eq!(config.playback.reveal_interval_ms, 7);
    }

    #[tokio::test]
    async fn test_missing_env_var() {
        let result = ConfigManager::expand_env_vars(r#"{"key": "${SCRIBE_TEST_DEFINITELY_UNSET}"}"#);
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_persists() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let manager = ConfigManager::load(&config_path).await.unwrap();

        manager
            .update(|config| config.set_value("session.greeting", "Hi!"))
            .await
            .unwrap();

        let reloaded = ConfigManager::load(&config_path).await.unwrap();
        assert_eq!(
            reloaded.snapshot().await.session.greeting.as_deref(),
            Some("Hi!")
        );
    }

    #[tokio::test]
    async fn test_invalid_update_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::load(&temp_dir.path().join("config.json")).await.unwrap();

        let result = manager
            .update(|config| config.set_value("endpoint.url", "ftp://nope"))
            .await;
        assert!(result.is_err());
        assert_eq!(
            manager.snapshot().await.endpoint.url,
            "http://localhost:8787/api/chat"
        );
    }

    #[tokio::test]
    async fn test_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let manager = ConfigManager::load(&config_path).await.unwrap();

        tokio::fs::write(&config_path, r#"{"logging": {"level": "debug"}}"#)
            .await
            .unwrap();
        manager.reload().await.unwrap();

        let config = manager.snapshot().await;
        assert_eq!(config.logging.level.as_str(), "debug");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(ConfigManager::validate(&config).is_ok());

        config.session.archive_key = config.session.history_key.clone();
        assert!(ConfigManager::validate(&config).is_err());

        let mut config = Config::default();
        config.session.max_age_hours = Some(0);
        assert!(ConfigManager::validate(&config).is_err());
    }
}
