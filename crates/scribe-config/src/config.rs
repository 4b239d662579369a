use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 主配置结构体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            endpoint: EndpointConfig::default(),
            playback: PlaybackConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// 获取配置值的快捷方法
    pub fn get_value(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["version"] => Some(self.version.clone()),
            ["endpoint", "url"] => Some(self.endpoint.url.clone()),
            ["endpoint", "frame_marker"] => self.endpoint.frame_marker.clone(),
            ["endpoint", "done_sentinel"] => Some(self.endpoint.done_sentinel.clone()),
            ["endpoint", "text_field"] => Some(self.endpoint.text_field.clone()),
            ["endpoint", "default_encoding"] => Some(self.endpoint.default_encoding.clone()),
            ["endpoint", "headers", name] => self.endpoint.headers.get(*name).cloned(),
            ["playback", "reveal_interval_ms"] => {
                Some(self.playback.reveal_interval_ms.to_string())
            }
            ["session", "storage_path"] => self.session.storage_path.clone(),
            ["session", "max_age_hours"] => self.session.max_age_hours.map(|h| h.to_string()),
            ["session", "system_prompt"] => self.session.system_prompt.clone(),
            ["session", "greeting"] => self.session.greeting.clone(),
            ["session", "history_key"] => Some(self.session.history_key.clone()),
            ["session", "timestamp_key"] => Some(self.session.timestamp_key.clone()),
            ["session", "archive_key"] => Some(self.session.archive_key.clone()),
            ["logging", "level"] => Some(self.logging.level.to_string()),
            ["logging", "file"] => self.logging.file.clone(),
            ["logging", "json_format"] => Some(self.logging.json_format.to_string()),
            _ => None,
        }
    }

    /// 设置配置值
    ///
    /// 可选字段接受 `none` 或空字符串表示清除。
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["endpoint", "url"] => {
                self.endpoint.url = value.to_string();
            }
            ["endpoint", "frame_marker"] => {
                self.endpoint.frame_marker = optional(value);
            }
            ["endpoint", "done_sentinel"] => {
                self.endpoint.done_sentinel = value.to_string();
            }
            ["endpoint", "text_field"] => {
                self.endpoint.text_field = value.to_string();
            }
            ["endpoint", "default_encoding"] => {
                self.endpoint.default_encoding = value.to_string();
            }
            ["endpoint", "headers", name] => match optional(value) {
                Some(v) => {
                    self.endpoint.headers.insert(name.to_string(), v);
                }
                None => {
                    self.endpoint.headers.remove(*name);
                }
            },
            ["playback", "reveal_interval_ms"] => {
                self.playback.reveal_interval_ms = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid number: {}", value))
                })?;
            }
            ["session", "storage_path"] => {
                self.session.storage_path = optional(value);
            }
            ["session", "max_age_hours"] => {
                self.session.max_age_hours = match optional(value) {
                    Some(v) => Some(v.parse().map_err(|_| {
                        ConfigError::Validation(format!("Invalid number: {}", value))
                    })?),
                    None => None,
                };
            }
            ["session", "system_prompt"] => {
                self.session.system_prompt = optional(value);
            }
            ["session", "greeting"] => {
                self.session.greeting = optional(value);
            }
            ["session", "history_key"] => {
                self.session.history_key = value.to_string();
            }
            ["session", "timestamp_key"] => {
                self.session.timestamp_key = value.to_string();
            }
            ["session", "archive_key"] => {
                self.session.archive_key = value.to_string();
            }
            ["logging", "level"] => {
                self.logging.level = value.parse()?;
            }
            ["logging", "file"] => {
                self.logging.file = optional(value);
            }
            ["logging", "json_format"] => {
                self.logging.json_format = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid boolean: {}", value))
                })?;
            }
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}

/// 聊天端点配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    /// 流式帧的数据前缀，`None` 表示每行都是裸 JSON
    pub frame_marker: Option<String>,
    pub done_sentinel: String,
    /// 增量文本所在的 JSON 字段
    pub text_field: String,
    /// 响应未声明 charset 时使用的编码
    pub default_encoding: String,
    pub headers: HashMap<String, String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8787/api/chat".to_string(),
            frame_marker: Some("data:".to_string()),
            done_sentinel: "[DONE]".to_string(),
            text_field: "response".to_string(),
            default_encoding: "utf-8".to_string(),
            headers: HashMap::new(),
        }
    }
}

/// 打字效果配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// 每显示一个字符的间隔（毫秒）
    pub reveal_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            reveal_interval_ms: 20,
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// 会话存储目录，`None` 表示只保存在内存中
    pub storage_path: Option<String>,
    /// 会话最大保留时间（小时），`None` 表示永不过期
    pub max_age_hours: Option<u64>,
    pub system_prompt: Option<String>,
    /// 新会话的第一条助手消息
    pub greeting: Option<String>,
    pub history_key: String,
    pub timestamp_key: String,
    pub archive_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_path: Some("~/.scribe/session".to_string()),
            max_age_hours: None,
            system_prompt: None,
            greeting: Some("Hello! How can I help you today?".to_string()),
            history_key: "chat_history".to_string(),
            timestamp_key: "chat_history_timestamp".to_string(),
            archive_key: "chat_history_archive".to_string(),
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

/// Logging 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// 日志文件；`None` 时写到 stderr
    pub file: Option<String>,
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: Some("~/.scribe/logs/scribe.log".to_string()),
            json_format: false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
