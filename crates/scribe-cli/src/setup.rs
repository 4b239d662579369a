//! 根据配置组装运行时组件

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use scribe_chat::{ControllerSettings, MessageRenderer, PresentationSink, SessionController};
use scribe_config::{Config, EndpointConfig, LoggingConfig};
use scribe_observability::LogConfig;
use scribe_session::{FileStore, KeyValueStore, MemoryStore, SessionKeys, SessionStore};
use scribe_stream::{BackendConfig, FrameFormat, HttpChatBackend};

pub fn resolve_path(path: &str) -> PathBuf {
    scribe_config::expand_tilde(path).unwrap_or_else(|| PathBuf::from(path))
}

pub fn log_config(logging: &LoggingConfig, debug: bool) -> LogConfig {
    let level = if debug {
        "debug".to_string()
    } else {
        logging.level.to_string()
    };

    let mut config = LogConfig::default()
        .with_log_level(level)
        .with_json_format(logging.json_format)
        .with_module_level("hyper", "warn")
        .with_module_level("reqwest", "warn");
    if let Some(file) = &logging.file {
        config = config.with_log_file(resolve_path(file));
    }
    config
}

pub fn backend_config(endpoint: &EndpointConfig) -> BackendConfig {
    BackendConfig::new(endpoint.url.clone())
        .with_headers(endpoint.headers.clone())
        .with_format(FrameFormat {
            marker: endpoint.frame_marker.clone(),
            sentinel: endpoint.done_sentinel.clone(),
            text_field: endpoint.text_field.clone(),
        })
        .with_default_encoding(endpoint.default_encoding.clone())
}

pub async fn session_store(config: &Config) -> anyhow::Result<SessionStore> {
    let store: Arc<dyn KeyValueStore> = match &config.session.storage_path {
        Some(path) => {
            let path = resolve_path(path);
            Arc::new(
                FileStore::new(path.clone())
                    .await
                    .with_context(|| format!("failed to open session store at {:?}", path))?,
            )
        }
        None => Arc::new(MemoryStore::new()),
    };

    let mut session = SessionStore::new(store).with_keys(SessionKeys {
        history: config.session.history_key.clone(),
        timestamp: config.session.timestamp_key.clone(),
        archive: config.session.archive_key.clone(),
    });
    if let Some(hours) = config.session.max_age_hours {
        session = session.with_max_age(chrono::Duration::hours(hours as i64));
    }
    Ok(session)
}

pub fn controller_settings(config: &Config) -> ControllerSettings {
    ControllerSettings {
        reveal_interval: Duration::from_millis(config.playback.reveal_interval_ms),
        system_prompt: config.session.system_prompt.clone(),
        greeting: config.session.greeting.clone(),
    }
}

pub async fn controller(
    config: &Config,
    sink: Arc<dyn PresentationSink>,
    renderer: Arc<dyn MessageRenderer>,
) -> anyhow::Result<SessionController> {
    let backend = HttpChatBackend::new(backend_config(&config.endpoint))
        .context("invalid endpoint configuration")?;
    let session = session_store(config).await?;

    Ok(SessionController::new(
        Arc::new(backend),
        session,
        sink,
        renderer,
        controller_settings(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_config::LogLevel;
    use tempfile::TempDir;

    #[test]
    fn test_backend_config_from_endpoint() {
        let mut endpoint = EndpointConfig::default();
        endpoint.frame_marker = None;
        endpoint.text_field = "text".to_string();
        endpoint
            .headers
            .insert("X-Client".to_string(), "scribe".to_string());

        let backend = backend_config(&endpoint);
        assert_eq!(backend.endpoint, "http://localhost:8787/api/chat");
        assert_eq!(backend.format.marker, None);
        assert_eq!(backend.format.text_field, "text");
        assert_eq!(backend.headers.get("X-Client").map(String::as_str), Some("scribe"));
    }

    #[test]
    fn test_log_config() {
        let logging = LoggingConfig {
            level: LogLevel::Warn,
            file: None,
            json_format: true,
        };
        let config = log_config(&logging, false);
        assert_eq!(config.level, "warn");
        assert!(config.json_format);
        assert!(config.file_path.is_none());

        assert_eq!(log_config(&logging, true).level, "debug");
    }

    #[test]
    fn test_controller_settings() {
        let mut config = Config::default();
        config.playback.reveal_interval_ms = 5;
        config.session.system_prompt = Some("be brief".to_string());

        let settings = controller_settings(&config);
        assert_eq!(settings.reveal_interval, Duration::from_millis(5));
        assert_eq!(settings.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(settings.greeting, config.session.greeting);
    }

    #[tokio::test]
    async fn test_session_store_uses_configured_keys() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.session.storage_path = Some(temp_dir.path().to_string_lossy().to_string());
        config.session.history_key = "history".to_string();
        config.session.max_age_hours = Some(24);

        let session = session_store(&config).await.unwrap();
        assert_eq!(session.keys().history, "history");
        assert_eq!(session.max_age(), Some(chrono::Duration::hours(24)));

        let history = scribe_core::ConversationHistory::initial(None, Some("hi"));
        session.save(&history).await.unwrap();
        assert!(temp_dir.path().join("history.json").exists());
    }
}
