//! 结构化日志模块
//!
//! 提供基于 tracing 的结构化日志功能。聊天界面占用终端时，日志应写入文件，
//! 避免与打字效果交错。

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::writer::BoxMakeWriter,
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Registry,
};
use uuid::Uuid;

use crate::config::LogConfig;
use crate::error::{ObservabilityError, Result};

/// 日志级别重新加载句柄类型
type ReloadHandle = Handle<EnvFilter, Registry>;

/// 日志管理器
///
/// 持有文件写入线程的 guard，drop 时刷新剩余日志。
pub struct LogManager {
    /// 配置
    config: LogConfig,

    /// 过滤器重新加载句柄
    reload_handle: Option<ReloadHandle>,

    _guard: Option<WorkerGuard>,
}

impl LogManager {
    /// 创建并安装全局日志订阅者
    pub fn new(config: &LogConfig) -> Result<Self> {
        let mut manager = Self {
            config: config.clone(),
            reload_handle: None,
            _guard: None,
        };

        manager.init()?;

        Ok(manager)
    }

    /// 初始化日志系统
    fn init(&mut self) -> Result<()> {
        // 构建环境过滤器
        let filter = self.build_filter()?;
        let (filter, reload_handle) = reload::Layer::new(filter);

        let (writer, ansi) = match self.config.file_path.clone() {
            Some(path) => {
                let (writer, guard) = file_writer(&path)?;
                self._guard = Some(guard);
                (writer, false)
            }
            None => (BoxMakeWriter::new(std::io::stderr), self.config.ansi_colors),
        };

        // 创建基础注册表
        let registry = tracing_subscriber::registry().with(filter);

        // 添加输出层
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(self.config.include_target)
            .with_thread_ids(self.config.include_thread_id)
            .with_line_number(self.config.include_line_number)
            .with_ansi(ansi);

        let installed = if self.config.json_format {
            registry.with(layer.json()).try_init()
        } else {
            registry.with(layer).try_init()
        };
        installed.map_err(|e| ObservabilityError::logging(format!("Failed to install subscriber: {}", e)))?;

        self.reload_handle = Some(reload_handle);

        tracing::info!(
            target: "scribe_observability",
            "Log manager initialized with level: {}",
            self.config.level
        );

        Ok(())
    }

    /// 构建环境过滤器
    fn build_filter(&self) -> Result<EnvFilter> {
        build_filter(&self.config)
    }

    /// 动态更新日志级别
    pub fn update_level(&mut self, level: &str) -> Result<()> {
        let new_filter = EnvFilter::try_new(level)
            .map_err(|e| ObservabilityError::logging(format!("Invalid log level: {}", e)))?;

        if let Some(ref handle) = self.reload_handle {
            handle
                .modify(|filter| {
                    *filter = new_filter;
                })
                .map_err(|e| ObservabilityError::logging(format!("Failed to update log level: {}", e)))?;

            self.config.level = level.to_string();

            tracing::info!(
                target: "scribe_observability",
                "Log level updated to: {}",
                level
            );

            Ok(())
        } else {
            Err(ObservabilityError::logging("Log manager not initialized"))
        }
    }

    /// 获取当前配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManager")
            .field("config", &self.config)
            .field("initialized", &self.reload_handle.is_some())
            .finish()
    }
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| ObservabilityError::logging(format!("Invalid log level: {}", e)))?;

    // 添加模块级别的过滤器
    for (module, level) in &config.module_levels {
        filter = filter.add_directive(
            format!("{}={}", module, level)
                .parse()
                .map_err(|e| ObservabilityError::logging(format!("Invalid directive: {}", e)))?,
        );
    }

    Ok(filter)
}

fn file_writer(path: &Path) -> Result<(BoxMakeWriter, WorkerGuard)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ObservabilityError::config(format!("Invalid log file path: {:?}", path)))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let appender = tracing_appender::rolling::never(&dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(non_blocking), guard))
}

/// 生成新的交互 ID
pub fn new_exchange_id() -> Uuid {
    Uuid::new_v4()
}

/// 创建一次问答交互的 span
pub fn create_exchange_span(exchange_id: &Uuid, messages: usize) -> tracing::Span {
    tracing::info_span!(
        "exchange",
        exchange_id = %exchange_id,
        messages = messages,
    )
}

/// 创建会话命令的 span
pub fn create_session_span(command: &str) -> tracing::Span {
    tracing::info_span!(
        "session",
        command = %command,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter() {
        let config = LogConfig::default()
            .with_log_level("debug")
            .with_module_level("reqwest", "warn");
        assert!(build_filter(&config).is_ok());

        let config = LogConfig::default().with_log_level("scribe=loud");
        assert!(build_filter(&config).is_err());
    }

    // 全局订阅者只能安装一次，所有依赖它的断言放在同一个测试里
    #[test]
    fn test_log_manager_writes_to_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let log_path = temp_dir.path().join("logs").join("scribe.log");
        let config = LogConfig::default()
            .with_log_level("info")
            .with_log_file(&log_path);

        let mut manager = LogManager::new(&config).unwrap();
        tracing::info!("file sink ready");

        manager.update_level("debug").unwrap();
        assert_eq!(manager.config().level, "debug");
        tracing::debug!("debug now visible");

        assert!(manager.update_level("scribe=loud").is_err());

        // 第二次安装失败
        assert!(LogManager::new(&LogConfig::default()).is_err());

        drop(manager);
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("file sink ready"));
        assert!(content.contains("debug now visible"));
    }

    #[test]
    fn test_create_spans() {
        let id = new_exchange_id();
        let exchange_span = create_exchange_span(&id, 3);
        let session_span = create_session_span("new");
        // 未启用时 metadata 为 None，名称只在启用时可见
        if let Some(meta) = exchange_span.metadata() {
            assert_eq!(meta.name(), "exchange");
        }
        if let Some(meta) = session_span.metadata() {
            assert_eq!(meta.name(), "session");
        }
    }
}
