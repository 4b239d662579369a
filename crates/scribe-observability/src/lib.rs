//! Scribe Observability Infrastructure
//!
//! 提供统一的日志初始化和 span 工具。

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::LogConfig;
pub use error::{ObservabilityError, Result};
pub use logging::{create_exchange_span, create_session_span, new_exchange_id, LogManager};

/// 便捷导入模块
pub mod prelude {
    //! 常用类型的便捷导入

    pub use crate::{LogConfig, LogManager, Result};

    // 日志
    pub use tracing::{debug, error, info, instrument, trace, warn, Span};
}
