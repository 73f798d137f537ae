//! 调度服务端基础设施：错误类型、配置、日志初始化

pub mod config;
pub mod errors;
pub mod logging;

pub use config::ServerConfig;
pub use errors::{SchedulerError, SchedulerResult};
pub use logging::init_logging;
