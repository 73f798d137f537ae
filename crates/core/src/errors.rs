use thiserror::Error;

/// 调度服务端统一错误类型
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("协调服务错误: {0}")]
    Coordination(String),
    #[error("协调服务节点不存在: {0}")]
    NodeNotFound(String),
    #[error("存储层错误: {0}")]
    Repository(String),
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn coordination<S: Into<String>>(msg: S) -> Self {
        Self::Coordination(msg.into())
    }
    pub fn node_not_found<S: Into<String>>(path: S) -> Self {
        Self::NodeNotFound(path.into())
    }
    pub fn repository<S: Into<String>>(msg: S) -> Self {
        Self::Repository(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// 是否属于下个周期可自然重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Coordination(_)
                | SchedulerError::NodeNotFound(_)
                | SchedulerError::Repository(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}
