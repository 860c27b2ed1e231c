use thiserror::Error;

/// Foreman错误类型定义
#[derive(Debug, Error)]
pub enum ForemanError {
    #[error("Worker not found: {id}")]
    WorkerNotFound { id: String },

    #[error("Worker group not found: {id}")]
    WorkerGroupNotFound { id: i64 },

    #[error("Invalid event schedule: {schedule} - {message}")]
    InvalidSchedule { schedule: String, message: String },

    #[error("Invalid worker count {count}, must be between 0 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    #[error("Pending task queue has been shut down")]
    QueueShutdown,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Task execution error: {0}")]
    TaskExecution(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for ForemanError {
    fn from(err: config::ConfigError) -> Self {
        ForemanError::Configuration(err.to_string())
    }
}

/// 统一的Result类型
pub type ForemanResult<T> = std::result::Result<T, ForemanError>;
