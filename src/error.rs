//! Crate-wide error types.

use thiserror::Error;

pub type ReqprofResult<T> = Result<T, ReqprofError>;

#[derive(Debug, Error)]
pub enum ReqprofError {
    /// Process-level configuration failure. Fatal: the process must not serve
    /// requests with profiling silently disabled.
    #[error("config error: {0}")]
    Config(String),

    /// Engine begin/end/busy failure. At start time this degrades the request
    /// to unprofiled; the wrapped handler still runs.
    #[error("engine error: {0}")]
    Engine(String),

    /// Hook failure. Propagates as a failure of the whole middleware call.
    #[error("hook error: {0}")]
    Hook(String),

    /// Report generation failure. Never fails the request.
    #[error("report error: {0}")]
    Report(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
