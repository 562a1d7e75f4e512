//! Error types for the sandboxed execution pipeline
//!
//! One enum covers every failure mode from staging through log draining, so
//! callers branch on the failure kind instead of parsing message text. Stages
//! that can fail after the container has produced output carry the partial
//! transcript captured up to that point.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ExecutorError {
    #[error("I/O failure: {0}")]
    Io(String),
    #[error("Container engine unreachable at {endpoint}: {message}")]
    EngineUnreachable { endpoint: String, message: String },
    #[error("Failed to pull image '{reference}': {message}")]
    ImagePull { reference: String, message: String },
    #[error("Container engine API error: {message}")]
    EngineApi {
        message: String,
        partial_output: Option<String>,
    },
    #[error("Container '{container}' was created but did not start")]
    ContainerStart { container: String },
    #[error("Execution exceeded the {limit_secs}s time limit")]
    Timeout {
        limit_secs: u64,
        partial_output: String,
    },
    #[error("Execution was canceled by the caller")]
    Canceled { partial_output: String },
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExecutorError {
    /// Stable machine-readable tag for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorError::Io(_) => "io",
            ExecutorError::EngineUnreachable { .. } => "engine-unreachable",
            ExecutorError::ImagePull { .. } => "image-pull",
            ExecutorError::EngineApi { .. } => "engine-api",
            ExecutorError::ContainerStart { .. } => "container-start",
            ExecutorError::Timeout { .. } => "timeout",
            ExecutorError::Canceled { .. } => "canceled",
            ExecutorError::Config(_) => "config",
        }
    }

    /// Transcript text captured before the failure, if any was produced.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            ExecutorError::EngineApi { partial_output, .. } => partial_output.as_deref(),
            ExecutorError::Timeout { partial_output, .. }
            | ExecutorError::Canceled { partial_output } => {
                if partial_output.is_empty() {
                    None
                } else {
                    Some(partial_output)
                }
            }
            _ => None,
        }
    }

    /// Attach transcript text captured before a mid-drain failure.
    pub(crate) fn with_partial_output(self, output: String) -> Self {
        match self {
            ExecutorError::EngineApi { message, .. } if !output.is_empty() => {
                ExecutorError::EngineApi {
                    message,
                    partial_output: Some(output),
                }
            }
            other => other,
        }
    }
}

impl From<std::io::Error> for ExecutorError {
    fn from(err: std::io::Error) -> Self {
        ExecutorError::Io(err.to_string())
    }
}
