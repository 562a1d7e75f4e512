//! Executor configuration with YAML loading and defaults
//!
//! Every knob of the execution pipeline lives here: runtime image, resource
//! limits, wall-clock ceiling, engine endpoint, and scratch directory. The
//! defaults run short Python snippets in `python:3.9-slim` and need no
//! configuration file at all.

use crate::errors::ExecutorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Runtime image the user code is executed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeImage {
    /// Image name without a tag, e.g. `python`.
    #[serde(default = "default_image")]
    pub image: String,
    /// Image tag, e.g. `3.9-slim`.
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Interpreter invoked against the mounted script.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
}

impl RuntimeImage {
    /// Full `name:tag` reference as the engine expects it.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl Default for RuntimeImage {
    fn default() -> Self {
        Self {
            image: default_image(),
            tag: default_tag(),
            interpreter: default_interpreter(),
        }
    }
}

/// Hard resource ceilings applied to every container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes.
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: i64,
    /// Relative CPU weight (engine CPU shares).
    #[serde(default = "default_cpu_shares")]
    pub cpu_shares: i64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: default_memory_bytes(),
            cpu_shares: default_cpu_shares(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub runtime: RuntimeImage,
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Wall-clock ceiling for a single execution, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Engine control-socket address; platform default when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Directory staged scripts are written to; platform temp dir when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeImage::default(),
            limits: ResourceLimits::default(),
            timeout_secs: default_timeout_secs(),
            endpoint: None,
            scratch_dir: None,
        }
    }
}

fn default_image() -> String {
    "python".to_string()
}
fn default_tag() -> String {
    "3.9-slim".to_string()
}
fn default_interpreter() -> String {
    "python".to_string()
}
fn default_memory_bytes() -> i64 {
    256 * 1024 * 1024
}
fn default_cpu_shares() -> i64 {
    512
}
fn default_timeout_secs() -> u64 {
    120
}

impl ExecutorConfig {
    /// Load and validate configuration from a YAML file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExecutorError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            ExecutorError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: ExecutorConfig = serde_yaml::from_str(&content).map_err(|e| {
            ExecutorError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.runtime.image.is_empty() {
            return Err(ExecutorError::Config(
                "Runtime image cannot be empty".to_string(),
            ));
        }
        // "registry:port/name" is fine; "name:tag" belongs in the tag field.
        if let Some((_, after)) = self.runtime.image.rsplit_once(':') {
            if !after.contains('/') {
                return Err(ExecutorError::Config(
                    "Runtime image must not embed a tag; set `tag` separately".to_string(),
                ));
            }
        }
        if self.runtime.tag.is_empty() {
            return Err(ExecutorError::Config(
                "Runtime image tag cannot be empty".to_string(),
            ));
        }
        if self.runtime.interpreter.is_empty() {
            return Err(ExecutorError::Config(
                "Runtime interpreter cannot be empty".to_string(),
            ));
        }
        if self.limits.memory_bytes <= 0 {
            return Err(ExecutorError::Config(
                "Memory limit must be greater than 0".to_string(),
            ));
        }
        if self.limits.cpu_shares <= 0 {
            return Err(ExecutorError::Config(
                "CPU shares must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ExecutorError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
