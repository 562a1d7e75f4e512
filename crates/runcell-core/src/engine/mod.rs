//! Container engine abstraction used by the execution pipeline.
//!
//! Everything the orchestrator needs from a container runtime fits in the
//! [`ContainerEngine`] trait: a liveness probe, image presence and pull, the
//! create/start/stop lifecycle, and a followed log stream. The production
//! implementation talks to Docker through bollard; tests substitute a
//! scripted mock behind the same trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::errors::ExecutorError;

pub mod docker;

pub use docker::DockerEngine;

/// Parameters for a single sandbox container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    /// Full image reference (`name:tag`).
    pub image: String,
    /// Unique container name.
    pub name: String,
    /// Command line executed inside the container.
    pub cmd: Vec<String>,
    /// Single `host-path:container-path[:mode]` bind mount.
    pub bind: String,
    /// Hard memory ceiling in bytes.
    pub memory_bytes: i64,
    /// Relative CPU weight.
    pub cpu_shares: i64,
    /// Remove the container as soon as its process exits.
    pub auto_remove: bool,
}

/// Which channel of the multiplexed log stream a chunk arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSource {
    Stdout,
    Stderr,
}

/// One frame of container output.
#[derive(Debug, Clone)]
pub struct LogChunk {
    pub source: ChunkSource,
    pub bytes: Bytes,
}

/// Receives image pull progress lines.
pub trait PullObserver: Send + Sync {
    fn on_status(&self, status: &str);
}

/// Default observer forwarding pull progress to the log.
pub struct LogPullObserver;

impl PullObserver for LogPullObserver {
    fn on_status(&self, status: &str) {
        log::info!("Image pull: {}", status);
    }
}

/// Minimal container-runtime surface needed to run one sandboxed script.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Liveness probe against the engine control channel.
    async fn ping(&self) -> Result<(), ExecutorError>;

    /// Whether an image matching `reference` (`name:tag`) exists locally.
    async fn image_present(&self, reference: &str) -> Result<bool, ExecutorError>;

    /// Pull `reference`, forwarding progress lines to `observer`.
    async fn pull_image(
        &self,
        reference: &str,
        observer: &dyn PullObserver,
    ) -> Result<(), ExecutorError>;

    /// Create a container from `spec`, returning the engine-assigned id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ExecutorError>;

    /// Start a created container. `Ok(false)` means the engine acknowledged
    /// the request but the container did not transition to running.
    async fn start_container(&self, id: &str) -> Result<bool, ExecutorError>;

    /// Follow the container's multiplexed stdout/stderr stream to its end.
    fn follow_logs<'a>(&'a self, id: &'a str) -> BoxStream<'a, Result<LogChunk, ExecutorError>>;

    /// Best-effort stop; issued on timeout and cancellation.
    async fn stop_container(&self, id: &str) -> Result<(), ExecutorError>;
}
