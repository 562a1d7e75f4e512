//! End-to-end execution pipeline.
//!
//! [`Executor`] drives one sandboxed run: stage the code to a scratch file,
//! probe the engine, make sure the runtime image exists, create and start a
//! uniquely named container with the script bind-mounted read-only, drain
//! its log stream, and clean up. Everything after staging is bounded by a
//! cancellation token and a wall-clock deadline. Container creation runs
//! shielded from both signals and registers the container name up front, so
//! an abort always has a stop handle; both abort paths stop the container
//! explicitly, since auto-remove only fires when the contained process
//! exits on its own.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::drain::{drain_into, Transcript};
use crate::endpoint::resolve_endpoint;
use crate::engine::{ContainerEngine, ContainerSpec, DockerEngine, LogPullObserver, PullObserver};
use crate::errors::ExecutorError;
use crate::image::ensure_image;
use crate::staging::{stage, StagedScript};

/// In-container path the staged script is mounted at.
pub const SCRIPT_MOUNT_PATH: &str = "/code/script.py";

/// Prefix shared by every container this executor creates.
pub const CONTAINER_NAME_PREFIX: &str = "runcell";

/// Outcome of one successful execution.
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    /// Combined stdout/stderr transcript.
    pub output: String,
    /// Name of the container that ran the code.
    pub container: String,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
}

pub struct Executor {
    config: ExecutorConfig,
    engine: Arc<dyn ContainerEngine>,
    observer: Arc<dyn PullObserver>,
    /// Execution id to container stop handle. The unique container name is
    /// registered just before creation and removed when the run settles.
    running: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl Executor {
    /// Build an executor over a Docker engine at the configured endpoint,
    /// falling back to the platform-default local socket.
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        config.validate()?;
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| resolve_endpoint().to_string());
        let engine = DockerEngine::connect(&endpoint)?;
        Ok(Self::with_engine(config, Arc::new(engine)))
    }

    /// Build an executor over an explicit engine implementation.
    pub fn with_engine(config: ExecutorConfig, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            config,
            engine,
            observer: Arc::new(LogPullObserver),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replace the pull-progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn PullObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Number of executions currently holding a container.
    pub fn active_executions(&self) -> usize {
        self.lock_running().len()
    }

    /// Run `code` to completion with no external cancellation.
    pub async fn execute(&self, code: &str) -> Result<Execution, ExecutorError> {
        self.execute_with_cancellation(code, CancellationToken::new())
            .await
    }

    /// Run `code`, aborting early if `cancel` fires or the configured
    /// wall-clock ceiling expires. Both abort paths stop the container and
    /// return the transcript accumulated so far inside the error.
    pub async fn execute_with_cancellation(
        &self,
        code: &str,
        cancel: CancellationToken,
    ) -> Result<Execution, ExecutorError> {
        let started = Instant::now();
        let execution_id = Uuid::new_v4();
        let scratch_dir = self.scratch_dir();
        let script = stage(code, &scratch_dir).await?;

        let transcript = Transcript::new();
        let deadline = time::Instant::now() + Duration::from_secs(self.config.timeout_secs);

        let outcome = self
            .run_pipeline(execution_id, &script, &transcript, &cancel, deadline)
            .await;

        self.deregister(execution_id);
        script.cleanup().await;

        let container = outcome?;
        Ok(Execution {
            output: transcript.snapshot(),
            container,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// The pipeline in three stages. Preflight and start-and-drain race the
    /// abort signals; create-and-register between them runs shielded, with
    /// the signals re-checked once it returns. Returns the container name.
    async fn run_pipeline(
        &self,
        execution_id: Uuid,
        script: &StagedScript,
        transcript: &Transcript,
        cancel: &CancellationToken,
        deadline: time::Instant,
    ) -> Result<String, ExecutorError> {
        // Biased polling prefers pipeline progress when an abort condition
        // fires in the same instant. No container can exist during
        // preflight, so abandoning it mid-flight leaks nothing.
        tokio::select! {
            biased;
            result = self.preflight() => result?,
            _ = cancel.cancelled() => return Err(self.abort_canceled(execution_id, transcript).await),
            _ = time::sleep_until(deadline) => return Err(self.abort_timed_out(execution_id, transcript).await),
        };

        // Creation is never abandoned mid-flight; an abort that arrives
        // while it runs is honored right after, and the registered name
        // covers any container the engine materialized in the meantime.
        let (name, container_id) = self.create_registered(execution_id, script).await?;

        if cancel.is_cancelled() {
            return Err(self.abort_canceled(execution_id, transcript).await);
        }
        if time::Instant::now() >= deadline {
            return Err(self.abort_timed_out(execution_id, transcript).await);
        }

        tokio::select! {
            biased;
            result = self.start_and_drain(name, &container_id, transcript) => result,
            _ = cancel.cancelled() => Err(self.abort_canceled(execution_id, transcript).await),
            _ = time::sleep_until(deadline) => Err(self.abort_timed_out(execution_id, transcript).await),
        }
    }

    async fn preflight(&self) -> Result<(), ExecutorError> {
        self.engine.ping().await?;
        let reference = self.config.runtime.reference();
        ensure_image(self.engine.as_ref(), &reference, self.observer.as_ref()).await
    }

    /// Create the container and register its name as the stop handle. The
    /// name goes into the registry before the engine call; the engine
    /// accepts names wherever it accepts ids, so an abort can stop the
    /// container even when creation raced the abort signal.
    async fn create_registered(
        &self,
        execution_id: Uuid,
        script: &StagedScript,
    ) -> Result<(String, String), ExecutorError> {
        let name = format!("{}-{}", CONTAINER_NAME_PREFIX, execution_id);
        let spec = ContainerSpec {
            image: self.config.runtime.reference(),
            name: name.clone(),
            cmd: vec![
                self.config.runtime.interpreter.clone(),
                SCRIPT_MOUNT_PATH.to_string(),
            ],
            bind: format!("{}:{}:ro", script.path().display(), SCRIPT_MOUNT_PATH),
            memory_bytes: self.config.limits.memory_bytes,
            cpu_shares: self.config.limits.cpu_shares,
            auto_remove: true,
        };

        log::info!("Creating container {} from {}", name, spec.image);
        self.register(execution_id, name.clone());
        let container_id = self.engine.create_container(&spec).await?;
        Ok((name, container_id))
    }

    async fn start_and_drain(
        &self,
        name: String,
        container_id: &str,
        transcript: &Transcript,
    ) -> Result<String, ExecutorError> {
        if !self.engine.start_container(container_id).await? {
            // Auto-remove never fires for a container that did not run; try
            // to tear it down before reporting the start failure.
            let _ = self.engine.stop_container(container_id).await;
            return Err(ExecutorError::ContainerStart { container: name });
        }

        log::debug!("Draining logs from container {}", name);
        let stream = self.engine.follow_logs(container_id);
        drain_into(stream, transcript).await?;

        Ok(name)
    }

    async fn abort_canceled(&self, execution_id: Uuid, transcript: &Transcript) -> ExecutorError {
        self.abort(execution_id, "canceled").await;
        ExecutorError::Canceled {
            partial_output: transcript.snapshot(),
        }
    }

    async fn abort_timed_out(&self, execution_id: Uuid, transcript: &Transcript) -> ExecutorError {
        self.abort(execution_id, "timed out").await;
        ExecutorError::Timeout {
            limit_secs: self.config.timeout_secs,
            partial_output: transcript.snapshot(),
        }
    }

    /// Stop the container belonging to an aborted execution, if one was
    /// registered by the time the abort fired.
    async fn abort(&self, execution_id: Uuid, reason: &str) {
        match self.registered_container(execution_id) {
            Some(container) => {
                log::warn!(
                    "Execution {} {}; stopping container {}",
                    execution_id,
                    reason,
                    container
                );
                if let Err(e) = self.engine.stop_container(&container).await {
                    log::warn!("Failed to stop container {}: {}", container, e);
                }
            }
            None => log::warn!(
                "Execution {} {} before a container was created",
                execution_id,
                reason
            ),
        }
    }

    fn register(&self, execution_id: Uuid, container: String) {
        self.lock_running().insert(execution_id, container);
    }

    fn deregister(&self, execution_id: Uuid) {
        self.lock_running().remove(&execution_id);
    }

    fn registered_container(&self, execution_id: Uuid) -> Option<String> {
        self.lock_running().get(&execution_id).cloned()
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<Uuid, String>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn scratch_dir(&self) -> PathBuf {
        self.config
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
