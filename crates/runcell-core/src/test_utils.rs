//! Test doubles for the container-engine seam.
//!
//! [`MockEngine`] plays back a scripted log stream and records every call it
//! receives, so pipeline tests can assert on container creation parameters
//! and call counts without a Docker daemon.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::engine::{ChunkSource, ContainerEngine, ContainerSpec, LogChunk, PullObserver};
use crate::errors::ExecutorError;

/// Scripted log-stream event for [`MockEngine`].
#[derive(Clone)]
pub enum LogEvent {
    /// Emit a stdout frame with these bytes.
    Chunk(&'static [u8]),
    /// Emit a stderr frame with these bytes.
    ErrChunk(&'static [u8]),
    /// Fail the stream with an engine error.
    Error(&'static str),
    /// Never yield again; keeps the drain suspended until aborted.
    Hang,
}

/// Scripted, recording [`ContainerEngine`].
pub struct MockEngine {
    images: Mutex<HashSet<String>>,
    log_events: Mutex<Vec<LogEvent>>,
    fail_ping: bool,
    fail_pull: bool,
    fail_create: bool,
    create_delay: Option<Duration>,
    start_ok: bool,
    pub pulls: Mutex<Vec<String>>,
    pub creates: Mutex<Vec<ContainerSpec>>,
    pub starts: Mutex<Vec<String>>,
    pub stops: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            images: Mutex::new(HashSet::new()),
            log_events: Mutex::new(Vec::new()),
            fail_ping: false,
            fail_pull: false,
            fail_create: false,
            create_delay: None,
            start_ok: true,
            pulls: Mutex::new(Vec::new()),
            creates: Mutex::new(Vec::new()),
            starts: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
        }
    }

    /// Mark `reference` as already present locally.
    pub fn with_image(self, reference: &str) -> Self {
        self.images.lock().unwrap().insert(reference.to_string());
        self
    }

    /// Script the log stream returned by [`ContainerEngine::follow_logs`].
    pub fn with_log_events(self, events: Vec<LogEvent>) -> Self {
        *self.log_events.lock().unwrap() = events;
        self
    }

    pub fn failing_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    pub fn failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Hold each create call open for `delay`, so tests can race an abort
    /// against an in-flight creation.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn refusing_start(mut self) -> Self {
        self.start_ok = false;
        self
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.lock().unwrap().len()
    }

    pub fn pulled_references(&self) -> Vec<String> {
        self.pulls.lock().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.lock().unwrap().len()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn ping(&self) -> Result<(), ExecutorError> {
        if self.fail_ping {
            return Err(ExecutorError::EngineUnreachable {
                endpoint: "mock".to_string(),
                message: "ping refused".to_string(),
            });
        }
        Ok(())
    }

    async fn image_present(&self, reference: &str) -> Result<bool, ExecutorError> {
        Ok(self.images.lock().unwrap().contains(reference))
    }

    async fn pull_image(
        &self,
        reference: &str,
        observer: &dyn PullObserver,
    ) -> Result<(), ExecutorError> {
        self.pulls.lock().unwrap().push(reference.to_string());
        if self.fail_pull {
            return Err(ExecutorError::ImagePull {
                reference: reference.to_string(),
                message: "pull refused".to_string(),
            });
        }
        observer.on_status(&format!("Pulling from library/{}", reference));
        observer.on_status("Download complete");
        self.images.lock().unwrap().insert(reference.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ExecutorError> {
        if self.fail_create {
            return Err(ExecutorError::EngineApi {
                message: "create refused".to_string(),
                partial_output: None,
            });
        }
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        self.creates.lock().unwrap().push(spec.clone());
        Ok(format!("mock-{}", spec.name))
    }

    async fn start_container(&self, id: &str) -> Result<bool, ExecutorError> {
        self.starts.lock().unwrap().push(id.to_string());
        Ok(self.start_ok)
    }

    fn follow_logs<'a>(&'a self, _id: &'a str) -> BoxStream<'a, Result<LogChunk, ExecutorError>> {
        let events = self.log_events.lock().unwrap().clone();
        let mut items = Vec::new();
        let mut hang = false;
        for event in events {
            match event {
                LogEvent::Chunk(bytes) => items.push(Ok(LogChunk {
                    source: ChunkSource::Stdout,
                    bytes: Bytes::from_static(bytes),
                })),
                LogEvent::ErrChunk(bytes) => items.push(Ok(LogChunk {
                    source: ChunkSource::Stderr,
                    bytes: Bytes::from_static(bytes),
                })),
                LogEvent::Error(message) => items.push(Err(ExecutorError::EngineApi {
                    message: message.to_string(),
                    partial_output: None,
                })),
                LogEvent::Hang => {
                    hang = true;
                    break;
                }
            }
        }

        let head = stream::iter(items);
        if hang {
            head.chain(stream::pending()).boxed()
        } else {
            head.boxed()
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), ExecutorError> {
        self.stops.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

/// Observer that records every pull-status line it sees.
#[derive(Default)]
pub struct RecordingObserver {
    pub statuses: Mutex<Vec<String>>,
}

impl PullObserver for RecordingObserver {
    fn on_status(&self, status: &str) {
        self.statuses.lock().unwrap().push(status.to_string());
    }
}
