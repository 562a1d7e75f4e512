//! Docker-backed [`ContainerEngine`] implementation over bollard.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    ListImagesOptions as BollardListImagesOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    StopContainerOptions as BollardStopContainerOptionsQuery,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};

use super::{ChunkSource, ContainerEngine, ContainerSpec, LogChunk, PullObserver};
use crate::errors::ExecutorError;

/// Seconds bollard waits on the control channel before giving up.
const CLIENT_TIMEOUT_SECS: u64 = 120;

pub struct DockerEngine {
    docker: Docker,
    endpoint: String,
}

impl DockerEngine {
    /// Build a client against `endpoint` (`unix://`, `npipe://` or `http://`
    /// address). Construction validates the address and, for local sockets,
    /// that the socket exists; daemon liveness is only checked by
    /// [`ContainerEngine::ping`].
    pub fn connect(endpoint: &str) -> Result<Self, ExecutorError> {
        let docker = Docker::connect_with_local(endpoint, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            .map_err(|e| ExecutorError::EngineUnreachable {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            docker,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), ExecutorError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| ExecutorError::EngineUnreachable {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })
    }

    async fn image_present(&self, reference: &str) -> Result<bool, ExecutorError> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![reference.to_string()]);
        let options = BollardListImagesOptionsQuery {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };

        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|e| ExecutorError::ImagePull {
                reference: reference.to_string(),
                message: format!("Failed to list images: {}", e),
            })?;
        Ok(!images.is_empty())
    }

    async fn pull_image(
        &self,
        reference: &str,
        observer: &dyn PullObserver,
    ) -> Result<(), ExecutorError> {
        // "registry:port/name" carries a colon too; only split off a real tag.
        let (image, tag) = match reference.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, tag),
            _ => (reference, "latest"),
        };
        let options = BollardCreateImageOptionsQuery {
            from_image: Some(image.to_string()),
            tag: Some(tag.to_string()),
            ..Default::default()
        };

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = pull_stream.next().await {
            let info = progress.map_err(|e| ExecutorError::ImagePull {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;
            if let Some(detail) = info.error {
                return Err(ExecutorError::ImagePull {
                    reference: reference.to_string(),
                    message: detail,
                });
            }
            if let Some(status) = info.status.as_deref() {
                if !status.is_empty() {
                    observer.on_status(status);
                }
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ExecutorError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(spec.name.clone()),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            host_config: Some(bollard::models::HostConfig {
                binds: Some(vec![spec.bind.clone()]),
                memory: Some(spec.memory_bytes),
                cpu_shares: Some(spec.cpu_shares),
                auto_remove: Some(spec.auto_remove),
                ..Default::default()
            }),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| ExecutorError::EngineApi {
                message: format!("Failed to create container '{}': {}", spec.name, e),
                partial_output: None,
            })?;
        for warning in &created.warnings {
            log::warn!("Engine warning for container '{}': {}", spec.name, warning);
        }
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<bool, ExecutorError> {
        match self
            .docker
            .start_container(id, None::<BollardStartContainerOptionsQuery>)
            .await
        {
            Ok(()) => Ok(true),
            // 304 is the engine acknowledging the request without the
            // container transitioning; surface it as a negative ack.
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(false),
            Err(e) => Err(ExecutorError::EngineApi {
                message: format!("Failed to start container '{}': {}", id, e),
                partial_output: None,
            }),
        }
    }

    fn follow_logs<'a>(&'a self, id: &'a str) -> BoxStream<'a, Result<LogChunk, ExecutorError>> {
        let options = BollardLogsOptionsQuery {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let stream = self
            .docker
            .logs(id, Some(options))
            .filter_map(|item| {
                let mapped = match item {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        Some(Ok(LogChunk {
                            source: ChunkSource::Stdout,
                            bytes: message,
                        }))
                    }
                    Ok(LogOutput::StdErr { message }) => Some(Ok(LogChunk {
                        source: ChunkSource::Stderr,
                        bytes: message,
                    })),
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(ExecutorError::EngineApi {
                        message: format!("Log stream failed: {}", e),
                        partial_output: None,
                    })),
                };
                future::ready(mapped)
            });
        Box::pin(stream)
    }

    async fn stop_container(&self, id: &str) -> Result<(), ExecutorError> {
        self.docker
            .stop_container(id, None::<BollardStopContainerOptionsQuery>)
            .await
            .map_err(|e| ExecutorError::EngineApi {
                message: format!("Failed to stop container '{}': {}", id, e),
                partial_output: None,
            })
    }
}
