//! Sandboxed execution of untrusted code in resource-bounded containers.
//!
//! Caller-supplied source text is staged to a scratch file, bind-mounted
//! read-only into a uniquely named container built from a configured runtime
//! image, run under memory and CPU limits, and its combined stdout/stderr
//! stream drained into a single transcript.
//!
//! # Architecture Overview
//!
//! The pipeline is organized around a handful of small subsystems:
//!
//! - **Staging**: one uniquely named scratch file per execution, removed after use
//! - **Endpoint resolution**: platform-appropriate engine control socket
//! - **Image availability**: presence check and observed pull of the runtime image
//! - **Engine seam**: the minimal container-runtime trait, implemented over
//!   Docker via bollard and mockable in tests
//! - **Output drain**: lossy-decoded, line-oriented accumulation of the
//!   multiplexed log stream
//! - **Orchestration**: the end-to-end pipeline with cancellation, a
//!   wall-clock ceiling, and forced container stop on abort

pub mod config;
pub mod drain;
pub mod endpoint;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod image;
pub mod staging;

pub use config::{ExecutorConfig, ResourceLimits, RuntimeImage};
pub use engine::{ContainerEngine, ContainerSpec, DockerEngine, PullObserver};
pub use errors::ExecutorError;
pub use executor::{Execution, Executor};

#[cfg(test)]
pub mod test_utils;
