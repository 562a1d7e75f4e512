//! Engine control-socket address resolution

/// Default local control-socket address for the current platform.
///
/// Pure function of the host OS; no connectivity check happens here. The
/// orchestrator pings the engine before any container work.
pub fn resolve_endpoint() -> &'static str {
    if cfg!(windows) {
        "npipe:////./pipe/docker_engine"
    } else {
        "unix:///var/run/docker.sock"
    }
}
