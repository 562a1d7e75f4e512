//! Runtime image availability.

use crate::engine::{ContainerEngine, PullObserver};
use crate::errors::ExecutorError;

/// Make sure `reference` is available locally, pulling it if absent.
///
/// Safe to call before every execution; when the image is already present
/// the only cost is one filtered list query against the engine.
pub async fn ensure_image(
    engine: &dyn ContainerEngine,
    reference: &str,
    observer: &dyn PullObserver,
) -> Result<(), ExecutorError> {
    if engine.image_present(reference).await? {
        log::debug!("Image {} already present", reference);
        return Ok(());
    }

    log::info!("Pulling image {}", reference);
    engine.pull_image(reference, observer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockEngine, RecordingObserver};

    #[tokio::test]
    async fn test_present_image_not_pulled() {
        let engine = MockEngine::new().with_image("python:3.9-slim");
        let observer = RecordingObserver::default();

        ensure_image(&engine, "python:3.9-slim", &observer)
            .await
            .unwrap();

        assert_eq!(engine.pull_count(), 0);
        assert!(observer.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_absent_image_pulled_with_exact_reference() {
        let engine = MockEngine::new();
        let observer = RecordingObserver::default();

        ensure_image(&engine, "python:3.9-slim", &observer)
            .await
            .unwrap();

        assert_eq!(
            engine.pulled_references(),
            vec!["python:3.9-slim".to_string()]
        );
        assert!(!observer.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_call_after_pull_is_noop() {
        let engine = MockEngine::new();
        let observer = RecordingObserver::default();

        ensure_image(&engine, "python:3.9-slim", &observer)
            .await
            .unwrap();
        ensure_image(&engine, "python:3.9-slim", &observer)
            .await
            .unwrap();

        assert_eq!(engine.pull_count(), 1);
    }

    #[tokio::test]
    async fn test_pull_failure_propagates() {
        let engine = MockEngine::new().failing_pull();
        let observer = RecordingObserver::default();

        let err = ensure_image(&engine, "python:3.9-slim", &observer)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::ImagePull { .. }));
    }
}
