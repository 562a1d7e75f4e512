//! Scratch-file staging for caller-supplied source code
//!
//! Each execution writes its code to a uniquely named file in the scratch
//! directory; that single file is bind-mounted into the container. The file
//! outlives the container and is removed once the log stream has been
//! drained, or on any failure path.

use std::path::{Path, PathBuf};

use tempfile::Builder;
use tokio::fs;

use crate::errors::ExecutorError;

/// A staged script owned by exactly one execution.
#[derive(Debug)]
pub struct StagedScript {
    path: PathBuf,
}

impl StagedScript {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staged file. A file that is already gone is a no-op; any
    /// other deletion error is logged and swallowed so an already computed
    /// result is not lost to scratch-dir cleanup.
    pub async fn cleanup(self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => log::debug!("Removed staged script {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove staged script {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Write `code` verbatim to a fresh uniquely named file under `scratch_dir`.
pub async fn stage(code: &str, scratch_dir: &Path) -> Result<StagedScript, ExecutorError> {
    let (file, path) = Builder::new()
        .prefix("runcell-")
        .suffix(".py")
        .tempfile_in(scratch_dir)
        .map_err(|e| {
            ExecutorError::Io(format!(
                "Failed to create staging file in {}: {}",
                scratch_dir.display(),
                e
            ))
        })?
        .keep()
        .map_err(|e| ExecutorError::Io(format!("Failed to persist staging file: {}", e)))?;
    drop(file);

    if let Err(e) = fs::write(&path, code).await {
        // Do not leave a half-written script behind.
        let _ = fs::remove_file(&path).await;
        return Err(ExecutorError::Io(format!(
            "Failed to write staged script {}: {}",
            path.display(),
            e
        )));
    }

    log::debug!("Staged {} bytes at {}", code.len(), path.display());
    Ok(StagedScript { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_stage_writes_code_verbatim() {
        let dir = tempdir().unwrap();
        let script = stage("print('hi')\n", dir.path()).await.unwrap();

        let written = tokio::fs::read_to_string(script.path()).await.unwrap();
        assert_eq!(written, "print('hi')\n");
        script.cleanup().await;
    }

    #[tokio::test]
    async fn test_cleanup_leaves_no_residual_file() {
        let dir = tempdir().unwrap();
        let script = stage("x = 1", dir.path()).await.unwrap();
        let path = script.path().to_path_buf();

        script.cleanup().await;
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let script = stage("x = 1", dir.path()).await.unwrap();
        tokio::fs::remove_file(script.path()).await.unwrap();

        script.cleanup().await;
    }

    #[tokio::test]
    async fn test_staged_names_are_unique() {
        let dir = tempdir().unwrap();
        let a = stage("1", dir.path()).await.unwrap();
        let b = stage("2", dir.path()).await.unwrap();

        assert_ne!(a.path(), b.path());
        a.cleanup().await;
        b.cleanup().await;
    }

    #[tokio::test]
    async fn test_stage_fails_in_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let result = stage("x", &missing).await;
        assert!(matches!(result, Err(ExecutorError::Io(_))));
    }
}
