//! Filesystem artifact store.

use super::{object_path, storage_error, ArtifactStore};
use crate::error::PipelineError;
use crate::models::Locator;
use crate::report::Artifact;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes artifacts below a root directory, atomically.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn store(&self, request_id: &str, artifact: &Artifact) -> Result<Locator, PipelineError> {
        let relative = object_path(request_id, artifact);
        let target = self.root.join(&relative);
        let bytes = artifact.bytes.clone();

        let written = tokio::task::spawn_blocking({
            let target = target.clone();
            move || write_atomically(&target, &bytes)
        })
        .await
        .map_err(|e| storage_error(artifact, format!("write task failed: {}", e)))?;
        written.map_err(|e| storage_error(artifact, e))?;

        info!("Stored {} artifact at {}", artifact.kind, target.display());
        Ok(Locator(format!("file://{}", target.display())))
    }
}

/// Temp file in the target directory, then rename over the final path.
fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), String> {
    let dir = target
        .parent()
        .ok_or_else(|| format!("{} has no parent directory", target.display()))?;
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("creating {}: {}", dir.display(), e))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| format!("creating temp file in {}: {}", dir.display(), e))?;
    temp.write_all(bytes)
        .map_err(|e| format!("writing temp file for {}: {}", target.display(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| format!("syncing temp file for {}: {}", target.display(), e))?;
    temp.persist(target)
        .map_err(|e| format!("renaming temp file to {}: {}", target.display(), e.error))?;

    debug!("Persisted {} bytes to {}", bytes.len(), target.display());
    Ok(())
}
