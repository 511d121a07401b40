//! Local artifact store.
//!
//! The store is bound to one path at construction. Replacing the artifact
//! is all-or-nothing: new content is staged in a temporary file next to the
//! artifact and renamed over it, so readers observe either the old or the
//! new bytes, never a partial file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ReconcileError, StoreError};
use crate::types::{ConfigArtifact, Digest};

/// Mode the storage process expects on its configuration file.
#[cfg(unix)]
const ARTIFACT_MODE: u32 = 0o644;

/// Persistence for the node-local configuration artifact.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Path of the artifact, for diagnostics.
    fn path(&self) -> &Path;

    /// Reads the current artifact.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Read` if the artifact is absent or unreadable.
    async fn read(&self) -> Result<ConfigArtifact, StoreError>;

    /// Replaces the artifact wholesale.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` if staging or swapping fails. The
    /// previous artifact is left untouched in that case.
    async fn write_atomic(&self, artifact: &ConfigArtifact) -> Result<(), StoreError>;
}

/// Type alias for a shareable store.
pub type DynArtifactStore = Arc<dyn ArtifactStore>;

/// Reads the persisted artifact and its digest.
///
/// # Errors
///
/// Returns `ReconcileError::LocalRead` if the artifact cannot be read,
/// including when it does not exist yet.
pub async fn read_local(
    store: &dyn ArtifactStore,
) -> Result<(ConfigArtifact, Digest), ReconcileError> {
    let artifact = store.read().await?;
    let digest = artifact.digest();
    Ok((artifact, digest))
}

/// Filesystem-backed store.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    path: PathBuf,
}

impl FsArtifactStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        // Same directory as the target so the rename stays on one filesystem.
        let mut staged = tempfile::Builder::new()
            .prefix(".cfgsync-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            staged
                .as_file()
                .set_permissions(std::fs::Permissions::from_mode(ARTIFACT_MODE))?;
        }

        staged.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<ConfigArtifact, StoreError> {
        tokio::fs::read(&self.path)
            .await
            .map(ConfigArtifact::new)
            .map_err(|source| StoreError::Read {
                path: self.path.clone(),
                source,
            })
    }

    async fn write_atomic(&self, artifact: &ConfigArtifact) -> Result<(), StoreError> {
        let path = self.path.clone();
        let bytes = artifact.as_bytes().to_vec();
        let result = tokio::task::spawn_blocking(move || Self::write_blocking(&path, &bytes))
            .await
            .unwrap_or_else(|join_err| Err(std::io::Error::other(join_err)));

        result.map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = artifact.len(),
            "config artifact replaced"
        );
        Ok(())
    }
}
