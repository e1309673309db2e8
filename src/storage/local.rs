//! Filesystem storage backend
//!
//! Artifacts live as plain files directly under a root directory. Uploads are
//! written to `<name>.partial` and renamed into place once fully flushed, so an
//! interrupted copy never shows up in `list`.

use super::{cancellable, validate_artifact_name, ArtifactNaming, Result, Storage, StorageError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PARTIAL_SUFFIX: &str = ".partial";

pub struct LocalStorage {
    root: PathBuf,
    naming: ArtifactNaming,
}

impl LocalStorage {
    /// Bind to `root`, creating the directory if absent
    pub async fn new(root: impl AsRef<Path>, naming: ArtifactNaming) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::io(format!("Failed to create storage directory {}", root.display()), e))?;

        debug!("Local storage rooted at {}", root.display());
        Ok(Self { root, naming })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn copy_into_place(&self, source: &Path, temp_path: &Path, final_path: &Path) -> Result<()> {
        let mut reader = fs::File::open(source)
            .await
            .map_err(|e| StorageError::io(format!("Failed to open source file {}", source.display()), e))?;
        let mut writer = fs::File::create(temp_path)
            .await
            .map_err(|e| StorageError::io(format!("Failed to create {}", temp_path.display()), e))?;

        let bytes = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| StorageError::io(format!("Failed to copy into {}", temp_path.display()), e))?;
        writer
            .sync_all()
            .await
            .map_err(|e| StorageError::io(format!("Failed to flush {}", temp_path.display()), e))?;
        drop(writer);

        fs::rename(temp_path, final_path)
            .await
            .map_err(|e| StorageError::io(format!("Failed to publish {}", final_path.display()), e))?;

        debug!("Copied {} bytes to {}", bytes, final_path.display());
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, cancel: &CancellationToken, source: &Path, artifact_name: &str) -> Result<()> {
        validate_artifact_name(artifact_name)?;

        let final_path = self.artifact_path(artifact_name);
        let temp_path = self.artifact_path(&format!("{}{}", artifact_name, PARTIAL_SUFFIX));

        let result = cancellable(cancel, self.copy_into_place(source, &temp_path, &final_path)).await;

        if result.is_err() {
            if let Err(e) = fs::remove_file(&temp_path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove partial upload {}: {}", temp_path.display(), e);
                }
            }
        } else {
            info!("Stored {} in {}", artifact_name, self.root.display());
        }

        result
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        cancellable(cancel, async {
            let mut entries = fs::read_dir(&self.root)
                .await
                .map_err(|e| StorageError::io(format!("Failed to read {}", self.root.display()), e))?;

            let mut names = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(format!("Failed to read {}", self.root.display()), e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io(format!("Failed to stat {}", entry.path().display()), e))?;
                if file_type.is_dir() {
                    continue;
                }

                if let Some(name) = entry.file_name().to_str() {
                    if self.naming.matches(name) {
                        names.push(name.to_string());
                    }
                }
            }

            names.sort();
            Ok(names)
        })
        .await
    }

    async fn delete(&self, cancel: &CancellationToken, artifact_name: &str) -> Result<()> {
        validate_artifact_name(artifact_name)?;
        let path = self.artifact_path(artifact_name);

        cancellable(cancel, async {
            fs::remove_file(&path).await.map_err(|e| match e.kind() {
                ErrorKind::NotFound => StorageError::NotFound(artifact_name.to_string()),
                _ => StorageError::io(format!("Failed to delete {}", path.display()), e),
            })
        })
        .await
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}
