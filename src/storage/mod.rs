//! Storage backends for backup artifacts
//!
//! Every backend implements the same four-operation [`Storage`] contract:
//!
//! - `upload` copies a local file into the backend under an artifact name and
//!   aborts promptly when its cancellation token fires
//! - `list` returns only names matching the [`ArtifactNaming`] convention, sorted
//!   ascending (oldest first, since names embed a sortable timestamp)
//! - `delete` removes exactly one artifact and reports a missing target as
//!   [`StorageError::NotFound`]
//! - `storage_type` names the backend for diagnostics
//!
//! Callers cannot tell backends apart through this trait. Use [`new_storage`] to
//! build the backend selected in configuration.

pub mod local;
pub mod mock;
pub mod naming;
pub mod retention;
pub mod s3;

pub use local::LocalStorage;
pub use naming::ArtifactNaming;
pub use retention::{apply_retention_policy, select_for_deletion, RetentionReport};
pub use s3::S3Storage;

use crate::config::StorageConfig;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact name: '{0}'")]
    InvalidName(String),

    #[error("unsupported storage type: '{0}' (expected one of: local, s3)")]
    UnsupportedType(String),

    #[error("invalid storage configuration: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {message}")]
    Backend { context: String, message: String },
}

impl StorageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn backend(context: impl Into<String>, message: impl fmt::Display) -> Self {
        StorageError::Backend {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Uniform contract every storage backend satisfies
#[async_trait]
pub trait Storage: Send + Sync {
    /// Copy the file at `source` into the backend as `artifact_name`
    async fn upload(&self, cancel: &CancellationToken, source: &Path, artifact_name: &str) -> Result<()>;

    /// Artifact names matching the naming convention, ascending
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>>;

    /// Remove one artifact
    async fn delete(&self, cancel: &CancellationToken, artifact_name: &str) -> Result<()>;

    /// Backend identifier, for diagnostics only
    fn storage_type(&self) -> &'static str;
}

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Local,
    S3,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Local => "local",
            StorageType::S3 => "s3",
        }
    }
}

impl FromStr for StorageType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "filesystem" | "fs" => Ok(StorageType::Local),
            "s3" => Ok(StorageType::S3),
            _ => Err(StorageError::UnsupportedType(s.to_string())),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the storage backend selected by `config`
pub async fn new_storage(config: &StorageConfig, naming: &ArtifactNaming) -> Result<Arc<dyn Storage>> {
    match config.storage_type.parse::<StorageType>()? {
        StorageType::Local => {
            let local = config.local.as_ref().ok_or_else(|| {
                StorageError::Config("storage type 'local' requires a [storage.local] section".to_string())
            })?;
            let storage = LocalStorage::new(&local.path, naming.clone()).await?;
            Ok(Arc::new(storage))
        }
        StorageType::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                StorageError::Config("storage type 's3' requires a [storage.s3] section".to_string())
            })?;
            let storage = S3Storage::new(s3, naming.clone()).await?;
            Ok(Arc::new(storage))
        }
    }
}

/// Reject names that could escape the backend's namespace
pub fn validate_artifact_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Race `operation` against `cancel`; an already-cancelled token never starts it
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = operation => result,
    }
}
