//! In-memory storage backend for tests
//! Available for use in external test crates

use super::{cancellable, validate_artifact_name, ArtifactNaming, Result, Storage, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Recorded storage invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageCall {
    Upload(String),
    List,
    Delete(String),
}

/// Storage that keeps artifacts in a shared map and records every call
#[derive(Clone, Default)]
pub struct MemoryStorage {
    pub artifacts: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    pub calls: Arc<Mutex<Vec<StorageCall>>>,
    failing_deletes: Arc<Mutex<HashSet<String>>>,
    fail_list: Arc<Mutex<bool>>,
    fail_upload: Arc<Mutex<bool>>,
    upload_delay: Arc<Mutex<Option<Duration>>>,
    /// Listing filter; `None` lists every stored name
    naming: Option<ArtifactNaming>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with empty artifacts
    pub fn with_artifacts(names: &[&str]) -> Self {
        let storage = Self::new();
        {
            let mut artifacts = storage.artifacts.lock().unwrap();
            for name in names {
                artifacts.insert(name.to_string(), Vec::new());
            }
        }
        storage
    }

    /// Only list names matching `naming`
    pub fn with_naming(mut self, naming: ArtifactNaming) -> Self {
        self.naming = Some(naming);
        self
    }

    pub fn with_failing_delete(self, name: &str) -> Self {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn with_failing_list(self) -> Self {
        *self.fail_list.lock().unwrap() = true;
        self
    }

    pub fn with_failing_upload(self) -> Self {
        *self.fail_upload.lock().unwrap() = true;
        self
    }

    /// Make each upload take `delay` (interrupted by cancellation)
    pub fn with_upload_delay(self, delay: Duration) -> Self {
        *self.upload_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Every stored name, regardless of the listing filter
    pub fn artifact_names(&self) -> Vec<String> {
        self.artifacts.lock().unwrap().keys().cloned().collect()
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.artifacts.lock().unwrap().get(name).cloned()
    }

    pub fn get_calls(&self) -> Vec<StorageCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn upload_calls(&self) -> Vec<String> {
        self.get_calls()
            .into_iter()
            .filter_map(|call| match call {
                StorageCall::Upload(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.get_calls()
            .into_iter()
            .filter_map(|call| match call {
                StorageCall::Delete(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StorageCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(&self, cancel: &CancellationToken, source: &Path, artifact_name: &str) -> Result<()> {
        self.record(StorageCall::Upload(artifact_name.to_string()));
        validate_artifact_name(artifact_name)?;

        let delay = *self.upload_delay.lock().unwrap();
        let fail = *self.fail_upload.lock().unwrap();

        cancellable(cancel, async {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(StorageError::backend(
                    format!("Failed to upload {}", artifact_name),
                    "simulated upload failure",
                ));
            }

            let bytes = tokio::fs::read(source)
                .await
                .map_err(|e| StorageError::io(format!("Failed to read {}", source.display()), e))?;
            self.artifacts
                .lock()
                .unwrap()
                .insert(artifact_name.to_string(), bytes);
            Ok(())
        })
        .await
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.record(StorageCall::List);
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if *self.fail_list.lock().unwrap() {
            return Err(StorageError::backend("Failed to list memory storage", "simulated list failure"));
        }

        // BTreeMap keys are already ascending
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .keys()
            .filter(|name| self.naming.as_ref().map_or(true, |n| n.matches(name)))
            .cloned()
            .collect())
    }

    async fn delete(&self, cancel: &CancellationToken, artifact_name: &str) -> Result<()> {
        self.record(StorageCall::Delete(artifact_name.to_string()));
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if self.failing_deletes.lock().unwrap().contains(artifact_name) {
            return Err(StorageError::backend(
                format!("Failed to delete {}", artifact_name),
                "simulated delete failure",
            ));
        }

        match self.artifacts.lock().unwrap().remove(artifact_name) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(artifact_name.to_string())),
        }
    }

    fn storage_type(&self) -> &'static str {
        "memory"
    }
}
