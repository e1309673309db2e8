//! S3-compatible object storage backend
//!
//! Works against AWS S3 and S3-compatible providers (MinIO, Wasabi, ...). A
//! custom endpoint and path-style addressing cover non-AWS providers. Static
//! credentials are used when configured, otherwise the SDK's default provider
//! chain resolves them from the environment.

use super::{cancellable, validate_artifact_name, ArtifactNaming, Result, Storage, StorageError};
use crate::config::S3StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    naming: ArtifactNaming,
}

impl S3Storage {
    pub async fn new(config: &S3StorageConfig, naming: ArtifactNaming) -> Result<Self> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::Config("S3 bucket name is required".to_string()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        let blank = |key: &Option<String>| key.as_deref().map_or(true, str::is_empty);
        match config.static_credentials() {
            Some((access_key, secret_key)) => {
                let credentials = Credentials::new(access_key, secret_key, None, None, "backup-runner-static");
                loader = loader.credentials_provider(credentials);
            }
            None if blank(&config.access_key) && blank(&config.secret_key) => {
                debug!("No static S3 credentials configured, using default provider chain");
            }
            None => {
                return Err(StorageError::Config(
                    "S3 access_key and secret_key must be set together".to_string(),
                ))
            }
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self::from_client(
            Client::from_conf(builder.build()),
            config.bucket.clone(),
            config.prefix.clone(),
            naming,
        ))
    }

    /// Wrap an already-configured client
    pub fn from_client(client: Client, bucket: String, prefix: Option<String>, naming: ArtifactNaming) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Self {
            client,
            bucket,
            prefix,
            naming,
        }
    }

    /// Object key for an artifact name
    fn key(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, name),
            None => name.to_string(),
        }
    }

    /// Artifact name for an object key, if it sits directly under the prefix
    fn name_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let name = match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str())?.strip_prefix('/')?,
            None => key,
        };

        if name.contains('/') {
            None
        } else {
            Some(name)
        }
    }

    fn list_prefix(&self) -> String {
        self.key(&self.naming.prefix)
    }

    fn location(&self, name: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.key(name))
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(&self, cancel: &CancellationToken, source: &Path, artifact_name: &str) -> Result<()> {
        validate_artifact_name(artifact_name)?;
        let key = self.key(artifact_name);
        let location = self.location(artifact_name);

        cancellable(cancel, async {
            let body = ByteStream::from_path(source)
                .await
                .map_err(|e| StorageError::backend(format!("Failed to read {}", source.display()), e))?;

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(body)
                .send()
                .await
                .map_err(|e| StorageError::backend(format!("Failed to upload {}", location), DisplayErrorContext(&e)))?;

            info!("Uploaded {}", location);
            Ok(())
        })
        .await
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        cancellable(cancel, async {
            let list_prefix = self.list_prefix();
            let mut names = Vec::new();
            let mut continuation_token: Option<String> = None;

            loop {
                let response = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&list_prefix)
                    .set_continuation_token(continuation_token.take())
                    .send()
                    .await
                    .map_err(|e| {
                        StorageError::backend(
                            format!("Failed to list s3://{}/{}", self.bucket, list_prefix),
                            DisplayErrorContext(&e),
                        )
                    })?;

                names.extend(
                    response
                        .contents()
                        .iter()
                        .filter_map(|object| object.key())
                        .filter_map(|key| self.name_from_key(key))
                        .filter(|name| self.naming.matches(name))
                        .map(str::to_string),
                );

                match response.next_continuation_token() {
                    Some(token) if response.is_truncated().unwrap_or(false) => {
                        continuation_token = Some(token.to_string());
                    }
                    _ => break,
                }
            }

            names.sort();
            Ok(names)
        })
        .await
    }

    async fn delete(&self, cancel: &CancellationToken, artifact_name: &str) -> Result<()> {
        validate_artifact_name(artifact_name)?;
        let key = self.key(artifact_name);
        let location = self.location(artifact_name);

        cancellable(cancel, async {
            // DeleteObject succeeds for missing keys, so probe first
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| {
                    if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                        StorageError::NotFound(artifact_name.to_string())
                    } else {
                        StorageError::backend(format!("Failed to stat {}", location), DisplayErrorContext(&e))
                    }
                })?;

            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| StorageError::backend(format!("Failed to delete {}", location), DisplayErrorContext(&e)))?;

            debug!("Deleted {}", location);
            Ok(())
        })
        .await
    }

    fn storage_type(&self) -> &'static str {
        "s3"
    }
}
