//! Unit tests for the filesystem storage backend

use backup_runner::storage::LocalStorage;
use std::sync::Arc;
use test_utils::{artifact_on, create_artifacts, foreign_objects, sample_artifacts, ArtifactNaming, Storage, StorageError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn storage_in(temp_dir: &TempDir) -> LocalStorage {
    LocalStorage::new(temp_dir.path().join("store"), ArtifactNaming::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_creates_missing_root() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("a").join("b").join("store");

    let storage = LocalStorage::new(&root, ArtifactNaming::default()).await.unwrap();

    assert!(root.is_dir());
    assert_eq!(storage.root(), root.as_path());
    assert_eq!(storage.storage_type(), "local");
}

#[tokio::test]
async fn test_list_ignores_foreign_objects_and_directories() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir).await;
    let store = storage.root().to_path_buf();

    let artifacts = sample_artifacts(3);
    create_artifacts(&store, &artifacts).unwrap();
    for name in foreign_objects() {
        std::fs::write(store.join(name), "x").unwrap();
    }
    std::fs::create_dir_all(store.join(artifact_on(20))).unwrap();
    std::fs::write(store.join(format!("{}.partial", artifact_on(21))), "half").unwrap();

    let listed = storage.list(&CancellationToken::new()).await.unwrap();
    assert_eq!(listed, artifacts);
}

#[tokio::test]
async fn test_upload_replaces_existing_artifact() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir).await;
    let name = artifact_on(1);
    let source = temp_dir.path().join("source");
    let cancel = CancellationToken::new();

    std::fs::write(&source, "first").unwrap();
    storage.upload(&cancel, &source, &name).await.unwrap();
    std::fs::write(&source, "second").unwrap();
    storage.upload(&cancel, &source, &name).await.unwrap();

    assert_eq!(std::fs::read_to_string(storage.root().join(&name)).unwrap(), "second");
    assert_eq!(storage.list(&cancel).await.unwrap(), vec![name]);
    assert!(source.exists());
}

#[tokio::test]
async fn test_concurrent_uploads() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(storage_in(&temp_dir).await);
    let source = temp_dir.path().join("source");
    std::fs::write(&source, vec![7u8; 64 * 1024]).unwrap();

    let mut handles = Vec::new();
    for name in sample_artifacts(5) {
        let storage = Arc::clone(&storage);
        let source = source.clone();
        handles.push(tokio::spawn(async move {
            storage.upload(&CancellationToken::new(), &source, &name).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(storage.list(&CancellationToken::new()).await.unwrap(), sample_artifacts(5));
}

#[tokio::test]
async fn test_delete_removes_exactly_one() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir).await;
    let artifacts = sample_artifacts(3);
    create_artifacts(storage.root(), &artifacts).unwrap();
    let cancel = CancellationToken::new();

    storage.delete(&cancel, &artifacts[1]).await.unwrap();

    assert_eq!(
        storage.list(&cancel).await.unwrap(),
        vec![artifacts[0].clone(), artifacts[2].clone()]
    );
    assert!(matches!(
        storage.delete(&cancel, &artifacts[1]).await,
        Err(StorageError::NotFound(name)) if name == artifacts[1]
    ));
}

#[tokio::test]
async fn test_cancelled_token_stops_every_operation() {
    let temp_dir = TempDir::new().unwrap();
    let storage = storage_in(&temp_dir).await;
    let artifacts = sample_artifacts(1);
    create_artifacts(storage.root(), &artifacts).unwrap();
    let source = temp_dir.path().join("source");
    std::fs::write(&source, "data").unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(storage.list(&cancel).await.unwrap_err().is_cancelled());
    assert!(storage.delete(&cancel, &artifacts[0]).await.unwrap_err().is_cancelled());
    assert!(storage.upload(&cancel, &source, &artifact_on(2)).await.unwrap_err().is_cancelled());
    assert!(storage.root().join(&artifacts[0]).exists());
    assert!(!storage.root().join(artifact_on(2)).exists());
}
