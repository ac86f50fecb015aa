// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::snapshot::{Snapshot, StoredPlaybook, Write};
use super::{before_deadline, BufferedTransaction, Deadline, PlaybookStore, SnapshotBackend, StoreTransaction};
use crate::cacao::model::Playbook;
use crate::error::StorageError;

/// Store backed by a single JSON snapshot file.
///
/// Commits write the whole snapshot to a sibling temp file and rename it
/// over the original, so readers never see a half-written file.
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<FileBackend>,
}

struct FileBackend {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(FileBackend {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl FileBackend {
    async fn read(&self) -> Result<Snapshot, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Snapshot::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Snapshot::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotBackend for FileBackend {
    async fn commit_writes(&self, writes: &[Write], deadline: Option<Deadline>) -> Result<(), StorageError> {
        let _guard = before_deadline(deadline, self.lock.lock()).await?;
        let next = before_deadline(deadline, self.read()).await??.apply(writes)?;

        // Point of no return: once the write starts it is not abandoned
        if let Some(deadline) = deadline {
            deadline.check()?;
        }
        self.write(&next).await?;
        log::debug!("Wrote snapshot to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl PlaybookStore for FileStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        Ok(Box::new(BufferedTransaction::new(self.inner.clone())))
    }

    async fn load(&self, name: &str) -> Result<Option<StoredPlaybook>, StorageError> {
        let mut snapshot = self.inner.read().await?;
        Ok(snapshot.playbooks.remove(name))
    }

    async fn list(&self) -> Result<Vec<Playbook>, StorageError> {
        let snapshot = self.inner.read().await?;
        Ok(snapshot
            .playbooks
            .into_values()
            .map(|stored| stored.playbook)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cacao::model::PlaybookObject;
    use serde_json::Map;
    use std::time::Duration;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("cacao-store-{}", uuid::Uuid::new_v4()))
            .join("playbooks.json")
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let store = FileStore::new(temp_path());
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.load("pb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_persists_across_instances() {
        let path = temp_path();
        let store = FileStore::new(&path);

        let mut tx = store.begin().await.unwrap();
        tx.put_playbook(Playbook::new("pb", Some("desc".to_string())))
            .await
            .unwrap();
        tx.create_object(
            "pb",
            PlaybookObject {
                identifier: "pb/end/e1".to_string(),
                form_tag: "end".to_string(),
                content: Map::new(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let reopened = FileStore::new(&path);
        let stored = reopened.load("pb").await.unwrap().unwrap();
        assert_eq!(stored.playbook.description.as_deref(), Some("desc"));
        assert_eq!(stored.objects[0].identifier, "pb/end/e1");
        assert!(!path.with_extension("json.tmp").exists());

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_file_unchanged() {
        let path = temp_path();
        let store = FileStore::new(&path);

        let mut tx = store.begin().await.unwrap();
        tx.put_playbook(Playbook::new("pb", None)).await.unwrap();
        tx.commit().await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.touch_playbook("unknown", chrono::Utc::now()).await.unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(StorageError::UnknownPlaybook(_))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_leaves_file_unchanged() {
        let path = temp_path();
        let store = FileStore::new(&path);

        let mut tx = store.begin().await.unwrap();
        tx.put_playbook(Playbook::new("pb", None)).await.unwrap();
        tx.commit().await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.delete_playbook("pb").await.unwrap();
        tx.put_playbook(Playbook::new("other", None)).await.unwrap();
        let err = tx
            .commit_within(Deadline::after(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert!(!path.with_extension("json.tmp").exists());

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
    }

    #[tokio::test]
    async fn test_commit_within_live_deadline_persists() {
        let path = temp_path();
        let store = FileStore::new(&path);

        let mut tx = store.begin().await.unwrap();
        tx.put_playbook(Playbook::new("pb", None)).await.unwrap();
        tx.commit_within(Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(FileStore::new(&path).load("pb").await.unwrap().is_some());

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let path = temp_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(&path, "{ not json").unwrap();
        let store = FileStore::new(&path);
        assert!(matches!(store.list().await, Err(StorageError::Json(_))));

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
    }
}
