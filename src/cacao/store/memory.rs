// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::snapshot::{Snapshot, StoredPlaybook, Write};
use super::{before_deadline, BufferedTransaction, Deadline, PlaybookStore, SnapshotBackend, StoreTransaction};
use crate::cacao::model::Playbook;
use crate::error::StorageError;

/// In-process store; clones share the same contents
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryBackend>,
}

#[derive(Default)]
struct MemoryBackend {
    snapshot: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed contents
    pub async fn snapshot(&self) -> Snapshot {
        self.inner.snapshot.read().await.clone()
    }
}

#[async_trait]
impl SnapshotBackend for MemoryBackend {
    async fn commit_writes(&self, writes: &[Write], deadline: Option<Deadline>) -> Result<(), StorageError> {
        let mut snapshot = before_deadline(deadline, self.snapshot.write()).await?;
        if let Some(deadline) = deadline {
            deadline.check()?;
        }
        *snapshot = snapshot.apply(writes)?;
        Ok(())
    }
}

#[async_trait]
impl PlaybookStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        Ok(Box::new(BufferedTransaction::new(self.inner.clone())))
    }

    async fn load(&self, name: &str) -> Result<Option<StoredPlaybook>, StorageError> {
        let snapshot = self.inner.snapshot.read().await;
        Ok(snapshot.playbooks.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<Playbook>, StorageError> {
        let snapshot = self.inner.snapshot.read().await;
        Ok(snapshot
            .playbooks
            .values()
            .map(|stored| stored.playbook.clone())
            .collect())
    }
}
