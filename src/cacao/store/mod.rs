// SPDX-License-Identifier: MIT

//! Storage collaborator for imported playbooks
//!
//! A store hands out transactions. Writes are buffered inside the
//! transaction and only reach the backend on `commit`; a transaction that
//! is rolled back or dropped leaves the store untouched.

mod file;
mod memory;
mod snapshot;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use snapshot::{Snapshot, StoredPlaybook, Write};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cacao::model::{Playbook, PlaybookObject, SemanticRelation};
use crate::error::StorageError;

/// Point in time by which a transaction must have reached its commit
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// `Err(Timeout)` once the deadline has passed
    pub fn check(&self) -> Result<(), StorageError> {
        if self.is_expired() {
            Err(StorageError::Timeout(self.budget))
        } else {
            Ok(())
        }
    }
}

/// Run `fut` to completion, or give up when `deadline` passes.
///
/// Only for work that can be abandoned at any await point: buffering
/// writes, waiting for a lock, reading.
pub(crate) async fn before_deadline<F: Future>(
    deadline: Option<Deadline>,
    fut: F,
) -> Result<F::Output, StorageError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.at, fut)
            .await
            .map_err(|_| StorageError::Timeout(deadline.budget)),
        None => Ok(fut.await),
    }
}

/// Persistent home of imported playbooks
#[async_trait]
pub trait PlaybookStore: Send + Sync {
    /// Open a transaction
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError>;

    /// Everything stored under `name`
    async fn load(&self, name: &str) -> Result<Option<StoredPlaybook>, StorageError>;

    /// Playbook records, ordered by name
    async fn list(&self) -> Result<Vec<Playbook>, StorageError>;

    /// Delete a playbook and everything it owns. Returns `false` when
    /// nothing was stored under `name`.
    async fn remove(&self, name: &str) -> Result<bool, StorageError> {
        if self.load(name).await?.is_none() {
            return Ok(false);
        }
        let mut tx = self.begin().await?;
        tx.delete_playbook(name).await?;
        tx.commit().await?;
        Ok(true)
    }
}

/// A scoped unit of work against a store
#[async_trait]
pub trait StoreTransaction: Send {
    /// Cascade-delete a playbook with all its objects and relations
    async fn delete_playbook(&mut self, name: &str) -> Result<(), StorageError>;

    async fn put_playbook(&mut self, playbook: Playbook) -> Result<(), StorageError>;

    async fn create_object(&mut self, playbook: &str, object: PlaybookObject) -> Result<(), StorageError>;

    async fn create_relation(&mut self, relation: SemanticRelation) -> Result<(), StorageError>;

    /// Set the playbook's last-change timestamp
    async fn touch_playbook(&mut self, name: &str, at: DateTime<Utc>) -> Result<(), StorageError>;

    async fn commit(&mut self) -> Result<(), StorageError>;

    /// Commit unless `deadline` passes first. The deadline is checked up to
    /// the point where the backend starts writing; a commit that got that
    /// far runs to completion and reports its own result.
    async fn commit_within(&mut self, deadline: Deadline) -> Result<(), StorageError> {
        if let Err(expired) = deadline.check() {
            if let Err(e) = self.rollback().await {
                log::error!("Rollback failed: {}", e);
            }
            return Err(expired);
        }
        self.commit().await
    }

    async fn rollback(&mut self) -> Result<(), StorageError>;
}

/// Backend side of a [`BufferedTransaction`]
#[async_trait]
pub(crate) trait SnapshotBackend: Send + Sync {
    /// Apply the writes as one unit. With a deadline, give up (writing
    /// nothing) if it passes before the backend starts writing.
    async fn commit_writes(&self, writes: &[Write], deadline: Option<Deadline>) -> Result<(), StorageError>;
}

/// Transaction that buffers writes until commit
pub(crate) struct BufferedTransaction {
    backend: Arc<dyn SnapshotBackend>,
    writes: Vec<Write>,
    finished: bool,
}

impl BufferedTransaction {
    pub(crate) fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self {
            backend,
            writes: Vec::new(),
            finished: false,
        }
    }

    async fn finish(&mut self, deadline: Option<Deadline>) -> Result<(), StorageError> {
        if self.finished {
            return Err(StorageError::backend("transaction already finished"));
        }
        self.finished = true;
        let writes = std::mem::take(&mut self.writes);
        log::debug!("Committing {} write(s)", writes.len());
        self.backend.commit_writes(&writes, deadline).await
    }

    fn push(&mut self, write: Write) -> Result<(), StorageError> {
        if self.finished {
            return Err(StorageError::backend("transaction already finished"));
        }
        self.writes.push(write);
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for BufferedTransaction {
    async fn delete_playbook(&mut self, name: &str) -> Result<(), StorageError> {
        self.push(Write::DeletePlaybook(name.to_string()))
    }

    async fn put_playbook(&mut self, playbook: Playbook) -> Result<(), StorageError> {
        self.push(Write::PutPlaybook(playbook))
    }

    async fn create_object(&mut self, playbook: &str, object: PlaybookObject) -> Result<(), StorageError> {
        self.push(Write::CreateObject {
            playbook: playbook.to_string(),
            object,
        })
    }

    async fn create_relation(&mut self, relation: SemanticRelation) -> Result<(), StorageError> {
        self.push(Write::CreateRelation(relation))
    }

    async fn touch_playbook(&mut self, name: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.push(Write::TouchPlaybook {
            name: name.to_string(),
            at,
        })
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        self.finish(None).await
    }

    async fn commit_within(&mut self, deadline: Deadline) -> Result<(), StorageError> {
        self.finish(Some(deadline)).await
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        self.finished = true;
        let discarded = std::mem::take(&mut self.writes);
        log::debug!("Rolled back {} write(s)", discarded.len());
        Ok(())
    }
}

impl Drop for BufferedTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.writes.is_empty() {
            log::warn!(
                "Transaction dropped without commit; discarding {} write(s)",
                self.writes.len()
            );
        }
    }
}
