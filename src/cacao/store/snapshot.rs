// SPDX-License-Identifier: MIT

//! Committed store contents and the write-apply logic shared by backends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::cacao::model::{Playbook, PlaybookObject, RelationObject, SemanticRelation};
use crate::error::StorageError;

/// Everything stored for one playbook
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoredPlaybook {
    pub playbook: Playbook,
    #[serde(default)]
    pub objects: Vec<PlaybookObject>,
    #[serde(default)]
    pub relations: Vec<SemanticRelation>,
}

impl StoredPlaybook {
    pub fn object(&self, identifier: &str) -> Option<&PlaybookObject> {
        self.objects.iter().find(|o| o.identifier == identifier)
    }

    /// Relations leaving `subject`
    pub fn relations_from<'a>(&'a self, subject: &'a str) -> impl Iterator<Item = &'a SemanticRelation> {
        self.relations.iter().filter(move |r| r.subject == subject)
    }

    fn check_integrity(&self) -> Result<(), StorageError> {
        let mut ids = HashSet::new();
        for object in &self.objects {
            if !ids.insert(object.identifier.as_str()) {
                return Err(StorageError::DuplicateObject(object.identifier.clone()));
            }
        }
        for relation in &self.relations {
            let subject_ok = ids.contains(relation.subject.as_str());
            let object_ok = relation
                .object
                .object_id()
                .map_or(true, |id| ids.contains(id));
            if !subject_ok || !object_ok {
                return Err(StorageError::DanglingRelation {
                    subject: relation.subject.clone(),
                    predicate: relation.predicate.clone(),
                    object: match &relation.object {
                        RelationObject::Object(id) => id.clone(),
                        RelationObject::Literal(value) => value.to_string(),
                    },
                });
            }
        }
        Ok(())
    }
}

/// A buffered write, applied only at commit
#[derive(Debug, Clone)]
pub enum Write {
    DeletePlaybook(String),
    PutPlaybook(Playbook),
    CreateObject {
        playbook: String,
        object: PlaybookObject,
    },
    CreateRelation(SemanticRelation),
    TouchPlaybook {
        name: String,
        at: DateTime<Utc>,
    },
}

/// Committed state of a store, keyed by playbook name
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Snapshot {
    #[serde(default)]
    pub playbooks: BTreeMap<String, StoredPlaybook>,
}

impl Snapshot {
    /// Apply `writes` in order and return the resulting snapshot.
    ///
    /// All or nothing: on error `self` is untouched. Every playbook written
    /// to is checked for duplicate identifiers and dangling relations.
    pub fn apply(&self, writes: &[Write]) -> Result<Snapshot, StorageError> {
        let mut next = self.clone();
        let mut touched: HashSet<&str> = HashSet::new();

        for write in writes {
            match write {
                Write::DeletePlaybook(name) => {
                    next.playbooks.remove(name);
                }
                Write::PutPlaybook(playbook) => {
                    touched.insert(&playbook.name);
                    next.playbooks
                        .entry(playbook.name.clone())
                        .and_modify(|stored| stored.playbook = playbook.clone())
                        .or_insert_with(|| StoredPlaybook {
                            playbook: playbook.clone(),
                            objects: Vec::new(),
                            relations: Vec::new(),
                        });
                }
                Write::CreateObject { playbook, object } => {
                    touched.insert(playbook);
                    next.stored_mut(playbook)?.objects.push(object.clone());
                }
                Write::CreateRelation(relation) => {
                    touched.insert(&relation.playbook);
                    next.stored_mut(&relation.playbook)?
                        .relations
                        .push(relation.clone());
                }
                Write::TouchPlaybook { name, at } => {
                    next.stored_mut(name)?.playbook.last_change = Some(*at);
                }
            }
        }

        for name in touched {
            if let Some(stored) = next.playbooks.get(name) {
                stored.check_integrity()?;
                next.check_page_id(stored)?;
            }
        }
        Ok(next)
    }

    /// Page ids are unique across the whole store
    fn check_page_id(&self, stored: &StoredPlaybook) -> Result<(), StorageError> {
        let page_id = &stored.playbook.page_id;
        match self
            .playbooks
            .values()
            .find(|other| other.playbook.name != stored.playbook.name && &other.playbook.page_id == page_id)
        {
            Some(holder) => Err(StorageError::DuplicatePageId {
                page_id: page_id.clone(),
                name: stored.playbook.name.clone(),
                holder: holder.playbook.name.clone(),
            }),
            None => Ok(()),
        }
    }

    fn stored_mut(&mut self, name: &str) -> Result<&mut StoredPlaybook, StorageError> {
        self.playbooks
            .get_mut(name)
            .ok_or_else(|| StorageError::UnknownPlaybook(name.to_string()))
    }
}
