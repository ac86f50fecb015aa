// SPDX-License-Identifier: MIT

//! Staging arena for one imported document

use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

use crate::cacao::model::{slug, Playbook, PlaybookObject, RelationObject, SemanticRelation};
use crate::error::SchemaError;

/// Identifier prefix shared by every object of a playbook:
/// `<slug>-<first 8 hex digits of a v5 uuid of the name>`
pub fn playbook_prefix(name: &str) -> String {
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).simple().to_string();
    let slug = slug(name);
    if slug.is_empty() {
        digest[..8].to_string()
    } else {
        format!("{}-{}", slug, &digest[..8])
    }
}

/// Objects and relations staged before a save
#[derive(Debug, Clone)]
pub struct StagedGraph {
    playbook: Playbook,
    prefix: String,
    objects: Vec<PlaybookObject>,
    ids: HashSet<String>,
    relations: Vec<SemanticRelation>,
}

impl StagedGraph {
    pub fn new(playbook: Playbook) -> Self {
        Self {
            prefix: playbook_prefix(&playbook.name),
            playbook,
            objects: Vec::new(),
            ids: HashSet::new(),
            relations: Vec::new(),
        }
    }

    /// `<prefix>/<kind>/<key>`, or `<prefix>/<kind>` without a key
    pub fn identifier(&self, kind: &str, key: Option<&str>) -> String {
        match key {
            Some(key) => format!("{}/{}/{}", self.prefix, kind, key),
            None => format!("{}/{}", self.prefix, kind),
        }
    }

    /// Stage an object and return its identifier. An identifier already in
    /// use gets the first free `~n` suffix.
    pub fn add_object(&mut self, identifier: String, form_tag: &str, content: Map<String, Value>) -> String {
        let identifier = if self.ids.contains(&identifier) {
            let mut n = 2;
            let mut unique = format!("{}~{}", identifier, n);
            while self.ids.contains(&unique) {
                n += 1;
                unique = format!("{}~{}", identifier, n);
            }
            log::debug!("Identifier collision, staged as '{}'", unique);
            unique
        } else {
            identifier
        };

        self.ids.insert(identifier.clone());
        self.objects.push(PlaybookObject {
            identifier: identifier.clone(),
            form_tag: form_tag.to_string(),
            content,
        });
        identifier
    }

    /// Stage a relation; both ends must already be staged
    pub fn add_relation(&mut self, subject: &str, predicate: &str, object: RelationObject) -> Result<(), SchemaError> {
        let missing = [Some(subject), object.object_id()]
            .into_iter()
            .flatten()
            .find(|id| !self.ids.contains(*id));
        if let Some(id) = missing {
            return Err(SchemaError::other(format!(
                "relation '{}' from '{}' refers to unstaged object '{}'",
                predicate, subject, id
            )));
        }

        self.relations.push(SemanticRelation {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object,
            playbook: self.playbook.name.clone(),
        });
        Ok(())
    }

    pub fn link(&mut self, subject: &str, predicate: &str, object: &str) -> Result<(), SchemaError> {
        self.add_relation(subject, predicate, RelationObject::Object(object.to_string()))
    }

    pub fn playbook(&self) -> &Playbook {
        &self.playbook
    }

    pub fn objects(&self) -> &[PlaybookObject] {
        &self.objects
    }

    pub fn relations(&self) -> &[SemanticRelation] {
        &self.relations
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
