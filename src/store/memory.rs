use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EntityKind, Filter, RawDocument, RecordStore};
use crate::err::Error;

/// Process-local store. Contents are lost on shutdown.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<Vec<(EntityKind, RawDocument)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflicting_field(
    documents: &[(EntityKind, RawDocument)],
    kind: EntityKind,
    body: &Value,
    except: Option<Uuid>,
) -> Option<&'static str> {
    kind.unique_fields().iter().copied().find(|field| {
        let value = match body.get(*field) {
            Some(value) if !value.is_null() => value,
            _ => return false,
        };
        documents.iter().any(|(k, doc)| {
            *k == kind && Some(doc.id) != except && doc.body.get(*field) == Some(value)
        })
    })
}

fn duplicate(kind: EntityKind, field: &str) -> Error {
    Error::AlreadyExists {
        message: format!("A {} with this `{}` already exists", kind.as_str(), field),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, kind: EntityKind, body: Value) -> Result<RawDocument, Error> {
        if !body.is_object() {
            return Err(Error::InternalError {
                kind: "StoreError",
                message: format!("{} body must be a JSON object", kind.as_str()),
            });
        }
        let mut documents = self.documents.write().await;
        if let Some(field) = conflicting_field(&documents, kind, &body, None) {
            return Err(duplicate(kind, field));
        }
        let doc = RawDocument {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            body,
        };
        documents.push((kind, doc.clone()));
        Ok(doc)
    }

    async fn find_many(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<RawDocument>, Error> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|(k, doc)| *k == kind && filter.matches(&doc.body))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn find_by_id(&self, kind: EntityKind, id: Uuid) -> Result<Option<RawDocument>, Error> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .find(|(k, doc)| *k == kind && doc.id == id)
            .map(|(_, doc)| doc.clone()))
    }

    async fn update_one(
        &self,
        kind: EntityKind,
        filter: &Filter,
        patch: Value,
    ) -> Result<Option<RawDocument>, Error> {
        let fields = match patch {
            Value::Object(fields) => fields,
            _ => {
                return Err(Error::InternalError {
                    kind: "StoreError",
                    message: "patch must be a JSON object".to_string(),
                })
            }
        };
        let mut documents = self.documents.write().await;
        let position = documents
            .iter()
            .position(|(k, doc)| *k == kind && filter.matches(&doc.body));
        let position = match position {
            Some(position) => position,
            None => return Ok(None),
        };

        let mut body = documents[position].1.body.clone();
        if let Value::Object(target) = &mut body {
            target.extend(fields);
        }
        let id = documents[position].1.id;
        if let Some(field) = conflicting_field(&documents, kind, &body, Some(id)) {
            return Err(duplicate(kind, field));
        }
        documents[position].1.body = body;
        Ok(Some(documents[position].1.clone()))
    }
}
