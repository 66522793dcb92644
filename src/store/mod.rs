//! Document persistence for students, teachers, classes and attendance.
//!
//! A [`RecordStore`] holds schemaless JSON bodies grouped by [`EntityKind`].
//! Filters are exact matches on top-level fields. The typed helpers in
//! [`Records`] convert between bodies and the model structs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::err::Error;
use crate::models::Stored;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Student,
    Teacher,
    Class,
    Attendance,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Student,
        EntityKind::Teacher,
        EntityKind::Class,
        EntityKind::Attendance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Student => "student",
            EntityKind::Teacher => "teacher",
            EntityKind::Class => "class",
            EntityKind::Attendance => "attendance",
        }
    }

    /// Natural keys. No two documents of the same kind may share a value
    /// for any of these fields.
    pub fn unique_fields(self) -> &'static [&'static str] {
        match self {
            EntityKind::Student => &["rollNo", "gmail"],
            EntityKind::Teacher => &["gmail"],
            EntityKind::Class | EntityKind::Attendance => &[],
        }
    }
}

/// A model type persisted under one [`EntityKind`].
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub body: Value,
}

/// Conjunction of `field == value` conditions on top-level fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Map<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn id_eq(self, field: &str, id: Uuid) -> Self {
        self.eq(field, id.to_string())
    }

    pub fn matches(&self, body: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| body.get(field) == Some(expected))
    }

    pub fn as_json(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists `body` under a freshly generated id.
    async fn insert(&self, kind: EntityKind, body: Value) -> Result<RawDocument, Error>;

    /// Every matching document, in insertion order.
    async fn find_many(&self, kind: EntityKind, filter: &Filter)
        -> Result<Vec<RawDocument>, Error>;

    async fn find_by_id(&self, kind: EntityKind, id: Uuid) -> Result<Option<RawDocument>, Error>;

    /// Merges the top-level fields of `patch` into the first matching
    /// document and returns the updated document.
    async fn update_one(
        &self,
        kind: EntityKind,
        filter: &Filter,
        patch: Value,
    ) -> Result<Option<RawDocument>, Error>;
}

fn decode<T: Document>(raw: RawDocument) -> Result<Stored<T>, Error> {
    Ok(Stored {
        id: raw.id,
        created_at: raw.created_at,
        record: serde_json::from_value(raw.body)?,
    })
}

/// Typed access on top of any [`RecordStore`].
#[async_trait]
pub trait Records {
    async fn create<T: Document + 'static>(&self, record: T) -> Result<Stored<T>, Error>;
    async fn find<T: Document + 'static>(&self, filter: Filter) -> Result<Vec<Stored<T>>, Error>;
    async fn find_one<T: Document + 'static>(&self, filter: Filter)
        -> Result<Option<Stored<T>>, Error>;
    async fn get<T: Document + 'static>(&self, id: Uuid) -> Result<Option<Stored<T>>, Error>;
    async fn patch<T: Document + 'static>(
        &self,
        filter: Filter,
        patch: Value,
    ) -> Result<Option<Stored<T>>, Error>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> Records for S {
    async fn create<T: Document + 'static>(&self, record: T) -> Result<Stored<T>, Error> {
        let body = serde_json::to_value(&record)?;
        let raw = self.insert(T::KIND, body).await?;
        Ok(Stored {
            id: raw.id,
            created_at: raw.created_at,
            record,
        })
    }

    async fn find<T: Document + 'static>(&self, filter: Filter) -> Result<Vec<Stored<T>>, Error> {
        self.find_many(T::KIND, &filter)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn find_one<T: Document + 'static>(
        &self,
        filter: Filter,
    ) -> Result<Option<Stored<T>>, Error> {
        let first = self.find_many(T::KIND, &filter).await?.into_iter().next();
        first.map(decode).transpose()
    }

    async fn get<T: Document + 'static>(&self, id: Uuid) -> Result<Option<Stored<T>>, Error> {
        self.find_by_id(T::KIND, id).await?.map(decode).transpose()
    }

    async fn patch<T: Document + 'static>(
        &self,
        filter: Filter,
        patch: Value,
    ) -> Result<Option<Stored<T>>, Error> {
        self.update_one(T::KIND, &filter, patch)
            .await?
            .map(decode)
            .transpose()
    }
}
