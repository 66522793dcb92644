use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{EntityKind, Filter, RawDocument, RecordStore};
use crate::err::Error;

const CREATE_DOCUMENTS: &str = "CREATE TABLE IF NOT EXISTS documents (
    seq BIGSERIAL PRIMARY KEY,
    id UUID NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    body JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
)";

const CREATE_BODY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS documents_body ON documents USING GIN (body jsonb_path_ops)";

/// Documents live in a single JSONB table keyed by kind. `seq` gives the
/// insertion order that ordered reads rely on.
#[derive(Debug, Clone)]
pub struct PgStore {
    pg: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    body: Json<Value>,
    created_at: DateTime<Utc>,
}

impl From<DocumentRow> for RawDocument {
    fn from(row: DocumentRow) -> Self {
        RawDocument {
            id: row.id,
            created_at: row.created_at,
            body: row.body.0,
        }
    }
}

fn unique_index_name(kind: EntityKind, field: &str) -> String {
    format!("documents_{}_{}", kind.as_str(), field.to_lowercase())
}

impl PgStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pg = PgPool::connect(url).await?;
        let store = PgStore { pg };
        store.prepare_schema().await?;
        Ok(store)
    }

    /// Idempotent; safe to run on every start-up.
    pub async fn prepare_schema(&self) -> anyhow::Result<()> {
        sqlx::query(CREATE_DOCUMENTS).execute(&self.pg).await?;
        sqlx::query(CREATE_BODY_INDEX).execute(&self.pg).await?;
        for kind in EntityKind::ALL {
            for field in kind.unique_fields() {
                let statement = format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {} ON documents ((body->>'{}')) WHERE kind = '{}'",
                    unique_index_name(kind, field),
                    field,
                    kind.as_str()
                );
                sqlx::query(&statement).execute(&self.pg).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert(&self, kind: EntityKind, body: Value) -> Result<RawDocument, Error> {
        let doc = RawDocument {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            body,
        };
        let res = sqlx::query("INSERT INTO documents (id, kind, body, created_at) VALUES ($1, $2, $3, $4)")
            .bind(&doc.id)
            .bind(kind.as_str())
            .bind(Json(&doc.body))
            .bind(&doc.created_at)
            .execute(&self.pg)
            .await
            .map_err(Error::from)?;

        if res.rows_affected() < 1 {
            return Err(Error::InternalError {
                kind: "DatabaseError",
                message: "Could not save document to database!".to_string(),
            });
        }
        Ok(doc)
    }

    async fn find_many(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<RawDocument>, Error> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, body, created_at FROM documents WHERE kind = $1 AND body @> $2 ORDER BY seq",
        )
        .bind(kind.as_str())
        .bind(Json(filter.as_json()))
        .fetch_all(&self.pg)
        .await
        .map_err(Error::from)?;
        Ok(rows.into_iter().map(RawDocument::from).collect())
    }

    async fn find_by_id(&self, kind: EntityKind, id: Uuid) -> Result<Option<RawDocument>, Error> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, body, created_at FROM documents WHERE kind = $1 AND id = $2 LIMIT 1",
        )
        .bind(kind.as_str())
        .bind(&id)
        .fetch_optional(&self.pg)
        .await
        .map_err(Error::from)?;
        Ok(row.map(RawDocument::from))
    }

    async fn update_one(
        &self,
        kind: EntityKind,
        filter: &Filter,
        patch: Value,
    ) -> Result<Option<RawDocument>, Error> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "UPDATE documents SET body = body || $3 WHERE seq = (
                SELECT seq FROM documents WHERE kind = $1 AND body @> $2 ORDER BY seq LIMIT 1
            ) RETURNING id, body, created_at",
        )
        .bind(kind.as_str())
        .bind(Json(filter.as_json()))
        .bind(Json(patch))
        .fetch_optional(&self.pg)
        .await
        .map_err(Error::from)?;
        Ok(row.map(RawDocument::from))
    }
}
