//! PostgreSQL-backed document store.
//!
//! Every document is one row of the `documents` table. Plain fields are kept
//! in the `data` jsonb column and server timestamp fields in `timestamps`, so
//! a timestamp never round-trips as an ordinary string. Server timestamps
//! resolve to the database clock (`now()` of the write's transaction).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::models::{CollectionPath, Document, DocumentRef, ResolvedWrite, WriteFields};
use crate::store::{DocumentStore, StoreError, generate_document_id, validate_document_id};

/// Attempts at finding an unused generated id before giving up.
const MAX_ID_ATTEMPTS: usize = 5;

type DocumentRow = (
    String,
    Json<Map<String, Value>>,
    Json<BTreeMap<String, DateTime<Utc>>>,
);

fn into_document((id, data, timestamps): DocumentRow) -> Document {
    Document::from_parts(id, data.0, timestamps.0)
}

/// Field names written as timestamps, and field names written as values.
///
/// Each list is removed from the opposite column so a field lives in
/// exactly one of `data` and `timestamps`.
fn written_keys(write: &ResolvedWrite) -> (Vec<String>, Vec<String>) {
    let timestamp_keys = write.timestamps.keys().cloned().collect();
    let value_keys = write.values.keys().cloned().collect();
    (timestamp_keys, value_keys)
}

/// A [`DocumentStore`] on top of a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction and read the server clock inside it.
    async fn begin_write(
        &self,
    ) -> Result<(Transaction<'static, Postgres>, DateTime<Utc>), StoreError> {
        let mut tx = self.pool.begin().await?;
        let now: DateTime<Utc> = sqlx::query_scalar("SELECT now()")
            .fetch_one(&mut *tx)
            .await?;
        Ok((tx, now))
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        validate_document_id(&doc.id)?;
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, data, timestamps FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(doc.collection.as_str())
        .bind(&doc.id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_document))
    }

    async fn create(
        &self,
        collection: &CollectionPath,
        fields: &WriteFields,
    ) -> Result<DocumentRef, StoreError> {
        let (mut tx, now) = self.begin_write().await?;
        let write = fields.resolve(now);

        for _ in 0..MAX_ID_ATTEMPTS {
            let doc = collection.doc(generate_document_id());
            let result = sqlx::query(
                "INSERT INTO documents (collection, id, data, timestamps) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (collection, id) DO NOTHING",
            )
            .bind(collection.as_str())
            .bind(&doc.id)
            .bind(Json(&write.values))
            .bind(Json(&write.timestamps))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                tx.commit().await?;
                debug!(doc = %doc, "document created");
                return Ok(doc);
            }
        }

        Err(StoreError::IdAllocation(collection.to_string()))
    }

    async fn update(&self, doc: &DocumentRef, fields: &WriteFields) -> Result<(), StoreError> {
        validate_document_id(&doc.id)?;
        let (mut tx, now) = self.begin_write().await?;
        let write = fields.resolve(now);
        let (timestamp_keys, value_keys) = written_keys(&write);

        let result = sqlx::query(
            "UPDATE documents \
             SET data = (data - $3::text[]) || $4, \
                 timestamps = (timestamps - $5::text[]) || $6, \
                 updated_at = now() \
             WHERE collection = $1 AND id = $2",
        )
        .bind(doc.collection.as_str())
        .bind(&doc.id)
        .bind(&timestamp_keys)
        .bind(Json(&write.values))
        .bind(&value_keys)
        .bind(Json(&write.timestamps))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(doc.to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_merge(&self, doc: &DocumentRef, fields: &WriteFields) -> Result<(), StoreError> {
        validate_document_id(&doc.id)?;
        let (mut tx, now) = self.begin_write().await?;
        let write = fields.resolve(now);
        let (timestamp_keys, value_keys) = written_keys(&write);

        sqlx::query(
            "INSERT INTO documents (collection, id, data, timestamps) \
             VALUES ($1, $2, $4, $6) \
             ON CONFLICT (collection, id) DO UPDATE \
             SET data = (documents.data - $3::text[]) || EXCLUDED.data, \
                 timestamps = (documents.timestamps - $5::text[]) || EXCLUDED.timestamps, \
                 updated_at = now()",
        )
        .bind(doc.collection.as_str())
        .bind(&doc.id)
        .bind(&timestamp_keys)
        .bind(Json(&write.values))
        .bind(&value_keys)
        .bind(Json(&write.timestamps))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        validate_document_id(&doc.id)?;
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(doc.collection.as_str())
            .bind(&doc.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, data, timestamps FROM documents WHERE collection = $1 ORDER BY seq",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_document).collect())
    }
}
