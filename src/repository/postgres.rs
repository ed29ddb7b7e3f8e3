use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

use super::document_store::{
    Document, DocumentStore, Fields, ListQuery, Transaction, WriteOp,
};
use crate::config::AppConfig;
use crate::error::AppError;

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection text NOT NULL,
    id text NOT NULL,
    data jsonb NOT NULL DEFAULT '{}'::jsonb,
    created_at timestamptz NOT NULL DEFAULT now(),
    updated_at timestamptz NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, id)
)";

/// Documents live in one JSONB table keyed by `(collection, id)`.
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(config: &AppConfig, database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_pool_max_connections)
            .min_connections(config.db_pool_min_connections)
            .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
            .connect(database_url)
            .await
            .map_err(map_db_error)?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .map_err(map_db_error)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(row
            .and_then(|row| row.try_get::<Value, _>("data").ok())
            .map(|data| Document::new(id, into_fields(data))))
    }

    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Document>, AppError> {
        let mut builder = list_query(collection, query);
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.try_get::<String, _>("id").ok()?;
                let data = row.try_get::<Value, _>("data").ok()?;
                Some(Document::new(id, into_fields(data)))
            })
            .collect())
    }

    async fn write(&self, op: WriteOp) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        apply_write(&mut *conn, &op).await
    }

    async fn run_transaction(
        &self,
        collection: &str,
        id: &str,
        body: Transaction,
    ) -> Result<Value, AppError> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // The advisory lock also serializes transactions on documents that do
        // not exist yet, which FOR UPDATE alone cannot lock.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{collection}/{id}"))
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let current = sqlx::query(
            "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?
        .and_then(|row| row.try_get::<Value, _>("data").ok())
        .map(into_fields);

        let commit = body(current)?;
        for op in &commit.writes {
            apply_write(&mut *tx, op).await?;
        }
        tx.commit().await.map_err(map_db_error)?;

        Ok(commit.output)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected() > 0)
    }
}

async fn apply_write(conn: &mut PgConnection, op: &WriteOp) -> Result<(), AppError> {
    match op {
        WriteOp::Set {
            collection,
            id,
            data,
        } => {
            sqlx::query(
                "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)
                 ON CONFLICT (collection, id)
                 DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
            )
            .bind(collection)
            .bind(id)
            .bind(Value::Object(data.clone()))
            .execute(&mut *conn)
            .await
            .map_err(map_db_error)?;
        }
        WriteOp::Merge {
            collection,
            id,
            data,
        } => {
            sqlx::query(
                "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)
                 ON CONFLICT (collection, id)
                 DO UPDATE SET data = documents.data || EXCLUDED.data, updated_at = now()",
            )
            .bind(collection)
            .bind(id)
            .bind(Value::Object(data.clone()))
            .execute(&mut *conn)
            .await
            .map_err(map_db_error)?;
        }
    }
    Ok(())
}

fn into_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}

fn list_query(collection: &str, query: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT t.id, t.data FROM documents t WHERE t.collection = ");
    builder.push_bind(collection.to_string());

    if !query.filters.is_empty() {
        builder
            .push(" AND t.data @> ")
            .push_bind(Value::Object(query.filters.clone()));
    }

    match query.order_by.as_deref() {
        Some(field) => {
            builder.push(" ORDER BY t.data -> ").push_bind(field.to_string());
            builder.push(if query.ascending { " ASC" } else { " DESC" });
            builder.push(", t.id");
        }
        None => {
            builder.push(" ORDER BY t.id");
        }
    }

    builder
        .push(" LIMIT ")
        .push_bind(query.limit.max(1) as i64)
        .push(" OFFSET ")
        .push_bind(query.offset as i64);
    builder
}
