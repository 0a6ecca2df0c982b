//! Cursor repository implementation for PostgreSQL.
//!
//! Reads only: the cursor is written exclusively inside the atomic apply
//! operations in [`super::PgRepositories`], so every advance commits with
//! the row mutation it belongs to.

use async_trait::async_trait;
use sqlx::PgPool;

use ensrent_core::error::{StorageError, StorageResult};
use ensrent_core::models::ApplierCursor;
use ensrent_core::ports::CursorRepository;

use super::database::Database;
use super::helpers::i64_to_u64;

/// PostgreSQL implementation of CursorRepository.
pub struct PgCursorRepository {
    pool: PgPool,
}

impl PgCursorRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl CursorRepository for PgCursorRepository {
    async fn get_cursor(&self, chain_id: &str) -> StorageResult<Option<ApplierCursor>> {
        let row = sqlx::query_as::<_, CursorRow>(
            r#"
            SELECT chain_id, last_block, last_log_index, updated_at
            FROM applier_cursor
            WHERE chain_id = $1
            "#,
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(CursorRow::into_cursor).transpose()
    }

    async fn get_any_cursor(&self) -> StorageResult<Option<ApplierCursor>> {
        let row = sqlx::query_as::<_, CursorRow>(
            r#"
            SELECT chain_id, last_block, last_log_index, updated_at
            FROM applier_cursor
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(CursorRow::into_cursor).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct CursorRow {
    chain_id: String,
    last_block: i64,
    last_log_index: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl CursorRow {
    fn into_cursor(self) -> StorageResult<ApplierCursor> {
        Ok(ApplierCursor {
            chain_id: self.chain_id,
            last_block: i64_to_u64(self.last_block, "cursor.last_block")?,
            last_log_index: i64_to_u64(self.last_log_index, "cursor.last_log_index")?,
            updated_at: self.updated_at,
        })
    }
}
