//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `ensrent-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgRepositories`] - Composite repository implementing `Repositories` trait
//! - Individual repos: `PgListingRepository`, `PgRentalRepository`, etc.
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_applier(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db));
//! ```

mod cursor_repo;
mod database;
mod helpers;
mod listing_repo;
mod rental_repo;

pub use cursor_repo::PgCursorRepository;
pub use database::{Database, DatabaseConfig, PurgeStats};
pub use listing_repo::{PgListingRepository, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use rental_repo::PgRentalRepository;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use alloy_primitives::U256;

use ensrent_core::error::{StorageError, StorageResult};
use ensrent_core::models::{ApplierCursor, Listing, Rental};
use ensrent_core::ports::{
    ApplyOutcome, CursorRepository, ListingRepository, RentalRepository, Repositories,
};

// =============================================================================
// Composite Repository
// =============================================================================

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
///
/// This provides a single entry point for all storage operations and
/// implements the atomic per-event apply operations that mutate the
/// projection and advance the cursor in one transaction.
pub struct PgRepositories {
    db: Arc<Database>,
    listings: PgListingRepository,
    rentals: PgRentalRepository,
    cursor: PgCursorRepository,
}

impl PgRepositories {
    /// Create a new repository aggregate from a database connection.
    pub fn new(db: Arc<Database>) -> Self {
        let pool = db.pool().clone();
        Self {
            listings: PgListingRepository::new(pool.clone()),
            rentals: PgRentalRepository::new(pool),
            cursor: PgCursorRepository::new(&db),
            db,
        }
    }
}

#[async_trait]
impl Repositories for PgRepositories {
    fn listings(&self) -> &dyn ListingRepository {
        &self.listings
    }

    fn rentals(&self) -> &dyn RentalRepository {
        &self.rentals
    }

    fn cursor(&self) -> &dyn CursorRepository {
        &self.cursor
    }

    async fn apply_listed_atomic(
        &self,
        listing: &Listing,
        supersede: bool,
        cursor: &ApplierCursor,
    ) -> StorageResult<ApplyOutcome> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        if supersede {
            // Drop prior listing rows for the token before inserting the
            // replacement. Rentals keep their history regardless.
            sqlx::query("DELETE FROM listing WHERE token_id = $1::NUMERIC AND id <> $2")
                .bind(listing.token_id.to_string())
                .bind(listing.id.as_slice().to_vec())
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::QueryError(e.to_string()))?;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO listing (
                id, token_id, name, lender, price, node, max_rental_time, created_at
            )
            VALUES ($1, $2::NUMERIC, $3, $4, $5::NUMERIC, $6, $7, $8)
            ON CONFLICT (id, token_id) DO NOTHING
            "#,
        )
        .bind(listing.id.as_slice().to_vec())
        .bind(listing.token_id.to_string())
        .bind(&listing.name)
        .bind(listing.lender.as_slice().to_vec())
        .bind(listing.price.to_string())
        .bind(listing.node.as_slice().to_vec())
        .bind(listing.max_rental_time as i64)
        .bind(listing.created_at as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        upsert_cursor(&mut tx, cursor).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(if result.rows_affected() == 0 {
            ApplyOutcome::Duplicate
        } else {
            ApplyOutcome::Applied
        })
    }

    async fn apply_rented_atomic(
        &self,
        rental: &Rental,
        cursor: &ApplierCursor,
    ) -> StorageResult<ApplyOutcome> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO rental (
                id, token_id, borrower, start_time, end_time, price, listing_id, created_at
            )
            VALUES ($1, $2::NUMERIC, $3, $4, $5, $6::NUMERIC, $7, $8)
            ON CONFLICT (id, token_id) DO NOTHING
            "#,
        )
        .bind(rental.id.as_slice().to_vec())
        .bind(rental.token_id.to_string())
        .bind(rental.borrower.as_slice().to_vec())
        .bind(rental.start_time as i64)
        .bind(rental.end_time as i64)
        .bind(rental.price.to_string())
        .bind(rental.listing_id.as_slice().to_vec())
        .bind(rental.created_at as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        upsert_cursor(&mut tx, cursor).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(if result.rows_affected() == 0 {
            ApplyOutcome::Duplicate
        } else {
            ApplyOutcome::Applied
        })
    }

    async fn apply_reclaimed_atomic(
        &self,
        token_id: &U256,
        cursor: &ApplierCursor,
    ) -> StorageResult<u64> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        let result = sqlx::query("DELETE FROM listing WHERE token_id = $1::NUMERIC")
            .bind(token_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        upsert_cursor(&mut tx, cursor).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Advance the applier cursor inside an open transaction.
async fn upsert_cursor(
    tx: &mut Transaction<'_, Postgres>,
    cursor: &ApplierCursor,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO applier_cursor (chain_id, last_block, last_log_index, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (chain_id) DO UPDATE SET
            last_block = EXCLUDED.last_block,
            last_log_index = EXCLUDED.last_log_index,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&cursor.chain_id)
    .bind(cursor.last_block as i64)
    .bind(cursor.last_log_index as i64)
    .bind(cursor.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}
