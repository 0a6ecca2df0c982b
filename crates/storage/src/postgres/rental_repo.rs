//! Rental repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use alloy_primitives::U256;

use ensrent_core::error::{StorageError, StorageResult};
use ensrent_core::models::Rental;
use ensrent_core::ports::{
    Connection, Cursor, OrderDirection, Pagination, RentalFilter, RentalOrderBy, RentalRepository,
};

use super::helpers::{
    bytes_to_address, bytes_to_b256, encode_cursor, i64_to_u64, u256_from_text,
};
use super::listing_repo::{assemble_page, keyset_op, resolve_pagination};

// =============================================================================
// Repository Implementation
// =============================================================================

/// PostgreSQL implementation of RentalRepository.
pub struct PgRentalRepository {
    pool: PgPool,
}

impl PgRentalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RENTAL_COLUMNS: &str = "id, token_id::TEXT AS token_id, borrower, start_time, \
     end_time, price::TEXT AS price, listing_id, created_at";

#[async_trait]
impl RentalRepository for PgRentalRepository {
    async fn list_for_token(&self, token_id: &U256) -> StorageResult<Vec<Rental>> {
        let query = format!(
            r#"
            SELECT {}
            FROM rental
            WHERE token_id = $1::NUMERIC
            ORDER BY end_time DESC, start_time DESC
            "#,
            RENTAL_COLUMNS
        );

        let rows = sqlx::query_as::<_, RentalRow>(&query)
            .bind(token_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.into_iter().map(RentalRow::into_rental).collect()
    }

    async fn list(
        &self,
        filter: RentalFilter,
        pagination: Pagination,
        order_by: RentalOrderBy,
        order: OrderDirection,
    ) -> StorageResult<Connection<Rental>> {
        let (limit, backward, position) =
            resolve_pagination(&pagination, order_by.as_str(), order)?;

        // Same dynamic-SQL discipline as the listing repository: column
        // names and operators come from enums, values are always bound.
        let mut conditions = Vec::new();
        let mut param_idx = 1;

        if filter.borrower.is_some() {
            conditions.push(format!("borrower = ${}", param_idx));
            param_idx += 1;
        }
        if filter.token_id.is_some() {
            conditions.push(format!("token_id = ${}::NUMERIC", param_idx));
            param_idx += 1;
        }
        if filter.listing_id.is_some() {
            conditions.push(format!("listing_id = ${}", param_idx));
            param_idx += 1;
        }
        if filter.end_time_gte.is_some() {
            conditions.push(format!("end_time >= ${}", param_idx));
            param_idx += 1;
        }

        let sort_col = order_by.as_str();
        let sort_cast = match order_by {
            RentalOrderBy::Price => "::NUMERIC",
            _ => "::BIGINT",
        };
        if position.is_some() {
            let op = keyset_op(order, backward);
            conditions.push(format!(
                "({}, id, token_id) {} (${}{}, ${}, ${}::NUMERIC)",
                sort_col,
                op,
                param_idx,
                sort_cast,
                param_idx + 1,
                param_idx + 2
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let scan = if backward { order.reversed() } else { order };
        let scan_sql = scan.as_sql();

        let query = format!(
            r#"
            SELECT {}
            FROM rental
            {}
            ORDER BY {} {}, id {}, token_id {}
            LIMIT {}
            "#,
            RENTAL_COLUMNS,
            where_clause,
            sort_col,
            scan_sql,
            scan_sql,
            scan_sql,
            limit + 1
        );

        let mut q = sqlx::query_as::<_, RentalRow>(&query);
        if let Some(ref borrower) = filter.borrower {
            q = q.bind(borrower.as_slice().to_vec());
        }
        if let Some(ref token_id) = filter.token_id {
            q = q.bind(token_id.to_string());
        }
        if let Some(ref listing_id) = filter.listing_id {
            q = q.bind(listing_id.as_slice().to_vec());
        }
        if let Some(t) = filter.end_time_gte {
            q = q.bind(t as i64);
        }
        if let Some(ref pos) = position {
            q = q
                .bind(pos.sort_value.clone())
                .bind(pos.id.as_slice().to_vec())
                .bind(pos.token_id.clone());
        }

        let rows: Vec<RentalRow> = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        let items: Vec<Rental> = rows
            .into_iter()
            .map(RentalRow::into_rental)
            .collect::<StorageResult<Vec<_>>>()?;

        let cursor_for = |rental: &Rental| -> Cursor {
            let sort_value = match order_by {
                RentalOrderBy::Price => rental.price.to_string(),
                RentalOrderBy::StartTime => rental.start_time.to_string(),
                RentalOrderBy::EndTime => rental.end_time.to_string(),
            };
            Cursor::new(encode_cursor(
                order_by.as_str(),
                order,
                &sort_value,
                &rental.id,
                &rental.token_id,
            ))
        };

        Ok(assemble_page(
            items,
            limit,
            backward,
            position.is_some(),
            cursor_for,
        ))
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct RentalRow {
    id: Vec<u8>,
    token_id: String,
    borrower: Vec<u8>,
    start_time: i64,
    end_time: i64,
    price: String,
    listing_id: Vec<u8>,
    created_at: i64,
}

impl RentalRow {
    fn into_rental(self) -> StorageResult<Rental> {
        Ok(Rental {
            id: bytes_to_b256(self.id, "rental.id")?,
            token_id: u256_from_text(&self.token_id, "rental.token_id")?,
            borrower: bytes_to_address(self.borrower, "rental.borrower")?,
            start_time: i64_to_u64(self.start_time, "rental.start_time")?,
            end_time: i64_to_u64(self.end_time, "rental.end_time")?,
            price: u256_from_text(&self.price, "rental.price")?,
            listing_id: bytes_to_b256(self.listing_id, "rental.listing_id")?,
            created_at: i64_to_u64(self.created_at, "rental.created_at")?,
        })
    }
}
