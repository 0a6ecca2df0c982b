//! Listing repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use alloy_primitives::{B256, U256};

use ensrent_core::error::{StorageError, StorageResult};
use ensrent_core::models::Listing;
use ensrent_core::ports::{
    Connection, Cursor, ListingFilter, ListingOrderBy, ListingRepository, OrderDirection, PageInfo,
    Pagination,
};

use super::helpers::{
    bytes_to_address, bytes_to_b256, decode_cursor, encode_cursor, i64_to_u64, u256_from_text,
    CursorPosition,
};

/// Default page size of the query surface.
pub const DEFAULT_PAGE_SIZE: i32 = 15;
/// Hard upper bound on page size.
pub const MAX_PAGE_SIZE: i32 = 100;

/// Comparison operator for the keyset condition.
///
/// Forward pagination walks in the requested order, backward pagination
/// scans the reversed order and flips the comparison.
pub(super) fn keyset_op(order: OrderDirection, backward: bool) -> &'static str {
    match (order, backward) {
        (OrderDirection::Asc, false) => ">",
        (OrderDirection::Desc, false) => "<",
        (OrderDirection::Asc, true) => "<",
        (OrderDirection::Desc, true) => ">",
    }
}

/// Resolve pagination parameters: clamped limit, scan direction and the
/// decoded cursor position, rejecting `after` + `before` together.
pub(super) fn resolve_pagination(
    pagination: &Pagination,
    order_name: &str,
    order: OrderDirection,
) -> StorageResult<(i32, bool, Option<CursorPosition>)> {
    if pagination.after.is_some() && pagination.before.is_some() {
        return Err(StorageError::InvalidCursor(
            "cannot combine 'after' and 'before'".into(),
        ));
    }

    let limit = pagination
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let backward = pagination.before.is_some();

    let position = match (&pagination.after, &pagination.before) {
        (Some(cursor), _) | (_, Some(cursor)) => {
            Some(decode_cursor(&cursor.value, order_name, order)?)
        }
        _ => None,
    };

    Ok((limit, backward, position))
}

/// Assemble a page from a keyset scan that fetched `limit + 1` rows.
///
/// Drops the look-ahead row, restores the requested order for backward scans
/// (which arrive in reversed scan order) and derives the page info.
/// `from_cursor` is whether the scan started from a cursor position.
pub(super) fn assemble_page<T>(
    mut rows: Vec<T>,
    limit: i32,
    backward: bool,
    from_cursor: bool,
    cursor_for: impl Fn(&T) -> Cursor,
) -> Connection<T> {
    let has_more = rows.len() > limit as usize;
    rows.truncate(limit as usize);
    if backward {
        rows.reverse();
    }

    let page_info = PageInfo {
        has_next_page: if backward { from_cursor } else { has_more },
        has_previous_page: if backward { has_more } else { from_cursor },
        start_cursor: rows.first().map(&cursor_for),
        end_cursor: rows.last().map(&cursor_for),
    };

    Connection {
        items: rows,
        page_info,
        total_count: None,
    }
}

// =============================================================================
// Repository Implementation
// =============================================================================

/// PostgreSQL implementation of ListingRepository.
pub struct PgListingRepository {
    pool: PgPool,
}

impl PgListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const LISTING_COLUMNS: &str = "id, token_id::TEXT AS token_id, name, lender, \
     price::TEXT AS price, node, max_rental_time, created_at";

#[async_trait]
impl ListingRepository for PgListingRepository {
    async fn get_by_token(&self, token_id: &U256) -> StorageResult<Option<Listing>> {
        let query = format!(
            r#"
            SELECT {}
            FROM listing
            WHERE token_id = $1::NUMERIC
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            LISTING_COLUMNS
        );

        let row = sqlx::query_as::<_, ListingRow>(&query)
            .bind(token_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(ListingRow::into_listing).transpose()
    }

    async fn get_by_id(&self, id: &B256) -> StorageResult<Option<Listing>> {
        let query = format!(
            r#"
            SELECT {}
            FROM listing
            WHERE id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            LISTING_COLUMNS
        );

        let row = sqlx::query_as::<_, ListingRow>(&query)
            .bind(id.as_slice().to_vec())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(ListingRow::into_listing).transpose()
    }

    async fn list(
        &self,
        filter: ListingFilter,
        pagination: Pagination,
        order_by: ListingOrderBy,
        order: OrderDirection,
    ) -> StorageResult<Connection<Listing>> {
        let (limit, backward, position) =
            resolve_pagination(&pagination, order_by.as_str(), order)?;

        // Build dynamic query.
        //
        // SAFETY: This dynamic SQL is safe from injection because:
        // 1. Column names come from ListingOrderBy, not user strings
        // 2. Operators come from keyset_op, hardcoded
        // 3. All VALUES are parameterized via $1, $2, etc. and bound separately
        // 4. Order direction comes from enum (ASC/DESC), not user strings
        let mut conditions = Vec::new();
        let mut param_idx = 1;

        if filter.name_contains.is_some() {
            conditions.push(format!("name ILIKE ${}", param_idx));
            param_idx += 1;
        }
        if filter.lender.is_some() {
            conditions.push(format!("lender = ${}", param_idx));
            param_idx += 1;
        }
        if filter.lender_not.is_some() {
            conditions.push(format!("lender <> ${}", param_idx));
            param_idx += 1;
        }
        if filter.max_rental_time_gt.is_some() {
            conditions.push(format!("max_rental_time > ${}", param_idx));
            param_idx += 1;
        }
        if filter.token_id.is_some() {
            conditions.push(format!("token_id = ${}::NUMERIC", param_idx));
            param_idx += 1;
        }

        let sort_col = order_by.as_str();
        // The cursor carries values as text; casts restore the column type.
        let sort_cast = match order_by {
            ListingOrderBy::Price => "::NUMERIC",
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

        // Backward pagination scans the reversed order, then the page is
        // reversed in memory so items always come back in requested order.
        let scan = if backward { order.reversed() } else { order };
        let scan_sql = scan.as_sql();

        let query = format!(
            r#"
            SELECT {}
            FROM listing
            {}
            ORDER BY {} {}, id {}, token_id {}
            LIMIT {}
            "#,
            LISTING_COLUMNS,
            where_clause,
            sort_col,
            scan_sql,
            scan_sql,
            scan_sql,
            limit + 1
        );

        let mut q = sqlx::query_as::<_, ListingRow>(&query);
        if let Some(ref name) = filter.name_contains {
            q = q.bind(format!("%{}%", name));
        }
        if let Some(ref lender) = filter.lender {
            q = q.bind(lender.as_slice().to_vec());
        }
        if let Some(ref lender_not) = filter.lender_not {
            q = q.bind(lender_not.as_slice().to_vec());
        }
        if let Some(t) = filter.max_rental_time_gt {
            q = q.bind(t as i64);
        }
        if let Some(ref token_id) = filter.token_id {
            q = q.bind(token_id.to_string());
        }
        if let Some(ref pos) = position {
            q = q
                .bind(pos.sort_value.clone())
                .bind(pos.id.as_slice().to_vec())
                .bind(pos.token_id.clone());
        }

        let rows: Vec<ListingRow> = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        let items: Vec<Listing> = rows
            .into_iter()
            .map(ListingRow::into_listing)
            .collect::<StorageResult<Vec<_>>>()?;

        let cursor_for = |listing: &Listing| -> Cursor {
            let sort_value = match order_by {
                ListingOrderBy::Price => listing.price.to_string(),
                ListingOrderBy::MaxRentalTime => listing.max_rental_time.to_string(),
                ListingOrderBy::CreatedAt => listing.created_at.to_string(),
            };
            Cursor::new(encode_cursor(
                order_by.as_str(),
                order,
                &sort_value,
                &listing.id,
                &listing.token_id,
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
struct ListingRow {
    id: Vec<u8>,
    token_id: String,
    name: String,
    lender: Vec<u8>,
    price: String,
    node: Vec<u8>,
    max_rental_time: i64,
    created_at: i64,
}

impl ListingRow {
    fn into_listing(self) -> StorageResult<Listing> {
        Ok(Listing {
            id: bytes_to_b256(self.id, "listing.id")?,
            token_id: u256_from_text(&self.token_id, "listing.token_id")?,
            name: self.name,
            lender: bytes_to_address(self.lender, "listing.lender")?,
            price: u256_from_text(&self.price, "listing.price")?,
            node: bytes_to_b256(self.node, "listing.node")?,
            max_rental_time: i64_to_u64(self.max_rental_time, "listing.max_rental_time")?,
            created_at: i64_to_u64(self.created_at, "listing.created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyset_op_flips_for_backward_scans() {
        assert_eq!(keyset_op(OrderDirection::Asc, false), ">");
        assert_eq!(keyset_op(OrderDirection::Desc, false), "<");
        assert_eq!(keyset_op(OrderDirection::Asc, true), "<");
        assert_eq!(keyset_op(OrderDirection::Desc, true), ">");
    }

    #[test]
    fn pagination_rejects_after_and_before_together() {
        let pagination = Pagination {
            limit: Some(10),
            after: Some(Cursor::new("aa")),
            before: Some(Cursor::new("bb")),
        };
        let err = resolve_pagination(&pagination, "price", OrderDirection::Asc).unwrap_err();
        assert!(matches!(err, StorageError::InvalidCursor(_)));
    }

    #[test]
    fn pagination_clamps_limit() {
        let (limit, backward, position) =
            resolve_pagination(&Pagination::first(1_000), "price", OrderDirection::Asc).unwrap();
        assert_eq!(limit, MAX_PAGE_SIZE);
        assert!(!backward);
        assert!(position.is_none());

        let (limit, _, _) =
            resolve_pagination(&Pagination::first(-3), "price", OrderDirection::Asc).unwrap();
        assert_eq!(limit, 1);

        let (limit, _, _) =
            resolve_pagination(&Pagination::default(), "price", OrderDirection::Asc).unwrap();
        assert_eq!(limit, DEFAULT_PAGE_SIZE);
    }

    // =========================================================================
    // Keyset walk
    // =========================================================================

    use alloy_primitives::Address;

    fn listing(price: u64, seed: u8) -> Listing {
        Listing {
            id: B256::repeat_byte(seed),
            token_id: U256::from(seed as u64),
            name: format!("domain{}", seed),
            lender: Address::repeat_byte(0xaa),
            price: U256::from(price),
            node: B256::repeat_byte(0x11),
            max_rental_time: 2_000_000_000,
            created_at: 1_700_000_000,
        }
    }

    // Miroir en mémoire du scan SQL sur price: comparaison de tuples
    // (price, id, token_id), tri dans le sens du scan, lecture limit+1.
    fn scan_by_price(
        data: &[Listing],
        order: OrderDirection,
        pagination: &Pagination,
    ) -> Connection<Listing> {
        let order_by = ListingOrderBy::Price;
        let (limit, backward, position) =
            resolve_pagination(pagination, order_by.as_str(), order).unwrap();

        let key = |l: &Listing| (l.price, l.id, l.token_id);

        let mut rows: Vec<Listing> = data
            .iter()
            .filter(|l| match &position {
                Some(pos) => {
                    let pos_key = (
                        pos.sort_value.parse::<U256>().unwrap(),
                        pos.id,
                        pos.token_id.parse::<U256>().unwrap(),
                    );
                    match keyset_op(order, backward) {
                        ">" => key(l) > pos_key,
                        _ => key(l) < pos_key,
                    }
                }
                None => true,
            })
            .cloned()
            .collect();

        let scan = if backward { order.reversed() } else { order };
        rows.sort_by(|a, b| match scan {
            OrderDirection::Asc => key(a).cmp(&key(b)),
            OrderDirection::Desc => key(b).cmp(&key(a)),
        });
        rows.truncate(limit as usize + 1);

        assemble_page(rows, limit, backward, position.is_some(), |l| {
            Cursor::new(encode_cursor(
                order_by.as_str(),
                order,
                &l.price.to_string(),
                &l.id,
                &l.token_id,
            ))
        })
    }

    fn after(limit: i32, cursor: Option<Cursor>) -> Pagination {
        Pagination {
            limit: Some(limit),
            after: cursor,
            before: None,
        }
    }

    fn before(limit: i32, cursor: Option<Cursor>) -> Pagination {
        Pagination {
            limit: Some(limit),
            after: None,
            before: cursor,
        }
    }

    // Test critique: page 1 -> page 2 -> before(startCursor) redonne la
    // page 1 avec le même premier élément, dans les deux sens de tri
    #[test]
    fn cursor_round_trip_returns_to_first_page() {
        // Deux lignes au même prix: le tuple départage sur id
        let data = vec![
            listing(10, 1),
            listing(10, 2),
            listing(20, 3),
            listing(30, 4),
            listing(40, 5),
        ];

        for order in [OrderDirection::Asc, OrderDirection::Desc] {
            let page1 = scan_by_price(&data, order, &Pagination::first(2));
            assert_eq!(page1.items.len(), 2);
            assert!(page1.page_info.has_next_page);
            assert!(!page1.page_info.has_previous_page);
            let first = page1.items[0].clone();

            let page2 = scan_by_price(&data, order, &after(2, page1.page_info.end_cursor.clone()));
            assert_eq!(page2.items.len(), 2);
            assert!(page2.page_info.has_previous_page);
            assert_ne!(page2.items[0].id, first.id);

            let back = scan_by_price(
                &data,
                order,
                &before(2, page2.page_info.start_cursor.clone()),
            );
            assert_eq!(back.items.len(), 2);
            assert_eq!(back.items[0].id, first.id);
            assert_eq!(back.items[1].id, page1.items[1].id);
            assert!(back.page_info.has_next_page);
            assert!(!back.page_info.has_previous_page);
        }
    }

    // Un scan arrière depuis le milieu garde l'ordre demandé et signale
    // qu'il reste des pages avant
    #[test]
    fn backward_scan_from_middle_preserves_order_and_flags() {
        let data = vec![
            listing(10, 1),
            listing(20, 2),
            listing(30, 3),
            listing(40, 4),
            listing(50, 5),
        ];

        let page1 = scan_by_price(&data, OrderDirection::Asc, &Pagination::first(2));
        let page2 = scan_by_price(
            &data,
            OrderDirection::Asc,
            &after(2, page1.page_info.end_cursor.clone()),
        );
        let page3 = scan_by_price(
            &data,
            OrderDirection::Asc,
            &after(2, page2.page_info.end_cursor.clone()),
        );
        assert_eq!(page3.items.len(), 1);
        assert!(!page3.page_info.has_next_page);

        // Retour d'une page depuis la page 3: prix croissants, pas inversés
        let back = scan_by_price(
            &data,
            OrderDirection::Asc,
            &before(2, page3.page_info.start_cursor.clone()),
        );
        let prices: Vec<u64> = back
            .items
            .iter()
            .map(|l| u64::try_from(l.price).unwrap())
            .collect();
        assert_eq!(prices, vec![30, 40]);
        assert!(back.page_info.has_next_page);
        assert!(back.page_info.has_previous_page);
    }

    #[test]
    fn assemble_page_drops_lookahead_row_and_reverses_backward() {
        let cursor_for = |n: &i32| Cursor::new(n.to_string());

        // Avant: 3 lignes pour limit 2 = une page de plus derrière
        let page = assemble_page(vec![1, 2, 3], 2, false, false, cursor_for);
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.page_info.has_next_page);
        assert!(!page.page_info.has_previous_page);
        assert_eq!(page.page_info.end_cursor, Some(Cursor::new("2")));

        // Arrière: le scan arrive inversé, la page ressort dans l'ordre
        let page = assemble_page(vec![3, 2, 1], 2, true, true, cursor_for);
        assert_eq!(page.items, vec![2, 3]);
        assert!(page.page_info.has_next_page);
        assert!(page.page_info.has_previous_page);
        assert_eq!(page.page_info.start_cursor, Some(Cursor::new("2")));
    }
}
