//! Pagination types for list queries.
//!
//! These types implement stateless keyset cursor pagination. Cursors are
//! opaque tokens minted by the storage layer; callers hold them between
//! requests, so the service keeps no per-client state.

/// Opaque cursor for pagination.
///
/// The cursor value encodes the sort order it was minted under together
/// with the row position, and is validated by the storage layer on reuse.
/// Clients must treat it as an opaque token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub value: String,
}

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Pagination parameters for list queries.
///
/// Supports forward pagination (`after`) and backward pagination
/// (`before`); `limit` bounds the page size in both directions. Passing
/// both `after` and `before` is rejected by the repositories.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    /// Maximum number of items to return.
    pub limit: Option<i32>,
    /// Cursor to start after (forward pagination).
    pub after: Option<Cursor>,
    /// Cursor to end before (backward pagination).
    pub before: Option<Cursor>,
}

impl Pagination {
    /// Forward page of `limit` items starting from the beginning.
    pub fn first(limit: i32) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }
}

/// Paginated result set.
///
/// Items plus page info, matching the wire shape of the query surface
/// (`items` + `pageInfo`). Per-item cursors are carried alongside so the
/// page boundaries can be handed back to the client.
#[derive(Debug, Clone)]
pub struct Connection<T> {
    /// Items in this page, in requested order.
    pub items: Vec<T>,
    /// Information about the current page.
    pub page_info: PageInfo,
    /// Total count of items matching the filter (optional, expensive).
    pub total_count: Option<i64>,
}

impl<T> Connection<T> {
    /// An empty page with no neighbors.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            page_info: PageInfo {
                has_next_page: false,
                has_previous_page: false,
                start_cursor: None,
                end_cursor: None,
            },
            total_count: None,
        }
    }
}

/// Information about the current page in a paginated result.
#[derive(Debug, Clone)]
pub struct PageInfo {
    /// Whether there are more items after this page.
    pub has_next_page: bool,
    /// Whether there are items before this page.
    pub has_previous_page: bool,
    /// Cursor of the first item in this page.
    pub start_cursor: Option<Cursor>,
    /// Cursor of the last item in this page.
    pub end_cursor: Option<Cursor>,
}

/// Ordering direction for sorted queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order (smallest first).
    #[default]
    Asc,
    /// Descending order (largest first).
    Desc,
}

impl OrderDirection {
    /// SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    /// The opposite direction (used for backward pagination scans).
    pub fn reversed(&self) -> Self {
        match self {
            OrderDirection::Asc => OrderDirection::Desc,
            OrderDirection::Desc => OrderDirection::Asc,
        }
    }
}
