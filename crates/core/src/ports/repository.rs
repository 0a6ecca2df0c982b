//! Port traits for data repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g., `ensrent-storage`).

use async_trait::async_trait;

use alloy_primitives::{Address, B256, U256};

use crate::error::StorageResult;
use crate::models::{ApplierCursor, Listing, Rental};

use super::pagination::{Connection, OrderDirection, Pagination};

// =============================================================================
// Filter Types
// =============================================================================

/// Filter options for listing queries.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    /// Case-insensitive substring match on the domain label.
    pub name_contains: Option<String>,
    /// Listings owned by this lender.
    pub lender: Option<Address>,
    /// Listings NOT owned by this lender (browse view excludes own).
    pub lender_not: Option<Address>,
    /// Listings rentable past this unix timestamp.
    pub max_rental_time_gt: Option<u64>,
    /// Listings for one token.
    pub token_id: Option<U256>,
}

/// Filter options for rental queries.
#[derive(Debug, Clone, Default)]
pub struct RentalFilter {
    /// Rentals made by this borrower.
    pub borrower: Option<Address>,
    /// Rentals of one token.
    pub token_id: Option<U256>,
    /// Rentals made against one listing.
    pub listing_id: Option<B256>,
    /// Rentals that end at or after this unix timestamp.
    pub end_time_gte: Option<u64>,
}

// =============================================================================
// Sort Keys
// =============================================================================

/// Sortable columns for listing queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListingOrderBy {
    /// Price in wei per second.
    Price,
    /// Latest rentable timestamp.
    MaxRentalTime,
    /// Listing event timestamp.
    #[default]
    CreatedAt,
}

impl ListingOrderBy {
    /// Stable name used in cursor tokens and SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingOrderBy::Price => "price",
            ListingOrderBy::MaxRentalTime => "max_rental_time",
            ListingOrderBy::CreatedAt => "created_at",
        }
    }
}

/// Sortable columns for rental queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RentalOrderBy {
    /// Price in wei per second.
    Price,
    /// Rental start timestamp.
    #[default]
    StartTime,
    /// Rental end timestamp.
    EndTime,
}

impl RentalOrderBy {
    /// Stable name used in cursor tokens and SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalOrderBy::Price => "price",
            RentalOrderBy::StartTime => "start_time",
            RentalOrderBy::EndTime => "end_time",
        }
    }
}

// =============================================================================
// Repository Traits
// =============================================================================

/// Repository for listing data.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Get the current listing for a token.
    ///
    /// A token can carry several listing rows; the current one is the row
    /// with the greatest `created_at`. Returns `None` when the token has
    /// no listing (not an error).
    async fn get_by_token(&self, token_id: &U256) -> StorageResult<Option<Listing>>;

    /// Get a listing by its transaction-hash id.
    async fn get_by_id(&self, id: &B256) -> StorageResult<Option<Listing>>;

    /// List listings with pagination and filtering.
    async fn list(
        &self,
        filter: ListingFilter,
        pagination: Pagination,
        order_by: ListingOrderBy,
        order: OrderDirection,
    ) -> StorageResult<Connection<Listing>>;
}

/// Repository for rental history.
#[async_trait]
pub trait RentalRepository: Send + Sync {
    /// List all rentals of a token, most recent end first.
    async fn list_for_token(&self, token_id: &U256) -> StorageResult<Vec<Rental>>;

    /// List rentals with pagination and filtering.
    async fn list(
        &self,
        filter: RentalFilter,
        pagination: Pagination,
        order_by: RentalOrderBy,
        order: OrderDirection,
    ) -> StorageResult<Connection<Rental>>;
}

/// Repository for applier cursor state.
#[async_trait]
pub trait CursorRepository: Send + Sync {
    /// Get current cursor for a chain.
    async fn get_cursor(&self, chain_id: &str) -> StorageResult<Option<ApplierCursor>>;

    /// Get any existing cursor (for chain mismatch detection).
    async fn get_any_cursor(&self) -> StorageResult<Option<ApplierCursor>>;
}

// =============================================================================
// Composite Repository
// =============================================================================

/// Result of an atomic apply operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event mutated the projection.
    Applied,
    /// The row already existed (redelivered event); only the cursor moved.
    Duplicate,
}

/// Combined repository access for the applier.
///
/// This trait provides access to the individual repositories and the
/// atomic per-event operations that mutate the projection and advance the
/// cursor in a single transaction. If any part fails, everything is
/// rolled back and the event can be retried safely.
#[async_trait]
pub trait Repositories: Send + Sync {
    /// Access the listing repository.
    fn listings(&self) -> &dyn ListingRepository;

    /// Access the rental repository.
    fn rentals(&self) -> &dyn RentalRepository;

    /// Access the cursor repository.
    fn cursor(&self) -> &dyn CursorRepository;

    /// Apply a `DomainListed` event: insert the listing row (idempotent on
    /// its composite key) and advance the cursor. When `supersede` is set,
    /// prior listing rows for the same token are deleted in the same
    /// transaction.
    async fn apply_listed_atomic(
        &self,
        listing: &Listing,
        supersede: bool,
        cursor: &ApplierCursor,
    ) -> StorageResult<ApplyOutcome>;

    /// Apply a `DomainRented` event: insert the rental row (idempotent on
    /// its composite key) and advance the cursor.
    ///
    /// The listing precondition is checked by the applier beforehand; this
    /// method only persists.
    async fn apply_rented_atomic(
        &self,
        rental: &Rental,
        cursor: &ApplierCursor,
    ) -> StorageResult<ApplyOutcome>;

    /// Apply a `DomainReclaimed` event: delete all listing rows for the
    /// token and advance the cursor. Returns the number of rows removed;
    /// zero is a successful no-op. Rentals are never cascaded.
    async fn apply_reclaimed_atomic(
        &self,
        token_id: &U256,
        cursor: &ApplierCursor,
    ) -> StorageResult<u64>;
}
