//! GraphQL schema definition.
//!
//! This module provides the query surface over the marketplace
//! projection: listings, rentals, and derived listing status.
//!
//! Wire conventions: uint256 values and unix timestamps cross as decimal
//! strings; transaction hashes, namehashes and addresses as 0x-prefixed
//! hex strings. Sort keys and directions are passed as strings
//! (`orderBy: "price"`, `orderDirection: "desc"`) and validated up front.

use std::sync::Arc;

use async_graphql::{
    ComplexObject, Context, EmptyMutation, EmptySubscription, Object, Result, Schema,
};
use chrono::{DateTime, Utc};

use alloy_primitives::{Address, B256, U256};

use ensrent_core::models::{Listing as CoreListing, ListingStatus, Rental as CoreRental};
use ensrent_core::ports::{
    Cursor, ListingFilter, ListingOrderBy, OrderDirection, Pagination, RentalFilter,
    RentalOrderBy, Repositories,
};
use ensrent_core::status::{most_recent_rental, resolve_status, unix_now};

use crate::types::EnsRentSchema;

// -----------------------------------------------------------------------------
// Schema Configuration
// -----------------------------------------------------------------------------

/// Maximum query depth to prevent deeply nested queries (DoS protection).
/// Note: GraphQL introspection requires depth ~13, so we use 15 to allow it.
pub const MAX_QUERY_DEPTH: usize = 15;

/// Maximum query complexity score (DoS protection).
/// Each field has a default complexity of 1, nested objects multiply.
pub const MAX_QUERY_COMPLEXITY: usize = 500;

/// Default page size of the query surface.
pub const DEFAULT_PAGE_SIZE: i32 = 15;
/// Maximum page size.
pub const MAX_PAGE_SIZE: i32 = 100;

// -----------------------------------------------------------------------------
// Schema Builder
// -----------------------------------------------------------------------------

/// Build the GraphQL schema.
///
/// Includes query depth and complexity limits for DoS protection.
pub fn build_schema<R: Repositories + 'static>(repositories: Arc<R>) -> EnsRentSchema {
    let repos: Arc<dyn Repositories> = repositories;
    Schema::build(CoreQuery, EmptyMutation, EmptySubscription)
        .data(repos)
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .finish()
}

// -----------------------------------------------------------------------------
// Core Query
// -----------------------------------------------------------------------------

/// Query root for the marketplace projection.
#[derive(Default)]
pub struct CoreQuery;

#[Object]
impl CoreQuery {
    /// Get applier status and progress.
    async fn status<'ctx>(&self, ctx: &Context<'ctx>) -> Result<ApplierStatus> {
        let repos = ctx.data::<Arc<dyn Repositories>>()?;

        let cursor = repos.cursor().get_any_cursor().await?;

        Ok(ApplierStatus {
            chain_id: cursor.as_ref().map(|c| c.chain_id.clone()),
            last_applied_block: cursor.as_ref().map(|c| c.last_block as i64),
            last_applied_log_index: cursor.as_ref().map(|c| c.last_log_index as i64),
            last_updated: cursor.map(|c| c.updated_at),
        })
    }

    /// Get the current listing for a token.
    ///
    /// Returns null when the token has no listing; that is an answer,
    /// not an error.
    async fn listing<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        token_id: String,
    ) -> Result<Option<Listing>> {
        let repos = ctx.data::<Arc<dyn Repositories>>()?;

        let token_id = parse_u256(&token_id, "tokenId")?;
        let listing = repos.listings().get_by_token(&token_id).await?;
        Ok(listing.map(Listing::from))
    }

    /// List listings with pagination and filtering.
    #[allow(clippy::too_many_arguments)]
    async fn listings<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        #[graphql(default = 15)] limit: i32,
        after: Option<String>,
        before: Option<String>,
        name_contains: Option<String>,
        lender: Option<String>,
        lender_not: Option<String>,
        max_rental_time_gt: Option<String>,
        #[graphql(default = false)] available_only: bool,
        order_by: Option<String>,
        order_direction: Option<String>,
    ) -> Result<ListingPage> {
        validate_filter_string(&name_contains, "nameContains")?;

        let repos = ctx.data::<Arc<dyn Repositories>>()?;

        let filter = ListingFilter {
            name_contains,
            lender: lender.map(|s| parse_address(&s)).transpose()?,
            lender_not: lender_not.map(|s| parse_address(&s)).transpose()?,
            max_rental_time_gt: max_rental_time_gt
                .map(|s| parse_u64(&s, "maxRentalTimeGt"))
                .transpose()?,
            ..Default::default()
        };

        let order_by = parse_listing_order_by(order_by.as_deref())?;
        let order = parse_order_direction(order_direction.as_deref())?;

        let pagination = Pagination {
            limit: Some(clamp_pagination_limit(limit)),
            after: after.map(Cursor::new),
            before: before.map(Cursor::new),
        };

        let connection = repos
            .listings()
            .list(filter, pagination, order_by, order)
            .await?;

        let mut page = ListingPage::from(connection);

        // "Available to rent" is a business filter on top of the stored
        // rows: drop listings whose most recent rental is still running.
        // Applied after the fetch, so a filtered page may come back
        // shorter than the requested limit.
        if available_only {
            let now = unix_now();
            let mut available = Vec::with_capacity(page.items.len());
            for listing in page.items {
                let rentals = repos
                    .rentals()
                    .list_for_token(&listing.inner.token_id)
                    .await?;
                let rented = most_recent_rental(&rentals)
                    .map(|r| r.is_active(now))
                    .unwrap_or(false);
                if !rented {
                    available.push(listing);
                }
            }
            page.items = available;
        }

        Ok(page)
    }

    /// List rentals with pagination and filtering.
    #[allow(clippy::too_many_arguments)]
    async fn rentals<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        #[graphql(default = 15)] limit: i32,
        after: Option<String>,
        before: Option<String>,
        borrower: Option<String>,
        token_id: Option<String>,
        listing_id: Option<String>,
        end_time_gte: Option<String>,
        order_by: Option<String>,
        order_direction: Option<String>,
    ) -> Result<RentalPage> {
        let repos = ctx.data::<Arc<dyn Repositories>>()?;

        let filter = RentalFilter {
            borrower: borrower.map(|s| parse_address(&s)).transpose()?,
            token_id: token_id.map(|s| parse_u256(&s, "tokenId")).transpose()?,
            listing_id: listing_id.map(|s| parse_hash(&s)).transpose()?,
            end_time_gte: end_time_gte
                .map(|s| parse_u64(&s, "endTimeGte"))
                .transpose()?,
        };

        let order_by = parse_rental_order_by(order_by.as_deref())?;
        let order = parse_order_direction(order_direction.as_deref())?;

        let pagination = Pagination {
            limit: Some(clamp_pagination_limit(limit)),
            after: after.map(Cursor::new),
            before: before.map(Cursor::new),
        };

        let connection = repos
            .rentals()
            .list(filter, pagination, order_by, order)
            .await?;

        Ok(RentalPage::from(connection))
    }
}

// -----------------------------------------------------------------------------
// GraphQL Types
// -----------------------------------------------------------------------------

/// Applier progress.
#[derive(async_graphql::SimpleObject)]
pub struct ApplierStatus {
    pub chain_id: Option<String>,
    pub last_applied_block: Option<i64>,
    pub last_applied_log_index: Option<i64>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// A domain offered for rent.
#[derive(async_graphql::SimpleObject)]
#[graphql(complex)]
pub struct Listing {
    /// Listing transaction hash.
    pub id: String,
    /// Token id, decimal string.
    pub token_id: String,
    /// Label without the parent suffix.
    pub name: String,
    /// Lender address.
    pub lender: String,
    /// Price in wei per second, decimal string.
    pub price: String,
    /// ENS namehash.
    pub node: String,
    /// Latest rentable unix timestamp, decimal string.
    pub max_rental_time: String,
    /// Listing event timestamp, decimal string.
    pub created_at: String,

    #[graphql(skip)]
    inner: CoreListing,
}

#[ComplexObject]
impl Listing {
    /// Rental history of this token, most recent end first.
    async fn rentals<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        end_time_gte: Option<String>,
    ) -> Result<Vec<Rental>> {
        let repos = ctx.data::<Arc<dyn Repositories>>()?;

        let end_time_gte = end_time_gte
            .map(|s| parse_u64(&s, "endTimeGte"))
            .transpose()?;

        let mut rentals = repos.rentals().list_for_token(&self.inner.token_id).await?;
        if let Some(floor) = end_time_gte {
            rentals.retain(|r| r.end_time >= floor);
        }

        Ok(rentals.into_iter().map(Rental::from).collect())
    }

    /// Derived status of this listing, relative to the viewer, now.
    async fn status<'ctx>(&self, ctx: &Context<'ctx>, viewer: Option<String>) -> Result<Status> {
        let repos = ctx.data::<Arc<dyn Repositories>>()?;

        let viewer = viewer.map(|s| parse_address(&s)).transpose()?;
        let rentals = repos.rentals().list_for_token(&self.inner.token_id).await?;

        Ok(resolve_status(Some(&self.inner), &rentals, viewer, unix_now()).into())
    }
}

/// An executed rental agreement.
#[derive(async_graphql::SimpleObject)]
#[graphql(complex)]
pub struct Rental {
    /// Rental transaction hash.
    pub id: String,
    /// Token id, decimal string.
    pub token_id: String,
    /// Borrower address.
    pub borrower: String,
    /// Rental start, unix seconds as decimal string.
    pub start_time: String,
    /// Rental end, unix seconds as decimal string.
    pub end_time: String,
    /// Price in wei per second, decimal string.
    pub price: String,
    /// Listing this rental was made against.
    pub listing_id: String,
    /// Rental event timestamp, decimal string.
    pub created_at: String,

    #[graphql(skip)]
    inner: CoreRental,
}

#[ComplexObject]
impl Rental {
    /// The listing this rental was made against.
    ///
    /// Null once the domain has been reclaimed; rental history outlives
    /// its listing.
    async fn listing<'ctx>(&self, ctx: &Context<'ctx>) -> Result<Option<Listing>> {
        let repos = ctx.data::<Arc<dyn Repositories>>()?;

        let listing = repos.listings().get_by_id(&self.inner.listing_id).await?;
        Ok(listing.map(Listing::from))
    }
}

/// Derived listing status.
#[derive(async_graphql::Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(rename_items = "camelCase")]
pub enum Status {
    Available,
    Listed,
    RentedOut,
    RentedIn,
    Expired,
}

impl From<ListingStatus> for Status {
    fn from(status: ListingStatus) -> Self {
        match status {
            ListingStatus::Available => Status::Available,
            ListingStatus::Listed => Status::Listed,
            ListingStatus::RentedOut => Status::RentedOut,
            ListingStatus::RentedIn => Status::RentedIn,
            ListingStatus::Expired => Status::Expired,
        }
    }
}

impl From<CoreListing> for Listing {
    fn from(l: CoreListing) -> Self {
        Self {
            id: to_hex(l.id.as_slice()),
            token_id: l.token_id.to_string(),
            name: l.name.clone(),
            lender: to_hex(l.lender.as_slice()),
            price: l.price.to_string(),
            node: to_hex(l.node.as_slice()),
            max_rental_time: l.max_rental_time.to_string(),
            created_at: l.created_at.to_string(),
            inner: l,
        }
    }
}

impl From<CoreRental> for Rental {
    fn from(r: CoreRental) -> Self {
        Self {
            id: to_hex(r.id.as_slice()),
            token_id: r.token_id.to_string(),
            borrower: to_hex(r.borrower.as_slice()),
            start_time: r.start_time.to_string(),
            end_time: r.end_time.to_string(),
            price: r.price.to_string(),
            listing_id: to_hex(r.listing_id.as_slice()),
            created_at: r.created_at.to_string(),
            inner: r,
        }
    }
}

// -----------------------------------------------------------------------------
// Page Types (items + pageInfo)
// -----------------------------------------------------------------------------

#[derive(async_graphql::SimpleObject)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// Generate page types (items + pageInfo) with From impl.
macro_rules! define_page {
    ($node:ty, $core_model:ty, $page:ident) => {
        #[derive(async_graphql::SimpleObject)]
        pub struct $page {
            pub items: Vec<$node>,
            pub page_info: PageInfo,
            pub total_count: Option<i64>,
        }

        impl From<ensrent_core::ports::Connection<$core_model>> for $page {
            fn from(conn: ensrent_core::ports::Connection<$core_model>) -> Self {
                Self {
                    items: conn.items.into_iter().map(<$node>::from).collect(),
                    page_info: PageInfo {
                        has_next_page: conn.page_info.has_next_page,
                        has_previous_page: conn.page_info.has_previous_page,
                        start_cursor: conn.page_info.start_cursor.map(|c| c.value),
                        end_cursor: conn.page_info.end_cursor.map(|c| c.value),
                    },
                    total_count: conn.total_count,
                }
            }
        }
    };
}

define_page!(Listing, CoreListing, ListingPage);
define_page!(Rental, CoreRental, RentalPage);

// -----------------------------------------------------------------------------
// Helpers & Validation
// -----------------------------------------------------------------------------

/// Convert bytes to 0x-prefixed hex string.
fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Maximum length for hash strings (64 hex chars + "0x" prefix).
const MAX_HASH_LENGTH: usize = 66;
/// Maximum length for decimal uint256 strings.
const MAX_U256_LENGTH: usize = 78;
/// Maximum length for string filter parameters.
const MAX_FILTER_STRING_LENGTH: usize = 128;

/// Parse and validate a 32-byte hash string.
fn parse_hash(s: &str) -> Result<B256> {
    if s.len() > MAX_HASH_LENGTH {
        return Err(async_graphql::Error::new(format!(
            "Hash too long: maximum {} characters allowed",
            MAX_HASH_LENGTH
        )));
    }

    let s = s.strip_prefix("0x").unwrap_or(s);

    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(async_graphql::Error::new(
            "Invalid hash: must contain only hexadecimal characters",
        ));
    }

    let bytes =
        hex::decode(s).map_err(|e| async_graphql::Error::new(format!("Invalid hash: {}", e)))?;

    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
        async_graphql::Error::new("Hash must be exactly 32 bytes (64 hex characters)")
    })?;
    Ok(B256::from(arr))
}

/// Parse and validate an Ethereum address.
fn parse_address(s: &str) -> Result<Address> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);

    if stripped.len() != 40 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(async_graphql::Error::new(
            "Invalid address: expected 20 bytes (40 hex characters)",
        ));
    }

    let bytes = hex::decode(stripped)
        .map_err(|e| async_graphql::Error::new(format!("Invalid address: {}", e)))?;
    let arr: [u8; 20] = bytes
        .try_into()
        .map_err(|_| async_graphql::Error::new("Invalid address length"))?;
    Ok(Address::from(arr))
}

/// Parse a decimal uint256 string.
fn parse_u256(s: &str, field_name: &str) -> Result<U256> {
    if s.is_empty() || s.len() > MAX_U256_LENGTH || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(async_graphql::Error::new(format!(
            "{} must be a decimal number",
            field_name
        )));
    }
    s.parse::<U256>()
        .map_err(|e| async_graphql::Error::new(format!("Invalid {}: {}", field_name, e)))
}

/// Parse a decimal unix timestamp string.
fn parse_u64(s: &str, field_name: &str) -> Result<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(async_graphql::Error::new(format!(
            "{} must be a decimal number",
            field_name
        )));
    }
    s.parse::<u64>()
        .map_err(|e| async_graphql::Error::new(format!("Invalid {}: {}", field_name, e)))
}

/// Validate a filter string parameter.
fn validate_filter_string(s: &Option<String>, field_name: &str) -> Result<()> {
    if let Some(value) = s {
        if value.len() > MAX_FILTER_STRING_LENGTH {
            return Err(async_graphql::Error::new(format!(
                "{} too long: maximum {} characters allowed",
                field_name, MAX_FILTER_STRING_LENGTH
            )));
        }
        if value.is_empty() {
            return Err(async_graphql::Error::new(format!(
                "{} cannot be empty",
                field_name
            )));
        }
    }
    Ok(())
}

/// Clamp the pagination limit into the supported window.
fn clamp_pagination_limit(limit: i32) -> i32 {
    limit.clamp(1, MAX_PAGE_SIZE)
}

/// Parse the listing sort key.
fn parse_listing_order_by(s: Option<&str>) -> Result<ListingOrderBy> {
    match s {
        None => Ok(ListingOrderBy::default()),
        Some("price") => Ok(ListingOrderBy::Price),
        Some("maxRentalTime") => Ok(ListingOrderBy::MaxRentalTime),
        Some("createdAt") => Ok(ListingOrderBy::CreatedAt),
        Some(other) => Err(async_graphql::Error::new(format!(
            "Invalid orderBy '{}': expected price, maxRentalTime or createdAt",
            other
        ))),
    }
}

/// Parse the rental sort key.
fn parse_rental_order_by(s: Option<&str>) -> Result<RentalOrderBy> {
    match s {
        None => Ok(RentalOrderBy::default()),
        Some("price") => Ok(RentalOrderBy::Price),
        Some("startTime") => Ok(RentalOrderBy::StartTime),
        Some("endTime") => Ok(RentalOrderBy::EndTime),
        Some(other) => Err(async_graphql::Error::new(format!(
            "Invalid orderBy '{}': expected price, startTime or endTime",
            other
        ))),
    }
}

/// Parse the sort direction.
fn parse_order_direction(s: Option<&str>) -> Result<OrderDirection> {
    match s {
        None => Ok(OrderDirection::Asc),
        Some("asc") => Ok(OrderDirection::Asc),
        Some("desc") => Ok(OrderDirection::Desc),
        Some(other) => Err(async_graphql::Error::new(format!(
            "Invalid orderDirection '{}': expected asc or desc",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests de validation critiques - protègent contre les injections/DoS

    #[test]
    fn test_parse_hash_rejects_invalid_input() {
        // Trop long (DoS prevention)
        assert!(parse_hash(&"ab".repeat(100)).is_err());
        // Caractères non-hex (injection prevention)
        assert!(parse_hash("0x<script>alert(1)</script>").is_err());
        // Mauvaise longueur
        assert!(parse_hash(&"ab".repeat(16)).is_err());
    }

    #[test]
    fn test_parse_hash_accepts_both_formats() {
        let with_prefix = parse_hash(&("0x".to_string() + &"ab".repeat(32)));
        let without_prefix = parse_hash(&"ab".repeat(32));
        assert!(with_prefix.is_ok());
        assert!(without_prefix.is_ok());
        assert_eq!(with_prefix.unwrap(), without_prefix.unwrap());
    }

    #[test]
    fn test_parse_address_requires_20_bytes() {
        assert!(parse_address(&("0x".to_string() + &"ab".repeat(20))).is_ok());
        assert!(parse_address(&"ab".repeat(20)).is_ok());
        assert!(parse_address(&"ab".repeat(32)).is_err());
        assert!(parse_address("0xnothex").is_err());
    }

    #[test]
    fn test_parse_u256_decimal_only() {
        assert!(parse_u256("123456789", "tokenId").is_ok());
        // Les tokenIds dépassent u128, le type doit suivre
        assert!(parse_u256(
            "57896044618658097711785492504343953926634992332820282019728792003956564819968",
            "tokenId"
        )
        .is_ok());
        assert!(parse_u256("0xab", "tokenId").is_err());
        assert!(parse_u256("", "tokenId").is_err());
        assert!(parse_u256(&"9".repeat(100), "tokenId").is_err());
    }

    #[test]
    fn test_validate_filter_string_boundaries() {
        // Vide = erreur (évite les requêtes inutiles)
        assert!(validate_filter_string(&Some("".into()), "x").is_err());
        // Trop long = erreur (DoS prevention)
        assert!(validate_filter_string(&Some("x".repeat(200)), "x").is_err());
        // None = OK (optionnel)
        assert!(validate_filter_string(&None, "x").is_ok());
    }

    #[test]
    fn test_pagination_clamping() {
        // Valeurs négatives/zéro clampées à 1
        assert_eq!(clamp_pagination_limit(-100), 1);
        assert_eq!(clamp_pagination_limit(0), 1);
        // Valeurs trop grandes clampées à MAX
        assert_eq!(clamp_pagination_limit(10000), MAX_PAGE_SIZE);
        assert_eq!(clamp_pagination_limit(DEFAULT_PAGE_SIZE), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_order_keys_are_closed_sets() {
        assert!(parse_listing_order_by(Some("price")).is_ok());
        assert!(parse_listing_order_by(Some("name")).is_err());
        assert!(parse_rental_order_by(Some("startTime")).is_ok());
        assert!(parse_rental_order_by(Some("borrower")).is_err());
        assert!(parse_order_direction(Some("desc")).is_ok());
        assert!(parse_order_direction(Some("descending")).is_err());
    }

    // Test de conversion critique - vérifie le format de sortie GraphQL

    #[test]
    fn test_listing_wire_format() {
        let core = CoreListing {
            id: B256::repeat_byte(0x12),
            token_id: U256::from(42u64),
            name: "vitalik".into(),
            lender: Address::repeat_byte(0xaa),
            price: U256::from(1_000u64),
            node: B256::repeat_byte(0x34),
            max_rental_time: 1_800_000_000,
            created_at: 1_700_000_000,
        };

        let gql = Listing::from(core);
        // Hex 0x-préfixé pour les hashes/adresses
        assert!(gql.id.starts_with("0x") && gql.id.len() == 66);
        assert!(gql.lender.starts_with("0x") && gql.lender.len() == 42);
        // Décimal pour les uint256 et timestamps
        assert_eq!(gql.token_id, "42");
        assert_eq!(gql.price, "1000");
        assert_eq!(gql.created_at, "1700000000");
    }
}
