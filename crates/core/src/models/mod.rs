//! Domain models representing the materialized rental marketplace state.
//!
//! These models are storage-agnostic and represent the canonical
//! form of indexed data within the domain layer.
//!
//! Identifiers follow the on-chain representation: transaction hashes and
//! namehashes are [`B256`], accounts are [`Address`], and token ids and
//! prices are [`U256`] (token ids are labelhash-derived and routinely
//! exceed 128 bits).

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Listings
// =============================================================================

/// A domain offered for rent.
///
/// One row per `DomainListed` event, keyed by `(id, token_id)` where `id`
/// is the listing transaction hash. A token can accumulate several listing
/// rows over its lifetime; "the" listing for a token is the one with the
/// greatest `created_at`. Listings are hard-deleted when the domain is
/// reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Transaction hash of the listing transaction.
    pub id: B256,
    /// ERC-721 token id of the domain (labelhash as uint256).
    pub token_id: U256,
    /// Human-readable label, without the parent suffix (e.g. "vitalik").
    pub name: String,
    /// Domain owner offering the rental.
    pub lender: Address,
    /// Minimum price in wei per second.
    pub price: U256,
    /// ENS namehash of the full domain name.
    pub node: B256,
    /// Latest unix timestamp (seconds) until which the domain may be rented.
    pub max_rental_time: u64,
    /// Block timestamp (seconds) of the listing event.
    pub created_at: u64,
}

// =============================================================================
// Rentals
// =============================================================================

/// An executed rental agreement.
///
/// One row per `DomainRented` event, keyed by `(id, token_id)` where `id`
/// is the rental transaction hash. Rentals are append-only history: they
/// are never updated or deleted, and survive reclamation of their listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    /// Transaction hash of the rental transaction.
    pub id: B256,
    /// ERC-721 token id of the rented domain.
    pub token_id: U256,
    /// Account renting the domain.
    pub borrower: Address,
    /// Rental start, unix seconds (the block timestamp of the event).
    pub start_time: u64,
    /// Rental end, unix seconds.
    pub end_time: u64,
    /// Agreed price in wei per second.
    pub price: U256,
    /// `Listing::id` this rental was made against. Dangling after the
    /// listing is reclaimed; rentals keep their history regardless.
    pub listing_id: B256,
    /// Block timestamp (seconds) of the rental event.
    pub created_at: u64,
}

impl Rental {
    /// Whether the rental is still running at `now` (unix seconds).
    pub fn is_active(&self, now: u64) -> bool {
        self.end_time > now
    }
}

// =============================================================================
// Listing Status
// =============================================================================

/// Derived availability of a domain, relative to a viewer and a point in
/// time. Computed on demand by [`crate::status::resolve_status`], never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListingStatus {
    /// No listing on record for the token.
    Available,
    /// Listed and not actively rented (or rented, seen by a third party).
    Listed,
    /// Actively rented, seen by the lender.
    RentedOut,
    /// Actively rented, seen by the borrower.
    RentedIn,
    /// Most recent rental has ended.
    Expired,
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ListingStatus::Available => "available",
            ListingStatus::Listed => "listed",
            ListingStatus::RentedOut => "rentedOut",
            ListingStatus::RentedIn => "rentedIn",
            ListingStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Applier State
// =============================================================================

/// Applier cursor tracking progress through the event log.
///
/// The cursor tracks the last successfully applied `(block, log_index)`
/// position for each chain, enabling the applier to resume after a restart
/// and to recognize at-least-once redeliveries as duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplierCursor {
    /// Chain identifier (decimal chain id as string).
    pub chain_id: String,
    /// Block number of the last applied event.
    pub last_block: u64,
    /// Log index of the last applied event within that block.
    pub last_log_index: u64,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ApplierCursor {
    /// Whether an event at `(block, log_index)` has already been applied.
    pub fn covers(&self, block: u64, log_index: u64) -> bool {
        (block, log_index) <= (self.last_block, self.last_log_index)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(block: u64, log_index: u64) -> ApplierCursor {
        ApplierCursor {
            chain_id: "1".into(),
            last_block: block,
            last_log_index: log_index,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn cursor_covers_same_and_earlier_positions() {
        let c = cursor(100, 5);
        assert!(c.covers(100, 5));
        assert!(c.covers(100, 4));
        assert!(c.covers(99, 50));
    }

    #[test]
    fn cursor_does_not_cover_later_positions() {
        let c = cursor(100, 5);
        assert!(!c.covers(100, 6));
        assert!(!c.covers(101, 0));
    }

    #[test]
    fn rental_active_boundary() {
        let rental = Rental {
            id: B256::repeat_byte(1),
            token_id: U256::from(42u64),
            borrower: Address::repeat_byte(2),
            start_time: 1_000,
            end_time: 2_000,
            price: U256::from(7u64),
            listing_id: B256::repeat_byte(3),
            created_at: 1_000,
        };
        assert!(rental.is_active(1_999));
        // end_time == now is expired, not active
        assert!(!rental.is_active(2_000));
        assert!(!rental.is_active(2_001));
    }

    #[test]
    fn listing_status_display_matches_wire_names() {
        assert_eq!(ListingStatus::RentedOut.to_string(), "rentedOut");
        assert_eq!(ListingStatus::Available.to_string(), "available");
    }
}
