//! Port trait for the on-chain event source.
//!
//! This trait defines the interface for streaming rental marketplace
//! events from an EVM chain. Implementations live in the infrastructure
//! layer (e.g., `ensrent-chain`).

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use alloy_primitives::{Address, B256, U256};

use crate::error::ChainResult;

/// Decoded payload of a rental marketplace event.
///
/// Closed set: the contract emits exactly these three events, and the
/// applier matches exhaustively so a new variant is a compile error at
/// every dispatch site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// A domain was offered for rent (`DomainListed`).
    Listed {
        token_id: U256,
        lender: Address,
        /// Minimum price in wei per second.
        price: U256,
        /// Latest unix timestamp the domain may be rented until.
        max_rental_time: u64,
        /// ENS namehash of the full name.
        node: B256,
        /// Label without the parent suffix.
        name: String,
    },
    /// A listed domain was rented (`DomainRented`).
    Rented {
        token_id: U256,
        borrower: Address,
        /// Rental end, unix seconds.
        end_time: u64,
        /// Agreed price in wei per second.
        price: U256,
    },
    /// A listed domain was taken back by its owner (`DomainReclaimed`).
    Reclaimed { token_id: U256 },
}

impl EventPayload {
    /// Short kind label, used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Listed { .. } => "listed",
            EventPayload::Rented { .. } => "rented",
            EventPayload::Reclaimed { .. } => "reclaimed",
        }
    }
}

/// One delivered event with its position in the log.
///
/// `(block_number, log_index)` totally orders records within a chain and
/// is the applier's idempotency key.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Block number the event was emitted in.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u64,
    /// Transaction hash that emitted the event.
    pub tx_hash: B256,
    /// Block timestamp, unix seconds.
    pub block_timestamp: u64,
    /// Decoded event payload.
    pub payload: EventPayload,
}

/// Stream of decoded marketplace events in `(block, log_index)` order.
pub type EventStream = Pin<Box<dyn Stream<Item = ChainResult<EventRecord>> + Send>>;

/// Port trait for the marketplace event source.
///
/// Designed for at-least-once delivery: implementations may redeliver
/// records after reconnects, and consumers deduplicate via the cursor.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Get the chain id of the connected node (decimal string).
    async fn chain_id(&self) -> ChainResult<String>;

    /// Get the latest block number visible to the node.
    async fn latest_block(&self) -> ChainResult<u64>;

    /// Subscribe to marketplace events starting at `from_block` (inclusive).
    ///
    /// This is the primary method for event ingestion. The stream yields
    /// records ordered by `(block_number, log_index)` and stays open,
    /// polling for new blocks as they are confirmed.
    async fn subscribe(&self, from_block: u64) -> ChainResult<EventStream>;
}
