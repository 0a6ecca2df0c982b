//! Ethereum RPC adapter for the ENS rental marketplace indexer.
//!
//! This crate implements the [`EventSource`] port from `ensrent-core`,
//! streaming marketplace contract logs from an EVM node over HTTP RPC.
//!
//! # Features
//!
//! - `eth_getLogs` polling with a confirmation depth, so reorgs shallower
//!   than the depth never reach the applier
//! - Batched historical catch-up, then head-following at a poll interval
//! - ABI decoding of `DomainListed`, `DomainRented` and `DomainReclaimed`
//!
//! # Usage
//!
//! ```ignore
//! use ensrent_chain::{EnsRentClient, EnsRentClientConfig};
//!
//! let config = EnsRentClientConfig {
//!     http_url: "http://localhost:8545".to_string(),
//!     contract_address,
//!     ..Default::default()
//! };
//!
//! let client = EnsRentClient::connect(config).await?;
//! let mut stream = client.subscribe(start_block).await?;
//!
//! while let Some(record) = stream.next().await {
//!     // Apply record...
//! }
//! ```
//!
//! [`EventSource`]: ensrent_core::ports::EventSource

mod client;

pub use client::{EnsRentClient, EnsRentClientConfig};
