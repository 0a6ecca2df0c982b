//! Core domain layer for the ENS rental marketplace indexer.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! business logic for indexing the ENSRent contract's event log into a
//! queryable projection. It follows hexagonal architecture principles -
//! this is the innermost layer with no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ensrentd (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │        ensrent-graphql        │        ensrent-chain        │
//! │           (API)               │         (EVM RPC)           │
//! ├───────────────────────────────┴─────────────────────────────┤
//! │                      ensrent-storage                        │
//! │                       (PostgreSQL)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    ensrent-core  ← YOU ARE HERE             │
//! │               (models, ports, services)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (Listing, Rental, ApplierCursor)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Core business logic (EventApplier)
//! - [`status`] - Pure listing status derivation
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! Ports define interfaces that external adapters must implement:
//!
//! - [`ports::EventSource`] - Stream decoded contract events from an
//!   EVM chain
//! - [`ports::Repositories`] - Persist and query the projection
//!
//! ## Applier Lifecycle
//!
//! 1. Subscribe to contract events from the configured start block
//! 2. Skip anything at or below the stored cursor (redelivery)
//! 3. Apply each event to the projection in its own transaction,
//!    advancing the cursor in the same transaction
//! 4. Retry transient storage failures; halt on consistency violations

pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
pub mod status;
