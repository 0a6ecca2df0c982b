//! Error types for the indexer domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Business logic errors
//! - [`StorageError`] - Database/repository errors
//! - [`ChainError`] - Blockchain RPC errors
//! - [`IndexerError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! The split between [`DomainError`] and [`StorageError`] matters to the
//! event applier: storage errors are transient and retried, while domain
//! errors (notably [`DomainError::ListingNotFound`]) signal a broken event
//! stream invariant and halt processing.

use thiserror::Error;

// =============================================================================
// Domain Errors
// =============================================================================

/// Business logic and domain rule violations.
///
/// These errors represent problems in the marketplace projection itself,
/// such as events arriving that contradict the materialized state.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A rental event referenced a token with no listing on record.
    ///
    /// The contract only emits `DomainRented` for listed tokens, so this
    /// means the event stream and the projection have diverged. Fatal:
    /// retrying cannot fix it.
    #[error("No listing found for token {0}: rental event references unknown listing")]
    ListingNotFound(String),

    /// Transaction hash or namehash failed validation.
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// Ethereum address failed validation.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Event payload decoding/deserialization failed.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Generic validation error.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DomainError {
    /// Whether retrying the same operation can possibly succeed.
    ///
    /// Consistency violations are permanent; wrapped storage errors are
    /// transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Storage(_))
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization. All variants are treated as
/// transient by the applier's retry loop.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Database constraint was violated (unique, foreign key, etc.).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A pagination cursor token could not be decoded or does not match
    /// the requested sort order.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Blockchain RPC and connectivity errors.
///
/// These errors occur when communicating with the Ethereum node
/// via HTTP RPC.
#[derive(Debug, Error)]
pub enum ChainError {
    /// HTTP connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RPC request failed.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Log subscription failed or disconnected.
    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    /// A contract log could not be decoded into a known event.
    #[error("Log decode error at block {block}: {message}")]
    LogDecodeError {
        /// Block number of the offending log.
        block: u64,
        /// Error details.
        message: String,
    },

    /// Operation timed out waiting for the node.
    #[error("Timeout waiting for block {0}")]
    Timeout(u64),
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level indexer orchestration errors.
///
/// This is the main error type returned by [`crate::services::EventApplier`].
/// It wraps all lower-level errors and adds orchestration-specific variants.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Domain logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Blockchain connectivity error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connected chain doesn't match stored data.
    ///
    /// This is a fatal error that requires manual intervention.
    #[error("Chain mismatch: connected to {connected} but database contains data for {expected}")]
    ChainMismatch {
        /// Chain ID of the connected node.
        connected: String,
        /// Chain ID expected by the database.
        expected: String,
    },

    /// The event stream violated an invariant the projection relies on.
    ///
    /// Fatal: the applier stops instead of writing inconsistent rows.
    #[error("Consistency error at block {block} log {log_index}: {source}")]
    Consistency {
        /// Block number of the offending event.
        block: u64,
        /// Log index within the block.
        log_index: u64,
        /// Underlying domain error.
        source: DomainError,
    },

    /// Applier is already running.
    #[error("Applier already running")]
    AlreadyRunning,

    /// Graceful shutdown was requested.
    ///
    /// This is not really an error but uses the error type for control flow.
    #[error("Applier shutdown requested")]
    ShutdownRequested,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
