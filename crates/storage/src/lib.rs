//! Storage layer for the ENS rental marketplace indexer.
//!
//! This crate provides PostgreSQL implementations of the repository traits
//! defined in `ensrent-core`. It handles all database interactions including
//! connection pooling, migrations, keyset pagination, and the atomic
//! per-event apply operations.
//!
//! # Architecture
//!
//! The storage layer follows the repository pattern:
//!
//! - [`postgres::Database`] - Connection pool management
//! - [`postgres::PgRepositories`] - Composite repository for all entity types
//! - Individual repositories for listings, rentals, and the applier cursor
//!
//! # Usage
//!
//! ```ignore
//! use ensrent_storage::{Database, DatabaseConfig, PgRepositories};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_applier(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! // Create repositories
//! let repositories = Arc::new(PgRepositories::new(Arc::new(db)));
//! ```

pub mod postgres;

pub use postgres::{
    Database, DatabaseConfig, PgRepositories, PurgeStats, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
