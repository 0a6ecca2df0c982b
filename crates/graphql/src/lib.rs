//! GraphQL API for the ENS rental marketplace indexer.
//!
//! Exposes the materialized listing and rental projection over a
//! read-only GraphQL endpoint, plus an applier status query.
//!
//! ```ignore
//! use ensrent_graphql::{build_schema, serve_with_shutdown, ServerConfig};
//!
//! let schema = build_schema(repositories);
//! serve_with_shutdown(schema, ServerConfig::default(), shutdown).await?;
//! ```

mod schema;
mod server;
mod types;

pub use schema::{
    build_schema, CoreQuery, PageInfo, Status, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH,
};
pub use server::{serve, serve_with_shutdown, ServerConfig};
pub use types::EnsRentSchema;
