//! GraphQL type definitions.

use async_graphql::{EmptyMutation, EmptySubscription, Schema};

use crate::schema::CoreQuery;

/// The marketplace query schema (queries only, no mutations).
pub type EnsRentSchema = Schema<CoreQuery, EmptyMutation, EmptySubscription>;
