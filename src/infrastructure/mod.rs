//! Infrastructure layer - Concrete implementations

pub mod embedding;
pub mod logging;
pub mod observability;
pub mod query_cache;
