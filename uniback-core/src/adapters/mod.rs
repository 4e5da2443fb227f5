//! Adapter implementations (hexagonal architecture)
//!
//! Adapters implement the port traits for concrete technologies.

pub mod duckdb;
pub mod memory;
pub mod sealed_box;
