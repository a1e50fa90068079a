//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization, schema and pragmas
//! - Repository layer plus connection-scoped helpers for transactions

pub mod migrations;
pub mod repo;

pub use migrations::{init_db, init_db_with};
pub use repo::Repository;
