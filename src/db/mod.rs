//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer and the settlement transaction handle

pub mod migrations;
pub mod repo;

pub use migrations::{init_db, verify_schema};
pub use repo::{Repository, StoreTx};
