//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for reads against the pool and
//! `StoreTx` for the writes of one atomic settlement. Methods are organized
//! across submodules by domain:
//! - `ledger.rs` - Ledger entries and the cached balance
//! - `stats.rs` - Per-game user statistics
//! - `bets.rs` - Bet history and per-game stake limits
//! - `tx.rs` - The transaction handle used by the balance and settlement paths

mod bets;
mod ledger;
mod stats;
mod tx;

pub use tx::StoreTx;

use crate::domain::Decimal;
use sqlx::sqlite::SqlitePool;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction. Dropping the handle without `commit` rolls
    /// every write back.
    ///
    /// # Errors
    /// Returns an error if no connection can be acquired or BEGIN fails.
    pub async fn begin(&self) -> Result<StoreTx, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(StoreTx::new(tx))
    }
}

/// Decode a TEXT decimal column.
///
/// Balance-bearing columns must never decode to a default, so a malformed
/// value surfaces as a column decode error.
pub(super) fn decode_decimal(raw: &str, column: &str) -> Result<Decimal, sqlx::Error> {
    Decimal::from_str_canonical(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
