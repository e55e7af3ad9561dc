//! Settlement orchestration: per-user locking, the balance manager, the
//! statistics updater and the coordinator that ties them together.

pub mod balance;
pub mod locks;
pub mod settlement;
pub mod statistics;

pub use balance::{BalanceManager, ReconcileReport};
pub use locks::UserLocks;
pub use settlement::{SettlementCoordinator, SettlementPhase};
pub use statistics::StatisticsUpdater;

use crate::db::StoreTx;
use crate::error::SettlementError;
use std::future::Future;
use std::time::Duration;

/// Run one store attempt under `limit`.
///
/// A timed-out attempt is dropped, which rolls back its open transaction.
/// Never wrap a commit in this: a dropped COMMIT still completes on the
/// SQLite worker.
pub(crate) async fn bounded<T, F>(limit: Duration, attempt: F) -> Result<T, SettlementError>
where
    F: Future<Output = Result<T, SettlementError>>,
{
    tokio::time::timeout(limit, attempt)
        .await
        .map_err(|_| SettlementError::Timeout(limit))?
}

/// Run the uncommitted half of a write under `limit`, then commit outside it.
///
/// `Timeout` is only reported while the transaction is still open, so it
/// always means nothing was written. A failed commit surfaces as the store
/// error and is rolled back by SQLite.
pub(crate) async fn bounded_then_commit<T, F>(
    limit: Duration,
    prepare: F,
) -> Result<T, SettlementError>
where
    F: Future<Output = Result<(StoreTx, T), SettlementError>>,
{
    let (tx, value) = bounded(limit, prepare).await?;
    tx.commit().await?;
    Ok(value)
}
