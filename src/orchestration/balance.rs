//! Balance manager: every mutation is a ledger append plus a cache refresh
//! inside one transaction.

use crate::db::{Repository, StoreTx};
use crate::domain::{Decimal, EntryKind, NewLedgerEntry, TimeMs, UserId};
use crate::error::{RejectReason, SettlementError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{bounded, bounded_then_commit, UserLocks};

/// Cache versus ledger comparison for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub user_id: UserId,
    pub cached: Option<Decimal>,
    pub ledger: Decimal,
    /// The cache disagreed with the ledger (or was missing) and was rewritten.
    pub repaired: bool,
}

#[derive(Debug, Clone)]
pub struct BalanceManager {
    repo: Arc<Repository>,
    locks: UserLocks,
    store_timeout: Duration,
}

impl BalanceManager {
    pub fn new(repo: Arc<Repository>, locks: UserLocks, store_timeout: Duration) -> Self {
        Self {
            repo,
            locks,
            store_timeout,
        }
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Authoritative balance: the ledger sum, never the cache.
    pub async fn balance(&self, user_id: UserId) -> Result<Decimal, SettlementError> {
        bounded(self.store_timeout, async {
            self.repo
                .ledger_balance(user_id)
                .await
                .map_err(SettlementError::from)
        })
        .await
    }

    /// Debit then credit inside the caller's transaction.
    ///
    /// Writes a `bet` entry for `debit` and, when `credit` is positive, a `win`
    /// entry for `credit`, then refreshes the cached balance. Nothing is
    /// committed here.
    ///
    /// # Errors
    /// `InvalidAmount` for a negative amount, `Rejected(InsufficientFunds)`
    /// if the ledger balance is below `debit`, or the store error.
    #[allow(clippy::too_many_arguments)]
    pub async fn settle(
        &self,
        tx: &mut StoreTx,
        user_id: UserId,
        debit: Decimal,
        credit: Decimal,
        description: &str,
        settlement_id: Option<&str>,
        at: TimeMs,
    ) -> Result<Decimal, SettlementError> {
        for amount in [debit, credit] {
            if amount.is_negative() {
                return Err(SettlementError::InvalidAmount(amount));
            }
        }

        let balance = tx.ledger_balance(user_id).await?;
        if balance < debit {
            return Err(RejectReason::InsufficientFunds.into());
        }

        let link = |entry: NewLedgerEntry| match settlement_id {
            Some(id) => entry.with_settlement(id),
            None => entry,
        };

        if debit.is_positive() {
            tx.append_ledger_entry(&link(NewLedgerEntry::new(
                user_id,
                EntryKind::Bet,
                debit,
                description,
                at,
            )))
            .await?;
        }
        if credit.is_positive() {
            tx.append_ledger_entry(&link(NewLedgerEntry::new(
                user_id,
                EntryKind::Win,
                credit,
                description,
                at,
            )))
            .await?;
        }

        Ok(tx.refresh_balance_cache(user_id, at).await?)
    }

    /// Credit external funds.
    pub async fn deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<Decimal, SettlementError> {
        self.fund(user_id, EntryKind::Deposit, amount, description).await
    }

    /// Debit funds leaving the system. Rejected if the balance cannot cover it.
    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<Decimal, SettlementError> {
        self.fund(user_id, EntryKind::Withdraw, amount, description).await
    }

    /// Credit promotional funds.
    pub async fn bonus(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<Decimal, SettlementError> {
        self.fund(user_id, EntryKind::Bonus, amount, description).await
    }

    async fn fund(
        &self,
        user_id: UserId,
        kind: EntryKind,
        amount: Decimal,
        description: &str,
    ) -> Result<Decimal, SettlementError> {
        if !amount.is_positive() {
            return Err(SettlementError::InvalidAmount(amount));
        }

        let _guard = self.locks.acquire(user_id).await;
        let new_balance = bounded_then_commit(
            self.store_timeout,
            self.apply_funding(user_id, kind, amount, description),
        )
        .await?;

        info!(
            user_id = %user_id,
            kind = %kind,
            amount = %amount,
            new_balance = %new_balance,
            "Ledger funding applied"
        );
        Ok(new_balance)
    }

    async fn apply_funding(
        &self,
        user_id: UserId,
        kind: EntryKind,
        amount: Decimal,
        description: &str,
    ) -> Result<(StoreTx, Decimal), SettlementError> {
        let mut tx = self.repo.begin().await?;
        if kind.is_debit() && tx.ledger_balance(user_id).await? < amount {
            return Err(RejectReason::InsufficientFunds.into());
        }

        let now = TimeMs::now();
        tx.append_ledger_entry(&NewLedgerEntry::new(user_id, kind, amount, description, now))
            .await?;
        let new_balance = tx.refresh_balance_cache(user_id, now).await?;
        Ok((tx, new_balance))
    }

    /// Compare the cached balance with the ledger and rewrite the cache from
    /// the ledger when they differ.
    pub async fn reconcile(&self, user_id: UserId) -> Result<ReconcileReport, SettlementError> {
        let _guard = self.locks.acquire(user_id).await;
        let report = bounded_then_commit(self.store_timeout, self.rewrite_cache(user_id)).await?;

        if report.repaired {
            warn!(
                user_id = %user_id,
                cached = ?report.cached.map(|c| c.to_string()),
                ledger = %report.ledger,
                "Cached balance diverged from ledger; rewritten"
            );
        }
        Ok(report)
    }

    async fn rewrite_cache(
        &self,
        user_id: UserId,
    ) -> Result<(StoreTx, ReconcileReport), SettlementError> {
        let cached = self.repo.cached_balance(user_id).await?;
        let mut tx = self.repo.begin().await?;
        let ledger = tx.ledger_balance(user_id).await?;

        let repaired = cached != Some(ledger);
        if repaired {
            tx.refresh_balance_cache(user_id, TimeMs::now()).await?;
        }

        let report = ReconcileReport {
            user_id,
            cached,
            ledger,
            repaired,
        };
        Ok((tx, report))
    }
}
