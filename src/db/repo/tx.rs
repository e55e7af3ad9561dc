//! Transaction handle for atomic settlement writes.

use crate::domain::{
    BetRecord, Decimal, GameType, NewLedgerEntry, StakeLimits, TimeMs, UserId, UserStats,
};
use sqlx::{Sqlite, Transaction};

use super::{bets, ledger, stats};

/// One open write transaction.
///
/// Every read goes through the same connection, so balances and statistics
/// observed here include the writes made earlier in the transaction. Dropping
/// the handle rolls back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub(super) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn ledger_balance(&mut self, user_id: UserId) -> Result<Decimal, sqlx::Error> {
        ledger::sum_balance(&mut *self.tx, user_id).await
    }

    pub async fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> Result<i64, sqlx::Error> {
        ledger::insert_entry(&mut *self.tx, entry).await
    }

    /// Recompute the balance from the ledger and store it in the cache.
    pub async fn refresh_balance_cache(
        &mut self,
        user_id: UserId,
        at: TimeMs,
    ) -> Result<Decimal, sqlx::Error> {
        let balance = ledger::sum_balance(&mut *self.tx, user_id).await?;
        ledger::upsert_cached_balance(&mut *self.tx, user_id, balance, at).await?;
        Ok(balance)
    }

    pub async fn user_stats(
        &mut self,
        user_id: UserId,
        game_type: &GameType,
    ) -> Result<Option<UserStats>, sqlx::Error> {
        stats::fetch_stats(&mut *self.tx, user_id, game_type).await
    }

    pub async fn lifetime_bets(&mut self, user_id: UserId) -> Result<i64, sqlx::Error> {
        stats::count_lifetime_bets(&mut *self.tx, user_id).await
    }

    pub async fn upsert_user_stats(&mut self, user_stats: &UserStats) -> Result<(), sqlx::Error> {
        stats::upsert_stats(&mut *self.tx, user_stats).await
    }

    pub async fn insert_bet_record(&mut self, record: &BetRecord) -> Result<(), sqlx::Error> {
        bets::insert_bet(&mut *self.tx, record).await
    }

    pub async fn bet_limits(
        &mut self,
        game_type: &GameType,
    ) -> Result<Option<StakeLimits>, sqlx::Error> {
        bets::fetch_limits(&mut *self.tx, game_type).await
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::repo::tests::setup_test_db;
    use crate::domain::{Decimal, EntryKind, NewLedgerEntry, TimeMs, UserId};

    #[tokio::test]
    async fn test_reads_see_uncommitted_writes() {
        let (repo, _temp) = setup_test_db().await;
        let user = UserId::new(4);

        let mut tx = repo.begin().await.unwrap();
        tx.append_ledger_entry(&NewLedgerEntry::new(
            user,
            EntryKind::Deposit,
            Decimal::from(40),
            "seed",
            TimeMs::new(1),
        ))
        .await
        .unwrap();
        tx.append_ledger_entry(&NewLedgerEntry::new(
            user,
            EntryKind::Bet,
            Decimal::from(15),
            "stake",
            TimeMs::new(2),
        ))
        .await
        .unwrap();

        assert_eq!(tx.ledger_balance(user).await.unwrap(), Decimal::from(25));
        let cached = tx.refresh_balance_cache(user, TimeMs::new(2)).await.unwrap();
        assert_eq!(cached, Decimal::from(25));
        tx.commit().await.unwrap();

        assert_eq!(repo.cached_balance(user).await.unwrap(), Some(Decimal::from(25)));
        assert_eq!(repo.ledger_balance(user).await.unwrap(), Decimal::from(25));
    }
}
