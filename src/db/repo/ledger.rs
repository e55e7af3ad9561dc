//! Ledger and balance-cache operations.

use crate::domain::{Decimal, EntryKind, LedgerEntry, NewLedgerEntry, TimeMs, UserId};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row};
use std::str::FromStr;

use super::{decode_decimal, Repository};

/// Append one immutable entry and return its id.
pub(super) async fn insert_entry<'e, E>(executor: E, entry: &NewLedgerEntry) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_entries (user_id, kind, amount, description, settlement_id, created_at_ms)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id.as_i64())
    .bind(entry.kind.as_str())
    .bind(entry.amount.to_canonical_string())
    .bind(entry.description.as_str())
    .bind(entry.settlement_id.as_deref())
    .bind(entry.created_at.as_ms())
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Sum of the user's signed ledger amounts.
///
/// Summed in Rust: SQLite's SUM would go through REAL and lose precision.
pub(super) async fn sum_balance<'e, E>(executor: E, user_id: UserId) -> Result<Decimal, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT amount FROM ledger_entries WHERE user_id = ? ORDER BY id ASC")
        .bind(user_id.as_i64())
        .fetch_all(executor)
        .await?;

    let mut balance = Decimal::zero();
    for row in rows {
        let raw: String = row.get("amount");
        balance += decode_decimal(&raw, "amount")?;
    }
    Ok(balance)
}

pub(super) async fn upsert_cached_balance<'e, E>(
    executor: E,
    user_id: UserId,
    balance: Decimal,
    at: TimeMs,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO account_balances (user_id, balance, updated_at_ms)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            balance = excluded.balance,
            updated_at_ms = excluded.updated_at_ms
        "#,
    )
    .bind(user_id.as_i64())
    .bind(balance.to_canonical_string())
    .bind(at.as_ms())
    .execute(executor)
    .await?;

    Ok(())
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, sqlx::Error> {
    let kind_raw: String = row.get("kind");
    let kind = EntryKind::from_str(&kind_raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: "kind".to_string(),
        source: Box::new(e),
    })?;
    let amount_raw: String = row.get("amount");

    Ok(LedgerEntry {
        id: row.get("id"),
        user_id: UserId::new(row.get("user_id")),
        kind,
        amount: decode_decimal(&amount_raw, "amount")?,
        description: row.get("description"),
        settlement_id: row.get("settlement_id"),
        created_at: TimeMs::new(row.get("created_at_ms")),
    })
}

impl Repository {
    /// Authoritative balance: the sum of the user's ledger.
    pub async fn ledger_balance(&self, user_id: UserId) -> Result<Decimal, sqlx::Error> {
        sum_balance(&self.pool, user_id).await
    }

    /// Cached balance, or None if the user has never had a ledger write.
    pub async fn cached_balance(&self, user_id: UserId) -> Result<Option<Decimal>, sqlx::Error> {
        let row = sqlx::query("SELECT balance FROM account_balances WHERE user_id = ?")
            .bind(user_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let raw: String = r.get("balance");
            decode_decimal(&raw, "balance")
        })
        .transpose()
    }

    /// Ledger entries for a user in replay order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored row cannot be decoded.
    pub async fn query_ledger(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, kind, amount, description, settlement_id, created_at_ms
            FROM ledger_entries
            WHERE user_id = ?
            ORDER BY created_at_ms ASC, id ASC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Entries written by a single settlement (the bet and, on a win, the credit).
    pub async fn query_settlement_entries(
        &self,
        settlement_id: &str,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, kind, amount, description, settlement_id, created_at_ms
            FROM ledger_entries
            WHERE settlement_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(settlement_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::db::repo::tests::setup_test_db;
    use crate::domain::{Decimal, EntryKind, NewLedgerEntry, TimeMs, UserId};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[tokio::test]
    async fn test_balance_is_sum_of_signed_entries() {
        let (repo, _temp) = setup_test_db().await;
        let user = UserId::new(1);

        let mut tx = repo.begin().await.unwrap();
        for (kind, amount) in [
            (EntryKind::Deposit, "100"),
            (EntryKind::Bet, "30"),
            (EntryKind::Win, "31.5"),
            (EntryKind::Withdraw, "10"),
            (EntryKind::Bonus, "0.25"),
        ] {
            tx.append_ledger_entry(&NewLedgerEntry::new(
                user,
                kind,
                d(amount),
                kind.as_str(),
                TimeMs::new(1000),
            ))
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        assert_eq!(repo.ledger_balance(user).await.unwrap(), d("91.75"));
        assert_eq!(repo.ledger_balance(UserId::new(2)).await.unwrap(), Decimal::zero());
    }

    #[tokio::test]
    async fn test_query_ledger_replay_order() {
        let (repo, _temp) = setup_test_db().await;
        let user = UserId::new(7);

        let mut tx = repo.begin().await.unwrap();
        tx.append_ledger_entry(&NewLedgerEntry::new(
            user,
            EntryKind::Deposit,
            d("50"),
            "later",
            TimeMs::new(2000),
        ))
        .await
        .unwrap();
        tx.append_ledger_entry(&NewLedgerEntry::new(
            user,
            EntryKind::Deposit,
            d("10"),
            "earlier",
            TimeMs::new(1000),
        ))
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let entries = repo.query_ledger(user).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "earlier");
        assert_eq!(entries[1].description, "later");
        assert_eq!(entries[1].amount, d("50"));
    }

    #[tokio::test]
    async fn test_rolled_back_entries_are_invisible() {
        let (repo, _temp) = setup_test_db().await;
        let user = UserId::new(3);

        let mut tx = repo.begin().await.unwrap();
        tx.append_ledger_entry(&NewLedgerEntry::new(
            user,
            EntryKind::Deposit,
            d("500"),
            "never committed",
            TimeMs::new(1),
        ))
        .await
        .unwrap();
        drop(tx);

        assert!(repo.query_ledger(user).await.unwrap().is_empty());
        assert_eq!(repo.cached_balance(user).await.unwrap(), None);
    }
}
