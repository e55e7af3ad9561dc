//! Bet history and stake-limit operations.

use crate::domain::{BetRecord, Decimal, GameType, StakeLimits, Tier, TimeMs, UserId};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row};
use std::str::FromStr;
use tracing::warn;

use super::{decode_decimal, Repository};

pub(super) async fn insert_bet<'e, E>(executor: E, record: &BetRecord) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO bet_records (
            settlement_id, user_id, game_type, stake, tier, is_win, profit,
            balance_after, created_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.settlement_id.as_str())
    .bind(record.user_id.as_i64())
    .bind(record.game_type.as_str())
    .bind(record.stake.to_canonical_string())
    .bind(record.tier.as_str())
    .bind(record.is_win)
    .bind(record.profit.to_canonical_string())
    .bind(record.balance_after.to_canonical_string())
    .bind(record.created_at.as_ms())
    .execute(executor)
    .await?;

    Ok(())
}

pub(super) async fn fetch_limits<'e, E>(
    executor: E,
    game_type: &GameType,
) -> Result<Option<StakeLimits>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT min_stake, max_stake FROM bet_limits WHERE game_type = ?")
        .bind(game_type.as_str())
        .fetch_optional(executor)
        .await?;

    match row {
        Some(row) => {
            let min: String = row.get("min_stake");
            let max: String = row.get("max_stake");
            Ok(Some(StakeLimits::new(
                decode_decimal(&min, "min_stake")?,
                decode_decimal(&max, "max_stake")?,
            )))
        }
        None => Ok(None),
    }
}

/// History rows are reporting data: a malformed decimal is logged and read
/// as zero rather than failing the whole page.
fn bet_from_row(row: &SqliteRow) -> BetRecord {
    let decimal = |column: &str| -> Decimal {
        let raw: String = row.get(column);
        Decimal::from_str_canonical(&raw).unwrap_or_else(|e| {
            warn!(column, raw = %raw, error = %e, "Failed to parse bet record decimal");
            Decimal::zero()
        })
    };
    let tier_raw: String = row.get("tier");
    let tier = Tier::from_str(&tier_raw).unwrap_or_else(|e| {
        warn!(raw = %tier_raw, error = %e, "Unknown tier in bet record");
        Tier::Perca
    });

    BetRecord {
        settlement_id: row.get("settlement_id"),
        user_id: UserId::new(row.get("user_id")),
        game_type: GameType::new(row.get::<String, _>("game_type")),
        stake: decimal("stake"),
        tier,
        is_win: row.get("is_win"),
        profit: decimal("profit"),
        balance_after: decimal("balance_after"),
        created_at: TimeMs::new(row.get("created_at_ms")),
    }
}

impl Repository {
    /// Most recent bets first.
    pub async fn query_bets(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<BetRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT settlement_id, user_id, game_type, stake, tier, is_win, profit,
                   balance_after, created_at_ms
            FROM bet_records
            WHERE user_id = ?
            ORDER BY created_at_ms DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.as_i64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(bet_from_row).collect())
    }

    pub async fn get_bet_limits(
        &self,
        game_type: &GameType,
    ) -> Result<Option<StakeLimits>, sqlx::Error> {
        fetch_limits(&self.pool, game_type).await
    }

    /// Insert or replace the stake bounds for a game.
    ///
    /// Callers validate the bounds; the table stores what it is given.
    pub async fn set_bet_limits(
        &self,
        game_type: &GameType,
        limits: StakeLimits,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO bet_limits (game_type, min_stake, max_stake)
            VALUES (?, ?, ?)
            ON CONFLICT(game_type) DO UPDATE SET
                min_stake = excluded.min_stake,
                max_stake = excluded.max_stake
            "#,
        )
        .bind(game_type.as_str())
        .bind(limits.min_stake.to_canonical_string())
        .bind(limits.max_stake.to_canonical_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
