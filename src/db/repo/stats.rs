//! User statistics operations.

use crate::domain::{GameType, TimeMs, UserId, UserStats};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row};

use super::{decode_decimal, Repository};

const STATS_COLUMNS: &str = r#"
    user_id, game_type, total_bets, total_wins, total_losses, total_amount_bet,
    total_profit, biggest_win, biggest_loss, current_streak, best_win_streak,
    worst_loss_streak, consecutive_losses, last_played_at_ms
"#;

fn stats_from_row(row: &SqliteRow) -> Result<UserStats, sqlx::Error> {
    let decimal = |column: &str| -> Result<_, sqlx::Error> {
        let raw: String = row.get(column);
        decode_decimal(&raw, column)
    };

    Ok(UserStats {
        user_id: UserId::new(row.get("user_id")),
        game_type: GameType::new(row.get::<String, _>("game_type")),
        total_bets: row.get("total_bets"),
        total_wins: row.get("total_wins"),
        total_losses: row.get("total_losses"),
        total_amount_bet: decimal("total_amount_bet")?,
        total_profit: decimal("total_profit")?,
        biggest_win: decimal("biggest_win")?,
        biggest_loss: decimal("biggest_loss")?,
        current_streak: row.get("current_streak"),
        best_win_streak: row.get("best_win_streak"),
        worst_loss_streak: row.get("worst_loss_streak"),
        consecutive_losses: row.get("consecutive_losses"),
        last_played_at: row
            .get::<Option<i64>, _>("last_played_at_ms")
            .map(TimeMs::new),
    })
}

pub(super) async fn fetch_stats<'e, E>(
    executor: E,
    user_id: UserId,
    game_type: &GameType,
) -> Result<Option<UserStats>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM user_stats WHERE user_id = ? AND game_type = ?",
        STATS_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(user_id.as_i64())
        .bind(game_type.as_str())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(stats_from_row).transpose()
}

/// Wagers settled by the user across every game.
pub(super) async fn count_lifetime_bets<'e, E>(executor: E, user_id: UserId) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (count,): (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(total_bets), 0) FROM user_stats WHERE user_id = ?")
            .bind(user_id.as_i64())
            .fetch_one(executor)
            .await?;
    Ok(count)
}

pub(super) async fn upsert_stats<'e, E>(executor: E, stats: &UserStats) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO user_stats (
            user_id, game_type, total_bets, total_wins, total_losses, total_amount_bet,
            total_profit, biggest_win, biggest_loss, current_streak, best_win_streak,
            worst_loss_streak, consecutive_losses, last_played_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, game_type) DO UPDATE SET
            total_bets = excluded.total_bets,
            total_wins = excluded.total_wins,
            total_losses = excluded.total_losses,
            total_amount_bet = excluded.total_amount_bet,
            total_profit = excluded.total_profit,
            biggest_win = excluded.biggest_win,
            biggest_loss = excluded.biggest_loss,
            current_streak = excluded.current_streak,
            best_win_streak = excluded.best_win_streak,
            worst_loss_streak = excluded.worst_loss_streak,
            consecutive_losses = excluded.consecutive_losses,
            last_played_at_ms = excluded.last_played_at_ms
        "#,
    )
    .bind(stats.user_id.as_i64())
    .bind(stats.game_type.as_str())
    .bind(stats.total_bets)
    .bind(stats.total_wins)
    .bind(stats.total_losses)
    .bind(stats.total_amount_bet.to_canonical_string())
    .bind(stats.total_profit.to_canonical_string())
    .bind(stats.biggest_win.to_canonical_string())
    .bind(stats.biggest_loss.to_canonical_string())
    .bind(stats.current_streak)
    .bind(stats.best_win_streak)
    .bind(stats.worst_loss_streak)
    .bind(stats.consecutive_losses)
    .bind(stats.last_played_at.map(|t| t.as_ms()))
    .execute(executor)
    .await?;

    Ok(())
}

impl Repository {
    /// Statistics for one game, or None if the user never played it.
    pub async fn get_user_stats(
        &self,
        user_id: UserId,
        game_type: &GameType,
    ) -> Result<Option<UserStats>, sqlx::Error> {
        fetch_stats(&self.pool, user_id, game_type).await
    }

    /// Statistics for every game the user played, ordered by game.
    pub async fn query_user_stats(&self, user_id: UserId) -> Result<Vec<UserStats>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM user_stats WHERE user_id = ? ORDER BY game_type ASC",
            STATS_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(stats_from_row).collect()
    }

    pub async fn lifetime_bets(&self, user_id: UserId) -> Result<i64, sqlx::Error> {
        count_lifetime_bets(&self.pool, user_id).await
    }
}
