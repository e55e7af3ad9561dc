use crate::db::StoreTx;
use crate::domain::{Decimal, GameType, OutcomeResult, TimeMs, UserId, UserStats};
use tracing::debug;

/// Persists the per-game statistics of a settled wager.
///
/// The arithmetic lives in `UserStats::apply`; this type loads the row
/// (zeroed when absent), folds the result in and writes it back inside the
/// settlement transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticsUpdater;

impl StatisticsUpdater {
    pub async fn apply_result(
        &self,
        tx: &mut StoreTx,
        user_id: UserId,
        game_type: &GameType,
        stake: Decimal,
        outcome: &OutcomeResult,
        now: TimeMs,
    ) -> Result<UserStats, sqlx::Error> {
        let mut stats = tx
            .user_stats(user_id, game_type)
            .await?
            .unwrap_or_else(|| UserStats::new(user_id, game_type.clone()));

        stats.apply(stake, outcome, now);
        tx.upsert_user_stats(&stats).await?;

        debug!(
            user_id = %user_id,
            game = %game_type,
            streak = stats.current_streak,
            consecutive_losses = stats.consecutive_losses,
            "Statistics updated"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::tests::setup_test_db;
    use crate::domain::Tier;

    #[tokio::test]
    async fn test_creates_row_then_accumulates() {
        let (repo, _temp) = setup_test_db().await;
        let user = UserId::new(1);
        let game = GameType::new("roleta");
        let stake = Decimal::from(100);

        let mut tx = repo.begin().await.unwrap();
        let updater = StatisticsUpdater;
        for (at, outcome) in [
            (1, OutcomeResult::loss()),
            (2, OutcomeResult::loss()),
            (3, OutcomeResult::win(Tier::Miseria)),
        ] {
            updater
                .apply_result(&mut tx, user, &game, stake, &outcome, TimeMs::new(at))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let stats = repo.get_user_stats(user, &game).await.unwrap().unwrap();
        assert_eq!(stats.total_bets, 3);
        assert_eq!(stats.total_wins, 1);
        assert_eq!(stats.total_losses, 2);
        assert_eq!(stats.total_amount_bet, Decimal::from(300));
        assert_eq!(
            stats.total_profit,
            Decimal::from_str_canonical("-199.5").unwrap()
        );
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.worst_loss_streak, 2);
        assert_eq!(stats.consecutive_losses, 0);
        assert_eq!(stats.biggest_loss, Decimal::from(-100));
        assert_eq!(stats.last_played_at, Some(TimeMs::new(3)));
    }
}
