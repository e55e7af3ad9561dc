//! Per-user, per-game play statistics.

use crate::domain::{Decimal, GameType, OutcomeResult, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Rolling aggregates for one (user, game) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub game_type: GameType,
    pub total_bets: i64,
    pub total_wins: i64,
    pub total_losses: i64,
    pub total_amount_bet: Decimal,
    pub total_profit: Decimal,
    /// Largest single profit (>= 0).
    pub biggest_win: Decimal,
    /// Largest single loss, as a negative profit (<= 0).
    pub biggest_loss: Decimal,
    /// Positive = consecutive wins, negative = consecutive losses.
    pub current_streak: i64,
    pub best_win_streak: i64,
    /// Length of the longest loss streak (stored positive).
    pub worst_loss_streak: i64,
    pub consecutive_losses: i64,
    pub last_played_at: Option<TimeMs>,
}

impl UserStats {
    /// Zeroed row for a pair that has never played.
    pub fn new(user_id: UserId, game_type: GameType) -> Self {
        Self {
            user_id,
            game_type,
            total_bets: 0,
            total_wins: 0,
            total_losses: 0,
            total_amount_bet: Decimal::zero(),
            total_profit: Decimal::zero(),
            biggest_win: Decimal::zero(),
            biggest_loss: Decimal::zero(),
            current_streak: 0,
            best_win_streak: 0,
            worst_loss_streak: 0,
            consecutive_losses: 0,
            last_played_at: None,
        }
    }

    /// Fold one settled wager into the aggregates.
    pub fn apply(&mut self, stake: Decimal, outcome: &OutcomeResult, settled_at: TimeMs) {
        let profit = outcome.profit(stake);

        self.total_bets += 1;
        self.total_amount_bet += stake;
        self.total_profit += profit;
        self.biggest_win = self.biggest_win.max(profit);
        self.biggest_loss = self.biggest_loss.min(profit);

        if outcome.is_win {
            self.total_wins += 1;
            self.consecutive_losses = 0;
            self.current_streak = if self.current_streak >= 0 {
                self.current_streak + 1
            } else {
                1
            };
        } else {
            self.total_losses += 1;
            self.consecutive_losses += 1;
            self.current_streak = if self.current_streak <= 0 {
                self.current_streak - 1
            } else {
                -1
            };
        }

        if self.current_streak > 0 {
            self.best_win_streak = self.best_win_streak.max(self.current_streak);
        } else if self.current_streak < 0 {
            self.worst_loss_streak = self.worst_loss_streak.max(self.current_streak.abs());
        }

        self.last_played_at = Some(settled_at);
    }
}
