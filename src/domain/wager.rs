//! Wager input, settlement results and the bet history record.

use crate::domain::{Decimal, GameType, OutcomeResult, Tier, TimeMs, UserId};
use crate::error::{RejectReason, SettlementError};
use serde::{Deserialize, Serialize};

/// Ephemeral wager request. Its effects live on in the ledger and stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wager {
    pub user_id: UserId,
    pub game_type: GameType,
    pub stake: Decimal,
}

impl Wager {
    pub fn new(user_id: UserId, game_type: GameType, stake: Decimal) -> Self {
        Self {
            user_id,
            game_type,
            stake,
        }
    }
}

/// Inclusive stake bounds for a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeLimits {
    pub min_stake: Decimal,
    pub max_stake: Decimal,
}

impl StakeLimits {
    pub fn new(min_stake: Decimal, max_stake: Decimal) -> Self {
        Self {
            min_stake,
            max_stake,
        }
    }

    pub fn contains(&self, stake: Decimal) -> bool {
        stake >= self.min_stake && stake <= self.max_stake
    }

    /// Bounds are usable when `0 < min <= max`.
    pub fn is_valid(&self) -> bool {
        self.min_stake.is_positive() && self.min_stake <= self.max_stake
    }
}

/// What a committed settlement hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub settlement_id: String,
    pub user_id: UserId,
    pub game_type: GameType,
    pub stake: Decimal,
    pub outcome: OutcomeResult,
    /// Amount credited back (stake + profit on a win, zero on a loss).
    pub payout_amount: Decimal,
    pub profit: Decimal,
    pub new_balance: Decimal,
    pub settled_at: TimeMs,
}

/// Row of the bet history, one per committed settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    pub settlement_id: String,
    pub user_id: UserId,
    pub game_type: GameType,
    pub stake: Decimal,
    pub tier: Tier,
    pub is_win: bool,
    pub profit: Decimal,
    pub balance_after: Decimal,
    pub created_at: TimeMs,
}

impl From<&SettlementReceipt> for BetRecord {
    fn from(receipt: &SettlementReceipt) -> Self {
        Self {
            settlement_id: receipt.settlement_id.clone(),
            user_id: receipt.user_id,
            game_type: receipt.game_type.clone(),
            stake: receipt.stake,
            tier: receipt.outcome.tier,
            is_win: receipt.outcome.is_win,
            profit: receipt.profit,
            balance_after: receipt.new_balance,
            created_at: receipt.settled_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Committed,
    Rejected,
}

/// Wire form of `place_wager`: committed results carry the tier and payout,
/// rejections carry a machine-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerResponse {
    pub status: WagerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_win: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_id: Option<String>,
}

impl WagerResponse {
    pub fn committed(receipt: &SettlementReceipt) -> Self {
        Self {
            status: WagerStatus::Committed,
            reason: None,
            is_win: Some(receipt.outcome.is_win),
            tier: Some(receipt.outcome.tier),
            payout: Some(receipt.payout_amount),
            new_balance: Some(receipt.new_balance),
            settlement_id: Some(receipt.settlement_id.clone()),
        }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            status: WagerStatus::Rejected,
            reason: Some(reason),
            is_win: None,
            tier: None,
            payout: None,
            new_balance: None,
            settlement_id: None,
        }
    }

    /// Map a settlement result onto the wire contract.
    ///
    /// Only rejections become responses; transient failures stay errors so the
    /// caller can retry them.
    pub fn from_result(
        result: Result<SettlementReceipt, SettlementError>,
    ) -> Result<Self, SettlementError> {
        match result {
            Ok(receipt) => Ok(Self::committed(&receipt)),
            Err(SettlementError::Rejected(reason)) => Ok(Self::rejected(reason)),
            Err(other) => Err(other),
        }
    }
}
