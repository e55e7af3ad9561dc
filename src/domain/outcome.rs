//! Payout tiers and the result of an outcome decision.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named payout bracket. Multipliers apply to the stake to give the profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Master,
    Vinte,
    Dez,
    Cinco,
    Miseria,
    Perca,
}

impl Tier {
    /// Winning tiers, lowest payout first.
    pub const WINNING: [Tier; 5] = [
        Tier::Miseria,
        Tier::Cinco,
        Tier::Dez,
        Tier::Vinte,
        Tier::Master,
    ];

    pub fn multiplier(&self) -> Decimal {
        match self {
            Tier::Master => Decimal::from_scaled(70, 2),
            Tier::Vinte => Decimal::from_scaled(20, 2),
            Tier::Dez => Decimal::from_scaled(10, 2),
            Tier::Cinco => Decimal::from_scaled(5, 2),
            Tier::Miseria => Decimal::from_scaled(5, 3),
            Tier::Perca => Decimal::zero(),
        }
    }

    pub fn is_win(&self) -> bool {
        !matches!(self, Tier::Perca)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Master => "master",
            Tier::Vinte => "vinte",
            Tier::Dez => "dez",
            Tier::Cinco => "cinco",
            Tier::Miseria => "miseria",
            Tier::Perca => "perca",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier: {0}")]
pub struct TierParseError(pub String);

impl FromStr for Tier {
    type Err = TierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(Tier::Master),
            "vinte" => Ok(Tier::Vinte),
            "dez" => Ok(Tier::Dez),
            "cinco" => Ok(Tier::Cinco),
            "miseria" => Ok(Tier::Miseria),
            "perca" => Ok(Tier::Perca),
            other => Err(TierParseError(other.to_string())),
        }
    }
}

/// Decision produced by the outcome engine for one wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeResult {
    pub tier: Tier,
    pub payout_multiplier: Decimal,
    pub is_win: bool,
}

impl OutcomeResult {
    pub fn win(tier: Tier) -> Self {
        Self {
            tier,
            payout_multiplier: tier.multiplier(),
            is_win: true,
        }
    }

    pub fn loss() -> Self {
        Self {
            tier: Tier::Perca,
            payout_multiplier: Decimal::zero(),
            is_win: false,
        }
    }

    /// Net effect on the player: `stake * multiplier` on a win, `-stake` on a loss.
    pub fn profit(&self, stake: Decimal) -> Decimal {
        if self.is_win {
            stake * self.payout_multiplier
        } else {
            -stake
        }
    }

    /// Amount credited back: stake plus profit on a win, nothing on a loss.
    pub fn payout(&self, stake: Decimal) -> Decimal {
        if self.is_win {
            stake + self.profit(stake)
        } else {
            Decimal::zero()
        }
    }
}
