//! Outcome engine: an ordered cascade of rules, first match wins.
//!
//! The engine is pure. It reads a snapshot of the player's history and draws
//! from a caller-supplied generator, so any decision can be replayed with a
//! seeded `StdRng`.

use crate::config::ConfigError;
use crate::domain::{Decimal, OutcomeResult, Tier};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use std::fmt;

/// Snapshot of the player's state the rules decide on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionContext {
    /// Wagers settled so far across every game.
    pub lifetime_bets: i64,
    /// Consecutive losses on the game being played.
    pub consecutive_losses: i64,
    /// Ledger balance before this wager.
    pub balance: Decimal,
    pub stake: Decimal,
}

/// Which rule fired and what it decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub rule: &'static str,
    pub outcome: OutcomeResult,
}

/// One predicate→result step of the cascade.
///
/// Returning `None` passes the decision to the next rule.
pub trait Rule: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &DecisionContext, rng: &mut dyn RngCore) -> Option<OutcomeResult>;
}

/// True with `percent` in 100 chance.
fn roll_percent(rng: &mut dyn RngCore, percent: u32) -> bool {
    rng.gen_range(1..=100u32) <= percent
}

/// Forced wins for a player's first wagers, one tier per wager index.
#[derive(Debug, Clone)]
pub struct OnboardingGuarantee {
    schedule: Vec<Tier>,
}

impl OnboardingGuarantee {
    pub fn new(schedule: Vec<Tier>) -> Self {
        Self { schedule }
    }
}

impl Rule for OnboardingGuarantee {
    fn name(&self) -> &'static str {
        "onboarding"
    }

    fn evaluate(&self, ctx: &DecisionContext, _rng: &mut dyn RngCore) -> Option<OutcomeResult> {
        let index = usize::try_from(ctx.lifetime_bets).ok()?;
        self.schedule.get(index).map(|tier| OutcomeResult::win(*tier))
    }
}

/// Forced low win once a loss streak reaches the threshold.
#[derive(Debug, Clone)]
pub struct LossStreakRescue {
    threshold: i64,
    tier: Tier,
}

impl LossStreakRescue {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: i64::from(threshold),
            tier: Tier::Miseria,
        }
    }
}

impl Rule for LossStreakRescue {
    fn name(&self) -> &'static str {
        "loss_streak_rescue"
    }

    fn evaluate(&self, ctx: &DecisionContext, _rng: &mut dyn RngCore) -> Option<OutcomeResult> {
        if self.threshold > 0 && ctx.consecutive_losses >= self.threshold {
            Some(OutcomeResult::win(self.tier))
        } else {
            None
        }
    }
}

/// Rare minimum-tier wins once the balance reaches the threshold.
#[derive(Debug, Clone)]
pub struct HighBalanceSuppression {
    threshold: Decimal,
    win_percent: u32,
}

impl HighBalanceSuppression {
    pub fn new(threshold: Decimal, win_percent: u32) -> Self {
        Self {
            threshold,
            win_percent,
        }
    }
}

impl Rule for HighBalanceSuppression {
    fn name(&self) -> &'static str {
        "high_balance_suppression"
    }

    fn evaluate(&self, ctx: &DecisionContext, rng: &mut dyn RngCore) -> Option<OutcomeResult> {
        if ctx.balance < self.threshold {
            return None;
        }
        if roll_percent(rng, self.win_percent) {
            Some(OutcomeResult::win(Tier::Miseria))
        } else {
            Some(OutcomeResult::loss())
        }
    }
}

/// Catch-all: fixed win chance, winning tier drawn by weight.
#[derive(Debug, Clone)]
pub struct NormalPlay {
    win_percent: u32,
    tiers: Vec<Tier>,
    weights: WeightedIndex<u32>,
}

impl NormalPlay {
    /// # Errors
    /// Returns an error if the weights are empty, all zero, or name `perca`.
    pub fn new(win_percent: u32, tier_weights: &[(Tier, u32)]) -> Result<Self, ConfigError> {
        if tier_weights.iter().any(|(tier, _)| !tier.is_win()) {
            return Err(ConfigError::InvalidValue(
                "TIER_WEIGHTS".to_string(),
                "only winning tiers can be weighted".to_string(),
            ));
        }
        let weights = WeightedIndex::new(tier_weights.iter().map(|(_, w)| *w)).map_err(|e| {
            ConfigError::InvalidValue("TIER_WEIGHTS".to_string(), e.to_string())
        })?;
        Ok(Self {
            win_percent,
            tiers: tier_weights.iter().map(|(tier, _)| *tier).collect(),
            weights,
        })
    }
}

impl Rule for NormalPlay {
    fn name(&self) -> &'static str {
        "normal_play"
    }

    fn evaluate(&self, _ctx: &DecisionContext, rng: &mut dyn RngCore) -> Option<OutcomeResult> {
        if roll_percent(rng, self.win_percent) {
            let tier = self.tiers[self.weights.sample(rng)];
            Some(OutcomeResult::win(tier))
        } else {
            Some(OutcomeResult::loss())
        }
    }
}

/// Tunables for the default cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeConfig {
    /// Forced winning tier for each of a player's first wagers.
    pub onboarding_tiers: Vec<Tier>,
    /// Losses in a row that trigger a rescue win; 0 disables the rule.
    pub rescue_after_losses: u32,
    pub high_balance_threshold: Decimal,
    pub suppressed_win_percent: u32,
    pub normal_win_percent: u32,
    pub tier_weights: Vec<(Tier, u32)>,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            onboarding_tiers: vec![Tier::Cinco, Tier::Dez, Tier::Dez],
            rescue_after_losses: 3,
            high_balance_threshold: Decimal::from(1000),
            suppressed_win_percent: 2,
            normal_win_percent: 35,
            tier_weights: Tier::WINNING.iter().map(|tier| (*tier, 1)).collect(),
        }
    }
}

/// Ordered rule cascade.
#[derive(Debug)]
pub struct OutcomeEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl OutcomeEngine {
    /// Build an engine from an explicit rule list, evaluated in order.
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Build the standard four-rule cascade.
    ///
    /// # Errors
    /// Returns an error if a percentage exceeds 100, the onboarding schedule
    /// contains `perca`, or the tier weights are unusable.
    pub fn from_config(config: &OutcomeConfig) -> Result<Self, ConfigError> {
        for (key, percent) in [
            ("SUPPRESSED_WIN_PERCENT", config.suppressed_win_percent),
            ("NORMAL_WIN_PERCENT", config.normal_win_percent),
        ] {
            if percent > 100 {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    format!("must be between 0 and 100, got {}", percent),
                ));
            }
        }
        if config.onboarding_tiers.iter().any(|tier| !tier.is_win()) {
            return Err(ConfigError::InvalidValue(
                "ONBOARDING_TIERS".to_string(),
                "onboarding wagers must use winning tiers".to_string(),
            ));
        }

        Ok(Self::new(vec![
            Box::new(OnboardingGuarantee::new(config.onboarding_tiers.clone())),
            Box::new(LossStreakRescue::new(config.rescue_after_losses)),
            Box::new(HighBalanceSuppression::new(
                config.high_balance_threshold,
                config.suppressed_win_percent,
            )),
            Box::new(NormalPlay::new(
                config.normal_win_percent,
                &config.tier_weights,
            )?),
        ]))
    }

    /// Run the cascade. Never fails: if no rule matches the wager is lost.
    pub fn evaluate(&self, ctx: &DecisionContext, rng: &mut dyn RngCore) -> Decision {
        for rule in &self.rules {
            if let Some(outcome) = rule.evaluate(ctx, rng) {
                return Decision {
                    rule: rule.name(),
                    outcome,
                };
            }
        }
        Decision {
            rule: "default_loss",
            outcome: OutcomeResult::loss(),
        }
    }

    pub fn decide(&self, ctx: &DecisionContext, rng: &mut dyn RngCore) -> OutcomeResult {
        self.evaluate(ctx, rng).outcome
    }
}
