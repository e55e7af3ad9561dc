//! Settlement coordinator: validates, decides and applies one wager as a
//! single atomic unit.

use crate::config::{Config, ConfigError};
use crate::db::{Repository, StoreTx};
use crate::domain::{
    BetRecord, Decimal, SettlementReceipt, StakeLimits, TimeMs, UserStats, Wager, WagerResponse,
};
use crate::engine::{DecisionContext, OutcomeEngine};
use crate::error::{RejectReason, SettlementError};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{bounded_then_commit, BalanceManager, StatisticsUpdater, UserLocks};

/// Where a settlement attempt is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPhase {
    Validating,
    Deciding,
    Applying,
    Committed,
    Rejected,
    Aborted,
}

impl SettlementPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementPhase::Validating => "validating",
            SettlementPhase::Deciding => "deciding",
            SettlementPhase::Applying => "applying",
            SettlementPhase::Committed => "committed",
            SettlementPhase::Rejected => "rejected",
            SettlementPhase::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SettlementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct SettlementCoordinator {
    repo: Arc<Repository>,
    balances: BalanceManager,
    statistics: StatisticsUpdater,
    engine: OutcomeEngine,
    rng: Mutex<StdRng>,
    default_limits: StakeLimits,
    conflict_retry: Duration,
}

impl SettlementCoordinator {
    pub fn new(
        repo: Arc<Repository>,
        balances: BalanceManager,
        engine: OutcomeEngine,
        rng: StdRng,
        default_limits: StakeLimits,
        conflict_retry: Duration,
    ) -> Self {
        Self {
            repo,
            balances,
            statistics: StatisticsUpdater,
            engine,
            rng: Mutex::new(rng),
            default_limits,
            conflict_retry,
        }
    }

    /// Wire up the coordinator and its balance manager from configuration.
    ///
    /// Without `RNG_SEED` the generator is seeded from OS entropy.
    ///
    /// # Errors
    /// Returns an error if the outcome tunables are unusable.
    pub fn from_config(repo: Arc<Repository>, config: &Config) -> Result<Self, ConfigError> {
        let engine = OutcomeEngine::from_config(&config.outcome)?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let balances = BalanceManager::new(repo.clone(), UserLocks::new(), config.store_timeout);

        Ok(Self::new(
            repo,
            balances,
            engine,
            rng,
            config.stake_limits,
            config.conflict_retry,
        ))
    }

    pub fn balances(&self) -> &BalanceManager {
        &self.balances
    }

    pub fn repo(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Validate, decide and apply one wager.
    ///
    /// Holds the user's lock for the whole settlement. The store timeout
    /// covers each attempt up to COMMIT; the commit itself is awaited to
    /// completion. Store contention is retried with exponential backoff until
    /// `conflict_retry` elapses; every other failure is returned after its
    /// transaction has been rolled back.
    ///
    /// # Errors
    /// `Rejected` when validation fails, `Timeout` when the store stalled
    /// before commit, `Conflict` once retries are exhausted, or `Persistence`.
    /// None of them leave a trace in the store.
    pub async fn place_wager(&self, wager: &Wager) -> Result<SettlementReceipt, SettlementError> {
        debug!(
            user_id = %wager.user_id,
            game = %wager.game_type,
            phase = %SettlementPhase::Validating,
            "Settlement phase"
        );
        if !wager.stake.is_positive() {
            return Err(self.reject(wager, RejectReason::InvalidStake));
        }

        let _guard = self.balances.locks().acquire(wager.user_id).await;
        let store_timeout = self.balances.store_timeout();

        let backoff = ExponentialBackoff {
            current_interval: Duration::from_millis(10),
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(250),
            max_elapsed_time: Some(self.conflict_retry),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            match bounded_then_commit(store_timeout, self.prepare(wager)).await {
                Ok(receipt) => Ok(receipt),
                Err(e @ SettlementError::Conflict(_)) => {
                    warn!(user_id = %wager.user_id, error = %e, "Settlement contended, retrying");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await;

        match result {
            Ok(receipt) => {
                info!(
                    user_id = %receipt.user_id,
                    game = %receipt.game_type,
                    settlement_id = %receipt.settlement_id,
                    stake = %receipt.stake,
                    tier = %receipt.outcome.tier,
                    profit = %receipt.profit,
                    new_balance = %receipt.new_balance,
                    phase = %SettlementPhase::Committed,
                    "Wager settled"
                );
                Ok(receipt)
            }
            Err(SettlementError::Rejected(reason)) => Err(self.reject(wager, reason)),
            Err(e) => {
                warn!(
                    user_id = %wager.user_id,
                    game = %wager.game_type,
                    stake = %wager.stake,
                    error = %e,
                    phase = %SettlementPhase::Aborted,
                    "Settlement aborted and rolled back"
                );
                Err(e)
            }
        }
    }

    /// `place_wager` rendered as the committed/rejected response contract.
    pub async fn place_wager_response(
        &self,
        wager: &Wager,
    ) -> Result<WagerResponse, SettlementError> {
        WagerResponse::from_result(self.place_wager(wager).await)
    }

    fn reject(&self, wager: &Wager, reason: RejectReason) -> SettlementError {
        info!(
            user_id = %wager.user_id,
            game = %wager.game_type,
            stake = %wager.stake,
            reason = %reason,
            phase = %SettlementPhase::Rejected,
            "Wager rejected"
        );
        SettlementError::Rejected(reason)
    }

    /// One transactional attempt, left uncommitted. Returning early drops
    /// `tx`, which rolls back anything written so far.
    async fn prepare(
        &self,
        wager: &Wager,
    ) -> Result<(StoreTx, SettlementReceipt), SettlementError> {
        let mut tx = self.repo.begin().await?;

        let limits = tx
            .bet_limits(&wager.game_type)
            .await?
            .unwrap_or(self.default_limits);
        if !limits.contains(wager.stake) {
            return Err(RejectReason::OutOfBounds.into());
        }
        let balance = tx.ledger_balance(wager.user_id).await?;
        if balance < wager.stake {
            return Err(RejectReason::InsufficientFunds.into());
        }

        debug!(user_id = %wager.user_id, phase = %SettlementPhase::Deciding, "Settlement phase");
        let ctx = self.decision_context(&mut tx, wager, balance).await?;
        let decision = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.engine.evaluate(&ctx, &mut *rng)
        };
        debug!(
            user_id = %wager.user_id,
            rule = decision.rule,
            tier = %decision.outcome.tier,
            "Outcome decided"
        );

        debug!(user_id = %wager.user_id, phase = %SettlementPhase::Applying, "Settlement phase");
        let outcome = decision.outcome;
        let settlement_id = Uuid::new_v4().to_string();
        let now = TimeMs::now();
        let payout_amount = outcome.payout(wager.stake);

        let new_balance = self
            .balances
            .settle(
                &mut tx,
                wager.user_id,
                wager.stake,
                payout_amount,
                wager.game_type.as_str(),
                Some(&settlement_id),
                now,
            )
            .await?;
        self.statistics
            .apply_result(&mut tx, wager.user_id, &wager.game_type, wager.stake, &outcome, now)
            .await?;

        let receipt = SettlementReceipt {
            settlement_id,
            user_id: wager.user_id,
            game_type: wager.game_type.clone(),
            stake: wager.stake,
            outcome,
            payout_amount,
            profit: outcome.profit(wager.stake),
            new_balance,
            settled_at: now,
        };
        tx.insert_bet_record(&BetRecord::from(&receipt)).await?;

        Ok((tx, receipt))
    }

    async fn decision_context(
        &self,
        tx: &mut StoreTx,
        wager: &Wager,
        balance: Decimal,
    ) -> Result<DecisionContext, sqlx::Error> {
        let lifetime_bets = tx.lifetime_bets(wager.user_id).await?;
        let consecutive_losses = tx
            .user_stats(wager.user_id, &wager.game_type)
            .await?
            .map(|stats: UserStats| stats.consecutive_losses)
            .unwrap_or(0);

        Ok(DecisionContext {
            lifetime_bets,
            consecutive_losses,
            balance,
            stake: wager.stake,
        })
    }
}
