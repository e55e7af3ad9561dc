use crate::domain::{Decimal, GameType, StakeLimits, Tier};
use crate::engine::OutcomeConfig;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    /// Bounds used for games without a `bet_limits` row.
    pub stake_limits: StakeLimits,
    pub store_timeout: Duration,
    /// Upper bound on time spent retrying contended settlements.
    pub conflict_retry: Duration,
    pub default_game: GameType,
    pub rng_seed: Option<u64>,
    pub outcome: OutcomeConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let min_stake = parse_decimal(&env_map, "MIN_STAKE", "1")?;
        let max_stake = parse_decimal(&env_map, "MAX_STAKE", "10000")?;
        let stake_limits = StakeLimits::new(min_stake, max_stake);
        if !stake_limits.is_valid() {
            return Err(ConfigError::InvalidValue(
                "MIN_STAKE".to_string(),
                format!(
                    "must be positive and not above MAX_STAKE ({} > {})",
                    min_stake, max_stake
                ),
            ));
        }

        let store_timeout = Duration::from_millis(parse_u64(&env_map, "STORE_TIMEOUT_MS", "5000")?);
        if store_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "STORE_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let conflict_retry = Duration::from_millis(parse_u64(&env_map, "CONFLICT_RETRY_MS", "2000")?);

        let default_game = env_map
            .get("DEFAULT_GAME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "roleta".to_string());

        let rng_seed = match env_map.get("RNG_SEED") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue("RNG_SEED".to_string(), "must be a valid u64".to_string())
            })?),
            None => None,
        };

        let outcome = parse_outcome_config(&env_map)?;

        Ok(Config {
            database_path,
            stake_limits,
            store_timeout,
            conflict_retry,
            default_game: GameType::new(default_game),
            rng_seed,
            outcome,
        })
    }
}

fn parse_outcome_config(env_map: &HashMap<String, String>) -> Result<OutcomeConfig, ConfigError> {
    let defaults = OutcomeConfig::default();

    let onboarding_tiers = match env_map.get("ONBOARDING_TIERS") {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<Tier>().map_err(|e| {
                    ConfigError::InvalidValue("ONBOARDING_TIERS".to_string(), e.to_string())
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => defaults.onboarding_tiers,
    };

    let tier_weights = match env_map.get("TIER_WEIGHTS") {
        Some(raw) => parse_tier_weights(raw)?,
        None => defaults.tier_weights,
    };

    Ok(OutcomeConfig {
        onboarding_tiers,
        rescue_after_losses: parse_u32(env_map, "RESCUE_AFTER_LOSSES", "3")?,
        high_balance_threshold: parse_decimal(env_map, "HIGH_BALANCE_THRESHOLD", "1000")?,
        suppressed_win_percent: parse_percent(env_map, "SUPPRESSED_WIN_PERCENT", "2")?,
        normal_win_percent: parse_percent(env_map, "NORMAL_WIN_PERCENT", "35")?,
        tier_weights,
    })
}

/// Parse `tier=weight` pairs, e.g. `miseria=4,cinco=3,dez=2,vinte=1,master=0`.
fn parse_tier_weights(raw: &str) -> Result<Vec<(Tier, u32)>, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidValue("TIER_WEIGHTS".to_string(), msg);

    let weights = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (tier, weight) = pair
                .split_once('=')
                .ok_or_else(|| invalid(format!("expected tier=weight, got {}", pair)))?;
            let tier = tier.parse::<Tier>().map_err(|e| invalid(e.to_string()))?;
            let weight = weight
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid(format!("weight for {} must be a valid u32", tier)))?;
            Ok((tier, weight))
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    if weights.is_empty() {
        return Err(invalid("must name at least one tier".to_string()));
    }
    Ok(weights)
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<Decimal>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a decimal".to_string()))
}

fn parse_u64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<u64, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string()))
}

fn parse_u32(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<u32, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u32".to_string()))
}

fn parse_percent(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<u32, ConfigError> {
    let percent = parse_u32(env_map, key, default)?;
    if percent > 100 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be between 0 and 100, got {}", percent),
        ));
    }
    Ok(percent)
}
