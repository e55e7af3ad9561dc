use crate::config::ConfigError;
use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable reason a wager was rejected before anything was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidStake,
    OutOfBounds,
    InsufficientFunds,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidStake => "invalid_stake",
            RejectReason::OutOfBounds => "out_of_bounds",
            RejectReason::InsufficientFunds => "insufficient_funds",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a settlement or a balance operation.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Validation failed; nothing was written.
    #[error("wager rejected: {0}")]
    Rejected(RejectReason),
    /// Amount for a funding operation was zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),
    /// Lock or transaction contention in the store.
    #[error("store contention: {0}")]
    Conflict(String),
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),
    /// Write or read failure; the transaction was rolled back.
    #[error("persistence failure: {0}")]
    Persistence(#[source] sqlx::Error),
}

impl SettlementError {
    /// True when the attempt left no trace and resubmitting it unchanged can
    /// succeed. A stored value that fails to decode fails every retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SettlementError::Conflict(_) | SettlementError::Timeout(_) => true,
            SettlementError::Persistence(err) => !matches!(
                err,
                sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::Decode(_)
                    | sqlx::Error::ColumnNotFound(_)
            ),
            SettlementError::Rejected(_) | SettlementError::InvalidAmount(_) => false,
        }
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            SettlementError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<RejectReason> for SettlementError {
    fn from(reason: RejectReason) -> Self {
        SettlementError::Rejected(reason)
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(err: sqlx::Error) -> Self {
        if is_contention(&err) {
            SettlementError::Conflict(err.to_string())
        } else {
            SettlementError::Persistence(err)
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes,
/// plus pool exhaustion.
fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false),
        _ => false,
    }
}

/// Unrecoverable errors that abort process startup.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Schema error: missing table {0}")]
    Schema(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&RejectReason::InvalidStake).unwrap(),
            "\"invalid_stake\""
        );
        assert_eq!(
            serde_json::to_string(&RejectReason::OutOfBounds).unwrap(),
            "\"out_of_bounds\""
        );
        assert_eq!(RejectReason::InsufficientFunds.to_string(), "insufficient_funds");
    }

    #[test]
    fn test_retry_classification() {
        assert!(!SettlementError::Rejected(RejectReason::InsufficientFunds).is_retryable());
        assert!(!SettlementError::InvalidAmount(Decimal::zero()).is_retryable());
        assert!(SettlementError::Conflict("busy".into()).is_retryable());
        assert!(SettlementError::Timeout(Duration::from_millis(5)).is_retryable());
        assert!(SettlementError::Persistence(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn test_malformed_stored_value_is_not_retryable() {
        let source = Decimal::from_str_canonical("twelve").unwrap_err();
        let err = SettlementError::from(sqlx::Error::ColumnDecode {
            index: "amount".to_string(),
            source: Box::new(source),
        });
        assert!(matches!(err, SettlementError::Persistence(_)));
        assert!(!err.is_retryable());

        let err = SettlementError::from(sqlx::Error::ColumnNotFound("balance".to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_pool_timeout_maps_to_conflict() {
        let err = SettlementError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, SettlementError::Conflict(_)));

        let err = SettlementError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, SettlementError::Persistence(_)));
    }

    #[test]
    fn test_reject_reason_accessor() {
        let err: SettlementError = RejectReason::OutOfBounds.into();
        assert_eq!(err.reject_reason(), Some(RejectReason::OutOfBounds));
        assert_eq!(SettlementError::Conflict("x".into()).reject_reason(), None);
    }
}
