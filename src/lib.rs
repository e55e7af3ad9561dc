pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod identity;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository, StoreTx};
pub use domain::{
    BetRecord, Decimal, EntryKind, GameType, LedgerEntry, OutcomeResult, SettlementReceipt,
    StakeLimits, Tier, TimeMs, UserId, UserStats, Wager, WagerResponse, WagerStatus,
};
pub use engine::{OutcomeConfig, OutcomeEngine};
pub use error::{AppError, RejectReason, SettlementError};
pub use identity::{IdentityError, IdentityProvider, MockIdentityProvider, TrustedIdentityProvider};
pub use orchestration::{BalanceManager, SettlementCoordinator, UserLocks};
