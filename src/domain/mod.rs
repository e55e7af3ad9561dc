//! Domain types for wager settlement.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Domain primitives: TimeMs, UserId, GameType
//! - Ledger entries, payout tiers and per-game statistics
//! - Wager inputs, settlement receipts and the bet history record

pub mod decimal;
pub mod ledger;
pub mod outcome;
pub mod primitives;
pub mod stats;
pub mod wager;

pub use decimal::Decimal;
pub use ledger::{EntryKind, LedgerEntry, NewLedgerEntry};
pub use outcome::{OutcomeResult, Tier};
pub use primitives::{GameType, TimeMs, UserId, UserIdParseError};
pub use stats::UserStats;
pub use wager::{BetRecord, SettlementReceipt, StakeLimits, Wager, WagerResponse, WagerStatus};
