//! Ledger entries: the append-only record every balance is derived from.

use crate::domain::{Decimal, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of monetary event recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Bet,
    Win,
    Deposit,
    Withdraw,
    Bonus,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Bet => "bet",
            EntryKind::Win => "win",
            EntryKind::Deposit => "deposit",
            EntryKind::Withdraw => "withdraw",
            EntryKind::Bonus => "bonus",
        }
    }

    /// True for kinds that take money out of the account.
    pub fn is_debit(&self) -> bool {
        matches!(self, EntryKind::Bet | EntryKind::Withdraw)
    }

    /// Signed ledger amount for a non-negative magnitude of this kind.
    pub fn signed(&self, magnitude: Decimal) -> Decimal {
        let magnitude = magnitude.abs();
        if self.is_debit() {
            -magnitude
        } else {
            magnitude
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ledger entry kind: {0}")]
pub struct EntryKindParseError(pub String);

impl FromStr for EntryKind {
    type Err = EntryKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bet" => Ok(EntryKind::Bet),
            "win" => Ok(EntryKind::Win),
            "deposit" => Ok(EntryKind::Deposit),
            "withdraw" => Ok(EntryKind::Withdraw),
            "bonus" => Ok(EntryKind::Bonus),
            other => Err(EntryKindParseError(other.to_string())),
        }
    }
}

/// A ledger entry that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub kind: EntryKind,
    /// Signed effect on the balance.
    pub amount: Decimal,
    pub description: String,
    /// Links the bet/win pair written by one settlement.
    pub settlement_id: Option<String>,
    pub created_at: TimeMs,
}

impl NewLedgerEntry {
    /// Build an entry from a non-negative magnitude; the sign follows `kind`.
    pub fn new(
        user_id: UserId,
        kind: EntryKind,
        magnitude: Decimal,
        description: impl Into<String>,
        created_at: TimeMs,
    ) -> Self {
        Self {
            user_id,
            kind,
            amount: kind.signed(magnitude),
            description: description.into(),
            settlement_id: None,
            created_at,
        }
    }

    pub fn with_settlement(mut self, settlement_id: &str) -> Self {
        self.settlement_id = Some(settlement_id.to_string());
        self
    }
}

/// A persisted, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: UserId,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_id: Option<String>,
    pub created_at: TimeMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_signed_amounts_follow_kind() {
        assert_eq!(EntryKind::Bet.signed(d("10")), d("-10"));
        assert_eq!(EntryKind::Withdraw.signed(d("10")), d("-10"));
        assert_eq!(EntryKind::Win.signed(d("10.5")), d("10.5"));
        assert_eq!(EntryKind::Deposit.signed(d("10")), d("10"));
        assert_eq!(EntryKind::Bonus.signed(d("-3")), d("3"));
    }

    #[test]
    fn test_kind_parse_and_display() {
        for kind in [
            EntryKind::Bet,
            EntryKind::Win,
            EntryKind::Deposit,
            EntryKind::Withdraw,
            EntryKind::Bonus,
        ] {
            assert_eq!(kind.as_str().parse::<EntryKind>().unwrap(), kind);
        }
        assert!("refund".parse::<EntryKind>().is_err());
    }

    #[test]
    fn test_new_entry_carries_settlement_id() {
        let entry = NewLedgerEntry::new(
            UserId::new(1),
            EntryKind::Bet,
            d("25"),
            "stake",
            TimeMs::new(1000),
        )
        .with_settlement("abc");
        assert_eq!(entry.amount, d("-25"));
        assert_eq!(entry.settlement_id.as_deref(), Some("abc"));
    }
}
