use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Suspended,
}

impl MemberStatus {
    pub fn from_db(value: &str) -> Self {
        match value {
            "active" => MemberStatus::Active,
            _ => MemberStatus::Suspended,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, MemberStatus::Active)
    }
}

/// Prepaid reseller account
#[derive(Debug, Clone, Serialize)]
pub struct Member {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub balance: BigDecimal,
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    Credit,
    Debit,
    Refund,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Credit => "credit",
            LedgerEntryType::Debit => "debit",
            LedgerEntryType::Refund => "refund",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "credit" => Some(LedgerEntryType::Credit),
            "debit" => Some(LedgerEntryType::Debit),
            "refund" => Some(LedgerEntryType::Refund),
            _ => None,
        }
    }
}

/// One row of the `deposits` ledger. `amount` is signed: debits are negative.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub entry_type: LedgerEntryType,
    pub description: String,
    pub reference_id: Option<String>,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A balance mutation request handed to the ledger store
#[derive(Debug, Clone)]
pub struct LedgerMutation {
    pub user_id: Uuid,
    pub entry_type: LedgerEntryType,
    /// Always positive; the sign comes from `entry_type`
    pub amount: BigDecimal,
    pub description: String,
    pub reference_id: Option<String>,
    pub actor: String,
}

impl LedgerMutation {
    pub fn signed_amount(&self) -> BigDecimal {
        match self.entry_type {
            LedgerEntryType::Debit => -self.amount.clone(),
            LedgerEntryType::Credit | LedgerEntryType::Refund => self.amount.clone(),
        }
    }
}

/// Outcome of a locked ledger write
#[derive(Debug, Clone)]
pub enum LedgerWrite {
    Applied {
        entry: LedgerEntry,
        balance_after: BigDecimal,
    },
    InsufficientBalance {
        balance: BigDecimal,
    },
    MemberNotFound,
    /// Suspended accounts cannot spend; credits and refunds still land
    MemberInactive,
}
