use bigdecimal::BigDecimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::LedgerStore;
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::models::{LedgerEntry, LedgerEntryType, LedgerMutation, LedgerWrite};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid ledger amount {amount}")]
    InvalidAmount { amount: BigDecimal },

    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        available: BigDecimal,
        required: BigDecimal,
    },

    #[error("member {0} not found")]
    MemberNotFound(Uuid),

    #[error("member {0} is not active")]
    MemberInactive(Uuid),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount { amount } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
                    amount: amount.to_string(),
                    reason: "must be greater than zero".to_string(),
                }))
            }
            LedgerError::InsufficientBalance {
                available,
                required,
            } => AppError::new(AppErrorKind::Domain(DomainError::InsufficientBalance {
                available: available.to_string(),
                required: required.to_string(),
            })),
            LedgerError::MemberNotFound(id) => AppError::not_found("member", id.to_string()),
            LedgerError::MemberInactive(_) => {
                AppError::unauthorized("member account is not active")
            }
            LedgerError::Database(e) => e.into(),
        }
    }
}

/// A committed ledger write
#[derive(Debug, Clone)]
pub struct LedgerReceipt {
    pub entry: LedgerEntry,
    pub balance_after: BigDecimal,
}

/// Member balance mutations. Every call is one locked transaction that
/// writes the balance and exactly one ledger row.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, member_id: Uuid) -> Result<BigDecimal, LedgerError> {
        self.store
            .find_member(member_id)
            .await?
            .map(|m| m.balance)
            .ok_or(LedgerError::MemberNotFound(member_id))
    }

    pub async fn debit(
        &self,
        member_id: Uuid,
        amount: &BigDecimal,
        description: impl Into<String>,
        ref_id: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.apply(LedgerMutation {
            user_id: member_id,
            entry_type: LedgerEntryType::Debit,
            amount: amount.clone(),
            description: description.into(),
            reference_id: Some(ref_id.to_string()),
            actor: "system".to_string(),
        })
        .await
    }

    /// Unbounded top-up, e.g. by an operator
    pub async fn credit(
        &self,
        member_id: Uuid,
        amount: &BigDecimal,
        description: impl Into<String>,
        actor: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.apply(LedgerMutation {
            user_id: member_id,
            entry_type: LedgerEntryType::Credit,
            amount: amount.clone(),
            description: description.into(),
            reference_id: None,
            actor: actor.to_string(),
        })
        .await
    }

    /// Returns a debited amount; tagged separately from credits for audit
    pub async fn refund(
        &self,
        member_id: Uuid,
        amount: &BigDecimal,
        description: impl Into<String>,
        ref_id: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.apply(LedgerMutation {
            user_id: member_id,
            entry_type: LedgerEntryType::Refund,
            amount: amount.clone(),
            description: description.into(),
            reference_id: Some(ref_id.to_string()),
            actor: "system".to_string(),
        })
        .await
    }

    pub async fn entries(&self, member_id: Uuid) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.entries_for(member_id).await?)
    }

    async fn apply(&self, mutation: LedgerMutation) -> Result<LedgerReceipt, LedgerError> {
        if mutation.amount <= BigDecimal::from(0) {
            return Err(LedgerError::InvalidAmount {
                amount: mutation.amount,
            });
        }

        let member_id = mutation.user_id;
        let entry_type = mutation.entry_type;
        let required = mutation.amount.clone();

        match self.store.apply(mutation).await? {
            LedgerWrite::Applied {
                entry,
                balance_after,
            } => {
                info!(
                    member_id = %member_id,
                    entry_type = entry_type.as_str(),
                    amount = %entry.amount,
                    balance_after = %balance_after,
                    "Ledger entry applied"
                );
                Ok(LedgerReceipt {
                    entry,
                    balance_after,
                })
            }
            LedgerWrite::InsufficientBalance { balance } => {
                debug!(member_id = %member_id, balance = %balance, required = %required, "Debit refused");
                Err(LedgerError::InsufficientBalance {
                    available: balance,
                    required,
                })
            }
            LedgerWrite::MemberNotFound => Err(LedgerError::MemberNotFound(member_id)),
            LedgerWrite::MemberInactive => {
                debug!(member_id = %member_id, "Debit refused for inactive member");
                Err(LedgerError::MemberInactive(member_id))
            }
        }
    }
}
