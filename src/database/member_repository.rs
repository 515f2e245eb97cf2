use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::LedgerStore;
use crate::models::{
    LedgerEntry, LedgerEntryType, LedgerMutation, LedgerWrite, Member, MemberStatus,
};

const DEPOSIT_COLUMNS: &str =
    "id, user_id, amount, type, description, reference_id, status, created_by, created_at";

#[derive(Debug, Clone, FromRow)]
struct MemberRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    balance: BigDecimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            balance: row.balance,
            status: MemberStatus::from_db(&row.status),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct DepositRow {
    id: Uuid,
    user_id: Uuid,
    amount: BigDecimal,
    #[sqlx(rename = "type")]
    entry_type: String,
    description: String,
    reference_id: Option<String>,
    status: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DepositRow> for LedgerEntry {
    type Error = DatabaseError;

    fn try_from(row: DepositRow) -> Result<Self, Self::Error> {
        let entry_type = LedgerEntryType::from_db(&row.entry_type).ok_or_else(|| {
            DatabaseError::decode(format!("unknown ledger entry type '{}'", row.entry_type))
        })?;

        Ok(LedgerEntry {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            entry_type,
            description: row.description,
            reference_id: row.reference_id,
            status: row.status,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Member accounts (`users`) and their ledger (`deposits`)
pub struct MemberRepository {
    pool: PgPool,
}

impl MemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for MemberRepository {
    async fn find_member(&self, id: Uuid) -> Result<Option<Member>, DatabaseError> {
        let row = sqlx::query_as::<_, MemberRow>(
            "SELECT id, email, name, password_hash, balance, status, created_at
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(Member::from))
    }

    async fn apply(&self, mutation: LedgerMutation) -> Result<LedgerWrite, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let locked: Option<(BigDecimal, String)> =
            sqlx::query_as("SELECT balance, status FROM users WHERE id = $1 FOR UPDATE")
                .bind(mutation.user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        let Some((balance, status)) = locked else {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(LedgerWrite::MemberNotFound);
        };

        let spending = mutation.entry_type == LedgerEntryType::Debit;
        if spending && !MemberStatus::from_db(&status).is_active() {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(LedgerWrite::MemberInactive);
        }

        let balance_after = &balance + mutation.signed_amount();
        if balance_after < BigDecimal::from(0) {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(LedgerWrite::InsufficientBalance { balance });
        }

        sqlx::query("UPDATE users SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(mutation.user_id)
            .bind(&balance_after)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let query = format!(
            "INSERT INTO deposits
             (user_id, amount, type, description, reference_id, status, created_by)
             VALUES ($1, $2, $3, $4, $5, 'success', $6)
             RETURNING {}",
            DEPOSIT_COLUMNS
        );
        let row = sqlx::query_as::<_, DepositRow>(&query)
            .bind(mutation.user_id)
            .bind(mutation.signed_amount())
            .bind(mutation.entry_type.as_str())
            .bind(&mutation.description)
            .bind(&mutation.reference_id)
            .bind(&mutation.actor)
            .fetch_one(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        debug!(
            user_id = %mutation.user_id,
            entry_type = mutation.entry_type.as_str(),
            balance_after = %balance_after,
            "Ledger entry committed"
        );

        Ok(LedgerWrite::Applied {
            entry: LedgerEntry::try_from(row)?,
            balance_after,
        })
    }

    async fn entries_for(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM deposits WHERE user_id = $1 ORDER BY created_at ASC",
            DEPOSIT_COLUMNS
        );

        sqlx::query_as::<_, DepositRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }
}
