//! PostgreSQL implementation of CallRepository.
//!
//! Status changes are a single `UPDATE ... WHERE id = $1 AND status = $2`,
//! so the database decides races between processes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::call::{Call, CallError, CallStatus, UserPair};
use crate::domain::foundation::{CallId, Timestamp, UserId};
use crate::ports::CallRepository;

const CALL_COLUMNS: &str =
    "id, caller_id, callee_id, initiated_id, status, initiated_at, answered_at, ended_at";

#[derive(Clone)]
pub struct PostgresCallRepository {
    pool: PgPool,
}

impl PostgresCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(context: &str, err: impl std::fmt::Display) -> CallError {
    CallError::Storage(format!("{}: {}", context, err))
}

#[async_trait]
impl CallRepository for PostgresCallRepository {
    async fn create(&self, call: &Call) -> Result<(), CallError> {
        sqlx::query(
            r#"
            INSERT INTO calls (
                id, caller_id, callee_id, initiated_id, status, initiated_at, answered_at, ended_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(call.id.as_uuid())
        .bind(call.caller_id.as_str())
        .bind(call.callee_id.as_str())
        .bind(call.initiated_id.as_str())
        .bind(call.status.as_str())
        .bind(call.initiated_at.as_datetime())
        .bind(call.answered_at.map(|t| *t.as_datetime()))
        .bind(call.ended_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| storage("Failed to insert call", e))?;

        Ok(())
    }

    async fn update_status(
        &self,
        call_id: CallId,
        from: CallStatus,
        to: CallStatus,
        answered_at: Option<Timestamp>,
        ended_at: Option<Timestamp>,
    ) -> Result<(), CallError> {
        let result = sqlx::query(
            r#"
            UPDATE calls SET
                status = $3,
                answered_at = COALESCE($4, answered_at),
                ended_at = COALESCE($5, ended_at)
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(call_id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(answered_at.map(|t| *t.as_datetime()))
        .bind(ended_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| storage("Failed to update call status", e))?;

        if result.rows_affected() == 0 {
            return Err(CallError::InvalidTransition { call_id, from, to });
        }

        Ok(())
    }

    async fn get_active_by_user_pair(&self, pair: &UserPair) -> Result<Option<Call>, CallError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {CALL_COLUMNS}
            FROM calls
            WHERE caller_id = $1 AND callee_id = $2
              AND status IN ('initiated', 'ringing', 'active')
            ORDER BY initiated_at DESC
            LIMIT 1
            "#
        ))
        .bind(pair.caller().as_str())
        .bind(pair.callee().as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("Failed to look up open call", e))?;

        row.map(row_to_call).transpose()
    }

    async fn get_by_id(&self, id: CallId) -> Result<Call, CallError> {
        let row = sqlx::query(&format!("SELECT {CALL_COLUMNS} FROM calls WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage("Failed to fetch call", e))?;

        match row {
            Some(row) => row_to_call(row),
            None => Err(CallError::NotFound(id)),
        }
    }
}

fn row_to_call(row: PgRow) -> Result<Call, CallError> {
    let column = |e: sqlx::Error| storage("Malformed call row", e);

    let id: Uuid = row.try_get("id").map_err(column)?;
    let status: String = row.try_get("status").map_err(column)?;
    let initiated_at: DateTime<Utc> = row.try_get("initiated_at").map_err(column)?;
    let answered_at: Option<DateTime<Utc>> = row.try_get("answered_at").map_err(column)?;
    let ended_at: Option<DateTime<Utc>> = row.try_get("ended_at").map_err(column)?;

    let user = |name: &str| -> Result<UserId, CallError> {
        let raw: String = row.try_get(name).map_err(column)?;
        UserId::new(raw).map_err(|e| storage("Malformed call row", e))
    };

    Ok(Call {
        id: CallId::from_uuid(id),
        caller_id: user("caller_id")?,
        callee_id: user("callee_id")?,
        initiated_id: user("initiated_id")?,
        status: status.parse().map_err(|e| storage("Malformed call row", e))?,
        initiated_at: Timestamp::from_datetime(initiated_at),
        answered_at: answered_at.map(Timestamp::from_datetime),
        ended_at: ended_at.map(Timestamp::from_datetime),
    })
}
