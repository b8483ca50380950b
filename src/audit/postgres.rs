//! Postgres audit store
//!
//! Records and outbox events are written in one transaction. The chain
//! fields (`sequence_number`, `previous_hash`, `record_hash`) are computed
//! while holding a transaction-scoped advisory lock, so appends to the chain
//! are serialized across every writer.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::chain::{record_hash, GENESIS_HASH};
use super::record::{AuditRecord, OutboxEvent, OutboxStatus};
use super::store::{AuditStore, PersistenceError};

const UNIQUE_VIOLATION: &str = "23505";

const CHAIN_LOCK: &str = "compliance_checks_chain";

const RECORD_COLUMNS: &str = r#"
    id, sequence_number, check_id, fingerprint, requester_id, blockchain_type,
    from_address, to_address, amount, token_id, status, risk_score,
    reasoning, signals, created_at, previous_hash, record_hash
"#;

const OUTBOX_COLUMNS: &str = r#"
    id, check_id, topic, payload, status, attempts, last_error, created_at
"#;

#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn insert(
        &self,
        record: &AuditRecord,
        events: &[OutboxEvent],
    ) -> Result<AuditRecord, PersistenceError> {
        let reasoning = serde_json::to_value(&record.reasoning)?;
        let signals = serde_json::to_value(&record.signals)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(CHAIN_LOCK)
            .execute(&mut *tx)
            .await?;

        let head: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT sequence_number, record_hash
            FROM compliance_checks
            ORDER BY sequence_number DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let (last_sequence, previous_hash) =
            head.unwrap_or_else(|| (0, GENESIS_HASH.to_string()));

        let mut stored = record.clone();
        stored.sequence_number = last_sequence + 1;
        stored.record_hash = record_hash(&stored, &previous_hash)?;
        stored.previous_hash = previous_hash;

        let inserted = sqlx::query(
            r#"
            INSERT INTO compliance_checks (
                id, sequence_number, check_id, fingerprint, requester_id, blockchain_type,
                from_address, to_address, amount, token_id,
                status, risk_score, reasoning, signals, created_at,
                previous_hash, record_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(stored.id)
        .bind(stored.sequence_number)
        .bind(stored.check_id)
        .bind(&stored.fingerprint)
        .bind(&stored.requester_id)
        .bind(stored.blockchain_type.as_str())
        .bind(&stored.from_address)
        .bind(&stored.to_address)
        .bind(stored.amount)
        .bind(&stored.token_id)
        .bind(stored.status.as_str())
        .bind(i16::from(stored.risk_score))
        .bind(&reasoning)
        .bind(&signals)
        .bind(stored.created_at)
        .bind(&stored.previous_hash)
        .bind(&stored.record_hash)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                return Err(PersistenceError::Duplicate(record.check_id));
            }
            Err(e) => return Err(e.into()),
        }

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO compliance_outbox (
                    id, check_id, topic, payload, status, attempts, last_error, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.id)
            .bind(event.check_id)
            .bind(&event.topic)
            .bind(&event.payload)
            .bind(event.status.as_str())
            .bind(event.attempts)
            .bind(&event.last_error)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            check_id = %stored.check_id,
            sequence_number = stored.sequence_number,
            events = events.len(),
            "Compliance check persisted"
        );

        Ok(stored)
    }

    async fn get(&self, check_id: Uuid) -> Result<Option<AuditRecord>, PersistenceError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM compliance_checks WHERE check_id = $1",
            RECORD_COLUMNS
        ))
        .bind(check_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    async fn records(&self, limit: i64) -> Result<Vec<AuditRecord>, PersistenceError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM compliance_checks ORDER BY sequence_number ASC LIMIT $1",
            RECORD_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, PersistenceError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM compliance_outbox
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
            OUTBOX_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outbox_from_row).collect()
    }

    async fn mark_published(&self, event_id: Uuid) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            r#"
            UPDATE compliance_outbox
            SET status = 'published', last_error = NULL, published_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::EventNotFound(event_id));
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> Result<OutboxStatus, PersistenceError> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE compliance_outbox
            SET attempts = attempts + 1,
                last_error = $2,
                status = CASE WHEN attempts + 1 >= $3 THEN 'dead_letter' ELSE status END
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(event_id)
        .bind(error)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        status
            .map(OutboxStatus::from)
            .ok_or(PersistenceError::EventNotFound(event_id))
    }
}

fn record_from_row(row: &PgRow) -> Result<AuditRecord, PersistenceError> {
    let blockchain_type: String = row.try_get("blockchain_type")?;
    let status: String = row.try_get("status")?;
    let risk_score: i16 = row.try_get("risk_score")?;

    Ok(AuditRecord {
        id: row.try_get("id")?,
        sequence_number: row.try_get("sequence_number")?,
        check_id: row.try_get("check_id")?,
        fingerprint: row.try_get("fingerprint")?,
        requester_id: row.try_get("requester_id")?,
        blockchain_type: blockchain_type.parse().map_err(PersistenceError::Corrupt)?,
        from_address: row.try_get("from_address")?,
        to_address: row.try_get("to_address")?,
        amount: row.try_get("amount")?,
        token_id: row.try_get("token_id")?,
        status: status.parse().map_err(PersistenceError::Corrupt)?,
        risk_score: u8::try_from(risk_score)
            .map_err(|_| PersistenceError::Corrupt(format!("risk score {}", risk_score)))?,
        reasoning: serde_json::from_value(row.try_get("reasoning")?)?,
        signals: serde_json::from_value(row.try_get("signals")?)?,
        created_at: row.try_get("created_at")?,
        previous_hash: row.try_get("previous_hash")?,
        record_hash: row.try_get("record_hash")?,
    })
}

fn outbox_from_row(row: &PgRow) -> Result<OutboxEvent, PersistenceError> {
    let status: String = row.try_get("status")?;

    Ok(OutboxEvent {
        id: row.try_get("id")?,
        check_id: row.try_get("check_id")?,
        topic: row.try_get("topic")?,
        payload: row.try_get("payload")?,
        status: OutboxStatus::from(status),
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
    })
}
