use crate::error::{AppError, Result};
use crate::idempotency::fingerprint::Fingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use uuid::Uuid;

/// Status of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
}

/// Why a request was refused by the idempotency layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// A request with the same key and content is still executing.
    InFlight,
    /// The key was already used for a different request.
    KeyReused,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::InFlight => "in_flight",
            ConflictKind::KeyReused => "key_reused",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ConflictKind::InFlight => {
                "A request with this idempotency key is already being processed"
            }
            ConflictKind::KeyReused => {
                "Idempotency key reused with different request parameters"
            }
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored response of a completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Proof that the holder inserted the in-progress record for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    pub id: Uuid,
}

/// Outcome of [`IdempotencyStore::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The key was unseen; the caller owns the new record.
    Proceed(Lease),
    /// The request already completed; return the stored response.
    Replay(ResponseSnapshot),
    /// The request must be rejected.
    Conflict(ConflictKind),
}

/// Stored idempotency record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub idempotency_key: String,
    pub fingerprint: String,
    pub status: IdempotencyStatus,
    pub response_status: Option<i32>,
    pub response_content_type: Option<String>,
    pub response_body: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Builds a fresh in-progress record with a new owner id.
    pub fn new(idempotency_key: String, fingerprint: &Fingerprint, in_flight_ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            idempotency_key,
            fingerprint: fingerprint.as_str().to_string(),
            status: IdempotencyStatus::InProgress,
            response_status: None,
            response_content_type: None,
            response_body: None,
            created_at: now,
            completed_at: None,
            expires_at: now + Duration::seconds(in_flight_ttl_seconds),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_completed(&self) -> bool {
        self.status == IdempotencyStatus::Completed
    }

    pub fn lease(&self) -> Lease {
        Lease {
            key: self.idempotency_key.clone(),
            id: self.id,
        }
    }

    pub fn snapshot(&self) -> Option<ResponseSnapshot> {
        let status = u16::try_from(self.response_status?).ok()?;
        Some(ResponseSnapshot {
            status,
            content_type: self.response_content_type.clone(),
            body: self.response_body.clone().unwrap_or_default(),
        })
    }

    /// Decides how a request presenting `fingerprint` is treated when this
    /// record already holds its key.
    pub fn decide(&self, fingerprint: &Fingerprint) -> Result<Decision> {
        if self.fingerprint != fingerprint.as_str() {
            return Ok(Decision::Conflict(ConflictKind::KeyReused));
        }

        match self.status {
            IdempotencyStatus::InProgress => Ok(Decision::Conflict(ConflictKind::InFlight)),
            IdempotencyStatus::Completed => self.snapshot().map(Decision::Replay).ok_or_else(|| {
                AppError::IdempotencyState(format!(
                    "completed record {} has no response snapshot",
                    self.id
                ))
            }),
        }
    }

    /// Marks the record completed in place. Used by the in-process store.
    pub(crate) fn complete(&mut self, snapshot: &ResponseSnapshot, ttl_seconds: i64) {
        let now = Utc::now();
        self.status = IdempotencyStatus::Completed;
        self.response_status = Some(i32::from(snapshot.status));
        self.response_content_type = snapshot.content_type.clone();
        self.response_body = Some(snapshot.body.clone());
        self.completed_at = Some(now);
        self.expires_at = now + Duration::seconds(ttl_seconds);
    }
}

/// Durable store backing the idempotency protocol.
///
/// `begin` must be a single atomic operation at the storage layer: it is the
/// only synchronization point between concurrent requests, possibly running
/// in different processes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Creates an in-progress record for `key`, or reports why it can't.
    async fn begin(&self, key: &str, fingerprint: &Fingerprint) -> Result<Decision>;

    /// Transitions the leased record to completed and stores the response.
    /// Fails if the lease no longer owns an in-progress record.
    async fn complete(&self, lease: &Lease, snapshot: &ResponseSnapshot) -> Result<()>;

    /// Removes the leased in-progress record so the key can be retried.
    async fn abandon(&self, lease: &Lease) -> Result<bool>;

    /// Finds a record by key.
    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>>;

    /// Deletes records past their expiry.
    async fn cleanup_expired(&self) -> Result<u64>;
}

/// PostgreSQL-based idempotency storage.
pub struct PostgresIdempotencyStore {
    pool: PgPool,
    ttl_seconds: i64,
    in_flight_ttl_seconds: i64,
}

impl PostgresIdempotencyStore {
    pub fn new(pool: PgPool, ttl_seconds: i64, in_flight_ttl_seconds: i64) -> Self {
        Self {
            pool,
            ttl_seconds,
            in_flight_ttl_seconds,
        }
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn begin(&self, key: &str, fingerprint: &Fingerprint) -> Result<Decision> {
        let record = IdempotencyRecord::new(key.to_string(), fingerprint, self.in_flight_ttl_seconds);

        // The no-op update makes RETURNING yield the existing row on conflict,
        // so insert-or-read is one statement.
        let existing = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            INSERT INTO idempotency_keys (id, idempotency_key, fingerprint, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (idempotency_key) DO UPDATE SET idempotency_key = idempotency_keys.idempotency_key
            RETURNING id, idempotency_key, fingerprint, status, response_status, response_content_type, response_body, created_at, completed_at, expires_at
            "#,
        )
        .bind(record.id)
        .bind(&record.idempotency_key)
        .bind(&record.fingerprint)
        .bind(record.status)
        .bind(record.created_at)
        .bind(record.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if existing.id == record.id {
            Ok(Decision::Proceed(record.lease()))
        } else {
            existing.decide(fingerprint)
        }
    }

    async fn complete(&self, lease: &Lease, snapshot: &ResponseSnapshot) -> Result<()> {
        let expires_at = Utc::now() + Duration::seconds(self.ttl_seconds);

        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = 'completed', response_status = $3, response_content_type = $4,
                response_body = $5, completed_at = NOW(), expires_at = $6
            WHERE idempotency_key = $1 AND id = $2 AND status = 'in_progress'
            "#,
        )
        .bind(&lease.key)
        .bind(lease.id)
        .bind(i32::from(snapshot.status))
        .bind(&snapshot.content_type)
        .bind(&snapshot.body)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::IdempotencyState(format!(
                "no in-progress record owned by lease {}",
                lease.id
            )));
        }

        Ok(())
    }

    async fn abandon(&self, lease: &Lease) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM idempotency_keys
            WHERE idempotency_key = $1 AND id = $2 AND status = 'in_progress'
            "#,
        )
        .bind(&lease.key)
        .bind(lease.id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT id, idempotency_key, fingerprint, status, response_status, response_content_type, response_body, created_at, completed_at, expires_at
            FROM idempotency_keys
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(record)
    }

    async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM idempotency_keys
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}
