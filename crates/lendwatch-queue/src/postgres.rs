//! PostgreSQL queue backend.
//!
//! Jobs survive process restarts. Claims use `FOR UPDATE SKIP LOCKED`, so
//! several workers may share one queue without double delivery. A claimed row
//! carries a `locked_until` lease; once it passes, the row is claimable again,
//! so a worker that dies mid-job never strands it.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! lendwatch-queue = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! # Schema
//! `lendwatch_jobs` is created on first connect. One table holds every
//! named queue; rows are scoped by the `queue` column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::info;

use lendwatch_core::QueueConfig;

use crate::backend::{QueueBackend, QueueCounts};
use crate::error::QueueError;
use crate::job::{JobId, JobState, QueueJob};

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

const JOB_COLUMNS: &str =
    "id, kind, payload, attempt, policy, state, created_at, available_at, locked_until, last_error";

// ─── Connection options ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostgresQueueOptions {
    /// Maximum number of connections in the pool (default: 5)
    pub max_connections: u32,
    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
}

impl Default for PostgresQueueOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

// ─── PostgresQueue ─────────────────────────────────────────────────────────────

/// [`QueueBackend`] on a PostgreSQL table.
#[derive(Clone)]
pub struct PostgresQueue {
    pool: PgPool,
    queue: String,
}

impl PostgresQueue {
    /// Connect using the host/port/credentials in `config` and create the schema.
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        Self::connect_with_options(config, PostgresQueueOptions::default()).await
    }

    pub async fn connect_with_options(
        config: &QueueConfig,
        opts: PostgresQueueOptions,
    ) -> Result<Self, QueueError> {
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .acquire_timeout(Duration::from_secs(opts.connect_timeout_secs))
            .connect(&config.database_url())
            .await
            .map_err(|e| QueueError::Backend(format!("postgres connect: {e}")))?;

        let queue = Self {
            pool,
            queue: config.name.clone(),
        };
        queue.init_schema().await?;
        info!(
            queue = %config.name,
            host = %config.host,
            port = config.port,
            "PostgresQueue connected"
        );
        Ok(queue)
    }

    async fn init_schema(&self) -> Result<(), QueueError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS lendwatch_jobs (
                seq          BIGSERIAL    NOT NULL,
                id           TEXT         PRIMARY KEY,
                queue        TEXT         NOT NULL,
                kind         TEXT         NOT NULL,
                payload      TEXT         NOT NULL,
                attempt      INTEGER      NOT NULL DEFAULT 0,
                policy       TEXT         NOT NULL,
                state        TEXT         NOT NULL,
                created_at   TIMESTAMPTZ  NOT NULL,
                available_at TIMESTAMPTZ  NOT NULL,
                locked_until TIMESTAMPTZ,
                last_error   TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        // Tables created before leases existed.
        sqlx::query("ALTER TABLE lendwatch_jobs ADD COLUMN IF NOT EXISTS locked_until TIMESTAMPTZ")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_lendwatch_jobs_ready
             ON lendwatch_jobs (queue, state, available_at, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Run an update on one job of this queue; `NotFound` if no row matched.
    async fn update_one(&self, id: JobId, query: PgQuery<'_>) -> Result<(), QueueError> {
        let done = query.execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(QueueError::NotFound { id });
        }
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> QueueError {
    QueueError::Backend(e.to_string())
}

fn decode_job(row: &PgRow) -> Result<QueueJob, QueueError> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let kind: String = row.try_get("kind").map_err(db_err)?;
    let payload: String = row.try_get("payload").map_err(db_err)?;
    let attempt: i32 = row.try_get("attempt").map_err(db_err)?;
    let policy: String = row.try_get("policy").map_err(db_err)?;
    let state: String = row.try_get("state").map_err(db_err)?;

    Ok(QueueJob {
        id: id
            .parse()
            .map_err(|e| QueueError::Backend(format!("bad job id '{id}': {e}")))?,
        kind: kind
            .parse()
            .map_err(|e| QueueError::Backend(format!("bad job kind: {e}")))?,
        payload: serde_json::from_str(&payload)?,
        attempt: attempt.max(0) as u32,
        policy: serde_json::from_str(&policy)?,
        state: state.parse().map_err(QueueError::Backend)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        available_at: row.try_get("available_at").map_err(db_err)?,
        locked_until: row.try_get("locked_until").map_err(db_err)?,
        last_error: row.try_get("last_error").map_err(db_err)?,
    })
}

#[async_trait]
impl QueueBackend for PostgresQueue {
    async fn push(&self, job: QueueJob) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO lendwatch_jobs
                (id, queue, kind, payload, attempt, policy, state, created_at, available_at,
                 locked_until, last_error)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(job.id.to_string())
        .bind(&self.queue)
        .bind(job.kind.as_str())
        .bind(serde_json::to_string(&job.payload)?)
        .bind(job.attempt as i32)
        .bind(serde_json::to_string(&job.policy)?)
        .bind(job.state.as_str())
        .bind(job.created_at)
        .bind(job.available_at)
        .bind(job.locked_until)
        .bind(job.last_error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn claim(
        &self,
        now: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Result<Option<QueueJob>, QueueError> {
        let sql = format!(
            "UPDATE lendwatch_jobs SET state = 'active', attempt = attempt + 1, locked_until = $3
             WHERE id = (
                SELECT id FROM lendwatch_jobs
                WHERE queue = $1
                  AND ((state IN ('waiting', 'delayed') AND available_at <= $2)
                    OR (state = 'active' AND (locked_until IS NULL OR locked_until <= $2)))
                ORDER BY available_at, seq
                LIMIT 1
                FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&self.queue)
            .bind(now)
            .bind(locked_until)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(decode_job).transpose()
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        self.update_one(
            id,
            sqlx::query("DELETE FROM lendwatch_jobs WHERE id = $1 AND queue = $2")
                .bind(id.to_string())
                .bind(&self.queue),
        )
        .await
    }

    async fn reschedule(
        &self,
        id: JobId,
        available_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError> {
        self.update_one(
            id,
            sqlx::query(
                "UPDATE lendwatch_jobs
                 SET state = 'delayed', available_at = $3, locked_until = NULL, last_error = $4
                 WHERE id = $1 AND queue = $2",
            )
            .bind(id.to_string())
            .bind(&self.queue)
            .bind(available_at)
            .bind(error.to_string()),
        )
        .await
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        self.update_one(
            id,
            sqlx::query(
                "UPDATE lendwatch_jobs SET state = 'failed', locked_until = NULL, last_error = $3
                 WHERE id = $1 AND queue = $2",
            )
            .bind(id.to_string())
            .bind(&self.queue)
            .bind(error.to_string()),
        )
        .await
    }

    async fn requeue_failed(&self, id: JobId, now: DateTime<Utc>) -> Result<(), QueueError> {
        let done = sqlx::query(
            "UPDATE lendwatch_jobs SET state = 'waiting', attempt = 0, available_at = $3
             WHERE id = $1 AND queue = $2 AND state = 'failed'",
        )
        .bind(id.to_string())
        .bind(&self.queue)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(_) => Err(QueueError::NotFailed { id }),
                None => Err(QueueError::NotFound { id }),
            };
        }
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<QueueJob>, QueueError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM lendwatch_jobs WHERE id = $1 AND queue = $2");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(&self.queue)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(decode_job).transpose()
    }

    async fn list(&self, state: JobState) -> Result<Vec<QueueJob>, QueueError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM lendwatch_jobs WHERE queue = $1 AND state = $2 ORDER BY seq"
        );
        let rows = sqlx::query(&sql)
            .bind(&self.queue)
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(decode_job).collect()
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let rows = sqlx::query(
            "SELECT state, COUNT(*) AS n FROM lendwatch_jobs WHERE queue = $1 GROUP BY state",
        )
        .bind(&self.queue)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let state: String = row.try_get("state").map_err(db_err)?;
            let n: i64 = row.try_get("n").map_err(db_err)?;
            let n = n.max(0) as u64;
            match state.parse::<JobState>() {
                Ok(JobState::Waiting) => counts.waiting = n,
                Ok(JobState::Delayed) => counts.delayed = n,
                Ok(JobState::Active) => counts.active = n,
                Ok(JobState::Failed) => counts.failed = n,
                Err(_) => {}
            }
        }
        Ok(counts)
    }
}
