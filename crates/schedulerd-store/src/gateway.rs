//! Job Store Gateway: the only writer of `schedule_jobs`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use schedulerd_core::error::{Error, Result};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{FromRow, MySqlPool};

use crate::job::Job;

/// Storage-backed access to the schedule, abstracted behind a trait so
/// the Poll Loop and control-plane tests can run against an in-memory
/// fake instead of a live MySQL instance.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn fetch_due(&self, batch: u32) -> Result<Vec<Job>>;
    async fn fetch_by_id(&self, id: i64) -> Result<Option<Job>>;
    async fn mark_success(
        &self,
        id: i64,
        next_run_at: Option<NaiveDateTime>,
        disable: bool,
    ) -> Result<()>;
    async fn schedule_retry(&self, id: i64, at: NaiveDateTime) -> Result<()>;
}

/// `sqlx`-backed gateway over a MySQL connection pool. Sets the session
/// timezone once per leased connection so naive datetimes written/read by
/// this process share one reference frame, matching
/// `set_mysql_session_tz` in the originating scheduler.
pub struct MySqlJobStore {
    pool: MySqlPool,
}

impl MySqlJobStore {
    pub async fn connect(database_url: &str, pool_size: u32, session_time_zone: &str) -> Result<Self> {
        let tz = session_time_zone.to_string();
        let pool = MySqlPoolOptions::new()
            .max_connections(pool_size)
            .after_connect(move |conn, _meta| {
                let tz = tz.clone();
                Box::pin(async move {
                    sqlx::query("SET time_zone = ?")
                        .bind(tz)
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .map_err(|e| Error::store_with_source("failed to connect to job store", e))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for MySqlJobStore {
    async fn fetch_due(&self, batch: u32) -> Result<Vec<Job>> {
        // Decode row-by-row rather than `query_as::<_, Job>(..).fetch_all(..)`:
        // the latter fails the whole batch the moment a single due row
        // doesn't decode, which would block every other due job behind it
        // every cycle. One malformed row is logged and skipped instead.
        let rows = sqlx::query(
            r#"
            SELECT * FROM schedule_jobs
            WHERE enabled = 1 AND next_run_at IS NOT NULL AND next_run_at <= NOW()
            ORDER BY next_run_at ASC
            LIMIT ?
            "#,
        )
        .bind(batch)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::store_with_source("failed to fetch due jobs", e))?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            match Job::from_row(row) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::error!(error = %e, "skipping malformed schedule_jobs row");
                }
            }
        }
        Ok(jobs)
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM schedule_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::store_with_source("failed to fetch job by id", e))
    }

    async fn mark_success(
        &self,
        id: i64,
        next_run_at: Option<NaiveDateTime>,
        disable: bool,
    ) -> Result<()> {
        if disable {
            sqlx::query(
                "UPDATE schedule_jobs SET enabled = 0, last_run_at = NOW() WHERE id = ?",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::store_with_source("failed to disable job", e))?;
            return Ok(());
        }

        match next_run_at {
            None => {
                // No future firing: pause rather than store a sentinel date.
                sqlx::query(
                    "UPDATE schedule_jobs SET enabled = 0, last_run_at = NOW() WHERE id = ?",
                )
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::store_with_source("failed to pause job", e))?;
            }
            Some(next) => {
                sqlx::query(
                    "UPDATE schedule_jobs SET last_run_at = NOW(), next_run_at = ?, enabled = 1 WHERE id = ?",
                )
                .bind(next)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::store_with_source("failed to advance job schedule", e))?;
            }
        }
        Ok(())
    }

    async fn schedule_retry(&self, id: i64, at: NaiveDateTime) -> Result<()> {
        sqlx::query(
            "UPDATE schedule_jobs SET next_run_at = ?, last_run_at = NOW() WHERE id = ?",
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::store_with_source("failed to schedule retry", e))?;
        Ok(())
    }
}
