//! Persistent index job queue.
//!
//! Jobs live in the `index_jobs` table and move through
//!
//! ```text
//! pending --claim--> processing --complete--> completed
//!                               \--fail-----> failed
//! ```
//!
//! `completed` and `failed` are terminal; a retry is a new job.
//!
//! [`claim_next`] is the only contended operation. It selects the oldest
//! pending row and flips it to `processing` in one statement inside its own
//! short transaction. SQLite serializes writers, so the select and the update
//! act as a single compare-and-swap on `status`: two workers can never claim
//! the same row, and a claimer never waits on rows another claimer holds for
//! longer than that one statement. Indexing work happens after the claim has
//! committed.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::Duration;

use crate::config::Config;
use crate::db;
use crate::models::{timestamp_from_secs, IndexJob, JobStatus};
use crate::worker::WorkerId;

/// Upper bound on stored failure text, in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

const JOB_COLUMNS: &str =
    "id, status, requested_at, claimed_at, completed_at, worker_id, error_message";

/// Creates a new pending job.
pub async fn enqueue(pool: &SqlitePool) -> Result<IndexJob> {
    let now = Utc::now().timestamp();
    let row = sqlx::query(&format!(
        "INSERT INTO index_jobs (status, requested_at) VALUES ('pending', ?) RETURNING {}",
        JOB_COLUMNS
    ))
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create index job")?;

    job_from_row(&row)
}

pub async fn get_job(pool: &SqlitePool, id: i64) -> Result<Option<IndexJob>> {
    let row = sqlx::query(&format!("SELECT {} FROM index_jobs WHERE id = ?", JOB_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Claims the oldest pending job for `worker_id`, or returns `None` when the
/// queue is empty.
pub async fn claim_next(pool: &SqlitePool, worker_id: &WorkerId) -> Result<Option<IndexJob>> {
    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    // The UPDATE must be the first statement so the write lock is taken
    // before the pending row is chosen.
    let row = sqlx::query(&format!(
        r#"
        UPDATE index_jobs
        SET status = 'processing',
            claimed_at = ?,
            worker_id = ?,
            error_message = NULL
        WHERE status = 'pending'
          AND id = (
              SELECT id FROM index_jobs
              WHERE status = 'pending'
              ORDER BY requested_at ASC, id ASC
              LIMIT 1
          )
        RETURNING {}
        "#,
        JOB_COLUMNS
    ))
    .bind(now)
    .bind(worker_id.as_str())
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to claim index job")?;

    tx.commit().await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Moves a processing job to `completed`.
pub async fn mark_completed(pool: &SqlitePool, id: i64) -> Result<()> {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        UPDATE index_jobs
        SET status = 'completed',
            completed_at = ?,
            error_message = NULL
        WHERE id = ? AND status = 'processing'
        "#,
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(rejected_transition(pool, id, JobStatus::Completed).await);
    }
    Ok(())
}

/// Moves a processing job to `failed`, keeping at most
/// [`MAX_ERROR_MESSAGE_CHARS`] characters of `message`.
pub async fn mark_failed(pool: &SqlitePool, id: i64, message: &str) -> Result<()> {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        UPDATE index_jobs
        SET status = 'failed',
            completed_at = ?,
            error_message = ?
        WHERE id = ? AND status = 'processing'
        "#,
    )
    .bind(now)
    .bind(truncate_error_message(message))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(rejected_transition(pool, id, JobStatus::Failed).await);
    }
    Ok(())
}

/// Fails every job that has been `processing` for longer than `timeout`.
///
/// A worker that dies between claim and completion leaves its job behind;
/// this turns such jobs into inspectable failures instead of leaving them
/// orphaned. Returns the number of jobs swept.
pub async fn fail_stale_jobs(pool: &SqlitePool, timeout: Duration) -> Result<u64> {
    let now = Utc::now().timestamp();
    let cutoff = now.saturating_sub(i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX));
    let message = format!(
        "abandoned: job was not finished within {}s of being claimed",
        timeout.as_secs()
    );

    let result = sqlx::query(
        r#"
        UPDATE index_jobs
        SET status = 'failed',
            completed_at = ?,
            error_message = ?
        WHERE status = 'processing' AND claimed_at <= ?
        "#,
    )
    .bind(now)
    .bind(truncate_error_message(&message))
    .bind(cutoff)
    .execute(pool)
    .await
    .context("Failed to sweep stale index jobs")?;

    Ok(result.rows_affected())
}

pub fn truncate_error_message(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

async fn rejected_transition(pool: &SqlitePool, id: i64, target: JobStatus) -> anyhow::Error {
    match get_job(pool, id).await {
        Ok(Some(job)) if job.status.is_terminal() => anyhow::anyhow!(
            "index job {} is already {} and cannot move to {}",
            id,
            job.status,
            target
        ),
        Ok(Some(job)) => anyhow::anyhow!(
            "index job {} cannot move from {} to {}",
            id,
            job.status,
            target
        ),
        Ok(None) => anyhow::anyhow!("index job not found: {}", id),
        Err(e) => e.context(format!("index job {} could not be moved to {}", id, target)),
    }
}

fn job_from_row(row: &SqliteRow) -> Result<IndexJob> {
    let status: String = row.get("status");
    let requested_at: i64 = row.get("requested_at");
    let claimed_at: Option<i64> = row.get("claimed_at");
    let completed_at: Option<i64> = row.get("completed_at");

    Ok(IndexJob {
        id: row.get("id"),
        status: status.parse()?,
        requested_at: timestamp_from_secs(requested_at)?,
        claimed_at: claimed_at.map(timestamp_from_secs).transpose()?,
        completed_at: completed_at.map(timestamp_from_secs).transpose()?,
        worker_id: row.get("worker_id"),
        error_message: row.get("error_message"),
    })
}

/// CLI entry point for `codex enqueue`.
pub async fn run_enqueue(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let job = enqueue(&pool).await?;
    pool.close().await;

    println!("enqueued index job {}", job.id);
    println!("  status:       {}", job.status);
    println!("  requested_at: {}", job.requested_at.to_rfc3339());
    Ok(())
}

/// CLI entry point for `codex job <id>`.
pub async fn run_job(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let job = get_job(&pool, id).await?;
    pool.close().await;

    let Some(job) = job else {
        bail!("index job not found: {}", id);
    };

    println!("id:           {}", job.id);
    println!("status:       {}", job.status);
    println!("requested_at: {}", job.requested_at.to_rfc3339());
    if let Some(ts) = job.claimed_at {
        println!("claimed_at:   {}", ts.to_rfc3339());
    }
    if let Some(ts) = job.completed_at {
        println!("completed_at: {}", ts.to_rfc3339());
    }
    if let Some(ref worker) = job.worker_id {
        println!("worker_id:    {}", worker);
    }
    if let Some(ref message) = job.error_message {
        println!("error:        {}", message);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_kept_whole() {
        assert_eq!(truncate_error_message("boom"), "boom");
    }

    #[test]
    fn test_long_message_truncated_to_limit() {
        let long = "x".repeat(MAX_ERROR_MESSAGE_CHARS + 250);
        assert_eq!(
            truncate_error_message(&long).chars().count(),
            MAX_ERROR_MESSAGE_CHARS
        );
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let long = "é".repeat(MAX_ERROR_MESSAGE_CHARS + 1);
        let truncated = truncate_error_message(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_MESSAGE_CHARS);
        assert_eq!(truncated.len(), MAX_ERROR_MESSAGE_CHARS * 2);
    }
}
