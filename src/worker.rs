//! Background indexing worker.
//!
//! One [`Worker`] runs one polling loop. Each iteration claims a job, scans
//! the docs root, syncs the scan into the document set and records the
//! outcome on the job. Every failure inside an iteration is logged and
//! followed by a poll-interval pause; only cancellation ends the loop.
//!
//! Several worker processes may share a database. They coordinate only
//! through [`jobs::claim_next`].

use anyhow::Result;
use sqlx::SqlitePool;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::jobs;
use crate::migrate;
use crate::models::{IndexJob, SyncSummary};
use crate::scanner;
use crate::sync;

/// Identifies the process that claimed a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `codex-indexer:<pid>:<random>`, unique per process instance.
    pub fn generate() -> Self {
        Self(format!(
            "codex-indexer:{}:{}",
            std::process::id(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a worker needs from configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub docs_root: PathBuf,
    pub extension: String,
    pub poll_interval: Duration,
    pub stale_job_timeout: Option<Duration>,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            docs_root: config.docs.root.clone(),
            extension: config.docs.extension.clone(),
            poll_interval: config.indexer.poll_interval(),
            stale_job_timeout: config.indexer.stale_job_timeout(),
        }
    }
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No pending job.
    Idle,
    Completed { job_id: i64, summary: SyncSummary },
    Failed { job_id: i64, message: String },
}

pub struct Worker {
    pool: SqlitePool,
    settings: WorkerSettings,
    worker_id: WorkerId,
}

impl Worker {
    pub fn new(pool: SqlitePool, settings: WorkerSettings, worker_id: WorkerId) -> Self {
        Self {
            pool,
            settings,
            worker_id,
        }
    }

    /// Polls until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            worker_id = %self.worker_id,
            docs_root = %self.settings.docs_root.display(),
            "indexer started"
        );

        while !cancel.is_cancelled() {
            match self.poll_once(&cancel).await {
                Ok(PollOutcome::Idle) => self.pause(&cancel).await,
                Ok(_) => {}
                Err(e) => {
                    let message = format!("{:#}", e);
                    error!(worker_id = %self.worker_id, error = %message, "unhandled error in polling loop");
                    self.pause(&cancel).await;
                }
            }
        }

        info!(worker_id = %self.worker_id, "indexer stopping");
    }

    /// Runs one iteration: sweep stale jobs, claim, index, record.
    ///
    /// Indexing failures are recorded on the job and reported as
    /// [`PollOutcome::Failed`]; only queue errors are returned as `Err`.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<PollOutcome> {
        if let Some(timeout) = self.settings.stale_job_timeout {
            let swept = jobs::fail_stale_jobs(&self.pool, timeout).await?;
            if swept > 0 {
                warn!(count = swept, "failed stale index jobs");
            }
        }

        let Some(job) = jobs::claim_next(&self.pool, &self.worker_id).await? else {
            debug!("no pending index jobs");
            return Ok(PollOutcome::Idle);
        };

        // The claim has committed; nothing below runs under a queue lock.
        info!(job_id = job.id, worker_id = %self.worker_id, "claimed index job");
        self.process(&job, cancel).await
    }

    async fn process(&self, job: &IndexJob, cancel: &CancellationToken) -> Result<PollOutcome> {
        match self.index(cancel).await {
            Ok(summary) => {
                jobs::mark_completed(&self.pool, job.id).await?;
                info!(
                    job_id = job.id,
                    scanned = summary.scanned,
                    upserted = summary.upserted,
                    deleted = summary.deleted,
                    "completed index job"
                );
                Ok(PollOutcome::Completed {
                    job_id: job.id,
                    summary,
                })
            }
            Err(e) => {
                let message = jobs::truncate_error_message(&format!("{:#}", e));
                jobs::mark_failed(&self.pool, job.id, &message).await?;
                error!(job_id = job.id, error = %message, "failed index job");
                Ok(PollOutcome::Failed {
                    job_id: job.id,
                    message,
                })
            }
        }
    }

    async fn index(&self, cancel: &CancellationToken) -> Result<SyncSummary> {
        let documents = scanner::scan(
            self.settings.docs_root.clone(),
            self.settings.extension.clone(),
            cancel.clone(),
        )
        .await?;
        debug!(count = documents.len(), "scanned documents");

        sync::sync_documents(&self.pool, &documents).await
    }

    async fn pause(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.settings.poll_interval) => {}
        }
    }
}

/// CLI entry point for `codex worker`.
///
/// With `once`, performs a single poll and exits; otherwise runs until
/// Ctrl-C.
pub async fn run_worker(config: &Config, once: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let worker = Worker::new(
        pool.clone(),
        WorkerSettings::from_config(config),
        WorkerId::generate(),
    );
    let cancel = CancellationToken::new();

    if once {
        match worker.poll_once(&cancel).await? {
            PollOutcome::Idle => println!("no pending index jobs"),
            PollOutcome::Completed { job_id, summary } => {
                println!("index job {} completed", job_id);
                println!("  scanned: {}", summary.scanned);
                println!("  upserted: {}", summary.upserted);
                println!("  deleted: {}", summary.deleted);
            }
            PollOutcome::Failed { job_id, message } => {
                println!("index job {} failed", job_id);
                println!("  error: {}", message);
            }
        }
        pool.close().await;
        return Ok(());
    }

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        shutdown.cancel();
    });

    worker.run(cancel).await;
    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_per_instance() {
        let a = WorkerId::generate();
        let b = WorkerId::generate();
        assert_ne!(a, b);
        assert!(a
            .as_str()
            .starts_with(&format!("codex-indexer:{}:", std::process::id())));
    }

    #[test]
    fn test_settings_follow_config() {
        let config = crate::config::parse_config(
            r#"
[db]
path = "/tmp/codex.sqlite"

[docs]
root = "/srv/docs"
extension = "markdown"

[indexer]
poll_interval_secs = 5
stale_job_timeout_secs = 0
"#,
        )
        .unwrap();
        let settings = WorkerSettings::from_config(&config);
        assert_eq!(settings.docs_root, PathBuf::from("/srv/docs"));
        assert_eq!(settings.extension, "markdown");
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.stale_job_timeout, None);
    }
}
