//! Core data models shared by the scanner, the synchronizer, the job queue
//! and the read-side accessors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of an [`IndexJob`]. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => anyhow::bail!("unknown index job status: '{}'", other),
        }
    }
}

/// A unit of indexing work as stored in `index_jobs`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexJob {
    pub id: i64,
    pub status: JobStatus,
    pub requested_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
}

/// A stored document row.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub content: String,
    pub checksum: String,
    pub updated_at: DateTime<Utc>,
}

/// One file observed by a scan pass. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDocument {
    /// Root-relative, `/`-separated.
    pub path: String,
    pub title: String,
    pub content: String,
    /// Lower-case hex SHA-256 of the file bytes.
    pub checksum: String,
}

/// Counts reported by one document sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub scanned: u64,
    pub upserted: u64,
    pub deleted: u64,
}

/// A ranked full-text match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub snippet: String,
    /// Higher is better.
    pub rank: f64,
}

/// Converts a stored Unix-seconds column into a UTC timestamp.
pub(crate) fn timestamp_from_secs(secs: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_stored_values() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_only_completed_and_failed_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
