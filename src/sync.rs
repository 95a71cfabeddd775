//! Document synchronization.
//!
//! Reconciles one full scan with the `documents` table inside a single
//! transaction: rows are upserted only when their checksum changed, and rows
//! whose path was not scanned are deleted. Readers see either the state
//! before the sync or the state after it, never a mix.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{ScannedDocument, SyncSummary};

// The WHERE clause turns an unchanged document into a no-op, so it is not
// counted and its updated_at does not move.
const UPSERT_DOCUMENT_SQL: &str = r#"
    INSERT INTO documents (path, title, content, checksum, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT(path) DO UPDATE SET
        title = excluded.title,
        content = excluded.content,
        checksum = excluded.checksum,
        updated_at = excluded.updated_at
    WHERE documents.checksum IS NOT excluded.checksum
"#;

// An empty path list deletes every row: the docs root is empty.
const DELETE_MISSING_DOCUMENTS_SQL: &str = r#"
    DELETE FROM documents
    WHERE path NOT IN (SELECT value FROM json_each(?))
"#;

/// Applies a full scan to the document set and reports what changed.
///
/// The outcome depends only on the set of `(path, checksum)` pairs, not on
/// the order of `scanned`. Running it twice with the same input performs no
/// writes the second time.
pub async fn sync_documents(pool: &SqlitePool, scanned: &[ScannedDocument]) -> Result<SyncSummary> {
    let now = Utc::now().timestamp();
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin document sync")?;

    let mut upserted = 0u64;
    for doc in scanned {
        let result = sqlx::query(UPSERT_DOCUMENT_SQL)
            .bind(&doc.path)
            .bind(&doc.title)
            .bind(&doc.content)
            .bind(&doc.checksum)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert document {}", doc.path))?;
        upserted += result.rows_affected();
    }

    let paths: Vec<&str> = scanned.iter().map(|doc| doc.path.as_str()).collect();
    let paths_json = serde_json::to_string(&paths)?;
    let deleted = sqlx::query(DELETE_MISSING_DOCUMENTS_SQL)
        .bind(paths_json)
        .execute(&mut *tx)
        .await
        .context("Failed to delete missing documents")?
        .rows_affected();

    tx.commit().await.context("Failed to commit document sync")?;

    Ok(SyncSummary {
        scanned: scanned.len() as u64,
        upserted,
        deleted,
    })
}
