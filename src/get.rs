//! Document retrieval by ID.
//!
//! Used by both the `codex get` CLI command and `GET /api/documents/{id}`.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::{timestamp_from_secs, Document};

pub async fn get_document(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
    let row = sqlx::query(
        "SELECT id, path, title, content, checksum, updated_at FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let updated_at: i64 = row.get("updated_at");
    Ok(Some(Document {
        id: row.get("id"),
        path: row.get("path"),
        title: row.get("title"),
        content: row.get("content"),
        checksum: row.get("checksum"),
        updated_at: timestamp_from_secs(updated_at)?,
    }))
}

/// Looks a document up by its normalized path.
pub async fn get_document_by_path(pool: &SqlitePool, path: &str) -> Result<Option<Document>> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE path = ?")
        .bind(path)
        .fetch_optional(pool)
        .await?;

    match id {
        Some(id) => get_document(pool, id).await,
        None => Ok(None),
    }
}

/// CLI entry point: prints the document to stdout.
pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let doc = get_document(&pool, id).await?;
    pool.close().await;

    let Some(doc) = doc else {
        bail!("document not found: {}", id);
    };

    println!("--- Document ---");
    println!("id:         {}", doc.id);
    println!("path:       {}", doc.path);
    println!("title:      {}", doc.title);
    println!("checksum:   {}", doc.checksum);
    println!("updated_at: {}", doc.updated_at.format("%Y-%m-%dT%H:%M:%SZ"));
    println!();
    println!("--- Content ---");
    println!("{}", doc.content);

    Ok(())
}
