//! Full-text search over indexed documents.
//!
//! Queries the `documents_fts` FTS5 index (title and content) and ranks
//! matches with BM25. Free text is split into quoted terms that must all
//! match, so punctuation in user input never reaches the FTS5 query parser
//! as syntax.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::SearchHit;

pub const MAX_QUERY_CHARS: usize = 500;
pub const MIN_LIMIT: i64 = 1;
pub const MAX_LIMIT: i64 = 50;
pub const DEFAULT_LIMIT: i64 = 10;

/// Validated search input.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Trimmed user text.
    pub text: String,
    /// Clamped to `[MIN_LIMIT, MAX_LIMIT]`.
    pub limit: i64,
}

impl SearchQuery {
    pub fn new(text: &str, limit: i64) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            bail!("query must not be empty");
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            bail!("query must be at most {} characters", MAX_QUERY_CHARS);
        }

        Ok(Self {
            text: text.to_string(),
            limit: limit.clamp(MIN_LIMIT, MAX_LIMIT),
        })
    }
}

/// Turns free text into an FTS5 expression of quoted terms.
fn to_fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|term| term.replace('"', ""))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Ranked matches, best first; equal ranks are ordered by path.
pub async fn search_documents(pool: &SqlitePool, query: &SearchQuery) -> Result<Vec<SearchHit>> {
    let Some(fts_query) = to_fts_query(&query.text) else {
        return Ok(Vec::new());
    };

    let rows = sqlx::query(
        r#"
        SELECT d.id, d.path, d.title,
               snippet(documents_fts, 1, '<mark>', '</mark>', ' ... ', 18) AS snippet,
               bm25(documents_fts) AS score
        FROM documents_fts
        JOIN documents d ON d.id = documents_fts.rowid
        WHERE documents_fts MATCH ?
        ORDER BY score ASC, d.path ASC
        LIMIT ?
        "#,
    )
    .bind(&fts_query)
    .bind(query.limit)
    .fetch_all(pool)
    .await?;

    let hits = rows
        .iter()
        .map(|row| {
            let score: f64 = row.get("score");
            let title: String = row.get("title");
            let snippet: String = row.get("snippet");
            SearchHit {
                id: row.get("id"),
                path: row.get("path"),
                // Title-only matches on empty documents have no content snippet
                snippet: if snippet.trim().is_empty() {
                    title.clone()
                } else {
                    snippet
                },
                title,
                rank: -score, // negate so higher = better
            }
        })
        .collect();

    Ok(hits)
}

/// CLI entry point for `codex search`.
pub async fn run_search(config: &Config, text: &str, limit: i64) -> Result<()> {
    let query = SearchQuery::new(text, limit)?;
    let pool = db::connect(config).await?;
    let hits = search_documents(&pool, &query).await?;
    pool.close().await;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.rank, hit.title);
        println!("    path: {}", hit.path);
        println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
        println!("    id: {}", hit.id);
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_trimmed() {
        let q = SearchQuery::new("  rust borrow  ", 10).unwrap();
        assert_eq!(q.text, "rust borrow");
    }

    #[test]
    fn test_empty_query_rejected() {
        let err = SearchQuery::new("   ", 10).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_overlong_query_rejected() {
        assert!(SearchQuery::new(&"a".repeat(MAX_QUERY_CHARS + 1), 10).is_err());
        assert!(SearchQuery::new(&"a".repeat(MAX_QUERY_CHARS), 10).is_ok());
    }

    #[test]
    fn test_limit_clamped() {
        assert_eq!(SearchQuery::new("x", 0).unwrap().limit, 1);
        assert_eq!(SearchQuery::new("x", 500).unwrap().limit, 50);
        assert_eq!(SearchQuery::new("x", 7).unwrap().limit, 7);
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(
            to_fts_query("deploy AND \"k8s\" -x").unwrap(),
            "\"deploy\" \"AND\" \"k8s\" \"-x\""
        );
    }

    #[test]
    fn test_fts_query_of_only_quotes_is_none() {
        assert_eq!(to_fts_query("\"\" \""), None);
    }
}
