//! TOML configuration for the indexer, worker and HTTP API.
//!
//! ```toml
//! [db]
//! path = "./data/codex.sqlite"
//!
//! [docs]
//! root = "./docs"
//!
//! [indexer]
//! poll_interval_secs = 2
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub docs: DocsConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where the documents live. The root is server-side configuration only;
/// job requests never carry a path.
#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    pub root: PathBuf,
    /// File extension of indexed documents, matched case-insensitively.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "md".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Jobs left in `processing` longer than this are failed as abandoned.
    /// `0` disables the sweep.
    #[serde(default = "default_stale_job_timeout_secs")]
    pub stale_job_timeout_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            stale_job_timeout_secs: default_stale_job_timeout_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    2
}
fn default_stale_job_timeout_secs() -> u64 {
    900
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stale_job_timeout(&self) -> Option<Duration> {
        match self.stale_job_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parses and validates configuration text. Every failure here is fatal at
/// startup.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    if config.docs.root.as_os_str().is_empty() {
        anyhow::bail!("docs.root must not be empty");
    }

    let extension = config.docs.extension.trim();
    if extension.is_empty() || extension.starts_with('.') {
        anyhow::bail!(
            "docs.extension must be a bare extension such as \"md\", got '{}'",
            config.docs.extension
        );
    }

    if config.indexer.poll_interval_secs < 1 {
        anyhow::bail!("indexer.poll_interval_secs must be at least 1");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "/tmp/codex.sqlite"

[docs]
root = "/srv/docs"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.docs.extension, "md");
        assert_eq!(config.indexer.poll_interval_secs, 2);
        assert_eq!(config.indexer.poll_interval(), Duration::from_secs(2));
        assert_eq!(
            config.indexer.stale_job_timeout(),
            Some(Duration::from_secs(900))
        );
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let text = format!("{}\n[indexer]\npoll_interval_secs = 0\n", MINIMAL);
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn test_negative_poll_interval_rejected() {
        let text = format!("{}\n[indexer]\npoll_interval_secs = -3\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_missing_docs_root_rejected() {
        let text = r#"
[db]
path = "/tmp/codex.sqlite"
"#;
        assert!(parse_config(text).is_err());
    }

    #[test]
    fn test_empty_docs_root_rejected() {
        let text = r#"
[db]
path = "/tmp/codex.sqlite"

[docs]
root = ""
"#;
        let err = parse_config(text).unwrap_err();
        assert!(err.to_string().contains("docs.root"));
    }

    #[test]
    fn test_dotted_extension_rejected() {
        let text = format!("{}extension = \".md\"\n", MINIMAL);
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("docs.extension"));
    }

    #[test]
    fn test_zero_stale_timeout_disables_sweep() {
        let text = format!("{}\n[indexer]\nstale_job_timeout_secs = 0\n", MINIMAL);
        let config = parse_config(&text).unwrap();
        assert_eq!(config.indexer.stale_job_timeout(), None);
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config(Path::new("/definitely/not/here/codex.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
