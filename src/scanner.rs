//! Filesystem scanner.
//!
//! Walks the docs root, reads every file with the configured extension and
//! turns it into a [`ScannedDocument`]: root-relative `/`-separated path,
//! SHA-256 checksum of the exact bytes, UTF-8 content and a derived title.
//!
//! A scan is all-or-nothing. The first unreadable or undecodable file aborts
//! it and no partial result is returned.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::models::ScannedDocument;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("docs root does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("failed to walk docs root: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid UTF-8: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("{} has a path that is not valid UTF-8", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("scan cancelled before all documents were read")]
    Cancelled,

    #[error("scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Runs [`scan_directory`] on the blocking pool so file I/O never stalls the
/// async runtime.
pub async fn scan(
    root: PathBuf,
    extension: String,
    cancel: CancellationToken,
) -> Result<Vec<ScannedDocument>, ScanError> {
    tokio::task::spawn_blocking(move || scan_directory(&root, &extension, &cancel)).await?
}

/// Scans `root` recursively and returns its documents sorted by path.
pub fn scan_directory(
    root: &Path,
    extension: &str,
    cancel: &CancellationToken,
) -> Result<Vec<ScannedDocument>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::RootNotFound(root.to_path_buf()));
    }

    let mut files: Vec<(PathBuf, String)> = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), extension) {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let normalized = normalize_relative_path(relative)
            .ok_or_else(|| ScanError::NonUtf8Path(entry.path().to_path_buf()))?;
        files.push((entry.into_path(), normalized));
    }

    // Byte-wise order keeps repeated scans deterministic
    files.sort_by(|a, b| a.1.cmp(&b.1));

    let mut documents = Vec::with_capacity(files.len());
    for (full_path, relative_path) in files {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        documents.push(read_document(&full_path, relative_path)?);
    }

    Ok(documents)
}

fn read_document(full_path: &Path, relative_path: String) -> Result<ScannedDocument, ScanError> {
    // Checksum and content come from the same read
    let bytes = std::fs::read(full_path).map_err(|source| ScanError::Read {
        path: full_path.to_path_buf(),
        source,
    })?;
    let checksum = checksum_bytes(&bytes);
    let content = String::from_utf8(bytes).map_err(|source| ScanError::Decode {
        path: full_path.to_path_buf(),
        source,
    })?;
    let title = extract_title(&content, full_path);

    Ok(ScannedDocument {
        path: relative_path,
        title,
        content,
        checksum,
    })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Lower-case hex SHA-256 digest.
pub fn checksum_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Joins path components with `/` regardless of the host separator.
///
/// Returns `None` for paths that are not valid UTF-8; a lossy conversion
/// could map two distinct files onto the same stored path.
pub fn normalize_relative_path(relative: &Path) -> Option<String> {
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// First non-blank `#` heading, or the file stem when there is none.
pub fn extract_title(content: &str, path: &Path) -> String {
    for line in content.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('#') {
            continue;
        }

        let title = trimmed.trim_start_matches('#').trim();
        if !title.is_empty() {
            return title.to_string();
        }
    }

    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_title_from_first_heading() {
        let title = extract_title("# Title A\nbody", Path::new("a.md"));
        assert_eq!(title, "Title A");
    }

    #[test]
    fn test_title_skips_leading_text_and_blank_headings() {
        let content = "intro line\n\n   #   \n  ## Setup Guide  \n# Later";
        assert_eq!(extract_title(content, Path::new("x.md")), "Setup Guide");
    }

    #[test]
    fn test_title_falls_back_to_file_stem() {
        assert_eq!(extract_title("no heading here", Path::new("dir/b.md")), "b");
        assert_eq!(extract_title("", Path::new("notes.v2.MD")), "notes.v2");
    }

    #[test]
    fn test_title_handles_crlf() {
        assert_eq!(
            extract_title("\r\n# Windows Title\r\nbody\r\n", Path::new("w.md")),
            "Windows Title"
        );
    }

    #[test]
    fn test_checksum_is_lowercase_sha256() {
        assert_eq!(
            checksum_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_normalize_nested_path() {
        let relative: PathBuf = ["guides", "setup", "intro.md"].iter().collect();
        assert_eq!(
            normalize_relative_path(&relative).as_deref(),
            Some("guides/setup/intro.md")
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_file_name_aborts_scan() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.md"), "# Good").unwrap();
        fs::write(
            tmp.path().join(OsStr::from_bytes(b"bad\xff.md")),
            "# Bad name",
        )
        .unwrap();

        let err = scan_directory(tmp.path(), "md", &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, ScanError::NonUtf8Path(_)));
        assert!(normalize_relative_path(Path::new(OsStr::from_bytes(b"x\xfe.md"))).is_none());
    }

    #[test]
    fn test_missing_root_is_distinct_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let err = scan_directory(&missing, "md", &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_scan_filters_sorts_and_normalizes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("b.md"), "plain").unwrap();
        fs::write(root.join("A.MD"), "# Upper").unwrap();
        fs::write(root.join("sub/deeper/c.md"), "# Deep").unwrap();
        fs::write(root.join("skip.txt"), "# Not indexed").unwrap();

        let docs = scan_directory(root, "md", &CancellationToken::new()).unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["A.MD", "b.md", "sub/deeper/c.md"]);
        assert_eq!(docs[0].title, "Upper");
        assert_eq!(docs[1].title, "b");
        assert_eq!(docs[2].checksum, checksum_bytes(b"# Deep"));
    }

    #[test]
    fn test_scan_is_repeatable() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("one.md"), "# One").unwrap();
        fs::write(tmp.path().join("two.md"), "# Two").unwrap();

        let cancel = CancellationToken::new();
        let first = scan_directory(tmp.path(), "md", &cancel).unwrap();
        let second = scan_directory(tmp.path(), "md", &cancel).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_utf8_aborts_scan() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.md"), "# Good").unwrap();
        fs::write(tmp.path().join("bad.md"), [0xff, 0xfe, 0x00]).unwrap();

        let err = scan_directory(tmp.path(), "md", &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, ScanError::Decode { .. }));
    }

    #[test]
    fn test_cancelled_scan_returns_no_documents() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("one.md"), "# One").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = scan_directory(tmp.path(), "md", &cancel).unwrap_err();
        assert!(matches!(err, ScanError::Cancelled));
    }

    #[test]
    fn test_empty_root_scans_to_nothing() {
        let tmp = TempDir::new().unwrap();
        let docs = scan_directory(tmp.path(), "md", &CancellationToken::new()).unwrap();
        assert!(docs.is_empty());
    }
}
