//! Common utilities for ocrsegment
//!
//! Filesystem helpers shared by the ingestion, adapter and repair stages.

use std::io;
use std::path::{Path, PathBuf};

/// Create a directory and its parents if missing
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref();
    if !path.is_dir() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Check whether a directory has no entries
///
/// A missing directory counts as empty.
pub fn is_dir_empty<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(true);
    }
    Ok(std::fs::read_dir(path)?.next().is_none())
}

/// Regular files in `dir` whose name ends with `suffix`, sorted by name
///
/// A missing directory yields an empty list.
pub fn files_with_suffix<P: AsRef<Path>>(dir: P, suffix: &str) -> io::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(suffix))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// File name of a path as UTF-8, lossy
pub fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Split a configured command string with shell quoting rules
///
/// Quotes group words and are removed; unbalanced quotes are an error.
pub fn split_args(value: &str) -> Result<Vec<String>, shell_words::ParseError> {
    shell_words::split(value)
}

/// Format duration in human-readable format
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 3600 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    } else if secs >= 60 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        format!("{}m {}s", mins, remaining_secs)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}
