// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small shared helpers: time, string lists, paths, JSON files, URLs.

use crate::error::{GobjError, MsgSet};
use std::path::{Path, PathBuf};

/// Milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Split on any of `separators`, trimming whitespace and dropping empties.
pub fn split_list(s: &str, separators: &str) -> Vec<String> {
    s.split(|c| separators.contains(c))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join non-empty items with `sep`.
pub fn join_list(items: &[String], sep: &str) -> String {
    items.iter().filter(|s| !s.is_empty()).cloned().collect::<Vec<_>>().join(sep)
}

/// Join path segments, skipping empties.
pub fn build_path(segments: &[&str]) -> PathBuf {
    let mut path = PathBuf::new();
    for seg in segments {
        if !seg.is_empty() {
            path.push(seg);
        }
    }
    path
}

/// Create every missing parent directory of `path`.
pub fn mkrdir(path: &Path) -> Result<(), GobjError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn save_json_to_file(path: &Path, value: &serde_json::Value) -> Result<(), GobjError> {
    mkrdir(path)?;
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Read a JSON file. Missing file is a SystemError, bad content a JsonError.
pub fn load_json_from_file(path: &Path) -> Result<serde_json::Value, GobjError> {
    let text = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&text)?;
    Ok(value)
}

/// Decomposed `schema://host[:port][/path]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub schema: String,
    pub host: String,
    /// 0 when the URL carries no port.
    pub port: u16,
    /// Always starts with `/`.
    pub path: String,
    /// Schema ends in `s` (`tcps`, `https`, `wss`, ...).
    pub use_ssl: bool,
}

/// Parse `schema://host[:port][/path]`.
pub fn parse_url(url: &str) -> Result<UrlParts, GobjError> {
    let Some((schema, rest)) = url.split_once("://") else {
        let msg = format!("url without schema: {url:?}");
        tracing::error!(msgset = %MsgSet::ParameterError, url, "{msg}");
        return Err(GobjError::Parameter(msg));
    };
    if schema.is_empty() || rest.is_empty() {
        let msg = format!("bad url: {url:?}");
        tracing::error!(msgset = %MsgSet::ParameterError, url, "{msg}");
        return Err(GobjError::Parameter(msg));
    }
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => {
            let port: u16 = p.parse().map_err(|_| {
                let msg = format!("bad port in url: {url:?}");
                tracing::error!(msgset = %MsgSet::ParameterError, url, "{msg}");
                GobjError::Parameter(msg)
            })?;
            (h, port)
        }
        None => (authority, 0),
    };
    if host.is_empty() {
        let msg = format!("url without host: {url:?}");
        tracing::error!(msgset = %MsgSet::ParameterError, url, "{msg}");
        return Err(GobjError::Parameter(msg));
    }
    Ok(UrlParts {
        schema: schema.to_string(),
        host: host.to_string(),
        port,
        path: path.to_string(),
        use_ssl: schema.ends_with('s'),
    })
}

#[cfg(test)]
#[path = "helpers_tests.rs"]
mod tests;
