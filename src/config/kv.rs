//! Line-based `key=value` documents.
//!
//! Both `app.conf` and `modpack.conf` use this format: one entry per line,
//! exactly one `=` per entry. Blank lines and `#` comments are ignored.
//! Malformed lines never abort parsing; they are collected in
//! [`KvDocument::rejected`] so callers can report them.

use anyhow::{Context, Result};
use camino::Utf8Path;
use indexmap::IndexMap;
use std::fs;
use thiserror::Error;

/// Why a single line was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("missing '=' separator")]
    MissingSeparator,

    #[error("more than one '=' separator")]
    ExtraSeparator,

    #[error("empty key")]
    EmptyKey,

    #[error("duplicate key '{0}'")]
    DuplicateKey(String),

    #[error("'=' is not allowed in keys or values")]
    ContainsSeparator,

    #[error("line breaks are not allowed in keys or values")]
    ContainsLineBreak,

    #[error("keys cannot start with '#'")]
    CommentKey,
}

/// A line that could not be turned into an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number in the source text
    pub line_number: usize,
    pub content: String,
    pub reason: LineError,
}

/// Parsed `key=value` document, entries in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvDocument {
    pub entries: IndexMap<String, String>,
    pub rejected: Vec<RejectedLine>,
}

impl KvDocument {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Log every rejected line at warn level.
    pub fn log_rejected(&self, source: &Utf8Path) {
        for rejected in &self.rejected {
            tracing::warn!(
                "Invalid configuration line {}:{}: '{}' ({})",
                source,
                rejected.line_number,
                rejected.content,
                rejected.reason
            );
        }
    }
}

/// Split a single line into a trimmed `(key, value)` pair.
pub fn parse_line(line: &str) -> Result<(String, String), LineError> {
    let mut parts = line.split('=');
    let key = parts.next().unwrap_or_default();
    let value = parts.next().ok_or(LineError::MissingSeparator)?;

    if parts.next().is_some() {
        return Err(LineError::ExtraSeparator);
    }

    let key = key.trim();
    if key.is_empty() {
        return Err(LineError::EmptyKey);
    }

    Ok((key.to_string(), value.trim().to_string()))
}

/// Check that `key=value` renders to a line that parses back to the same pair.
pub fn check_entry(key: &str, value: &str) -> Result<(), LineError> {
    if key.trim().is_empty() {
        return Err(LineError::EmptyKey);
    }
    if key.trim_start().starts_with('#') {
        return Err(LineError::CommentKey);
    }
    for part in [key, value] {
        if part.contains(['\n', '\r']) {
            return Err(LineError::ContainsLineBreak);
        }
        if part.contains('=') {
            return Err(LineError::ContainsSeparator);
        }
    }
    Ok(())
}

/// Parse a whole document. Never fails; bad lines end up in `rejected`.
pub fn parse_document(text: &str) -> KvDocument {
    let mut document = KvDocument::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let reject = |reason| RejectedLine {
            line_number: index + 1,
            content: line.to_string(),
            reason,
        };

        match parse_line(line) {
            Ok((key, value)) => {
                if document.entries.contains_key(&key) {
                    let rejected = reject(LineError::DuplicateKey(key));
                    document.rejected.push(rejected);
                } else {
                    document.entries.insert(key, value);
                }
            }
            Err(reason) => document.rejected.push(reject(reason)),
        }
    }

    document
}

/// Render entries as `key=value\n` lines.
pub fn render<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    entries
        .into_iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
}

/// Read and parse a `key=value` file.
pub fn read_kv_file(path: &Utf8Path) -> Result<KvDocument> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path))?;
    Ok(parse_document(&text))
}

/// Create or overwrite a `key=value` file.
///
/// Nothing is written if any entry would not read back unchanged.
pub fn write_kv_file<'a, I>(path: &Utf8Path, entries: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let entries: Vec<(&str, &str)> = entries.into_iter().collect();
    for (key, value) in &entries {
        check_entry(key, value)
            .with_context(|| format!("Cannot write '{}' to {}", key, path))?;
    }

    fs::write(path, render(entries))
        .with_context(|| format!("Failed to write config file: {}", path))?;

    tracing::info!("Wrote config file {}", path);
    Ok(())
}
