use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeywordError {
    #[error("keyword must not be empty")]
    EmptyKeyword,

    #[error("Value for keyword '{keyword}' must be an integer. Skipping this entry.")]
    InvalidValue { keyword: String, value: String },

    #[error("expected KEYWORD=VALUE, got '{0}'")]
    MalformedAssignment(String),

    #[error("line {line}: expected 2 fields (keyword,value), found {fields}")]
    MalformedRow { line: u64, fields: usize },

    #[error("subtotal for keyword '{keyword}' overflows")]
    Overflow { keyword: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    pub value: i64,
}

/// Keywords in entry order. Terms are unique; re-inserting a term updates
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordTable {
    entries: Vec<Keyword>,
}

impl KeywordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from raw `(keyword, value)` cells.
    ///
    /// Blank rows are dropped without comment. Rows whose value is not an
    /// integer are dropped and returned as errors so the caller can warn.
    pub fn from_rows<I, K, V>(rows: I) -> (Self, Vec<KeywordError>)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = Self::new();
        let mut errors = Vec::new();

        for (keyword, value) in rows {
            let keyword = keyword.as_ref().trim();
            let value = value.as_ref().trim();

            if keyword.is_empty() || value.is_empty() {
                continue;
            }

            match value.parse::<i64>() {
                Ok(value) => table.insert(keyword, value),
                Err(_) => errors.push(KeywordError::InvalidValue {
                    keyword: keyword.to_string(),
                    value: value.to_string(),
                }),
            }
        }

        (table, errors)
    }

    pub fn insert(&mut self, term: impl Into<String>, value: i64) {
        let term = term.into();
        match self.entries.iter_mut().find(|k| k.term == term) {
            Some(existing) => existing.value = value,
            None => self.entries.push(Keyword { term, value }),
        }
    }

    pub fn remove(&mut self, term: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|k| k.term != term);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, term: &str) -> Option<i64> {
        self.entries.iter().find(|k| k.term == term).map(|k| k.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a `term=value` command-line assignment at its last `=`.
pub fn parse_assignment(input: &str) -> Result<(String, String), KeywordError> {
    let (term, value) = input
        .rsplit_once('=')
        .ok_or_else(|| KeywordError::MalformedAssignment(input.to_string()))?;

    if term.trim().is_empty() {
        return Err(KeywordError::EmptyKeyword);
    }

    Ok((term.to_string(), value.to_string()))
}

/// Keyword table persisted as headerless `keyword,value` CSV.
pub struct KeywordStore {
    path: PathBuf,
}

impl KeywordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_rows(&self) -> Result<Vec<(String, String)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("Failed to read keyword row")?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            if record.len() != 2 {
                return Err(KeywordError::MalformedRow {
                    line,
                    fields: record.len(),
                }
                .into());
            }

            rows.push((record[0].to_string(), record[1].to_string()));
        }

        Ok(rows)
    }

    pub fn load(&self) -> Result<(KeywordTable, Vec<KeywordError>)> {
        let rows = self.load_rows()?;
        Ok(KeywordTable::from_rows(rows))
    }

    /// Load the stored table, warning about anything unusable and falling
    /// back to an empty table if the file can't be read.
    pub fn load_or_default(&self) -> KeywordTable {
        match self.load() {
            Ok((table, errors)) => {
                for error in errors {
                    warn!("{}", error);
                }
                table
            }
            Err(e) => {
                warn!(
                    "Could not load keywords from {}: {:#}. Starting with empty table.",
                    self.path.display(),
                    e
                );
                KeywordTable::new()
            }
        }
    }

    pub fn save(&self, table: &KeywordTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)
            .with_context(|| format!("Could not save keywords to {}", self.path.display()))?;

        for keyword in table.iter().filter(|k| !k.term.trim().is_empty()) {
            let value = keyword.value.to_string();
            writer.write_record([keyword.term.as_str(), value.as_str()])?;
        }
        writer.flush()?;

        info!("Saved {} keywords to {}", table.len(), self.path.display());
        Ok(())
    }
}
