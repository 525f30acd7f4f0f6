//! Import sources
//!
//! A source exposes a deterministic header, a total row count and idempotent
//! reads of the half-open row slice [offset, offset+limit). CSV files are
//! re-opened on every call; external database sources page the user query
//! with LIMIT/OFFSET, so row order stability is the query's responsibility.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Column, Executor, PgPool};
use tracing::debug;

use crate::services::import::error::ImportError;

/// One source row keyed by canonical tag, in source column order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    values: Vec<(String, String)>,
}

impl RawRecord {
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == tag)
            .map(|(_, value)| value.as_str())
    }

    /// Replace the value for a tag, or append it when absent
    pub fn set(&mut self, tag: &str, value: String) {
        match self.values.iter_mut().find(|(key, _)| key == tag) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((tag.to_string(), value)),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A paged, re-readable record source
#[async_trait]
pub trait ImportSource: Send {
    /// Raw column names in source order
    async fn header(&mut self) -> Result<Vec<String>, ImportError>;

    /// Total number of data rows
    async fn count_rows(&mut self) -> Result<i64, ImportError>;

    /// Rows in [offset, offset+limit), each parallel to the header
    async fn read_rows(&mut self, offset: i64, limit: i64)
        -> Result<Vec<Vec<String>>, ImportError>;
}

// =============================================================================
// CSV FILE SOURCE
// =============================================================================

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Pick the delimiter with the highest count in the first line. Ties and
/// delimiter-free lines fall back to the comma.
pub fn detect_delimiter(first_line: &str) -> u8 {
    let mut best = b',';
    let mut best_count = 0usize;
    for candidate in DELIMITER_CANDIDATES {
        let count = first_line.bytes().filter(|byte| *byte == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Staged CSV file source with delimiter auto-detection
pub struct CsvFileSource {
    path: PathBuf,
    delimiter: Option<u8>,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn open_file(&self) -> Result<File, ImportError> {
        File::open(&self.path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ImportError::SourceMissing(self.file_name())
            } else {
                ImportError::Source(format!("cannot open {}: {}", self.file_name(), err))
            }
        })
    }

    fn delimiter(&mut self) -> Result<u8, ImportError> {
        if let Some(delimiter) = self.delimiter {
            return Ok(delimiter);
        }
        let file = self.open_file()?;
        let mut first_line = String::new();
        BufReader::new(file)
            .read_line(&mut first_line)
            .map_err(|err| ImportError::Source(format!("cannot read {}: {}", self.file_name(), err)))?;
        let delimiter = detect_delimiter(&first_line);
        debug!("Detected CSV delimiter {:?} for {}", delimiter as char, self.file_name());
        self.delimiter = Some(delimiter);
        Ok(delimiter)
    }

    fn open_reader(&mut self) -> Result<csv::Reader<File>, ImportError> {
        let delimiter = self.delimiter()?;
        let file = self.open_file()?;
        Ok(csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(file))
    }

    fn read_error(&self, err: csv::Error) -> ImportError {
        ImportError::Source(format!("cannot parse {}: {}", self.file_name(), err))
    }
}

#[async_trait]
impl ImportSource for CsvFileSource {
    async fn header(&mut self) -> Result<Vec<String>, ImportError> {
        let mut reader = self.open_reader()?;
        let header = reader.headers().map_err(|err| self.read_error(err))?;
        Ok(header.iter().map(|name| name.to_string()).collect())
    }

    async fn count_rows(&mut self) -> Result<i64, ImportError> {
        let mut reader = self.open_reader()?;
        let mut count = 0i64;
        for record in reader.records() {
            record.map_err(|err| self.read_error(err))?;
            count += 1;
        }
        Ok(count)
    }

    async fn read_rows(
        &mut self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Vec<String>>, ImportError> {
        let mut reader = self.open_reader()?;
        let width = reader.headers().map_err(|err| self.read_error(err))?.len();

        let mut rows = Vec::new();
        let records = reader
            .records()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize);
        for record in records {
            let record = record.map_err(|err| self.read_error(err))?;
            // Pad short rows and drop extra cells so every row matches the header
            let mut row: Vec<String> = record.iter().take(width).map(|cell| cell.to_string()).collect();
            row.resize(width, String::new());
            rows.push(row);
        }
        Ok(rows)
    }
}

// =============================================================================
// EXTERNAL DATABASE SOURCE
// =============================================================================

/// A user-authored query against a user-supplied Postgres connection
pub struct DbQuerySource {
    pool: PgPool,
    query: String,
    header: Option<Vec<String>>,
}

impl DbQuerySource {
    /// Connect and keep the trimmed query for paging
    pub async fn connect(url: &str, query: &str) -> Result<Self, ImportError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(|err| ImportError::Source(format!("database connection failed: {}", err)))?;
        Ok(Self::with_pool(pool, query))
    }

    pub fn with_pool(pool: PgPool, query: &str) -> Self {
        Self {
            pool,
            query: query.trim().trim_end_matches(';').to_string(),
            header: None,
        }
    }
}

#[async_trait]
impl ImportSource for DbQuerySource {
    async fn header(&mut self) -> Result<Vec<String>, ImportError> {
        if let Some(ref header) = self.header {
            return Ok(header.clone());
        }
        let describe = (&self.pool)
            .describe(&self.query)
            .await
            .map_err(|err| ImportError::Source(format!("query validation failed: {}", err)))?;
        let header: Vec<String> = describe
            .columns
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        self.header = Some(header.clone());
        Ok(header)
    }

    async fn count_rows(&mut self) -> Result<i64, ImportError> {
        let sql = format!("SELECT COUNT(*) FROM ({}) AS import_source", self.query);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| ImportError::Source(format!("count query failed: {}", err)))
    }

    async fn read_rows(
        &mut self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Vec<String>>, ImportError> {
        let header = self.header().await?;
        let sql = format!(
            "SELECT to_jsonb(import_source) FROM ({}) AS import_source LIMIT $1 OFFSET $2",
            self.query
        );
        let rows: Vec<serde_json::Value> = sqlx::query_scalar(&sql)
            .bind(limit.max(0))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(|err| ImportError::Source(format!("row query failed: {}", err)))?;

        Ok(rows
            .iter()
            .map(|row| {
                header
                    .iter()
                    .map(|column| json_cell_to_string(row.get(column)))
                    .collect()
            })
            .collect())
    }
}

fn json_cell_to_string(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}
