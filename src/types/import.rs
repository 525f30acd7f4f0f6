//! Wire types for the subscriber import pipeline

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a single import log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportLogLevel {
    Info,
    Success,
    Error,
}

/// One line of the per-batch import log shown to the customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLogEntry {
    #[serde(rename = "type")]
    pub level: ImportLogLevel,
    pub message: String,
    /// Whether this entry advanced the imported-rows counter
    pub counter: bool,
}

impl ImportLogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ImportLogLevel::Info,
            message: message.into(),
            counter: false,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: ImportLogLevel::Success,
            message: message.into(),
            counter: true,
        }
    }

    pub fn error(message: impl Into<String>, counter: bool) -> Self {
        Self {
            level: ImportLogLevel::Error,
            message: message.into(),
            counter,
        }
    }
}

/// Client-carried batch cursor. The worker never stores import progress;
/// each batch request echoes the cursor returned by the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorAttributes {
    /// 1-based page to process next
    pub current_page: i64,
    /// Total source rows, computed on the first batch and carried forward
    pub rows_count: Option<i64>,
    pub is_first_batch: bool,
}

impl Default for CursorAttributes {
    fn default() -> Self {
        Self {
            current_page: 1,
            rows_count: None,
            is_first_batch: true,
        }
    }
}

// =============================================================================
// FILE STAGING
// =============================================================================

/// Request to stage an uploaded CSV for batched import
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFileRequest {
    pub list_id: Uuid,
    pub file_name: String,
    /// Base64-encoded file content
    pub content: String,
}

/// Response carrying the staged file name used by subsequent batch calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedFileResponse {
    pub file_name: String,
    pub size_bytes: i64,
}

/// Request to move a previously staged CSV into the background import queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueFileRequest {
    pub list_id: Uuid,
    pub file_name: String,
}

/// Response carrying the queued file name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedFileResponse {
    pub file_name: String,
}

// =============================================================================
// CSV BATCH IMPORT
// =============================================================================

/// Request to process one batch of a staged CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvBatchRequest {
    pub list_id: Uuid,
    pub file_name: String,
    #[serde(default)]
    pub cursor: CursorAttributes,
    /// Source column to treat as the email address when no EMAIL header exists
    pub email_column: Option<String>,
    /// Per-request page size override
    pub page_size: Option<i64>,
}

// =============================================================================
// DATABASE IMPORT
// =============================================================================

/// Request to validate an external database query before importing from it.
/// List-scoped because synonym folding depends on the fields the list defines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCheckRequest {
    pub list_id: Uuid,
    pub connection_url: String,
    pub query: String,
    pub email_column: Option<String>,
}

/// Result of a database import pre-flight check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCheckResponse {
    /// Column names in query order
    pub columns: Vec<String>,
    /// Normalized tags in the same order
    pub tags: Vec<String>,
    pub rows_count: i64,
}

/// Request to process one batch of an external database query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbBatchRequest {
    pub list_id: Uuid,
    pub connection_url: String,
    pub query: String,
    #[serde(default)]
    pub cursor: CursorAttributes,
    pub email_column: Option<String>,
    pub page_size: Option<i64>,
}

// =============================================================================
// HISTORY
// =============================================================================

/// Request for recent import activity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryRequest {
    /// Restrict to one list; otherwise the requesting customer's imports
    #[serde(default)]
    pub list_id: Option<Uuid>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// =============================================================================
// BATCH PROGRESS
// =============================================================================

/// Response for one processed batch, CSV and database alike.
/// On the finishing call `finished` is true, counts are zero and the
/// row range collapses to `recordsCount`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatchProgress {
    pub finished: bool,
    pub imported_count: i64,
    pub created_count: i64,
    pub updated_count: i64,
    /// 1-based index of the first row in this batch
    pub row_start: i64,
    /// 1-based index of the last row in this batch
    pub row_end: i64,
    pub records_count: i64,
    pub cursor: CursorAttributes,
    pub import_log: Vec<ImportLogEntry>,
    /// Set when the session ended on a subscriber cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
