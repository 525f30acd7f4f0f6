//! Import history service
//!
//! Stores recent import batches in memory with file-backed persistence
//! so history survives worker restarts.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const MAX_HISTORY_SIZE: usize = 100;
const HISTORY_FILE: &str = "logs/import-history.json";

/// One recorded import batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryEntry {
    pub id: Uuid,
    pub list_id: Uuid,
    pub customer_id: Uuid,
    /// "csv" or "database"
    pub source: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub created_count: i64,
    pub updated_count: i64,
    pub error: Option<String>,
    pub details: Option<String>,
}

/// Response for listing import history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryResponse {
    pub imports: Vec<ImportHistoryEntry>,
    pub total: usize,
}

/// Import history storage backed by an in-memory deque + JSON file on disk.
pub struct ImportHistoryService {
    history: Arc<RwLock<VecDeque<ImportHistoryEntry>>>,
}

impl ImportHistoryService {
    pub fn new() -> Self {
        let mut deque = VecDeque::with_capacity(MAX_HISTORY_SIZE);
        if let Some(loaded) = Self::load_from_disk() {
            for entry in loaded {
                deque.push_back(entry);
            }
            info!("Loaded {} import history entries from disk", deque.len());
        }
        Self {
            history: Arc::new(RwLock::new(deque)),
        }
    }

    /// Record a processed batch
    #[allow(clippy::too_many_arguments)]
    pub fn record_batch(
        &self,
        id: Uuid,
        list_id: Uuid,
        customer_id: Uuid,
        source: &str,
        status: &str,
        started_at: DateTime<Utc>,
        created_count: i64,
        updated_count: i64,
        details: Option<String>,
    ) {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;

        let entry = ImportHistoryEntry {
            id,
            list_id,
            customer_id,
            source: source.to_string(),
            status: status.to_string(),
            started_at,
            completed_at,
            duration_ms,
            created_count,
            updated_count,
            error: None,
            details,
        };

        self.add_entry(entry);
    }

    /// Record a failed batch
    pub fn record_failed(
        &self,
        id: Uuid,
        list_id: Uuid,
        customer_id: Uuid,
        source: &str,
        started_at: DateTime<Utc>,
        error: String,
    ) {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;

        let entry = ImportHistoryEntry {
            id,
            list_id,
            customer_id,
            source: source.to_string(),
            status: "failed".to_string(),
            started_at,
            completed_at,
            duration_ms,
            created_count: 0,
            updated_count: 0,
            error: Some(error),
            details: None,
        };

        self.add_entry(entry);
    }

    fn add_entry(&self, entry: ImportHistoryEntry) {
        let mut history = self.history.write();

        if history.len() >= MAX_HISTORY_SIZE {
            history.pop_back();
        }

        history.push_front(entry);

        Self::save_to_disk(&history);
    }

    /// Recent batches across all customers
    pub fn get_recent(&self, limit: usize) -> ImportHistoryResponse {
        let history = self.history.read();
        let imports: Vec<ImportHistoryEntry> = history.iter().take(limit).cloned().collect();
        let total = history.len();

        ImportHistoryResponse { imports, total }
    }

    /// Recent batches for one customer (multi-tenant safe)
    pub fn get_recent_for_customer(&self, customer_id: Uuid, limit: usize) -> ImportHistoryResponse {
        let history = self.history.read();
        let imports: Vec<ImportHistoryEntry> = history
            .iter()
            .filter(|entry| entry.customer_id == customer_id)
            .take(limit)
            .cloned()
            .collect();
        let total = imports.len();

        ImportHistoryResponse { imports, total }
    }

    /// Recent batches for one list
    pub fn get_recent_for_list(&self, list_id: Uuid, limit: usize) -> ImportHistoryResponse {
        let history = self.history.read();
        let imports: Vec<ImportHistoryEntry> = history
            .iter()
            .filter(|entry| entry.list_id == list_id)
            .take(limit)
            .cloned()
            .collect();
        let total = imports.len();

        ImportHistoryResponse { imports, total }
    }

    fn load_from_disk() -> Option<Vec<ImportHistoryEntry>> {
        let path = Path::new(HISTORY_FILE);
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Vec<ImportHistoryEntry>>(&content) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    warn!("Failed to parse import history file: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read import history file: {}", e);
                None
            }
        }
    }

    fn save_to_disk(history: &VecDeque<ImportHistoryEntry>) {
        let path = Path::new(HISTORY_FILE);
        if let Some(dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Failed to create import history directory: {}", e);
                return;
            }
        }
        let entries: Vec<&ImportHistoryEntry> = history.iter().collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("Failed to write import history file: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize import history: {}", e),
        }
    }
}

impl Default for ImportHistoryService {
    fn default() -> Self {
        Self::new()
    }
}

// Global instance for easy access
lazy_static::lazy_static! {
    pub static ref IMPORT_HISTORY: ImportHistoryService = ImportHistoryService::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_service() -> ImportHistoryService {
        ImportHistoryService {
            history: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_HISTORY_SIZE))),
        }
    }

    #[test]
    fn test_record_batch() {
        let service = fresh_service();
        let id = Uuid::new_v4();
        let list_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let started_at = Utc::now() - chrono::Duration::seconds(5);

        service.record_batch(
            id,
            list_id,
            customer_id,
            "csv",
            "completed",
            started_at,
            10,
            2,
            Some("page 1".to_string()),
        );

        let history = service.get_recent(10);
        assert_eq!(history.imports.len(), 1);
        assert_eq!(history.imports[0].id, id);
        assert_eq!(history.imports[0].status, "completed");
        assert_eq!(history.imports[0].created_count, 10);
        assert_eq!(history.imports[0].updated_count, 2);
    }

    #[test]
    fn test_record_failed_batch() {
        let service = fresh_service();
        let id = Uuid::new_v4();
        let started_at = Utc::now();

        service.record_failed(
            id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            "database",
            started_at,
            "Connection timeout".to_string(),
        );

        let history = service.get_recent(10);
        assert_eq!(history.imports.len(), 1);
        assert_eq!(history.imports[0].status, "failed");
        assert_eq!(history.imports[0].error, Some("Connection timeout".to_string()));
    }

    #[test]
    fn test_history_limit() {
        let service = fresh_service();
        let list_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();

        for i in 0..150 {
            service.record_batch(
                Uuid::new_v4(),
                list_id,
                customer_id,
                "csv",
                "completed",
                Utc::now(),
                i,
                0,
                None,
            );
        }

        let history = service.get_recent(200);
        assert_eq!(history.imports.len(), MAX_HISTORY_SIZE);
    }

    #[test]
    fn test_get_recent_for_list_filters() {
        let service = fresh_service();
        let customer_id = Uuid::new_v4();
        let list_a = Uuid::new_v4();
        let list_b = Uuid::new_v4();

        service.record_batch(Uuid::new_v4(), list_a, customer_id, "csv", "completed", Utc::now(), 1, 0, None);
        service.record_batch(Uuid::new_v4(), list_b, customer_id, "csv", "completed", Utc::now(), 1, 0, None);
        service.record_batch(Uuid::new_v4(), list_a, customer_id, "database", "halted", Utc::now(), 2, 0, None);

        let history = service.get_recent_for_list(list_a, 10);
        assert_eq!(history.imports.len(), 2);
        assert!(history.imports.iter().all(|entry| entry.list_id == list_a));
    }

    #[test]
    fn test_get_recent_for_customer_isolates_customers() {
        let service = fresh_service();
        let customer_a = Uuid::new_v4();
        let customer_b = Uuid::new_v4();

        service.record_batch(Uuid::new_v4(), Uuid::new_v4(), customer_a, "csv", "completed", Utc::now(), 1, 0, None);
        service.record_batch(Uuid::new_v4(), Uuid::new_v4(), customer_b, "csv", "completed", Utc::now(), 1, 0, None);
        service.record_batch(Uuid::new_v4(), Uuid::new_v4(), customer_a, "database", "completed", Utc::now(), 3, 1, None);

        let history_a = service.get_recent_for_customer(customer_a, 50);
        assert_eq!(history_a.imports.len(), 2);
        assert!(history_a.imports.iter().all(|entry| entry.customer_id == customer_a));

        let history_b = service.get_recent_for_customer(customer_b, 50);
        assert_eq!(history_b.imports.len(), 1);
    }
}
