//! Built-in defaults shared by configuration and handlers

/// Rows processed per batch request unless the request overrides it
pub const DEFAULT_IMPORT_PAGE_SIZE: i64 = 100;

/// Where staged uploads live until their import session completes
pub const DEFAULT_STORAGE_DIR: &str = "storage/imports";

/// Where queued files wait for background processing
pub const DEFAULT_QUEUE_DIR: &str = "storage/import-queue";
