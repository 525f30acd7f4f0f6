//! Subscriber import message handlers
//!
//! Stage and queue move CSV files around on disk. Batch handlers open one
//! transaction per request, run the pipeline against it and commit on
//! success, so a failed batch can be retried with the same cursor.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use base64::Engine;
use chrono::Utc;
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::services::import::error::ImportError;
use crate::services::import::schema::FieldResolver;
use crate::services::import::source::{CsvFileSource, DbQuerySource};
use crate::services::import::store::{ImportStore, PgImportStore};
use crate::services::import::tags::normalize_header;
use crate::services::import::{BatchOutcome, ImportRunner};
use crate::services::import_history::IMPORT_HISTORY;
use crate::types::{
    CsvBatchRequest, DbBatchRequest, DbCheckRequest, DbCheckResponse, ErrorResponse,
    ImportBatchProgress, ImportHistoryRequest, ListContext, QueueFileRequest, QueuedFileResponse,
    Request, StageFileRequest, StagedFileResponse, SuccessResponse,
};

/// Failures a batch request can surface before or during the pipeline
#[derive(Debug, thiserror::Error)]
enum BatchError {
    #[error("list not found")]
    ListNotFound,
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Pool(#[from] sqlx::Error),
}

impl BatchError {
    fn code(&self) -> &'static str {
        match self {
            BatchError::ListNotFound => "LIST_NOT_FOUND",
            BatchError::Import(err) => err.error_code(),
            BatchError::Pool(_) => "DATABASE_ERROR",
        }
    }
}

/// Whether a batch failure invalidates the whole session, making the staged
/// file useless for retries
fn session_fatal(err: &BatchError) -> bool {
    matches!(
        err,
        BatchError::Import(
            ImportError::EmptyColumnName(_)
                | ImportError::ReservedColumns(_)
                | ImportError::MissingEmailColumn
        )
    )
}

/// File names come from clients; keep only the final component
fn safe_file_name(name: &str) -> Option<String> {
    let name = Path::new(name).file_name()?.to_string_lossy().into_owned();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn progress_from(outcome: BatchOutcome) -> ImportBatchProgress {
    ImportBatchProgress {
        finished: outcome.finished,
        imported_count: outcome.imported_count,
        created_count: outcome.created_count,
        updated_count: outcome.updated_count,
        row_start: outcome.row_start,
        row_end: outcome.row_end,
        records_count: outcome.records_count,
        cursor: outcome.cursor,
        import_log: outcome.log,
        message: outcome.halted_on.map(|cap| cap.message().to_string()),
    }
}

fn remove_staged_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove staged file {}: {}", path.display(), e);
        }
    }
}

// ==========================================================================
// CSV staging
// ==========================================================================

/// Handle import.csv.stage messages
///
/// Decodes the uploaded content and writes it under the storage directory
/// with a generated name the batch calls refer back to.
pub async fn handle_csv_stage(
    client: Client,
    mut subscriber: Subscriber,
    config: Arc<Config>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.csv.stage message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        // Parse request
        let request: Request<StageFileRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let content = match base64::engine::general_purpose::STANDARD
            .decode(&request.payload.content)
        {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to decode staged file content: {}", e);
                let error = ErrorResponse::new(request.id, "INVALID_FILE", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let file_name = format!("import-{}.csv", Uuid::new_v4());
        let path = config.storage_dir.join(&file_name);
        let stored = std::fs::create_dir_all(&config.storage_dir)
            .and_then(|_| std::fs::write(&path, &content));
        match stored {
            Ok(()) => {
                info!(
                    "Staged import file {} for list {} ({} bytes)",
                    file_name,
                    request.payload.list_id,
                    content.len()
                );
                let response = SuccessResponse::new(
                    request.id,
                    StagedFileResponse {
                        file_name,
                        size_bytes: content.len() as i64,
                    },
                );
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(e) => {
                error!("Failed to write staged file {}: {}", path.display(), e);
                let error = ErrorResponse::new(request.id, "STORAGE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Handle import.csv.queue messages
///
/// Moves a staged file into the queue directory under the list id, adding a
/// numeric suffix when an earlier upload for the list is still queued.
pub async fn handle_csv_queue(
    client: Client,
    mut subscriber: Subscriber,
    config: Arc<Config>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.csv.queue message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<QueueFileRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let source_name = match safe_file_name(&request.payload.file_name) {
            Some(name) => name,
            None => {
                let error = ErrorResponse::new(request.id, "INVALID_REQUEST", "fileName is empty");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };
        let source_path = config.storage_dir.join(&source_name);
        if !source_path.exists() {
            let error = ErrorResponse::new(
                request.id,
                "SOURCE_MISSING",
                format!("staged file {} not found", source_name),
            );
            let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            continue;
        }

        let queued = std::fs::create_dir_all(&config.queue_dir).and_then(|_| {
            let target_name = queued_file_name(&config.queue_dir, request.payload.list_id);
            std::fs::rename(&source_path, config.queue_dir.join(&target_name))
                .map(|_| target_name)
        });
        match queued {
            Ok(target_name) => {
                info!(
                    "Queued import file {} for list {}",
                    target_name, request.payload.list_id
                );
                let response = SuccessResponse::new(
                    request.id,
                    QueuedFileResponse {
                        file_name: target_name,
                    },
                );
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(e) => {
                error!("Failed to queue staged file {}: {}", source_name, e);
                let error = ErrorResponse::new(request.id, "STORAGE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

/// Queue slot for a list, suffixed when earlier uploads are still waiting
fn queued_file_name(queue_dir: &Path, list_id: Uuid) -> String {
    let mut name = format!("{}.csv", list_id);
    let mut attempt = 0;
    while queue_dir.join(&name).exists() {
        attempt += 1;
        name = format!("{}-{}.csv", list_id, attempt);
    }
    name
}

// ==========================================================================
// Batch processing
// ==========================================================================

/// Handle import.csv.batch messages
pub async fn handle_csv_batch(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    runner: Arc<ImportRunner>,
    config: Arc<Config>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.csv.batch message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CsvBatchRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let file_name = match safe_file_name(&request.payload.file_name) {
            Some(name) => name,
            None => {
                let error = ErrorResponse::new(request.id, "INVALID_REQUEST", "fileName is empty");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };
        let path = config.storage_dir.join(&file_name);
        let started_at = Utc::now();

        match run_csv_batch(&pool, &runner, &path, &request.payload).await {
            Ok((outcome, context)) => {
                if outcome.finished {
                    remove_staged_file(&path);
                }
                record_batch_history(request.id, &context, "csv", started_at, &outcome, &file_name);
                info!(
                    "Processed csv batch for list {}: page {}, rows {}-{} of {}, {} created, {} updated",
                    context.list_id,
                    request.payload.cursor.current_page,
                    outcome.row_start,
                    outcome.row_end,
                    outcome.records_count,
                    outcome.created_count,
                    outcome.updated_count
                );
                let response = SuccessResponse::new(request.id, progress_from(outcome));
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(err) => {
                error!(
                    "Csv import batch failed for list {}: {}",
                    request.payload.list_id, err
                );
                if session_fatal(&err) {
                    remove_staged_file(&path);
                }
                IMPORT_HISTORY.record_failed(
                    request.id,
                    request.payload.list_id,
                    request.customer_id.unwrap_or_default(),
                    "csv",
                    started_at,
                    err.to_string(),
                );
                let error = ErrorResponse::new(request.id, err.code(), err.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

async fn run_csv_batch(
    pool: &PgPool,
    runner: &ImportRunner,
    path: &Path,
    request: &CsvBatchRequest,
) -> Result<(BatchOutcome, ListContext), BatchError> {
    let mut source = CsvFileSource::new(path);
    let mut tx = pool.begin().await?;
    let (outcome, context) = {
        let mut store = PgImportStore::new(&mut tx);
        let context = store
            .list_context(request.list_id)
            .await
            .map_err(ImportError::from)?
            .ok_or(BatchError::ListNotFound)?;
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &request.cursor,
                request.email_column.as_deref(),
                request.page_size,
            )
            .await?;
        (outcome, context)
    };
    // Quota halts are committed too; only errors roll back
    tx.commit().await?;
    Ok((outcome, context))
}

/// Handle import.db.check messages
///
/// Validates the connection and query against the external database and
/// returns the column-to-tag mapping plus the row count, without writing
/// anything.
pub async fn handle_db_check(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.db.check message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<DbCheckRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        match check_db_source(&pool, &request.payload).await {
            Ok(response) => {
                info!(
                    "Validated database import source for list {}: {} columns, {} rows",
                    request.payload.list_id,
                    response.columns.len(),
                    response.rows_count
                );
                let response = SuccessResponse::new(request.id, response);
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(err) => {
                error!(
                    "Database import check failed for list {}: {}",
                    request.payload.list_id, err
                );
                let error = ErrorResponse::new(request.id, err.code(), err.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

async fn check_db_source(
    pool: &PgPool,
    request: &DbCheckRequest,
) -> Result<DbCheckResponse, BatchError> {
    let mut source = DbQuerySource::connect(&request.connection_url, &request.query).await?;
    let header = source.header().await?;

    let mut conn = pool.acquire().await?;
    let mut store = PgImportStore::new(&mut conn);
    let context = store
        .list_context(request.list_id)
        .await
        .map_err(ImportError::from)?
        .ok_or(BatchError::ListNotFound)?;
    let resolver = FieldResolver::load(&mut store, context.list_id)
        .await
        .map_err(ImportError::from)?;

    let columns = normalize_header(
        &header,
        &resolver.defined_tags(),
        request.email_column.as_deref(),
    )?;
    let rows_count = source.count_rows().await?;

    Ok(DbCheckResponse {
        columns: columns.iter().map(|column| column.name.clone()).collect(),
        tags: columns.iter().map(|column| column.tag.clone()).collect(),
        rows_count,
    })
}

/// Handle import.db.batch messages
pub async fn handle_db_batch(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    runner: Arc<ImportRunner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.db.batch message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<DbBatchRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let started_at = Utc::now();
        match run_db_batch(&pool, &runner, &request.payload).await {
            Ok((outcome, context)) => {
                record_batch_history(
                    request.id,
                    &context,
                    "database",
                    started_at,
                    &outcome,
                    "external query",
                );
                info!(
                    "Processed database batch for list {}: page {}, rows {}-{} of {}, {} created, {} updated",
                    context.list_id,
                    request.payload.cursor.current_page,
                    outcome.row_start,
                    outcome.row_end,
                    outcome.records_count,
                    outcome.created_count,
                    outcome.updated_count
                );
                let response = SuccessResponse::new(request.id, progress_from(outcome));
                let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
            }
            Err(err) => {
                error!(
                    "Database import batch failed for list {}: {}",
                    request.payload.list_id, err
                );
                IMPORT_HISTORY.record_failed(
                    request.id,
                    request.payload.list_id,
                    request.customer_id.unwrap_or_default(),
                    "database",
                    started_at,
                    err.to_string(),
                );
                let error = ErrorResponse::new(request.id, err.code(), err.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

async fn run_db_batch(
    pool: &PgPool,
    runner: &ImportRunner,
    request: &DbBatchRequest,
) -> Result<(BatchOutcome, ListContext), BatchError> {
    let mut source = DbQuerySource::connect(&request.connection_url, &request.query).await?;
    let mut tx = pool.begin().await?;
    let (outcome, context) = {
        let mut store = PgImportStore::new(&mut tx);
        let context = store
            .list_context(request.list_id)
            .await
            .map_err(ImportError::from)?
            .ok_or(BatchError::ListNotFound)?;
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &request.cursor,
                request.email_column.as_deref(),
                request.page_size,
            )
            .await?;
        (outcome, context)
    };
    tx.commit().await?;
    Ok((outcome, context))
}

fn record_batch_history(
    request_id: Uuid,
    context: &ListContext,
    source: &str,
    started_at: chrono::DateTime<Utc>,
    outcome: &BatchOutcome,
    source_name: &str,
) {
    let status = if outcome.halted_on.is_some() {
        "halted"
    } else {
        "completed"
    };
    IMPORT_HISTORY.record_batch(
        request_id,
        context.list_id,
        context.customer_id,
        source,
        status,
        started_at,
        outcome.created_count,
        outcome.updated_count,
        Some(format!(
            "{}: rows {}-{} of {}",
            source_name, outcome.row_start, outcome.row_end, outcome.records_count
        )),
    );
}

// ==========================================================================
// History
// ==========================================================================

/// Handle import.history messages
pub async fn handle_history(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received import.history message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ImportHistoryRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let limit = request.payload.limit.unwrap_or(50);
        let history = if let Some(list_id) = request.payload.list_id {
            IMPORT_HISTORY.get_recent_for_list(list_id, limit)
        } else if let Some(customer_id) = request.customer_id {
            IMPORT_HISTORY.get_recent_for_customer(customer_id, limit)
        } else {
            IMPORT_HISTORY.get_recent(limit)
        };

        let response = SuccessResponse::new(request.id, history);
        let _ = client.publish(reply, serde_json::to_vec(&response)?.into()).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name_strips_directories() {
        assert_eq!(safe_file_name("import-1.csv"), Some("import-1.csv".to_string()));
        assert_eq!(safe_file_name("../../etc/passwd"), Some("passwd".to_string()));
        assert_eq!(safe_file_name("a/b/import-2.csv"), Some("import-2.csv".to_string()));
        assert_eq!(safe_file_name(""), None);
        assert_eq!(safe_file_name(".."), None);
    }

    #[test]
    fn test_queued_file_name_suffixes_on_collision() {
        let dir = std::env::temp_dir().join(format!("maillift-test-{}-queue", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let list_id = Uuid::new_v4();

        let first = queued_file_name(&dir, list_id);
        assert_eq!(first, format!("{}.csv", list_id));

        std::fs::write(dir.join(&first), b"x").unwrap();
        let second = queued_file_name(&dir, list_id);
        assert_eq!(second, format!("{}-1.csv", list_id));

        std::fs::write(dir.join(&second), b"x").unwrap();
        let third = queued_file_name(&dir, list_id);
        assert_eq!(third, format!("{}-2.csv", list_id));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_session_fatal_only_for_header_errors() {
        assert!(session_fatal(&BatchError::Import(ImportError::MissingEmailColumn)));
        assert!(session_fatal(&BatchError::Import(ImportError::EmptyColumnName(2))));
        assert!(!session_fatal(&BatchError::Import(ImportError::SourceMissing(
            "import-1.csv".to_string()
        ))));
        assert!(!session_fatal(&BatchError::ListNotFound));
    }
}
