//! Subscriber import pipeline
//!
//! One batch = one request/response cycle. The runner reads a page of rows
//! from the source, applies transforms, resolves the field schema, enforces
//! quotas, pre-screens emails against the blacklist and upserts rows, all
//! against the store the caller opened (a transaction in production). The
//! caller commits on success, including quota halts, and rolls back on error
//! so the same page can be retried.

pub mod cursor;
pub mod error;
pub mod hooks;
pub mod quota;
pub mod schema;
pub mod screen;
pub mod source;
pub mod store;
pub mod tags;

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::services::iplocation::{DisabledIpLocator, IpLocator};
use crate::types::{CursorAttributes, ImportLogEntry, ListContext};

use cursor::ImportCursor;
use error::{ImportError, StoreError};
use hooks::{apply_transforms, BatchContext, BatchTransform};
use quota::{QuotaCap, QuotaGuard};
use schema::FieldResolver;
use screen::{precheck_batch, BlacklistScreen, NoScreening};
use source::{ImportSource, RawRecord};
use store::ImportStore;
use tags::{normalize_header, HeaderColumn};

/// Result of one processed batch
#[derive(Debug)]
pub struct BatchOutcome {
    /// Session complete; for quota halts this terminates the session early
    pub finished: bool,
    /// Set when a quota cap ended the session
    pub halted_on: Option<QuotaCap>,
    pub imported_count: i64,
    pub created_count: i64,
    pub updated_count: i64,
    pub row_start: i64,
    pub row_end: i64,
    pub records_count: i64,
    pub cursor: CursorAttributes,
    pub log: Vec<ImportLogEntry>,
}

impl BatchOutcome {
    fn session_done(records_count: i64, cursor: CursorAttributes, log: Vec<ImportLogEntry>) -> Self {
        Self {
            finished: true,
            halted_on: None,
            imported_count: 0,
            created_count: 0,
            updated_count: 0,
            row_start: records_count,
            row_end: records_count,
            records_count,
            cursor,
            log,
        }
    }
}

/// Drives the import pipeline for one list and one source
pub struct ImportRunner {
    page_size: i64,
    screen: Arc<dyn BlacklistScreen>,
    locator: Arc<dyn IpLocator>,
    transforms: Vec<Arc<dyn BatchTransform>>,
}

impl ImportRunner {
    pub fn new(page_size: i64) -> Self {
        Self {
            page_size: page_size.max(1),
            screen: Arc::new(NoScreening),
            locator: Arc::new(DisabledIpLocator),
            transforms: Vec::new(),
        }
    }

    pub fn with_screen(mut self, screen: Arc<dyn BlacklistScreen>) -> Self {
        self.screen = screen;
        self
    }

    pub fn with_locator(mut self, locator: Arc<dyn IpLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn BatchTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Process one page of the source. Validation failures surface before any
    /// row work; row-level problems become log entries instead.
    pub async fn run_batch(
        &self,
        store: &mut dyn ImportStore,
        source: &mut dyn ImportSource,
        context: &ListContext,
        cursor_attrs: &CursorAttributes,
        email_hint: Option<&str>,
        page_size_override: Option<i64>,
    ) -> Result<BatchOutcome, ImportError> {
        let page_size = page_size_override.unwrap_or(self.page_size).max(1);
        let mut cursor = ImportCursor::from_attributes(cursor_attrs, page_size);
        let mut log: Vec<ImportLogEntry> = Vec::new();

        // Total rows are computed once per session and carried in the cursor
        if cursor.rows_count.is_none() {
            let total = source.count_rows().await?;
            cursor.record_rows_count(total);
        }
        let records_count = cursor.rows_count.unwrap_or(0);

        // Completion is evaluated before any row is read, so the call after
        // the last working page becomes the finishing call
        if cursor.is_finished() {
            return Ok(BatchOutcome::session_done(records_count, cursor.attributes(), log));
        }

        // Header validation, terminal for the whole session on failure
        let mut resolver = FieldResolver::load(store, context.list_id).await?;
        let raw_header = source.header().await?;
        let columns = normalize_header(&raw_header, &resolver.defined_tags(), email_hint)?;

        // Read the page and key each row by tag
        let rows = source.read_rows(cursor.offset(), page_size).await?;
        let records: Vec<RawRecord> = rows
            .into_iter()
            .map(|row| {
                let mut record = RawRecord::default();
                for (column, value) in columns.iter().zip(row) {
                    record.set(&column.tag, value);
                }
                record
            })
            .collect();
        log.push(ImportLogEntry::info(format!(
            "Found {} records in this batch",
            records.len()
        )));

        // Registered transforms may rewrite the batch or end the session
        let mut batch = BatchContext::new(records);
        apply_transforms(&self.transforms, &mut batch);
        log.append(&mut batch.log);
        if batch.finished {
            return Ok(BatchOutcome::session_done(records_count, cursor.attributes(), log));
        }
        let records = batch.records;

        // Schema resolution samples the first record, which may carry tags a
        // transform added on top of the header
        if let Some(first) = records.first() {
            let sampled = sampled_columns(first, &columns);
            resolver
                .resolve(store, &sampled, context.default_field_visibility)
                .await?;
        }

        // Quota check before any row mutation
        let mut quota = QuotaGuard::seed(store, context).await?;
        if let Some(cap) = quota.at_capacity() {
            log.push(ImportLogEntry::error(cap.message(), false));
            let mut outcome = BatchOutcome::session_done(records_count, cursor.attributes(), log);
            outcome.halted_on = Some(cap);
            return Ok(outcome);
        }

        // Bulk blacklist pre-check on the page's distinct emails
        let emails = distinct_emails(&records);
        let flagged = precheck_batch(store, self.screen.as_ref(), &emails).await?;

        let mut imported_count = 0i64;
        let mut created_count = 0i64;
        let mut updated_count = 0i64;
        let mut halted: Option<QuotaCap> = None;

        for (index, record) in records.iter().enumerate() {
            let row_number = cursor.offset() + index as i64 + 1;

            let email = clean_email(record.get("EMAIL").unwrap_or_default());
            if email.is_empty() {
                log.push(ImportLogEntry::info(format!(
                    "[Row {}] No email address, skipping",
                    row_number
                )));
                continue;
            }

            if let Some(reason) = flagged.get(&email) {
                log.push(ImportLogEntry::error(
                    format!("[Row {}] {}: {}", row_number, email, reason),
                    true,
                ));
                continue;
            }

            let (subscriber, created) = match store.find_subscriber(context.list_id, &email).await? {
                Some(subscriber) => (subscriber, false),
                None => {
                    if !is_valid_email(&email) {
                        log.push(ImportLogEntry::error(
                            format!("[Row {}] {} is not a valid email address", row_number, email),
                            true,
                        ));
                        continue;
                    }
                    let ip = record
                        .get("IP_ADDRESS")
                        .map(str::trim)
                        .filter(|ip| ip.parse::<IpAddr>().is_ok());
                    match store.create_subscriber(context.list_id, &email, ip).await {
                        Ok(subscriber) => (subscriber, true),
                        Err(StoreError::DuplicateKey) => {
                            // A concurrent import won the create; reload and update
                            debug!("Duplicate key for {} on list {}", email, context.list_id);
                            match store.find_subscriber(context.list_id, &email).await? {
                                Some(subscriber) => (subscriber, false),
                                None => {
                                    log.push(ImportLogEntry::error(
                                        format!("[Row {}] {} could not be saved", row_number, email),
                                        true,
                                    ));
                                    continue;
                                }
                            }
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            };

            if created {
                created_count += 1;
                halted = quota.record_created();
            } else {
                updated_count += 1;
                store.touch_subscriber(subscriber.id).await?;
            }

            // Field merge; unchanged values are left alone
            for (tag, value) in record.entries() {
                if let Some(field) = resolver.get(tag) {
                    let existing = store.find_field_value(field.id, subscriber.id).await?;
                    if existing.as_deref() != Some(value) {
                        store.save_field_value(field.id, subscriber.id, value).await?;
                    }
                }
            }

            if created {
                self.enrich_location(store, &subscriber).await?;
            }

            // Fields with defaults get a value when the row did not supply one
            for field in resolver.fields_with_defaults() {
                if let Some(default) = field.default_value.as_deref() {
                    if store.find_field_value(field.id, subscriber.id).await?.is_none() {
                        store.save_field_value(field.id, subscriber.id, default).await?;
                    }
                }
            }

            imported_count += 1;
            let verb = if created { "added" } else { "updated" };
            log.push(ImportLogEntry::success(format!(
                "[Row {}] {} {} successfully",
                row_number, email, verb
            )));

            if let Some(cap) = halted {
                // Committed rows stay committed; the session ends here
                log.push(ImportLogEntry::error(cap.message(), false));
                break;
            }
        }

        let (row_start, row_end) = cursor.row_range();
        cursor.advance();

        Ok(BatchOutcome {
            finished: halted.is_some(),
            halted_on: halted,
            imported_count,
            created_count,
            updated_count,
            row_start,
            row_end,
            records_count,
            cursor: cursor.attributes(),
            log,
        })
    }

    async fn enrich_location(
        &self,
        store: &mut dyn ImportStore,
        subscriber: &crate::types::Subscriber,
    ) -> Result<(), ImportError> {
        let ip = match subscriber.ip_address.as_deref() {
            Some(ip) => ip,
            None => return Ok(()),
        };
        match self.locator.locate(ip).await {
            Ok(Some(location)) => {
                store
                    .set_subscriber_location(
                        subscriber.id,
                        location.country_code.as_deref(),
                        location.city.as_deref(),
                    )
                    .await?;
            }
            Ok(None) => {}
            Err(err) => {
                // Enrichment is best effort
                warn!("IP location lookup failed for {}: {}", ip, err);
            }
        }
        Ok(())
    }
}

/// Columns to resolve for this batch, sampled from the first record. Tags
/// introduced by transforms fall back to the tag itself as the column name.
fn sampled_columns(first: &RawRecord, header: &[HeaderColumn]) -> Vec<HeaderColumn> {
    first
        .tags()
        .map(|tag| {
            header
                .iter()
                .find(|column| column.tag == tag)
                .cloned()
                .unwrap_or_else(|| HeaderColumn {
                    name: tag.to_string(),
                    tag: tag.to_string(),
                })
        })
        .collect()
}

fn distinct_emails(records: &[RawRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut emails = Vec::new();
    for record in records {
        let email = clean_email(record.get("EMAIL").unwrap_or_default());
        if !email.is_empty() && seen.insert(email.clone()) {
            emails.push(email);
        }
    }
    emails
}

fn clean_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > 150 || email.contains(char::is_whitespace) {
        return false;
    }
    let mut parts = email.splitn(2, '@');
    let (local, domain) = match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) => (local, domain),
        _ => return false,
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::import::store::MemoryStore;
    use crate::types::ImportLogLevel;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct StaticSource {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    }

    impl StaticSource {
        fn new(header: &[&str], rows: &[&[&str]]) -> Self {
            Self {
                header: header.iter().map(|name| name.to_string()).collect(),
                rows: rows
                    .iter()
                    .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl ImportSource for StaticSource {
        async fn header(&mut self) -> Result<Vec<String>, ImportError> {
            Ok(self.header.clone())
        }

        async fn count_rows(&mut self) -> Result<i64, ImportError> {
            Ok(self.rows.len() as i64)
        }

        async fn read_rows(
            &mut self,
            offset: i64,
            limit: i64,
        ) -> Result<Vec<Vec<String>>, ImportError> {
            Ok(self
                .rows
                .iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        }
    }

    fn context_for(store: &MemoryStore, list_id: Uuid) -> ListContext {
        store.lists.get(&list_id).cloned().unwrap()
    }

    fn error_entries(outcome: &BatchOutcome) -> Vec<&ImportLogEntry> {
        outcome
            .log
            .iter()
            .filter(|entry| entry.level == ImportLogLevel::Error)
            .collect()
    }

    #[tokio::test]
    async fn test_example_scenario_creates_then_updates_same_email() {
        // Header Email,First Name; one invalid row; a duplicate that must
        // win the final FNAME value
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(
            &["Email", "First Name"],
            &[
                &["a@x.com", "Al"],
                &["not-an-email", "Bo"],
                &["a@x.com", "Allen"],
            ],
        );

        let runner = ImportRunner::new(10);
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(!outcome.finished);
        assert_eq!(outcome.records_count, 3);
        assert_eq!(outcome.created_count, 1);
        assert_eq!(outcome.updated_count, 1);
        assert_eq!(outcome.imported_count, 2);

        let errors = error_entries(&outcome);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("not-an-email"));
        assert!(errors[0].counter);

        assert_eq!(store.subscribers.len(), 1);
        assert_eq!(store.value_of(list_id, "a@x.com", "FIRST_NAME"), Some("Allen"));

        // The follow-up call reports completion without touching rows
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &outcome.cursor,
                None,
                None,
            )
            .await
            .unwrap();
        assert!(outcome.finished);
        assert_eq!(outcome.imported_count, 0);
    }

    #[tokio::test]
    async fn test_reimport_updates_instead_of_duplicating() {
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        let context = context_for(&store, list_id);
        let runner = ImportRunner::new(10);

        for _ in 0..2 {
            let mut source = StaticSource::new(
                &["Email", "City"],
                &[&["a@x.com", "Praha"], &["b@x.com", "Brno"]],
            );
            runner
                .run_batch(
                    &mut store,
                    &mut source,
                    &context,
                    &CursorAttributes::default(),
                    None,
                    None,
                )
                .await
                .unwrap();
        }

        assert_eq!(store.subscribers.len(), 2);
        assert_eq!(store.value_of(list_id, "a@x.com", "CITY"), Some("Praha"));
        assert_eq!(store.value_of(list_id, "b@x.com", "CITY"), Some("Brno"));
    }

    #[tokio::test]
    async fn test_list_cap_halts_after_exactly_n_creates() {
        // Cap 3, 8 candidates: exactly 3 created, session terminated
        let (mut store, list_id) = MemoryStore::with_list(3, -1);
        let context = context_for(&store, list_id);
        let rows: Vec<Vec<String>> = (0..8).map(|i| vec![format!("user{}@x.com", i)]).collect();
        let mut source = StaticSource {
            header: vec!["Email".to_string()],
            rows,
        };

        let runner = ImportRunner::new(10);
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(outcome.finished);
        assert_eq!(outcome.halted_on, Some(QuotaCap::List));
        assert_eq!(outcome.created_count, 3);
        assert_eq!(store.subscribers.len(), 3);
        let cap_errors = error_entries(&outcome);
        assert!(cap_errors
            .iter()
            .any(|entry| entry.message.contains("this list")));
    }

    #[tokio::test]
    async fn test_batch_rejected_when_cap_already_met() {
        let (mut store, list_id) = MemoryStore::with_list(1, -1);
        let context = context_for(&store, list_id);
        let runner = ImportRunner::new(10);

        let mut source = StaticSource::new(&["Email"], &[&["first@x.com"]]);
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();
        assert!(outcome.finished);
        assert_eq!(store.subscribers.len(), 1);

        // List is full now: the next session processes zero rows
        let mut source = StaticSource::new(&["Email"], &[&["second@x.com"]]);
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();
        assert!(outcome.finished);
        assert_eq!(outcome.halted_on, Some(QuotaCap::List));
        assert_eq!(outcome.imported_count, 0);
        assert_eq!(store.subscribers.len(), 1);
    }

    #[tokio::test]
    async fn test_flagged_emails_short_circuit_rows() {
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        store
            .blacklist
            .insert("bad@x.com".to_string(), "spam trap".to_string());
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(&["Email"], &[&["bad@x.com"], &["good@x.com"]]);

        let runner = ImportRunner::new(10);
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.created_count, 1);
        assert!(store.subscriber(list_id, "bad@x.com").is_none());
        assert!(store.subscriber(list_id, "good@x.com").is_some());
        let errors = error_entries(&outcome);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("bad@x.com"));
        assert!(errors[0].message.contains("blacklisted"));
    }

    #[tokio::test]
    async fn test_duplicate_key_race_falls_back_to_update() {
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        store.race_emails.insert("raced@x.com".to_string());
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(&["Email", "City"], &[&["raced@x.com", "Praha"]]);

        let runner = ImportRunner::new(10);
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();

        // The row lands as an update of the concurrently created subscriber
        assert_eq!(outcome.created_count, 0);
        assert_eq!(outcome.updated_count, 1);
        assert_eq!(store.subscribers.len(), 1);
        assert_eq!(store.value_of(list_id, "raced@x.com", "CITY"), Some("Praha"));
    }

    #[tokio::test]
    async fn test_rows_without_email_are_skipped_silently() {
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(&["Email", "City"], &[&["", "Praha"], &["a@x.com", "Brno"]]);

        let runner = ImportRunner::new(10);
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.imported_count, 1);
        assert_eq!(outcome.created_count, 1);
        assert!(error_entries(&outcome).is_empty());
        assert!(outcome
            .log
            .iter()
            .any(|entry| entry.level == ImportLogLevel::Info
                && entry.message.contains("No email address")));
    }

    #[tokio::test]
    async fn test_ip_address_column_is_captured_when_well_formed() {
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(
            &["Email", "IP Address"],
            &[&["a@x.com", "203.0.113.7"], &["b@x.com", "not-an-ip"]],
        );

        let runner = ImportRunner::new(10);
        runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            store.subscriber(list_id, "a@x.com").unwrap().ip_address.as_deref(),
            Some("203.0.113.7")
        );
        assert!(store.subscriber(list_id, "b@x.com").unwrap().ip_address.is_none());
    }

    #[tokio::test]
    async fn test_default_values_backfill_missing_fields_only() {
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        store.add_field(list_id, "PLAN", Some("free"));
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(
            &["Email", "Plan"],
            &[&["a@x.com", "pro"], &["b@x.com", ""]],
        );

        let runner = ImportRunner::new(10);
        runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();

        // Row a supplied a value; row b supplied an empty one, which counts
        // as present and is not replaced by the default
        assert_eq!(store.value_of(list_id, "a@x.com", "PLAN"), Some("pro"));
        assert_eq!(store.value_of(list_id, "b@x.com", "PLAN"), Some(""));
    }

    #[tokio::test]
    async fn test_default_values_fill_untouched_fields() {
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        store.add_field(list_id, "PLAN", Some("free"));
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(&["Email"], &[&["a@x.com"]]);

        let runner = ImportRunner::new(10);
        runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(store.value_of(list_id, "a@x.com", "PLAN"), Some("free"));
    }

    #[tokio::test]
    async fn test_batches_advance_through_pages_until_finished() {
        // 5 rows, page size 2: three working batches, then the finishing call
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        let context = context_for(&store, list_id);
        let rows: Vec<Vec<String>> = (0..5).map(|i| vec![format!("user{}@x.com", i)]).collect();

        let runner = ImportRunner::new(2);
        let mut cursor = CursorAttributes::default();
        let mut working_batches = 0;

        loop {
            let mut source = StaticSource {
                header: vec!["Email".to_string()],
                rows: rows.clone(),
            };
            let outcome = runner
                .run_batch(&mut store, &mut source, &context, &cursor, None, None)
                .await
                .unwrap();
            cursor = outcome.cursor.clone();
            if outcome.finished {
                break;
            }
            working_batches += 1;
        }

        assert_eq!(working_batches, 3);
        assert_eq!(store.subscribers.len(), 5);
        assert_eq!(cursor.rows_count, Some(5));
    }

    #[tokio::test]
    async fn test_transform_can_end_the_session() {
        struct EndSession;

        impl BatchTransform for EndSession {
            fn name(&self) -> &'static str {
                "end_session"
            }

            fn apply(&self, context: &mut BatchContext) {
                context.finished = true;
            }
        }

        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(&["Email"], &[&["a@x.com"]]);

        let runner = ImportRunner::new(10).with_transform(Arc::new(EndSession));
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(outcome.finished);
        assert!(store.subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_email_hint_drives_database_style_headers() {
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(
            &["contact_mail", "full_name"],
            &[&["a@x.com", "Al Smith"]],
        );

        let runner = ImportRunner::new(10);
        let outcome = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                Some("contact_mail"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.created_count, 1);
        assert!(store.subscriber(list_id, "a@x.com").is_some());
        assert_eq!(store.value_of(list_id, "a@x.com", "FULL_NAME"), Some("Al Smith"));
    }

    #[tokio::test]
    async fn test_missing_email_header_is_terminal() {
        let (mut store, list_id) = MemoryStore::with_list(-1, -1);
        let context = context_for(&store, list_id);
        let mut source = StaticSource::new(&["Name", "City"], &[&["Al", "Praha"]]);

        let runner = ImportRunner::new(10);
        let err = runner
            .run_batch(
                &mut store,
                &mut source,
                &context,
                &CursorAttributes::default(),
                None,
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::MissingEmailColumn));
        assert!(store.subscribers.is_empty());
    }

    #[test]
    fn test_clean_email_trims_and_lowercases() {
        assert_eq!(clean_email("  User@Example.COM "), "user@example.com");
        assert_eq!(clean_email(""), "");
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email("user name@example.com"));
    }
}
