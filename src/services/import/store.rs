//! Import storage abstraction
//!
//! The row engine talks to one store trait covering every entity it touches.
//! `PgImportStore` wraps the open per-batch transaction; tests run the same
//! engine against `MemoryStore`.

use async_trait::async_trait;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::queries;
use crate::services::import::error::StoreError;
use crate::types::{ListContext, ListField, Subscriber, SubscriberSource, SubscriberStatus};

/// Find/create/upsert operations the import pipeline needs
#[async_trait]
pub trait ImportStore: Send {
    async fn list_context(&mut self, list_id: Uuid) -> Result<Option<ListContext>, StoreError>;

    async fn list_fields(&mut self, list_id: Uuid) -> Result<Vec<ListField>, StoreError>;

    async fn create_field(
        &mut self,
        list_id: Uuid,
        tag: &str,
        label: &str,
        visibility: &str,
        sort_order: i32,
    ) -> Result<ListField, StoreError>;

    async fn count_account_subscribers(&mut self, customer_id: Uuid) -> Result<i64, StoreError>;

    async fn count_list_subscribers(&mut self, list_id: Uuid) -> Result<i64, StoreError>;

    /// Subset of the given emails already present in the blacklist store
    async fn known_blacklisted(&mut self, emails: &[String]) -> Result<Vec<String>, StoreError>;

    async fn add_blacklist_entries(
        &mut self,
        entries: &[(String, String)],
    ) -> Result<(), StoreError>;

    async fn find_subscriber(
        &mut self,
        list_id: Uuid,
        email: &str,
    ) -> Result<Option<Subscriber>, StoreError>;

    /// Create with status confirmed and source import. Returns
    /// `StoreError::DuplicateKey` when the (list, email) key already exists.
    async fn create_subscriber(
        &mut self,
        list_id: Uuid,
        email: &str,
        ip_address: Option<&str>,
    ) -> Result<Subscriber, StoreError>;

    async fn touch_subscriber(&mut self, subscriber_id: Uuid) -> Result<(), StoreError>;

    async fn set_subscriber_location(
        &mut self,
        subscriber_id: Uuid,
        country_code: Option<&str>,
        city: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn find_field_value(
        &mut self,
        field_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<Option<String>, StoreError>;

    async fn save_field_value(
        &mut self,
        field_id: Uuid,
        subscriber_id: Uuid,
        value: &str,
    ) -> Result<(), StoreError>;
}

/// Postgres store over the open batch transaction
pub struct PgImportStore<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgImportStore<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<'c> ImportStore for PgImportStore<'c> {
    async fn list_context(&mut self, list_id: Uuid) -> Result<Option<ListContext>, StoreError> {
        Ok(queries::list::get_list_context(&mut *self.conn, list_id).await?)
    }

    async fn list_fields(&mut self, list_id: Uuid) -> Result<Vec<ListField>, StoreError> {
        Ok(queries::field::list_fields(&mut *self.conn, list_id).await?)
    }

    async fn create_field(
        &mut self,
        list_id: Uuid,
        tag: &str,
        label: &str,
        visibility: &str,
        sort_order: i32,
    ) -> Result<ListField, StoreError> {
        Ok(queries::field::create_field(&mut *self.conn, list_id, tag, label, visibility, sort_order)
            .await?)
    }

    async fn count_account_subscribers(&mut self, customer_id: Uuid) -> Result<i64, StoreError> {
        Ok(queries::subscriber::count_for_account(&mut *self.conn, customer_id).await?)
    }

    async fn count_list_subscribers(&mut self, list_id: Uuid) -> Result<i64, StoreError> {
        Ok(queries::subscriber::count_for_list(&mut *self.conn, list_id).await?)
    }

    async fn known_blacklisted(&mut self, emails: &[String]) -> Result<Vec<String>, StoreError> {
        Ok(queries::blacklist::find_known(&mut *self.conn, emails).await?)
    }

    async fn add_blacklist_entries(
        &mut self,
        entries: &[(String, String)],
    ) -> Result<(), StoreError> {
        Ok(queries::blacklist::add_entries(&mut *self.conn, entries).await?)
    }

    async fn find_subscriber(
        &mut self,
        list_id: Uuid,
        email: &str,
    ) -> Result<Option<Subscriber>, StoreError> {
        Ok(queries::subscriber::find_by_email(&mut *self.conn, list_id, email).await?)
    }

    async fn create_subscriber(
        &mut self,
        list_id: Uuid,
        email: &str,
        ip_address: Option<&str>,
    ) -> Result<Subscriber, StoreError> {
        Ok(queries::subscriber::create(
            &mut *self.conn,
            list_id,
            email,
            SubscriberSource::Import.as_str(),
            SubscriberStatus::Confirmed.as_str(),
            ip_address,
        )
        .await?)
    }

    async fn touch_subscriber(&mut self, subscriber_id: Uuid) -> Result<(), StoreError> {
        Ok(queries::subscriber::touch(&mut *self.conn, subscriber_id).await?)
    }

    async fn set_subscriber_location(
        &mut self,
        subscriber_id: Uuid,
        country_code: Option<&str>,
        city: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(queries::subscriber::set_location(&mut *self.conn, subscriber_id, country_code, city)
            .await?)
    }

    async fn find_field_value(
        &mut self,
        field_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<Option<String>, StoreError> {
        Ok(queries::subscriber::find_field_value(&mut *self.conn, field_id, subscriber_id).await?)
    }

    async fn save_field_value(
        &mut self,
        field_id: Uuid,
        subscriber_id: Uuid,
        value: &str,
    ) -> Result<(), StoreError> {
        Ok(queries::subscriber::upsert_field_value(&mut *self.conn, field_id, subscriber_id, value)
            .await?)
    }
}

#[cfg(test)]
pub(crate) use memory::MemoryStore;
