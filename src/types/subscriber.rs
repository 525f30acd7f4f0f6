//! Subscriber entity and related enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of a subscriber on a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Confirmed,
    Unconfirmed,
    Unsubscribed,
    Blacklisted,
}

impl SubscriberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberStatus::Confirmed => "confirmed",
            SubscriberStatus::Unconfirmed => "unconfirmed",
            SubscriberStatus::Unsubscribed => "unsubscribed",
            SubscriberStatus::Blacklisted => "blacklisted",
        }
    }
}

/// Where a subscriber record originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberSource {
    Import,
    Web,
    Api,
}

impl SubscriberSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberSource::Import => "import",
            SubscriberSource::Web => "web",
            SubscriberSource::Api => "api",
        }
    }
}

/// Subscriber row as stored in Postgres
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: Uuid,
    pub list_id: Uuid,
    pub email: String,
    pub source: String,
    pub status: String,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
