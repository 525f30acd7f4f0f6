//! Mailing list and list field types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Visibility of a list field on subscriber-facing forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldVisibility {
    Visible,
    Hidden,
}

impl FieldVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldVisibility::Visible => "visible",
            FieldVisibility::Hidden => "hidden",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "hidden" => FieldVisibility::Hidden,
            _ => FieldVisibility::Visible,
        }
    }
}

impl Default for FieldVisibility {
    fn default() -> Self {
        FieldVisibility::Visible
    }
}

/// Field definition bound to a list, addressed by its uppercase tag
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListField {
    pub id: Uuid,
    pub list_id: Uuid,
    pub tag: String,
    pub label: String,
    pub field_type: String,
    pub default_value: Option<String>,
    pub visibility: String,
    pub sort_order: i32,
}

/// The slice of list/account state the import pipeline needs per batch:
/// ownership, both quota caps and the default visibility for created fields.
#[derive(Debug, Clone)]
pub struct ListContext {
    pub list_id: Uuid,
    pub customer_id: Uuid,
    pub list_name: String,
    pub default_field_visibility: FieldVisibility,
    /// -1 means unlimited
    pub max_subscribers_per_list: i64,
    /// -1 means unlimited
    pub max_subscribers_per_account: i64,
}
