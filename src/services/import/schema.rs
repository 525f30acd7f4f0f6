//! Field schema resolution
//!
//! Every discovered tag must map to a list field definition. Known fields
//! are loaded once per batch; unknown ones are created on the fly as text
//! fields with the list's default visibility. Resolution works off the
//! header columns; one source is assumed to keep the same columns on every
//! row, which is a documented precondition of the pipeline.

use std::collections::HashMap;

use uuid::Uuid;

use crate::services::import::error::StoreError;
use crate::services::import::store::ImportStore;
use crate::services::import::tags::{DefinedTags, HeaderColumn};
use crate::types::{FieldVisibility, ListField};

/// Human label for a field created from a source column:
/// underscores to spaces, each word title-cased.
pub fn label_from_column(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tag to field-definition cache for one batch
pub struct FieldResolver {
    list_id: Uuid,
    fields: HashMap<String, ListField>,
    next_sort_order: i32,
}

impl FieldResolver {
    /// Seed the cache with the list's existing fields
    pub async fn load(store: &mut dyn ImportStore, list_id: Uuid) -> Result<Self, StoreError> {
        let existing = store.list_fields(list_id).await?;
        let next_sort_order = existing
            .iter()
            .map(|field| field.sort_order + 1)
            .max()
            .unwrap_or(0);
        let fields = existing
            .into_iter()
            .map(|field| (field.tag.clone(), field))
            .collect();
        Ok(Self {
            list_id,
            fields,
            next_sort_order,
        })
    }

    /// Which conditionally-folded tags the list already defines
    pub fn defined_tags(&self) -> DefinedTags {
        DefinedTags {
            has_fname: self.fields.contains_key("FNAME"),
            has_lname: self.fields.contains_key("LNAME"),
        }
    }

    /// Make sure every header column has a field definition, creating the
    /// missing ones inside the batch transaction.
    pub async fn resolve(
        &mut self,
        store: &mut dyn ImportStore,
        columns: &[HeaderColumn],
        default_visibility: FieldVisibility,
    ) -> Result<(), StoreError> {
        for column in columns {
            if self.fields.contains_key(&column.tag) {
                continue;
            }
            let field = store
                .create_field(
                    self.list_id,
                    &column.tag,
                    &label_from_column(&column.name),
                    default_visibility.as_str(),
                    self.next_sort_order,
                )
                .await?;
            self.next_sort_order += 1;
            self.fields.insert(column.tag.clone(), field);
        }
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<&ListField> {
        self.fields.get(tag)
    }

    /// Fields carrying a default value, for the backfill step
    pub fn fields_with_defaults(&self) -> impl Iterator<Item = &ListField> {
        self.fields
            .values()
            .filter(|field| field.default_value.is_some())
    }
}
