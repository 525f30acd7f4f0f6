//! List field database queries

use sqlx::PgConnection;
use uuid::Uuid;

use crate::types::ListField;

const FIELD_COLUMNS: &str = r#"
    id, list_id, tag, label, field_type, default_value, visibility, sort_order
"#;

/// All field definitions of a list, in display order
pub async fn list_fields(
    conn: &mut PgConnection,
    list_id: Uuid,
) -> Result<Vec<ListField>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM list_fields WHERE list_id = $1 ORDER BY sort_order, tag",
        FIELD_COLUMNS
    );
    sqlx::query_as::<_, ListField>(&query)
        .bind(list_id)
        .fetch_all(conn)
        .await
}

/// Create a text field discovered during import
pub async fn create_field(
    conn: &mut PgConnection,
    list_id: Uuid,
    tag: &str,
    label: &str,
    visibility: &str,
    sort_order: i32,
) -> Result<ListField, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO list_fields (list_id, tag, label, field_type, visibility, sort_order)
        VALUES ($1, $2, $3, 'text', $4, $5)
        RETURNING {}
        "#,
        FIELD_COLUMNS
    );
    sqlx::query_as::<_, ListField>(&query)
        .bind(list_id)
        .bind(tag)
        .bind(label)
        .bind(visibility)
        .bind(sort_order)
        .fetch_one(conn)
        .await
}
