//! List database queries

use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::types::{FieldVisibility, ListContext};

/// Load the list together with the quota caps of its owning account
pub async fn get_list_context(
    conn: &mut PgConnection,
    list_id: Uuid,
) -> Result<Option<ListContext>, sqlx::Error> {
    let query = r#"
        SELECT
            l.id AS list_id, l.customer_id, l.name AS list_name,
            l.default_field_visibility, l.max_subscribers AS list_max,
            c.max_subscribers AS account_max
        FROM lists l
        JOIN customers c ON c.id = l.customer_id
        WHERE l.id = $1
    "#;

    let row = sqlx::query(query)
        .bind(list_id)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(|row| ListContext {
        list_id: row.get("list_id"),
        customer_id: row.get("customer_id"),
        list_name: row.get("list_name"),
        default_field_visibility: FieldVisibility::from_str(row.get("default_field_visibility")),
        max_subscribers_per_list: row.get::<i32, _>("list_max") as i64,
        max_subscribers_per_account: row.get::<i32, _>("account_max") as i64,
    }))
}
