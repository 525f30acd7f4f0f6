//! Subscriber and field value database queries

use sqlx::PgConnection;
use uuid::Uuid;

use crate::types::Subscriber;

const SUBSCRIBER_COLUMNS: &str = r#"
    id, list_id, email, source, status, ip_address, created_at, updated_at
"#;

/// Find a subscriber by the (list, email) unique key
pub async fn find_by_email(
    conn: &mut PgConnection,
    list_id: Uuid,
    email: &str,
) -> Result<Option<Subscriber>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM subscribers WHERE list_id = $1 AND email = $2",
        SUBSCRIBER_COLUMNS
    );
    sqlx::query_as::<_, Subscriber>(&query)
        .bind(list_id)
        .bind(email)
        .fetch_optional(conn)
        .await
}

/// Create a subscriber. A unique violation here means a concurrent import
/// created the same (list, email) first; callers reload and update instead.
pub async fn create(
    conn: &mut PgConnection,
    list_id: Uuid,
    email: &str,
    source: &str,
    status: &str,
    ip_address: Option<&str>,
) -> Result<Subscriber, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO subscribers (list_id, email, source, status, ip_address)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        SUBSCRIBER_COLUMNS
    );
    sqlx::query_as::<_, Subscriber>(&query)
        .bind(list_id)
        .bind(email)
        .bind(source)
        .bind(status)
        .bind(ip_address)
        .fetch_one(conn)
        .await
}

/// Bump updated_at on the update path
pub async fn touch(conn: &mut PgConnection, subscriber_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE subscribers SET updated_at = NOW() WHERE id = $1")
        .bind(subscriber_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Store geolocation enrichment results
pub async fn set_location(
    conn: &mut PgConnection,
    subscriber_id: Uuid,
    country_code: Option<&str>,
    city: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE subscribers SET country_code = $2, city = $3, updated_at = NOW() WHERE id = $1")
        .bind(subscriber_id)
        .bind(country_code)
        .bind(city)
        .execute(conn)
        .await?;
    Ok(())
}

/// Distinct subscriber emails across every list the customer owns
pub async fn count_for_account(
    conn: &mut PgConnection,
    customer_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(DISTINCT s.email)
        FROM subscribers s
        JOIN lists l ON l.id = s.list_id
        WHERE l.customer_id = $1
        "#,
    )
    .bind(customer_id)
    .fetch_one(conn)
    .await
}

/// Distinct subscriber emails on one list
pub async fn count_for_list(conn: &mut PgConnection, list_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT email) FROM subscribers WHERE list_id = $1")
        .bind(list_id)
        .fetch_one(conn)
        .await
}

/// Current stored value for one (field, subscriber) pair
pub async fn find_field_value(
    conn: &mut PgConnection,
    field_id: Uuid,
    subscriber_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT value FROM subscriber_field_values WHERE field_id = $1 AND subscriber_id = $2",
    )
    .bind(field_id)
    .bind(subscriber_id)
    .fetch_optional(conn)
    .await
}

/// Insert or overwrite one (field, subscriber) value
pub async fn upsert_field_value(
    conn: &mut PgConnection,
    field_id: Uuid,
    subscriber_id: Uuid,
    value: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO subscriber_field_values (field_id, subscriber_id, value)
        VALUES ($1, $2, $3)
        ON CONFLICT (field_id, subscriber_id)
        DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
        "#,
    )
    .bind(field_id)
    .bind(subscriber_id)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}
