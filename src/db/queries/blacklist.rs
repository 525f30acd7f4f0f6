//! Email blacklist database queries

use sqlx::PgConnection;

/// Which of the given emails are already blacklisted
pub async fn find_known(
    conn: &mut PgConnection,
    emails: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    if emails.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_scalar::<_, String>("SELECT email FROM email_blacklist WHERE email = ANY($1)")
        .bind(emails)
        .fetch_all(conn)
        .await
}

/// Persist newly flagged emails with their rejection reasons
pub async fn add_entries(
    conn: &mut PgConnection,
    entries: &[(String, String)],
) -> Result<(), sqlx::Error> {
    for (email, reason) in entries {
        sqlx::query(
            "INSERT INTO email_blacklist (email, reason) VALUES ($1, $2) ON CONFLICT (email) DO NOTHING",
        )
        .bind(email)
        .bind(reason)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
