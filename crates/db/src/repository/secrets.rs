//! Storage for the credentials a `WebhookTrigger.secretRef` names (§4.6).

use chrono::Utc;
use sqlx::PgPool;

use crate::{models::SecretRow, DbError};

pub async fn upsert_secret(pool: &PgPool, secret_ref: &str, value: &str) -> Result<(), DbError> {
    sqlx::query!(
        r#"
        INSERT INTO secrets (secret_ref, value, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (secret_ref) DO UPDATE SET value = EXCLUDED.value
        "#,
        secret_ref,
        value,
        Utc::now(),
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_secret(pool: &PgPool, secret_ref: &str) -> Result<Option<String>, DbError> {
    let row = sqlx::query_as!(SecretRow, r#"SELECT secret_ref, value, created_at FROM secrets WHERE secret_ref = $1"#, secret_ref)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.value))
}
