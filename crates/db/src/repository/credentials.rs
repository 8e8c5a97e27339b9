//! Stored credential lookups and bookkeeping.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::CredentialRow};

/// All credentials of `kind` held by `owner_id`, most recent first.
pub async fn list_credentials(
    pool: &PgPool,
    owner_id: &str,
    kind: &str,
) -> Result<Vec<CredentialRow>, DbError> {
    let rows = sqlx::query_as::<_, CredentialRow>(
        r#"
        SELECT id, owner_id, kind, external_id, display_name, created_at
        FROM user_credentials
        WHERE owner_id = $1 AND kind = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(owner_id)
    .bind(kind)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Remember a credential for later reuse.
pub async fn insert_credential(
    pool: &PgPool,
    owner_id: &str,
    kind: &str,
    external_id: &str,
    display_name: &str,
) -> Result<CredentialRow, DbError> {
    let row = sqlx::query_as::<_, CredentialRow>(
        r#"
        INSERT INTO user_credentials (id, owner_id, kind, external_id, display_name, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, owner_id, kind, external_id, display_name, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner_id)
    .bind(kind)
    .bind(external_id)
    .bind(display_name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Drop a remembered credential.
///
/// Deleting a row that is already gone is not an error.
pub async fn delete_credential(
    pool: &PgPool,
    owner_id: &str,
    external_id: &str,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"DELETE FROM user_credentials WHERE owner_id = $1 AND external_id = $2"#,
    )
    .bind(owner_id)
    .bind(external_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
