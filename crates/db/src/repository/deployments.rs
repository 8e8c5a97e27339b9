//! Deployment records.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::DeploymentRow};

/// Insert a new deployment record.
pub async fn insert_deployment(
    pool: &PgPool,
    id: Uuid,
    template_id: &str,
    user_id: &str,
    workflow_id: &str,
    webhook_path: &str,
    manifest: serde_json::Value,
) -> Result<DeploymentRow, DbError> {
    let row = sqlx::query_as::<_, DeploymentRow>(
        r#"
        INSERT INTO deployments
            (id, template_id, user_id, workflow_id, webhook_path, manifest, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, template_id, user_id, workflow_id, webhook_path, manifest, created_at
        "#,
    )
    .bind(id)
    .bind(template_id)
    .bind(user_id)
    .bind(workflow_id)
    .bind(webhook_path)
    .bind(manifest)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single deployment by its primary key.
pub async fn get_deployment(pool: &PgPool, id: Uuid) -> Result<DeploymentRow, DbError> {
    let row = sqlx::query_as::<_, DeploymentRow>(
        r#"
        SELECT id, template_id, user_id, workflow_id, webhook_path, manifest, created_at
        FROM deployments WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}
