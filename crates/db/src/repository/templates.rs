//! Workflow template reads.

use sqlx::PgPool;

use crate::{DbError, models::TemplateRow};

/// Fetch a single template by its primary key.
pub async fn get_template(pool: &PgPool, id: &str) -> Result<TemplateRow, DbError> {
    let row = sqlx::query_as::<_, TemplateRow>(
        r#"SELECT id, name, definition, updated_at FROM workflow_templates WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}
