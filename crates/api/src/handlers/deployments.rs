use axum::{
    extract::{Path, State},
    Json,
};
use engine::Deployment;
use uuid::Uuid;

use super::{ApiError, AppState};

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Deployment>, ApiError> {
    Ok(Json(state.deployer.deployment(id).await?))
}
