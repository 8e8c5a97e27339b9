use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::{Deployment, ResolvedCredential, TemplateRequirements, UserInputs};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct DeployDto {
    pub user_id: String,
    #[serde(default)]
    pub inputs: UserInputs,
}

#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub deployment_id: Uuid,
    pub workflow_id: String,
    pub webhook_path: String,
    pub credentials: Vec<ResolvedCredential>,
}

impl From<Deployment> for DeployResponse {
    fn from(d: Deployment) -> Self {
        Self {
            deployment_id: d.id,
            workflow_id: d.workflow_id,
            webhook_path: d.manifest.webhook_path,
            credentials: d.manifest.resolved_credentials,
        }
    }
}

pub async fn requirements(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TemplateRequirements>, ApiError> {
    Ok(Json(state.deployer.requirements(&id).await?))
}

pub async fn deploy(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<DeployDto>,
) -> Result<(StatusCode, Json<DeployResponse>), ApiError> {
    let deployment = state
        .deployer
        .deploy(&id, &payload.user_id, &payload.inputs)
        .await?;
    Ok((StatusCode::CREATED, Json(deployment.into())))
}
