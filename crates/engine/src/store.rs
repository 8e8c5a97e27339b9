//! Postgres-backed implementations of the store ports, over the `db` crate's
//! repository functions.

use async_trait::async_trait;
use db::repository::{credentials, deployments, templates};
use db::{DbError, DbPool};
use nodes::CredentialKind;
use tracing::warn;
use uuid::Uuid;

use crate::models::{DeployedInstanceManifest, Origin, ResolvedCredential, WorkflowTemplate};
use crate::ports::{CredentialStore, Deployment, DeploymentStore, TemplateStore};
use crate::EngineError;

pub struct PgTemplateStore {
    pool: DbPool,
}

impl PgTemplateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn get(&self, template_id: &str) -> Result<WorkflowTemplate, EngineError> {
        let row = match templates::get_template(&self.pool, template_id).await {
            Ok(row) => row,
            Err(DbError::NotFound) => return Err(EngineError::TemplateNotFound(template_id.to_owned())),
            Err(e) => return Err(e.into()),
        };
        WorkflowTemplate::new(row.id, row.name, row.definition)
    }
}

pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn lookup(&self, owner_id: &str, kind: CredentialKind) -> Result<Vec<ResolvedCredential>, EngineError> {
        let rows = credentials::list_credentials(&self.pool, owner_id, kind.type_key()).await?;
        Ok(rows
            .into_iter()
            .map(|row| ResolvedCredential {
                kind,
                external_id: row.external_id,
                display_name: row.display_name,
                origin: Origin::Reused,
            })
            .collect())
    }

    async fn record(&self, owner_id: &str, credential: &ResolvedCredential) -> Result<(), EngineError> {
        credentials::insert_credential(
            &self.pool,
            owner_id,
            credential.kind.type_key(),
            &credential.external_id,
            &credential.display_name,
        )
        .await?;
        Ok(())
    }

    async fn forget(&self, owner_id: &str, external_id: &str) -> Result<(), EngineError> {
        let removed = credentials::delete_credential(&self.pool, owner_id, external_id).await?;
        if removed == 0 {
            warn!("credential {} was not recorded for {}", external_id, owner_id);
        }
        Ok(())
    }
}

pub struct PgDeploymentStore {
    pool: DbPool,
}

impl PgDeploymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeploymentStore for PgDeploymentStore {
    async fn save(&self, deployment: &Deployment) -> Result<(), EngineError> {
        let manifest = serde_json::to_value(&deployment.manifest)
            .map_err(|e| EngineError::Consistency(format!("manifest does not serialize: {e}")))?;

        deployments::insert_deployment(
            &self.pool,
            deployment.id,
            &deployment.manifest.template_id,
            &deployment.manifest.user_id,
            &deployment.workflow_id,
            &deployment.manifest.webhook_path,
            manifest,
        )
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Deployment, EngineError> {
        let row = match deployments::get_deployment(&self.pool, id).await {
            Ok(row) => row,
            Err(DbError::NotFound) => return Err(EngineError::DeploymentNotFound(id)),
            Err(e) => return Err(e.into()),
        };
        let manifest: DeployedInstanceManifest = serde_json::from_value(row.manifest)
            .map_err(|e| EngineError::Consistency(format!("stored manifest of {id} is unreadable: {e}")))?;

        Ok(Deployment { id: row.id, workflow_id: row.workflow_id, manifest })
    }
}
