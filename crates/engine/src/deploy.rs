//! End-to-end deployment: load a template, materialize it, create the
//! workflow remotely and record the result.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::analyzer::referenced_inputs;
use crate::ledger::RunLedger;
use crate::materializer::Materializer;
use crate::models::{CredentialRequirement, DeployedInstanceManifest};
use crate::ports::{Deployment, DeploymentStore, TemplateStore};
use crate::{EngineError, UserInputs};

/// What a user must supply to deploy a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateRequirements {
    pub template_id: String,
    pub name: String,
    pub credentials: Vec<CredentialRequirement>,
    /// Fields referenced through `{{input:…}}` placeholders.
    pub inputs: Vec<String>,
}

pub struct Deployer {
    templates: Arc<dyn TemplateStore>,
    deployments: Arc<dyn DeploymentStore>,
    materializer: Materializer,
}

impl Deployer {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        deployments: Arc<dyn DeploymentStore>,
        materializer: Materializer,
    ) -> Self {
        Self { templates, deployments, materializer }
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    pub async fn requirements(&self, template_id: &str) -> Result<TemplateRequirements, EngineError> {
        let template = self.templates.get(template_id).await?;
        Ok(TemplateRequirements {
            credentials: self.materializer.requirements(&template)?,
            inputs: referenced_inputs(&template),
            template_id: template.id,
            name: template.name,
        })
    }

    /// Deploy `template_id` for `user_id`.
    ///
    /// If the service rejects the workflow, credentials created for it are
    /// deleted before the error is returned. The whole run is bounded by
    /// `deploy_timeout`; when it fires, credentials created so far are
    /// deleted as well.
    #[instrument(skip(self, inputs))]
    pub async fn deploy(
        &self,
        template_id: &str,
        user_id: &str,
        inputs: &UserInputs,
    ) -> Result<Deployment, EngineError> {
        let ledger = RunLedger::new();
        let deadline = self.materializer.config().deploy_timeout;

        match tokio::time::timeout(deadline, self.run(template_id, user_id, inputs, &ledger)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("deployment of '{}' for user {} timed out after {:?}", template_id, user_id, deadline);
                self.materializer.release_ledger(user_id, &ledger).await;
                Err(EngineError::DeadlineExceeded { operation: "deployment", after: deadline })
            }
        }
    }

    async fn run(
        &self,
        template_id: &str,
        user_id: &str,
        inputs: &UserInputs,
        ledger: &RunLedger,
    ) -> Result<Deployment, EngineError> {
        let template = self.templates.get(template_id).await?;
        let materialization = self
            .materializer
            .materialize_tracked(&template, inputs, user_id, ledger)
            .await?;

        let created = match self
            .materializer
            .service()
            .create_workflow(&materialization.instance_document)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                self.materializer.release_ledger(user_id, ledger).await;
                return Err(e.into_engine("workflow create"));
            }
        };
        // The remote workflow now uses these credentials.
        ledger.commit();

        let deployment = Deployment {
            id: Uuid::new_v4(),
            workflow_id: created.id,
            manifest: materialization.manifest,
        };

        if let Err(e) = self.deployments.save(&deployment).await {
            error!(
                "workflow {} deployed for user {} but not recorded: {}",
                deployment.workflow_id, user_id, e
            );
            return Err(e);
        }

        info!(
            "deployed template '{}' for user {} as workflow {} (deployment {})",
            template_id, user_id, deployment.workflow_id, deployment.id
        );
        Ok(deployment)
    }

    pub async fn deployment(&self, id: Uuid) -> Result<Deployment, EngineError> {
        self.deployments.get(id).await
    }

    /// Delete the freshly created credentials recorded in `manifest`.
    pub async fn cleanup(&self, manifest: &DeployedInstanceManifest) {
        self.materializer.release(manifest).await;
    }
}
