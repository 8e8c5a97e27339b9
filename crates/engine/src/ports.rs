//! Collaborator contracts: the stores and the remote automation service the
//! engine talks to.
//!
//! Defined here so the engine, the Postgres adapters in `store`, the HTTP
//! client in `client` and the in-memory doubles in `mock` all meet at the
//! same trait objects.

use async_trait::async_trait;
use nodes::CredentialKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::assembler::InstanceDocument;
use crate::models::{DeployedInstanceManifest, ResolvedCredential, WorkflowTemplate};
use crate::EngineError;

/// Failure reported by the automation service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UpstreamError {
    /// HTTP status, when the service answered at all.
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub(crate) fn into_engine(self, operation: &'static str) -> EngineError {
        EngineError::UpstreamProvisioning {
            operation,
            status: self.status,
            message: self.message,
        }
    }
}

/// Body of a credential create call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialCreate {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    /// Kind-specific secret fields. Never logged.
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedCredential {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedWorkflow {
    pub id: String,
}

/// Read access to stored workflow templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// # Errors
    /// [`EngineError::TemplateNotFound`] when no such template exists.
    async fn get(&self, template_id: &str) -> Result<WorkflowTemplate, EngineError>;
}

/// Previously obtained credentials, per owner and kind.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credentials of `kind` held by `owner_id`, most recent first. Entries
    /// come back with origin `Reused`.
    async fn lookup(
        &self,
        owner_id: &str,
        kind: CredentialKind,
    ) -> Result<Vec<ResolvedCredential>, EngineError>;

    /// Remember a credential so later runs can reuse it.
    async fn record(&self, owner_id: &str, credential: &ResolvedCredential) -> Result<(), EngineError>;

    /// Forget a credential previously recorded.
    async fn forget(&self, owner_id: &str, external_id: &str) -> Result<(), EngineError>;
}

/// The remote automation service.
#[async_trait]
pub trait AutomationService: Send + Sync {
    async fn create_credential(&self, request: &CredentialCreate) -> Result<CreatedCredential, UpstreamError>;

    async fn delete_credential(&self, credential_id: &str) -> Result<(), UpstreamError>;

    async fn create_workflow(&self, document: &InstanceDocument) -> Result<CreatedWorkflow, UpstreamError>;
}

/// A persisted deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: uuid::Uuid,
    pub workflow_id: String,
    pub manifest: DeployedInstanceManifest,
}

/// Where deployments are recorded once the service accepted the workflow.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn save(&self, deployment: &Deployment) -> Result<(), EngineError>;

    /// # Errors
    /// [`EngineError::DeploymentNotFound`] when no such deployment exists.
    async fn get(&self, id: uuid::Uuid) -> Result<Deployment, EngineError>;
}
