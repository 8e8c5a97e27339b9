//! In-memory doubles for the store and service ports.
//!
//! Used by the tests and by dry-run previews, where nothing should reach a
//! database or the real automation service. Store lookups and credential
//! creates yield to the runtime once, so concurrent runs interleave the way
//! they would against real I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use nodes::CredentialKind;
use uuid::Uuid;

use crate::assembler::InstanceDocument;
use crate::models::{Origin, ResolvedCredential, WorkflowTemplate};
use crate::ports::{
    AutomationService, CreatedCredential, CreatedWorkflow, CredentialCreate, CredentialStore, Deployment,
    DeploymentStore, TemplateStore, UpstreamError,
};
use crate::EngineError;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryTemplateStore {
    templates: Mutex<HashMap<String, WorkflowTemplate>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: WorkflowTemplate) {
        locked(&self.templates).insert(template.id.clone(), template);
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn get(&self, template_id: &str) -> Result<WorkflowTemplate, EngineError> {
        locked(&self.templates)
            .get(template_id)
            .cloned()
            .ok_or_else(|| EngineError::TemplateNotFound(template_id.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Credential store that can simulate indexing lag: while `hidden` is
/// positive, lookups come back empty.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    by_owner: Mutex<HashMap<String, Vec<ResolvedCredential>>>,
    lookups: AtomicUsize,
    hidden: AtomicUsize,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seed of a stored credential.
    pub fn with_credential(self, owner_id: &str, kind: CredentialKind, external_id: &str, name: &str) -> Self {
        self.insert(
            owner_id,
            ResolvedCredential {
                kind,
                external_id: external_id.to_owned(),
                display_name: name.to_owned(),
                origin: Origin::Reused,
            },
        );
        self
    }

    /// Store `credential` as the most recent of its kind for `owner_id`.
    pub fn insert(&self, owner_id: &str, credential: ResolvedCredential) {
        locked(&self.by_owner)
            .entry(owner_id.to_owned())
            .or_default()
            .insert(0, credential);
    }

    /// Make the next `n` lookups miss.
    pub fn hide_next_lookups(&self, n: usize) {
        self.hidden.store(n, Ordering::SeqCst);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn records(&self, owner_id: &str) -> Vec<ResolvedCredential> {
        locked(&self.by_owner).get(owner_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn lookup(&self, owner_id: &str, kind: CredentialKind) -> Result<Vec<ResolvedCredential>, EngineError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let hiding = self
            .hidden
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let found = if hiding {
            Vec::new()
        } else {
            self.records(owner_id)
                .into_iter()
                .filter(|c| c.kind == kind)
                .map(|c| ResolvedCredential { origin: Origin::Reused, ..c })
                .collect()
        };
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn record(&self, owner_id: &str, credential: &ResolvedCredential) -> Result<(), EngineError> {
        self.insert(owner_id, credential.clone());
        Ok(())
    }

    async fn forget(&self, owner_id: &str, external_id: &str) -> Result<(), EngineError> {
        if let Some(list) = locked(&self.by_owner).get_mut(owner_id) {
            list.retain(|c| c.external_id != external_id);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Automation service
// ---------------------------------------------------------------------------

/// Automation service double that records every call and hands out
/// sequential ids (`cred-1`, `cred-2`, … and `wf-1`, …).
#[derive(Default)]
pub struct RecordingAutomationService {
    credentials: Mutex<Vec<CredentialCreate>>,
    deleted: Mutex<Vec<String>>,
    workflows: Mutex<Vec<InstanceDocument>>,
    failing_kinds: Mutex<HashMap<CredentialKind, UpstreamError>>,
    workflow_failure: Mutex<Option<UpstreamError>>,
    workflow_delay: Mutex<Option<Duration>>,
}

impl RecordingAutomationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject credential creates of `kind`.
    pub fn fail_credentials_of(&self, kind: CredentialKind, status: u16, message: &str) {
        locked(&self.failing_kinds).insert(kind, UpstreamError::new(Some(status), message));
    }

    /// Reject every workflow create.
    pub fn fail_workflows(&self, status: u16, message: &str) {
        *locked(&self.workflow_failure) = Some(UpstreamError::new(Some(status), message));
    }

    /// Make every workflow create take `delay` before answering.
    pub fn delay_workflows(&self, delay: Duration) {
        *locked(&self.workflow_delay) = Some(delay);
    }

    pub fn created_credentials(&self) -> Vec<CredentialCreate> {
        locked(&self.credentials).clone()
    }

    pub fn deleted_credentials(&self) -> Vec<String> {
        locked(&self.deleted).clone()
    }

    pub fn workflows(&self) -> Vec<InstanceDocument> {
        locked(&self.workflows).clone()
    }
}

#[async_trait]
impl AutomationService for RecordingAutomationService {
    async fn create_credential(&self, request: &CredentialCreate) -> Result<CreatedCredential, UpstreamError> {
        let failure = locked(&self.failing_kinds).get(&request.kind).cloned();
        if let Some(err) = failure {
            return Err(err);
        }
        tokio::task::yield_now().await;
        let mut created = locked(&self.credentials);
        created.push(request.clone());
        Ok(CreatedCredential { id: format!("cred-{}", created.len()), name: request.name.clone() })
    }

    async fn delete_credential(&self, credential_id: &str) -> Result<(), UpstreamError> {
        locked(&self.deleted).push(credential_id.to_owned());
        Ok(())
    }

    async fn create_workflow(&self, document: &InstanceDocument) -> Result<CreatedWorkflow, UpstreamError> {
        let delay = *locked(&self.workflow_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = locked(&self.workflow_failure).clone() {
            return Err(err);
        }
        let mut workflows = locked(&self.workflows);
        workflows.push(document.clone());
        Ok(CreatedWorkflow { id: format!("wf-{}", workflows.len()) })
    }
}

// ---------------------------------------------------------------------------
// Deployments
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDeploymentStore {
    deployments: Mutex<HashMap<Uuid, Deployment>>,
}

impl InMemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        locked(&self.deployments).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeploymentStore for InMemoryDeploymentStore {
    async fn save(&self, deployment: &Deployment) -> Result<(), EngineError> {
        locked(&self.deployments).insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Deployment, EngineError> {
        locked(&self.deployments)
            .get(&id)
            .cloned()
            .ok_or(EngineError::DeploymentNotFound(id))
    }
}
