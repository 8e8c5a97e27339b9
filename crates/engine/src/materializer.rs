//! Template materialization.
//!
//! `Materializer` turns a stored template plus one user's inputs into a
//! deployable instance document and the manifest of credentials behind it:
//!
//! 1. Analyse credential requirements and check referenced inputs.
//! 2. Resolve every requirement (reusing, creating or falling back).
//! 3. Rewrite placeholders in the template text and parse the result.
//! 4. Bind credentials onto nodes, apply webhook path and schedule.
//! 5. Assemble the document and run the final consistency checks.
//!
//! Any failure after step 2 deletes the credentials this run created.

use std::sync::Arc;

use nodes::NodeCatalog;
use tracing::{info, instrument, warn};

use crate::analyzer::{analyze_requirements, referenced_inputs};
use crate::assembler::{assemble, verify, InstanceDocument};
use crate::binder::bind_credentials;
use crate::inputs::{TIMEZONE_FIELD, WORKFLOW_NAME_FIELD};
use crate::ledger::RunLedger;
use crate::locks::ProvisioningLocks;
use crate::models::{CredentialRequirement, DeployedInstanceManifest, ResolvedCredential, TemplateGraph, WorkflowTemplate};
use crate::placeholder::{self, RewriteContext};
use crate::ports::{AutomationService, CredentialStore};
use crate::resolver::{CredentialResolver, ResolveRequest, ResolvedCredentials};
use crate::schedule::DailyTrigger;
use crate::webhook::{apply_webhook, webhook_path};
use crate::{EngineConfig, EngineError, UserInputs};

/// Output of one successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialization {
    pub instance_document: InstanceDocument,
    pub manifest: DeployedInstanceManifest,
}

impl Materialization {
    pub fn webhook_path(&self) -> &str {
        &self.manifest.webhook_path
    }

    pub fn resolved_credentials(&self) -> &[ResolvedCredential] {
        &self.manifest.resolved_credentials
    }
}

pub struct Materializer {
    store: Arc<dyn CredentialStore>,
    service: Arc<dyn AutomationService>,
    catalog: NodeCatalog,
    config: EngineConfig,
    locks: Arc<ProvisioningLocks>,
}

impl Materializer {
    /// Create a materializer using the built-in node catalogue.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        service: Arc<dyn AutomationService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            service,
            catalog: NodeCatalog::builtin(),
            config,
            locks: Arc::new(ProvisioningLocks::new()),
        }
    }

    pub fn with_catalog(mut self, catalog: NodeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Share provisioning locks with other materializers in this process.
    pub fn with_locks(mut self, locks: Arc<ProvisioningLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn catalog(&self) -> &NodeCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn service(&self) -> &dyn AutomationService {
        self.service.as_ref()
    }

    /// Credential requirements of `template`. No I/O.
    pub fn requirements(&self, template: &WorkflowTemplate) -> Result<Vec<CredentialRequirement>, EngineError> {
        analyze_requirements(template, &self.catalog)
    }

    /// Materialize `template` for `user_id`.
    ///
    /// # Errors
    /// - [`EngineError::Validation`] for missing inputs or an unresolvable
    ///   requirement.
    /// - [`EngineError::UpstreamProvisioning`] if the service rejects a
    ///   credential.
    /// - [`EngineError::Binding`] for uncatalogued node types carrying
    ///   credentials.
    /// - [`EngineError::Consistency`] if the assembled instance fails its checks.
    ///
    /// No credential this run created outlives a failed run.
    pub async fn materialize(
        &self,
        template: &WorkflowTemplate,
        inputs: &UserInputs,
        user_id: &str,
    ) -> Result<Materialization, EngineError> {
        self.materialize_tracked(template, inputs, user_id, &RunLedger::new()).await
    }

    /// Like [`Materializer::materialize`], listing every credential the run
    /// creates in `ledger` until it is released. A caller that abandons the
    /// run can release what is still outstanding with
    /// [`Materializer::release_ledger`].
    #[instrument(skip(self, template, inputs, ledger), fields(template_id = %template.id))]
    pub async fn materialize_tracked(
        &self,
        template: &WorkflowTemplate,
        inputs: &UserInputs,
        user_id: &str,
        ledger: &RunLedger,
    ) -> Result<Materialization, EngineError> {
        let requirements = analyze_requirements(template, &self.catalog)?;

        let missing: Vec<String> = referenced_inputs(template)
            .into_iter()
            .filter(|field| !inputs.contains(field))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::validation("template inputs", missing));
        }
        let trigger = DailyTrigger::from_inputs(inputs)?;

        let resolver = self.resolver().with_ledger(ledger);
        let resolved = resolver
            .resolve(&ResolveRequest {
                requirements: &requirements,
                inputs,
                user_id,
                template_id: &template.id,
            })
            .await?;

        match self.build(template, inputs, user_id, &resolved, trigger) {
            Ok(materialization) => {
                info!(
                    "materialized '{}' for user {} ({} node(s), {} credential(s), webhook /{})",
                    template.id,
                    user_id,
                    materialization.instance_document.nodes.len(),
                    materialization.manifest.resolved_credentials.len(),
                    materialization.manifest.webhook_path
                );
                Ok(materialization)
            }
            Err(e) => {
                warn!("materialization of '{}' failed after resolution: {}", template.id, e);
                resolver.release(user_id, &resolved.credentials()).await;
                Err(e)
            }
        }
    }

    /// Delete the credentials a manifest records as freshly created.
    ///
    /// Used by callers whose deployment fails after a successful run.
    pub async fn release(&self, manifest: &DeployedInstanceManifest) {
        self.resolver()
            .release(&manifest.user_id, &manifest.resolved_credentials)
            .await;
    }

    /// Delete the credentials still outstanding in `ledger` for `user_id`.
    pub async fn release_ledger(&self, user_id: &str, ledger: &RunLedger) {
        let outstanding = ledger.outstanding();
        if !outstanding.is_empty() {
            self.resolver().with_ledger(ledger).release(user_id, &outstanding).await;
        }
    }

    fn resolver(&self) -> CredentialResolver<'_> {
        CredentialResolver::new(self.store.as_ref(), self.service.as_ref(), &self.config, &self.locks)
    }

    fn build(
        &self,
        template: &WorkflowTemplate,
        inputs: &UserInputs,
        user_id: &str,
        resolved: &ResolvedCredentials,
        trigger: Option<DailyTrigger>,
    ) -> Result<Materialization, EngineError> {
        let path = webhook_path(&template.id, user_id);

        let context = RewriteContext {
            resolved,
            inputs,
            webhook_path: &path,
            user_id,
            template_id: &template.id,
        };
        let text = placeholder::rewrite(template.source(), &context)?;
        let mut graph: TemplateGraph = serde_json::from_str(&text)
            .map_err(|e| EngineError::Consistency(format!("rewritten template does not parse: {e}")))?;

        bind_credentials(&mut graph, resolved, &self.catalog)?;
        apply_webhook(&mut graph, &path);
        if let Some(trigger) = trigger {
            trigger.apply(&mut graph);
        }

        let name = inputs
            .text(WORKFLOW_NAME_FIELD)
            .unwrap_or_else(|| template.name.clone());
        let document = assemble(graph, name, inputs.text(TIMEZONE_FIELD));
        verify(&document, resolved)?;

        Ok(Materialization {
            instance_document: document,
            manifest: DeployedInstanceManifest {
                template_id: template.id.clone(),
                user_id: user_id.to_owned(),
                webhook_path: path,
                resolved_credentials: resolved.credentials(),
            },
        })
    }
}
