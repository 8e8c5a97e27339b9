//! Credential resolution.
//!
//! Each requirement is resolved on its own, in strict priority order:
//!
//! 1. a credential id the user supplied directly (`UserSupplied`);
//! 2. a credential previously stored for `(user, kind)` (`Reused`), retrying
//!    a few times when the user has just authorized and the store lags;
//! 3. a new credential created from raw fields the user supplied
//!    (`FreshlyCreated`);
//! 4. for `Admin` requirements, the system-owned shared singleton
//!    (`SystemShared`), created once on first use;
//! 5. otherwise a validation error naming what is missing.
//!
//! Admin-scoped requirements are resolved before user-scoped ones. Calls to
//! the store and the service are issued one at a time.

use nodes::{CredentialKind, Provisioning, Scope, StorageChoice};
use tracing::{debug, info, instrument, warn};

use crate::config::SYSTEM_OWNER;
use crate::ledger::RunLedger;
use crate::locks::ProvisioningLocks;
use crate::models::{ConditionalOption, CredentialRequirement, Origin, RequirementKind, ResolvedCredential};
use crate::ports::{AutomationService, CredentialCreate, CredentialStore};
use crate::{EngineConfig, EngineError, UserInputs};

// ---------------------------------------------------------------------------
// Resolution results
// ---------------------------------------------------------------------------

/// System-owned shared credentials, resolved at most once per run and handed
/// down explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminCredentials {
    by_kind: Vec<ResolvedCredential>,
}

impl AdminCredentials {
    pub fn get(&self, kind: CredentialKind) -> Option<&ResolvedCredential> {
        self.by_kind.iter().find(|c| c.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    fn insert(&mut self, credential: ResolvedCredential) {
        if self.get(credential.kind).is_none() {
            self.by_kind.push(credential);
        }
    }
}

/// Everything one run resolved, keyed by `(kind, scope)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedCredentials {
    entries: Vec<((CredentialKind, Scope), ResolvedCredential)>,
    storage: Option<(StorageChoice, Scope)>,
    admin: AdminCredentials,
}

impl ResolvedCredentials {
    pub fn get(&self, kind: CredentialKind, scope: Scope) -> Option<&ResolvedCredential> {
        self.entries
            .iter()
            .find(|(key, _)| *key == (kind, scope))
            .map(|(_, c)| c)
    }

    /// The credential for `kind` under any scope, user scope first.
    pub fn any_scope(&self, kind: CredentialKind) -> Option<&ResolvedCredential> {
        self.get(kind, Scope::User).or_else(|| self.get(kind, Scope::Admin))
    }

    pub fn storage_choice(&self) -> Option<StorageChoice> {
        self.storage.map(|(choice, _)| choice)
    }

    /// Credential backing the selected storage backend.
    pub fn storage_credential(&self) -> Option<&ResolvedCredential> {
        let (choice, scope) = self.storage?;
        self.get(choice.kind(), scope)
    }

    pub fn admin(&self) -> &AdminCredentials {
        &self.admin
    }

    /// Whether `external_id` is one of this run's resolved credentials.
    pub fn contains_external_id(&self, external_id: &str) -> bool {
        self.entries.iter().any(|(_, c)| c.external_id == external_id)
    }

    /// Distinct credentials in resolution order.
    pub fn credentials(&self) -> Vec<ResolvedCredential> {
        let mut out: Vec<ResolvedCredential> = Vec::new();
        for (_, credential) in &self.entries {
            if !out.iter().any(|c| c.external_id == credential.external_id) {
                out.push(credential.clone());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn select_storage(&mut self, choice: StorageChoice, scope: Scope) {
        self.storage = Some((choice, scope));
    }

    pub(crate) fn insert(&mut self, kind: CredentialKind, scope: Scope, credential: ResolvedCredential) {
        if self.get(kind, scope).is_none() {
            self.entries.push(((kind, scope), credential));
        }
    }

    /// A credential for `kind` obtained on the user's behalf (not the admin
    /// singleton), whatever scope asked for it.
    fn user_owned(&self, kind: CredentialKind) -> Option<&ResolvedCredential> {
        self.entries
            .iter()
            .map(|(_, c)| c)
            .find(|c| c.kind == kind && c.origin != Origin::SystemShared)
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Inputs of one resolution pass.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub requirements: &'a [CredentialRequirement],
    pub inputs: &'a UserInputs,
    pub user_id: &'a str,
    pub template_id: &'a str,
}

pub struct CredentialResolver<'a> {
    store: &'a dyn CredentialStore,
    service: &'a dyn AutomationService,
    config: &'a EngineConfig,
    locks: &'a ProvisioningLocks,
    ledger: Option<&'a RunLedger>,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(
        store: &'a dyn CredentialStore,
        service: &'a dyn AutomationService,
        config: &'a EngineConfig,
        locks: &'a ProvisioningLocks,
    ) -> Self {
        Self { store, service, config, locks, ledger: None }
    }

    /// Track freshly created credentials in `ledger` until they are released
    /// or committed.
    pub fn with_ledger(mut self, ledger: &'a RunLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Resolve every requirement.
    ///
    /// On failure, credentials this pass already created are deleted again
    /// before the error is returned.
    #[instrument(skip_all, fields(user_id = %request.user_id, template_id = %request.template_id))]
    pub async fn resolve(&self, request: &ResolveRequest<'_>) -> Result<ResolvedCredentials, EngineError> {
        let mut ordered: Vec<&CredentialRequirement> = request.requirements.iter().collect();
        ordered.sort_by_key(|r| r.scope);

        let mut resolved = ResolvedCredentials::default();
        for requirement in ordered {
            if let Err(e) = self.resolve_requirement(requirement, request, &mut resolved).await {
                self.release(request.user_id, &resolved.credentials()).await;
                return Err(e);
            }
        }

        info!(
            "resolved {} credential requirement(s) into {} credential(s)",
            request.requirements.len(),
            resolved.credentials().len()
        );
        Ok(resolved)
    }

    /// Delete the `FreshlyCreated` credentials among `credentials`.
    ///
    /// Best effort: failures are logged and the rest are still attempted.
    pub async fn release(&self, user_id: &str, credentials: &[ResolvedCredential]) {
        for credential in credentials.iter().filter(|c| c.origin == Origin::FreshlyCreated) {
            match self.service.delete_credential(&credential.external_id).await {
                Ok(()) => info!("deleted credential {} ({})", credential.external_id, credential.kind),
                Err(e) => warn!(
                    "failed to delete credential {} ({}): {}",
                    credential.external_id, credential.kind, e
                ),
            }

            if self.config.reuses(credential.kind) {
                if let Err(e) = self.store.forget(user_id, &credential.external_id).await {
                    warn!("failed to forget credential {}: {}", credential.external_id, e);
                }
            }
            if let Some(ledger) = self.ledger {
                ledger.settle(&credential.external_id);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn resolve_requirement(
        &self,
        requirement: &CredentialRequirement,
        request: &ResolveRequest<'_>,
        resolved: &mut ResolvedCredentials,
    ) -> Result<(), EngineError> {
        let kind = match &requirement.kind {
            RequirementKind::Fixed { kind } => *kind,
            RequirementKind::Conditional { selector_field, options } => {
                let choice = select_option(selector_field, options, request.inputs)?;
                debug!("storage backend '{}' selected via {}", choice, selector_field);
                resolved.select_storage(choice, requirement.scope);
                choice.kind()
            }
        };

        if resolved.get(kind, requirement.scope).is_some() {
            return Ok(());
        }

        let credential = self.resolve_kind(kind, requirement.scope, request, resolved).await?;
        resolved.insert(kind, requirement.scope, credential);
        Ok(())
    }

    async fn resolve_kind(
        &self,
        kind: CredentialKind,
        scope: Scope,
        request: &ResolveRequest<'_>,
        resolved: &mut ResolvedCredentials,
    ) -> Result<ResolvedCredential, EngineError> {
        let inputs = request.inputs;

        // Already obtained for this user under the other scope.
        if let Some(existing) = resolved.user_owned(kind) {
            return Ok(existing.clone());
        }

        // 1. Direct reference.
        if let Some(external_id) = inputs.credential_override(kind) {
            debug!("{kind}: using user-supplied credential {external_id}");
            return Ok(ResolvedCredential {
                kind,
                external_id,
                display_name: inputs
                    .credential_override_name(kind)
                    .unwrap_or_else(|| kind.display_name().to_owned()),
                origin: Origin::UserSupplied,
            });
        }

        // 2 + 3. Reuse, else create, under the provisioning lock.
        let missing = {
            let _guard = self.locks.acquire(request.user_id, kind).await;

            if let Some(found) = self
                .lookup_with_retry(request.user_id, kind, inputs.just_connected(kind))
                .await?
            {
                debug!("{kind}: reusing stored credential {}", found.external_id);
                return Ok(found);
            }

            match kind.provision(|field| inputs.text(field)) {
                Provisioning::Complete(data) => {
                    let name = format!("{} ({})", kind.display_name(), request.template_id);
                    return self.create(request.user_id, kind, name, data, Origin::FreshlyCreated).await;
                }
                Provisioning::Invalid { field, message } => {
                    return Err(EngineError::validation(format!("{kind}: {message}"), vec![field]));
                }
                Provisioning::Missing(fields) => {
                    // Half-filled raw fields mean the user wants their own
                    // credential; don't paper over it with the shared one.
                    if scope == Scope::Admin && supplied_any_field(kind, inputs) {
                        return Err(EngineError::validation(requirement_label(kind, scope), fields));
                    }
                    fields
                }
                Provisioning::NotProvisionable => vec![kind.override_field()],
            }
        };

        // 4. Shared admin singleton.
        if scope == Scope::Admin {
            if let Some(shared) = self.resolve_admin(kind, resolved).await? {
                return Ok(shared);
            }
        }

        // 5. Nothing left.
        Err(EngineError::validation(requirement_label(kind, scope), missing))
    }

    async fn lookup_with_retry(
        &self,
        owner_id: &str,
        kind: CredentialKind,
        just_connected: bool,
    ) -> Result<Option<ResolvedCredential>, EngineError> {
        let attempts = if just_connected { self.config.lookup_retries.saturating_add(1) } else { 1 };

        for attempt in 1..=attempts {
            if let Some(mut found) = self.store.lookup(owner_id, kind).await?.into_iter().next() {
                found.origin = Origin::Reused;
                return Ok(Some(found));
            }
            if attempt < attempts {
                debug!(
                    "{kind}: no stored credential yet (attempt {attempt}/{attempts}), retrying in {:?}",
                    self.config.lookup_retry_delay
                );
                tokio::time::sleep(self.config.lookup_retry_delay).await;
            }
        }

        if just_connected {
            warn!("{kind}: authorization reported but nothing stored after {attempts} lookup(s)");
        }
        Ok(None)
    }

    /// The shared credential for `kind`, or `None` if the system has none
    /// and no admin fields are configured to create one.
    async fn resolve_admin(
        &self,
        kind: CredentialKind,
        resolved: &mut ResolvedCredentials,
    ) -> Result<Option<ResolvedCredential>, EngineError> {
        if let Some(shared) = resolved.admin.get(kind) {
            return Ok(Some(shared.clone()));
        }

        let _guard = self.locks.acquire(SYSTEM_OWNER, kind).await;

        let shared = match self.store.lookup(SYSTEM_OWNER, kind).await?.into_iter().next() {
            Some(mut existing) => {
                existing.origin = Origin::SystemShared;
                existing
            }
            None => match kind.provision(|field| self.config.admin_inputs.text(field)) {
                Provisioning::Complete(data) => {
                    let name = format!("Shared {}", kind.display_name());
                    self.create(SYSTEM_OWNER, kind, name, data, Origin::SystemShared).await?
                }
                other => {
                    warn!("{kind}: no shared admin credential configured ({})", admin_gap(&other));
                    return Ok(None);
                }
            },
        };

        resolved.admin.insert(shared.clone());
        Ok(Some(shared))
    }

    async fn create(
        &self,
        owner_id: &str,
        kind: CredentialKind,
        name: String,
        data: serde_json::Value,
        origin: Origin,
    ) -> Result<ResolvedCredential, EngineError> {
        let request = CredentialCreate { name, kind, data };
        let created = self
            .service
            .create_credential(&request)
            .await
            .map_err(|e| e.into_engine("credential create"))?;

        let credential = ResolvedCredential {
            kind,
            external_id: created.id,
            display_name: created.name,
            origin,
        };
        info!("created {} credential {} for owner {}", kind, credential.external_id, owner_id);
        if let (Some(ledger), Origin::FreshlyCreated) = (self.ledger, origin) {
            ledger.record(&credential);
        }

        let remember = origin == Origin::SystemShared || self.config.reuses(kind);
        if remember {
            if let Err(e) = self.store.record(owner_id, &credential).await {
                match self.service.delete_credential(&credential.external_id).await {
                    Ok(()) => {
                        if let Some(ledger) = self.ledger {
                            ledger.settle(&credential.external_id);
                        }
                    }
                    Err(del) => warn!("failed to delete unrecorded credential {}: {}", credential.external_id, del),
                }
                return Err(e);
            }
        }

        Ok(credential)
    }
}

fn select_option(
    selector_field: &str,
    options: &[ConditionalOption],
    inputs: &UserInputs,
) -> Result<StorageChoice, EngineError> {
    let raw = inputs
        .text(selector_field)
        .ok_or_else(|| EngineError::validation("storage backend", vec![selector_field.to_owned()]))?;

    let choice: StorageChoice = raw.parse().map_err(|e: nodes::CatalogError| {
        EngineError::validation(format!("storage backend ({e})"), vec![selector_field.to_owned()])
    })?;

    if !options.iter().any(|o| o.value == choice) {
        return Err(EngineError::validation(
            format!("storage backend ('{choice}' not offered)"),
            vec![selector_field.to_owned()],
        ));
    }
    Ok(choice)
}

fn supplied_any_field(kind: CredentialKind, inputs: &UserInputs) -> bool {
    kind.fields()
        .iter()
        .any(|spec| inputs.contains(&format!("{}_{}", kind.input_prefix(), spec.suffix)))
}

fn requirement_label(kind: CredentialKind, scope: Scope) -> String {
    format!("{} ({scope})", kind.display_name())
}

/// Secret-free summary of why admin provisioning was impossible.
fn admin_gap(provisioning: &Provisioning) -> String {
    match provisioning {
        Provisioning::Missing(fields) => format!("missing {}", fields.join(", ")),
        Provisioning::Invalid { field, .. } => format!("invalid {field}"),
        Provisioning::NotProvisionable => "kind requires authorization".to_owned(),
        Provisioning::Complete(_) => "complete".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{InMemoryCredentialStore, RecordingAutomationService};
    use std::time::Duration;

    fn mail_inputs() -> UserInputs {
        UserInputs::new()
            .with("smtp_user", "alice")
            .with("smtp_password", "secret")
            .with("smtp_host", "mail.example.com")
    }

    async fn run(
        store: &InMemoryCredentialStore,
        service: &RecordingAutomationService,
        config: &EngineConfig,
        requirements: &[CredentialRequirement],
        inputs: &UserInputs,
    ) -> Result<ResolvedCredentials, EngineError> {
        let locks = ProvisioningLocks::new();
        let resolver = CredentialResolver::new(store, service, config, &locks);
        resolver
            .resolve(&ResolveRequest { requirements, inputs, user_id: "u1", template_id: "tpl" })
            .await
    }

    #[tokio::test]
    async fn direct_override_wins_over_everything() {
        let store = InMemoryCredentialStore::new().with_credential("u1", CredentialKind::Smtp, "stored-1", "Old");
        let service = RecordingAutomationService::new();
        let inputs = mail_inputs().with("smtp_credential_id", "mine-42");

        let resolved = run(
            &store,
            &service,
            &EngineConfig::default(),
            &[CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User)],
            &inputs,
        )
        .await
        .unwrap();

        let c = resolved.get(CredentialKind::Smtp, Scope::User).unwrap();
        assert_eq!(c.external_id, "mine-42");
        assert_eq!(c.origin, Origin::UserSupplied);
        assert_eq!(store.lookup_count(), 0);
        assert!(service.created_credentials().is_empty());
    }

    #[tokio::test]
    async fn stored_credential_is_reused_before_creating() {
        let store = InMemoryCredentialStore::new().with_credential("u1", CredentialKind::Smtp, "stored-1", "Mine");
        let service = RecordingAutomationService::new();

        let resolved = run(
            &store,
            &service,
            &EngineConfig::default(),
            &[CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User)],
            &mail_inputs(),
        )
        .await
        .unwrap();

        let c = resolved.get(CredentialKind::Smtp, Scope::User).unwrap();
        assert_eq!((c.external_id.as_str(), c.origin), ("stored-1", Origin::Reused));
        assert!(service.created_credentials().is_empty());
    }

    #[tokio::test]
    async fn raw_fields_create_a_fresh_credential() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();

        let resolved = run(
            &store,
            &service,
            &EngineConfig::default(),
            &[CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User)],
            &mail_inputs(),
        )
        .await
        .unwrap();

        let c = resolved.get(CredentialKind::Smtp, Scope::User).unwrap();
        assert_eq!(c.origin, Origin::FreshlyCreated);
        let created = service.created_credentials();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].data["host"], "mail.example.com");
        // Isolation policy by default: nothing remembered.
        assert!(store.records("u1").is_empty());
    }

    #[tokio::test]
    async fn reuse_policy_records_fresh_credentials() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        let mut config = EngineConfig::default();
        config.reuse_across_deployments.insert(CredentialKind::Smtp);

        run(
            &store,
            &service,
            &config,
            &[CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User)],
            &mail_inputs(),
        )
        .await
        .unwrap();

        assert_eq!(store.records("u1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn just_connected_lookup_retries_until_indexed() {
        let store = InMemoryCredentialStore::new().with_credential("u1", CredentialKind::GmailOAuth2, "g-1", "Gmail");
        store.hide_next_lookups(2);
        let service = RecordingAutomationService::new();
        let config = EngineConfig { lookup_retry_delay: Duration::from_millis(500), ..EngineConfig::default() };

        let resolved = run(
            &store,
            &service,
            &config,
            &[CredentialRequirement::fixed(CredentialKind::GmailOAuth2, Scope::User)],
            &UserInputs::new().with("gmail_connected", true),
        )
        .await
        .unwrap();

        assert_eq!(resolved.get(CredentialKind::GmailOAuth2, Scope::User).unwrap().external_id, "g-1");
        assert_eq!(store.lookup_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_is_bounded() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        let config = EngineConfig { lookup_retries: 2, ..EngineConfig::default() };

        let err = run(
            &store,
            &service,
            &config,
            &[CredentialRequirement::fixed(CredentialKind::GmailOAuth2, Scope::User)],
            &UserInputs::new().with("gmail_connected", "true"),
        )
        .await
        .unwrap_err();

        assert_eq!(store.lookup_count(), 3);
        assert!(matches!(err, EngineError::Validation { missing_fields, .. }
            if missing_fields == vec!["gmail_credential_id".to_string()]));
    }

    #[tokio::test]
    async fn without_connection_flag_there_is_a_single_lookup() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();

        let _ = run(
            &store,
            &service,
            &EngineConfig::default(),
            &[CredentialRequirement::fixed(CredentialKind::GmailOAuth2, Scope::User)],
            &UserInputs::new(),
        )
        .await;

        assert_eq!(store.lookup_count(), 1);
    }

    #[tokio::test]
    async fn admin_singleton_is_created_once_and_then_reused() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        let mut config = EngineConfig::default();
        config.admin_inputs = UserInputs::new().with("openai_api_key", "sk-admin");
        let reqs = [CredentialRequirement::fixed(CredentialKind::OpenAiApi, Scope::Admin)];

        let first = run(&store, &service, &config, &reqs, &UserInputs::new()).await.unwrap();
        let second = run(&store, &service, &config, &reqs, &UserInputs::new()).await.unwrap();

        let a = first.get(CredentialKind::OpenAiApi, Scope::Admin).unwrap();
        let b = second.get(CredentialKind::OpenAiApi, Scope::Admin).unwrap();
        assert_eq!(a.origin, Origin::SystemShared);
        assert_eq!(a.external_id, b.external_id);
        assert_eq!(service.created_credentials().len(), 1);
        assert_eq!(store.records(SYSTEM_OWNER).len(), 1);
        assert!(first.admin().get(CredentialKind::OpenAiApi).is_some());
    }

    #[tokio::test]
    async fn user_scope_never_falls_back_to_admin() {
        let store = InMemoryCredentialStore::new().with_credential(SYSTEM_OWNER, CredentialKind::Smtp, "relay", "Relay");
        let service = RecordingAutomationService::new();

        let err = run(
            &store,
            &service,
            &EngineConfig::default(),
            &[CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User)],
            &UserInputs::new().with("smtp_host", "mail.example.com"),
        )
        .await
        .unwrap_err();

        let EngineError::Validation { missing_fields, .. } = err else { panic!("expected validation") };
        assert_eq!(missing_fields, vec!["smtp_user", "smtp_password"]);
    }

    #[tokio::test]
    async fn half_filled_raw_fields_do_not_fall_back_to_admin() {
        let store = InMemoryCredentialStore::new().with_credential(SYSTEM_OWNER, CredentialKind::Smtp, "relay", "Relay");
        let service = RecordingAutomationService::new();

        let result = run(
            &store,
            &service,
            &EngineConfig::default(),
            &[CredentialRequirement::fixed(CredentialKind::Smtp, Scope::Admin)],
            &UserInputs::new().with("smtp_host", "mail.example.com"),
        )
        .await;

        assert!(matches!(result, Err(EngineError::Validation { .. })));
    }

    #[tokio::test]
    async fn conditional_requirement_resolves_only_the_selected_kind() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        let reqs = [crate::analyzer::storage_requirement("storage_backend", Scope::User)];
        let inputs = UserInputs::new()
            .with("storage_backend", "airtable")
            .with("airtable_access_token", "pat-123")
            .with("notion_api_key", "ignored");

        let resolved = run(&store, &service, &EngineConfig::default(), &reqs, &inputs).await.unwrap();

        assert_eq!(resolved.storage_choice(), Some(StorageChoice::Airtable));
        assert_eq!(resolved.storage_credential().unwrap().kind, CredentialKind::AirtableToken);
        assert_eq!(resolved.credentials().len(), 1);
        assert_eq!(service.created_credentials()[0].kind, CredentialKind::AirtableToken);
    }

    #[tokio::test]
    async fn missing_selector_names_the_field() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        let reqs = [crate::analyzer::storage_requirement("storage_backend", Scope::User)];

        let err = run(&store, &service, &EngineConfig::default(), &reqs, &UserInputs::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { missing_fields, .. }
            if missing_fields == vec!["storage_backend".to_string()]));
    }

    #[tokio::test]
    async fn failure_releases_credentials_created_earlier_in_the_run() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        let reqs = [
            CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User),
            CredentialRequirement::fixed(CredentialKind::GmailOAuth2, Scope::User),
        ];

        let err = run(&store, &service, &EngineConfig::default(), &reqs, &mail_inputs()).await.unwrap_err();

        assert!(matches!(err, EngineError::Validation { .. }));
        assert_eq!(service.created_credentials().len(), 1);
        assert_eq!(service.deleted_credentials(), vec!["cred-1".to_string()]);
    }

    #[tokio::test]
    async fn upstream_rejection_is_surfaced_with_status() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        service.fail_credentials_of(CredentialKind::Smtp, 400, "invalid host");

        let err = run(
            &store,
            &service,
            &EngineConfig::default(),
            &[CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User)],
            &mail_inputs(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::UpstreamProvisioning { status: Some(400), .. }));
    }

    #[tokio::test]
    async fn admin_requirements_resolve_before_user_ones() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        let reqs = [
            CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User),
            CredentialRequirement::fixed(CredentialKind::OpenAiApi, Scope::Admin),
        ];
        let inputs = mail_inputs().with("openai_api_key", "sk-user");

        run(&store, &service, &EngineConfig::default(), &reqs, &inputs).await.unwrap();

        let kinds: Vec<_> = service.created_credentials().into_iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CredentialKind::OpenAiApi, CredentialKind::Smtp]);
    }

    #[tokio::test]
    async fn ledger_tracks_fresh_credentials_until_released() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        let config = EngineConfig::default();
        let locks = ProvisioningLocks::new();
        let ledger = RunLedger::new();
        let resolver = CredentialResolver::new(&store, &service, &config, &locks).with_ledger(&ledger);
        let reqs = [CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User)];
        let inputs = mail_inputs();

        let resolved = resolver
            .resolve(&ResolveRequest { requirements: &reqs, inputs: &inputs, user_id: "u1", template_id: "tpl" })
            .await
            .unwrap();
        assert_eq!(ledger.outstanding(), resolved.credentials());

        resolver.release("u1", &resolved.credentials()).await;
        assert!(ledger.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn maximum_retry_setting_does_not_overflow() {
        let store = InMemoryCredentialStore::new().with_credential("u1", CredentialKind::GmailOAuth2, "g-1", "Gmail");
        let service = RecordingAutomationService::new();
        let config = EngineConfig { lookup_retries: u32::MAX, ..EngineConfig::default() };

        let resolved = run(
            &store,
            &service,
            &config,
            &[CredentialRequirement::fixed(CredentialKind::GmailOAuth2, Scope::User)],
            &UserInputs::new().with("gmail_connected", true),
        )
        .await
        .unwrap();

        assert_eq!(resolved.get(CredentialKind::GmailOAuth2, Scope::User).unwrap().external_id, "g-1");
        assert_eq!(store.lookup_count(), 1);
    }

    #[tokio::test]
    async fn same_kind_under_both_scopes_is_created_once() {
        let store = InMemoryCredentialStore::new();
        let service = RecordingAutomationService::new();
        let reqs = [
            CredentialRequirement::fixed(CredentialKind::Smtp, Scope::User),
            CredentialRequirement::fixed(CredentialKind::Smtp, Scope::Admin),
        ];

        let resolved = run(&store, &service, &EngineConfig::default(), &reqs, &mail_inputs()).await.unwrap();

        assert_eq!(service.created_credentials().len(), 1);
        assert_eq!(
            resolved.get(CredentialKind::Smtp, Scope::User),
            resolved.get(CredentialKind::Smtp, Scope::Admin)
        );
        assert_eq!(resolved.credentials().len(), 1);
    }
}
