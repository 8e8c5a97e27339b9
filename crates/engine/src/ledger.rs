//! Credentials created by a run that has not handed them off yet.
//!
//! The ledger lives outside the run's future. When a deadline drops that
//! future mid-flight, whatever it created is still listed here and can be
//! released.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::ResolvedCredential;

#[derive(Debug, Default)]
pub struct RunLedger {
    created: Mutex<Vec<ResolvedCredential>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<ResolvedCredential>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record(&self, credential: &ResolvedCredential) {
        self.entries().push(credential.clone());
    }

    /// Drop `external_id` once it has been deleted or handed off.
    pub(crate) fn settle(&self, external_id: &str) {
        self.entries().retain(|c| c.external_id != external_id);
    }

    /// Credentials still outstanding.
    pub fn outstanding(&self) -> Vec<ResolvedCredential> {
        self.entries().clone()
    }

    /// Hand every outstanding credential off to its new owner.
    pub fn commit(&self) {
        self.entries().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Origin;
    use nodes::CredentialKind;

    fn fresh(id: &str) -> ResolvedCredential {
        ResolvedCredential {
            kind: CredentialKind::Smtp,
            external_id: id.into(),
            display_name: "SMTP".into(),
            origin: Origin::FreshlyCreated,
        }
    }

    #[test]
    fn settled_entries_leave_the_ledger() {
        let ledger = RunLedger::new();
        ledger.record(&fresh("c-1"));
        ledger.record(&fresh("c-2"));

        ledger.settle("c-1");

        let ids: Vec<_> = ledger.outstanding().into_iter().map(|c| c.external_id).collect();
        assert_eq!(ids, vec!["c-2"]);
        ledger.commit();
        assert!(ledger.is_empty());
    }
}
