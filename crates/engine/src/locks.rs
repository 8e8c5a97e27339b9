//! Per-`(owner, kind)` provisioning locks.
//!
//! Lookup-then-create for one owner and kind runs under its lock, so two
//! concurrent deployments in this process can't both miss the store and
//! create duplicate credentials. Slots nobody holds or waits on are pruned on
//! the next acquire, so the map only holds keys in use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use nodes::CredentialKind;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct ProvisioningLocks {
    slots: Mutex<HashMap<(String, CredentialKind), Arc<AsyncMutex<()>>>>,
}

impl ProvisioningLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive provisioning rights on `(owner_id, kind)`.
    pub async fn acquire(&self, owner_id: &str, kind: CredentialKind) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Only the map's own handle left: idle.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry((owner_id.to_owned(), kind)).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of `(owner, kind)` slots currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
