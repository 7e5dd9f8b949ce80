//! Participant identity: one opaque id per browser profile, generated once
//! and persisted for the lifetime of local storage.

use std::sync::Arc;
use tracing::debug;

use records::{LocalStore, ParticipantId};

const PARTICIPANT_KEY: &str = "assist.participant";

pub struct IdentityProvider {
    store: Arc<LocalStore>,
}

impl IdentityProvider {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Returns the persisted participant id, minting one on first call.
    /// Idempotent; no error conditions.
    pub fn get_or_create(&self) -> ParticipantId {
        if let Some(id) = self.store.get::<ParticipantId>(PARTICIPANT_KEY) {
            return id;
        }
        let id = ParticipantId::new();
        self.store.set(PARTICIPANT_KEY, &id);
        debug!(%id, "minted participant identity");
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_across_calls_and_providers() {
        let store = Arc::new(LocalStore::in_memory());
        let provider = IdentityProvider::new(store.clone());

        let first = provider.get_or_create();
        assert_eq!(provider.get_or_create(), first);

        // A second provider over the same storage sees the same identity.
        let other = IdentityProvider::new(store);
        assert_eq!(other.get_or_create(), first);
    }

    #[test]
    fn separate_profiles_get_separate_identities() {
        let a = IdentityProvider::new(Arc::new(LocalStore::in_memory()));
        let b = IdentityProvider::new(Arc::new(LocalStore::in_memory()));
        assert_ne!(a.get_or_create(), b.get_or_create());
    }
}
