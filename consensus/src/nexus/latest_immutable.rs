use super::SignedStateNexus;
use parking_lot::Mutex;
use weave_consensus_core::{Round, state::ReservedSignedState};

/// Holds the latest immutable state, whatever its round
pub struct LatestImmutableStateNexus<S> {
    current: Mutex<Option<ReservedSignedState<S>>>,
}

impl<S> LatestImmutableStateNexus<S> {
    pub fn new() -> Self {
        Self { current: Mutex::new(None) }
    }
}

impl<S> Default for LatestImmutableStateNexus<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync> SignedStateNexus<S> for LatestImmutableStateNexus<S> {
    fn get_state(&self, reason: &str) -> Option<ReservedSignedState<S>> {
        self.current.lock().as_ref().and_then(|current| current.try_get_and_reserve(reason))
    }

    fn set_state(&self, state: Option<ReservedSignedState<S>>) {
        let previous = std::mem::replace(&mut *self.current.lock(), state);
        // Released outside of the lock since destruction may run an arbitrary hook
        drop(previous);
    }

    fn round(&self) -> Option<Round> {
        self.current.lock().as_ref().map(|current| current.round())
    }
}
