//!
//! Signed-state nexuses: thread-safe holders of one reserved signed state each.
//!
//! A nexus owns one reservation on the state it holds. Readers receive their own reservation through
//! [`SignedStateNexus::get_state`], so the held state can be replaced or released at any time without affecting them.
//!

mod latest_complete;
mod latest_immutable;

pub use latest_complete::LatestCompleteStateNexus;
pub use latest_immutable::LatestImmutableStateNexus;

use weave_consensus_core::{Round, state::ReservedSignedState};

pub trait SignedStateNexus<S>: Send + Sync {
    /// Returns a new reservation on the held state, if any. A state which is destroyed concurrently is not returned.
    fn get_state(&self, reason: &str) -> Option<ReservedSignedState<S>>;

    /// Replaces the held state. The reservation on the previous state is released.
    fn set_state(&self, state: Option<ReservedSignedState<S>>);

    /// The round of the held state
    fn round(&self) -> Option<Round>;

    fn clear(&self) {
        self.set_state(None);
    }
}
