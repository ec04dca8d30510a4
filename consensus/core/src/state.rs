//!
//! Signed states and the reservations guarding their lifetime.
//!
//! A [`SignedState`] is shared through `Arc`, but its logical lifetime is governed by reservations: the state is
//! destroyed (its destroy hook runs, e.g. handing the backing data to a background deleter) exactly once, when the
//! last reservation is released. Each reservation is represented by a move-only [`ReservedSignedState`].
//!

use crate::Round;
use std::{
    fmt::{Debug, Formatter},
    ops::Deref,
    sync::Arc,
};
use weave_utils::refcount::ReferenceCounter;

pub struct SignedState<S> {
    round: Round,
    state: S,
    reservations: ReferenceCounter,
}

impl<S> SignedState<S> {
    pub fn new(round: Round, state: S) -> Arc<Self> {
        Arc::new(Self { round, state, reservations: ReferenceCounter::new() })
    }

    /// Creates a state whose `on_destroy` hook is called with its round once the last reservation is released
    pub fn with_destroy_hook(round: Round, state: S, on_destroy: impl Fn(Round) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { round, state, reservations: ReferenceCounter::with_on_zero(move || on_destroy(round)) })
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Outstanding reservations, `None` once destroyed
    pub fn reservation_count(&self) -> Option<u64> {
        self.reservations.count()
    }

    pub fn is_destroyed(&self) -> bool {
        self.reservations.is_destroyed()
    }

    /// Takes a reservation.
    ///
    /// # Panics
    /// Panics if the state was already destroyed.
    pub fn reserve(self: &Arc<Self>, reason: &str) -> ReservedSignedState<S> {
        self.reservations.reserve();
        ReservedSignedState { state: self.clone(), reason: reason.to_owned() }
    }

    /// Takes a reservation unless the state is already destroyed
    pub fn try_reserve(self: &Arc<Self>, reason: &str) -> Option<ReservedSignedState<S>> {
        self.reservations.try_reserve().then(|| ReservedSignedState { state: self.clone(), reason: reason.to_owned() })
    }
}

impl<S> Debug for SignedState<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedState").field("round", &self.round).field("reservations", &self.reservations).finish()
    }
}

/// One reservation on a [`SignedState`]. Dropping or closing the handle releases the reservation exactly once.
pub struct ReservedSignedState<S> {
    state: Arc<SignedState<S>>,
    reason: String,
}

impl<S> ReservedSignedState<S> {
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Takes an additional, independent reservation on the same state
    pub fn get_and_reserve(&self, reason: &str) -> ReservedSignedState<S> {
        self.state.reserve(reason)
    }

    pub fn try_get_and_reserve(&self, reason: &str) -> Option<ReservedSignedState<S>> {
        self.state.try_reserve(reason)
    }

    pub fn signed_state(&self) -> &Arc<SignedState<S>> {
        &self.state
    }

    /// Releases the reservation
    pub fn close(self) {
        drop(self)
    }
}

impl<S> Deref for ReservedSignedState<S> {
    type Target = SignedState<S>;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl<S> Drop for ReservedSignedState<S> {
    fn drop(&mut self) {
        self.state.reservations.release();
    }
}

impl<S> Debug for ReservedSignedState<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservedSignedState").field("round", &self.state.round).field("reason", &self.reason).finish()
    }
}
