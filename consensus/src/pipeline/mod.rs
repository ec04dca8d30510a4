pub mod intake;
pub mod messages;
pub mod monitor;
pub mod scheduler;

use std::{
    ops::Sub,
    sync::atomic::{AtomicU64, Ordering},
};

#[derive(Default)]
pub struct ProcessingCounters {
    pub events_submitted: AtomicU64,
    pub invalid_events: AtomicU64,
    pub events_hashed: AtomicU64,
    pub duplicate_events: AtomicU64,
    pub ancient_events: AtomicU64,
    pub parent_mismatches: AtomicU64,
    pub events_released: AtomicU64,
    pub events_linked: AtomicU64,
    pub events_ordered: AtomicU64,
    pub rounds_decided: AtomicU64,
    pub stale_events: AtomicU64,
    pub evicted_events: AtomicU64,
}

impl ProcessingCounters {
    pub fn snapshot(&self) -> ProcessingCountersSnapshot {
        ProcessingCountersSnapshot {
            events_submitted: self.events_submitted.load(Ordering::Relaxed),
            invalid_events: self.invalid_events.load(Ordering::Relaxed),
            events_hashed: self.events_hashed.load(Ordering::Relaxed),
            duplicate_events: self.duplicate_events.load(Ordering::Relaxed),
            ancient_events: self.ancient_events.load(Ordering::Relaxed),
            parent_mismatches: self.parent_mismatches.load(Ordering::Relaxed),
            events_released: self.events_released.load(Ordering::Relaxed),
            events_linked: self.events_linked.load(Ordering::Relaxed),
            events_ordered: self.events_ordered.load(Ordering::Relaxed),
            rounds_decided: self.rounds_decided.load(Ordering::Relaxed),
            stale_events: self.stale_events.load(Ordering::Relaxed),
            evicted_events: self.evicted_events.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessingCountersSnapshot {
    pub events_submitted: u64,
    pub invalid_events: u64,
    pub events_hashed: u64,
    pub duplicate_events: u64,
    pub ancient_events: u64,
    pub parent_mismatches: u64,
    pub events_released: u64,
    pub events_linked: u64,
    pub events_ordered: u64,
    pub rounds_decided: u64,
    pub stale_events: u64,
    pub evicted_events: u64,
}

impl Sub for &ProcessingCountersSnapshot {
    type Output = ProcessingCountersSnapshot;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output {
            events_submitted: self.events_submitted.saturating_sub(rhs.events_submitted),
            invalid_events: self.invalid_events.saturating_sub(rhs.invalid_events),
            events_hashed: self.events_hashed.saturating_sub(rhs.events_hashed),
            duplicate_events: self.duplicate_events.saturating_sub(rhs.duplicate_events),
            ancient_events: self.ancient_events.saturating_sub(rhs.ancient_events),
            parent_mismatches: self.parent_mismatches.saturating_sub(rhs.parent_mismatches),
            events_released: self.events_released.saturating_sub(rhs.events_released),
            events_linked: self.events_linked.saturating_sub(rhs.events_linked),
            events_ordered: self.events_ordered.saturating_sub(rhs.events_ordered),
            rounds_decided: self.rounds_decided.saturating_sub(rhs.rounds_decided),
            stale_events: self.stale_events.saturating_sub(rhs.stale_events),
            evicted_events: self.evicted_events.saturating_sub(rhs.evicted_events),
        }
    }
}
