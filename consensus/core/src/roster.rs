use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub node_id: NodeId,
    pub weight: u64,
}

/// The set of creators taking part in consensus, with their voting weights.
///
/// Entries are kept sorted by node id so that creator indices are identical on every node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RosterEntry>", into = "Vec<RosterEntry>")]
pub struct Roster {
    entries: Vec<RosterEntry>,
    index: HashMap<NodeId, usize>,
    total_weight: u64,
}

impl Roster {
    pub fn new(mut entries: Vec<RosterEntry>) -> Self {
        entries.sort_by_key(|e| e.node_id);
        entries.dedup_by_key(|e| e.node_id);
        let index = entries.iter().enumerate().map(|(i, e)| (e.node_id, i)).collect();
        let total_weight = entries.iter().map(|e| e.weight).sum();
        Self { entries, index, total_weight }
    }

    /// A roster of `size` members with ids `0..size`, each of weight 1
    pub fn uniform(size: u64) -> Self {
        Self::new((0..size).map(|id| RosterEntry { node_id: id.into(), weight: 1 }).collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index_of(&self, node_id: NodeId) -> Option<usize> {
        self.index.get(&node_id).copied()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.index.contains_key(&node_id)
    }

    pub fn weight(&self, index: usize) -> u64 {
        self.entries[index].weight
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// True if `weight` is strictly more than two thirds of the total weight
    #[inline]
    pub fn is_supermajority(&self, weight: u64) -> bool {
        weight as u128 * 3 > self.total_weight as u128 * 2
    }
}

impl From<Vec<RosterEntry>> for Roster {
    fn from(entries: Vec<RosterEntry>) -> Self {
        Self::new(entries)
    }
}

impl From<Roster> for Vec<RosterEntry> {
    fn from(roster: Roster) -> Self {
        roster.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        let roster = Roster::uniform(4);
        assert_eq!(roster.total_weight(), 4);
        assert!(!roster.is_supermajority(2));
        assert!(roster.is_supermajority(3));

        let weighted = Roster::new(vec![
            RosterEntry { node_id: 9.into(), weight: 70 },
            RosterEntry { node_id: 2.into(), weight: 20 },
            RosterEntry { node_id: 5.into(), weight: 10 },
        ]);
        assert!(weighted.is_supermajority(70));
        assert!(!weighted.is_supermajority(66));
        assert_eq!(weighted.index_of(2.into()), Some(0));
        assert_eq!(weighted.index_of(9.into()), Some(2));
        assert_eq!(weighted.weight(1), 10);
        assert!(!weighted.contains(3.into()));
    }

    #[test]
    fn test_serde_round_trip_rebuilds_index() {
        let roster = Roster::new(vec![RosterEntry { node_id: 4.into(), weight: 2 }, RosterEntry { node_id: 1.into(), weight: 3 }]);
        let json = serde_json::to_string(&roster).unwrap();
        let back: Roster = serde_json::from_str(&json).unwrap();
        assert_eq!(back, roster);
        assert_eq!(back.index_of(4.into()), Some(1));
        assert_eq!(back.total_weight(), 5);
    }
}
