//! Additive branch selection, held beside the tree rather than in it.
//!
//! At an additive locus exactly one child may be the live continuation. The
//! choice is made out of band (it is not a move), so it lives in this keyed
//! map and can be replayed or undone without touching the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::locus::LocusPath;

/// `locusPath → chosen child suffix` for additive loci.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchSelection {
    chosen: BTreeMap<LocusPath, u32>,
}

impl BranchSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose `suffix` as the live child of `locus`, returning the previous
    /// choice if there was one.
    pub fn select(&mut self, locus: LocusPath, suffix: u32) -> Option<u32> {
        self.chosen.insert(locus, suffix)
    }

    /// Undo the choice at `locus`.
    pub fn clear(&mut self, locus: &LocusPath) -> Option<u32> {
        self.chosen.remove(locus)
    }

    pub fn chosen(&self, locus: &LocusPath) -> Option<u32> {
        self.chosen.get(locus).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.chosen.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocusPath, u32)> {
        self.chosen.iter().map(|(k, v)| (k, *v))
    }

    /// Whether `path` is still in play: no selected ancestor points at a
    /// different child along the way.
    pub fn is_reachable(&self, path: &LocusPath) -> bool {
        self.chosen.iter().all(|(locus, suffix)| {
            !path.is_strictly_within(locus) || path.segments()[locus.segments().len()] == *suffix
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> LocusPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_select_and_clear() {
        let mut sel = BranchSelection::new();
        assert!(sel.is_empty());
        assert_eq!(sel.select(p("0.1"), 2), None);
        assert_eq!(sel.select(p("0.1"), 3), Some(2));
        assert_eq!(sel.chosen(&p("0.1")), Some(3));
        assert_eq!(sel.clear(&p("0.1")), Some(3));
        assert_eq!(sel.chosen(&p("0.1")), None);
    }

    #[test]
    fn test_reachability() {
        let mut sel = BranchSelection::new();
        sel.select(p("0.1"), 2);

        assert!(sel.is_reachable(&p("0")));
        assert!(sel.is_reachable(&p("0.1")));
        assert!(sel.is_reachable(&p("0.1.2")));
        assert!(sel.is_reachable(&p("0.1.2.5")));
        assert!(!sel.is_reachable(&p("0.1.1")));
        assert!(!sel.is_reachable(&p("0.1.3.1")));
        assert!(sel.is_reachable(&p("0.2.1")));
    }

    #[test]
    fn test_serializes_as_map() {
        let mut sel = BranchSelection::new();
        sel.select(p("0.1"), 2);
        let json = serde_json::to_value(&sel).unwrap();
        assert_eq!(json, serde_json::json!({ "0.1": 2 }));
    }
}
