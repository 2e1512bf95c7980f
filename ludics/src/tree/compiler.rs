//! Locus-tree compiler: folds a target's moves into one interaction tree.
//!
//! Every move becomes exactly one [`Act`] at its locus. The tree is built
//! arena-style: acts are bucketed into a flat map keyed by path, ancestors are
//! synthesized, and the nested [`Node`] structure is linked last by trimming
//! the final path segment.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::locus::LocusPath;
use crate::moves::{sort_ledger, Move, MoveKind};

/// Which side performed an act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// Proponent: the side that owns the claim or argument.
    P,
    /// Opponent: the challenging side.
    O,
}

impl Polarity {
    pub fn flip(self) -> Self {
        match self {
            Self::P => Self::O,
            Self::O => Self::P,
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P => write!(f, "P"),
            Self::O => write!(f, "O"),
        }
    }
}

/// Compiled projection of one move at its locus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Act {
    /// Id of the move this act was compiled from.
    pub id: String,
    /// `None` marks a daimon (†).
    pub polarity: Option<Polarity>,
    pub locus_path: LocusPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    pub is_additive: bool,
    pub kind: MoveKind,
    pub key: String,
    pub actor_id: String,
    pub created_at: DateTime<Utc>,
}

impl Act {
    pub fn is_daimon(&self) -> bool {
        self.polarity.is_none()
    }
}

/// A node of the interaction tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub path: LocusPath,
    /// Acts at this locus in ledger order.
    pub acts: Vec<Act>,
    /// Children ordered by suffix.
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(path: LocusPath) -> Self {
        Self {
            path,
            acts: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Whether any act here offers an exclusive choice among the children.
    pub fn is_additive(&self) -> bool {
        self.acts.iter().any(|a| a.is_additive)
    }

    /// Whether a daimon has been placed here.
    pub fn is_closed(&self) -> bool {
        self.acts.iter().any(Act::is_daimon)
    }

    /// Whether neither this node nor any descendant carries an act.
    pub fn is_empty_subtree(&self) -> bool {
        self.acts.is_empty() && self.children.iter().all(Node::is_empty_subtree)
    }

    pub fn child(&self, suffix: u32) -> Option<&Node> {
        self.children.iter().find(|c| c.path.suffix() == suffix)
    }

    /// Look up a node by path.
    pub fn find(&self, path: &LocusPath) -> Option<&Node> {
        if &self.path == path {
            return Some(self);
        }
        if !path.is_strictly_within(&self.path) {
            return None;
        }
        let next = path.segments()[self.path.segments().len()];
        self.child(next)?.find(path)
    }

    /// Pre-order walk over this node and every descendant.
    pub fn walk(&self) -> Vec<&Node> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let node = out[i];
            out.extend(node.children.iter());
            i += 1;
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }

    /// All acts in this subtree, in ledger order.
    pub fn subtree_acts(&self) -> Vec<&Act> {
        let mut acts: Vec<&Act> = self.walk().into_iter().flat_map(|n| n.acts.iter()).collect();
        acts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        acts
    }

    pub fn act_count(&self) -> usize {
        self.acts.len() + self.children.iter().map(Node::act_count).sum::<usize>()
    }
}

/// Side assignment for acts.
fn polarity_of(mv: &Move, proponent: Option<&str>) -> Option<Polarity> {
    if mv.kind == MoveKind::Close {
        return None;
    }
    match proponent {
        Some(owner) if mv.actor_id == owner => Some(Polarity::P),
        Some(_) => Some(Polarity::O),
        None => match mv.kind {
            MoveKind::Why | MoveKind::Concede => Some(Polarity::O),
            _ => Some(Polarity::P),
        },
    }
}

fn project(mv: &Move, proponent: Option<&str>) -> Act {
    Act {
        id: mv.id.clone(),
        polarity: polarity_of(mv, proponent),
        locus_path: mv.locus().clone(),
        expression: mv.payload.expression.clone(),
        is_additive: mv.payload.additive,
        kind: mv.kind,
        key: mv.key.clone(),
        actor_id: mv.actor_id.clone(),
        created_at: mv.created_at,
    }
}

/// Compile moves, inferring the proponent as the actor of the first ASSERT.
///
/// Without any ASSERT, polarity falls back to the move kind: WHY and CONCEDE
/// are the opponent's, everything else the proponent's.
pub fn compile(moves: &[Move]) -> Node {
    let mut ordered = moves.to_vec();
    sort_ledger(&mut ordered);
    let proponent = ordered
        .iter()
        .find(|mv| mv.kind == MoveKind::Assert)
        .map(|mv| mv.actor_id.clone());
    build(&ordered, proponent.as_deref())
}

/// Compile moves with a known proponent (the target's author).
pub fn compile_for(moves: &[Move], proponent: &str) -> Node {
    let mut ordered = moves.to_vec();
    sort_ledger(&mut ordered);
    build(&ordered, Some(proponent))
}

fn build(ordered: &[Move], proponent: Option<&str>) -> Node {
    let mut slots: BTreeMap<LocusPath, Vec<Act>> = BTreeMap::new();
    slots.insert(LocusPath::root(), Vec::new());

    for mv in ordered {
        let locus = mv.locus();
        for ancestor in locus.ancestors() {
            slots.entry(ancestor).or_default();
        }
        slots.entry(locus.clone()).or_default().push(project(mv, proponent));
    }

    let mut children: BTreeMap<LocusPath, Vec<LocusPath>> = BTreeMap::new();
    for path in slots.keys() {
        if let Some(parent) = path.parent() {
            children.entry(parent).or_default().push(path.clone());
        }
    }

    debug!(
        moves = ordered.len(),
        loci = slots.len(),
        "Compiled locus tree"
    );

    link(LocusPath::root(), &mut slots, &children)
}

fn link(
    path: LocusPath,
    slots: &mut BTreeMap<LocusPath, Vec<Act>>,
    children: &BTreeMap<LocusPath, Vec<LocusPath>>,
) -> Node {
    let acts = slots.remove(&path).unwrap_or_default();
    let kids = children
        .get(&path)
        .map(|paths| {
            paths
                .iter()
                .map(|p| link(p.clone(), slots, children))
                .collect()
        })
        .unwrap_or_default();
    Node {
        path,
        acts,
        children: kids,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::moves::{MoveCandidate, MovePayload, TargetRef, TargetType, DEFAULT_KEY};

    fn ledger(steps: &[(MoveKind, &str, &str)]) -> Vec<Move> {
        let t0 = Utc::now();
        steps
            .iter()
            .enumerate()
            .map(|(i, (kind, actor, locus))| {
                Move::commit(
                    MoveCandidate::new(
                        TargetRef::new("d1", TargetType::Claim, "c1"),
                        *kind,
                        actor,
                        MovePayload::at(locus.parse().unwrap()),
                    ),
                    DEFAULT_KEY,
                    format!("m{}", i),
                    t0 + Duration::milliseconds(i as i64),
                )
            })
            .collect()
    }

    fn p(s: &str) -> LocusPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_ledger_is_bare_root() {
        let tree = compile(&[]);
        assert_eq!(tree.path, LocusPath::root());
        assert!(tree.acts.is_empty());
        assert!(tree.children.is_empty());
        assert!(tree.is_empty_subtree());
    }

    #[test]
    fn test_one_act_per_move_at_its_locus() {
        let moves = ledger(&[
            (MoveKind::Assert, "u1", "0.1"),
            (MoveKind::Why, "u2", "0.1"),
            (MoveKind::Grounds, "u1", "0.1"),
        ]);
        let tree = compile(&moves);
        assert_eq!(tree.act_count(), 3);
        let node = tree.find(&p("0.1")).unwrap();
        let ids: Vec<&str> = node.acts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_ancestors_are_synthesized() {
        let moves = ledger(&[(MoveKind::Assert, "u1", "0.2.3.1")]);
        let tree = compile(&moves);
        for path in ["0", "0.2", "0.2.3", "0.2.3.1"] {
            assert!(tree.find(&p(path)).is_some(), "missing {}", path);
        }
        assert!(tree.find(&p("0.2.3")).unwrap().acts.is_empty());
        assert!(tree.find(&p("0.1")).is_none());
    }

    #[test]
    fn test_children_sorted_numerically() {
        let moves = ledger(&[
            (MoveKind::Assert, "u1", "0.10"),
            (MoveKind::Assert, "u1", "0.2"),
        ]);
        let tree = compile(&moves);
        let suffixes: Vec<u32> = tree.children.iter().map(|c| c.path.suffix()).collect();
        assert_eq!(suffixes, vec![2, 10]);
    }

    #[test]
    fn test_polarity_from_proponent() {
        let moves = ledger(&[
            (MoveKind::Assert, "u1", "0"),
            (MoveKind::Why, "u2", "0"),
            (MoveKind::Grounds, "u1", "0"),
            (MoveKind::Concede, "u2", "0"),
            (MoveKind::Close, "u2", "0"),
        ]);
        let tree = compile(&moves);
        let pols: Vec<Option<Polarity>> = tree.acts.iter().map(|a| a.polarity).collect();
        assert_eq!(
            pols,
            vec![
                Some(Polarity::P),
                Some(Polarity::O),
                Some(Polarity::P),
                Some(Polarity::O),
                None
            ]
        );
        assert!(tree.is_closed());
    }

    #[test]
    fn test_compile_for_uses_given_owner() {
        let moves = ledger(&[(MoveKind::Why, "u2", "0"), (MoveKind::Retract, "u2", "0")]);
        let tree = compile_for(&moves, "u1");
        assert!(tree.acts.iter().all(|a| a.polarity == Some(Polarity::O)));

        // Kind-based fallback with no ASSERT and no owner.
        let tree = compile(&moves);
        assert_eq!(tree.acts[0].polarity, Some(Polarity::O));
        assert_eq!(tree.acts[1].polarity, Some(Polarity::P));
    }

    #[test]
    fn test_additive_flag() {
        let t0 = Utc::now();
        let mv = Move::commit(
            MoveCandidate::new(
                TargetRef::new("d1", TargetType::Claim, "c1"),
                MoveKind::Assert,
                "u1",
                MovePayload::at(p("0.1")).additive(),
            ),
            DEFAULT_KEY,
            "m0".into(),
            t0,
        );
        let tree = compile(&[mv]);
        assert!(tree.find(&p("0.1")).unwrap().is_additive());
        assert!(!tree.is_additive());
    }

    #[test]
    fn test_order_independent_of_input_order() {
        let moves = ledger(&[
            (MoveKind::Assert, "u1", "0.1"),
            (MoveKind::Why, "u2", "0.1"),
            (MoveKind::Assert, "u1", "0.2"),
            (MoveKind::Grounds, "u1", "0.1"),
        ]);
        let mut shuffled = moves.clone();
        shuffled.reverse();
        shuffled.swap(0, 2);
        assert_eq!(compile(&moves), compile(&shuffled));
        assert_eq!(compile(&moves), compile(&moves));
    }

    #[test]
    fn test_subtree_acts_in_ledger_order() {
        let moves = ledger(&[
            (MoveKind::Assert, "u1", "0.2"),
            (MoveKind::Assert, "u1", "0.1"),
            (MoveKind::Why, "u2", "0.2"),
        ]);
        let tree = compile(&moves);
        let ids: Vec<&str> = tree.subtree_acts().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2"]);
    }
}
