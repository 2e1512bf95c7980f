//! Closure stepper: decides where a daimon (†) may be placed right now.
//!
//! A locus may be closed when it is not closed already and
//!
//! 1. every reachable child subtree is empty or closed, and
//! 2. its exchange is *visitable*: each challenge thread at the locus
//!    alternates polarity, no thread ends on an unanswered WHY, and nothing
//!    beneath it answered a challenge while one on an enclosing locus was
//!    still open.
//!
//! Broken alternation and out-of-order answers persist until a later CONCEDE
//! or RETRACT on the same key repairs the offending thread. At an additive locus with a
//! branch selection only the selected child is reachable; the others get no
//! hints and do not hold the locus open.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::locus::LocusPath;
use crate::moves::MoveKind;
use crate::tree::{Act, BranchSelection, Node, Polarity};

/// Closure status of one locus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocusStatus {
    /// A daimon is already placed here.
    Closed,
    /// A daimon may be placed here now.
    Closable,
    /// No act here or beneath.
    Empty,
    /// The last contentious act is an unanswered WHY.
    AwaitingAnswer,
    /// Polarity alternation broke at this locus.
    Unalternating { at_act: String },
    /// A deeper challenge was answered while a shallower one was open.
    OutOfOrder { keys: Vec<String> },
    /// A reachable child is neither empty nor closed.
    ChildrenOpen { children: Vec<LocusPath> },
    /// Cut off by an additive choice made at an ancestor.
    Unreachable,
    /// The node's path does not extend its parent's.
    Malformed,
}

impl LocusStatus {
    pub fn is_closable(&self) -> bool {
        matches!(self, Self::Closable)
    }

    fn settles_parent(&self) -> bool {
        matches!(self, Self::Closed | Self::Empty | Self::Unreachable)
    }
}

/// Status of every locus in the tree, keyed by path.
pub fn closure_report(tree: &Node, selection: &BranchSelection) -> BTreeMap<LocusPath, LocusStatus> {
    let mut report = BTreeMap::new();
    step(tree, selection, &mut report);
    report
}

/// Loci where a daimon may legally be placed, with no branch selection.
pub fn daimon_hints(tree: &Node) -> Vec<LocusPath> {
    daimon_hints_with(tree, &BranchSelection::new())
}

/// Loci where a daimon may legally be placed under `selection`.
pub fn daimon_hints_with(tree: &Node, selection: &BranchSelection) -> Vec<LocusPath> {
    closure_report(tree, selection)
        .into_iter()
        .filter(|(_, status)| status.is_closable())
        .map(|(path, _)| path)
        .collect()
}

fn mark_subtree(node: &Node, status: &LocusStatus, report: &mut BTreeMap<LocusPath, LocusStatus>) {
    report.insert(node.path.clone(), status.clone());
    for child in &node.children {
        mark_subtree(child, status, report);
    }
}

fn step(
    node: &Node,
    selection: &BranchSelection,
    report: &mut BTreeMap<LocusPath, LocusStatus>,
) -> LocusStatus {
    let chosen = if node.is_additive() {
        selection.chosen(&node.path)
    } else {
        None
    };

    let mut reachable: Vec<&Node> = Vec::new();
    let mut open_children = Vec::new();
    for child in &node.children {
        if child.path.parent().as_ref() != Some(&node.path) {
            warn!(
                parent = %node.path,
                child = %child.path,
                "Malformed locus tree: child does not extend its parent"
            );
            mark_subtree(child, &LocusStatus::Malformed, report);
            open_children.push(child.path.clone());
            continue;
        }
        if chosen.is_some_and(|suffix| child.path.suffix() != suffix) {
            mark_subtree(child, &LocusStatus::Unreachable, report);
            continue;
        }
        reachable.push(child);
        if !step(child, selection, report).settles_parent() {
            open_children.push(child.path.clone());
        }
    }

    let status = evaluate(node, &reachable, open_children);
    report.insert(node.path.clone(), status.clone());
    status
}

fn evaluate(node: &Node, reachable: &[&Node], open_children: Vec<LocusPath>) -> LocusStatus {
    if node.is_closed() {
        return LocusStatus::Closed;
    }
    if node.acts.is_empty() && reachable.iter().all(|c| c.is_empty_subtree()) {
        return LocusStatus::Empty;
    }
    if !open_children.is_empty() {
        return LocusStatus::ChildrenOpen {
            children: open_children,
        };
    }

    let exchange = LocalExchange::replay(&node.acts);
    if let Some(at_act) = exchange.broken_at() {
        return LocusStatus::Unalternating { at_act };
    }

    let keys = out_of_order_keys(node, reachable);
    if !keys.is_empty() {
        return LocusStatus::OutOfOrder { keys };
    }

    if exchange.awaiting_answer() {
        return LocusStatus::AwaitingAnswer;
    }

    LocusStatus::Closable
}

/// Replay of the acts at a single locus.
///
/// Each challenge key is its own thread: a WHY and its GROUNDS alternate
/// with each other and with the locus's opening ASSERT, but not with acts
/// on other keys, so several questions may be raised and answered in any
/// interleaving.
#[derive(Debug, Default)]
struct LocalExchange {
    opening: Option<Polarity>,
    threads: BTreeMap<String, Thread>,
}

#[derive(Debug, Default)]
struct Thread {
    last: Option<Polarity>,
    broken_at: Option<(usize, String)>,
    awaiting_answer: bool,
}

impl LocalExchange {
    fn replay(acts: &[Act]) -> Self {
        let mut state = Self::default();
        for (idx, act) in acts.iter().enumerate() {
            let Some(polarity) = act.polarity else {
                continue;
            };
            match act.kind {
                // Surrender repairs its own thread.
                MoveKind::Concede | MoveKind::Retract => {
                    state.threads.remove(&act.key);
                }
                MoveKind::Assert => {
                    if state.opening.is_none() {
                        state.opening = Some(polarity);
                    }
                }
                _ => {
                    let opening = state.opening;
                    let thread = state.threads.entry(act.key.clone()).or_default();
                    let previous = thread.last.or(opening);
                    if previous == Some(polarity) && thread.broken_at.is_none() {
                        thread.broken_at = Some((idx, act.id.clone()));
                    }
                    thread.last = Some(polarity);
                    thread.awaiting_answer = act.kind == MoveKind::Why;
                }
            }
        }
        state
    }

    /// First act, in ledger order, that broke alternation on a live thread.
    fn broken_at(&self) -> Option<String> {
        self.threads
            .values()
            .filter_map(|t| t.broken_at.as_ref())
            .min_by_key(|(idx, _)| *idx)
            .map(|(_, id)| id.clone())
    }

    fn awaiting_answer(&self) -> bool {
        self.threads.values().any(|t| t.awaiting_answer)
    }
}

/// Keys answered while a challenge on an enclosing locus of the same
/// subtree was still open, and not since conceded or retracted.
fn out_of_order_keys(node: &Node, reachable: &[&Node]) -> Vec<String> {
    let mut acts: Vec<&Act> = node.acts.iter().collect();
    for child in reachable {
        acts.extend(child.subtree_acts());
    }
    acts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut open: BTreeMap<&str, &LocusPath> = BTreeMap::new();
    let mut violations: BTreeSet<String> = BTreeSet::new();
    for act in acts {
        match act.kind {
            MoveKind::Why => {
                open.insert(act.key.as_str(), &act.locus_path);
            }
            MoveKind::Grounds => {
                if let Some(raised_at) = open.remove(act.key.as_str()) {
                    // Sibling branches may interleave freely.
                    let skipped = open.values().any(|other| raised_at.is_strictly_within(other));
                    if skipped {
                        violations.insert(act.key.clone());
                    }
                }
            }
            MoveKind::Concede | MoveKind::Retract => {
                open.remove(act.key.as_str());
                violations.remove(&act.key);
            }
            MoveKind::Assert | MoveKind::Close => {}
        }
    }
    violations.into_iter().collect()
}
