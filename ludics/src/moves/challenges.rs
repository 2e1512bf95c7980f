//! Derived ledger views: open challenges and surrendered loci.
//!
//! Nothing here is stored. Every view is recomputed from the ordered move
//! list of one target.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Move, MoveKind};
use crate::locus::LocusPath;

/// A WHY that has not been answered, retracted, or conceded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChallenge {
    pub key: String,
    /// The WHY that raised the challenge.
    pub move_id: String,
    pub challenger_id: String,
    pub locus_path: LocusPath,
}

/// Open challenges on a target, keyed by challenge key.
///
/// `moves` must be in ledger order. A later WHY on the same key replaces an
/// earlier one; a GROUNDS, RETRACT or CONCEDE on the key closes it.
pub fn open_challenges(moves: &[Move]) -> BTreeMap<String, OpenChallenge> {
    let mut open = BTreeMap::new();
    for mv in moves {
        match mv.kind {
            MoveKind::Why => {
                open.insert(
                    mv.key.clone(),
                    OpenChallenge {
                        key: mv.key.clone(),
                        move_id: mv.id.clone(),
                        challenger_id: mv.actor_id.clone(),
                        locus_path: mv.locus().clone(),
                    },
                );
            }
            kind if kind.resolves_challenge() => {
                open.remove(&mv.key);
            }
            _ => {}
        }
    }
    open
}

/// Whether a challenge on `key` is currently open.
pub fn has_open_challenge(moves: &[Move], key: &str) -> bool {
    open_challenges(moves).contains_key(key)
}

/// The CLOSE or CONCEDE move that surrendered `locus` or one of its
/// ancestors, if any.
pub fn surrendered_at<'a>(moves: &'a [Move], locus: &LocusPath) -> Option<&'a Move> {
    moves.iter().find(|mv| {
        matches!(mv.kind, MoveKind::Close | MoveKind::Concede) && locus.is_within(mv.locus())
    })
}

/// Whether any WHY on `key` was ever played (open or not).
pub fn key_was_challenged(moves: &[Move], key: &str) -> bool {
    moves
        .iter()
        .any(|mv| mv.kind == MoveKind::Why && mv.key == key)
}

/// Whether `author_id` completed a WHY→GROUNDS pair on any key.
pub fn author_grounded_a_challenge(moves: &[Move], author_id: &str) -> bool {
    moves.iter().enumerate().any(|(i, why)| {
        why.kind == MoveKind::Why
            && moves[i + 1..].iter().any(|later| {
                later.kind == MoveKind::Grounds
                    && later.key == why.key
                    && later.actor_id == author_id
            })
    })
}
