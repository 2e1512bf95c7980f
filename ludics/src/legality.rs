//! Legality calculator: which moves an actor may play at a locus right now.
//!
//! Pure over a ledger snapshot. Moves that would be rejected are still
//! listed when the UI should explain why, with `disabled` set and a reason.

use serde::{Deserialize, Serialize};

use crate::locus::LocusPath;
use crate::moves::challenges::{key_was_challenged, open_challenges, surrendered_at};
use crate::moves::{effective_key, Force, Move, MoveKind, MovePayload, OpenChallenge, DEFAULT_KEY};
use crate::tree::BranchSelection;

pub const REASON_OWN_ITEM: &str = "cannot challenge your own item";
pub const REASON_ALREADY_OPEN: &str = "a challenge is already open";
pub const REASON_ALREADY_RAISED: &str = "this challenge was already raised";
pub const REASON_SURRENDERED: &str = "this branch was conceded or closed";
pub const REASON_UNREACHABLE: &str = "another branch was selected here";
pub const REASON_ALREADY_PLAYED: &str = "already played on this key";

/// A move offered to an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalMove {
    pub kind: MoveKind,
    pub label: String,
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub force: Force,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl LegalMove {
    fn enabled(kind: MoveKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            disabled: false,
            reason: None,
            force: kind.force(),
            key: None,
        }
    }

    fn keyed(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    fn disable(mut self, reason: &str) -> Self {
        self.disabled = true;
        self.reason = Some(reason.to_string());
        self
    }

    fn disable_if(self, reason: Option<&str>) -> Self {
        match reason {
            Some(reason) => self.disable(reason),
            None => self,
        }
    }
}

/// Snapshot of one target that legality is computed against.
#[derive(Debug, Clone, Copy)]
pub struct LegalityContext<'a> {
    /// Committed moves of the target, in ledger order.
    pub ledger: &'a [Move],
    pub target_author: &'a str,
    /// Current daimon hints for the target.
    pub hints: &'a [LocusPath],
    pub selection: &'a BranchSelection,
    pub default_key: &'a str,
}

impl<'a> LegalityContext<'a> {
    pub fn new(
        ledger: &'a [Move],
        target_author: &'a str,
        hints: &'a [LocusPath],
        selection: &'a BranchSelection,
    ) -> Self {
        Self {
            ledger,
            target_author,
            hints,
            selection,
            default_key: DEFAULT_KEY,
        }
    }
}

/// Moves `actor_id` may play at `locus`.
///
/// For each open challenge raised at `locus` or beneath it, the author gets
/// one GROUNDS and everyone else one disabled WHY.
pub fn legal_moves(ctx: &LegalityContext<'_>, locus: &LocusPath, actor_id: &str) -> Vec<LegalMove> {
    let open = open_challenges(ctx.ledger);
    let reachable: Vec<&OpenChallenge> = open
        .values()
        .filter(|c| c.locus_path.is_within(locus))
        .collect();

    let attack_block = if surrendered_at(ctx.ledger, locus).is_some() {
        Some(REASON_SURRENDERED)
    } else if !ctx.selection.is_reachable(locus) {
        Some(REASON_UNREACHABLE)
    } else {
        None
    };

    let mut out = Vec::new();

    if actor_id == ctx.target_author {
        if reachable.is_empty() {
            out.push(
                LegalMove::enabled(MoveKind::Why, "Challenge")
                    .keyed(ctx.default_key)
                    .disable(REASON_OWN_ITEM),
            );
        }
        for challenge in &reachable {
            out.push(
                LegalMove::enabled(MoveKind::Grounds, format!("Answer {}", challenge.key))
                    .keyed(&challenge.key)
                    .disable_if(attack_block),
            );
        }
    } else {
        for challenge in &reachable {
            out.push(
                LegalMove::enabled(MoveKind::Why, format!("Challenge {}", challenge.key))
                    .keyed(&challenge.key)
                    .disable(REASON_ALREADY_OPEN),
            );
        }
        if !reachable.iter().any(|c| c.key == ctx.default_key) {
            let why = LegalMove::enabled(MoveKind::Why, "Challenge").keyed(ctx.default_key);
            let why = if open.contains_key(ctx.default_key) {
                why.disable(REASON_ALREADY_OPEN)
            } else if key_was_challenged(ctx.ledger, ctx.default_key) {
                why.disable(REASON_ALREADY_RAISED)
            } else {
                why.disable_if(attack_block)
            };
            out.push(why);
        }
    }

    if !ctx.ledger.is_empty() {
        for (kind, label) in [(MoveKind::Retract, "Retract"), (MoveKind::Concede, "Concede")] {
            // One entry per open thread, or a single one on the locus's own key.
            let targets: Vec<(String, String)> = if reachable.is_empty() {
                let key = effective_key(kind, &MovePayload::at(locus.clone()), ctx.default_key);
                vec![(key, label.to_string())]
            } else {
                reachable
                    .iter()
                    .map(|c| (c.key.clone(), format!("{} {}", label, c.key)))
                    .collect()
            };
            for (key, label) in targets {
                let played = ctx
                    .ledger
                    .iter()
                    .any(|mv| mv.kind == kind && mv.key == key);
                let reason = played.then_some(REASON_ALREADY_PLAYED);
                out.push(LegalMove::enabled(kind, label).keyed(&key).disable_if(reason));
            }
        }
    }

    if ctx.hints.contains(locus) {
        out.push(
            LegalMove::enabled(MoveKind::Close, "Close (†)").keyed(&format!("@{}", locus)),
        );
    }

    out
}
