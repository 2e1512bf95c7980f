//! Replay-rule validator: admits or rejects a candidate before it is
//! appended to the ledger.
//!
//! Every rule is checked independently against the full ledger of the
//! candidate's target, and all violations are reported together. A candidate
//! is admissible only if no rule fires.

use serde::{Deserialize, Serialize};

use crate::moves::challenges::{author_grounded_a_challenge, has_open_challenge, surrendered_at};
use crate::moves::{Force, Move, MoveCandidate, MoveKind, TargetType, DEFAULT_KEY};

/// Fixed vocabulary of dialogue-legality rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleCode {
    /// Address well-formedness. Reserved; never fires.
    #[serde(rename = "R1_ADDRESS_WELLFORMED")]
    R1AddressWellFormed,
    /// Answer to a question nobody asked.
    #[serde(rename = "R2_NO_OPEN_CQ")]
    R2NoOpenCq,
    /// Reply to one's own move.
    #[serde(rename = "R3_SELF_REPLY")]
    R3SelfReply,
    /// Re-assertion of an identical move.
    #[serde(rename = "R4_DUPLICATE_REPLY")]
    R4DuplicateReply,
    /// Contention on a surrendered branch.
    #[serde(rename = "R5_AFTER_SURRENDER")]
    R5AfterSurrender,
    /// Force coherence. Reserved; never fires.
    #[serde(rename = "R6_FORCE_COHERENCE")]
    R6ForceCoherence,
    /// Bare concession that skips over a grounding argument.
    #[serde(rename = "R7_ACCEPT_ARGUMENT_REQUIRED")]
    R7AcceptArgumentRequired,
}

impl RuleCode {
    /// Every rule, in evaluation order.
    pub const ALL: [RuleCode; 7] = [
        Self::R1AddressWellFormed,
        Self::R2NoOpenCq,
        Self::R3SelfReply,
        Self::R4DuplicateReply,
        Self::R5AfterSurrender,
        Self::R6ForceCoherence,
        Self::R7AcceptArgumentRequired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::R1AddressWellFormed => "R1_ADDRESS_WELLFORMED",
            Self::R2NoOpenCq => "R2_NO_OPEN_CQ",
            Self::R3SelfReply => "R3_SELF_REPLY",
            Self::R4DuplicateReply => "R4_DUPLICATE_REPLY",
            Self::R5AfterSurrender => "R5_AFTER_SURRENDER",
            Self::R6ForceCoherence => "R6_FORCE_COHERENCE",
            Self::R7AcceptArgumentRequired => "R7_ACCEPT_ARGUMENT_REQUIRED",
        }
    }

    /// Human-readable explanation, suitable for a rejection message.
    pub fn help(self) -> &'static str {
        match self {
            Self::R1AddressWellFormed => "the move's address is not well formed",
            Self::R2NoOpenCq => "no open challenge with this key on the target",
            Self::R3SelfReply => "you cannot reply to your own move",
            Self::R4DuplicateReply => "an identical move was already committed",
            Self::R5AfterSurrender => "this branch was conceded or closed (†)",
            Self::R6ForceCoherence => "the move's force is incoherent with the branch",
            Self::R7AcceptArgumentRequired => {
                "conceding a grounded claim requires accepting the argument"
            }
        }
    }
}

impl std::fmt::Display for RuleCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating a candidate.
///
/// On the wire this is `{ "ok": true }` or `{ "ok": false, "reasons": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ValidationReport", from = "ValidationReport")]
pub enum ValidationOutcome {
    Admissible,
    Rejected { reasons: Vec<RuleCode> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ValidationReport {
    ok: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reasons: Vec<RuleCode>,
}

impl From<ValidationOutcome> for ValidationReport {
    fn from(outcome: ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::Admissible => Self {
                ok: true,
                reasons: Vec::new(),
            },
            ValidationOutcome::Rejected { reasons } => Self { ok: false, reasons },
        }
    }
}

impl From<ValidationReport> for ValidationOutcome {
    fn from(report: ValidationReport) -> Self {
        if report.ok && report.reasons.is_empty() {
            Self::Admissible
        } else {
            Self::Rejected {
                reasons: report.reasons,
            }
        }
    }
}

impl ValidationOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Admissible)
    }

    /// Violated rules; empty when admissible.
    pub fn reasons(&self) -> &[RuleCode] {
        match self {
            Self::Admissible => &[],
            Self::Rejected { reasons } => reasons,
        }
    }

    pub fn violates(&self, rule: RuleCode) -> bool {
        self.reasons().contains(&rule)
    }
}

/// Everything a rule may look at besides the candidate.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Committed moves of the candidate's target, in ledger order.
    pub ledger: &'a [Move],
    /// Author of the candidate's target.
    pub target_author: &'a str,
    /// Key assumed when a move names none.
    pub default_key: &'a str,
}

impl<'a> RuleContext<'a> {
    pub fn new(ledger: &'a [Move], target_author: &'a str) -> Self {
        Self {
            ledger,
            target_author,
            default_key: DEFAULT_KEY,
        }
    }
}

/// Whether `rule` fires for `candidate`.
pub fn rule_fires(rule: RuleCode, candidate: &MoveCandidate, ctx: &RuleContext<'_>) -> bool {
    let key = candidate.key_with_default(ctx.default_key);
    match rule {
        RuleCode::R1AddressWellFormed | RuleCode::R6ForceCoherence => false,
        RuleCode::R2NoOpenCq => {
            candidate.kind == MoveKind::Grounds && !has_open_challenge(ctx.ledger, &key)
        }
        RuleCode::R3SelfReply => candidate
            .payload
            .reply_to_move_id
            .as_deref()
            .and_then(|id| ctx.ledger.iter().find(|mv| mv.id == id))
            .is_some_and(|parent| parent.actor_id == candidate.actor_id),
        RuleCode::R4DuplicateReply => {
            let sig = candidate.signature_with_default(ctx.default_key);
            ctx.ledger.iter().any(|mv| mv.signature == sig)
        }
        RuleCode::R5AfterSurrender => {
            candidate.kind.force() == Force::Attack
                && surrendered_at(ctx.ledger, candidate.locus()).is_some()
        }
        RuleCode::R7AcceptArgumentRequired => {
            candidate.kind == MoveKind::Concede
                && candidate.target.target_type == TargetType::Claim
                && !candidate.payload.accepts_argument
                && author_grounded_a_challenge(ctx.ledger, ctx.target_author)
        }
    }
}

/// Validate a candidate against the ledger of its target.
///
/// Moves in `ledger` that belong to a different target are ignored.
pub fn validate_move(
    candidate: &MoveCandidate,
    ledger: &[Move],
    target_author: &str,
) -> ValidationOutcome {
    validate_with(candidate, &RuleContext::new(ledger, target_author))
}

/// Validate with an explicit rule context.
pub fn validate_with(candidate: &MoveCandidate, ctx: &RuleContext<'_>) -> ValidationOutcome {
    let scoped: Vec<Move>;
    let ctx = if ctx.ledger.iter().all(|mv| mv.target == candidate.target) {
        *ctx
    } else {
        scoped = ctx
            .ledger
            .iter()
            .filter(|mv| mv.target == candidate.target)
            .cloned()
            .collect();
        RuleContext {
            ledger: &scoped,
            ..*ctx
        }
    };

    let reasons: Vec<RuleCode> = RuleCode::ALL
        .into_iter()
        .filter(|rule| rule_fires(*rule, candidate, &ctx))
        .collect();

    if reasons.is_empty() {
        ValidationOutcome::Admissible
    } else {
        ValidationOutcome::Rejected { reasons }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::locus::LocusPath;
    use crate::moves::{MovePayload, TargetRef};

    const AUTHOR: &str = "u-author";
    const OTHER: &str = "u-other";

    fn target() -> TargetRef {
        TargetRef::new("d1", TargetType::Claim, "c1")
    }

    fn candidate(kind: MoveKind, actor: &str, payload: MovePayload) -> MoveCandidate {
        MoveCandidate::new(target(), kind, actor, payload)
    }

    fn at(locus: &str) -> MovePayload {
        MovePayload::at(locus.parse().unwrap())
    }

    /// Commit candidates in order, one millisecond apart, ids `m0..`.
    fn ledger(candidates: Vec<MoveCandidate>) -> Vec<Move> {
        let t0 = Utc::now();
        candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                Move::commit(
                    c,
                    DEFAULT_KEY,
                    format!("m{}", i),
                    t0 + Duration::milliseconds(i as i64),
                )
            })
            .collect()
    }

    #[test]
    fn test_admissible_first_challenge() {
        let outcome = validate_move(&candidate(MoveKind::Why, OTHER, at("0")), &[], AUTHOR);
        assert!(outcome.is_ok());
        assert!(outcome.reasons().is_empty());
    }

    #[test]
    fn test_r2_grounds_without_challenge() {
        let outcome = validate_move(
            &candidate(MoveKind::Grounds, AUTHOR, at("0").with_key("CQX")),
            &[],
            AUTHOR,
        );
        assert!(!outcome.is_ok());
        assert!(outcome.violates(RuleCode::R2NoOpenCq));
    }

    #[test]
    fn test_r2_grounds_on_other_key() {
        let moves = ledger(vec![candidate(MoveKind::Why, OTHER, at("0").with_key("CQ1"))]);
        let outcome = validate_move(
            &candidate(MoveKind::Grounds, AUTHOR, at("0").with_key("CQ2")),
            &moves,
            AUTHOR,
        );
        assert!(outcome.violates(RuleCode::R2NoOpenCq));

        let outcome = validate_move(
            &candidate(MoveKind::Grounds, AUTHOR, at("0").with_key("CQ1")),
            &moves,
            AUTHOR,
        );
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_r3_self_reply_without_r2() {
        let moves = ledger(vec![candidate(
            MoveKind::Why,
            AUTHOR,
            at("0").with_key("CQ_SELF"),
        )]);
        let outcome = validate_move(
            &candidate(
                MoveKind::Grounds,
                AUTHOR,
                at("0").with_key("CQ_SELF").replying_to("m0"),
            ),
            &moves,
            AUTHOR,
        );
        assert!(outcome.violates(RuleCode::R3SelfReply));
        assert!(!outcome.violates(RuleCode::R2NoOpenCq));
    }

    #[test]
    fn test_r3_reply_to_other_actor_is_fine() {
        let moves = ledger(vec![candidate(MoveKind::Why, OTHER, at("0"))]);
        let outcome = validate_move(
            &candidate(MoveKind::Grounds, AUTHOR, at("0").replying_to("m0")),
            &moves,
            AUTHOR,
        );
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_r4_duplicate_challenge() {
        let moves = ledger(vec![candidate(MoveKind::Why, OTHER, at("0"))]);
        let outcome = validate_move(&candidate(MoveKind::Why, OTHER, at("0")), &moves, AUTHOR);
        assert!(outcome.violates(RuleCode::R4DuplicateReply));

        // Same act by a different participant is still the same act.
        let outcome = validate_move(&candidate(MoveKind::Why, "u-third", at("0.4")), &moves, AUTHOR);
        assert!(outcome.violates(RuleCode::R4DuplicateReply));
    }

    #[test]
    fn test_r4_close_is_scoped_by_locus() {
        let moves = ledger(vec![candidate(MoveKind::Close, OTHER, at("0.1"))]);
        assert!(validate_move(&candidate(MoveKind::Close, OTHER, at("0.2")), &moves, AUTHOR).is_ok());
        assert!(validate_move(&candidate(MoveKind::Close, OTHER, at("0.1")), &moves, AUTHOR)
            .violates(RuleCode::R4DuplicateReply));
    }

    #[test]
    fn test_r5_attack_after_close() {
        let moves = ledger(vec![candidate(MoveKind::Close, OTHER, at("0"))]);
        let outcome = validate_move(
            &candidate(MoveKind::Why, OTHER, at("0").with_key("fresh")),
            &moves,
            AUTHOR,
        );
        assert!(outcome.violates(RuleCode::R5AfterSurrender));
    }

    #[test]
    fn test_r5_covers_descendants_but_not_siblings() {
        let moves = ledger(vec![candidate(MoveKind::Concede, OTHER, at("0.1").with_key("k1"))]);
        let deep = validate_move(
            &candidate(MoveKind::Why, OTHER, at("0.1.2").with_key("k2")),
            &moves,
            AUTHOR,
        );
        assert!(deep.violates(RuleCode::R5AfterSurrender));

        let sibling = validate_move(
            &candidate(MoveKind::Why, OTHER, at("0.2").with_key("k2")),
            &moves,
            AUTHOR,
        );
        assert!(sibling.is_ok());
    }

    #[test]
    fn test_r5_allows_surrender_moves() {
        let moves = ledger(vec![candidate(MoveKind::Close, OTHER, at("0.1"))]);
        let outcome = validate_move(
            &candidate(MoveKind::Retract, AUTHOR, at("0.1").with_key("k1")),
            &moves,
            AUTHOR,
        );
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_r7_bare_concede_after_grounds() {
        let moves = ledger(vec![
            candidate(MoveKind::Why, OTHER, at("0").with_key("CQ1")),
            candidate(MoveKind::Grounds, AUTHOR, at("0").with_key("CQ1")),
        ]);
        let bare = validate_move(&candidate(MoveKind::Concede, OTHER, at("0")), &moves, AUTHOR);
        assert!(bare.violates(RuleCode::R7AcceptArgumentRequired));

        let accepting = validate_move(
            &candidate(MoveKind::Concede, OTHER, at("0").accepting_argument()),
            &moves,
            AUTHOR,
        );
        assert!(accepting.is_ok());
    }

    #[test]
    fn test_r7_only_for_claims_grounded_by_author() {
        let moves = ledger(vec![
            candidate(MoveKind::Why, OTHER, at("0").with_key("CQ1")),
            candidate(MoveKind::Grounds, "u-helper", at("0").with_key("CQ1")),
        ]);
        let outcome = validate_move(&candidate(MoveKind::Concede, OTHER, at("0")), &moves, AUTHOR);
        assert!(!outcome.violates(RuleCode::R7AcceptArgumentRequired));

        let on_argument = MoveCandidate::new(
            TargetRef::new("d1", TargetType::Argument, "a1"),
            MoveKind::Concede,
            OTHER,
            at("0"),
        );
        let outcome = validate_move(&on_argument, &[], AUTHOR);
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_multiple_reasons_reported_together() {
        let moves = ledger(vec![
            candidate(MoveKind::Why, AUTHOR, at("0").with_key("k")),
            candidate(MoveKind::Grounds, OTHER, at("0").with_key("k")),
            candidate(MoveKind::Close, OTHER, at("0")),
        ]);
        let outcome = validate_move(
            &candidate(MoveKind::Grounds, OTHER, at("0").with_key("k").replying_to("m1")),
            &moves,
            AUTHOR,
        );
        assert_eq!(
            outcome.reasons(),
            &[
                RuleCode::R2NoOpenCq,
                RuleCode::R3SelfReply,
                RuleCode::R4DuplicateReply,
                RuleCode::R5AfterSurrender,
            ]
        );
    }

    #[test]
    fn test_reserved_rules_never_fire() {
        let moves = ledger(vec![candidate(MoveKind::Close, OTHER, at("0"))]);
        let ctx = RuleContext::new(&moves, AUTHOR);
        for kind in MoveKind::ALL {
            let c = candidate(kind, OTHER, MovePayload::at(LocusPath::root()));
            assert!(!rule_fires(RuleCode::R1AddressWellFormed, &c, &ctx));
            assert!(!rule_fires(RuleCode::R6ForceCoherence, &c, &ctx));
        }
    }

    #[test]
    fn test_other_targets_are_ignored() {
        let foreign = MoveCandidate::new(
            TargetRef::new("d1", TargetType::Claim, "c2"),
            MoveKind::Close,
            OTHER,
            at("0"),
        );
        let moves = ledger(vec![foreign]);
        let outcome = validate_move(&candidate(MoveKind::Why, OTHER, at("0")), &moves, AUTHOR);
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_outcome_wire_format() {
        let rejected = ValidationOutcome::Rejected {
            reasons: vec![RuleCode::R2NoOpenCq],
        };
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["reasons"][0], "R2_NO_OPEN_CQ");

        let ok = serde_json::to_value(ValidationOutcome::Admissible).unwrap();
        assert_eq!(ok, serde_json::json!({ "ok": true }));
        let back: ValidationOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, rejected);
        assert_eq!(RuleCode::R7AcceptArgumentRequired.to_string(), "R7_ACCEPT_ARGUMENT_REQUIRED");
    }
}
