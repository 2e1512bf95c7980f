//! Move ledger data model: targets, move kinds, payloads, committed moves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signature::{signature, Signature};
use crate::locus::LocusPath;

/// Challenge key used when a move does not name one.
pub const DEFAULT_KEY: &str = "default";

/// Kind of item a move is played against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Claim,
    Argument,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claim => write!(f, "claim"),
            Self::Argument => write!(f, "argument"),
        }
    }
}

impl std::str::FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claim" => Ok(Self::Claim),
            "argument" => Ok(Self::Argument),
            other => Err(format!("unknown target type: {}", other)),
        }
    }
}

/// The six dialogue moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveKind {
    /// Put a claim forward at a locus.
    Assert,
    /// Challenge: ask for grounds under a key.
    Why,
    /// Answer an open challenge.
    Grounds,
    /// Accept the other side's position on a thread.
    Concede,
    /// Withdraw one's own challenge or claim.
    Retract,
    /// Daimon (†): declare the branch closed.
    Close,
}

impl MoveKind {
    pub const ALL: [MoveKind; 6] = [
        Self::Assert,
        Self::Why,
        Self::Grounds,
        Self::Concede,
        Self::Retract,
        Self::Close,
    ];

    /// Whether the move continues contention or gives ground.
    pub fn force(self) -> Force {
        match self {
            Self::Why | Self::Grounds => Force::Attack,
            Self::Concede | Self::Retract | Self::Close => Force::Surrender,
            Self::Assert => Force::Neutral,
        }
    }

    /// Whether the move answers or withdraws an open challenge.
    pub fn resolves_challenge(self) -> bool {
        matches!(self, Self::Grounds | Self::Retract | Self::Concede)
    }

    /// Whether the move is addressed by its locus rather than a challenge key.
    ///
    /// For these kinds a missing key defaults to the locus, so that the same
    /// kind played at two different loci of one target has two signatures.
    pub fn is_locus_scoped(self) -> bool {
        matches!(self, Self::Assert | Self::Close)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assert => "ASSERT",
            Self::Why => "WHY",
            Self::Grounds => "GROUNDS",
            Self::Concede => "CONCEDE",
            Self::Retract => "RETRACT",
            Self::Close => "CLOSE",
        }
    }
}

impl std::fmt::Display for MoveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MoveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown move kind: {}", s))
    }
}

/// Force of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Force {
    /// Continues contention.
    Attack,
    /// Concludes contention.
    Surrender,
    /// Opens a position without contesting anything.
    Neutral,
}

impl std::fmt::Display for Force {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attack => write!(f, "ATTACK"),
            Self::Surrender => write!(f, "SURRENDER"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Identity of a dialogue target. All locking, ordering and compilation is
/// scoped to one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub dialogue_id: String,
    pub target_type: TargetType,
    pub target_id: String,
}

impl TargetRef {
    pub fn new(dialogue_id: &str, target_type: TargetType, target_id: &str) -> Self {
        Self {
            dialogue_id: dialogue_id.to_string(),
            target_type,
            target_id: target_id.to_string(),
        }
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}:{}",
            self.dialogue_id, self.target_type, self.target_id
        )
    }
}

/// Move payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePayload {
    /// Challenge key; `None` means [`DEFAULT_KEY`] (or the locus for
    /// locus-scoped kinds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub locus_path: LocusPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_move_id: Option<String>,
    /// Explicit acceptance of the argument that grounded a challenge.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub accepts_argument: bool,
    /// The act offers an exclusive choice among the locus's children.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub additive: bool,
}

impl MovePayload {
    pub fn at(locus_path: LocusPath) -> Self {
        Self {
            locus_path,
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn with_expression(mut self, expression: &str) -> Self {
        self.expression = Some(expression.to_string());
        self
    }

    pub fn replying_to(mut self, move_id: &str) -> Self {
        self.reply_to_move_id = Some(move_id.to_string());
        self
    }

    pub fn accepting_argument(mut self) -> Self {
        self.accepts_argument = true;
        self
    }

    pub fn additive(mut self) -> Self {
        self.additive = true;
        self
    }
}

/// Key a move is addressed under, after defaulting.
pub fn effective_key(kind: MoveKind, payload: &MovePayload, default_key: &str) -> String {
    match (&payload.key, kind.is_locus_scoped()) {
        (Some(key), _) => key.clone(),
        (None, true) => format!("@{}", payload.locus_path),
        (None, false) => default_key.to_string(),
    }
}

/// A move that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCandidate {
    #[serde(flatten)]
    pub target: TargetRef,
    pub kind: MoveKind,
    pub actor_id: String,
    #[serde(default)]
    pub payload: MovePayload,
}

impl MoveCandidate {
    pub fn new(target: TargetRef, kind: MoveKind, actor_id: &str, payload: MovePayload) -> Self {
        Self {
            target,
            kind,
            actor_id: actor_id.to_string(),
            payload,
        }
    }

    pub fn key(&self) -> String {
        effective_key(self.kind, &self.payload, DEFAULT_KEY)
    }

    pub fn key_with_default(&self, default_key: &str) -> String {
        effective_key(self.kind, &self.payload, default_key)
    }

    pub fn locus(&self) -> &LocusPath {
        &self.payload.locus_path
    }

    pub fn signature(&self) -> Signature {
        self.signature_with_default(DEFAULT_KEY)
    }

    pub fn signature_with_default(&self, default_key: &str) -> Signature {
        signature(
            &self.target.dialogue_id,
            self.target.target_type,
            &self.target.target_id,
            self.kind,
            &self.key_with_default(default_key),
        )
    }
}

/// A committed, immutable move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub id: String,
    #[serde(flatten)]
    pub target: TargetRef,
    pub kind: MoveKind,
    pub actor_id: String,
    pub payload: MovePayload,
    /// Effective key, resolved at commit time.
    pub key: String,
    pub signature: Signature,
    pub created_at: DateTime<Utc>,
}

impl Move {
    /// Commit a candidate under the given id and timestamp.
    pub fn commit(
        candidate: MoveCandidate,
        default_key: &str,
        id: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        let key = candidate.key_with_default(default_key);
        let signature = candidate.signature_with_default(default_key);
        Self {
            id,
            target: candidate.target,
            kind: candidate.kind,
            actor_id: candidate.actor_id,
            payload: candidate.payload,
            key,
            signature,
            created_at,
        }
    }

    pub fn locus(&self) -> &LocusPath {
        &self.payload.locus_path
    }

    pub fn force(&self) -> Force {
        self.kind.force()
    }
}

/// Sort moves into ledger order: `createdAt`, ties broken by id.
pub fn sort_ledger(moves: &mut [Move]) {
    moves.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
