//! Dialogue events
//!
//! Published after every state change so that views can refresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::locus::LocusPath;
use crate::moves::{MoveKind, TargetRef};
use crate::rules::RuleCode;

/// All dialogue engine events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogueEvent {
    /// A move passed validation and was appended
    MoveCommitted {
        target: TargetRef,
        move_id: String,
        kind: MoveKind,
        actor_id: String,
        locus_path: LocusPath,
        timestamp: DateTime<Utc>,
    },

    /// A candidate failed validation
    MoveRejected {
        target: TargetRef,
        kind: MoveKind,
        actor_id: String,
        reasons: Vec<RuleCode>,
        timestamp: DateTime<Utc>,
    },

    /// Moves were bulk-inserted without validation
    LedgerSeeded {
        inserted: usize,
        skipped: usize,
        timestamp: DateTime<Utc>,
    },

    /// A child was chosen at an additive locus
    BranchSelected {
        target: TargetRef,
        locus_path: LocusPath,
        suffix: u32,
        timestamp: DateTime<Utc>,
    },

    /// A branch choice was undone
    BranchCleared {
        target: TargetRef,
        locus_path: LocusPath,
        timestamp: DateTime<Utc>,
    },
}

impl DialogueEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DialogueEvent::MoveCommitted { timestamp, .. } => *timestamp,
            DialogueEvent::MoveRejected { timestamp, .. } => *timestamp,
            DialogueEvent::LedgerSeeded { timestamp, .. } => *timestamp,
            DialogueEvent::BranchSelected { timestamp, .. } => *timestamp,
            DialogueEvent::BranchCleared { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            DialogueEvent::MoveCommitted { .. } => "move_committed",
            DialogueEvent::MoveRejected { .. } => "move_rejected",
            DialogueEvent::LedgerSeeded { .. } => "ledger_seeded",
            DialogueEvent::BranchSelected { .. } => "branch_selected",
            DialogueEvent::BranchCleared { .. } => "branch_cleared",
        }
    }

    /// The target this event concerns, if it is target-scoped
    pub fn target(&self) -> Option<&TargetRef> {
        match self {
            DialogueEvent::MoveCommitted { target, .. }
            | DialogueEvent::MoveRejected { target, .. }
            | DialogueEvent::BranchSelected { target, .. }
            | DialogueEvent::BranchCleared { target, .. } => Some(target),
            DialogueEvent::LedgerSeeded { .. } => None,
        }
    }
}
