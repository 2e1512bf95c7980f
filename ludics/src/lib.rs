//! Ludics dialogue engine
//!
//! Decides which dialogue moves are legal, validates submitted moves
//! against replay rules, compiles the move ledger into a locus-addressed
//! interaction tree, and reports where a daimon (†) may close a branch.
//!
//! # Operations
//!
//! - `legal_moves`: moves an actor may play at a locus, with disabled
//!   entries explaining what is blocked
//! - `submit_move`: validate and append under per-target serialization
//! - `closure_hints`: loci where a branch may be closed now
//! - `compiled_tree`: the interaction tree of a target
//!
//! # Layout
//!
//! ```text
//!  moves ──▶ rules ──┐
//!    │               ├──▶ engine ──▶ events
//!    └──▶ tree ──▶ closure ──▶ legality
//!                    ▲
//!  ledger (store, authors) ──┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ludics::{DialogueEngine, InMemoryAuthors, InMemoryMoveStore, TargetRef, TargetType};
//!
//! let authors = InMemoryAuthors::new().with(TargetType::Claim, "c1", "alice");
//! let engine = DialogueEngine::new(InMemoryMoveStore::new().shared(), authors.shared());
//! let target = TargetRef::new("d1", TargetType::Claim, "c1");
//!
//! let offered = engine.legal_moves(&target, "0", "bob")?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod closure;
pub mod config;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod legality;
pub mod locus;
pub mod moves;
pub mod rules;
pub mod tree;

pub use closure::{closure_report, daimon_hints, daimon_hints_with, LocusStatus};
pub use config::{ConfigError, ConfigResult, EngineConfig};
pub use engine::{
    DialogueEngine, EngineError, EngineResult, SeedReport, SharedDialogueEngine, SubmitOutcome,
};
pub use events::{DialogueEvent, EventBus, EventFilter, SharedEventBus};
pub use ledger::{
    AuthorDirectory, AuthorEntry, InMemoryAuthors, InMemoryMoveStore, LedgerHead, MoveStore,
    SharedAuthorDirectory, SharedMoveStore, StoreError, StoreResult,
};
pub use legality::{legal_moves, LegalMove, LegalityContext};
pub use locus::{LocusError, LocusPath};
pub use moves::{
    effective_key, signature, Force, Move, MoveCandidate, MoveKind, MovePayload, OpenChallenge,
    Signature, TargetRef, TargetType, DEFAULT_KEY,
};
pub use rules::{validate_move, validate_with, RuleCode, RuleContext, ValidationOutcome};
pub use tree::{compile, compile_for, Act, BranchSelection, Node, Polarity};
