//! Move ledger model: the append-only record every other component reads.
//!
//! A move is an immutable fact once committed. Retraction and closure are
//! themselves moves; nothing in the ledger is ever edited.

pub mod challenges;
pub mod signature;
pub mod types;

pub use challenges::{open_challenges, OpenChallenge};
pub use signature::{signature, Signature};
pub use types::{
    effective_key, sort_ledger, Force, Move, MoveCandidate, MoveKind, MovePayload, TargetRef,
    TargetType, DEFAULT_KEY,
};
