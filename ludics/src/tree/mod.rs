//! Interaction tree: compiled, recomputable projection of the move ledger.
//!
//! The tree is a cache, never a source of truth: it is rebuilt from the
//! ledger and never edited directly. Additive branch choices live in
//! [`BranchSelection`], outside the tree.

pub mod compiler;
pub mod selection;

pub use compiler::{compile, compile_for, Act, Node, Polarity};
pub use selection::BranchSelection;
