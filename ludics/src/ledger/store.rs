//! Append-only move store.
//!
//! The engine only needs three things from durable storage: the ordered
//! moves of a target, a lookup by signature, and a compare-and-append that
//! refuses to write when the target's ledger moved since it was read. The
//! in-memory store here implements that contract for tests, the CLI, and
//! embedders that persist elsewhere.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::moves::{Move, MoveCandidate, Signature, TargetRef};

/// Error type for move store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ledger for {target} moved: expected head {expected}, found {found}")]
    Conflict {
        target: TargetRef,
        expected: LedgerHead,
        found: LedgerHead,
    },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for move store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a move store
pub type SharedMoveStore = Arc<dyn MoveStore>;

/// Position of a target's ledger: how many moves, and the last one's id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerHead {
    pub len: usize,
    pub last_move_id: Option<String>,
}

impl LedgerHead {
    /// Head of an ordered move list.
    pub fn of(moves: &[Move]) -> Self {
        Self {
            len: moves.len(),
            last_move_id: moves.last().map(|m| m.id.clone()),
        }
    }
}

impl std::fmt::Display for LedgerHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.last_move_id {
            Some(id) => write!(f, "{}@{}", self.len, id),
            None => write!(f, "empty"),
        }
    }
}

/// Durable, append-only storage for committed moves.
#[cfg_attr(test, mockall::automock)]
pub trait MoveStore: Send + Sync {
    /// Moves of `target` in ledger order.
    fn moves_for(&self, target: &TargetRef) -> StoreResult<Vec<Move>>;

    /// The committed move carrying `signature`, on any target.
    fn find_by_signature(&self, signature: &Signature) -> StoreResult<Option<Move>>;

    /// Commit `candidate` if the target's head still equals `expected`.
    ///
    /// The store assigns the id and `createdAt`; `createdAt` is strictly
    /// increasing per target.
    fn append(
        &self,
        candidate: MoveCandidate,
        expected: &LedgerHead,
        default_key: &str,
    ) -> StoreResult<Move>;

    fn head(&self, target: &TargetRef) -> StoreResult<LedgerHead> {
        Ok(LedgerHead::of(&self.moves_for(target)?))
    }
}

#[derive(Default)]
struct Ledgers {
    by_target: HashMap<TargetRef, Vec<Move>>,
    by_signature: HashMap<Signature, (TargetRef, usize)>,
}

/// In-memory move store.
#[derive(Default)]
pub struct InMemoryMoveStore {
    inner: RwLock<Ledgers>,
}

impl InMemoryMoveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedMoveStore {
        Arc::new(self)
    }

    /// Total moves across all targets.
    pub fn len(&self) -> StoreResult<usize> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.by_target.values().map(Vec::len).sum())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = Utc::now();
        match last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        }
    }
}

impl MoveStore for InMemoryMoveStore {
    fn moves_for(&self, target: &TargetRef) -> StoreResult<Vec<Move>> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.by_target.get(target).cloned().unwrap_or_default())
    }

    fn find_by_signature(&self, signature: &Signature) -> StoreResult<Option<Move>> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner
            .by_signature
            .get(signature)
            .and_then(|(target, idx)| inner.by_target.get(target)?.get(*idx))
            .cloned())
    }

    fn append(
        &self,
        candidate: MoveCandidate,
        expected: &LedgerHead,
        default_key: &str,
    ) -> StoreResult<Move> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let target = candidate.target.clone();
        let ledger = inner.by_target.entry(target.clone()).or_default();

        let found = LedgerHead::of(ledger);
        if &found != expected {
            return Err(StoreError::Conflict {
                target,
                expected: expected.clone(),
                found,
            });
        }

        let created_at = Self::next_timestamp(ledger.last().map(|m| m.created_at));
        let mv = Move::commit(
            candidate,
            default_key,
            Uuid::new_v4().to_string(),
            created_at,
        );
        let idx = ledger.len();
        ledger.push(mv.clone());
        inner
            .by_signature
            .entry(mv.signature.clone())
            .or_insert((target, idx));

        debug!(move_id = %mv.id, kind = %mv.kind, head = idx + 1, "Appended move");
        Ok(mv)
    }
}
