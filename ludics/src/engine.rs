//! Dialogue engine: the four public operations over a move store.
//!
//! ```text
//!   submit_move ──▶ per-target lock ──▶ read ledger ──▶ validate ──┐
//!                        ▲                                        │
//!                        └──── head moved (retry) ◀── append ◀────┘
//!
//!   legal_moves / closure_hints / compiled_tree
//!        └──▶ read ledger ──▶ compile (cached by head) ──▶ step
//! ```
//!
//! Queries never write. Writes to one target are serialized by a lock held
//! in this engine and by the store's compare-and-append, so a writer that
//! bypasses the engine still cannot slip a move between validation and
//! append. Targets never wait on each other's writes or compiles.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::closure::{closure_report, daimon_hints_with, LocusStatus};
use crate::config::EngineConfig;
use crate::events::{DialogueEvent, EventBus, SharedEventBus};
use crate::ledger::{LedgerHead, SharedAuthorDirectory, SharedMoveStore, StoreError};
use crate::legality::{legal_moves, LegalMove, LegalityContext};
use crate::locus::{LocusError, LocusPath};
use crate::moves::{open_challenges, Move, MoveCandidate, OpenChallenge, TargetRef};
use crate::rules::{validate_with, RuleCode, RuleContext, ValidationOutcome};
use crate::tree::{compile_for, BranchSelection, Node};

/// Error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Target not found: {0}")]
    TargetNotFound(TargetRef),

    #[error("Malformed locus: {0}")]
    MalformedLocus(#[from] LocusError),

    /// The path parsed but names no node of the target's tree.
    #[error("Malformed locus: {path} does not exist on {target}")]
    LocusNotFound { target: TargetRef, path: LocusPath },

    #[error("Locus {path} on {target} offers no additive choice")]
    NotAdditive { target: TargetRef, path: LocusPath },

    #[error("Concurrent conflict on {target} after {attempts} attempts")]
    ConcurrentConflict { target: TargetRef, attempts: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Shared reference to a DialogueEngine
pub type SharedDialogueEngine = Arc<DialogueEngine>;

/// Outcome of [`DialogueEngine::submit_move`].
///
/// Serializes as `{ "ok": true, "move": … }` or
/// `{ "ok": false, "reasons": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SubmitReport", try_from = "SubmitReport")]
pub enum SubmitOutcome {
    Accepted { r#move: Move },
    Rejected { reasons: Vec<RuleCode> },
}

impl SubmitOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The committed move, if accepted.
    pub fn committed(&self) -> Option<&Move> {
        match self {
            Self::Accepted { r#move } => Some(r#move),
            Self::Rejected { .. } => None,
        }
    }

    pub fn reasons(&self) -> &[RuleCode] {
        match self {
            Self::Accepted { .. } => &[],
            Self::Rejected { reasons } => reasons,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SubmitReport {
    ok: bool,
    #[serde(default, rename = "move", skip_serializing_if = "Option::is_none")]
    r#move: Option<Move>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reasons: Vec<RuleCode>,
}

impl From<SubmitOutcome> for SubmitReport {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Accepted { r#move } => Self {
                ok: true,
                r#move: Some(r#move),
                reasons: Vec::new(),
            },
            SubmitOutcome::Rejected { reasons } => Self {
                ok: false,
                r#move: None,
                reasons,
            },
        }
    }
}

impl TryFrom<SubmitReport> for SubmitOutcome {
    type Error = String;

    fn try_from(report: SubmitReport) -> Result<Self, Self::Error> {
        match (report.ok, report.r#move) {
            (true, Some(r#move)) => Ok(Self::Accepted { r#move }),
            (true, None) => Err("accepted outcome without a move".to_string()),
            (false, _) => Ok(Self::Rejected {
                reasons: report.reasons,
            }),
        }
    }
}

/// Result of [`DialogueEngine::seed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// What an append gate decided after looking at the fresh ledger.
enum Gate {
    Pass,
    Refuse(Vec<RuleCode>),
}

/// Compiled trees by target, bounded by
/// [`EngineConfig::tree_cache_capacity`].
#[derive(Default)]
struct TreeCache {
    entries: HashMap<TargetRef, CachedTree>,
    tick: u64,
}

struct CachedTree {
    head: LedgerHead,
    tree: Arc<Node>,
    used: u64,
}

impl TreeCache {
    fn get(&mut self, target: &TargetRef, head: &LedgerHead) -> Option<Arc<Node>> {
        self.tick += 1;
        let entry = self.entries.get_mut(target).filter(|e| e.head == *head)?;
        entry.used = self.tick;
        Some(Arc::clone(&entry.tree))
    }

    fn insert(&mut self, target: TargetRef, head: LedgerHead, tree: Arc<Node>, capacity: usize) {
        self.tick += 1;
        if !self.entries.contains_key(&target) && self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.used)
                .map(|(t, _)| t.clone());
            if let Some(oldest) = oldest {
                debug!(target_ref = %oldest, "Evicting cached tree");
                self.entries.remove(&oldest);
            }
        }
        if capacity > 0 {
            let used = self.tick;
            self.entries.insert(target, CachedTree { head, tree, used });
        }
    }
}

/// Move-legality and closure engine over a shared store.
pub struct DialogueEngine {
    store: SharedMoveStore,
    authors: SharedAuthorDirectory,
    config: EngineConfig,
    events: Option<SharedEventBus>,
    locks: Mutex<HashMap<TargetRef, Arc<Mutex<()>>>>,
    trees: Mutex<TreeCache>,
    selections: RwLock<HashMap<TargetRef, BranchSelection>>,
}

impl DialogueEngine {
    pub fn new(store: SharedMoveStore, authors: SharedAuthorDirectory) -> Self {
        Self::with_config(store, authors, EngineConfig::default())
    }

    pub fn with_config(
        store: SharedMoveStore,
        authors: SharedAuthorDirectory,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            authors,
            config,
            events: None,
            locks: Mutex::new(HashMap::new()),
            trees: Mutex::new(TreeCache::default()),
            selections: RwLock::new(HashMap::new()),
        }
    }

    /// Publish events on `bus`.
    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Publish events on a fresh bus sized by the config.
    pub fn with_events(self) -> Self {
        let bus = EventBus::with_capacity(self.config.event_capacity).shared();
        self.with_event_bus(bus)
    }

    pub fn shared(self) -> SharedDialogueEngine {
        Arc::new(self)
    }

    pub fn event_bus(&self) -> Option<&SharedEventBus> {
        self.events.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Moves `actor_id` may play at `locus_path` on `target`.
    pub fn legal_moves(
        &self,
        target: &TargetRef,
        locus_path: &str,
        actor_id: &str,
    ) -> EngineResult<Vec<LegalMove>> {
        let author = self.author_of(target)?;
        let locus: LocusPath = locus_path.parse()?;
        let ledger = self.store.moves_for(target)?;
        let tree = self.tree_for(target, &ledger, &author)?;
        let selection = self.selection(target)?;
        let hints = daimon_hints_with(&tree, &selection);

        let ctx = LegalityContext {
            ledger: &ledger,
            target_author: &author,
            hints: &hints,
            selection: &selection,
            default_key: &self.config.default_key,
        };
        let moves = legal_moves(&ctx, &locus, actor_id);
        debug!(target_ref = %target, locus = %locus, actor_id, offered = moves.len(), "Computed legal moves");
        Ok(moves)
    }

    /// Loci of `target` where a daimon may be placed now.
    pub fn closure_hints(&self, target: &TargetRef) -> EngineResult<Vec<LocusPath>> {
        let (tree, selection) = self.tree_and_selection(target)?;
        let hints = daimon_hints_with(&tree, &selection);
        debug!(target_ref = %target, hints = hints.len(), "Computed closure hints");
        Ok(hints)
    }

    /// Closure status of every locus of `target`.
    pub fn closure_report(
        &self,
        target: &TargetRef,
    ) -> EngineResult<BTreeMap<LocusPath, LocusStatus>> {
        let (tree, selection) = self.tree_and_selection(target)?;
        Ok(closure_report(&tree, &selection))
    }

    /// The compiled interaction tree of `target`.
    pub fn compiled_tree(&self, target: &TargetRef) -> EngineResult<Arc<Node>> {
        let author = self.author_of(target)?;
        let ledger = self.store.moves_for(target)?;
        self.tree_for(target, &ledger, &author)
    }

    /// Challenges on `target` still awaiting an answer.
    pub fn open_challenges(&self, target: &TargetRef) -> EngineResult<Vec<OpenChallenge>> {
        self.author_of(target)?;
        let ledger = self.store.moves_for(target)?;
        Ok(open_challenges(&ledger).into_values().collect())
    }

    /// Committed moves of `target`, in ledger order.
    pub fn ledger(&self, target: &TargetRef) -> EngineResult<Vec<Move>> {
        self.author_of(target)?;
        Ok(self.store.moves_for(target)?)
    }

    /// Current branch selection of `target`.
    pub fn selection(&self, target: &TargetRef) -> EngineResult<BranchSelection> {
        let selections = self.selections.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(selections.get(target).cloned().unwrap_or_default())
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Validate `candidate` against its target's ledger and append it.
    ///
    /// Rule violations are an outcome, not an error.
    pub fn submit_move(&self, candidate: MoveCandidate) -> EngineResult<SubmitOutcome> {
        let author = self.author_of(&candidate.target)?;
        let default_key = self.config.default_key.clone();

        let result = self.append_guarded(&candidate, |ledger| {
            let ctx = RuleContext {
                ledger,
                target_author: &author,
                default_key: &default_key,
            };
            match validate_with(&candidate, &ctx) {
                ValidationOutcome::Admissible => Gate::Pass,
                ValidationOutcome::Rejected { reasons } => Gate::Refuse(reasons),
            }
        })?;

        match result {
            Ok(mv) => {
                info!(
                    target_ref = %mv.target,
                    move_id = %mv.id,
                    kind = %mv.kind,
                    actor_id = %mv.actor_id,
                    locus = %mv.locus(),
                    "Move committed"
                );
                self.emit(DialogueEvent::MoveCommitted {
                    target: mv.target.clone(),
                    move_id: mv.id.clone(),
                    kind: mv.kind,
                    actor_id: mv.actor_id.clone(),
                    locus_path: mv.locus().clone(),
                    timestamp: Utc::now(),
                });
                Ok(SubmitOutcome::Accepted { r#move: mv })
            }
            Err(reasons) => {
                let codes: Vec<&str> = reasons.iter().map(|r| r.as_str()).collect();
                warn!(
                    target_ref = %candidate.target,
                    kind = %candidate.kind,
                    actor_id = %candidate.actor_id,
                    reasons = ?codes,
                    "Move rejected"
                );
                self.emit(DialogueEvent::MoveRejected {
                    target: candidate.target.clone(),
                    kind: candidate.kind,
                    actor_id: candidate.actor_id.clone(),
                    reasons: reasons.clone(),
                    timestamp: Utc::now(),
                });
                Ok(SubmitOutcome::Rejected { reasons })
            }
        }
    }

    /// Insert moves without validation, skipping any whose signature is
    /// already committed. Candidates are committed in the order given.
    pub fn seed(&self, candidates: Vec<MoveCandidate>) -> EngineResult<SeedReport> {
        let mut report = SeedReport::default();
        for candidate in candidates {
            let signature = candidate.signature_with_default(&self.config.default_key);
            if self.store.find_by_signature(&signature)?.is_some() {
                report.skipped += 1;
                continue;
            }
            let result = self.append_guarded(&candidate, |ledger| {
                if ledger.iter().any(|mv| mv.signature == signature) {
                    Gate::Refuse(vec![RuleCode::R4DuplicateReply])
                } else {
                    Gate::Pass
                }
            })?;
            match result {
                Ok(_) => report.inserted += 1,
                Err(_) => report.skipped += 1,
            }
        }

        info!(inserted = report.inserted, skipped = report.skipped, "Seeded ledger");
        self.emit(DialogueEvent::LedgerSeeded {
            inserted: report.inserted,
            skipped: report.skipped,
            timestamp: Utc::now(),
        });
        Ok(report)
    }

    /// Choose child `suffix` as the live continuation of the additive locus
    /// `locus_path`. Returns the previous choice.
    pub fn select_branch(
        &self,
        target: &TargetRef,
        locus_path: &str,
        suffix: u32,
    ) -> EngineResult<Option<u32>> {
        let author = self.author_of(target)?;
        let locus: LocusPath = locus_path.parse()?;
        let ledger = self.store.moves_for(target)?;
        let tree = self.tree_for(target, &ledger, &author)?;

        let node = tree.find(&locus).ok_or_else(|| EngineError::LocusNotFound {
            target: target.clone(),
            path: locus.clone(),
        })?;
        if !node.is_additive() {
            return Err(EngineError::NotAdditive {
                target: target.clone(),
                path: locus,
            });
        }
        if node.child(suffix).is_none() {
            return Err(EngineError::LocusNotFound {
                target: target.clone(),
                path: locus.child(suffix),
            });
        }

        let previous = {
            let mut selections = self.selections.write().map_err(|_| EngineError::LockPoisoned)?;
            selections
                .entry(target.clone())
                .or_default()
                .select(locus.clone(), suffix)
        };

        info!(target_ref = %target, locus = %locus, suffix, "Branch selected");
        self.emit(DialogueEvent::BranchSelected {
            target: target.clone(),
            locus_path: locus,
            suffix,
            timestamp: Utc::now(),
        });
        Ok(previous)
    }

    /// Undo the branch choice at `locus_path`. Returns the removed choice.
    pub fn clear_branch(&self, target: &TargetRef, locus_path: &str) -> EngineResult<Option<u32>> {
        self.author_of(target)?;
        let locus: LocusPath = locus_path.parse()?;

        let removed = {
            let mut selections = self.selections.write().map_err(|_| EngineError::LockPoisoned)?;
            let removed = selections.get_mut(target).and_then(|s| s.clear(&locus));
            if selections.get(target).is_some_and(BranchSelection::is_empty) {
                selections.remove(target);
            }
            removed
        };

        if removed.is_some() {
            info!(target_ref = %target, locus = %locus, "Branch cleared");
            self.emit(DialogueEvent::BranchCleared {
                target: target.clone(),
                locus_path: locus,
                timestamp: Utc::now(),
            });
        }
        Ok(removed)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn author_of(&self, target: &TargetRef) -> EngineResult<String> {
        self.authors
            .author_of(target.target_type, &target.target_id)?
            .ok_or_else(|| EngineError::TargetNotFound(target.clone()))
    }

    fn tree_and_selection(&self, target: &TargetRef) -> EngineResult<(Arc<Node>, BranchSelection)> {
        let author = self.author_of(target)?;
        let ledger = self.store.moves_for(target)?;
        let tree = self.tree_for(target, &ledger, &author)?;
        Ok((tree, self.selection(target)?))
    }

    /// Compiled tree for `ledger`, reused while the head is unchanged.
    fn tree_for(&self, target: &TargetRef, ledger: &[Move], author: &str) -> EngineResult<Arc<Node>> {
        if !self.config.cache_trees {
            return Ok(Arc::new(compile_for(ledger, author)));
        }

        let head = LedgerHead::of(ledger);
        {
            let mut trees = self.trees.lock().map_err(|_| EngineError::LockPoisoned)?;
            if let Some(tree) = trees.get(target, &head) {
                debug!(target_ref = %target, head = %head, "Tree cache hit");
                return Ok(tree);
            }
        }

        // The cache lock is not held while compiling.
        let tree = Arc::new(compile_for(ledger, author));
        let mut trees = self.trees.lock().map_err(|_| EngineError::LockPoisoned)?;
        trees.insert(
            target.clone(),
            head,
            Arc::clone(&tree),
            self.config.tree_cache_capacity,
        );
        Ok(tree)
    }

    fn target_lock(&self, target: &TargetRef) -> EngineResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| EngineError::LockPoisoned)?;
        Ok(Arc::clone(locks.entry(target.clone()).or_default()))
    }

    /// Drop the per-target lock once no writer holds or awaits it.
    fn release_target_lock(&self, target: &TargetRef, lock: Arc<Mutex<()>>) -> EngineResult<()> {
        let mut locks = self.locks.lock().map_err(|_| EngineError::LockPoisoned)?;
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(target);
        }
        Ok(())
    }

    /// Read the ledger, run `gate`, and compare-and-append, retrying when
    /// the head moves underneath.
    fn append_guarded<F>(
        &self,
        candidate: &MoveCandidate,
        gate: F,
    ) -> EngineResult<Result<Move, Vec<RuleCode>>>
    where
        F: Fn(&[Move]) -> Gate,
    {
        let target = &candidate.target;
        let lock = self.target_lock(target)?;
        let result = match lock.lock() {
            Ok(_guard) => self.append_retrying(candidate, gate),
            Err(_) => Err(EngineError::LockPoisoned),
        };
        self.release_target_lock(target, lock)?;
        result
    }

    fn append_retrying<F>(
        &self,
        candidate: &MoveCandidate,
        gate: F,
    ) -> EngineResult<Result<Move, Vec<RuleCode>>>
    where
        F: Fn(&[Move]) -> Gate,
    {
        let target = &candidate.target;
        let attempts = self.config.max_append_retries.max(1);
        for attempt in 1..=attempts {
            let ledger = self.store.moves_for(target)?;
            if let Gate::Refuse(reasons) = gate(&ledger) {
                return Ok(Err(reasons));
            }

            let head = LedgerHead::of(&ledger);
            match self
                .store
                .append(candidate.clone(), &head, &self.config.default_key)
            {
                Ok(mv) => return Ok(Ok(mv)),
                Err(StoreError::Conflict { found, .. }) => {
                    warn!(
                        target_ref = %target,
                        attempt,
                        expected = %head,
                        found = %found,
                        "Ledger head moved during append"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::ConcurrentConflict {
            target: target.clone(),
            attempts,
        })
    }

    fn emit(&self, event: DialogueEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}
