//! Scenario files: registered targets plus the moves to replay.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ludics::{
    AuthorEntry, DialogueEngine, InMemoryAuthors, MoveCandidate, SubmitOutcome, TargetRef,
};

/// An additive branch choice to apply after replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchChoice {
    #[serde(flatten)]
    pub target: TargetRef,
    pub locus_path: String,
    pub suffix: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub authors: Vec<AuthorEntry>,
    #[serde(default)]
    pub moves: Vec<MoveCandidate>,
    #[serde(default)]
    pub selections: Vec<BranchChoice>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn authors(&self) -> InMemoryAuthors {
        self.authors.iter().cloned().collect()
    }

    /// Submit every move in order, returning one outcome per move.
    pub fn replay(&self, engine: &DialogueEngine) -> Result<Vec<SubmitOutcome>> {
        let mut outcomes = Vec::with_capacity(self.moves.len());
        for (i, candidate) in self.moves.iter().enumerate() {
            let outcome = engine
                .submit_move(candidate.clone())
                .with_context(|| format!("move #{} ({}) failed", i, candidate.kind))?;
            if !outcome.is_ok() {
                warn!(index = i, kind = %candidate.kind, "Scenario move rejected");
            }
            outcomes.push(outcome);
        }
        self.apply_selections(engine)?;
        Ok(outcomes)
    }

    /// Insert every move without validation.
    pub fn seed(&self, engine: &DialogueEngine) -> Result<()> {
        let report = engine.seed(self.moves.clone())?;
        info!(inserted = report.inserted, skipped = report.skipped, "Scenario seeded");
        self.apply_selections(engine)
    }

    fn apply_selections(&self, engine: &DialogueEngine) -> Result<()> {
        for choice in &self.selections {
            engine
                .select_branch(&choice.target, &choice.locus_path, choice.suffix)
                .with_context(|| {
                    format!("cannot select {}.{}", choice.locus_path, choice.suffix)
                })?;
        }
        Ok(())
    }
}
