//! Who authored each target.
//!
//! Legality and validation both hinge on the target's author: the author
//! answers challenges, everyone else raises them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::store::{StoreError, StoreResult};
use crate::moves::TargetType;

/// Lookup of the author of a claim or argument.
#[cfg_attr(test, mockall::automock)]
pub trait AuthorDirectory: Send + Sync {
    /// Author of the target, or `None` if the target does not exist.
    fn author_of(&self, target_type: TargetType, target_id: &str) -> StoreResult<Option<String>>;
}

/// Shared reference to an author directory
pub type SharedAuthorDirectory = Arc<dyn AuthorDirectory>;

/// One registered target, as read from scenario files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorEntry {
    pub target_type: TargetType,
    pub target_id: String,
    pub author_id: String,
}

/// In-memory author directory.
#[derive(Debug, Default)]
pub struct InMemoryAuthors {
    authors: RwLock<HashMap<(TargetType, String), String>>,
}

impl InMemoryAuthors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedAuthorDirectory {
        Arc::new(self)
    }

    /// Register (or re-register) the author of a target.
    pub fn register(&self, target_type: TargetType, target_id: &str, author_id: &str) -> StoreResult<()> {
        let mut authors = self.authors.write().map_err(|_| StoreError::LockPoisoned)?;
        authors.insert((target_type, target_id.to_string()), author_id.to_string());
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    ///
    /// The directory is not shared yet, so a poisoned lock cannot be observed
    /// by anyone else and its map is taken as is.
    pub fn with(mut self, target_type: TargetType, target_id: &str, author_id: &str) -> Self {
        self.authors
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((target_type, target_id.to_string()), author_id.to_string());
        self
    }
}

impl FromIterator<AuthorEntry> for InMemoryAuthors {
    fn from_iter<I: IntoIterator<Item = AuthorEntry>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |dir, entry| {
            dir.with(entry.target_type, &entry.target_id, &entry.author_id)
        })
    }
}

impl AuthorDirectory for InMemoryAuthors {
    fn author_of(&self, target_type: TargetType, target_id: &str) -> StoreResult<Option<String>> {
        let authors = self.authors.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(authors.get(&(target_type, target_id.to_string())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let dir = InMemoryAuthors::new().with(TargetType::Claim, "c1", "u1");
        assert_eq!(dir.author_of(TargetType::Claim, "c1").unwrap(), Some("u1".to_string()));
        assert_eq!(dir.author_of(TargetType::Argument, "c1").unwrap(), None);
        assert_eq!(dir.author_of(TargetType::Claim, "c2").unwrap(), None);

        dir.register(TargetType::Claim, "c1", "u9").unwrap();
        assert_eq!(dir.author_of(TargetType::Claim, "c1").unwrap(), Some("u9".to_string()));
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let dir = Arc::new(InMemoryAuthors::new().with(TargetType::Claim, "c1", "u1"));
        let poisoner = Arc::clone(&dir);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.authors.write().unwrap();
            panic!("poison the directory");
        })
        .join();

        assert!(matches!(
            dir.author_of(TargetType::Claim, "c1"),
            Err(StoreError::LockPoisoned)
        ));
        assert!(matches!(
            dir.register(TargetType::Claim, "c2", "u2"),
            Err(StoreError::LockPoisoned)
        ));
    }

    #[test]
    fn test_from_entries() {
        let entries: Vec<AuthorEntry> = serde_json::from_value(serde_json::json!([
            { "targetType": "claim", "targetId": "c1", "authorId": "u1" },
            { "targetType": "argument", "targetId": "a1", "authorId": "u3" }
        ]))
        .unwrap();
        let dir: InMemoryAuthors = entries.into_iter().collect();
        assert_eq!(dir.author_of(TargetType::Argument, "a1").unwrap(), Some("u3".to_string()));
    }
}
