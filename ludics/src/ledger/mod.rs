//! Move ledger storage and target authorship.

pub mod authors;
pub mod store;

pub use authors::{AuthorDirectory, AuthorEntry, InMemoryAuthors, SharedAuthorDirectory};
pub use store::{
    InMemoryMoveStore, LedgerHead, MoveStore, SharedMoveStore, StoreError, StoreResult,
};

#[cfg(test)]
pub use authors::MockAuthorDirectory;
#[cfg(test)]
pub use store::MockMoveStore;
