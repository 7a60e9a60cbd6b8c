use std::fmt::Debug;

use crate::{
    helpers::SequenceScope,
    traits::{LedgerError, SequenceManagement},
};

/// Hands out human-readable business identifiers (`INV-0001`, `SGSER0042`, `SGTPL/25-26/0007`).
pub struct SequenceApi<B> {
    db: B,
}

impl<B: Debug> Debug for SequenceApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SequenceApi ({:?})", self.db)
    }
}

impl<B> SequenceApi<B>
where B: SequenceManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Returns the next identifier in `scope`. No two callers ever receive the same identifier.
    pub async fn allocate_sequential_id(&self, scope: &SequenceScope) -> Result<String, LedgerError> {
        self.db.allocate_sequential_id(scope).await
    }

    /// Continues numbering for `scope` from an identifier issued by another system.
    pub async fn seed_sequence(&self, scope: &SequenceScope, last_issued: &str) -> Result<i64, LedgerError> {
        self.db.seed_sequence(scope, last_issued).await
    }

    pub async fn current_sequence_value(&self, scope: &SequenceScope) -> Result<Option<i64>, LedgerError> {
        self.db.current_sequence_value(scope).await
    }
}
