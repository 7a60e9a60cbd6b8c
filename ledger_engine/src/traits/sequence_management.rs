use crate::{helpers::SequenceScope, traits::LedgerError};

/// Collision-free allocation of human-readable business identifiers.
#[allow(async_fn_in_trait)]
pub trait SequenceManagement {
    /// Atomically advances the counter for `scope` and returns the formatted identifier.
    ///
    /// The first allocation in a scope returns the scope's default identifier (counter 1). Concurrent callers never
    /// receive the same identifier.
    async fn allocate_sequential_id(&self, scope: &SequenceScope) -> Result<String, LedgerError>;

    /// Adopts a previously issued identifier (e.g. from a legacy system) as the "last issued" value for `scope`, so
    /// that the next allocation follows on from it.
    ///
    /// If the identifier's trailing counter cannot be parsed, the scope is left at its default. A counter is never
    /// moved backwards. Returns the counter value in effect after seeding.
    async fn seed_sequence(&self, scope: &SequenceScope, last_issued: &str) -> Result<i64, LedgerError>;

    /// The last counter value handed out for `scope`, or `None` if the scope has never been used.
    async fn current_sequence_value(&self, scope: &SequenceScope) -> Result<Option<i64>, LedgerError>;
}
