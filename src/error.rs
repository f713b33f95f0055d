use thiserror::Error;

/// Storage-level failure shared by the source-of-record store and the replica store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("transaction conflicted with a concurrent commit")]
    Conflict,

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("outbox record {0} not found")]
    RecordNotFound(u64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
