//! Transactional writer - one commit for a mutation and the events it produces.
//!
//! Publishing a message after the database commit (or before it) loses or
//! duplicates events when the process dies in between. The writer instead
//! stages the events as outbox rows inside the business transaction:
//!
//! ```text
//! begin ──► unit of work ──► insert outbox rows ──► commit
//!               │ Err(DomainError)                     │ Err(StoreError)
//!               ▼                                      ▼
//!           rollback, surfaced untouched          rollback, transient
//! ```
//!
//! Request handlers must go through the writer for every mutation that
//! replicas need to see; [`HouseService`] does this for houses and rooms.

mod house_service;

use thiserror::Error;
use tracing::debug;

use crate::error::StoreError;
use crate::event::{EventError, SyncEvent};
use crate::model::EntityType;
use crate::outbox::StagedEvent;
use crate::source::SourceStore;

pub use house_service::HouseService;

/// Business-rule failure detected inside a unit of work.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityType, id: i64 },

    #[error("room references missing house {0}")]
    HouseNotFound(i64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("event could not be staged: {0}")]
    Event(#[from] EventError),
}

/// Error returned by [`TransactionalWriter::execute`].
#[derive(Debug, Error)]
pub enum WriteError {
    /// The unit of work rejected the mutation; nothing was written.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The transaction could not be opened or committed; nothing was written.
    #[error("transaction failed: {0}")]
    Store(#[source] StoreError),
}

impl WriteError {
    /// True when retrying the whole request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, WriteError::Store(_))
    }
}

/// Outcome of a committed unit of work.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub events: Vec<SyncEvent>,
    /// Ids of the outbox records inserted with the mutation, in event order.
    pub outbox_ids: Vec<u64>,
}

/// Runs units of work so that their mutations and outbox rows commit together.
pub struct TransactionalWriter<S> {
    store: S,
    max_attempts: u32,
}

impl<S: SourceStore> TransactionalWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: 3,
        }
    }

    /// How many times a unit of work is re-run after a commit conflict.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Execute `work` in a transaction and commit it together with the events it returns.
    ///
    /// `work` may run more than once if the store reports a conflict; every
    /// run starts from a fresh transaction.
    pub fn execute<T, F>(&self, mut work: F) -> Result<Committed<T>, WriteError>
    where
        F: FnMut(&mut S::Tx) -> Result<(T, Vec<StagedEvent>), DomainError>,
    {
        let mut attempt = 1;
        loop {
            let mut tx = self.store.begin().map_err(WriteError::Store)?;

            let (value, staged) = match work(&mut tx) {
                Ok(result) => result,
                Err(err) => {
                    debug!(error = %err, "unit of work rejected, rolling back");
                    return Err(err.into());
                }
            };

            let (events, entries): (Vec<_>, Vec<_>) = staged
                .into_iter()
                .map(|staged| (staged.event, staged.entry))
                .unzip();

            match self.store.commit(tx, entries) {
                Ok(outbox_ids) => {
                    return Ok(Committed {
                        value,
                        events,
                        outbox_ids,
                    })
                }
                Err(StoreError::Conflict) if attempt < self.max_attempts => {
                    debug!(attempt, "commit conflicted, re-running unit of work");
                    attempt += 1;
                }
                Err(err) => return Err(WriteError::Store(err)),
            }
        }
    }
}
