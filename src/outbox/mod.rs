//! Outbox - durable event records written alongside the mutations they describe.
//!
//! The outbox has two phases:
//! 1. **Commit phase** - the [`EventFactory`] stages an event and the
//!    transactional writer inserts its [`OutboxEntry`] in the same transaction
//!    as the business mutation (see `writer`).
//! 2. **Delivery phase** - the dispatcher scans undelivered [`OutboxRecord`]s,
//!    hands them to a publisher, and records the outcome (see `dispatch`).

mod factory;
mod record;

pub use factory::{EventFactory, StagedEvent};
pub use record::{OutboxEntry, OutboxRecord};
