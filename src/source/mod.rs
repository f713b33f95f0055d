//! Source of record - houses, rooms, and the outbox table that lives beside them.
//!
//! ```text
//! ┌───────────────────────── SourceStore ─────────────────────────┐
//! │  houses / rooms            │  outbox                           │
//! │  (mutated in Transactions) │  inserted by commit()             │
//! │                            │  scanned + updated by dispatcher  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A transaction is a private working copy of the business tables. Nothing it
//! does is visible until [`SourceStore::commit`] applies the copy and appends
//! the outbox entries in one step; dropping it is a rollback.

mod in_memory;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{House, Room};
use crate::outbox::{OutboxEntry, OutboxRecord};

pub use in_memory::{InMemorySourceStore, InMemoryTransaction};

/// Working copy of the business tables inside one transaction.
pub trait Transaction {
    fn house(&self, id: i64) -> Option<House>;

    fn room(&self, id: i64) -> Option<Room>;

    fn rooms_of(&self, house_id: i64) -> Vec<Room>;

    /// Reserve the next house identifier.
    fn next_house_id(&mut self) -> i64;

    /// Reserve the next room identifier.
    fn next_room_id(&mut self) -> i64;

    /// Insert or replace a house.
    fn put_house(&mut self, house: House);

    /// Insert or replace a room.
    fn put_room(&mut self, room: Room);

    fn remove_house(&mut self, id: i64) -> Option<House>;

    fn remove_room(&mut self, id: i64) -> Option<Room>;
}

/// Storage for the business tables and the outbox.
///
/// Writers only ever insert outbox rows (through `commit`); the dispatcher
/// only ever reads and updates existing rows.
pub trait SourceStore: Send + Sync {
    type Tx: Transaction;

    /// Open a transaction.
    fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Atomically apply the transaction and insert `entries` into the outbox.
    ///
    /// Returns the ids assigned to the new outbox records, in order. On error
    /// neither the mutation nor any outbox row is persisted.
    /// [`StoreError::Conflict`] means another transaction committed first and
    /// the unit of work may be re-run.
    fn commit(&self, tx: Self::Tx, entries: Vec<OutboxEntry>) -> Result<Vec<u64>, StoreError>;

    fn house(&self, id: i64) -> Result<Option<House>, StoreError>;

    fn room(&self, id: i64) -> Result<Option<Room>, StoreError>;

    fn houses(&self) -> Result<Vec<House>, StoreError>;

    fn rooms(&self) -> Result<Vec<Room>, StoreError>;

    /// Up to `limit` undelivered records with `retry_count < max_retries`,
    /// oldest `created_at` first, ties broken by `id`.
    fn scan_outbox(&self, limit: usize, max_retries: u32)
        -> Result<Vec<OutboxRecord>, StoreError>;

    /// Record a successful delivery.
    fn mark_delivered(&self, id: u64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Record a failed delivery attempt and return the updated record.
    fn mark_failed(&self, id: u64, error: &str) -> Result<OutboxRecord, StoreError>;

    fn outbox_record(&self, id: u64) -> Result<Option<OutboxRecord>, StoreError>;

    /// Every outbox record, in id order.
    fn outbox_records(&self) -> Result<Vec<OutboxRecord>, StoreError>;

    /// Undelivered records that have used up their retries.
    fn stuck_records(&self, max_retries: u32) -> Result<Vec<OutboxRecord>, StoreError> {
        Ok(self
            .outbox_records()?
            .into_iter()
            .filter(|record| record.is_exhausted(max_retries))
            .collect())
    }

    fn pending_count(&self, max_retries: u32) -> Result<usize, StoreError> {
        Ok(self
            .outbox_records()?
            .iter()
            .filter(|record| record.is_pending(max_retries))
            .count())
    }

    /// Put a stuck record back into the scan set by clearing its retry bookkeeping.
    fn reset_retries(&self, id: u64) -> Result<(), StoreError>;
}
