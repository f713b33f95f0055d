//! InMemorySourceStore - BTreeMap-backed source of record for tests and single-process use.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::{SourceStore, Transaction};
use crate::error::StoreError;
use crate::model::{House, Room};
use crate::outbox::{OutboxEntry, OutboxRecord};

#[derive(Clone, Default)]
struct Tables {
    houses: BTreeMap<i64, House>,
    rooms: BTreeMap<i64, Room>,
    next_house_id: i64,
    next_room_id: i64,
    version: u64,
}

struct Outbox {
    records: Vec<OutboxRecord>,
    next_id: u64,
}

/// Working copy handed out by [`InMemorySourceStore::begin`].
pub struct InMemoryTransaction {
    tables: Tables,
    base_version: u64,
}

impl Transaction for InMemoryTransaction {
    fn house(&self, id: i64) -> Option<House> {
        self.tables.houses.get(&id).cloned()
    }

    fn room(&self, id: i64) -> Option<Room> {
        self.tables.rooms.get(&id).cloned()
    }

    fn rooms_of(&self, house_id: i64) -> Vec<Room> {
        self.tables
            .rooms
            .values()
            .filter(|room| room.house_id == house_id)
            .cloned()
            .collect()
    }

    fn next_house_id(&mut self) -> i64 {
        self.tables.next_house_id += 1;
        self.tables.next_house_id
    }

    fn next_room_id(&mut self) -> i64 {
        self.tables.next_room_id += 1;
        self.tables.next_room_id
    }

    fn put_house(&mut self, house: House) {
        self.tables.next_house_id = self.tables.next_house_id.max(house.id);
        self.tables.houses.insert(house.id, house);
    }

    fn put_room(&mut self, room: Room) {
        self.tables.next_room_id = self.tables.next_room_id.max(room.id);
        self.tables.rooms.insert(room.id, room);
    }

    fn remove_house(&mut self, id: i64) -> Option<House> {
        self.tables.houses.remove(&id)
    }

    fn remove_room(&mut self, id: i64) -> Option<Room> {
        self.tables.rooms.remove(&id)
    }
}

/// In-memory source of record.
///
/// Clones share the same storage. Transactions are optimistic: a commit
/// whose working copy was taken before another commit landed is rejected
/// with [`StoreError::Conflict`].
#[derive(Clone)]
pub struct InMemorySourceStore {
    tables: Arc<RwLock<Tables>>,
    outbox: Arc<RwLock<Outbox>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl Default for InMemorySourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySourceStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            outbox: Arc::new(RwLock::new(Outbox {
                records: Vec::new(),
                next_id: 1,
            })),
            fail_next_commit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make the next commit fail after the unit of work has run.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn with_record<T>(
        &self,
        id: u64,
        update: impl FnOnce(&mut OutboxRecord) -> T,
    ) -> Result<T, StoreError> {
        let mut outbox = self
            .outbox
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox write"))?;
        let record = outbox
            .records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(StoreError::RecordNotFound(id))?;
        Ok(update(record))
    }
}

impl SourceStore for InMemorySourceStore {
    type Tx = InMemoryTransaction;

    fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("begin"))?;
        Ok(InMemoryTransaction {
            base_version: tables.version,
            tables: tables.clone(),
        })
    }

    fn commit(&self, tx: Self::Tx, entries: Vec<OutboxEntry>) -> Result<Vec<u64>, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::LockPoisoned("commit"))?;
        let mut outbox = self
            .outbox
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox write"))?;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::CommitFailed("injected commit failure".into()));
        }
        if tables.version != tx.base_version {
            return Err(StoreError::Conflict);
        }

        let mut committed = tx.tables;
        committed.version = tables.version + 1;
        *tables = committed;

        let now = Utc::now();
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = outbox.next_id;
            outbox.next_id += 1;
            outbox.records.push(OutboxRecord::new(id, entry, now));
            ids.push(id);
        }

        Ok(ids)
    }

    fn house(&self, id: i64) -> Result<Option<House>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.houses.get(&id).cloned())
    }

    fn room(&self, id: i64) -> Result<Option<Room>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.rooms.get(&id).cloned())
    }

    fn houses(&self) -> Result<Vec<House>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.houses.values().cloned().collect())
    }

    fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.rooms.values().cloned().collect())
    }

    fn scan_outbox(
        &self,
        limit: usize,
        max_retries: u32,
    ) -> Result<Vec<OutboxRecord>, StoreError> {
        let outbox = self
            .outbox
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;

        let mut pending: Vec<OutboxRecord> = outbox
            .records
            .iter()
            .filter(|record| record.is_pending(max_retries))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);

        Ok(pending)
    }

    fn mark_delivered(&self, id: u64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_record(id, |record| record.mark_delivered(at))
    }

    fn mark_failed(&self, id: u64, error: &str) -> Result<OutboxRecord, StoreError> {
        self.with_record(id, |record| {
            record.mark_failed(error);
            record.clone()
        })
    }

    fn outbox_record(&self, id: u64) -> Result<Option<OutboxRecord>, StoreError> {
        let outbox = self
            .outbox
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(outbox.records.iter().find(|record| record.id == id).cloned())
    }

    fn outbox_records(&self) -> Result<Vec<OutboxRecord>, StoreError> {
        let outbox = self
            .outbox
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(outbox.records.clone())
    }

    fn reset_retries(&self, id: u64) -> Result<(), StoreError> {
        self.with_record(id, |record| {
            record.retry_count = 0;
            record.last_error = None;
        })
    }
}
