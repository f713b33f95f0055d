//! Topic bus - durable per-subscription delivery of sync events.
//!
//! ## Architecture
//!
//! ```text
//!                     publish(topic, event)
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//!   ┌─────────────────────┐         ┌─────────────────────┐
//!   │ houses / temperature│         │ houses / audit      │   one queue per
//!   │ ready ─► in flight  │         │ ready ─► in flight  │   subscription
//!   │   ▲ nack     │ ack  │         └─────────────────────┘
//!   │   └──────────┘      │
//!   │ dead letters        │ ◄── parked after max_delivery_count
//!   └─────────────────────┘
//! ```
//!
//! Each entity type has its own topic (see [`EntityType::topic`]). A
//! subscription sees every message published to its topic after it was
//! created. Messages that keep failing are parked in the subscription's
//! dead-letter list instead of being redelivered forever.
//!
//! [`EntityType::topic`]: crate::model::EntityType::topic

mod in_memory;

use thiserror::Error;

use crate::event::SyncEvent;

pub use in_memory::{DeadLetter, InMemoryTopicBus, Subscription};

/// A message as seen by a subscriber.
#[derive(Clone, Debug, PartialEq)]
pub struct BusMessage {
    pub id: u64,
    pub topic: String,
    pub event: SyncEvent,
    /// How many times this message has been handed out, including this time.
    pub delivery_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("bus lock poisoned")]
    LockPoisoned,

    #[error("no subscription {name} on topic {topic}")]
    UnknownSubscription { topic: String, name: String },

    #[error("message {0} is not in flight")]
    NotInFlight(u64),
}

/// Transport-side view of a topic bus.
pub trait MessageBus: Send + Sync {
    /// Publish an event to every subscription of `topic`. Returns the message id.
    fn publish(&self, topic: &str, event: SyncEvent) -> Result<u64, BusError>;
}
