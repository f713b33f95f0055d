pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod model;
pub mod outbox;
pub mod publish;
pub mod replica;
pub mod source;
pub mod subscribe;
pub mod writer;

#[cfg(feature = "bus")]
pub mod bus;

pub use config::{ConfigError, DispatcherConfig, SyncConfig, TransportConfig};
pub use dispatch::{CycleReport, Dispatcher, DispatcherHandle, DispatcherStats};
pub use error::StoreError;
pub use event::{EventError, EventKind, SyncEnvelope, SyncEvent};
pub use model::{EntityType, House, HouseInput, Room, RoomInput};
pub use outbox::{EventFactory, OutboxEntry, OutboxRecord, StagedEvent};
pub use publish::{PublishError, Publisher, RecordingPublisher};
pub use replica::{HouseReplica, InMemoryReplicaStore, Reading, ReplicaStore, RoomReplica};
pub use source::{InMemorySourceStore, SourceStore, Transaction};
pub use subscribe::{ApplyError, ApplyOutcome, ReplicaApplier};
pub use writer::{Committed, DomainError, HouseService, TransactionalWriter, WriteError};

#[cfg(feature = "bus")]
pub use bus::{InMemoryTopicBus, MessageBus};
#[cfg(feature = "bus")]
pub use publish::TopicPublisher;
#[cfg(feature = "bus")]
pub use subscribe::BusConsumer;

#[cfg(feature = "http")]
pub use publish::HttpPublisher;
