//! In-memory topic bus for tests and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use super::{BusError, BusMessage, MessageBus};
use crate::event::SyncEvent;

/// A message that exhausted its deliveries, with the last rejection reason.
#[derive(Clone, Debug, PartialEq)]
pub struct DeadLetter {
    pub message: BusMessage,
    pub reason: String,
}

#[derive(Default)]
struct Queue {
    ready: VecDeque<BusMessage>,
    in_flight: HashMap<u64, BusMessage>,
    dead_letters: Vec<DeadLetter>,
}

#[derive(Default)]
struct Topics {
    /// topic -> subscription name -> queue
    queues: HashMap<String, HashMap<String, Queue>>,
    next_id: u64,
}

/// In-memory topic bus.
///
/// Thread-safe and `Clone`; clones share the same topics. Publishing to a
/// topic without subscriptions succeeds and the message is dropped, as a
/// broker topic would.
///
/// ```
/// use chrono::Utc;
/// use house_sync::bus::{InMemoryTopicBus, MessageBus};
/// use house_sync::event::{HouseRemoved, SyncEvent};
///
/// let bus = InMemoryTopicBus::new();
/// let sub = bus.subscribe("houses", "temperature");
///
/// let event = SyncEvent::HouseDeleted(HouseRemoved { house_id: 1, occurred_at: Utc::now() });
/// bus.publish("houses", event).unwrap();
///
/// let message = sub.poll().unwrap().unwrap();
/// assert_eq!(message.delivery_count, 1);
/// sub.ack(message.id).unwrap();
/// ```
#[derive(Clone)]
pub struct InMemoryTopicBus {
    topics: Arc<Mutex<Topics>>,
    max_delivery_count: u32,
}

impl Default for InMemoryTopicBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTopicBus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(Mutex::new(Topics {
                queues: HashMap::new(),
                next_id: 1,
            })),
            max_delivery_count: 10,
        }
    }

    /// Deliveries after which a rejected message is parked as a dead letter.
    pub fn with_max_delivery_count(mut self, count: u32) -> Self {
        self.max_delivery_count = count.max(1);
        self
    }

    /// Create (or reattach to) a durable subscription.
    pub fn subscribe(&self, topic: &str, name: &str) -> Subscription {
        if let Ok(mut topics) = self.topics.lock() {
            topics
                .queues
                .entry(topic.to_string())
                .or_default()
                .entry(name.to_string())
                .or_default();
        }
        Subscription {
            bus: self.clone(),
            topic: topic.to_string(),
            name: name.to_string(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Topics>, BusError> {
        self.topics.lock().map_err(|_| BusError::LockPoisoned)
    }

    fn with_queue<T>(
        &self,
        topic: &str,
        name: &str,
        f: impl FnOnce(&mut Queue, u32) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let mut topics = self.lock()?;
        let queue = topics
            .queues
            .get_mut(topic)
            .and_then(|subs| subs.get_mut(name))
            .ok_or_else(|| BusError::UnknownSubscription {
                topic: topic.to_string(),
                name: name.to_string(),
            })?;
        f(queue, self.max_delivery_count)
    }
}

impl MessageBus for InMemoryTopicBus {
    fn publish(&self, topic: &str, event: SyncEvent) -> Result<u64, BusError> {
        let mut topics = self.lock()?;
        let id = topics.next_id;
        topics.next_id += 1;

        match topics.queues.get_mut(topic) {
            Some(subscriptions) => {
                for queue in subscriptions.values_mut() {
                    queue.ready.push_back(BusMessage {
                        id,
                        topic: topic.to_string(),
                        event: event.clone(),
                        delivery_count: 0,
                    });
                }
            }
            None => debug!(topic, message_id = id, "no subscriptions, message dropped"),
        }

        Ok(id)
    }
}

/// Handle on one durable subscription.
#[derive(Clone)]
pub struct Subscription {
    bus: InMemoryTopicBus,
    topic: String,
    name: String,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the next ready message, without taking it.
    pub fn peek_id(&self) -> Result<Option<u64>, BusError> {
        self.bus.with_queue(&self.topic, &self.name, |queue, _| {
            Ok(queue.ready.front().map(|message| message.id))
        })
    }

    /// Take the next ready message, if any. It stays in flight until acked or nacked.
    pub fn poll(&self) -> Result<Option<BusMessage>, BusError> {
        self.bus.with_queue(&self.topic, &self.name, |queue, _| {
            Ok(queue.ready.pop_front().map(|mut message| {
                message.delivery_count += 1;
                queue.in_flight.insert(message.id, message.clone());
                message
            }))
        })
    }

    /// Acknowledge a processed message.
    pub fn ack(&self, id: u64) -> Result<(), BusError> {
        self.bus.with_queue(&self.topic, &self.name, |queue, _| {
            queue
                .in_flight
                .remove(&id)
                .map(|_| ())
                .ok_or(BusError::NotInFlight(id))
        })
    }

    /// Reject a message; it is redelivered ahead of later messages, or parked
    /// once out of deliveries.
    pub fn nack(&self, id: u64, reason: &str) -> Result<(), BusError> {
        let (topic, name) = (&self.topic, &self.name);
        self.bus.with_queue(topic, name, |queue, max_delivery_count| {
            let message = queue
                .in_flight
                .remove(&id)
                .ok_or(BusError::NotInFlight(id))?;

            if message.delivery_count >= max_delivery_count {
                warn!(
                    topic = %topic,
                    subscription = %name,
                    message_id = id,
                    deliveries = message.delivery_count,
                    reason,
                    "message dead-lettered"
                );
                queue.dead_letters.push(DeadLetter {
                    message,
                    reason: reason.to_string(),
                });
            } else {
                // Ready queues stay in publish order.
                let at = queue.ready.partition_point(|m| m.id < message.id);
                queue.ready.insert(at, message);
            }
            Ok(())
        })
    }

    /// Messages waiting to be polled.
    pub fn ready_count(&self) -> Result<usize, BusError> {
        self.bus
            .with_queue(&self.topic, &self.name, |queue, _| Ok(queue.ready.len()))
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, BusError> {
        self.bus.with_queue(&self.topic, &self.name, |queue, _| {
            Ok(queue.dead_letters.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::event::{HouseRemoved, RoomRemoved};

    fn house_deleted(id: i64) -> SyncEvent {
        SyncEvent::HouseDeleted(HouseRemoved {
            house_id: id,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn fan_out_to_every_subscription() {
        let bus = InMemoryTopicBus::new();
        let temperature = bus.subscribe("houses", "temperature");
        let audit = bus.subscribe("houses", "audit");
        let event = house_deleted(1);

        bus.publish("houses", event.clone()).unwrap();

        assert_eq!(temperature.poll().unwrap().unwrap().event, event);
        assert_eq!(audit.poll().unwrap().unwrap().event, event);
        assert!(temperature.poll().unwrap().is_none());
        assert_eq!(audit.ready_count().unwrap(), 0);
    }

    #[test]
    fn publish_without_subscriptions_is_dropped() {
        let bus = InMemoryTopicBus::new();
        bus.publish("houses", house_deleted(1)).unwrap();

        let late = bus.subscribe("houses", "late");
        assert!(late.poll().unwrap().is_none());
    }

    #[test]
    fn topics_are_isolated() {
        let bus = InMemoryTopicBus::new();
        let rooms = bus.subscribe("rooms", "temperature");

        bus.publish("houses", house_deleted(1)).unwrap();
        bus.publish(
            "rooms",
            SyncEvent::RoomDeleted(RoomRemoved {
                room_id: 2,
                house_id: 1,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let message = rooms.poll().unwrap().unwrap();
        assert_eq!(message.topic, "rooms");
        assert_eq!(message.event.entity_id(), 2);
        assert!(rooms.poll().unwrap().is_none());
    }

    #[test]
    fn nack_redelivers_then_dead_letters() {
        let bus = InMemoryTopicBus::new().with_max_delivery_count(2);
        let sub = bus.subscribe("houses", "temperature");
        bus.publish("houses", house_deleted(1)).unwrap();

        let first = sub.poll().unwrap().unwrap();
        sub.nack(first.id, "store down").unwrap();

        let second = sub.poll().unwrap().unwrap();
        assert_eq!(second.delivery_count, 2);
        sub.nack(second.id, "store still down").unwrap();

        assert!(sub.poll().unwrap().is_none());
        let dead = sub.dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "store still down");
    }

    #[test]
    fn nacked_message_keeps_its_place() {
        let bus = InMemoryTopicBus::new();
        let sub = bus.subscribe("houses", "temperature");
        let first_id = bus.publish("houses", house_deleted(1)).unwrap();
        bus.publish("houses", house_deleted(2)).unwrap();

        let first = sub.poll().unwrap().unwrap();
        sub.nack(first.id, "store down").unwrap();

        assert_eq!(sub.peek_id().unwrap(), Some(first_id));
        assert_eq!(sub.poll().unwrap().unwrap().event.entity_id(), 1);
    }

    #[test]
    fn ack_requires_in_flight_message() {
        let bus = InMemoryTopicBus::new();
        let sub = bus.subscribe("houses", "temperature");
        assert_eq!(sub.ack(5).unwrap_err(), BusError::NotInFlight(5));
    }
}
