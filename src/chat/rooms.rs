//! Per-street broadcast rooms

use bson::oid::ObjectId;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::ChatMessageView;

/// Messages buffered per room for slow subscribers
const ROOM_CAPACITY: usize = 256;

/// Broadcast channels keyed by street group, created on first subscriber
#[derive(Default)]
pub struct StreetRooms {
    rooms: DashMap<ObjectId, broadcast::Sender<ChatMessageView>>,
}

impl StreetRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a street's room
    pub fn subscribe(&self, street_group_id: ObjectId) -> broadcast::Receiver<ChatMessageView> {
        self.rooms
            .entry(street_group_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Send a message to everyone in the room. Returns how many sessions got it.
    pub fn publish(&self, message: &ChatMessageView, street_group_id: ObjectId) -> usize {
        let delivered = match self.rooms.get(&street_group_id) {
            Some(tx) => tx.send(message.clone()).unwrap_or(0),
            None => 0,
        };
        debug!("Chat message {} delivered to {} session(s)", message.id, delivered);
        delivered
    }

    /// Drop rooms nobody is listening to
    pub fn prune(&self) {
        self.rooms.retain(|_, tx| tx.receiver_count() > 0);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
