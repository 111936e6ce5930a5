use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

use shared_models::consultation::Specialty;

use crate::protocol::ServerEvent;

const SPECIALTY_CHANNEL_CAPACITY: usize = 256;
const PRIVATE_CHANNEL_CAPACITY: usize = 64;

/// A serialized event travelling through a channel. `origin` is the sending
/// connection for relayed room traffic, letting the fan-out side skip the
/// sender; broadcasts carry no origin and reach everyone.
#[derive(Debug, Clone)]
pub struct Published {
    pub origin: Option<Uuid>,
    pub payload: String,
}

/// Fan-out hub for the three channel kinds: per-specialty topics (fixed
/// set, created eagerly), per-user channels and per-room channels (created
/// on demand, dropped once the last subscriber is gone). Delivery is
/// at-most-once; a send with no subscribers is simply dropped.
pub struct Broadcaster {
    specialties: HashMap<Specialty, broadcast::Sender<Published>>,
    users: Arc<RwLock<HashMap<Uuid, broadcast::Sender<Published>>>>,
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<Published>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let specialties = Specialty::ALL
            .iter()
            .map(|&s| (s, broadcast::channel(SPECIALTY_CHANNEL_CAPACITY).0))
            .collect();

        Self {
            specialties,
            users: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn subscribe_specialty(&self, specialty: Specialty) -> broadcast::Receiver<Published> {
        self.specialties
            .get(&specialty)
            .expect("all specialties have a channel")
            .subscribe()
    }

    pub async fn subscribe_user(&self, user_id: Uuid) -> broadcast::Receiver<Published> {
        let mut users = self.users.write().await;
        users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(PRIVATE_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub async fn subscribe_room(&self, room_id: &str) -> broadcast::Receiver<Published> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(PRIVATE_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn publish_specialty(&self, specialty: Specialty, event: &ServerEvent) {
        let Some(payload) = serialize(event) else { return };
        let sender = self
            .specialties
            .get(&specialty)
            .expect("all specialties have a channel");
        if sender
            .send(Published {
                origin: None,
                payload,
            })
            .is_err()
        {
            debug!("no subscribers on specialty topic {:?}", specialty);
        }
    }

    pub async fn publish_user(&self, user_id: Uuid, event: &ServerEvent) {
        let Some(payload) = serialize(event) else { return };
        let mut users = self.users.write().await;
        if let Some(sender) = users.get(&user_id) {
            if sender
                .send(Published {
                    origin: None,
                    payload,
                })
                .is_err()
            {
                // Last receiver is gone; the channel is dead weight.
                users.remove(&user_id);
                debug!("dropped idle user channel {}", user_id);
            }
        } else {
            debug!("no channel for user {}", user_id);
        }
    }

    pub async fn publish_room(
        &self,
        room_id: &str,
        origin: Option<Uuid>,
        event: &ServerEvent,
    ) {
        let Some(payload) = serialize(event) else { return };
        let mut rooms = self.rooms.write().await;
        if let Some(sender) = rooms.get(room_id) {
            if sender.send(Published { origin, payload }).is_err() {
                rooms.remove(room_id);
                debug!("dropped idle room channel {}", room_id);
            }
        } else {
            debug!("no channel for room {}", room_id);
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Broadcaster {
    fn clone(&self) -> Self {
        Self {
            specialties: self.specialties.clone(),
            users: Arc::clone(&self.users),
            rooms: Arc::clone(&self.rooms),
        }
    }
}

fn serialize(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(payload) => Some(payload),
        Err(e) => {
            error!("failed to serialize server event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::error::CoreError;

    #[tokio::test]
    async fn specialty_topic_reaches_subscriber() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe_specialty(Specialty::Pediatrics);

        let event = ServerEvent::error(&CoreError::NotFound("x".into()));
        broadcaster.publish_specialty(Specialty::Pediatrics, &event);

        let published = rx.recv().await.expect("event delivered");
        assert!(published.origin.is_none());
        assert!(published.payload.contains("not_found"));
    }

    #[tokio::test]
    async fn user_channel_is_targeted() {
        let broadcaster = Broadcaster::new();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let mut rx_a = broadcaster.subscribe_user(user_a).await;
        let mut rx_b = broadcaster.subscribe_user(user_b).await;

        let event = ServerEvent::error(&CoreError::Expired("room".into()));
        broadcaster.publish_user(user_a, &event).await;

        assert!(rx_a.recv().await.is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_publish_carries_origin() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe_room("room-1").await;
        let origin = Uuid::new_v4();

        let event = ServerEvent::ToggleMic {
            from: Uuid::new_v4(),
            enabled: false,
        };
        broadcaster.publish_room("room-1", Some(origin), &event).await;

        let published = rx.recv().await.expect("event delivered");
        assert_eq!(published.origin, Some(origin));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let broadcaster = Broadcaster::new();
        let event = ServerEvent::error(&CoreError::NotFound("x".into()));
        // Unbuffered by design: nothing to assert beyond "does not panic".
        broadcaster.publish_user(Uuid::new_v4(), &event).await;
        broadcaster.publish_room("ghost", None, &event).await;
    }
}
