use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Two-party session bound one-to-one to a consultation. Never deleted,
/// only expired; expiry is checked lazily at access time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRoom {
    pub id: Uuid,
    pub consultation_id: Uuid,
    /// Opaque join token. Carries no embedded metadata.
    pub room_id: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub participants: Vec<RoomParticipant>,
    pub created_at: DateTime<Utc>,
}

pub const ROOM_CAPACITY: usize = 2;

impl VideoRoom {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn active_participants(&self) -> impl Iterator<Item = &RoomParticipant> {
        self.participants.iter().filter(|p| p.left_at.is_none())
    }

    pub fn active_count(&self) -> usize {
        self.active_participants().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomParticipant {
    pub user_id: Uuid,
    pub connection_id: Uuid,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
}
