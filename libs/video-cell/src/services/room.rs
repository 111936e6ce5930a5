use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::ConsultationStore;
use shared_models::auth::AuthUser;
use shared_models::consultation::ConsultationRequest;
use shared_models::error::CoreError;
use shared_models::video::{RoomParticipant, VideoRoom, ROOM_CAPACITY};
use shared_realtime::{Broadcaster, ServerEvent};

const ROOM_TOKEN_LENGTH: usize = 32;

/// Lifecycle of the two-party rooms. One room per consultation, created
/// lazily when the bound professional starts it; rooms persist until their
/// expiry, which is only ever checked at access time.
pub struct VideoRoomService {
    store: Arc<dyn ConsultationStore>,
    broadcaster: Broadcaster,
    room_ttl: Duration,
    // Serializes join/leave per room within this process; the store row
    // stays authoritative across processes.
    room_locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl VideoRoomService {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        broadcaster: Broadcaster,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            room_ttl: Duration::hours(config.room_ttl_hours),
            room_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates the room for a consultation, or returns the existing one.
    pub async fn create_for_consultation(
        &self,
        consultation: &ConsultationRequest,
    ) -> Result<VideoRoom, CoreError> {
        if let Some(existing) = self
            .store
            .room_for_consultation(consultation.id)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let room = VideoRoom {
            id: Uuid::new_v4(),
            consultation_id: consultation.id,
            room_id: mint_room_token(),
            expires_at: now + self.room_ttl,
            is_active: true,
            participants: Vec::new(),
            created_at: now,
        };

        let room = self.store.insert_room(&room).await?;
        info!(
            "created room {} for consultation {}",
            room.room_id, consultation.id
        );
        Ok(room)
    }

    pub async fn join(
        &self,
        room_token: &str,
        user: &AuthUser,
        connection_id: Uuid,
    ) -> Result<VideoRoom, CoreError> {
        let lock = self.lock_for(room_token).await;
        let _guard = lock.lock().await;

        let mut room = self
            .store
            .room_by_token(room_token)
            .await?
            .ok_or_else(|| CoreError::NotFound("room not found".to_string()))?;

        let now = Utc::now();
        if room.is_expired(now) {
            self.deactivate(&mut room).await?;
            return Err(CoreError::Expired("room is past its expiry".to_string()));
        }
        if !room.is_active {
            return Err(CoreError::Expired("room is closed".to_string()));
        }

        let consultation = self
            .store
            .consultation(room.consultation_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("consultation not found".to_string()))?;
        authorize_room_access(user, &consultation)?;

        if let Some(participant) = room
            .participants
            .iter_mut()
            .find(|p| p.user_id == user.id)
        {
            // Rejoin replaces the stored connection instead of taking a slot.
            participant.connection_id = connection_id;
            if participant.left_at.take().is_some() {
                participant.joined_at = now;
            }
        } else {
            if room.active_count() >= ROOM_CAPACITY {
                return Err(CoreError::Conflict("room is full".to_string()));
            }
            room.participants.push(RoomParticipant {
                user_id: user.id,
                connection_id,
                joined_at: now,
                left_at: None,
            });
        }

        let room = self.store.update_room(&room).await?;
        self.broadcaster
            .publish_room(
                room_token,
                Some(connection_id),
                &ServerEvent::ParticipantsUpdated {
                    room_id: room_token.to_string(),
                    participants: room.participants.clone(),
                },
            )
            .await;

        info!("user {} joined room {}", user.id, room_token);
        Ok(room)
    }

    /// Stamps the participant's departure. Runs the same lazy expiry check
    /// as join; the bookkeeping still happens for an expired room so that a
    /// disconnect always settles participant state.
    pub async fn leave(&self, room_token: &str, user_id: Uuid) -> Result<VideoRoom, CoreError> {
        let lock = self.lock_for(room_token).await;
        let _guard = lock.lock().await;

        let mut room = self
            .store
            .room_by_token(room_token)
            .await?
            .ok_or_else(|| CoreError::NotFound("room not found".to_string()))?;

        let now = Utc::now();
        let expired = room.is_expired(now);

        if let Some(participant) = room
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id && p.left_at.is_none())
        {
            participant.left_at = Some(now);
        }
        if expired {
            room.is_active = false;
        }

        let room = self.store.update_room(&room).await?;
        self.broadcaster
            .publish_room(
                room_token,
                None,
                &ServerEvent::ParticipantsUpdated {
                    room_id: room_token.to_string(),
                    participants: room.participants.clone(),
                },
            )
            .await;

        if expired {
            return Err(CoreError::Expired("room is past its expiry".to_string()));
        }

        info!("user {} left room {}", user_id, room_token);
        Ok(room)
    }

    async fn deactivate(&self, room: &mut VideoRoom) -> Result<(), CoreError> {
        if room.is_active {
            room.is_active = false;
            self.store.update_room(room).await?;
        }
        Ok(())
    }

    async fn lock_for(&self, room_token: &str) -> Arc<Mutex<()>> {
        let mut locks = self.room_locks.write().await;
        Arc::clone(
            locks
                .entry(room_token.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

/// Room access: the owning patient, the bound professional, or an admin.
fn authorize_room_access(
    user: &AuthUser,
    consultation: &ConsultationRequest,
) -> Result<(), CoreError> {
    let allowed = consultation.patient_id == user.id
        || consultation.professional_id == Some(user.id)
        || user.is_admin();

    if allowed {
        Ok(())
    } else {
        Err(CoreError::Forbidden(
            "not a participant of this consultation".to_string(),
        ))
    }
}

fn mint_room_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
