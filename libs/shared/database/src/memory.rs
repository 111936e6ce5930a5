use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::auth::AuthUser;
use shared_models::chat::ChatMessage;
use shared_models::consultation::{ConsultationRequest, ConsultationStatus, Specialty};
use shared_models::video::VideoRoom;

use crate::store::{
    ConsultationFilter, ConsultationPatch, ConsultationStore, StatusCondition, StoreError,
};

/// In-process store. The write lock makes every conditional update atomic,
/// which is all the claim contract needs within one process; production
/// deployments use [`crate::RestStore`] against the durable collaborator.
#[derive(Default)]
pub struct MemoryStore {
    consultations: Arc<RwLock<HashMap<Uuid, ConsultationRequest>>>,
    rooms: Arc<RwLock<HashMap<String, VideoRoom>>>,
    messages: Arc<RwLock<HashMap<Uuid, Vec<ChatMessage>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            consultations: Arc::clone(&self.consultations),
            rooms: Arc::clone(&self.rooms),
            messages: Arc::clone(&self.messages),
        }
    }
}

#[async_trait]
impl ConsultationStore for MemoryStore {
    async fn insert_consultation(
        &self,
        record: &ConsultationRequest,
    ) -> Result<ConsultationRequest, StoreError> {
        let mut consultations = self.consultations.write().await;
        consultations.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn consultation(
        &self,
        id: Uuid,
    ) -> Result<Option<ConsultationRequest>, StoreError> {
        let consultations = self.consultations.read().await;
        Ok(consultations.get(&id).cloned())
    }

    async fn list_consultations(
        &self,
        filter: &ConsultationFilter,
    ) -> Result<Vec<ConsultationRequest>, StoreError> {
        let consultations = self.consultations.read().await;
        let mut records: Vec<_> = consultations
            .values()
            .filter(|r| filter.specialty.map_or(true, |s| r.specialty == s))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.patient_id.map_or(true, |p| r.patient_id == p))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn active_for_specialty(
        &self,
        specialty: Specialty,
    ) -> Result<Vec<ConsultationRequest>, StoreError> {
        let consultations = self.consultations.read().await;
        let mut records: Vec<_> = consultations
            .values()
            .filter(|r| r.specialty == specialty && r.is_active())
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn queued_count(&self, specialty: Specialty) -> Result<u32, StoreError> {
        let consultations = self.consultations.read().await;
        Ok(consultations
            .values()
            .filter(|r| r.specialty == specialty && r.status == ConsultationStatus::Queued)
            .count() as u32)
    }

    async fn update_consultation(
        &self,
        id: Uuid,
        patch: &ConsultationPatch,
    ) -> Result<Option<ConsultationRequest>, StoreError> {
        let mut consultations = self.consultations.write().await;
        Ok(consultations.get_mut(&id).map(|record| {
            patch.apply(record);
            record.clone()
        }))
    }

    async fn update_consultation_if(
        &self,
        id: Uuid,
        condition: &StatusCondition,
        patch: &ConsultationPatch,
    ) -> Result<Option<ConsultationRequest>, StoreError> {
        // Single write lock: check and mutation are one atomic step.
        let mut consultations = self.consultations.write().await;
        match consultations.get_mut(&id) {
            Some(record) if condition.matches(record) => {
                patch.apply(record);
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_room(&self, room: &VideoRoom) -> Result<VideoRoom, StoreError> {
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.room_id.clone(), room.clone());
        Ok(room.clone())
    }

    async fn room_by_token(&self, room_id: &str) -> Result<Option<VideoRoom>, StoreError> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(room_id).cloned())
    }

    async fn room_for_consultation(
        &self,
        consultation_id: Uuid,
    ) -> Result<Option<VideoRoom>, StoreError> {
        let rooms = self.rooms.read().await;
        Ok(rooms
            .values()
            .find(|room| room.consultation_id == consultation_id)
            .cloned())
    }

    async fn update_room(&self, room: &VideoRoom) -> Result<VideoRoom, StoreError> {
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.room_id.clone(), room.clone());
        Ok(room.clone())
    }

    async fn append_message(
        &self,
        consultation_id: Uuid,
        sender: &AuthUser,
        text: &str,
    ) -> Result<ChatMessage, StoreError> {
        let mut messages = self.messages.write().await;
        let message = ChatMessage {
            id: Uuid::new_v4(),
            consultation_id,
            sender_id: sender.id,
            sender_role: sender.role,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        messages
            .entry(consultation_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn messages_for_consultation(
        &self,
        consultation_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = self.messages.read().await;
        let history = messages
            .get(&consultation_id)
            .map(|all| {
                let skip = all.len().saturating_sub(limit as usize);
                all[skip..].to_vec()
            })
            .unwrap_or_default();
        Ok(history)
    }
}
