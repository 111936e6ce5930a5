use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use shared_models::auth::AuthUser;
use shared_models::chat::ChatMessage;
use shared_models::consultation::{
    ConsultationRequest, ConsultationStatus, Specialty,
};
use shared_models::error::CoreError;
use shared_models::video::VideoRoom;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store timeout after {0:?}")]
    Timeout(Duration),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("malformed store payload: {0}")]
    Payload(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Transient(err.to_string())
    }
}

/// Partial update applied to a consultation record. `None` fields are left
/// untouched; the double-`Option` fields can be cleared by `Some(None)`,
/// which serializes as an explicit null in the store dialect.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsultationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConsultationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professional_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Option<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_minutes: Option<Option<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl ConsultationPatch {
    pub fn claim(professional_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(ConsultationStatus::InProgress),
            professional_id: Some(professional_id),
            position: Some(None),
            estimated_wait_minutes: Some(None),
            started_at: Some(now),
            ..Default::default()
        }
    }

    pub fn finish(now: DateTime<Utc>, notes: Option<String>) -> Self {
        Self {
            status: Some(ConsultationStatus::Finished),
            finished_at: Some(now),
            notes,
            ..Default::default()
        }
    }

    pub fn cancel(reason: String) -> Self {
        Self {
            status: Some(ConsultationStatus::Cancelled),
            position: Some(None),
            estimated_wait_minutes: Some(None),
            cancel_reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn room(room_id: String) -> Self {
        Self {
            room_id: Some(room_id),
            ..Default::default()
        }
    }

    pub fn ranking(position: u32, estimated_wait_minutes: u32) -> Self {
        Self {
            position: Some(Some(position)),
            estimated_wait_minutes: Some(Some(estimated_wait_minutes)),
            ..Default::default()
        }
    }

    pub fn apply(&self, record: &mut ConsultationRequest) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(professional_id) = self.professional_id {
            record.professional_id = Some(professional_id);
        }
        if let Some(position) = self.position {
            record.position = position;
        }
        if let Some(wait) = self.estimated_wait_minutes {
            record.estimated_wait_minutes = wait;
        }
        if let Some(started_at) = self.started_at {
            record.started_at = Some(started_at);
        }
        if let Some(finished_at) = self.finished_at {
            record.finished_at = Some(finished_at);
        }
        if let Some(room_id) = &self.room_id {
            record.room_id = Some(room_id.clone());
        }
        if let Some(notes) = &self.notes {
            record.notes = Some(notes.clone());
        }
        if let Some(reason) = &self.cancel_reason {
            record.cancel_reason = Some(reason.clone());
        }
    }
}

/// Precondition for a conditional update. All present fields must match the
/// current record for the update to take effect.
#[derive(Debug, Clone)]
pub struct StatusCondition {
    pub status: ConsultationStatus,
    pub professional_id: Option<Uuid>,
    pub specialty: Option<Specialty>,
}

impl StatusCondition {
    pub fn status(status: ConsultationStatus) -> Self {
        Self {
            status,
            professional_id: None,
            specialty: None,
        }
    }

    pub fn with_professional(mut self, professional_id: Uuid) -> Self {
        self.professional_id = Some(professional_id);
        self
    }

    pub fn with_specialty(mut self, specialty: Specialty) -> Self {
        self.specialty = Some(specialty);
        self
    }

    pub fn matches(&self, record: &ConsultationRequest) -> bool {
        record.status == self.status
            && self
                .professional_id
                .map_or(true, |id| record.professional_id == Some(id))
            && self.specialty.map_or(true, |s| record.specialty == s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsultationFilter {
    pub specialty: Option<Specialty>,
    pub status: Option<ConsultationStatus>,
    pub patient_id: Option<Uuid>,
}

/// Durable record access consumed by the engine. The conditional update is
/// the single arbiter of the claim race: implementations must guarantee that
/// concurrent calls with the same precondition succeed at most once.
#[async_trait]
pub trait ConsultationStore: Send + Sync {
    async fn insert_consultation(
        &self,
        record: &ConsultationRequest,
    ) -> Result<ConsultationRequest, StoreError>;

    async fn consultation(&self, id: Uuid)
        -> Result<Option<ConsultationRequest>, StoreError>;

    async fn list_consultations(
        &self,
        filter: &ConsultationFilter,
    ) -> Result<Vec<ConsultationRequest>, StoreError>;

    /// All records with status in {queued, in_progress} for one specialty.
    async fn active_for_specialty(
        &self,
        specialty: Specialty,
    ) -> Result<Vec<ConsultationRequest>, StoreError>;

    async fn queued_count(&self, specialty: Specialty) -> Result<u32, StoreError>;

    /// Unconditional partial update; returns the refreshed record.
    async fn update_consultation(
        &self,
        id: Uuid,
        patch: &ConsultationPatch,
    ) -> Result<Option<ConsultationRequest>, StoreError>;

    /// Atomic conditional update. Applies `patch` iff `condition` holds for
    /// the current row; returns the updated record when exactly one row was
    /// affected and `None` otherwise. No error is raised for a lost race --
    /// the caller decides what zero affected rows means.
    async fn update_consultation_if(
        &self,
        id: Uuid,
        condition: &StatusCondition,
        patch: &ConsultationPatch,
    ) -> Result<Option<ConsultationRequest>, StoreError>;

    async fn insert_room(&self, room: &VideoRoom) -> Result<VideoRoom, StoreError>;

    async fn room_by_token(&self, room_id: &str) -> Result<Option<VideoRoom>, StoreError>;

    async fn room_for_consultation(
        &self,
        consultation_id: Uuid,
    ) -> Result<Option<VideoRoom>, StoreError>;

    async fn update_room(&self, room: &VideoRoom) -> Result<VideoRoom, StoreError>;

    /// Persists a message, assigning its durable id and timestamp.
    async fn append_message(
        &self,
        consultation_id: Uuid,
        sender: &AuthUser,
        text: &str,
    ) -> Result<ChatMessage, StoreError>;

    /// The most recent `limit` messages in ascending persisted order.
    async fn messages_for_consultation(
        &self,
        consultation_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}
