use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed set of service categories partitioning the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    GeneralPractice,
    Pediatrics,
    Cardiology,
    Dermatology,
    Psychology,
}

impl Specialty {
    pub const ALL: [Specialty; 5] = [
        Specialty::GeneralPractice,
        Specialty::Pediatrics,
        Specialty::Cardiology,
        Specialty::Dermatology,
        Specialty::Psychology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::GeneralPractice => "general_practice",
            Specialty::Pediatrics => "pediatrics",
            Specialty::Cardiology => "cardiology",
            Specialty::Dermatology => "dermatology",
            Specialty::Psychology => "psychology",
        }
    }
}

/// Variant order matters: the derived `Ord` ranks `Urgent` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Queued,
    InProgress,
    Finished,
    Cancelled,
}

impl ConsultationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsultationStatus::Finished | ConsultationStatus::Cancelled)
    }

    pub fn can_transition_to(&self, target: ConsultationStatus) -> bool {
        use ConsultationStatus::*;
        match (self, target) {
            (Queued, InProgress) => true,
            (InProgress, Finished) => true,
            (Queued, Cancelled) | (InProgress, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::Queued => "queued",
            ConsultationStatus::InProgress => "in_progress",
            ConsultationStatus::Finished => "finished",
            ConsultationStatus::Cancelled => "cancelled",
        }
    }
}

/// A patient's request for a consultation, from enqueue to terminal state.
///
/// `position` and `estimated_wait_minutes` are meaningful only while
/// `status == Queued`; `professional_id` is set exactly when a professional
/// has claimed the record. `created_at` is immutable and breaks FIFO ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationRequest {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub specialty: Specialty,
    pub description: String,
    pub priority: Priority,
    pub status: ConsultationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professional_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
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

impl ConsultationRequest {
    pub fn new(
        patient_id: Uuid,
        specialty: Specialty,
        description: String,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            specialty,
            description,
            priority,
            status: ConsultationStatus::Queued,
            position: None,
            estimated_wait_minutes: None,
            professional_id: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            room_id: None,
            notes: None,
            cancel_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            ConsultationStatus::Queued | ConsultationStatus::InProgress
        )
    }
}
