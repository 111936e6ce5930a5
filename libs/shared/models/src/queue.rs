use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consultation::{ConsultationStatus, Priority, Specialty};

/// One row of the ordered specialty queue as broadcast to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub consultation_id: Uuid,
    pub patient_id: Uuid,
    pub priority: Priority,
    pub status: ConsultationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of one specialty queue, recomputed after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub specialty: Specialty,
    pub queue_length: u32,
    pub in_progress_count: u32,
    pub online_professionals: u32,
    pub entries: Vec<QueueEntry>,
    pub generated_at: DateTime<Utc>,
}
