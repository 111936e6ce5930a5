use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;

/// Append-only, totally ordered by `created_at` within a consultation.
/// The id and timestamp are assigned by the store at persist time; the live
/// echo always carries the durable values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub consultation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
