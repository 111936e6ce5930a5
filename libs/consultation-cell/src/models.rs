use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::consultation::{
    ConsultationRequest, ConsultationStatus, Priority, Specialty,
};
use shared_models::video::VideoRoom;

#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueConsultationRequest {
    pub specialty: Specialty,
    pub description: String,
    pub priority: Priority,
    /// Only honored for admins enqueuing on a patient's behalf.
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimConsultationRequest {
    /// The specialty queue the caller is claiming from.
    pub specialty: Specialty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinishConsultationRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelConsultationRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListConsultationsQuery {
    pub specialty: Option<Specialty>,
    pub status: Option<ConsultationStatus>,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartConsultationResponse {
    pub consultation: ConsultationRequest,
    pub room: VideoRoom,
}
