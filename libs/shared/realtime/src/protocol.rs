use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_models::chat::ChatMessage;
use shared_models::consultation::{ConsultationRequest, Specialty};
use shared_models::error::CoreError;
use shared_models::queue::QueueSnapshot;
use shared_models::video::RoomParticipant;

/// Inbound events on the specialty/user channel socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum SpecialtyClientEvent {
    JoinSpecialty { specialty: Specialty },
    LeaveSpecialty,
    JoinUserChannel,
    ClaimConsultation { consultation_id: Uuid, specialty: Specialty },
    FinishConsultation { consultation_id: Uuid, notes: Option<String> },
    RefreshQueue { specialty: Specialty },
}

/// Inbound events on a video room socket. Signaling payloads are opaque:
/// the relay never inspects SDP or candidate semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum VideoClientEvent {
    JoinRoom,
    LeaveRoom,
    Offer { payload: Value },
    Answer { payload: Value },
    IceCandidate { payload: Value },
    ToggleCamera { enabled: bool },
    ToggleMic { enabled: bool },
}

/// Inbound events on a chat socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ChatClientEvent {
    SendMessage { text: String },
}

/// Everything the server pushes over any channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    QueueStatus { snapshot: QueueSnapshot },
    ConsultationClaimed { consultation: ConsultationRequest },
    ConsultationStarted { consultation: ConsultationRequest, room_id: String },
    ConsultationFinished { consultation: ConsultationRequest },
    ParticipantsUpdated { room_id: String, participants: Vec<RoomParticipant> },
    Offer { from: Uuid, payload: Value },
    Answer { from: Uuid, payload: Value },
    IceCandidate { from: Uuid, payload: Value },
    ToggleCamera { from: Uuid, enabled: bool },
    ToggleMic { from: Uuid, enabled: bool },
    MessageHistory { messages: Vec<ChatMessage> },
    NewMessage { message: ChatMessage },
    ParticipantJoined { user_id: Uuid },
    ParticipantLeft { user_id: Uuid },
    Error { kind: String, message: String },
}

impl ServerEvent {
    pub fn error(err: &CoreError) -> Self {
        ServerEvent::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_kebab_case_tags() {
        let event: SpecialtyClientEvent = serde_json::from_str(
            r#"{"type":"join-specialty","data":{"specialty":"cardiology"}}"#,
        )
        .expect("parses");
        match event {
            SpecialtyClientEvent::JoinSpecialty { specialty } => {
                assert_eq!(specialty, Specialty::Cardiology)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unit_variants_need_no_data() {
        let event: VideoClientEvent =
            serde_json::from_str(r#"{"type":"join-room"}"#).expect("parses");
        assert!(matches!(event, VideoClientEvent::JoinRoom));
    }

    #[test]
    fn error_event_carries_kind() {
        let err = CoreError::Conflict("room is full".to_string());
        let json = serde_json::to_string(&ServerEvent::error(&err)).expect("serializes");
        assert!(json.contains(r#""kind":"conflict""#));
    }
}
