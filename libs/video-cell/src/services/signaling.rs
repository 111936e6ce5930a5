use tracing::debug;
use uuid::Uuid;

use shared_realtime::{Broadcaster, ServerEvent, VideoClientEvent};

/// Stateless per-message forwarding between the two connections of a room.
/// Payloads pass through untouched; delivery is at-most-once and unbuffered,
/// and offer/answer ordering is the peers' own concern.
#[derive(Clone)]
pub struct SignalingRelay {
    broadcaster: Broadcaster,
}

impl SignalingRelay {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }

    /// Mirrors a negotiation or media-state event to the other room member.
    /// Returns false when the event is not a relayable one.
    pub async fn forward(
        &self,
        room_token: &str,
        origin_connection: Uuid,
        from: Uuid,
        event: VideoClientEvent,
    ) -> bool {
        let mirrored = match event {
            VideoClientEvent::Offer { payload } => ServerEvent::Offer { from, payload },
            VideoClientEvent::Answer { payload } => ServerEvent::Answer { from, payload },
            VideoClientEvent::IceCandidate { payload } => {
                ServerEvent::IceCandidate { from, payload }
            }
            VideoClientEvent::ToggleCamera { enabled } => {
                ServerEvent::ToggleCamera { from, enabled }
            }
            VideoClientEvent::ToggleMic { enabled } => {
                ServerEvent::ToggleMic { from, enabled }
            }
            VideoClientEvent::JoinRoom | VideoClientEvent::LeaveRoom => {
                debug!("membership events are not relayed");
                return false;
            }
        };

        self.broadcaster
            .publish_room(room_token, Some(origin_connection), &mirrored)
            .await;
        true
    }
}
