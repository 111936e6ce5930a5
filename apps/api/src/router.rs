use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::warn;

use chat_cell::{create_chat_router, ChatService, ChatState};
use consultation_cell::{create_consultation_router, AssignmentService};
use consultation_cell::handlers::ConsultationState;
use realtime_cell::{create_realtime_router, RealtimeState};
use shared_config::AppConfig;
use shared_database::{ConsultationStore, MemoryStore, RestStore};
use shared_realtime::{Broadcaster, ConnectionRegistry};
use video_cell::{create_video_router, SignalingRelay, VideoRoomService, VideoState};

pub fn create_router(config: Arc<AppConfig>) -> Router {
    let store = build_store(&config);
    let broadcaster = Broadcaster::new();
    let registry = ConnectionRegistry::new(config.max_connections);

    let rooms = Arc::new(VideoRoomService::new(
        store.clone(),
        broadcaster.clone(),
        &config,
    ));
    let assignment = Arc::new(AssignmentService::new(
        store.clone(),
        broadcaster.clone(),
        registry.clone(),
        rooms.clone(),
        config.clone(),
    ));
    let chat = Arc::new(ChatService::new(store.clone(), broadcaster.clone(), &config));

    let consultation_state = ConsultationState {
        service: assignment.clone(),
        config: config.clone(),
    };
    let realtime_state = RealtimeState {
        config: config.clone(),
        service: assignment,
        broadcaster: broadcaster.clone(),
        registry: registry.clone(),
    };
    let video_state = VideoState {
        config: config.clone(),
        rooms,
        relay: SignalingRelay::new(broadcaster.clone()),
        registry: registry.clone(),
        broadcaster: broadcaster.clone(),
    };
    let chat_state = ChatState {
        config: config.clone(),
        chat,
        registry,
    };

    Router::new()
        .route("/", get(|| async { "Consultation queue API is running!" }))
        .nest("/consultations", create_consultation_router(consultation_state))
        .nest("/ws/queue", create_realtime_router(realtime_state))
        .nest("/ws/video", create_video_router(video_state))
        .nest("/ws/chat", create_chat_router(chat_state))
}

fn build_store(config: &AppConfig) -> Arc<dyn ConsultationStore> {
    if config.is_store_configured() {
        match RestStore::new(config) {
            Ok(store) => return Arc::new(store),
            Err(e) => warn!("falling back to in-memory store: {}", e),
        }
    } else {
        warn!("store not configured, using in-memory store");
    }
    Arc::new(MemoryStore::new())
}
