use axum::{routing::get, Router};

use crate::handlers::{chat_ws_handler, ChatState};

pub fn create_chat_router(state: ChatState) -> Router {
    Router::new()
        .route("/{consultation_id}", get(chat_ws_handler))
        .with_state(state)
}
