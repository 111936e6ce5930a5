use axum::{routing::get, Router};

use crate::handlers::{video_ws_handler, VideoState};

pub fn create_video_router(state: VideoState) -> Router {
    Router::new()
        .route("/{room_id}", get(video_ws_handler))
        .with_state(state)
}
