use axum::{routing::get, Router};

use crate::handlers::{realtime_ws_handler, RealtimeState};

pub fn create_realtime_router(state: RealtimeState) -> Router {
    Router::new()
        .route("/", get(realtime_ws_handler))
        .with_state(state)
}
