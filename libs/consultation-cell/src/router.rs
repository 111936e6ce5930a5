use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    cancel_consultation, claim_consultation, enqueue_consultation, finish_consultation,
    get_consultation, get_queue_snapshot, list_consultations, start_consultation,
    ConsultationState,
};

pub fn create_consultation_router(state: ConsultationState) -> Router {
    let protected_routes = Router::new()
        .route("/", post(enqueue_consultation).get(list_consultations))
        .route("/queue/{specialty}", get(get_queue_snapshot))
        .route("/{consultation_id}", get(get_consultation))
        .route("/{consultation_id}/claim", post(claim_consultation))
        .route("/{consultation_id}/start", post(start_consultation))
        .route("/{consultation_id}/finish", post(finish_consultation))
        .route("/{consultation_id}/cancel", post(cancel_consultation))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    protected_routes.with_state(state)
}
