use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::ConsultationFilter;
use shared_models::auth::AuthUser;
use shared_models::consultation::Specialty;
use shared_models::error::CoreError;

use crate::models::{
    CancelConsultationRequest, ClaimConsultationRequest, EnqueueConsultationRequest,
    FinishConsultationRequest, ListConsultationsQuery,
};
use crate::services::assignment::AssignmentService;

#[derive(Clone)]
pub struct ConsultationState {
    pub service: Arc<AssignmentService>,
    pub config: Arc<AppConfig>,
}

/// Enqueue a consultation request into its specialty queue
pub async fn enqueue_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<EnqueueConsultationRequest>,
) -> Result<Json<Value>, CoreError> {
    info!("enqueue request from user: {}", user.id);

    let consultation = state.service.enqueue(&user, request).await?;

    Ok(Json(json!({
        "success": true,
        "consultation": consultation,
    })))
}

/// List consultations visible to the caller
pub async fn list_consultations(
    State(state): State<ConsultationState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListConsultationsQuery>,
) -> Result<Json<Value>, CoreError> {
    let filter = ConsultationFilter {
        specialty: query.specialty,
        status: query.status,
        patient_id: query.patient_id,
    };
    let consultations = state.service.list(&user, filter).await?;

    Ok(Json(json!({
        "count": consultations.len(),
        "consultations": consultations,
    })))
}

/// Get a single consultation by id
pub async fn get_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<AuthUser>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, CoreError> {
    let consultation = state.service.get(&user, consultation_id).await?;
    Ok(Json(json!({ "consultation": consultation })))
}

/// Race to take ownership of a queued consultation
pub async fn claim_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<AuthUser>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<ClaimConsultationRequest>,
) -> Result<Json<Value>, CoreError> {
    info!(
        "claim request for consultation {} from user {}",
        consultation_id, user.id
    );

    let consultation = state
        .service
        .claim(&user, consultation_id, request.specialty)
        .await?;

    Ok(Json(json!({
        "success": true,
        "consultation": consultation,
    })))
}

/// Open the video room for a claimed consultation
pub async fn start_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<AuthUser>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, CoreError> {
    info!(
        "start request for consultation {} from user {}",
        consultation_id, user.id
    );

    let response = state.service.start(&user, consultation_id).await?;

    Ok(Json(json!({
        "success": true,
        "consultation": response.consultation,
        "room": response.room,
    })))
}

/// Close out an in-progress consultation
pub async fn finish_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<AuthUser>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<FinishConsultationRequest>,
) -> Result<Json<Value>, CoreError> {
    info!(
        "finish request for consultation {} from user {}",
        consultation_id, user.id
    );

    let consultation = state
        .service
        .finish(&user, consultation_id, request.notes)
        .await?;

    Ok(Json(json!({
        "success": true,
        "consultation": consultation,
    })))
}

/// Cancel a queued or in-progress consultation
pub async fn cancel_consultation(
    State(state): State<ConsultationState>,
    Extension(user): Extension<AuthUser>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<CancelConsultationRequest>,
) -> Result<Json<Value>, CoreError> {
    info!(
        "cancel request for consultation {} from user {}",
        consultation_id, user.id
    );

    let consultation = state
        .service
        .cancel(&user, consultation_id, request.reason)
        .await?;

    Ok(Json(json!({
        "success": true,
        "consultation": consultation,
    })))
}

/// Explicit snapshot pull, the resync path for any observer
pub async fn get_queue_snapshot(
    State(state): State<ConsultationState>,
    Extension(_user): Extension<AuthUser>,
    Path(specialty): Path<Specialty>,
) -> Result<Json<Value>, CoreError> {
    let snapshot = state.service.snapshot(specialty).await?;
    Ok(Json(json!({ "snapshot": snapshot })))
}
