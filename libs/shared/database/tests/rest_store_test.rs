use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{
    ConsultationPatch, ConsultationStore, RestStore, StatusCondition,
};
use shared_models::consultation::{
    ConsultationRequest, ConsultationStatus, Priority, Specialty,
};

fn config_for(server: &MockServer) -> AppConfig {
    AppConfig {
        store_url: server.uri(),
        store_service_key: "service-key".to_string(),
        jwt_secret: "secret".to_string(),
        ..AppConfig::default()
    }
}

fn queued_record() -> ConsultationRequest {
    ConsultationRequest::new(
        Uuid::new_v4(),
        Specialty::Cardiology,
        "chest pain".to_string(),
        Priority::Urgent,
    )
}

#[tokio::test]
async fn conditional_update_with_one_affected_row_succeeds() {
    let server = MockServer::start().await;
    let mut record = queued_record();
    let professional_id = Uuid::new_v4();
    record.status = ConsultationStatus::InProgress;
    record.professional_id = Some(professional_id);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("id", format!("eq.{}", record.id)))
        .and(query_param("status", "eq.queued"))
        .and(query_param("specialty", "eq.cardiology"))
        .and(header("Prefer", "return=representation"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([record])),
        )
        .mount(&server)
        .await;

    let store = RestStore::new(&config_for(&server)).expect("client");
    let condition = StatusCondition::status(ConsultationStatus::Queued)
        .with_specialty(Specialty::Cardiology);
    let patch = ConsultationPatch::claim(professional_id, Utc::now());

    let updated = store
        .update_consultation_if(record.id, &condition, &patch)
        .await
        .expect("request succeeds")
        .expect("one row affected");

    assert_eq!(updated.status, ConsultationStatus::InProgress);
    assert_eq!(updated.professional_id, Some(professional_id));
}

#[tokio::test]
async fn conditional_update_with_zero_rows_is_a_lost_race() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = RestStore::new(&config_for(&server)).expect("client");
    let condition = StatusCondition::status(ConsultationStatus::Queued);
    let patch = ConsultationPatch::claim(Uuid::new_v4(), Utc::now());

    let outcome = store
        .update_consultation_if(id, &condition, &patch)
        .await
        .expect("request succeeds");

    assert!(outcome.is_none(), "zero affected rows is not a success");
}

#[tokio::test]
async fn store_failure_surfaces_as_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let store = RestStore::new(&config_for(&server)).expect("client");
    let result = store.consultation(Uuid::new_v4()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn insert_returns_the_stored_representation() {
    let server = MockServer::start().await;
    let record = queued_record();

    Mock::given(method("POST"))
        .and(path("/rest/v1/consultations"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([record])))
        .mount(&server)
        .await;

    let store = RestStore::new(&config_for(&server)).expect("client");
    let stored = store.insert_consultation(&record).await.expect("inserted");
    assert_eq!(stored.id, record.id);
}

#[test]
fn claim_patch_clears_queue_fields_with_explicit_nulls() {
    let patch = ConsultationPatch::claim(Uuid::new_v4(), Utc::now());
    let body = serde_json::to_value(&patch).expect("serializes");

    assert_eq!(body["status"], json!("in_progress"));
    // Cleared double-Option fields serialize as explicit nulls.
    assert!(body.get("position").expect("present").is_null());
    assert!(body
        .get("estimated_wait_minutes")
        .expect("present")
        .is_null());
    // Untouched fields stay out of the body entirely.
    assert!(body.get("finished_at").is_none());
}

#[test]
fn patch_apply_matches_its_serialized_meaning() {
    let mut record = queued_record();
    record.position = Some(3);
    record.estimated_wait_minutes = Some(30);

    let professional_id = Uuid::new_v4();
    ConsultationPatch::claim(professional_id, Utc::now()).apply(&mut record);

    assert_eq!(record.status, ConsultationStatus::InProgress);
    assert_eq!(record.professional_id, Some(professional_id));
    assert_eq!(record.position, None);
    assert_eq!(record.estimated_wait_minutes, None);
    assert!(record.started_at.is_some());
}
