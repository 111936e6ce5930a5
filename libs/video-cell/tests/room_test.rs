use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{ConsultationStore, MemoryStore};
use shared_models::auth::{AuthUser, Role};
use shared_models::consultation::{
    ConsultationRequest, ConsultationStatus, Priority, Specialty,
};
use shared_models::error::CoreError;
use shared_realtime::Broadcaster;
use video_cell::VideoRoomService;

fn patient(id: Uuid) -> AuthUser {
    AuthUser {
        id,
        role: Role::Patient,
        specialty: None,
        email: None,
        created_at: None,
    }
}

fn professional(id: Uuid) -> AuthUser {
    AuthUser {
        id,
        role: Role::Professional,
        specialty: Some(Specialty::GeneralPractice),
        email: None,
        created_at: None,
    }
}

fn admin() -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        role: Role::Admin,
        specialty: None,
        email: None,
        created_at: None,
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    service: VideoRoomService,
    consultation: ConsultationRequest,
    patient: AuthUser,
    professional: AuthUser,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let config = AppConfig::default();
    let service = VideoRoomService::new(store.clone(), Broadcaster::new(), &config);

    let patient = patient(Uuid::new_v4());
    let professional = professional(Uuid::new_v4());

    let mut consultation = ConsultationRequest::new(
        patient.id,
        Specialty::GeneralPractice,
        "persistent cough".to_string(),
        Priority::Medium,
    );
    consultation.status = ConsultationStatus::InProgress;
    consultation.professional_id = Some(professional.id);
    store.insert_consultation(&consultation).await.unwrap();

    Fixture {
        store,
        service,
        consultation,
        patient,
        professional,
    }
}

#[tokio::test]
async fn create_is_idempotent_per_consultation() {
    let f = fixture().await;

    let first = f
        .service
        .create_for_consultation(&f.consultation)
        .await
        .unwrap();
    let second = f
        .service
        .create_for_consultation(&f.consultation)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.room_id, second.room_id);
    assert_eq!(first.room_id.len(), 32);
}

#[tokio::test]
async fn third_join_fails_room_full_without_disturbing_members() {
    let f = fixture().await;
    let room = f
        .service
        .create_for_consultation(&f.consultation)
        .await
        .unwrap();

    f.service
        .join(&room.room_id, &f.patient, Uuid::new_v4())
        .await
        .unwrap();
    let two = f
        .service
        .join(&room.room_id, &f.professional, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(two.active_count(), 2);

    let refused = f.service.join(&room.room_id, &admin(), Uuid::new_v4()).await;
    assert_matches!(refused, Err(CoreError::Conflict(_)));

    let untouched = f.store.room_by_token(&room.room_id).await.unwrap().unwrap();
    assert_eq!(untouched.active_count(), 2);
    let mut members: Vec<Uuid> = untouched.active_participants().map(|p| p.user_id).collect();
    members.sort();
    let mut expected = vec![f.patient.id, f.professional.id];
    expected.sort();
    assert_eq!(members, expected);
}

#[tokio::test]
async fn rejoin_replaces_connection_instead_of_taking_a_slot() {
    let f = fixture().await;
    let room = f
        .service
        .create_for_consultation(&f.consultation)
        .await
        .unwrap();

    let first_connection = Uuid::new_v4();
    let second_connection = Uuid::new_v4();
    f.service
        .join(&room.room_id, &f.patient, first_connection)
        .await
        .unwrap();
    let rejoined = f
        .service
        .join(&room.room_id, &f.patient, second_connection)
        .await
        .unwrap();

    assert_eq!(rejoined.active_count(), 1);
    let participant = rejoined.active_participants().next().unwrap();
    assert_eq!(participant.connection_id, second_connection);
}

#[tokio::test]
async fn leave_frees_the_slot_for_a_rejoin() {
    let f = fixture().await;
    let room = f
        .service
        .create_for_consultation(&f.consultation)
        .await
        .unwrap();

    f.service
        .join(&room.room_id, &f.patient, Uuid::new_v4())
        .await
        .unwrap();
    let after_leave = f.service.leave(&room.room_id, f.patient.id).await.unwrap();
    assert_eq!(after_leave.active_count(), 0);
    assert!(after_leave.participants[0].left_at.is_some());

    let rejoined = f
        .service
        .join(&room.room_id, &f.patient, Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(rejoined.active_count(), 1);
}

#[tokio::test]
async fn outsider_is_forbidden() {
    let f = fixture().await;
    let room = f
        .service
        .create_for_consultation(&f.consultation)
        .await
        .unwrap();

    let outsider = patient(Uuid::new_v4());
    let refused = f.service.join(&room.room_id, &outsider, Uuid::new_v4()).await;
    assert_matches!(refused, Err(CoreError::Forbidden(_)));
}

#[tokio::test]
async fn expired_room_refuses_join_lazily() {
    let f = fixture().await;
    let mut room = f
        .service
        .create_for_consultation(&f.consultation)
        .await
        .unwrap();

    room.expires_at = Utc::now() - Duration::minutes(1);
    f.store.update_room(&room).await.unwrap();

    let refused = f.service.join(&room.room_id, &f.patient, Uuid::new_v4()).await;
    assert_matches!(refused, Err(CoreError::Expired(_)));

    // The lazy check also deactivates the room record.
    let stored = f.store.room_by_token(&room.room_id).await.unwrap().unwrap();
    assert!(!stored.is_active);
}

#[tokio::test]
async fn unknown_room_is_not_found() {
    let f = fixture().await;
    let missing = f.service.join("no-such-room", &f.patient, Uuid::new_v4()).await;
    assert_matches!(missing, Err(CoreError::NotFound(_)));
}
