use chrono::{Duration, Utc};
use uuid::Uuid;

use consultation_cell::services::ranking::{
    build_snapshot, estimated_wait_minutes, rank_active,
};
use shared_models::consultation::{
    ConsultationRequest, ConsultationStatus, Priority, Specialty,
};

fn record(priority: Priority, minutes_ago: i64) -> ConsultationRequest {
    let mut record = ConsultationRequest::new(
        Uuid::new_v4(),
        Specialty::GeneralPractice,
        "test".to_string(),
        priority,
    );
    record.created_at = Utc::now() - Duration::minutes(minutes_ago);
    record
}

#[test]
fn priority_dominates_arrival_order() {
    // Example: medium arrives first, urgent second; urgent still ranks first.
    let medium = record(Priority::Medium, 10);
    let urgent = record(Priority::Urgent, 1);

    let ranked = rank_active(&[medium.clone(), urgent.clone()], 1, 15);

    assert_eq!(ranked[0].id, urgent.id);
    assert_eq!(ranked[0].position, Some(1));
    assert_eq!(ranked[1].id, medium.id);
    assert_eq!(ranked[1].position, Some(2));
}

#[test]
fn created_at_breaks_priority_ties() {
    let older = record(Priority::High, 30);
    let newer = record(Priority::High, 5);

    let ranked = rank_active(&[newer.clone(), older.clone()], 1, 15);

    assert_eq!(ranked[0].id, older.id);
    assert_eq!(ranked[1].id, newer.id);
}

#[test]
fn positions_are_gap_free_and_skip_in_progress() {
    let mut in_progress = record(Priority::Urgent, 40);
    in_progress.status = ConsultationStatus::InProgress;
    let first = record(Priority::High, 20);
    let second = record(Priority::Low, 10);

    let ranked = rank_active(&[second, in_progress, first], 2, 15);

    let positions: Vec<Option<u32>> = ranked.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![None, Some(1), Some(2)]);
    assert!(ranked[0].estimated_wait_minutes.is_none());
}

#[test]
fn recomputation_is_idempotent() {
    let records = vec![
        record(Priority::Urgent, 15),
        record(Priority::Medium, 10),
        record(Priority::Medium, 5),
    ];

    let once = rank_active(&records, 2, 15);
    let twice = rank_active(&once, 2, 15);

    for (a, b) in once.iter().zip(twice.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.position, b.position);
        assert_eq!(a.estimated_wait_minutes, b.estimated_wait_minutes);
    }
}

#[test]
fn wait_estimate_spreads_over_online_professionals() {
    assert_eq!(estimated_wait_minutes(1, 1, 15), 0);
    assert_eq!(estimated_wait_minutes(2, 1, 15), 15);
    assert_eq!(estimated_wait_minutes(4, 1, 15), 45);
    assert_eq!(estimated_wait_minutes(4, 3, 15), 15);
    // Zero professionals online behaves as a single lane.
    assert_eq!(estimated_wait_minutes(3, 0, 15), 30);
}

#[test]
fn snapshot_counts_match_entries() {
    let mut in_progress = record(Priority::High, 25);
    in_progress.status = ConsultationStatus::InProgress;
    let records = vec![record(Priority::Urgent, 20), in_progress, record(Priority::Low, 2)];

    let ranked = rank_active(&records, 1, 15);
    let snapshot = build_snapshot(Specialty::GeneralPractice, &ranked, 1);

    assert_eq!(snapshot.queue_length, 2);
    assert_eq!(snapshot.in_progress_count, 1);
    assert_eq!(snapshot.online_professionals, 1);
    assert_eq!(snapshot.entries.len(), 3);
}
