use chrono::Utc;

use shared_models::consultation::{ConsultationRequest, ConsultationStatus, Specialty};
use shared_models::queue::{QueueEntry, QueueSnapshot};

/// Wait estimate for a queue slot: full rounds of service ahead of this
/// position, spread over the professionals currently online, times the
/// average slot length.
pub fn estimated_wait_minutes(
    position: u32,
    online_professionals: u32,
    average_slot_minutes: u32,
) -> u32 {
    let ahead = position.saturating_sub(1);
    let lanes = online_professionals.max(1);
    ahead.div_ceil(lanes) * average_slot_minutes
}

/// Total order over one specialty's active records: priority descending,
/// then arrival ascending. Positions are 1-based over the queued subset
/// only; in-progress records carry no position. Pure and idempotent --
/// recomputing from the same snapshot yields the same output.
pub fn rank_active(
    records: &[ConsultationRequest],
    online_professionals: u32,
    average_slot_minutes: u32,
) -> Vec<ConsultationRequest> {
    let mut ranked = records.to_vec();
    ranked.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let mut position = 0u32;
    for record in &mut ranked {
        if record.status == ConsultationStatus::Queued {
            position += 1;
            record.position = Some(position);
            record.estimated_wait_minutes = Some(estimated_wait_minutes(
                position,
                online_professionals,
                average_slot_minutes,
            ));
        } else {
            record.position = None;
            record.estimated_wait_minutes = None;
        }
    }
    ranked
}

pub fn build_snapshot(
    specialty: Specialty,
    ranked: &[ConsultationRequest],
    online_professionals: u32,
) -> QueueSnapshot {
    let queue_length = ranked
        .iter()
        .filter(|r| r.status == ConsultationStatus::Queued)
        .count() as u32;
    let in_progress_count = ranked
        .iter()
        .filter(|r| r.status == ConsultationStatus::InProgress)
        .count() as u32;

    QueueSnapshot {
        specialty,
        queue_length,
        in_progress_count,
        online_professionals,
        entries: ranked
            .iter()
            .map(|r| QueueEntry {
                consultation_id: r.id,
                patient_id: r.patient_id,
                priority: r.priority,
                status: r.status,
                position: r.position,
                estimated_wait_minutes: r.estimated_wait_minutes,
                created_at: r.created_at,
            })
            .collect(),
        generated_at: Utc::now(),
    }
}
