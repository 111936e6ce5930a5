use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{
    ConsultationFilter, ConsultationPatch, ConsultationStore, StatusCondition,
};
use shared_models::auth::{AuthUser, Role};
use shared_models::consultation::{
    ConsultationRequest, ConsultationStatus, Specialty,
};
use shared_models::error::CoreError;
use shared_models::queue::QueueSnapshot;
use shared_realtime::{Broadcaster, ConnectionRegistry, ServerEvent};
use video_cell::VideoRoomService;

use crate::models::{EnqueueConsultationRequest, StartConsultationResponse};
use crate::services::ranking;

/// State machine and assignment over consultation records. Owns every
/// status transition; the claim race is settled by one conditional store
/// update, never by anything held in this process.
pub struct AssignmentService {
    store: Arc<dyn ConsultationStore>,
    broadcaster: Broadcaster,
    registry: ConnectionRegistry,
    rooms: Arc<VideoRoomService>,
    config: Arc<AppConfig>,
}

impl AssignmentService {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        broadcaster: Broadcaster,
        registry: ConnectionRegistry,
        rooms: Arc<VideoRoomService>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            registry,
            rooms,
            config,
        }
    }

    pub async fn enqueue(
        &self,
        actor: &AuthUser,
        request: EnqueueConsultationRequest,
    ) -> Result<ConsultationRequest, CoreError> {
        let patient_id = match actor.role {
            Role::Patient => actor.id,
            Role::Admin => request.patient_id.ok_or_else(|| {
                CoreError::Forbidden("admin enqueue requires a patient id".to_string())
            })?,
            Role::Professional => {
                return Err(CoreError::Forbidden(
                    "professionals do not enqueue consultations".to_string(),
                ))
            }
        };

        let queued = self.store.queued_count(request.specialty).await?;
        if queued >= self.config.max_queue_length {
            return Err(CoreError::QueueFull {
                specialty: request.specialty.as_str().to_string(),
                limit: self.config.max_queue_length,
            });
        }

        let record = ConsultationRequest::new(
            patient_id,
            request.specialty,
            request.description,
            request.priority,
        );
        let record = self.store.insert_consultation(&record).await?;
        info!(
            "enqueued consultation {} for patient {} ({})",
            record.id,
            patient_id,
            request.specialty.as_str()
        );

        self.refresh_specialty(record.specialty).await?;

        // Re-read for the position the refresh just assigned.
        self.store
            .consultation(record.id)
            .await?
            .ok_or_else(|| CoreError::NotFound("consultation not found".to_string()))
    }

    /// The concurrency-critical operation. Exactly one of N concurrent
    /// callers wins the conditional update; everyone else gets Conflict.
    /// A specialty mismatch on the caller's side fails before any store
    /// call is made.
    pub async fn claim(
        &self,
        actor: &AuthUser,
        consultation_id: Uuid,
        specialty: Specialty,
    ) -> Result<ConsultationRequest, CoreError> {
        let own_specialty = actor.dispatch_specialty().ok_or_else(|| {
            CoreError::Forbidden("claiming requires a professional specialty".to_string())
        })?;
        if own_specialty != specialty {
            return Err(CoreError::Forbidden(format!(
                "cannot claim from the {} queue",
                specialty.as_str()
            )));
        }

        let condition =
            StatusCondition::status(ConsultationStatus::Queued).with_specialty(specialty);
        let patch = ConsultationPatch::claim(actor.id, Utc::now());

        match self
            .store
            .update_consultation_if(consultation_id, &condition, &patch)
            .await?
        {
            Some(updated) => {
                info!(
                    "consultation {} claimed by professional {}",
                    consultation_id, actor.id
                );
                // The transition is committed; a failed refresh only delays
                // observers, who can always pull a snapshot.
                self.refresh_after_commit(specialty).await;
                self.broadcaster.publish_specialty(
                    specialty,
                    &ServerEvent::ConsultationClaimed {
                        consultation: updated.clone(),
                    },
                );
                Ok(updated)
            }
            None => {
                // The update decided the race; this read only names the loss.
                match self.store.consultation(consultation_id).await? {
                    None => Err(CoreError::NotFound("consultation not found".to_string())),
                    Some(record) if record.specialty != specialty => Err(CoreError::Forbidden(
                        "consultation belongs to another specialty".to_string(),
                    )),
                    Some(_) => Err(CoreError::Conflict(
                        "consultation is no longer queued".to_string(),
                    )),
                }
            }
        }
    }

    /// Allocates the video room for a claimed consultation. Idempotent for
    /// repeated calls by the bound professional.
    pub async fn start(
        &self,
        actor: &AuthUser,
        consultation_id: Uuid,
    ) -> Result<StartConsultationResponse, CoreError> {
        let record = self
            .store
            .consultation(consultation_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("consultation not found".to_string()))?;

        if record.professional_id != Some(actor.id) {
            return Err(CoreError::Forbidden(
                "only the bound professional can start".to_string(),
            ));
        }
        if record.status != ConsultationStatus::InProgress {
            return Err(CoreError::InvalidTransition {
                from: record.status.as_str().to_string(),
                to: "started".to_string(),
            });
        }

        if let Some(room_token) = &record.room_id {
            let room = self
                .store
                .room_by_token(room_token)
                .await?
                .ok_or_else(|| CoreError::NotFound("room not found".to_string()))?;
            debug!("consultation {} already started", consultation_id);
            return Ok(StartConsultationResponse {
                consultation: record,
                room,
            });
        }

        let room = self.rooms.create_for_consultation(&record).await?;
        let updated = self
            .store
            .update_consultation(
                consultation_id,
                &ConsultationPatch::room(room.room_id.clone()),
            )
            .await?
            .ok_or_else(|| CoreError::NotFound("consultation not found".to_string()))?;

        self.refresh_after_commit(updated.specialty).await;
        self.broadcaster
            .publish_user(
                updated.patient_id,
                &ServerEvent::ConsultationStarted {
                    consultation: updated.clone(),
                    room_id: room.room_id.clone(),
                },
            )
            .await;

        info!(
            "consultation {} started; room {} allocated",
            consultation_id, room.room_id
        );
        Ok(StartConsultationResponse {
            consultation: updated,
            room,
        })
    }

    pub async fn finish(
        &self,
        actor: &AuthUser,
        consultation_id: Uuid,
        notes: Option<String>,
    ) -> Result<ConsultationRequest, CoreError> {
        let condition = StatusCondition::status(ConsultationStatus::InProgress)
            .with_professional(actor.id);
        let patch = ConsultationPatch::finish(Utc::now(), notes);

        match self
            .store
            .update_consultation_if(consultation_id, &condition, &patch)
            .await?
        {
            Some(updated) => {
                info!("consultation {} finished", consultation_id);
                self.refresh_after_commit(updated.specialty).await;
                self.broadcaster.publish_specialty(
                    updated.specialty,
                    &ServerEvent::ConsultationFinished {
                        consultation: updated.clone(),
                    },
                );
                self.broadcaster
                    .publish_user(
                        updated.patient_id,
                        &ServerEvent::ConsultationFinished {
                            consultation: updated.clone(),
                        },
                    )
                    .await;
                Ok(updated)
            }
            None => match self.store.consultation(consultation_id).await? {
                None => Err(CoreError::NotFound("consultation not found".to_string())),
                Some(record)
                    if record.status == ConsultationStatus::InProgress
                        && record.professional_id != Some(actor.id) =>
                {
                    Err(CoreError::Forbidden(
                        "only the bound professional can finish".to_string(),
                    ))
                }
                Some(record) => Err(CoreError::InvalidTransition {
                    from: record.status.as_str().to_string(),
                    to: ConsultationStatus::Finished.as_str().to_string(),
                }),
            },
        }
    }

    pub async fn cancel(
        &self,
        actor: &AuthUser,
        consultation_id: Uuid,
        reason: String,
    ) -> Result<ConsultationRequest, CoreError> {
        let record = self
            .store
            .consultation(consultation_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("consultation not found".to_string()))?;

        let allowed = record.patient_id == actor.id
            || record.professional_id == Some(actor.id)
            || actor.is_admin();
        if !allowed {
            return Err(CoreError::Forbidden(
                "not a party to this consultation".to_string(),
            ));
        }
        if record.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: record.status.as_str().to_string(),
                to: ConsultationStatus::Cancelled.as_str().to_string(),
            });
        }

        let condition = StatusCondition::status(record.status);
        let patch = ConsultationPatch::cancel(reason);

        match self
            .store
            .update_consultation_if(consultation_id, &condition, &patch)
            .await?
        {
            Some(updated) => {
                info!("consultation {} cancelled by {}", consultation_id, actor.id);
                self.refresh_after_commit(updated.specialty).await;
                Ok(updated)
            }
            None => Err(CoreError::Conflict(
                "consultation changed state during cancel".to_string(),
            )),
        }
    }

    pub async fn get(
        &self,
        actor: &AuthUser,
        consultation_id: Uuid,
    ) -> Result<ConsultationRequest, CoreError> {
        let record = self
            .store
            .consultation(consultation_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("consultation not found".to_string()))?;
        self.authorize_read(actor, &record)?;
        Ok(record)
    }

    pub async fn list(
        &self,
        actor: &AuthUser,
        mut filter: ConsultationFilter,
    ) -> Result<Vec<ConsultationRequest>, CoreError> {
        match actor.role {
            Role::Patient => filter.patient_id = Some(actor.id),
            Role::Professional => {
                let own = actor.dispatch_specialty().ok_or_else(|| {
                    CoreError::Forbidden("professional without a specialty".to_string())
                })?;
                filter.specialty = Some(own);
            }
            Role::Admin => {}
        }
        Ok(self.store.list_consultations(&filter).await?)
    }

    /// Pure read of the current queue state; the resync path for any
    /// observer that missed a broadcast.
    pub async fn snapshot(&self, specialty: Specialty) -> Result<QueueSnapshot, CoreError> {
        let active = self.store.active_for_specialty(specialty).await?;
        let online = self.registry.online_professionals(specialty).await;
        let ranked = ranking::rank_active(&active, online, self.config.average_slot_minutes);
        Ok(ranking::build_snapshot(specialty, &ranked, online))
    }

    /// Recomputes the ranking after a mutation, persists changed positions
    /// and publishes the refreshed snapshot to the specialty topic.
    pub async fn refresh_specialty(
        &self,
        specialty: Specialty,
    ) -> Result<QueueSnapshot, CoreError> {
        let active = self.store.active_for_specialty(specialty).await?;
        let online = self.registry.online_professionals(specialty).await;
        let ranked = ranking::rank_active(&active, online, self.config.average_slot_minutes);

        for record in &ranked {
            if record.status != ConsultationStatus::Queued {
                continue;
            }
            let stored = active.iter().find(|r| r.id == record.id);
            let changed = stored.map_or(true, |s| {
                s.position != record.position
                    || s.estimated_wait_minutes != record.estimated_wait_minutes
            });
            if changed {
                if let (Some(position), Some(wait)) =
                    (record.position, record.estimated_wait_minutes)
                {
                    self.store
                        .update_consultation(
                            record.id,
                            &ConsultationPatch::ranking(position, wait),
                        )
                        .await?;
                }
            }
        }

        let snapshot = ranking::build_snapshot(specialty, &ranked, online);
        self.broadcaster.publish_specialty(
            specialty,
            &ServerEvent::QueueStatus {
                snapshot: snapshot.clone(),
            },
        );
        Ok(snapshot)
    }

    /// Refresh after a committed transition. The commit already happened,
    /// so a failing refresh is logged rather than surfaced.
    async fn refresh_after_commit(&self, specialty: Specialty) {
        if let Err(err) = self.refresh_specialty(specialty).await {
            warn!(
                "queue refresh for {} failed after commit: {}",
                specialty.as_str(),
                err
            );
        }
    }

    fn authorize_read(
        &self,
        actor: &AuthUser,
        record: &ConsultationRequest,
    ) -> Result<(), CoreError> {
        let allowed = match actor.role {
            Role::Patient => record.patient_id == actor.id,
            Role::Professional => {
                actor.dispatch_specialty() == Some(record.specialty)
                    || record.professional_id == Some(actor.id)
            }
            Role::Admin => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(CoreError::Forbidden(
                "no access to this consultation".to_string(),
            ))
        }
    }
}
