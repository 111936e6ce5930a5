use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::ConsultationStore;
use shared_models::auth::AuthUser;
use shared_models::chat::ChatMessage;
use shared_models::consultation::ConsultationRequest;
use shared_models::error::CoreError;
use shared_realtime::{Broadcaster, Published, ServerEvent};

/// Ordered message history plus live relay per consultation. The
/// per-consultation lock makes persistence the single serialization point:
/// every member observes messages in the order the store accepted them.
pub struct ChatService {
    store: Arc<dyn ConsultationStore>,
    broadcaster: Broadcaster,
    history_limit: u32,
    send_locks: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ConsultationStore>,
        broadcaster: Broadcaster,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            history_limit: config.chat_history_limit,
            send_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Chat access mirrors room access: the owning patient, the bound
    /// professional, or an admin.
    pub async fn authorize(
        &self,
        user: &AuthUser,
        consultation_id: Uuid,
    ) -> Result<ConsultationRequest, CoreError> {
        let consultation = self
            .store
            .consultation(consultation_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("consultation not found".to_string()))?;

        let allowed = consultation.patient_id == user.id
            || consultation.professional_id == Some(user.id)
            || user.is_admin();
        if !allowed {
            return Err(CoreError::Forbidden(
                "not a party to this consultation".to_string(),
            ));
        }
        Ok(consultation)
    }

    /// Subscribes to the live relay and fetches the bounded history as one
    /// step. Holding the send lock across both means no message can slip
    /// between the history read and the subscription: replay is exactly the
    /// persisted prefix, then live relay continues from there.
    pub async fn join(
        &self,
        consultation_id: Uuid,
    ) -> Result<(broadcast::Receiver<Published>, Vec<ChatMessage>), CoreError> {
        let lock = self.lock_for(consultation_id).await;
        let _guard = lock.lock().await;

        let receiver = self
            .broadcaster
            .subscribe_room(&channel_key(consultation_id))
            .await;
        let history = self
            .store
            .messages_for_consultation(consultation_id, self.history_limit)
            .await?;
        Ok((receiver, history))
    }

    /// Persist first, then broadcast the durable echo to every member,
    /// the sender included.
    pub async fn send(
        &self,
        consultation_id: Uuid,
        sender: &AuthUser,
        text: &str,
    ) -> Result<ChatMessage, CoreError> {
        let lock = self.lock_for(consultation_id).await;
        let _guard = lock.lock().await;

        let message = self
            .store
            .append_message(consultation_id, sender, text)
            .await?;
        self.broadcaster
            .publish_room(
                &channel_key(consultation_id),
                None,
                &ServerEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await;

        info!(
            "message {} persisted for consultation {}",
            message.id, consultation_id
        );
        Ok(message)
    }

    pub async fn announce(
        &self,
        consultation_id: Uuid,
        origin: Option<Uuid>,
        event: &ServerEvent,
    ) {
        self.broadcaster
            .publish_room(&channel_key(consultation_id), origin, event)
            .await;
    }

    async fn lock_for(&self, consultation_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.send_locks.write().await;
        Arc::clone(
            locks
                .entry(consultation_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

/// Chat channels live in their own namespace so a consultation id can never
/// collide with a video room token.
fn channel_key(consultation_id: Uuid) -> String {
    format!("chat:{}", consultation_id)
}
