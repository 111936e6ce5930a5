use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::auth::{AuthUser, Role};
use shared_models::consultation::Specialty;
use shared_models::error::CoreError;

/// What the server knows about one live connection. Process-local and
/// disposable: the durable store stays the source of truth, so this cache
/// can be dropped and rebuilt by clients reconnecting.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub user_id: Uuid,
    pub role: Role,
    pub subscribed_specialty: Option<Specialty>,
    pub subscribed_room: Option<String>,
}

/// Bounded concurrent map of connection id to session. Connections beyond
/// the capacity are refused rather than evicting live sessions.
pub struct ConnectionRegistry {
    capacity: usize,
    sessions: Arc<RwLock<HashMap<Uuid, SessionInfo>>>,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(
        &self,
        connection_id: Uuid,
        user: &AuthUser,
    ) -> Result<(), CoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.capacity {
            warn!("connection registry full ({} sessions)", sessions.len());
            return Err(CoreError::Transient("connection capacity reached".to_string()));
        }
        sessions.insert(
            connection_id,
            SessionInfo {
                user_id: user.id,
                role: user.role,
                subscribed_specialty: None,
                subscribed_room: None,
            },
        );
        debug!("registered connection {} for user {}", connection_id, user.id);
        Ok(())
    }

    pub async fn deregister(&self, connection_id: Uuid) -> Option<SessionInfo> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&connection_id);
        debug!("deregistered connection {}", connection_id);
        removed
    }

    pub async fn set_specialty(&self, connection_id: Uuid, specialty: Option<Specialty>) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&connection_id) {
            session.subscribed_specialty = specialty;
        }
    }

    pub async fn set_room(&self, connection_id: Uuid, room: Option<String>) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&connection_id) {
            session.subscribed_room = room;
        }
    }

    pub async fn session(&self, connection_id: Uuid) -> Option<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.get(&connection_id).cloned()
    }

    /// Professionals currently subscribed to a specialty topic; feeds the
    /// wait estimate of the ranking calculator.
    pub async fn online_professionals(&self, specialty: Specialty) -> u32 {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|s| {
                s.role == Role::Professional && s.subscribed_specialty == Some(specialty)
            })
            .count() as u32
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Clone for ConnectionRegistry {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            sessions: Arc::clone(&self.sessions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn user(role: Role, specialty: Option<Specialty>) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role,
            specialty,
            email: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn counts_online_professionals_per_specialty() {
        let registry = ConnectionRegistry::new(16);
        let pro = user(Role::Professional, Some(Specialty::Cardiology));
        let patient = user(Role::Patient, None);

        let pro_conn = Uuid::new_v4();
        let patient_conn = Uuid::new_v4();
        registry.register(pro_conn, &pro).await.unwrap();
        registry.register(patient_conn, &patient).await.unwrap();
        registry
            .set_specialty(pro_conn, Some(Specialty::Cardiology))
            .await;
        registry
            .set_specialty(patient_conn, Some(Specialty::Cardiology))
            .await;

        assert_eq!(registry.online_professionals(Specialty::Cardiology).await, 1);
        assert_eq!(registry.online_professionals(Specialty::Pediatrics).await, 0);
    }

    #[tokio::test]
    async fn refuses_connections_beyond_capacity() {
        let registry = ConnectionRegistry::new(1);
        let first = user(Role::Patient, None);
        let second = user(Role::Patient, None);

        registry.register(Uuid::new_v4(), &first).await.unwrap();
        let refused = registry.register(Uuid::new_v4(), &second).await;
        assert_matches!(refused, Err(CoreError::Transient(_)));
    }

    #[tokio::test]
    async fn deregister_returns_session_state() {
        let registry = ConnectionRegistry::new(16);
        let connection_id = Uuid::new_v4();
        registry
            .register(connection_id, &user(Role::Patient, None))
            .await
            .unwrap();
        registry
            .set_room(connection_id, Some("room-token".to_string()))
            .await;

        let session = registry.deregister(connection_id).await.expect("present");
        assert_eq!(session.subscribed_room.as_deref(), Some("room-token"));
        assert!(registry.is_empty().await);
    }
}
