use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use async_trait::async_trait;
use shared_config::AppConfig;
use shared_models::auth::AuthUser;
use shared_models::chat::ChatMessage;
use shared_models::consultation::{ConsultationRequest, ConsultationStatus, Specialty};
use shared_models::video::VideoRoom;

use crate::store::{
    ConsultationFilter, ConsultationPatch, ConsultationStore, StatusCondition, StoreError,
};

/// Client for the durable record collaborator, speaking a PostgREST-style
/// REST dialect. The conditional update is a filtered PATCH returning the
/// affected representations: touching exactly one row is the CAS success
/// criterion, so correctness holds across any number of server instances.
pub struct RestStore {
    client: Client,
    base_url: String,
    service_key: String,
    timeout: Duration,
}

impl RestStore {
    pub fn new(config: &AppConfig) -> Result<Self, StoreError> {
        let timeout = Duration::from_secs(config.store_timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(format!("client init: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.store_url.clone(),
            service_key: config.store_service_key.clone(),
            timeout,
        })
    }

    fn headers(&self, return_representation: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(key) = HeaderValue::from_str(&self.service_key) {
            headers.insert("apikey", key);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.service_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }
        if return_representation {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }
        headers
    }

    async fn request<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        return_representation: bool,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("store request: {} {}", method, url);

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.headers(return_representation));

        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(self.timeout)
            } else {
                StoreError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("store error ({}): {}", status, text);
            return Err(StoreError::Request(format!("{}: {}", status, text)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Payload(e.to_string()))
    }

    fn condition_query(id: Uuid, condition: &StatusCondition) -> String {
        let mut query = format!(
            "id=eq.{}&status=eq.{}",
            id,
            condition.status.as_str()
        );
        if let Some(professional_id) = condition.professional_id {
            query.push_str(&format!("&professional_id=eq.{}", professional_id));
        }
        if let Some(specialty) = condition.specialty {
            query.push_str(&format!("&specialty=eq.{}", specialty.as_str()));
        }
        query
    }
}

#[async_trait]
impl ConsultationStore for RestStore {
    async fn insert_consultation(
        &self,
        record: &ConsultationRequest,
    ) -> Result<ConsultationRequest, StoreError> {
        let body = serde_json::to_value(record)
            .map_err(|e| StoreError::Payload(e.to_string()))?;
        let rows: Vec<ConsultationRequest> = self
            .request(Method::POST, "/rest/v1/consultations", Some(body), true)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Payload("insert returned no row".into()))
    }

    async fn consultation(
        &self,
        id: Uuid,
    ) -> Result<Option<ConsultationRequest>, StoreError> {
        let path = format!("/rest/v1/consultations?id=eq.{}", id);
        let rows: Vec<ConsultationRequest> =
            self.request(Method::GET, &path, None, false).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_consultations(
        &self,
        filter: &ConsultationFilter,
    ) -> Result<Vec<ConsultationRequest>, StoreError> {
        let mut path = "/rest/v1/consultations?order=created_at.asc".to_string();
        if let Some(specialty) = filter.specialty {
            path.push_str(&format!("&specialty=eq.{}", specialty.as_str()));
        }
        if let Some(status) = filter.status {
            path.push_str(&format!("&status=eq.{}", status.as_str()));
        }
        if let Some(patient_id) = filter.patient_id {
            path.push_str(&format!("&patient_id=eq.{}", patient_id));
        }
        self.request(Method::GET, &path, None, false).await
    }

    async fn active_for_specialty(
        &self,
        specialty: Specialty,
    ) -> Result<Vec<ConsultationRequest>, StoreError> {
        let path = format!(
            "/rest/v1/consultations?specialty=eq.{}&status=in.(queued,in_progress)&order=created_at.asc",
            specialty.as_str()
        );
        self.request(Method::GET, &path, None, false).await
    }

    async fn queued_count(&self, specialty: Specialty) -> Result<u32, StoreError> {
        let path = format!(
            "/rest/v1/consultations?specialty=eq.{}&status=eq.queued&select=id",
            specialty.as_str()
        );
        let rows: Vec<Value> = self.request(Method::GET, &path, None, false).await?;
        Ok(rows.len() as u32)
    }

    async fn update_consultation(
        &self,
        id: Uuid,
        patch: &ConsultationPatch,
    ) -> Result<Option<ConsultationRequest>, StoreError> {
        let path = format!("/rest/v1/consultations?id=eq.{}", id);
        let body = serde_json::to_value(patch)
            .map_err(|e| StoreError::Payload(e.to_string()))?;
        let rows: Vec<ConsultationRequest> = self
            .request(Method::PATCH, &path, Some(body), true)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_consultation_if(
        &self,
        id: Uuid,
        condition: &StatusCondition,
        patch: &ConsultationPatch,
    ) -> Result<Option<ConsultationRequest>, StoreError> {
        let path = format!(
            "/rest/v1/consultations?{}",
            Self::condition_query(id, condition)
        );
        let body = serde_json::to_value(patch)
            .map_err(|e| StoreError::Payload(e.to_string()))?;
        let rows: Vec<ConsultationRequest> = self
            .request(Method::PATCH, &path, Some(body), true)
            .await?;
        // One affected row is the only success; zero rows means the
        // precondition no longer held when the store applied the filter.
        match rows.len() {
            1 => Ok(rows.into_iter().next()),
            0 => Ok(None),
            n => Err(StoreError::Payload(format!(
                "conditional update touched {} rows",
                n
            ))),
        }
    }

    async fn insert_room(&self, room: &VideoRoom) -> Result<VideoRoom, StoreError> {
        let body =
            serde_json::to_value(room).map_err(|e| StoreError::Payload(e.to_string()))?;
        let rows: Vec<VideoRoom> = self
            .request(Method::POST, "/rest/v1/video_rooms", Some(body), true)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Payload("insert returned no row".into()))
    }

    async fn room_by_token(&self, room_id: &str) -> Result<Option<VideoRoom>, StoreError> {
        let path = format!("/rest/v1/video_rooms?room_id=eq.{}", room_id);
        let rows: Vec<VideoRoom> = self.request(Method::GET, &path, None, false).await?;
        Ok(rows.into_iter().next())
    }

    async fn room_for_consultation(
        &self,
        consultation_id: Uuid,
    ) -> Result<Option<VideoRoom>, StoreError> {
        let path = format!(
            "/rest/v1/video_rooms?consultation_id=eq.{}",
            consultation_id
        );
        let rows: Vec<VideoRoom> = self.request(Method::GET, &path, None, false).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_room(&self, room: &VideoRoom) -> Result<VideoRoom, StoreError> {
        let path = format!("/rest/v1/video_rooms?id=eq.{}", room.id);
        let body =
            serde_json::to_value(room).map_err(|e| StoreError::Payload(e.to_string()))?;
        let rows: Vec<VideoRoom> = self
            .request(Method::PATCH, &path, Some(body), true)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Payload("room update returned no row".into()))
    }

    async fn append_message(
        &self,
        consultation_id: Uuid,
        sender: &AuthUser,
        text: &str,
    ) -> Result<ChatMessage, StoreError> {
        let body = serde_json::json!({
            "consultation_id": consultation_id,
            "sender_id": sender.id,
            "sender_role": sender.role,
            "text": text,
        });
        let rows: Vec<ChatMessage> = self
            .request(Method::POST, "/rest/v1/chat_messages", Some(body), true)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Payload("insert returned no row".into()))
    }

    async fn messages_for_consultation(
        &self,
        consultation_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let path = format!(
            "/rest/v1/chat_messages?consultation_id=eq.{}&order=created_at.desc&limit={}",
            consultation_id, limit
        );
        let mut rows: Vec<ChatMessage> =
            self.request(Method::GET, &path, None, false).await?;
        rows.reverse();
        Ok(rows)
    }
}
