use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use consultation_cell::AssignmentService;
use shared_config::AppConfig;
use shared_models::auth::{AuthUser, Role};
use shared_models::consultation::Specialty;
use shared_models::error::CoreError;
use shared_realtime::{
    Broadcaster, ConnectionRegistry, Published, ServerEvent, SpecialtyClientEvent,
};
use shared_utils::extractor::authenticate_connection;

#[derive(Clone)]
pub struct RealtimeState {
    pub config: Arc<AppConfig>,
    pub service: Arc<AssignmentService>,
    pub broadcaster: Broadcaster,
    pub registry: ConnectionRegistry,
}

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Specialty/user channel endpoint. The connection authenticates before the
/// upgrade and is refused outright when the credential does not verify.
pub async fn realtime_ws_handler(
    Query(auth): Query<WsAuthQuery>,
    State(state): State<RealtimeState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match authenticate_connection(&headers, auth.token.as_deref(), &state.config) {
        Ok(user) => user,
        Err(err) => {
            warn!("refusing realtime connection: {}", err);
            return err.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_realtime_socket(socket, state, user))
}

async fn handle_realtime_socket(socket: WebSocket, state: RealtimeState, user: AuthUser) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    if let Err(err) = state.registry.register(connection_id, &user).await {
        let _ = send_event(&mut sender, &ServerEvent::error(&err)).await;
        return;
    }

    info!(
        "realtime connection {} opened for user {}",
        connection_id, user.id
    );

    let mut specialty_rx: Option<broadcast::Receiver<Published>> = None;
    let mut user_rx: Option<broadcast::Receiver<Published>> = None;
    let mut subscribed: Option<Specialty> = None;

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                let Some(Ok(message)) = inbound else { break };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let event = match serde_json::from_str::<SpecialtyClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!("ignoring malformed realtime event: {}", e);
                        continue;
                    }
                };

                let outcome = handle_client_event(
                    &state,
                    &user,
                    connection_id,
                    event,
                    &mut specialty_rx,
                    &mut user_rx,
                    &mut subscribed,
                    &mut sender,
                )
                .await;
                if outcome.is_err() {
                    break;
                }
            }
            outbound = recv_published(specialty_rx.as_mut()) => {
                match outbound {
                    Ok(published) => {
                        if sender
                            .send(Message::Text(published.payload.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("realtime connection {} lagged by {}", connection_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        specialty_rx = None;
                    }
                }
            }
            outbound = recv_published(user_rx.as_mut()) => {
                match outbound {
                    Ok(published) => {
                        if sender
                            .send(Message::Text(published.payload.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("realtime connection {} lagged by {}", connection_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        user_rx = None;
                    }
                }
            }
        }
    }

    // Leaving a topic changes the online count for its wait estimates.
    state.registry.deregister(connection_id).await;
    if let Some(specialty) = subscribed {
        if user.role == Role::Professional {
            if let Err(err) = state.service.refresh_specialty(specialty).await {
                debug!("refresh after disconnect failed: {}", err);
            }
        }
    }
    info!("realtime connection {} closed", connection_id);
}

#[allow(clippy::too_many_arguments)]
async fn handle_client_event(
    state: &RealtimeState,
    user: &AuthUser,
    connection_id: Uuid,
    event: SpecialtyClientEvent,
    specialty_rx: &mut Option<broadcast::Receiver<Published>>,
    user_rx: &mut Option<broadcast::Receiver<Published>>,
    subscribed: &mut Option<Specialty>,
    sender: &mut SplitSink<WebSocket, Message>,
) -> Result<(), ()> {
    match event {
        SpecialtyClientEvent::JoinSpecialty { specialty } => {
            if let Err(err) = authorize_topic(user, specialty) {
                return reply(sender, &ServerEvent::error(&err)).await;
            }

            *specialty_rx = Some(state.broadcaster.subscribe_specialty(specialty));
            *subscribed = Some(specialty);
            state
                .registry
                .set_specialty(connection_id, Some(specialty))
                .await;

            if user.role == Role::Professional {
                // The online count changed, so wait estimates did too; the
                // refreshed snapshot reaches this subscriber via the topic.
                if let Err(err) = state.service.refresh_specialty(specialty).await {
                    return reply(sender, &ServerEvent::error(&err)).await;
                }
            } else {
                match state.service.snapshot(specialty).await {
                    Ok(snapshot) => {
                        return reply(sender, &ServerEvent::QueueStatus { snapshot }).await
                    }
                    Err(err) => return reply(sender, &ServerEvent::error(&err)).await,
                }
            }
        }
        SpecialtyClientEvent::LeaveSpecialty => {
            let left = subscribed.take();
            *specialty_rx = None;
            state.registry.set_specialty(connection_id, None).await;
            if let Some(specialty) = left {
                if user.role == Role::Professional {
                    if let Err(err) = state.service.refresh_specialty(specialty).await {
                        debug!("refresh after leave failed: {}", err);
                    }
                }
            }
        }
        SpecialtyClientEvent::JoinUserChannel => {
            *user_rx = Some(state.broadcaster.subscribe_user(user.id).await);
        }
        SpecialtyClientEvent::ClaimConsultation {
            consultation_id,
            specialty,
        } => match state.service.claim(user, consultation_id, specialty).await {
            Ok(consultation) => {
                return reply(sender, &ServerEvent::ConsultationClaimed { consultation }).await
            }
            Err(err) => return reply(sender, &ServerEvent::error(&err)).await,
        },
        SpecialtyClientEvent::FinishConsultation {
            consultation_id,
            notes,
        } => match state.service.finish(user, consultation_id, notes).await {
            Ok(consultation) => {
                return reply(sender, &ServerEvent::ConsultationFinished { consultation }).await
            }
            Err(err) => return reply(sender, &ServerEvent::error(&err)).await,
        },
        SpecialtyClientEvent::RefreshQueue { specialty } => {
            match state.service.snapshot(specialty).await {
                Ok(snapshot) => {
                    return reply(sender, &ServerEvent::QueueStatus { snapshot }).await
                }
                Err(err) => return reply(sender, &ServerEvent::error(&err)).await,
            }
        }
    }
    Ok(())
}

/// Specialty topics are for the professionals and admins working them.
fn authorize_topic(user: &AuthUser, specialty: Specialty) -> Result<(), CoreError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Professional => {
            if user.dispatch_specialty() == Some(specialty) {
                Ok(())
            } else {
                Err(CoreError::Forbidden(
                    "professionals subscribe to their own specialty".to_string(),
                ))
            }
        }
        Role::Patient => Err(CoreError::Forbidden(
            "patients observe through their user channel".to_string(),
        )),
    }
}

async fn reply(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), ()> {
    send_event(sender, event).await.map_err(|_| ())
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let Ok(payload) = serde_json::to_string(event) else {
        return Ok(());
    };
    sender.send(Message::Text(payload.into())).await
}

async fn recv_published(
    rx: Option<&mut broadcast::Receiver<Published>>,
) -> Result<Published, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
