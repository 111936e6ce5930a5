use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
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

use shared_config::AppConfig;
use shared_models::error::CoreError;
use shared_realtime::{
    Broadcaster, ConnectionRegistry, Published, ServerEvent, VideoClientEvent,
};
use shared_utils::extractor::authenticate_connection;

use crate::services::room::VideoRoomService;
use crate::services::signaling::SignalingRelay;

#[derive(Clone)]
pub struct VideoState {
    pub config: Arc<AppConfig>,
    pub rooms: Arc<VideoRoomService>,
    pub relay: SignalingRelay,
    pub registry: ConnectionRegistry,
    pub broadcaster: Broadcaster,
}

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Video channel endpoint. Identity is verified before the upgrade; an
/// unverifiable connection is refused outright (fail closed).
pub async fn video_ws_handler(
    Path(room_id): Path<String>,
    Query(auth): Query<WsAuthQuery>,
    State(state): State<VideoState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match authenticate_connection(&headers, auth.token.as_deref(), &state.config) {
        Ok(user) => user,
        Err(err) => {
            warn!("refusing video connection: {}", err);
            return err.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_video_socket(socket, state, room_id, user))
}

async fn handle_video_socket(
    socket: WebSocket,
    state: VideoState,
    room_id: String,
    user: shared_models::auth::AuthUser,
) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    if let Err(err) = state.registry.register(connection_id, &user).await {
        let _ = send_event(&mut sender, &ServerEvent::error(&err)).await;
        return;
    }

    info!(
        "video connection {} opened for user {} on room {}",
        connection_id, user.id, room_id
    );

    let mut room_rx: Option<broadcast::Receiver<Published>> = None;
    let mut joined = false;

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                let Some(Ok(message)) = inbound else { break };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let event = match serde_json::from_str::<VideoClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!("ignoring malformed video event: {}", e);
                        continue;
                    }
                };

                match event {
                    VideoClientEvent::JoinRoom => {
                        // Subscribe first so no event between the join
                        // broadcast and the subscription is missed; the
                        // join broadcast itself is origin-filtered.
                        if room_rx.is_none() {
                            room_rx = Some(state.broadcaster.subscribe_room(&room_id).await);
                        }
                        match state.rooms.join(&room_id, &user, connection_id).await {
                            Ok(room) => {
                                joined = true;
                                state
                                    .registry
                                    .set_room(connection_id, Some(room_id.clone()))
                                    .await;
                                let ack = ServerEvent::ParticipantsUpdated {
                                    room_id: room_id.clone(),
                                    participants: room.participants.clone(),
                                };
                                if send_event(&mut sender, &ack).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                if !joined {
                                    room_rx = None;
                                }
                                if send_event(&mut sender, &ServerEvent::error(&err))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                        }
                    }
                    VideoClientEvent::LeaveRoom => {
                        if joined {
                            if let Err(err) = state.rooms.leave(&room_id, user.id).await {
                                debug!("leave bookkeeping: {}", err);
                            }
                            joined = false;
                            room_rx = None;
                            state.registry.set_room(connection_id, None).await;
                        }
                    }
                    signaling => {
                        if !joined {
                            let err = CoreError::Forbidden(
                                "join the room before signaling".to_string(),
                            );
                            if send_event(&mut sender, &ServerEvent::error(&err))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        } else {
                            state
                                .relay
                                .forward(&room_id, connection_id, user.id, signaling)
                                .await;
                        }
                    }
                }
            }
            outbound = recv_published(room_rx.as_mut()) => {
                match outbound {
                    Ok(published) => {
                        if published.origin == Some(connection_id) {
                            continue;
                        }
                        if sender
                            .send(Message::Text(published.payload.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // At-most-once delivery: slow consumers miss events.
                        debug!("video connection {} lagged by {}", connection_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        room_rx = None;
                    }
                }
            }
        }
    }

    // Disconnect of a room participant counts as a leave.
    if joined {
        if let Err(err) = state.rooms.leave(&room_id, user.id).await {
            debug!("leave on disconnect: {}", err);
        }
    }
    state.registry.deregister(connection_id).await;
    info!("video connection {} closed", connection_id);
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
