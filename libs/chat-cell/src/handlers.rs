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
use shared_models::auth::AuthUser;
use shared_realtime::{ChatClientEvent, ConnectionRegistry, Published, ServerEvent};
use shared_utils::extractor::authenticate_connection;

use crate::services::chat::ChatService;

#[derive(Clone)]
pub struct ChatState {
    pub config: Arc<AppConfig>,
    pub chat: Arc<ChatService>,
    pub registry: ConnectionRegistry,
}

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Chat channel endpoint, one socket per consultation. Identity is checked
/// before the upgrade and the connection is refused when unverifiable.
pub async fn chat_ws_handler(
    Path(consultation_id): Path<Uuid>,
    Query(auth): Query<WsAuthQuery>,
    State(state): State<ChatState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match authenticate_connection(&headers, auth.token.as_deref(), &state.config) {
        Ok(user) => user,
        Err(err) => {
            warn!("refusing chat connection: {}", err);
            return err.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_chat_socket(socket, state, consultation_id, user))
}

async fn handle_chat_socket(
    socket: WebSocket,
    state: ChatState,
    consultation_id: Uuid,
    user: AuthUser,
) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    if let Err(err) = state.registry.register(connection_id, &user).await {
        let _ = send_event(&mut sender, &ServerEvent::error(&err)).await;
        return;
    }

    // Membership check up front; failure is reported on the channel but
    // does not sever it.
    let authorized = match state.chat.authorize(&user, consultation_id).await {
        Ok(_) => true,
        Err(err) => {
            let _ = send_event(&mut sender, &ServerEvent::error(&err)).await;
            false
        }
    };

    let mut chat_rx: Option<broadcast::Receiver<Published>> = None;
    if authorized {
        match state.chat.join(consultation_id).await {
            Ok((rx, history)) => {
                // Full ordered history lands before any live message.
                if send_event(&mut sender, &ServerEvent::MessageHistory { messages: history })
                    .await
                    .is_err()
                {
                    state.registry.deregister(connection_id).await;
                    return;
                }
                chat_rx = Some(rx);
                state
                    .chat
                    .announce(
                        consultation_id,
                        Some(connection_id),
                        &ServerEvent::ParticipantJoined { user_id: user.id },
                    )
                    .await;
            }
            Err(err) => {
                let _ = send_event(&mut sender, &ServerEvent::error(&err)).await;
            }
        }
    }

    info!(
        "chat connection {} opened for user {} on consultation {}",
        connection_id, user.id, consultation_id
    );

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                let Some(Ok(message)) = inbound else { break };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let event = match serde_json::from_str::<ChatClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!("ignoring malformed chat event: {}", e);
                        continue;
                    }
                };

                match event {
                    ChatClientEvent::SendMessage { text } => {
                        if chat_rx.is_none() {
                            let err = shared_models::error::CoreError::Forbidden(
                                "not joined to this chat".to_string(),
                            );
                            if send_event(&mut sender, &ServerEvent::error(&err))
                                .await
                                .is_err()
                            {
                                break;
                            }
                            continue;
                        }
                        if let Err(err) =
                            state.chat.send(consultation_id, &user, &text).await
                        {
                            if send_event(&mut sender, &ServerEvent::error(&err))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        // The echo arrives through the relay with its
                        // durable id and timestamp.
                    }
                }
            }
            outbound = recv_published(chat_rx.as_mut()) => {
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
                        debug!("chat connection {} lagged by {}", connection_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        chat_rx = None;
                    }
                }
            }
        }
    }

    if chat_rx.is_some() {
        state
            .chat
            .announce(
                consultation_id,
                Some(connection_id),
                &ServerEvent::ParticipantLeft { user_id: user.id },
            )
            .await;
    }
    state.registry.deregister(connection_id).await;
    info!("chat connection {} closed", connection_id);
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
