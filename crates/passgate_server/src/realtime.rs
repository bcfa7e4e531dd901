//! Realtime channel over WebSocket.
//!
//! Frames are JSON `{"event": ..., "data": {...}}`. Every client event is
//! authorized with the same gate as HTTP requests; a denial answers with a
//! `rejected` event carrying the gate's code and message. Allowed messages are
//! relayed to every joined socket through a broadcast channel. Messages are
//! not persisted.
//!
//! A joined socket is re-authorized before each relayed message is forwarded.
//! Once the subscriber is denied it gets one `rejected` event and is dropped
//! from the relay until it joins again.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::Extension;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use passgate_core::types::{IdentityId, Role, RosterEntry};
use passgate_core::{Admission, Verdict};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::selection::parse_selected_json;
use crate::state::AppState;

/// Longest message body accepted from a client, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join")]
    Join {
        #[serde(default)]
        selected_user_id: Option<serde_json::Value>,
    },
    #[serde(rename = "message:new")]
    NewMessage {
        #[serde(default)]
        selected_user_id: Option<serde_json::Value>,
        content: String,
    },
}

/// A chat message as relayed to joined sockets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayMessage {
    pub id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author_id: IdentityId,
    pub author_display_name: String,
    pub author_role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "joined")]
    Joined { identity: RosterEntry },
    #[serde(rename = "rejected")]
    Rejected {
        code: &'static str,
        message: &'static str,
    },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "message:new")]
    NewMessage(RelayMessage),
}

/// What one client event produced.
#[derive(Debug, Default, PartialEq)]
pub struct Dispatch {
    /// Event sent back to the originating socket only.
    pub reply: Option<ServerEvent>,
    /// Identity the socket is now subscribed as.
    pub joined: Option<IdentityId>,
    /// Message handed to the relay.
    pub relayed: Option<RelayMessage>,
}

/// Authorize and apply one client event.
pub async fn dispatch(state: &AppState, event: ClientEvent) -> Dispatch {
    let selected = match &event {
        ClientEvent::Join { selected_user_id } | ClientEvent::NewMessage { selected_user_id, .. } => {
            selected_user_id.as_ref()
        }
    };
    let identity_id = match parse_selected_json(selected) {
        Ok(id) => id,
        Err(e) => {
            return Dispatch {
                reply: Some(ServerEvent::Error {
                    message: e.to_string(),
                }),
                ..Default::default()
            }
        }
    };

    let admission = match state.gate.authorize(identity_id).await {
        Verdict::Allow(admission) => admission,
        Verdict::Deny(reason) => {
            tracing::debug!(identity = %identity_id, code = reason.code(), "realtime event denied");
            return Dispatch {
                reply: Some(ServerEvent::Rejected {
                    code: reason.code(),
                    message: reason.message(),
                }),
                ..Default::default()
            };
        }
    };

    match event {
        ClientEvent::Join { .. } => Dispatch {
            reply: Some(ServerEvent::Joined {
                identity: RosterEntry::from(&admission.identity),
            }),
            joined: Some(admission.identity.id),
            relayed: None,
        },
        ClientEvent::NewMessage { content, .. } => relay_message(state, admission, content),
    }
}

fn relay_message(state: &AppState, admission: Admission, content: String) -> Dispatch {
    let content = content.trim();
    if content.is_empty() || content.chars().count() > MAX_MESSAGE_CHARS {
        return Dispatch {
            reply: Some(ServerEvent::Error {
                message: "Invalid message content".into(),
            }),
            ..Default::default()
        };
    }

    let message = RelayMessage {
        id: state.next_message_id(),
        content: content.to_string(),
        created_at: state.clock.now(),
        author_id: admission.identity.id,
        author_display_name: admission.identity.display_name,
        author_role: admission.identity.role,
    };
    // No subscribers is not an error.
    let _ = state.relay.send(message.clone());
    Dispatch {
        reply: None,
        joined: None,
        relayed: Some(message),
    }
}

/// Decide what a joined socket receives for one relayed message.
///
/// `subscriber` is the identity the socket joined as. A denial clears it and
/// yields a single `rejected` event; with no subscriber nothing is delivered.
pub async fn forward_relay(
    state: &AppState,
    subscriber: &mut Option<IdentityId>,
    message: RelayMessage,
) -> Option<ServerEvent> {
    let identity_id = (*subscriber)?;
    match state.gate.authorize(identity_id).await {
        Verdict::Allow(_) => Some(ServerEvent::NewMessage(message)),
        Verdict::Deny(reason) => {
            tracing::info!(identity = %identity_id, code = reason.code(), "realtime subscriber lost access");
            *subscriber = None;
            Some(ServerEvent::Rejected {
                code: reason.code(),
                message: reason.message(),
            })
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, Extension(state): Extension<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut relay_rx = state.relay.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let subscription: Arc<Mutex<Option<IdentityId>>> = Arc::new(Mutex::new(None));
    tracing::debug!("realtime connection opened");

    let recv_state = state.clone();
    let recv_subscription = subscription.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else { continue };
            let outcome = match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => dispatch(&recv_state, event).await,
                Err(e) => Dispatch {
                    reply: Some(ServerEvent::Error {
                        message: format!("Malformed event: {e}"),
                    }),
                    ..Default::default()
                },
            };
            if let Some(identity_id) = outcome.joined {
                *recv_subscription.lock().await = Some(identity_id);
            }
            if let Some(reply) = outcome.reply {
                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(event) => event,
                    None => break,
                },
                relayed = relay_rx.recv() => match relayed {
                    Ok(message) => {
                        let mut subscriber = subscription.lock().await;
                        match forward_relay(&state, &mut subscriber, message).await {
                            Some(event) => event,
                            None => continue,
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "realtime subscriber lagged; messages dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            let Ok(text) = serde_json::to_string(&event) else { continue };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut recv_task => {},
        _ = &mut send_task => {},
    }
    recv_task.abort();
    send_task.abort();
    tracing::debug!("realtime connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_decode() {
        let join: ClientEvent =
            serde_json::from_value(json!({"event": "join", "data": {"selected_user_id": 4}})).unwrap();
        assert!(matches!(join, ClientEvent::Join { selected_user_id: Some(_) }));

        let msg: ClientEvent = serde_json::from_value(
            json!({"event": "message:new", "data": {"selected_user_id": "4", "content": "hi"}}),
        )
        .unwrap();
        assert!(matches!(msg, ClientEvent::NewMessage { ref content, .. } if content == "hi"));
    }

    #[test]
    fn rejected_event_shape() {
        let event = ServerEvent::Rejected {
            code: "no_valid_pass",
            message: "Your access pass has expired or is not allowed.",
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "rejected");
        assert_eq!(value["data"]["code"], "no_valid_pass");
    }
}
