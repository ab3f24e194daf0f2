//! Real-time chat bridge.
//!
//! One WebSocket connection per client. After joining a chat the client
//! receives every `message` broadcast for it; `typing`/`stopTyping` go to the
//! other subscribers only. Messages sent here persist through the same chat
//! store as the REST path.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::request::Parts,
    response::IntoResponse,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::auth;
use crate::db::{chats, ChatMessage, User, MESSAGE_TYPE_TEXT};
use crate::AppState;

/// Per-chat broadcast capacity; slow consumers lag and drop.
const CHANNEL_CAPACITY: usize = 64;

/// A server-emitted event on the wire: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum WsEvent {
    JoinedChat(String),
    Message(ChatMessage),
    Typing(String),
    StopTyping(String),
    Error(String),
}

impl WsEvent {
    pub fn message(message: &ChatMessage) -> Self {
        WsEvent::Message(message.clone())
    }
}

/// Client-emitted events.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum ClientEvent {
    JoinChat(String),
    #[serde(rename_all = "camelCase")]
    SendMessage { chat_id: String, content: String },
    Typing(String),
    StopTyping(String),
}

/// An event tagged with the connection it should skip, if any.
#[derive(Debug, Clone)]
struct Envelope {
    exclude: Option<u64>,
    event: WsEvent,
}

/// Registry of per-chat broadcast channels.
pub struct ChatHub {
    channels: DashMap<String, broadcast::Sender<Envelope>>,
    next_conn_id: AtomicU64,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    fn subscribe(&self, chat_id: &str) -> broadcast::Receiver<Envelope> {
        self.channels
            .entry(chat_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send an event to a chat's subscribers. `exclude` skips one connection
    /// (the typing sender); `None` reaches everyone.
    pub fn broadcast(&self, chat_id: &str, event: WsEvent, exclude: Option<u64>) {
        if let Some(tx) = self.channels.get(chat_id) {
            // Err just means nobody is connected right now.
            let _ = tx.send(Envelope { exclude, event });
        }
    }

    /// Drop a chat's channel once the last subscriber is gone.
    fn release(&self, chat_id: &str) {
        self.channels
            .remove_if(chat_id, |_, tx| tx.receiver_count() == 0);
    }
}

#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

/// WebSocket endpoint for real-time chat. The token travels as a bearer
/// header, the session cookie, or a `token` query parameter.
pub async fn chat_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
    parts: Parts,
) -> impl IntoResponse {
    let token = auth::extract_token(&parts).or(query.token);
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state, token))
}

async fn handle_chat_socket(socket: WebSocket, state: Arc<AppState>, token: Option<String>) {
    let (mut sink, mut stream) = socket.split();

    // Authenticate before anything else; on failure emit a distinguishable
    // error event and close.
    let user = match token {
        Some(token) => auth::resolve_token(&state, &token).await.ok(),
        None => None,
    };
    let user = match user {
        Some(user) => user,
        None => {
            let _ = sink
                .send(event_frame(&WsEvent::Error("Authentication error".into())))
                .await;
            return;
        }
    };

    debug!("User connected to chat socket: {}", user.id);
    let conn_id = state.hub.next_conn_id();

    // All outbound frames funnel through one writer task.
    let (out_tx, mut out_rx) = mpsc::channel::<WsEvent>(CHANNEL_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            if sink.send(event_frame(&event)).await.is_err() {
                break;
            }
        }
    });

    // Chat id -> forwarder task pumping that chat's broadcasts to the writer.
    let mut joined: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(_) => {
                let _ = out_tx.send(WsEvent::Error("Invalid event".into())).await;
                continue;
            }
        };

        if let Err(message) =
            dispatch(&state, &user, conn_id, event, &out_tx, &mut joined).await
        {
            let _ = out_tx.send(WsEvent::Error(message)).await;
        }
    }

    for (chat_id, handle) in joined {
        handle.abort();
        let _ = handle.await;
        state.hub.release(&chat_id);
    }
    drop(out_tx);
    let _ = writer.await;
    debug!("User disconnected from chat socket: {}", user.id);
}

async fn dispatch(
    state: &Arc<AppState>,
    user: &User,
    conn_id: u64,
    event: ClientEvent,
    out_tx: &mpsc::Sender<WsEvent>,
    joined: &mut HashMap<String, JoinHandle<()>>,
) -> Result<(), String> {
    match event {
        ClientEvent::JoinChat(chat_id) => {
            require_participant(state, user, &chat_id).await?;
            if !joined.contains_key(&chat_id) {
                let mut rx = state.hub.subscribe(&chat_id);
                let forward_tx = out_tx.clone();
                let handle = tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(envelope) => {
                                if envelope.exclude == Some(conn_id) {
                                    continue;
                                }
                                if forward_tx.send(envelope.event).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Chat subscriber lagged, dropped {} events", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
                joined.insert(chat_id.clone(), handle);
            }
            let _ = out_tx.send(WsEvent::JoinedChat(chat_id)).await;
            Ok(())
        }
        ClientEvent::SendMessage { chat_id, content } => {
            require_participant(state, user, &chat_id).await?;
            let message = chats::append_message(
                &state.db,
                &chat_id,
                &user.id,
                &content,
                MESSAGE_TYPE_TEXT,
            )
            .await
            .map_err(|_| "Error sending message".to_string())?;
            // Everyone in the chat sees the message, the sender included.
            state.hub.broadcast(&chat_id, WsEvent::message(&message), None);
            Ok(())
        }
        ClientEvent::Typing(chat_id) => {
            require_participant(state, user, &chat_id).await?;
            state
                .hub
                .broadcast(&chat_id, WsEvent::Typing(user.id.clone()), Some(conn_id));
            Ok(())
        }
        ClientEvent::StopTyping(chat_id) => {
            require_participant(state, user, &chat_id).await?;
            state.hub.broadcast(
                &chat_id,
                WsEvent::StopTyping(user.id.clone()),
                Some(conn_id),
            );
            Ok(())
        }
    }
}

async fn require_participant(
    state: &Arc<AppState>,
    user: &User,
    chat_id: &str,
) -> Result<(), String> {
    let chat = chats::find_by_id(&state.db, chat_id)
        .await
        .map_err(|_| "Chat not found".to_string())?
        .ok_or_else(|| "Chat not found".to_string())?;
    if !chat.is_participant(&user.id) {
        return Err("Not a participant of this chat".to_string());
    }
    Ok(())
}

fn event_frame(event: &WsEvent) -> Message {
    // WsEvent serialization cannot fail.
    Message::Text(serde_json::to_string(event).unwrap_or_default().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse() {
        let event: ClientEvent = serde_json::from_str(r#"{"event":"joinChat","data":"c1"}"#).unwrap();
        assert!(matches!(event, ClientEvent::JoinChat(id) if id == "c1"));

        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"sendMessage","data":{"chatId":"c1","content":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ClientEvent::SendMessage { chat_id, content } if chat_id == "c1" && content == "hi"
        ));

        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"unknown"}"#).is_err());
    }

    #[test]
    fn server_events_serialize_with_event_tag() {
        let json = serde_json::to_value(WsEvent::JoinedChat("c1".into())).unwrap();
        assert_eq!(json["event"], "joinedChat");
        assert_eq!(json["data"], "c1");

        let json = serde_json::to_value(WsEvent::Error("Chat not found".into())).unwrap();
        assert_eq!(json["event"], "error");
    }

    #[test]
    fn typing_envelope_excludes_sender() {
        let hub = ChatHub::new();
        let mut rx = hub.subscribe("c1");
        let sender_conn = hub.next_conn_id();

        hub.broadcast("c1", WsEvent::Typing("u1".into()), Some(sender_conn));
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.exclude, Some(sender_conn));
        assert!(matches!(envelope.event, WsEvent::Typing(id) if id == "u1"));
    }

    #[test]
    fn hub_releases_idle_channels() {
        let hub = ChatHub::new();
        let rx = hub.subscribe("c1");
        hub.release("c1");
        assert!(hub.channels.contains_key("c1"));

        drop(rx);
        hub.release("c1");
        assert!(!hub.channels.contains_key("c1"));
    }

    #[test]
    fn broadcast_without_subscribers_is_a_noop() {
        let hub = ChatHub::new();
        hub.broadcast("nobody", WsEvent::Typing("u1".into()), None);
    }

    #[tokio::test]
    async fn rest_and_socket_sends_share_one_message_log() {
        use axum::extract::State;
        use axum::Json;

        use crate::api::auth::AuthUser;
        use crate::api::chats::{send_message, SendMessageRequest};
        use crate::api::test_support::test_state;
        use crate::db::users::test_support::insert_user;

        let state = test_state().await;
        let buyer = insert_user(&state.db, "buyer@example.com").await;
        let seller = insert_user(&state.db, "seller@example.com").await;
        let chat = chats::create(&state.db, &buyer.id, &seller.id).await.unwrap();

        send_message(
            State(state.clone()),
            AuthUser {
                user: buyer.clone(),
            },
            Json(SendMessageRequest {
                chat_id: chat.id.clone(),
                content: "is it available?".into(),
            }),
        )
        .await
        .unwrap();

        let (out_tx, _out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut joined = HashMap::new();
        dispatch(
            &state,
            &seller,
            state.hub.next_conn_id(),
            ClientEvent::SendMessage {
                chat_id: chat.id.clone(),
                content: "yes, still here".into(),
            },
            &out_tx,
            &mut joined,
        )
        .await
        .unwrap();

        // Both paths land in the same per-chat log, in send order.
        let messages = chats::list_messages(&state.db, &chat.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message.content, "is it available?");
        assert_eq!(messages[0].sender.id, buyer.id);
        assert_eq!(messages[1].message.content, "yes, still here");
        assert_eq!(messages[1].sender.id, seller.id);
        assert!(messages[0].message.id < messages[1].message.id);
    }

    #[tokio::test]
    async fn socket_send_requires_participation() {
        use crate::api::test_support::test_state;
        use crate::db::users::test_support::insert_user;

        let state = test_state().await;
        let buyer = insert_user(&state.db, "buyer@example.com").await;
        let seller = insert_user(&state.db, "seller@example.com").await;
        let outsider = insert_user(&state.db, "lurker@example.com").await;
        let chat = chats::create(&state.db, &buyer.id, &seller.id).await.unwrap();

        let (out_tx, _out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut joined = HashMap::new();
        let err = dispatch(
            &state,
            &outsider,
            state.hub.next_conn_id(),
            ClientEvent::SendMessage {
                chat_id: chat.id.clone(),
                content: "let me in".into(),
            },
            &out_tx,
            &mut joined,
        )
        .await
        .unwrap_err();
        assert_eq!(err, "Not a participant of this chat");
        assert!(chats::list_messages(&state.db, &chat.id)
            .await
            .unwrap()
            .is_empty());
    }
}
