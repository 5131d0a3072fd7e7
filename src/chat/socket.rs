//! Street chat socket session
//!
//! ## Protocol
//!
//! Client → server:
//! - `{"type":"streetGroup:join","groupId":"..."}` enter a street's room.
//!   Refused joins are dropped without a reply.
//! - `{"type":"streetGroup:message","groupId":"...","text":"..."}` post to a
//!   street. Same rules as `POST /streets/:groupId/chat`.
//!
//! Server → client:
//! - `{"type":"streetGroup:message","message":{...}}` for every message
//!   posted to a joined room, the sender's own included. Delivery stops when
//!   the member leaves the street; a later join is checked afresh.

use bson::oid::ObjectId;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::{ChatMessageView, StreetChat};
use crate::types::Result;

/// WebSocket type after upgrade
pub type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Frame received from a client
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "streetGroup:join")]
    Join {
        #[serde(rename = "groupId")]
        group_id: String,
    },
    #[serde(rename = "streetGroup:message")]
    Message {
        #[serde(rename = "groupId")]
        group_id: String,
        text: String,
    },
}

/// Frame sent to a client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "streetGroup:message")]
    Message { message: ChatMessageView },
}

/// Drive one authenticated socket until it closes
pub async fn run_session(ws: HyperWebSocket, chat: Arc<StreetChat>, user_id: ObjectId) -> Result<()> {
    let (mut sender, mut receiver) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let mut joined: HashMap<ObjectId, JoinHandle<()>> = HashMap::new();

    info!("Chat socket opened for user {}", user_id);

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                let Some(frame) = frame else { break };
                let json = serde_json::to_string(&frame)?;
                if sender.send(WsMessage::Text(json)).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => {
                                handle_frame(&chat, user_id, frame, &mut joined, &out_tx).await;
                            }
                            Err(e) => debug!("Ignoring malformed chat frame: {}", e),
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("Chat socket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    for (_, task) in joined.drain() {
        task.abort();
    }
    chat.rooms().prune();
    info!("Chat socket closed for user {}", user_id);
    Ok(())
}

async fn handle_frame(
    chat: &Arc<StreetChat>,
    user_id: ObjectId,
    frame: ClientFrame,
    joined: &mut HashMap<ObjectId, JoinHandle<()>>,
    out: &mpsc::UnboundedSender<ServerFrame>,
) {
    match frame {
        ClientFrame::Join { group_id } => {
            let Ok(street_group_id) = ObjectId::parse_str(&group_id) else {
                return;
            };
            if joined
                .get(&street_group_id)
                .is_some_and(|task| !task.is_finished())
            {
                return;
            }
            if let Some(rx) = chat.join_room(user_id, street_group_id).await {
                debug!("User {} joined room {}", user_id, street_group_id);
                let task = forward(Arc::clone(chat), user_id, street_group_id, rx, out.clone());
                joined.insert(street_group_id, tokio::spawn(task));
            }
        }
        ClientFrame::Message { group_id, text } => {
            let Ok(street_group_id) = ObjectId::parse_str(&group_id) else {
                return;
            };
            if let Err(e) = chat.post(user_id, street_group_id, &text).await {
                debug!("Chat post by {} to {} refused: {}", user_id, street_group_id, e);
            }
        }
    }
}

/// Copy a room's broadcasts onto the socket's outbound queue while the user
/// is still a member
async fn forward(
    chat: Arc<StreetChat>,
    user_id: ObjectId,
    street_group_id: ObjectId,
    mut rx: broadcast::Receiver<ChatMessageView>,
    out: mpsc::UnboundedSender<ServerFrame>,
) {
    while let Some(message) = chat.next_for(user_id, street_group_id, &mut rx).await {
        if out.send(ServerFrame::Message { message }).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frames_parse() {
        let join: ClientFrame =
            serde_json::from_str(r#"{"type":"streetGroup:join","groupId":"abc"}"#).unwrap();
        assert!(matches!(join, ClientFrame::Join { group_id } if group_id == "abc"));

        let msg: ClientFrame = serde_json::from_str(
            r#"{"type":"streetGroup:message","groupId":"abc","text":"hi"}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientFrame::Message { text, .. } if text == "hi"));

        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"other"}"#).is_err());
    }

    #[test]
    fn test_server_frame_shape() {
        let frame = ServerFrame::Message {
            message: ChatMessageView {
                id: "1".into(),
                street_group_id: "2".into(),
                sender_id: "3".into(),
                sender_name: "Ada".into(),
                text: "hi".into(),
                created_at: "2024-01-01T00:00:00+00:00".into(),
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "streetGroup:message");
        assert_eq!(json["message"]["streetGroupId"], "2");
        assert_eq!(json["message"]["senderName"], "Ada");
    }
}
