use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use hitit_collab::{ConnectionHandle, ConnectionId, RoomDirectory, RoomEvent, RoomMessage};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    context::ServerContext,
    serialized::{ActiveUser, ToSerialized},
    Router,
};

/// Messages a client sends over the collaboration socket
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ClientMessage {
    /// Enter the live room of a jam, leaving any previous one
    #[serde(rename_all = "camelCase")]
    JoinJam {
        jam_id: i32,
        user_id: i32,
        user_name: String,
    },
    #[serde(rename_all = "camelCase")]
    CursorMove {
        jam_id: i32,
        user_id: i32,
        user_name: String,
        x: f64,
        y: f64,
        timestamp: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    TrackUpdate {
        jam_id: i32,
        track_id: Value,
        updates: Value,
    },
    #[serde(rename_all = "camelCase")]
    PlaybackSync {
        jam_id: i32,
        is_playing: bool,
        current_time: f64,
    },
}

/// Messages the server sends over the collaboration socket
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ServerMessage {
    /// Someone joined the room
    #[serde(rename_all = "camelCase")]
    UserJoined {
        user_id: i32,
        user_name: String,
        timestamp: i64,
    },
    /// The other members of the room, sent right after joining
    RoomState {
        users: Vec<ActiveUser>,
        timestamp: i64,
    },
    /// Someone left the room
    #[serde(rename_all = "camelCase")]
    UserLeft {
        user_id: i32,
        user_name: String,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    CursorMove {
        user_id: i32,
        user_name: String,
        x: f64,
        y: f64,
        timestamp: i64,
    },
    /// A track's mixer settings changed
    #[serde(rename_all = "camelCase")]
    TrackUpdate {
        #[schema(value_type = Object)]
        track_id: Value,
        #[schema(value_type = Object)]
        updates: Value,
        user_id: i32,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    PlaybackSync {
        is_playing: bool,
        current_time: f64,
        user_id: i32,
        timestamp: i64,
    },
}

impl From<ClientMessage> for RoomMessage {
    fn from(value: ClientMessage) -> Self {
        match value {
            ClientMessage::JoinJam {
                jam_id,
                user_id,
                user_name,
            } => Self::JoinJam {
                jam_id,
                user_id,
                user_name,
            },
            ClientMessage::CursorMove {
                jam_id,
                user_id,
                user_name,
                x,
                y,
                timestamp,
            } => Self::CursorMove {
                jam_id,
                user_id,
                user_name,
                x,
                y,
                timestamp,
            },
            ClientMessage::TrackUpdate {
                jam_id,
                track_id,
                updates,
            } => Self::TrackUpdate {
                jam_id,
                track_id,
                updates,
            },
            ClientMessage::PlaybackSync {
                jam_id,
                is_playing,
                current_time,
            } => Self::PlaybackSync {
                jam_id,
                is_playing,
                current_time,
            },
        }
    }
}

/// Converts relayed events, handing back the control events that aren't sent as JSON
impl TryFrom<RoomEvent> for ServerMessage {
    type Error = RoomEvent;

    fn try_from(value: RoomEvent) -> Result<Self, Self::Error> {
        let message = match value {
            RoomEvent::UserJoined {
                user_id,
                user_name,
                timestamp,
            } => Self::UserJoined {
                user_id,
                user_name,
                timestamp,
            },
            RoomEvent::RoomState { users, timestamp } => Self::RoomState {
                users: users.to_serialized(),
                timestamp,
            },
            RoomEvent::UserLeft {
                user_id,
                user_name,
                timestamp,
            } => Self::UserLeft {
                user_id,
                user_name,
                timestamp,
            },
            RoomEvent::CursorMove {
                user_id,
                user_name,
                x,
                y,
                timestamp,
            } => Self::CursorMove {
                user_id,
                user_name,
                x,
                y,
                timestamp,
            },
            RoomEvent::TrackUpdate {
                track_id,
                updates,
                user_id,
                timestamp,
            } => Self::TrackUpdate {
                track_id,
                updates,
                user_id,
                timestamp,
            },
            RoomEvent::PlaybackSync {
                is_playing,
                current_time,
                user_id,
                timestamp,
            } => Self::PlaybackSync {
                is_playing,
                current_time,
                user_id,
                timestamp,
            },
            control @ (RoomEvent::Ping | RoomEvent::Terminate) => return Err(control),
        };

        Ok(message)
    }
}

#[utoipa::path(
    get,
    path = "/collaboration",
    tag = "collaboration",
    responses(
        (
            status = 101,
            description = "Upgrades to a WebSocket that relays live edits between members of a jam",
            body = ServerMessage
        )
    )
)]
async fn collaboration(ws: WebSocketUpgrade, context: ServerContext) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, context))
}

async fn handle_socket(socket: WebSocket, context: ServerContext) {
    let rooms = context.collab.rooms.clone();
    let handle = rooms.connect();
    let id = handle.id();
    let (sender, receiver) = socket.split();

    info!("Collaboration connection {} opened", id);

    let mut write_task = tokio::spawn(write_events(sender, handle));
    let mut read_task = tokio::spawn(read_messages(receiver, rooms.clone(), id));

    // The other task is awaited so nothing it relays can land after the disconnect
    tokio::select! {
        _ = &mut write_task => {
            read_task.abort();
            let _ = read_task.await;
        }
        _ = &mut read_task => {
            write_task.abort();
            let _ = write_task.await;
        }
    }

    rooms.disconnect(id);
    info!("Collaboration connection {} closed", id);
}

/// Forwards events from the directory to the socket until the connection ends
async fn write_events(mut sender: SplitSink<WebSocket, Message>, mut handle: ConnectionHandle) {
    while let Some(event) = handle.next().await {
        let message = match ServerMessage::try_from(event) {
            Ok(message) => match serde_json::to_string(&message) {
                Ok(text) => Message::Text(text),
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            },
            Err(RoomEvent::Terminate) => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            Err(_) => Message::Ping(vec![]),
        };

        if sender.send(message).await.is_err() {
            break;
        }
    }
}

/// Hands messages from the socket to the directory until the client goes away
async fn read_messages(
    mut receiver: SplitStream<WebSocket>,
    rooms: Arc<RoomDirectory>,
    id: ConnectionId,
) {
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => rooms.relay(id, message.into()),
                Err(e) => warn!("Dropping message from connection {}: {}", id, e),
            },
            Message::Pong(_) => rooms.pong(id),
            Message::Close(_) => break,
            _ => {}
        }
    }
}

pub fn router() -> Router {
    Router::new().route("/collaboration", get(collaboration))
}

#[cfg(test)]
mod tests {
    use hitit_collab::ActiveUser as CollabActiveUser;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_client_messages() {
        let message: ClientMessage = serde_json::from_value(json!({
            "type": "join_jam",
            "jamId": 4,
            "userId": 9,
            "userName": "alice"
        }))
        .unwrap();

        assert_eq!(
            RoomMessage::from(message),
            RoomMessage::JoinJam {
                jam_id: 4,
                user_id: 9,
                user_name: "alice".to_string()
            }
        );

        let message: ClientMessage = serde_json::from_value(json!({
            "type": "playback_sync",
            "jamId": 4,
            "isPlaying": true,
            "currentTime": 31.5
        }))
        .unwrap();

        assert!(matches!(
            message,
            ClientMessage::PlaybackSync {
                is_playing: true,
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_message_types() {
        let result = serde_json::from_value::<ClientMessage>(json!({
            "type": "delete_everything",
            "jamId": 4
        }));

        assert!(result.is_err());
    }

    #[test]
    fn serializes_server_messages() {
        let message = ServerMessage::try_from(RoomEvent::RoomState {
            users: vec![CollabActiveUser {
                user_id: 2,
                user_name: "bob".to_string(),
            }],
            timestamp: 1000,
        })
        .unwrap();

        let resent = message.clone();

        assert_eq!(
            serde_json::to_value(resent).unwrap(),
            serde_json::to_value(&message).unwrap()
        );
        assert_eq!(
            serde_json::to_value(message).unwrap(),
            json!({
                "type": "room_state",
                "users": [{ "userId": 2, "userName": "bob" }],
                "timestamp": 1000
            })
        );

        let message = ServerMessage::try_from(RoomEvent::TrackUpdate {
            track_id: json!("drums"),
            updates: json!({ "volume": 0.8 }),
            user_id: 1,
            timestamp: 5,
        })
        .unwrap();
        let value = serde_json::to_value(message).unwrap();

        assert_eq!(value["type"], "track_update");
        assert_eq!(value["trackId"], "drums");
        assert_eq!(value["userId"], 1);
    }

    #[test]
    fn control_events_are_not_serialized() {
        assert!(matches!(
            ServerMessage::try_from(RoomEvent::Ping),
            Err(RoomEvent::Ping)
        ));
        assert!(matches!(
            ServerMessage::try_from(RoomEvent::Terminate),
            Err(RoomEvent::Terminate)
        ));
    }
}
