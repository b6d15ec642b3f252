mod connection;
mod room;

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use log::{info, warn};
use serde_json::Value;

pub use connection::*;
pub use room::*;

use crate::{util::timestamp_millis, PrimaryKey};

/// Events sent to live clients
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// Someone joined the recipient's jam
    UserJoined {
        user_id: PrimaryKey,
        user_name: String,
        timestamp: i64,
    },
    /// Who else is in the jam, sent to a connection right after it joins
    RoomState {
        users: Vec<ActiveUser>,
        timestamp: i64,
    },
    UserLeft {
        user_id: PrimaryKey,
        user_name: String,
        timestamp: i64,
    },
    CursorMove {
        user_id: PrimaryKey,
        user_name: String,
        x: f64,
        y: f64,
        timestamp: i64,
    },
    /// A track's mixer settings changed, for example mute, solo, or volume
    TrackUpdate {
        track_id: Value,
        updates: Value,
        user_id: PrimaryKey,
        timestamp: i64,
    },
    PlaybackSync {
        is_playing: bool,
        current_time: f64,
        user_id: PrimaryKey,
        timestamp: i64,
    },
    /// The client should answer with a pong before the next heartbeat
    Ping,
    /// The client missed a heartbeat and must be closed
    Terminate,
}

/// Messages received from live clients
#[derive(Debug, Clone, PartialEq)]
pub enum RoomMessage {
    JoinJam {
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
        user_name: String,
    },
    CursorMove {
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
        user_name: String,
        x: f64,
        y: f64,
        /// Forwarded as is, the server's clock is used when missing
        timestamp: Option<i64>,
    },
    TrackUpdate {
        jam_id: PrimaryKey,
        track_id: Value,
        updates: Value,
    },
    PlaybackSync {
        jam_id: PrimaryKey,
        is_playing: bool,
        current_time: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUser {
    pub user_id: PrimaryKey,
    pub user_name: String,
}

/// Keeps track of live connections and the jam rooms they are in,
/// relaying messages between members of the same room.
pub struct RoomDirectory {
    me: Weak<Self>,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    rooms: DashMap<PrimaryKey, Room>,
}

impl RoomDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: Default::default(),
            rooms: Default::default(),
        })
    }

    /// Registers a new connection that isn't in any room yet
    pub fn connect(&self) -> ConnectionHandle {
        let (connection, handle) = Connection::new(self.me.clone());

        self.connections.insert(connection.id, Arc::new(connection));
        handle
    }

    /// Removes a connection and takes it out of its room. Does nothing if it is already gone.
    pub fn disconnect(&self, id: ConnectionId) {
        let Some((_, connection)) = self.connections.remove(&id) else {
            return;
        };

        if let Some(presence) = connection.take_presence() {
            self.vacate(id, presence);
        }
    }

    /// Handles a message from a connection
    pub fn relay(&self, id: ConnectionId, message: RoomMessage) {
        let Some(connection) = self.connection(id) else {
            warn!("Dropping message from unknown connection {}", id);
            return;
        };

        match message {
            RoomMessage::JoinJam {
                jam_id,
                user_id,
                user_name,
            } => self.join(id, jam_id, user_id, user_name),
            RoomMessage::CursorMove {
                jam_id,
                user_id,
                user_name,
                x,
                y,
                timestamp,
            } => {
                if connection.jam_id() == Some(jam_id) {
                    self.broadcast(
                        jam_id,
                        Some(id),
                        RoomEvent::CursorMove {
                            user_id,
                            user_name,
                            x,
                            y,
                            timestamp: timestamp.unwrap_or_else(timestamp_millis),
                        },
                    )
                }
            }
            RoomMessage::TrackUpdate {
                jam_id,
                track_id,
                updates,
            } => {
                if let Some(presence) = connection.presence().filter(|p| p.jam_id == jam_id) {
                    self.broadcast(
                        jam_id,
                        Some(id),
                        RoomEvent::TrackUpdate {
                            track_id,
                            updates,
                            user_id: presence.user_id,
                            timestamp: timestamp_millis(),
                        },
                    )
                }
            }
            RoomMessage::PlaybackSync {
                jam_id,
                is_playing,
                current_time,
            } => {
                if let Some(presence) = connection.presence().filter(|p| p.jam_id == jam_id) {
                    self.broadcast(
                        jam_id,
                        Some(id),
                        RoomEvent::PlaybackSync {
                            is_playing,
                            current_time,
                            user_id: presence.user_id,
                            timestamp: timestamp_millis(),
                        },
                    )
                }
            }
        }
    }

    /// Moves a connection into a jam's room, leaving the previous one.
    /// The others are told about the newcomer, and the newcomer gets the list of others.
    pub fn join(&self, id: ConnectionId, jam_id: PrimaryKey, user_id: PrimaryKey, user_name: String) {
        let Some(connection) = self.connection(id) else {
            return;
        };

        self.leave(id);

        connection.set_presence(Presence {
            jam_id,
            user_id,
            user_name: user_name.clone(),
        });

        let others = {
            let mut room = self.rooms.entry(jam_id).or_insert_with(|| Room::new(jam_id));
            room.add(id);
            room.others(id)
        };

        // A disconnect may have run since the lookup above, and it can't see this membership
        if !self.connections.contains_key(&id) {
            connection.take_presence();
            self.remove_member(jam_id, id);
            return;
        }

        info!("{} joined the room of jam {}", user_name, jam_id);

        self.send_to(
            &others,
            RoomEvent::UserJoined {
                user_id,
                user_name,
                timestamp: timestamp_millis(),
            },
        );

        connection.send(RoomEvent::RoomState {
            users: self.users_of(&others),
            timestamp: timestamp_millis(),
        });
    }

    /// Takes a connection out of its room, removing the room if it becomes empty
    pub fn leave(&self, id: ConnectionId) {
        if let Some(presence) = self.connection(id).and_then(|c| c.take_presence()) {
            self.vacate(id, presence);
        }
    }

    /// Removes a member from a room and tells the rest of the room
    fn vacate(&self, id: ConnectionId, presence: Presence) {
        let remaining = self.remove_member(presence.jam_id, id);

        info!("{} left the room of jam {}", presence.user_name, presence.jam_id);

        self.send_to(
            &remaining,
            RoomEvent::UserLeft {
                user_id: presence.user_id,
                user_name: presence.user_name,
                timestamp: timestamp_millis(),
            },
        );
    }

    /// Records that a connection answered a ping
    pub fn pong(&self, id: ConnectionId) {
        if let Some(connection) = self.connection(id) {
            connection.mark_alive()
        }
    }

    /// Pings every connection, terminating those that didn't answer the previous ping
    pub fn heartbeat(&self) {
        let connections: Vec<_> = self.connections.iter().map(|c| c.value().clone()).collect();
        let mut terminated = vec![];

        for connection in connections {
            if connection.check_alive() {
                connection.send(RoomEvent::Ping);
            } else {
                connection.send(RoomEvent::Terminate);
                terminated.push(connection.id);
            }
        }

        for id in terminated {
            warn!("Connection {} missed a heartbeat, terminating", id);
            self.disconnect(id);
        }
    }

    /// The users currently in the room of a jam
    pub fn active_users(&self, jam_id: PrimaryKey) -> Vec<ActiveUser> {
        let members = match self.rooms.get(&jam_id) {
            Some(room) => room.members().to_vec(),
            None => return vec![],
        };

        self.users_of(&members)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns the members left in the room, dropping the room once it is empty
    fn remove_member(&self, jam_id: PrimaryKey, id: ConnectionId) -> Vec<ConnectionId> {
        let remaining = match self.rooms.get_mut(&jam_id) {
            Some(mut room) => {
                room.remove(id);
                room.members().to_vec()
            }
            None => return vec![],
        };

        if remaining.is_empty() {
            self.rooms.remove_if(&jam_id, |_, room| room.is_empty());
        }

        remaining
    }

    fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|c| c.value().clone())
    }

    fn broadcast(&self, jam_id: PrimaryKey, except: Option<ConnectionId>, event: RoomEvent) {
        let recipients: Vec<_> = match self.rooms.get(&jam_id) {
            Some(room) => room
                .members()
                .iter()
                .copied()
                .filter(|m| Some(*m) != except)
                .collect(),
            None => return,
        };

        self.send_to(&recipients, event)
    }

    fn send_to(&self, recipients: &[ConnectionId], event: RoomEvent) {
        for id in recipients {
            if let Some(connection) = self.connection(*id) {
                connection.send(event.clone())
            }
        }
    }

    fn users_of(&self, members: &[ConnectionId]) -> Vec<ActiveUser> {
        members
            .iter()
            .filter_map(|id| self.connection(*id))
            .filter_map(|c| c.presence())
            .map(|p| ActiveUser {
                user_id: p.user_id,
                user_name: p.user_name,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{FutureExt, StreamExt};
    use serde_json::json;

    use super::*;

    fn drain(handle: &mut ConnectionHandle) -> Vec<RoomEvent> {
        let mut events = vec![];

        while let Some(Some(event)) = handle.next().now_or_never() {
            events.push(event);
        }

        events
    }

    fn join(
        directory: &RoomDirectory,
        handle: &ConnectionHandle,
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
        name: &str,
    ) {
        directory.relay(
            handle.id(),
            RoomMessage::JoinJam {
                jam_id,
                user_id,
                user_name: name.to_string(),
            },
        );
    }

    #[test]
    fn two_clients_see_each_other() {
        let directory = RoomDirectory::new();
        let mut alice = directory.connect();
        let mut bob = directory.connect();

        join(&directory, &alice, 7, 1, "alice");

        match drain(&mut alice).as_slice() {
            [RoomEvent::RoomState { users, .. }] => assert!(users.is_empty()),
            other => panic!("unexpected events {:?}", other),
        }

        join(&directory, &bob, 7, 2, "bob");

        match drain(&mut alice).as_slice() {
            [RoomEvent::UserJoined { user_id, user_name, .. }] => {
                assert_eq!(*user_id, 2);
                assert_eq!(user_name, "bob");
            }
            other => panic!("unexpected events {:?}", other),
        }

        match drain(&mut bob).as_slice() {
            [RoomEvent::RoomState { users, .. }] => assert_eq!(
                users,
                &vec![ActiveUser {
                    user_id: 1,
                    user_name: "alice".to_string()
                }]
            ),
            other => panic!("unexpected events {:?}", other),
        }

        assert_eq!(directory.active_users(7).len(), 2);
        assert_eq!(directory.room_count(), 1);

        drop(alice);

        match drain(&mut bob).as_slice() {
            [RoomEvent::UserLeft { user_id, .. }] => assert_eq!(*user_id, 1),
            other => panic!("unexpected events {:?}", other),
        }

        directory.disconnect(bob.id());

        assert_eq!(directory.room_count(), 0);
        assert_eq!(directory.connection_count(), 0);
    }

    #[test]
    fn messages_reach_the_rest_of_the_room() {
        let directory = RoomDirectory::new();
        let mut alice = directory.connect();
        let mut bob = directory.connect();
        let mut carol = directory.connect();

        join(&directory, &alice, 7, 1, "alice");
        join(&directory, &bob, 7, 2, "bob");
        join(&directory, &carol, 8, 3, "carol");
        drain(&mut alice);
        drain(&mut bob);
        drain(&mut carol);

        directory.relay(
            alice.id(),
            RoomMessage::TrackUpdate {
                jam_id: 7,
                track_id: json!("drums"),
                updates: json!({ "muted": true }),
            },
        );

        match drain(&mut bob).as_slice() {
            [RoomEvent::TrackUpdate {
                track_id,
                updates,
                user_id,
                ..
            }] => {
                assert_eq!(track_id, &json!("drums"));
                assert_eq!(updates["muted"], true);
                assert_eq!(*user_id, 1);
            }
            other => panic!("unexpected events {:?}", other),
        }

        // Not echoed to the sender, and not leaked to other rooms
        assert!(drain(&mut alice).is_empty());
        assert!(drain(&mut carol).is_empty());

        directory.relay(
            bob.id(),
            RoomMessage::CursorMove {
                jam_id: 7,
                user_id: 2,
                user_name: "bob".to_string(),
                x: 0.5,
                y: 0.25,
                timestamp: Some(1234),
            },
        );

        assert_eq!(
            drain(&mut alice),
            vec![RoomEvent::CursorMove {
                user_id: 2,
                user_name: "bob".to_string(),
                x: 0.5,
                y: 0.25,
                timestamp: 1234,
            }]
        );
    }

    #[test]
    fn messages_for_another_jam_are_dropped() {
        let directory = RoomDirectory::new();
        let mut alice = directory.connect();
        let mut bob = directory.connect();
        let lurker = directory.connect();

        join(&directory, &alice, 7, 1, "alice");
        join(&directory, &bob, 7, 2, "bob");
        drain(&mut alice);

        directory.relay(
            bob.id(),
            RoomMessage::PlaybackSync {
                jam_id: 8,
                is_playing: true,
                current_time: 12.0,
            },
        );

        // Not in any room yet
        directory.relay(
            lurker.id(),
            RoomMessage::PlaybackSync {
                jam_id: 7,
                is_playing: true,
                current_time: 12.0,
            },
        );

        assert!(drain(&mut alice).is_empty());
        drain(&mut bob);
    }

    #[test]
    fn joining_another_jam_leaves_the_first() {
        let directory = RoomDirectory::new();
        let mut alice = directory.connect();
        let mut bob = directory.connect();

        join(&directory, &alice, 7, 1, "alice");
        join(&directory, &bob, 7, 2, "bob");
        drain(&mut alice);

        join(&directory, &bob, 9, 2, "bob");

        assert!(matches!(
            drain(&mut alice).as_slice(),
            [RoomEvent::UserLeft { user_id: 2, .. }]
        ));
        assert_eq!(directory.active_users(7).len(), 1);
        assert_eq!(directory.active_users(9).len(), 1);
        assert_eq!(directory.room_count(), 2);
        drain(&mut bob);
    }

    #[test]
    fn silent_connections_are_terminated() {
        let directory = RoomDirectory::new();
        let mut alice = directory.connect();
        let mut bob = directory.connect();

        join(&directory, &alice, 7, 1, "alice");
        join(&directory, &bob, 7, 2, "bob");
        drain(&mut alice);
        drain(&mut bob);

        directory.heartbeat();
        assert_eq!(drain(&mut alice), vec![RoomEvent::Ping]);
        assert_eq!(drain(&mut bob), vec![RoomEvent::Ping]);

        directory.pong(alice.id());
        directory.heartbeat();

        assert!(matches!(
            drain(&mut alice).as_slice(),
            [RoomEvent::Ping, RoomEvent::UserLeft { user_id: 2, .. }]
        ));

        // Bob's stream ends after the termination notice
        let events: Vec<_> = std::iter::from_fn(|| bob.next().now_or_never().flatten()).collect();
        assert_eq!(events, vec![RoomEvent::Terminate]);
        assert_eq!(bob.next().now_or_never(), Some(None));

        assert_eq!(directory.connection_count(), 1);
        assert_eq!(directory.active_users(7).len(), 1);
    }

    #[test]
    fn join_racing_a_disconnect_leaves_no_room_behind() {
        let directory = RoomDirectory::new();

        for _ in 0..2000 {
            let handle = directory.connect();
            let id = handle.id();

            std::thread::scope(|scope| {
                scope.spawn(|| directory.join(id, 7, 1, "alice".to_string()));
                scope.spawn(move || drop(handle));
            });

            assert_eq!(directory.connection_count(), 0);
            assert_eq!(directory.room_count(), 0);
        }
    }

    #[test]
    fn disconnect_tells_the_room() {
        let directory = RoomDirectory::new();
        let mut alice = directory.connect();
        let bob = directory.connect();

        join(&directory, &alice, 3, 1, "alice");
        join(&directory, &bob, 3, 2, "bob");
        drain(&mut alice);

        directory.disconnect(bob.id());
        directory.disconnect(bob.id());

        assert!(matches!(
            drain(&mut alice).as_slice(),
            [RoomEvent::UserLeft { user_id: 2, .. }]
        ));
        assert_eq!(directory.connection_count(), 1);
        assert_eq!(directory.active_users(3).len(), 1);
    }
}
