use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Weak,
    },
    task::{Context, Poll},
};

use futures_util::Stream;
use hitit_core::LocalId;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::PrimaryKey;

use super::{RoomDirectory, RoomEvent};

pub type ConnectionId = LocalId<Connection>;

/// Who a connection is, once it has joined a jam
#[derive(Debug, Clone, PartialEq)]
pub struct Presence {
    pub jam_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub user_name: String,
}

/// A live client, as seen by the [RoomDirectory]
pub struct Connection {
    pub id: ConnectionId,
    sender: UnboundedSender<RoomEvent>,
    /// Cleared by the heartbeat, set again when the client answers a ping
    alive: AtomicBool,
    presence: Mutex<Option<Presence>>,
}

/// The receiving end of a [Connection]. Removes the connection from the directory when dropped.
pub struct ConnectionHandle {
    id: ConnectionId,
    receiver: UnboundedReceiver<RoomEvent>,
    directory: Weak<RoomDirectory>,
}

impl Connection {
    pub(super) fn new(directory: Weak<RoomDirectory>) -> (Self, ConnectionHandle) {
        let id = ConnectionId::new();
        let (sender, receiver) = unbounded_channel();

        let connection = Self {
            id,
            sender,
            alive: AtomicBool::new(true),
            presence: Mutex::new(None),
        };

        let handle = ConnectionHandle {
            id,
            receiver,
            directory,
        };

        (connection, handle)
    }

    /// Queues an event for the client. A closed connection silently drops it.
    pub fn send(&self, event: RoomEvent) {
        let _ = self.sender.send(event);
    }

    pub fn presence(&self) -> Option<Presence> {
        self.presence.lock().clone()
    }

    pub fn jam_id(&self) -> Option<PrimaryKey> {
        self.presence.lock().as_ref().map(|p| p.jam_id)
    }

    pub(super) fn set_presence(&self, presence: Presence) {
        *self.presence.lock() = Some(presence);
    }

    pub(super) fn take_presence(&self) -> Option<Presence> {
        self.presence.lock().take()
    }

    pub(super) fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Marks the connection as not alive, returning whether it was alive before
    pub(super) fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Stream for ConnectionHandle {
    type Item = RoomEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(directory) = self.directory.upgrade() {
            directory.disconnect(self.id)
        }
    }
}
