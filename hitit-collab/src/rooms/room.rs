use crate::PrimaryKey;

use super::ConnectionId;

/// The connections currently working on a jam together
#[derive(Debug)]
pub struct Room {
    pub jam_id: PrimaryKey,
    members: Vec<ConnectionId>,
}

impl Room {
    pub fn new(jam_id: PrimaryKey) -> Self {
        Self {
            jam_id,
            members: vec![],
        }
    }

    pub fn add(&mut self, id: ConnectionId) {
        if !self.members.contains(&id) {
            self.members.push(id)
        }
    }

    pub fn remove(&mut self, id: ConnectionId) {
        self.members.retain(|m| *m != id)
    }

    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    /// Every member except the given one, in join order
    pub fn others(&self, id: ConnectionId) -> Vec<ConnectionId> {
        self.members.iter().copied().filter(|m| *m != id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
