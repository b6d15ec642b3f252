mod activity;
mod auth;
mod db;
mod errors;
mod invites;
mod jams;
mod notifications;
mod requests;
mod rooms;
mod util;
mod versions;

use std::sync::Arc;

pub use activity::*;
pub use auth::*;
pub use db::*;
pub use errors::*;
pub use invites::*;
pub use jams::*;
pub use notifications::*;
pub use requests::*;
pub use rooms::*;
pub use versions::*;

use hitit_core::Config;
use log::error;

/// The hit.it collab system, facilitating jams, collaborators, versions, and live rooms.
pub struct Collab {
    pub config: Arc<Config>,
    pub database: SharedDatabase,

    pub auth: Auth,
    pub jams: Jams,
    pub invites: Invites,
    pub requests: Requests,
    pub activity: ActivityLog,
    pub versions: Versions,
    pub notifications: Notifications,
    pub rooms: Arc<RoomDirectory>,
}

/// A type passed to the components of the collab system, to access state and record side effects.
#[derive(Clone)]
pub struct CollabContext {
    pub config: Arc<Config>,
    pub database: SharedDatabase,
}

impl Collab {
    pub fn new(database: SharedDatabase, config: Config) -> Self {
        let context = CollabContext {
            config: Arc::new(config),
            database,
        };

        Self {
            config: context.config.clone(),
            database: context.database.clone(),

            auth: Auth::new(&context),
            jams: Jams::new(&context),
            invites: Invites::new(&context),
            requests: Requests::new(&context),
            activity: ActivityLog::new(&context),
            versions: Versions::new(&context),
            notifications: Notifications::new(&context),
            rooms: RoomDirectory::new(),
        }
    }
}

impl CollabContext {
    /// Appends an entry to a jam's activity log.
    /// Failures are logged and swallowed, the action that caused the entry already happened.
    pub async fn log_activity(&self, new_activity: NewActivity) {
        let jam_id = new_activity.jam_id;
        let action_type = new_activity.action_type;

        if let Err(e) = self.database.create_activity(new_activity).await {
            error!(
                "Failed to log {} activity for jam {}: {}",
                action_type, jam_id, e
            );
        }
    }

    /// Sends a notification, unless the sender is the recipient.
    /// Failures are logged and swallowed.
    pub async fn notify(&self, new_notification: NewNotification) {
        if new_notification.sender_id == new_notification.recipient_id {
            return;
        }

        let recipient_id = new_notification.recipient_id;

        if let Err(e) = self.database.create_notification(new_notification).await {
            error!("Failed to notify user {}: {}", recipient_id, e);
        }
    }

    /// Returns the jam, or a not found error
    pub async fn jam(&self, jam_id: PrimaryKey) -> std::result::Result<JamData, CollabError> {
        Ok(self.database.jam_by_id(jam_id).await?)
    }

    /// Returns the user, or a not found error
    pub async fn user(&self, user_id: PrimaryKey) -> std::result::Result<UserData, CollabError> {
        Ok(self.database.user_by_id(user_id).await?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use hitit_core::Config;

    use crate::{Collab, JamData, JamDetails, MemoryDatabase, NewUser, UserData};

    pub fn collab() -> Collab {
        Collab::new(Arc::new(MemoryDatabase::new()), Config::default())
    }

    pub async fn user(collab: &Collab, username: &str) -> UserData {
        collab
            .database
            .create_user(NewUser {
                username: username.to_string(),
                password: "hashed".to_string(),
                display_name: username.to_string(),
            })
            .await
            .unwrap()
    }

    pub async fn jam(collab: &Collab, owner: &UserData, is_private: bool) -> JamData {
        collab
            .jams
            .create(
                owner,
                JamDetails {
                    title: "Night Drive".to_string(),
                    description: "Synths at 2am".to_string(),
                    genre: "synthwave".to_string(),
                    image: Some("night-drive.png".to_string()),
                    is_private,
                },
            )
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use crate::{testing, CollabContext, CollabError};

    #[tokio::test]
    async fn context_looks_up_jams_and_users() {
        let collab = testing::collab();
        let alice = testing::user(&collab, "alice").await;
        let jam = testing::jam(&collab, &alice, false).await;

        let context = CollabContext {
            config: collab.config.clone(),
            database: collab.database.clone(),
        };

        assert_eq!(context.jam(jam.id).await.unwrap().owner_id, alice.id);
        assert_eq!(context.user(alice.id).await.unwrap().username, "alice");
        assert!(matches!(
            context.jam(jam.id + 100).await,
            Err(CollabError::NotFound(_))
        ));
        assert!(matches!(
            context.user(alice.id + 100).await,
            Err(CollabError::NotFound(_))
        ));
    }
}
