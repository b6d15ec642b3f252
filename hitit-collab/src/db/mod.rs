use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hitit_core::{Collaborator, JamSnapshot, Page, PageRequest, Role};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type SharedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists, or is not in a state that allows the write
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn conflict_or(self, resource: &'static str, field: &'static str, value: String)
        -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl DatabaseError {
    pub fn not_found(resource: &'static str, identifier: &'static str) -> Self {
        Self::NotFound {
            resource,
            identifier,
        }
    }

    pub fn conflict(resource: &'static str, field: &'static str, value: impl ToString) -> Self {
        Self::Conflict {
            resource,
            field,
            value: value.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Which activity entries to list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityScope {
    /// Everything that happened in a jam
    Jam(PrimaryKey),
    /// Everything a user did
    User(PrimaryKey),
    /// Everything that happened in any of the jams
    Jams(Vec<PrimaryKey>),
}

/// Represents a type that can fetch hit.it data from a database.
///
/// Writes that guard an invariant (one pending invite or request per user and jam,
/// unique version numbers, single-transition responses) must be atomic in the implementation.
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<()>;

    async fn jam_by_id(&self, jam_id: PrimaryKey) -> Result<JamData>;
    /// Ids of every jam the user owns or collaborates on
    async fn jam_ids_for_member(&self, user_id: PrimaryKey) -> Result<Vec<PrimaryKey>>;
    async fn create_jam(&self, new_jam: NewJam) -> Result<JamData>;
    async fn update_jam(&self, updated_jam: UpdatedJam) -> Result<JamData>;
    /// Appends a clip, returning false if the jam already contained it
    async fn add_clip(&self, jam_id: PrimaryKey, clip_id: PrimaryKey) -> Result<bool>;
    /// Removes a clip, returning false if the jam didn't contain it
    async fn remove_clip(&self, jam_id: PrimaryKey, clip_id: PrimaryKey) -> Result<bool>;
    async fn increment_likes(&self, jam_id: PrimaryKey) -> Result<JamData>;
    /// Fails with a conflict if the user already collaborates on the jam
    async fn create_collaborator(
        &self,
        jam_id: PrimaryKey,
        collaborator: Collaborator,
    ) -> Result<()>;
    async fn update_collaborator_role(
        &self,
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
        role: Role,
    ) -> Result<()>;
    async fn delete_collaborator(&self, jam_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;
    /// Overwrites the jam's mutable state with the snapshot, except for the image
    async fn restore_jam(&self, jam_id: PrimaryKey, snapshot: &JamSnapshot) -> Result<JamData>;

    async fn invite_by_id(&self, invite_id: PrimaryKey) -> Result<InviteData>;
    /// Fails with a conflict if a pending invite exists for the same user and jam
    async fn create_invite(&self, new_invite: NewInvite) -> Result<InviteData>;
    async fn pending_invites_for_user(
        &self,
        user_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<InviteData>>;
    async fn pending_invites_for_jam(&self, jam_id: PrimaryKey) -> Result<Vec<InviteData>>;
    /// Marks a pending invite accepted and adds the invited user as a collaborator
    async fn accept_invite(
        &self,
        invite_id: PrimaryKey,
        responded_at: DateTime<Utc>,
    ) -> Result<InviteData>;
    /// Moves a pending invite to a terminal status without touching the jam
    async fn close_invite(
        &self,
        invite_id: PrimaryKey,
        status: InviteStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> Result<InviteData>;

    async fn request_by_id(&self, request_id: PrimaryKey) -> Result<RequestData>;
    /// Fails with a conflict if a pending request exists for the same user and jam
    async fn create_request(&self, new_request: NewRequest) -> Result<RequestData>;
    async fn pending_requests_for_jam(&self, jam_id: PrimaryKey) -> Result<Vec<RequestData>>;
    async fn requests_by_user(&self, user_id: PrimaryKey) -> Result<Vec<RequestData>>;
    /// Marks a pending request approved and adds the requester as a collaborator
    async fn approve_request(
        &self,
        request_id: PrimaryKey,
        responded_by: PrimaryKey,
        responded_at: DateTime<Utc>,
    ) -> Result<RequestData>;
    async fn deny_request(
        &self,
        request_id: PrimaryKey,
        responded_by: PrimaryKey,
        responded_at: DateTime<Utc>,
    ) -> Result<RequestData>;

    async fn create_activity(&self, new_activity: NewActivity) -> Result<ActivityData>;
    /// Lists activity newest first
    async fn list_activity(
        &self,
        scope: ActivityScope,
        page: PageRequest,
    ) -> Result<Page<ActivityData>>;
    /// Removes activity created before the cutoff, returning the amount removed
    async fn delete_activity_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn version_by_number(
        &self,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
    ) -> Result<VersionData>;
    async fn latest_version_number(&self, jam_id: PrimaryKey) -> Result<Option<VersionNumber>>;
    /// Stores a version under the next free version number of the jam
    async fn create_version(&self, new_version: NewVersion) -> Result<VersionData>;
    /// Lists versions by version number, newest first
    async fn list_versions(
        &self,
        jam_id: PrimaryKey,
        page: PageRequest,
    ) -> Result<Page<VersionData>>;
    async fn update_version(&self, updated_version: UpdatedVersion) -> Result<VersionData>;
    async fn delete_version(&self, jam_id: PrimaryKey, version_number: VersionNumber)
        -> Result<()>;

    async fn create_notification(
        &self,
        new_notification: NewNotification,
    ) -> Result<NotificationData>;
    async fn notifications_for_user(
        &self,
        user_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<NotificationData>>;
    async fn mark_notification_read(
        &self,
        notification_id: PrimaryKey,
        recipient_id: PrimaryKey,
    ) -> Result<()>;
    async fn mark_all_notifications_read(&self, recipient_id: PrimaryKey) -> Result<u64>;
    async fn unread_notification_count(&self, recipient_id: PrimaryKey) -> Result<u64>;
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    /// Already hashed
    pub password: String,
    pub display_name: String,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewJam {
    /// The owner of the new jam
    pub user_id: PrimaryKey,
    pub title: String,
    pub description: String,
    pub genre: String,
    pub image: Option<String>,
    pub is_private: bool,
}

#[derive(Debug, Default)]
pub struct UpdatedJam {
    pub id: PrimaryKey,
    pub title: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub image: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug)]
pub struct NewInvite {
    pub jam_id: PrimaryKey,
    pub invited_user_id: PrimaryKey,
    pub invited_by: PrimaryKey,
    pub role: Role,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRequest {
    pub jam_id: PrimaryKey,
    pub requested_by: PrimaryKey,
    pub requested_role: Role,
    pub message: String,
    pub skills: Vec<String>,
    pub portfolio: Option<String>,
}

#[derive(Debug)]
pub struct NewActivity {
    pub jam_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub action_type: ActionType,
    pub description: String,
    pub metadata: Value,
    pub target_user_id: Option<PrimaryKey>,
    pub target_clip_id: Option<PrimaryKey>,
}

#[derive(Debug)]
pub struct NewVersion {
    pub jam_id: PrimaryKey,
    /// Defaults to "Version N" once the number is known
    pub version_name: Option<String>,
    pub description: String,
    pub created_by: PrimaryKey,
    pub snapshot: JamSnapshot,
    pub tags: Vec<String>,
    pub is_pinned: bool,
}

#[derive(Debug, Default)]
pub struct UpdatedVersion {
    pub jam_id: PrimaryKey,
    pub version_number: VersionNumber,
    pub version_name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}

#[derive(Debug)]
pub struct NewNotification {
    pub recipient_id: PrimaryKey,
    pub sender_id: PrimaryKey,
    pub kind: NotificationKind,
    pub jam_id: Option<PrimaryKey>,
    pub message: String,
}

impl NewActivity {
    pub fn new(
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
        action_type: ActionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            jam_id,
            user_id,
            action_type,
            description: description.into(),
            metadata: Value::Object(Default::default()),
            target_user_id: None,
            target_clip_id: None,
        }
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn target_user(mut self, user_id: PrimaryKey) -> Self {
        self.target_user_id = Some(user_id);
        self
    }

    pub fn target_clip(mut self, clip_id: PrimaryKey) -> Self {
        self.target_clip_id = Some(clip_id);
        self
    }
}

/// The name a version gets when none is given
pub fn default_version_name(version_number: VersionNumber) -> String {
    format!("Version {}", version_number)
}
