//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use chrono::{DateTime, Utc};
use hitit_collab::{
    ActiveUser as CollabActiveUser, ActivityData, InviteData, JamData, JamView, NotificationData,
    Restoration as CollabRestoration, RequestData, SessionData, UserData, VersionComparison,
    VersionData,
};
use hitit_core::{
    Collaborator as CoreCollaborator, JamSnapshot, Page, Pagination as CorePagination,
    Permissions as CorePermissions, SnapshotDiff,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: i32,
    username: String,
    display_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResult {
    token: String,
    user: User,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    user_id: i32,
    role: String,
    added_at: DateTime<Utc>,
    added_by: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Jam {
    id: i32,
    owner_id: i32,
    title: String,
    description: String,
    genre: String,
    image: Option<String>,
    is_private: bool,
    likes: i32,
    clip_ids: Vec<i32>,
    collaborators: Vec<Collaborator>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    /// The effective role, or null without access
    role: Option<String>,
    is_owner: bool,
    can_edit: bool,
    can_contribute: bool,
    can_view: bool,
}

/// A jam as seen by the requesting user
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JamWithPermissions {
    jam: Jam,
    permissions: Permissions,
    /// Users currently in the jam's live room
    active_users: Vec<ActiveUser>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    user_id: i32,
    user_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    id: i32,
    jam_id: i32,
    invited_user_id: i32,
    invited_by: i32,
    role: String,
    status: String,
    message: String,
    expires_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    id: i32,
    jam_id: i32,
    requested_by: i32,
    requested_role: String,
    status: String,
    message: String,
    skills: Vec<String>,
    portfolio: Option<String>,
    responded_at: Option<DateTime<Utc>>,
    responded_by: Option<i32>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    id: i32,
    jam_id: i32,
    user_id: i32,
    action_type: String,
    target_user_id: Option<i32>,
    target_clip_id: Option<i32>,
    #[schema(value_type = Object)]
    metadata: Value,
    description: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    total: usize,
    limit: usize,
    skip: usize,
    has_more: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityPage {
    activities: Vec<Activity>,
    pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    id: i32,
    jam_id: i32,
    version_number: i32,
    version_name: String,
    description: String,
    created_by: i32,
    created_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    snapshot: JamSnapshot,
    tags: Vec<String>,
    is_pinned: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionPage {
    versions: Vec<Version>,
    pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Restoration {
    jam: Jam,
    version: Version,
    backup: Option<Version>,
}

/// A version without its snapshot
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    version_number: i32,
    version_name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Comparison {
    v1: VersionSummary,
    v2: VersionSummary,
    #[schema(value_type = Object)]
    diff: SnapshotDiff,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    id: i32,
    recipient_id: i32,
    sender_id: i32,
    #[serde(rename = "type")]
    kind: String,
    jam_id: Option<i32>,
    message: String,
    read: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Count {
    count: u64,
}

impl Count {
    pub fn new(count: u64) -> Self {
        Self { count }
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl<I, O> ToSerialized<Option<O>> for Option<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Option<O> {
        self.as_ref().map(|x| x.to_serialized())
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            token: self.token.clone(),
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Collaborator> for CoreCollaborator {
    fn to_serialized(&self) -> Collaborator {
        Collaborator {
            user_id: self.user_id,
            role: self.role.to_string(),
            added_at: self.added_at,
            added_by: self.added_by,
        }
    }
}

impl ToSerialized<Jam> for JamData {
    fn to_serialized(&self) -> Jam {
        Jam {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title.clone(),
            description: self.description.clone(),
            genre: self.genre.clone(),
            image: self.image.clone(),
            is_private: self.is_private,
            likes: self.likes,
            clip_ids: self.clip_ids.clone(),
            collaborators: self.collaborators.to_serialized(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Permissions> for CorePermissions {
    fn to_serialized(&self) -> Permissions {
        Permissions {
            role: self.role.map(|r| r.as_str().to_string()),
            is_owner: self.is_owner,
            can_edit: self.can_edit,
            can_contribute: self.can_contribute,
            can_view: self.can_view,
        }
    }
}

impl ToSerialized<ActiveUser> for CollabActiveUser {
    fn to_serialized(&self) -> ActiveUser {
        ActiveUser {
            user_id: self.user_id,
            user_name: self.user_name.clone(),
        }
    }
}

impl JamWithPermissions {
    pub fn new(view: &JamView, active_users: Vec<CollabActiveUser>) -> Self {
        Self {
            jam: view.jam.to_serialized(),
            permissions: view.permissions.to_serialized(),
            active_users: active_users.to_serialized(),
        }
    }
}

impl ToSerialized<Invite> for InviteData {
    fn to_serialized(&self) -> Invite {
        Invite {
            id: self.id,
            jam_id: self.jam_id,
            invited_user_id: self.invited_user_id,
            invited_by: self.invited_by,
            role: self.role.to_string(),
            status: self.status.to_string(),
            message: self.message.clone(),
            expires_at: self.expires_at,
            responded_at: self.responded_at,
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<JoinRequest> for RequestData {
    fn to_serialized(&self) -> JoinRequest {
        JoinRequest {
            id: self.id,
            jam_id: self.jam_id,
            requested_by: self.requested_by,
            requested_role: self.requested_role.to_string(),
            status: self.status.to_string(),
            message: self.message.clone(),
            skills: self.skills.clone(),
            portfolio: self.portfolio.clone(),
            responded_at: self.responded_at,
            responded_by: self.responded_by,
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Activity> for ActivityData {
    fn to_serialized(&self) -> Activity {
        Activity {
            id: self.id,
            jam_id: self.jam_id,
            user_id: self.user_id,
            action_type: self.action_type.to_string(),
            target_user_id: self.target_user_id,
            target_clip_id: self.target_clip_id,
            metadata: self.metadata.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Pagination> for CorePagination {
    fn to_serialized(&self) -> Pagination {
        Pagination {
            total: self.total,
            limit: self.limit,
            skip: self.skip,
            has_more: self.has_more,
        }
    }
}

impl ToSerialized<ActivityPage> for Page<ActivityData> {
    fn to_serialized(&self) -> ActivityPage {
        ActivityPage {
            activities: self.items.to_serialized(),
            pagination: self.pagination().to_serialized(),
        }
    }
}

impl ToSerialized<Version> for VersionData {
    fn to_serialized(&self) -> Version {
        Version {
            id: self.id,
            jam_id: self.jam_id,
            version_number: self.version_number,
            version_name: self.version_name.clone(),
            description: self.description.clone(),
            created_by: self.created_by,
            created_at: self.created_at,
            snapshot: self.snapshot.clone(),
            tags: self.tags.clone(),
            is_pinned: self.is_pinned,
        }
    }
}

impl ToSerialized<VersionPage> for Page<VersionData> {
    fn to_serialized(&self) -> VersionPage {
        VersionPage {
            versions: self.items.to_serialized(),
            pagination: self.pagination().to_serialized(),
        }
    }
}

impl ToSerialized<Restoration> for CollabRestoration {
    fn to_serialized(&self) -> Restoration {
        Restoration {
            jam: self.jam.to_serialized(),
            version: self.version.to_serialized(),
            backup: self.backup.to_serialized(),
        }
    }
}

impl ToSerialized<VersionSummary> for VersionData {
    fn to_serialized(&self) -> VersionSummary {
        VersionSummary {
            version_number: self.version_number,
            version_name: self.version_name.clone(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Comparison> for VersionComparison {
    fn to_serialized(&self) -> Comparison {
        Comparison {
            v1: self.v1.to_serialized(),
            v2: self.v2.to_serialized(),
            diff: self.diff.clone(),
        }
    }
}

impl ToSerialized<Notification> for NotificationData {
    fn to_serialized(&self) -> Notification {
        Notification {
            id: self.id,
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            kind: self.kind.to_string(),
            jam_id: self.jam_id,
            message: self.message.clone(),
            read: self.read,
            created_at: self.created_at,
        }
    }
}
