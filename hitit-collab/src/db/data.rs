use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use hitit_core::{Collaborator, JamSnapshot, Membership, Permissions, Role};
use serde_json::Value;
use thiserror::Error;

pub use hitit_core::PrimaryKey;

/// The number of a version within a jam, starting at 1
pub type VersionNumber = i32;

#[derive(Debug, Error)]
#[error("\"{value}\" is not a valid {kind}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements string conversions for enums stored as text
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// A hit.it account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub password: String,
    pub display_name: String,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A jam, a mix of clips that users collaborate on
#[derive(Debug, Clone)]
pub struct JamData {
    pub id: PrimaryKey,
    /// The owner. Never present in `collaborators`.
    pub owner_id: PrimaryKey,
    pub title: String,
    pub description: String,
    pub genre: String,
    pub image: Option<String>,
    pub is_private: bool,
    pub likes: i32,
    /// Ordered references into the clip store
    pub clip_ids: Vec<PrimaryKey>,
    pub collaborators: Vec<Collaborator>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

text_enum!(InviteStatus, "invite status", {
    Pending => "pending",
    Accepted => "accepted",
    Declined => "declined",
    Expired => "expired",
});

/// An invitation from a jam owner to a user
#[derive(Debug, Clone)]
pub struct InviteData {
    pub id: PrimaryKey,
    pub jam_id: PrimaryKey,
    pub invited_user_id: PrimaryKey,
    pub invited_by: PrimaryKey,
    pub role: Role,
    pub status: InviteStatus,
    pub message: String,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

text_enum!(RequestStatus, "request status", {
    Pending => "pending",
    Approved => "approved",
    Denied => "denied",
});

/// A request from a user to join a jam
#[derive(Debug, Clone)]
pub struct RequestData {
    pub id: PrimaryKey,
    pub jam_id: PrimaryKey,
    pub requested_by: PrimaryKey,
    pub requested_role: Role,
    pub status: RequestStatus,
    pub message: String,
    /// Example: drums, vocals, mixing
    pub skills: Vec<String>,
    /// A link to a portfolio or profile elsewhere
    pub portfolio: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub responded_by: Option<PrimaryKey>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    JamCreated,
    ClipAdded,
    ClipRemoved,
    MixUpdated,
    CollaboratorAdded,
    CollaboratorRemoved,
    RoleChanged,
    InviteSent,
    InviteAccepted,
    RequestSent,
    RequestApproved,
    CommentAdded,
    JamUpdated,
    JamPublished,
}

text_enum!(ActionType, "action type", {
    JamCreated => "jam_created",
    ClipAdded => "clip_added",
    ClipRemoved => "clip_removed",
    MixUpdated => "mix_updated",
    CollaboratorAdded => "collaborator_added",
    CollaboratorRemoved => "collaborator_removed",
    RoleChanged => "role_changed",
    InviteSent => "invite_sent",
    InviteAccepted => "invite_accepted",
    RequestSent => "request_sent",
    RequestApproved => "request_approved",
    CommentAdded => "comment_added",
    JamUpdated => "jam_updated",
    JamPublished => "jam_published",
});

/// An entry in a jam's activity log. Never modified after creation.
#[derive(Debug, Clone)]
pub struct ActivityData {
    pub id: PrimaryKey,
    pub jam_id: PrimaryKey,
    /// The user that performed the action
    pub user_id: PrimaryKey,
    pub action_type: ActionType,
    pub target_user_id: Option<PrimaryKey>,
    pub target_clip_id: Option<PrimaryKey>,
    pub metadata: Value,
    /// Human readable, for example: "alice added bob as a producer"
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A saved version of a jam
#[derive(Debug, Clone)]
pub struct VersionData {
    pub id: PrimaryKey,
    pub jam_id: PrimaryKey,
    pub version_number: VersionNumber,
    pub version_name: String,
    pub description: String,
    pub created_by: PrimaryKey,
    pub created_at: DateTime<Utc>,
    pub snapshot: JamSnapshot,
    /// Example: final, demo, backup
    pub tags: Vec<String>,
    pub is_pinned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Like,
    Comment,
    CollaboratorAdd,
    Mention,
}

text_enum!(NotificationKind, "notification kind", {
    Like => "like",
    Comment => "comment",
    CollaboratorAdd => "collaborator_add",
    Mention => "mention",
});

#[derive(Debug, Clone)]
pub struct NotificationData {
    pub id: PrimaryKey,
    pub recipient_id: PrimaryKey,
    pub sender_id: PrimaryKey,
    pub kind: NotificationKind,
    pub jam_id: Option<PrimaryKey>,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Membership for JamData {
    fn owner_id(&self) -> PrimaryKey {
        self.owner_id
    }

    fn is_private(&self) -> bool {
        self.is_private
    }

    fn collaborators(&self) -> &[Collaborator] {
        &self.collaborators
    }
}

impl JamData {
    pub fn permissions(&self, user_id: PrimaryKey) -> Permissions {
        Permissions::resolve(self, user_id)
    }

    pub fn collaborator(&self, user_id: PrimaryKey) -> Option<&Collaborator> {
        self.collaborators.iter().find(|c| c.user_id == user_id)
    }

    pub fn snapshot(&self) -> JamSnapshot {
        JamSnapshot::capture(
            &self.title,
            &self.description,
            &self.genre,
            self.image.as_deref(),
            self.is_private,
            &self.clip_ids,
            &self.collaborators,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_round_trip_through_storage_names() {
        assert_eq!(ActionType::RoleChanged.as_str(), "role_changed");
        assert_eq!("invite_sent".parse::<ActionType>().ok(), Some(ActionType::InviteSent));
        assert_eq!(NotificationKind::CollaboratorAdd.to_string(), "collaborator_add");

        let error = "archived".parse::<InviteStatus>().unwrap_err();
        assert_eq!(error.to_string(), "\"archived\" is not a valid invite status");
    }
}
