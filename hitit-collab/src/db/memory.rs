use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hitit_core::{Collaborator, JamSnapshot, Page, PageRequest, Role};
use parking_lot::Mutex;

use crate::{
    default_version_name, ActivityData, ActivityScope, Database, DatabaseError, InviteData,
    InviteStatus, JamData, NewActivity, NewInvite, NewJam, NewNotification, NewRequest,
    NewSession, NewUser, NewVersion, NotificationData, PrimaryKey, RequestData, RequestStatus,
    Result, SessionData, UpdatedJam, UpdatedVersion, UserData, VersionData, VersionNumber,
};

/// An in-process database, used in tests and when no postgres url is configured.
///
/// Every operation holds a single lock, so each write is atomic.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    last_id: PrimaryKey,
    users: Vec<UserData>,
    sessions: Vec<StoredSession>,
    jams: Vec<JamData>,
    invites: Vec<InviteData>,
    requests: Vec<RequestData>,
    activities: Vec<ActivityData>,
    versions: Vec<VersionData>,
    notifications: Vec<NotificationData>,
}

struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn jam(&self, jam_id: PrimaryKey) -> Result<&JamData> {
        self.jams
            .iter()
            .find(|j| j.id == jam_id)
            .ok_or(DatabaseError::not_found("jam", "id"))
    }

    fn jam_mut(&mut self, jam_id: PrimaryKey) -> Result<&mut JamData> {
        self.jams
            .iter_mut()
            .find(|j| j.id == jam_id)
            .ok_or(DatabaseError::not_found("jam", "id"))
    }

    fn invite_mut(&mut self, invite_id: PrimaryKey) -> Result<&mut InviteData> {
        self.invites
            .iter_mut()
            .find(|i| i.id == invite_id)
            .ok_or(DatabaseError::not_found("invite", "id"))
    }

    fn request_mut(&mut self, request_id: PrimaryKey) -> Result<&mut RequestData> {
        self.requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or(DatabaseError::not_found("request", "id"))
    }

    fn version_mut(
        &mut self,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
    ) -> Result<&mut VersionData> {
        self.versions
            .iter_mut()
            .find(|v| v.jam_id == jam_id && v.version_number == version_number)
            .ok_or(DatabaseError::not_found("version", "jam:number"))
    }

    /// Adds a collaborator unless the user is already one
    fn add_collaborator(&mut self, jam_id: PrimaryKey, collaborator: Collaborator) -> Result<()> {
        let jam = self.jam_mut(jam_id)?;

        if jam.collaborator(collaborator.user_id).is_none() {
            jam.collaborators.push(collaborator);
        }

        Ok(())
    }
}

/// Sorts newest first, the id breaks ties between entries created at the same instant
fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, PrimaryKey)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        let state = self.state.lock();

        state
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(DatabaseError::not_found("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        let state = self.state.lock();

        state
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(DatabaseError::not_found("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if state.users.iter().any(|u| u.username == new_user.username) {
            return Err(DatabaseError::conflict(
                "user",
                "username",
                &new_user.username,
            ));
        }

        let user = UserData {
            id: state.next_id(),
            username: new_user.username,
            password: new_user.password,
            display_name: new_user.display_name,
        };

        state.users.push(user.clone());
        Ok(user)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let state = self.state.lock();

        let session = state
            .sessions
            .iter()
            .find(|s| s.token == token)
            .ok_or(DatabaseError::not_found("session", "token"))?;

        let user = state
            .users
            .iter()
            .find(|u| u.id == session.user_id)
            .cloned()
            .ok_or(DatabaseError::not_found("user", "id"))?;

        Ok(SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        {
            let mut state = self.state.lock();

            if state.sessions.iter().any(|s| s.token == new_session.token) {
                return Err(DatabaseError::conflict(
                    "session",
                    "token",
                    &new_session.token,
                ));
            }

            let id = state.next_id();
            state.sessions.push(StoredSession {
                id,
                token: new_session.token.clone(),
                user_id: new_session.user_id,
                expires_at: new_session.expires_at,
            });
        }

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.sessions.len();

        state.sessions.retain(|s| s.token != token);

        if state.sessions.len() == before {
            return Err(DatabaseError::not_found("session", "token"));
        }

        Ok(())
    }

    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<()> {
        self.state.lock().sessions.retain(|s| s.expires_at >= now);
        Ok(())
    }

    async fn jam_by_id(&self, jam_id: PrimaryKey) -> Result<JamData> {
        self.state.lock().jam(jam_id).cloned()
    }

    async fn jam_ids_for_member(&self, user_id: PrimaryKey) -> Result<Vec<PrimaryKey>> {
        let state = self.state.lock();

        Ok(state
            .jams
            .iter()
            .filter(|j| j.owner_id == user_id || j.collaborator(user_id).is_some())
            .map(|j| j.id)
            .collect())
    }

    async fn create_jam(&self, new_jam: NewJam) -> Result<JamData> {
        let mut state = self.state.lock();

        let jam = JamData {
            id: state.next_id(),
            owner_id: new_jam.user_id,
            title: new_jam.title,
            description: new_jam.description,
            genre: new_jam.genre,
            image: new_jam.image,
            is_private: new_jam.is_private,
            likes: 0,
            clip_ids: vec![],
            collaborators: vec![],
            created_at: Utc::now(),
        };

        state.jams.push(jam.clone());
        Ok(jam)
    }

    async fn update_jam(&self, updated_jam: UpdatedJam) -> Result<JamData> {
        let mut state = self.state.lock();
        let jam = state.jam_mut(updated_jam.id)?;

        if let Some(title) = updated_jam.title {
            jam.title = title;
        }
        if let Some(description) = updated_jam.description {
            jam.description = description;
        }
        if let Some(genre) = updated_jam.genre {
            jam.genre = genre;
        }
        if let Some(image) = updated_jam.image {
            jam.image = Some(image);
        }
        if let Some(is_private) = updated_jam.is_private {
            jam.is_private = is_private;
        }

        Ok(jam.clone())
    }

    async fn add_clip(&self, jam_id: PrimaryKey, clip_id: PrimaryKey) -> Result<bool> {
        let mut state = self.state.lock();
        let jam = state.jam_mut(jam_id)?;

        if jam.clip_ids.contains(&clip_id) {
            return Ok(false);
        }

        jam.clip_ids.push(clip_id);
        Ok(true)
    }

    async fn remove_clip(&self, jam_id: PrimaryKey, clip_id: PrimaryKey) -> Result<bool> {
        let mut state = self.state.lock();
        let jam = state.jam_mut(jam_id)?;
        let before = jam.clip_ids.len();

        jam.clip_ids.retain(|id| *id != clip_id);
        Ok(jam.clip_ids.len() != before)
    }

    async fn increment_likes(&self, jam_id: PrimaryKey) -> Result<JamData> {
        let mut state = self.state.lock();
        let jam = state.jam_mut(jam_id)?;

        jam.likes += 1;
        Ok(jam.clone())
    }

    async fn create_collaborator(
        &self,
        jam_id: PrimaryKey,
        collaborator: Collaborator,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let jam = state.jam_mut(jam_id)?;

        if jam.collaborator(collaborator.user_id).is_some() {
            return Err(DatabaseError::conflict(
                "collaborator",
                "jam:user",
                format!("{}:{}", jam_id, collaborator.user_id),
            ));
        }

        jam.collaborators.push(collaborator);
        Ok(())
    }

    async fn update_collaborator_role(
        &self,
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
        role: Role,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let jam = state.jam_mut(jam_id)?;

        let collaborator = jam
            .collaborators
            .iter_mut()
            .find(|c| c.user_id == user_id)
            .ok_or(DatabaseError::not_found("collaborator", "jam:user"))?;

        collaborator.role = role;
        Ok(())
    }

    async fn delete_collaborator(&self, jam_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        let jam = state.jam_mut(jam_id)?;
        let before = jam.collaborators.len();

        jam.collaborators.retain(|c| c.user_id != user_id);

        if jam.collaborators.len() == before {
            return Err(DatabaseError::not_found("collaborator", "jam:user"));
        }

        Ok(())
    }

    async fn restore_jam(&self, jam_id: PrimaryKey, snapshot: &JamSnapshot) -> Result<JamData> {
        let mut state = self.state.lock();
        let jam = state.jam_mut(jam_id)?;

        jam.title = snapshot.title.clone();
        jam.description = snapshot.description.clone();
        jam.genre = snapshot.genre.clone();
        jam.is_private = snapshot.is_private;
        jam.clip_ids = snapshot.clip_ids.clone();
        jam.collaborators = snapshot.collaborators.clone();

        Ok(jam.clone())
    }

    async fn invite_by_id(&self, invite_id: PrimaryKey) -> Result<InviteData> {
        self.state.lock().invite_mut(invite_id).map(|i| i.clone())
    }

    async fn create_invite(&self, new_invite: NewInvite) -> Result<InviteData> {
        let mut state = self.state.lock();

        let pending = state.invites.iter().any(|i| {
            i.jam_id == new_invite.jam_id
                && i.invited_user_id == new_invite.invited_user_id
                && i.status == InviteStatus::Pending
        });

        if pending {
            return Err(DatabaseError::conflict(
                "pending invite",
                "jam:user",
                format!("{}:{}", new_invite.jam_id, new_invite.invited_user_id),
            ));
        }

        let invite = InviteData {
            id: state.next_id(),
            jam_id: new_invite.jam_id,
            invited_user_id: new_invite.invited_user_id,
            invited_by: new_invite.invited_by,
            role: new_invite.role,
            status: InviteStatus::Pending,
            message: new_invite.message,
            expires_at: new_invite.expires_at,
            responded_at: None,
            created_at: Utc::now(),
        };

        state.invites.push(invite.clone());
        Ok(invite)
    }

    async fn pending_invites_for_user(
        &self,
        user_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<InviteData>> {
        let state = self.state.lock();

        let mut invites: Vec<_> = state
            .invites
            .iter()
            .filter(|i| {
                i.invited_user_id == user_id
                    && i.status == InviteStatus::Pending
                    && i.expires_at > now
            })
            .cloned()
            .collect();

        newest_first(&mut invites, |i| (i.created_at, i.id));
        Ok(invites)
    }

    async fn pending_invites_for_jam(&self, jam_id: PrimaryKey) -> Result<Vec<InviteData>> {
        let state = self.state.lock();

        let mut invites: Vec<_> = state
            .invites
            .iter()
            .filter(|i| i.jam_id == jam_id && i.status == InviteStatus::Pending)
            .cloned()
            .collect();

        newest_first(&mut invites, |i| (i.created_at, i.id));
        Ok(invites)
    }

    async fn accept_invite(
        &self,
        invite_id: PrimaryKey,
        responded_at: DateTime<Utc>,
    ) -> Result<InviteData> {
        let mut state = self.state.lock();
        let invite = state.invite_mut(invite_id)?;

        if invite.status != InviteStatus::Pending {
            return Err(DatabaseError::conflict("invite", "status", invite.status));
        }

        invite.status = InviteStatus::Accepted;
        invite.responded_at = Some(responded_at);
        let invite = invite.clone();

        state.add_collaborator(
            invite.jam_id,
            Collaborator {
                user_id: invite.invited_user_id,
                role: invite.role,
                added_at: responded_at,
                added_by: invite.invited_by,
            },
        )?;

        Ok(invite)
    }

    async fn close_invite(
        &self,
        invite_id: PrimaryKey,
        status: InviteStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> Result<InviteData> {
        let mut state = self.state.lock();
        let invite = state.invite_mut(invite_id)?;

        if invite.status != InviteStatus::Pending {
            return Err(DatabaseError::conflict("invite", "status", invite.status));
        }

        invite.status = status;
        invite.responded_at = responded_at;
        Ok(invite.clone())
    }

    async fn request_by_id(&self, request_id: PrimaryKey) -> Result<RequestData> {
        self.state.lock().request_mut(request_id).map(|r| r.clone())
    }

    async fn create_request(&self, new_request: NewRequest) -> Result<RequestData> {
        let mut state = self.state.lock();

        let pending = state.requests.iter().any(|r| {
            r.jam_id == new_request.jam_id
                && r.requested_by == new_request.requested_by
                && r.status == RequestStatus::Pending
        });

        if pending {
            return Err(DatabaseError::conflict(
                "pending request",
                "jam:user",
                format!("{}:{}", new_request.jam_id, new_request.requested_by),
            ));
        }

        let request = RequestData {
            id: state.next_id(),
            jam_id: new_request.jam_id,
            requested_by: new_request.requested_by,
            requested_role: new_request.requested_role,
            status: RequestStatus::Pending,
            message: new_request.message,
            skills: new_request.skills,
            portfolio: new_request.portfolio,
            responded_at: None,
            responded_by: None,
            created_at: Utc::now(),
        };

        state.requests.push(request.clone());
        Ok(request)
    }

    async fn pending_requests_for_jam(&self, jam_id: PrimaryKey) -> Result<Vec<RequestData>> {
        let state = self.state.lock();

        let mut requests: Vec<_> = state
            .requests
            .iter()
            .filter(|r| r.jam_id == jam_id && r.status == RequestStatus::Pending)
            .cloned()
            .collect();

        newest_first(&mut requests, |r| (r.created_at, r.id));
        Ok(requests)
    }

    async fn requests_by_user(&self, user_id: PrimaryKey) -> Result<Vec<RequestData>> {
        let state = self.state.lock();

        let mut requests: Vec<_> = state
            .requests
            .iter()
            .filter(|r| r.requested_by == user_id)
            .cloned()
            .collect();

        newest_first(&mut requests, |r| (r.created_at, r.id));
        Ok(requests)
    }

    async fn approve_request(
        &self,
        request_id: PrimaryKey,
        responded_by: PrimaryKey,
        responded_at: DateTime<Utc>,
    ) -> Result<RequestData> {
        let mut state = self.state.lock();
        let request = state.request_mut(request_id)?;

        if request.status != RequestStatus::Pending {
            return Err(DatabaseError::conflict("request", "status", request.status));
        }

        request.status = RequestStatus::Approved;
        request.responded_by = Some(responded_by);
        request.responded_at = Some(responded_at);
        let request = request.clone();

        state.add_collaborator(
            request.jam_id,
            Collaborator {
                user_id: request.requested_by,
                role: request.requested_role,
                added_at: responded_at,
                added_by: responded_by,
            },
        )?;

        Ok(request)
    }

    async fn deny_request(
        &self,
        request_id: PrimaryKey,
        responded_by: PrimaryKey,
        responded_at: DateTime<Utc>,
    ) -> Result<RequestData> {
        let mut state = self.state.lock();
        let request = state.request_mut(request_id)?;

        if request.status != RequestStatus::Pending {
            return Err(DatabaseError::conflict("request", "status", request.status));
        }

        request.status = RequestStatus::Denied;
        request.responded_by = Some(responded_by);
        request.responded_at = Some(responded_at);
        Ok(request.clone())
    }

    async fn create_activity(&self, new_activity: NewActivity) -> Result<ActivityData> {
        let mut state = self.state.lock();

        let activity = ActivityData {
            id: state.next_id(),
            jam_id: new_activity.jam_id,
            user_id: new_activity.user_id,
            action_type: new_activity.action_type,
            target_user_id: new_activity.target_user_id,
            target_clip_id: new_activity.target_clip_id,
            metadata: new_activity.metadata,
            description: new_activity.description,
            created_at: Utc::now(),
        };

        state.activities.push(activity.clone());
        Ok(activity)
    }

    async fn list_activity(
        &self,
        scope: ActivityScope,
        page: PageRequest,
    ) -> Result<Page<ActivityData>> {
        let state = self.state.lock();

        let mut matching: Vec<_> = state
            .activities
            .iter()
            .filter(|a| match &scope {
                ActivityScope::Jam(jam_id) => a.jam_id == *jam_id,
                ActivityScope::User(user_id) => a.user_id == *user_id,
                ActivityScope::Jams(jam_ids) => jam_ids.contains(&a.jam_id),
            })
            .cloned()
            .collect();

        newest_first(&mut matching, |a| (a.created_at, a.id));
        Ok(page.slice(&matching))
    }

    async fn delete_activity_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock();
        let before = state.activities.len();

        state.activities.retain(|a| a.created_at >= cutoff);
        Ok((before - state.activities.len()) as u64)
    }

    async fn version_by_number(
        &self,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
    ) -> Result<VersionData> {
        self.state
            .lock()
            .version_mut(jam_id, version_number)
            .map(|v| v.clone())
    }

    async fn latest_version_number(&self, jam_id: PrimaryKey) -> Result<Option<VersionNumber>> {
        let state = self.state.lock();

        Ok(state
            .versions
            .iter()
            .filter(|v| v.jam_id == jam_id)
            .map(|v| v.version_number)
            .max())
    }

    async fn create_version(&self, new_version: NewVersion) -> Result<VersionData> {
        let mut state = self.state.lock();

        let version_number = state
            .versions
            .iter()
            .filter(|v| v.jam_id == new_version.jam_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;

        let version = VersionData {
            id: state.next_id(),
            jam_id: new_version.jam_id,
            version_number,
            version_name: new_version
                .version_name
                .unwrap_or_else(|| default_version_name(version_number)),
            description: new_version.description,
            created_by: new_version.created_by,
            created_at: Utc::now(),
            snapshot: new_version.snapshot,
            tags: new_version.tags,
            is_pinned: new_version.is_pinned,
        };

        state.versions.push(version.clone());
        Ok(version)
    }

    async fn list_versions(
        &self,
        jam_id: PrimaryKey,
        page: PageRequest,
    ) -> Result<Page<VersionData>> {
        let state = self.state.lock();

        let mut versions: Vec<_> = state
            .versions
            .iter()
            .filter(|v| v.jam_id == jam_id)
            .cloned()
            .collect();

        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(page.slice(&versions))
    }

    async fn update_version(&self, updated_version: UpdatedVersion) -> Result<VersionData> {
        let mut state = self.state.lock();
        let version = state.version_mut(updated_version.jam_id, updated_version.version_number)?;

        if let Some(version_name) = updated_version.version_name {
            version.version_name = version_name;
        }
        if let Some(description) = updated_version.description {
            version.description = description;
        }
        if let Some(tags) = updated_version.tags {
            version.tags = tags;
        }
        if let Some(is_pinned) = updated_version.is_pinned {
            version.is_pinned = is_pinned;
        }

        Ok(version.clone())
    }

    async fn delete_version(
        &self,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.versions.len();

        state
            .versions
            .retain(|v| !(v.jam_id == jam_id && v.version_number == version_number));

        if state.versions.len() == before {
            return Err(DatabaseError::not_found("version", "jam:number"));
        }

        Ok(())
    }

    async fn create_notification(
        &self,
        new_notification: NewNotification,
    ) -> Result<NotificationData> {
        let mut state = self.state.lock();

        let notification = NotificationData {
            id: state.next_id(),
            recipient_id: new_notification.recipient_id,
            sender_id: new_notification.sender_id,
            kind: new_notification.kind,
            jam_id: new_notification.jam_id,
            message: new_notification.message,
            read: false,
            created_at: Utc::now(),
        };

        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn notifications_for_user(
        &self,
        user_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<NotificationData>> {
        let state = self.state.lock();

        let mut notifications: Vec<_> = state
            .notifications
            .iter()
            .filter(|n| n.recipient_id == user_id)
            .cloned()
            .collect();

        newest_first(&mut notifications, |n| (n.created_at, n.id));
        notifications.truncate(limit);

        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        notification_id: PrimaryKey,
        recipient_id: PrimaryKey,
    ) -> Result<()> {
        let mut state = self.state.lock();

        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.recipient_id == recipient_id)
            .ok_or(DatabaseError::not_found("notification", "id"))?;

        notification.read = true;
        Ok(())
    }

    async fn mark_all_notifications_read(&self, recipient_id: PrimaryKey) -> Result<u64> {
        let mut state = self.state.lock();
        let mut marked = 0;

        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
        {
            notification.read = true;
            marked += 1;
        }

        Ok(marked)
    }

    async fn unread_notification_count(&self, recipient_id: PrimaryKey) -> Result<u64> {
        let state = self.state.lock();

        Ok(state
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .count() as u64)
    }
}
