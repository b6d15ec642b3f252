use chrono::Utc;
use hitit_core::Role;
use log::{info, warn};
use serde_json::json;

use crate::{
    ActionType, CollabContext, CollabError, DatabaseError, InviteData, InviteStatus, JamData,
    NewActivity, NewInvite, NewNotification, NotificationKind, PrimaryKey, UserData,
};

/// The longest message an invite or request can carry
pub const MAX_MESSAGE_LENGTH: usize = 500;

const ALREADY_RESPONDED: &str = "This invite has already been responded to";

/// Invitations from jam owners to other users
pub struct Invites {
    context: CollabContext,
}

#[derive(Debug, Clone)]
pub struct InviteDetails {
    pub invited_user_id: PrimaryKey,
    pub role: Role,
    pub message: String,
}

impl Invites {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Invites a user to collaborate on a jam. Only the owner can do this.
    pub async fn send(
        &self,
        owner: &UserData,
        jam_id: PrimaryKey,
        details: InviteDetails,
    ) -> Result<InviteData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(owner.id).is_owner {
            return Err(CollabError::forbidden(
                "Only the jam owner can send invites",
            ));
        }

        if details.message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(CollabError::validation(format!(
                "Message cannot be longer than {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }

        let invited_user = self.context.user(details.invited_user_id).await?;

        if invited_user.id == jam.owner_id {
            return Err(CollabError::validation("The owner cannot be invited to their own jam"));
        }

        if jam.collaborator(invited_user.id).is_some() {
            return Err(CollabError::validation(
                "This user is already a collaborator on this jam",
            ));
        }

        let invite = self
            .context
            .database
            .create_invite(NewInvite {
                jam_id,
                invited_user_id: invited_user.id,
                invited_by: owner.id,
                role: details.role,
                message: details.message,
                expires_at: Utc::now() + self.context.config.invite_lifetime(),
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict { .. } => {
                    CollabError::conflict("There is already a pending invite for this user")
                }
                e => e.into(),
            })?;

        info!(
            "{} invited {} to jam {} as a {}",
            owner.username, invited_user.username, jam_id, invite.role
        );

        self.context
            .notify(NewNotification {
                recipient_id: invited_user.id,
                sender_id: owner.id,
                kind: NotificationKind::CollaboratorAdd,
                jam_id: Some(jam_id),
                message: format!(
                    "{} invited you to collaborate on \"{}\" as a {}",
                    owner.username, jam.title, invite.role
                ),
            })
            .await;

        self.context
            .log_activity(
                NewActivity::new(
                    jam_id,
                    owner.id,
                    ActionType::InviteSent,
                    format!(
                        "{} invited {} to collaborate as a {}",
                        owner.username, invited_user.username, invite.role
                    ),
                )
                .target_user(invited_user.id)
                .metadata(json!({
                    "role": invite.role,
                    "invitedUserName": invited_user.username,
                })),
            )
            .await;

        Ok(invite)
    }

    /// Accepts an invite, making the invited user a collaborator with the invited role
    pub async fn accept(&self, user: &UserData, invite_id: PrimaryKey) -> Result<JamData, CollabError> {
        let invite = self.pending_invite_for(user, invite_id).await?;
        let now = Utc::now();

        if now > invite.expires_at {
            match self
                .context
                .database
                .close_invite(invite_id, InviteStatus::Expired, None)
                .await
            {
                Ok(_) | Err(DatabaseError::Conflict { .. }) => {}
                Err(e) => warn!("Failed to expire invite {}: {}", invite_id, e),
            }

            return Err(CollabError::validation("This invite has expired"));
        }

        let invite = self
            .context
            .database
            .accept_invite(invite_id, now)
            .await
            .map_err(already_responded)?;

        let jam = self.context.jam(invite.jam_id).await?;

        info!("{} joined jam {} as a {}", user.username, jam.id, invite.role);

        self.context
            .notify(NewNotification {
                recipient_id: invite.invited_by,
                sender_id: user.id,
                kind: NotificationKind::CollaboratorAdd,
                jam_id: Some(jam.id),
                message: format!("{} accepted your invite to \"{}\"", user.username, jam.title),
            })
            .await;

        self.context
            .log_activity(
                NewActivity::new(
                    jam.id,
                    user.id,
                    ActionType::InviteAccepted,
                    format!(
                        "{} accepted the invitation and joined as a {}",
                        user.username, invite.role
                    ),
                )
                .metadata(json!({ "role": invite.role })),
            )
            .await;

        Ok(jam)
    }

    /// Declines an invite. The jam is left untouched.
    pub async fn decline(
        &self,
        user: &UserData,
        invite_id: PrimaryKey,
    ) -> Result<InviteData, CollabError> {
        self.pending_invite_for(user, invite_id).await?;

        self.context
            .database
            .close_invite(invite_id, InviteStatus::Declined, Some(Utc::now()))
            .await
            .map_err(already_responded)
    }

    /// Pending invites addressed to the user that haven't expired, newest first
    pub async fn mine(&self, user: &UserData) -> Result<Vec<InviteData>, CollabError> {
        Ok(self
            .context
            .database
            .pending_invites_for_user(user.id, Utc::now())
            .await?)
    }

    /// Pending invites of a jam. Only the owner can see these.
    pub async fn for_jam(
        &self,
        owner: &UserData,
        jam_id: PrimaryKey,
    ) -> Result<Vec<InviteData>, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(owner.id).is_owner {
            return Err(CollabError::forbidden(
                "Only the jam owner can view invites",
            ));
        }

        Ok(self.context.database.pending_invites_for_jam(jam_id).await?)
    }

    /// Returns the invite if it is addressed to the user and still pending
    async fn pending_invite_for(
        &self,
        user: &UserData,
        invite_id: PrimaryKey,
    ) -> Result<InviteData, CollabError> {
        let invite = self.context.database.invite_by_id(invite_id).await?;

        if invite.invited_user_id != user.id {
            return Err(CollabError::forbidden("This invite is not for you"));
        }

        if invite.status != InviteStatus::Pending {
            return Err(CollabError::conflict(ALREADY_RESPONDED));
        }

        Ok(invite)
    }
}

/// Another response won the race for the invite
fn already_responded(error: DatabaseError) -> CollabError {
    match error {
        DatabaseError::Conflict { .. } => CollabError::conflict(ALREADY_RESPONDED),
        e => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use hitit_core::{Capability, JamRole};

    use super::*;
    use crate::{testing, Collab};

    fn invite(user: &UserData, role: Role) -> InviteDetails {
        InviteDetails {
            invited_user_id: user.id,
            role,
            message: "Come jam with us".to_string(),
        }
    }

    async fn setup() -> (Collab, UserData, UserData, JamData) {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let guest = testing::user(&collab, "guest").await;
        let jam = testing::jam(&collab, &owner, true).await;

        (collab, owner, guest, jam)
    }

    #[tokio::test]
    async fn accepted_invite_grants_the_role() {
        let (collab, owner, guest, jam) = setup().await;

        let sent = collab
            .invites
            .send(&owner, jam.id, invite(&guest, Role::Contributor))
            .await
            .unwrap();
        assert_eq!(sent.status, InviteStatus::Pending);

        let mine = collab.invites.mine(&guest).await.unwrap();
        assert_eq!(mine.len(), 1);

        let jam = collab.invites.accept(&guest, sent.id).await.unwrap();
        let permissions = jam.permissions(guest.id);

        assert_eq!(permissions.role, Some(JamRole::Contributor));
        assert!(permissions.can_contribute);
        assert!(!permissions.can_edit);
        assert!(JamRole::Contributor.can(Capability::View));

        let collaborator = jam.collaborator(guest.id).unwrap();
        assert_eq!(collaborator.added_by, owner.id);

        let stored = collab.database.invite_by_id(sent.id).await.unwrap();
        assert_eq!(stored.status, InviteStatus::Accepted);
        assert!(stored.responded_at.is_some());

        // The inviter hears about it
        let notifications = collab.notifications.list(&owner).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert!(collab.invites.mine(&guest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_one_pending_invite_per_user() {
        let (collab, owner, guest, jam) = setup().await;

        collab
            .invites
            .send(&owner, jam.id, invite(&guest, Role::Viewer))
            .await
            .unwrap();

        let result = collab
            .invites
            .send(&owner, jam.id, invite(&guest, Role::Producer))
            .await;

        assert!(matches!(result, Err(CollabError::Conflict(_))));
        assert_eq!(collab.invites.for_jam(&owner, jam.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn only_the_owner_can_invite_and_list() {
        let (collab, owner, guest, jam) = setup().await;
        let other = testing::user(&collab, "other").await;

        let result = collab
            .invites
            .send(&guest, jam.id, invite(&other, Role::Viewer))
            .await;
        assert!(matches!(result, Err(CollabError::Forbidden(_))));

        let result = collab.invites.for_jam(&guest, jam.id).await;
        assert!(matches!(result, Err(CollabError::Forbidden(_))));

        let result = collab
            .invites
            .send(&owner, jam.id, invite(&owner, Role::Viewer))
            .await;
        assert!(matches!(result, Err(CollabError::Validation(_))));

        let result = collab
            .invites
            .send(
                &owner,
                jam.id,
                InviteDetails {
                    invited_user_id: 9999,
                    role: Role::Viewer,
                    message: String::new(),
                },
            )
            .await;
        assert!(matches!(result, Err(CollabError::NotFound(_))));
    }

    #[tokio::test]
    async fn responses_are_final() {
        let (collab, owner, guest, jam) = setup().await;

        let sent = collab
            .invites
            .send(&owner, jam.id, invite(&guest, Role::Viewer))
            .await
            .unwrap();

        let result = collab.invites.accept(&owner, sent.id).await;
        assert!(matches!(result, Err(CollabError::Forbidden(_))));

        let declined = collab.invites.decline(&guest, sent.id).await.unwrap();
        assert_eq!(declined.status, InviteStatus::Declined);

        let result = collab.invites.accept(&guest, sent.id).await;
        match result {
            Err(CollabError::Conflict(message)) => assert_eq!(message, ALREADY_RESPONDED),
            other => panic!("expected a conflict, got {:?}", other.map(|j| j.id)),
        }

        let result = collab.invites.decline(&guest, sent.id).await;
        assert!(matches!(result, Err(CollabError::Conflict(_))));

        let jam = collab.database.jam_by_id(jam.id).await.unwrap();
        assert!(jam.collaborators.is_empty());

        // A declined invite no longer blocks a new one
        collab
            .invites
            .send(&owner, jam.id, invite(&guest, Role::Producer))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_invites_cannot_be_accepted() {
        let (collab, owner, guest, jam) = setup().await;

        let stale = collab
            .database
            .create_invite(NewInvite {
                jam_id: jam.id,
                invited_user_id: guest.id,
                invited_by: owner.id,
                role: Role::Producer,
                message: String::new(),
                expires_at: Utc::now() - Duration::hours(1),
            })
            .await
            .unwrap();

        assert!(collab.invites.mine(&guest).await.unwrap().is_empty());

        let result = collab.invites.accept(&guest, stale.id).await;
        assert!(matches!(result, Err(CollabError::Validation(_))));

        let stored = collab.database.invite_by_id(stale.id).await.unwrap();
        assert_eq!(stored.status, InviteStatus::Expired);

        let jam = collab.database.jam_by_id(jam.id).await.unwrap();
        assert!(jam.collaborator(guest.id).is_none());
    }

    #[tokio::test]
    async fn existing_collaborators_cannot_be_invited() {
        let (collab, owner, guest, jam) = setup().await;

        collab
            .jams
            .add_collaborator(&owner, jam.id, guest.id, Role::Viewer)
            .await
            .unwrap();

        let result = collab
            .invites
            .send(&owner, jam.id, invite(&guest, Role::Producer))
            .await;
        assert!(matches!(result, Err(CollabError::Validation(_))));
    }
}
