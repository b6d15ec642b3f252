use chrono::Utc;
use hitit_core::{Collaborator, Permissions, Role};
use log::info;
use serde_json::json;

use crate::{
    ActionType, CollabContext, CollabError, JamData, NewActivity, NewJam, NewNotification,
    NotificationKind, PrimaryKey, UpdatedJam, UserData,
};

/// Manages jams, their clips, and their collaborators
pub struct Jams {
    context: CollabContext,
}

/// The user supplied fields of a new jam
#[derive(Debug, Clone)]
pub struct JamDetails {
    pub title: String,
    pub description: String,
    pub genre: String,
    pub image: Option<String>,
    pub is_private: bool,
}

/// Changes to a jam's settings. Fields left as [None] are kept.
#[derive(Debug, Default)]
pub struct JamChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub image: Option<String>,
    pub is_private: Option<bool>,
}

/// A jam as seen by a specific user
#[derive(Debug, Clone)]
pub struct JamView {
    pub jam: JamData,
    pub permissions: Permissions,
}

impl Jams {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a jam owned by the given user
    pub async fn create(&self, owner: &UserData, details: JamDetails) -> Result<JamData, CollabError> {
        if details.title.trim().is_empty() {
            return Err(CollabError::validation("A jam needs a title"));
        }

        let jam = self
            .context
            .database
            .create_jam(NewJam {
                user_id: owner.id,
                title: details.title,
                description: details.description,
                genre: details.genre,
                image: details.image,
                is_private: details.is_private,
            })
            .await?;

        info!("{} created jam {} ({})", owner.username, jam.id, jam.title);

        self.context
            .log_activity(NewActivity::new(
                jam.id,
                owner.id,
                ActionType::JamCreated,
                format!("{} created the jam \"{}\"", owner.username, jam.title),
            ))
            .await;

        Ok(jam)
    }

    /// Returns a jam along with what the viewer may do with it
    pub async fn jam(&self, jam_id: PrimaryKey, viewer: &UserData) -> Result<JamView, CollabError> {
        let jam = self.context.jam(jam_id).await?;
        let permissions = jam.permissions(viewer.id);

        if !permissions.can_view {
            return Err(CollabError::forbidden(
                "You do not have permission to view this jam",
            ));
        }

        Ok(JamView { jam, permissions })
    }

    /// Updates the settings of a jam. Requires edit rights.
    pub async fn update(
        &self,
        editor: &UserData,
        jam_id: PrimaryKey,
        changes: JamChanges,
    ) -> Result<JamData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(editor.id).can_edit {
            return Err(CollabError::forbidden(
                "You do not have permission to edit this jam",
            ));
        }

        if changes.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(CollabError::validation("A jam needs a title"));
        }

        let fields: Vec<_> = [
            ("title", changes.title.is_some()),
            ("description", changes.description.is_some()),
            ("genre", changes.genre.is_some()),
            ("image", changes.image.is_some()),
            ("isPrivate", changes.is_private.is_some()),
        ]
        .into_iter()
        .filter(|(_, changed)| *changed)
        .map(|(name, _)| name)
        .collect();

        let published = jam.is_private && changes.is_private == Some(false);

        let updated = self
            .context
            .database
            .update_jam(UpdatedJam {
                id: jam_id,
                title: changes.title,
                description: changes.description,
                genre: changes.genre,
                image: changes.image,
                is_private: changes.is_private,
            })
            .await?;

        self.context
            .log_activity(
                NewActivity::new(
                    jam_id,
                    editor.id,
                    ActionType::JamUpdated,
                    format!("{} updated the jam details", editor.username),
                )
                .metadata(json!({ "fields": fields })),
            )
            .await;

        if published {
            self.context
                .log_activity(NewActivity::new(
                    jam_id,
                    editor.id,
                    ActionType::JamPublished,
                    format!("{} made the jam public", editor.username),
                ))
                .await;
        }

        Ok(updated)
    }

    /// Adds a clip to the end of the jam. Requires contribute rights.
    pub async fn add_clip(
        &self,
        contributor: &UserData,
        jam_id: PrimaryKey,
        clip_id: PrimaryKey,
    ) -> Result<JamData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(contributor.id).can_contribute {
            return Err(CollabError::forbidden(
                "You do not have permission to add clips to this jam",
            ));
        }

        let added = self.context.database.add_clip(jam_id, clip_id).await?;

        if added {
            self.context
                .log_activity(
                    NewActivity::new(
                        jam_id,
                        contributor.id,
                        ActionType::ClipAdded,
                        format!("{} added clip {} to the jam", contributor.username, clip_id),
                    )
                    .target_clip(clip_id),
                )
                .await;
        }

        self.context.jam(jam_id).await
    }

    /// Removes a clip from the jam. Requires edit rights.
    pub async fn remove_clip(
        &self,
        editor: &UserData,
        jam_id: PrimaryKey,
        clip_id: PrimaryKey,
    ) -> Result<JamData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(editor.id).can_edit {
            return Err(CollabError::forbidden(
                "You do not have permission to remove clips from this jam",
            ));
        }

        let removed = self.context.database.remove_clip(jam_id, clip_id).await?;

        if !removed {
            return Err(CollabError::not_found("clip"));
        }

        self.context
            .log_activity(
                NewActivity::new(
                    jam_id,
                    editor.id,
                    ActionType::ClipRemoved,
                    format!("{} removed clip {} from the jam", editor.username, clip_id),
                )
                .target_clip(clip_id),
            )
            .await;

        self.context.jam(jam_id).await
    }

    /// Likes a jam, notifying its owner
    pub async fn like(&self, user: &UserData, jam_id: PrimaryKey) -> Result<JamData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(user.id).can_view {
            return Err(CollabError::forbidden(
                "You do not have permission to view this jam",
            ));
        }

        let jam = self.context.database.increment_likes(jam_id).await?;

        self.context
            .notify(NewNotification {
                recipient_id: jam.owner_id,
                sender_id: user.id,
                kind: NotificationKind::Like,
                jam_id: Some(jam.id),
                message: format!("{} liked your jam \"{}\"", user.username, jam.title),
            })
            .await;

        Ok(jam)
    }

    /// Adds a user as a collaborator directly. Only the owner can do this.
    pub async fn add_collaborator(
        &self,
        owner: &UserData,
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
        role: Role,
    ) -> Result<JamData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(owner.id).is_owner {
            return Err(CollabError::forbidden(
                "Only the jam owner can add collaborators",
            ));
        }

        if jam.owner_id == user_id {
            return Err(CollabError::validation("The owner is already part of this jam"));
        }

        if jam.collaborator(user_id).is_some() {
            return Err(CollabError::validation(
                "This user is already a collaborator on this jam",
            ));
        }

        let added_user = self.context.user(user_id).await?;

        self.context
            .database
            .create_collaborator(
                jam_id,
                Collaborator {
                    user_id,
                    role,
                    added_at: Utc::now(),
                    added_by: owner.id,
                },
            )
            .await?;

        self.context
            .notify(NewNotification {
                recipient_id: user_id,
                sender_id: owner.id,
                kind: NotificationKind::CollaboratorAdd,
                jam_id: Some(jam_id),
                message: format!(
                    "{} added you as a {} on \"{}\"",
                    owner.username, role, jam.title
                ),
            })
            .await;

        self.context
            .log_activity(
                NewActivity::new(
                    jam_id,
                    owner.id,
                    ActionType::CollaboratorAdded,
                    format!("{} added {} as a {}", owner.username, added_user.username, role),
                )
                .target_user(user_id)
                .metadata(json!({ "role": role, "addedUserName": added_user.username })),
            )
            .await;

        self.context.jam(jam_id).await
    }

    /// Removes a collaborator. Only the owner can do this.
    pub async fn remove_collaborator(
        &self,
        owner: &UserData,
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JamData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(owner.id).is_owner {
            return Err(CollabError::forbidden(
                "Only the jam owner can remove collaborators",
            ));
        }

        self.context
            .database
            .delete_collaborator(jam_id, user_id)
            .await?;

        let removed_name = self
            .context
            .user(user_id)
            .await
            .map(|u| u.username)
            .unwrap_or_else(|_| format!("user {}", user_id));

        self.context
            .log_activity(
                NewActivity::new(
                    jam_id,
                    owner.id,
                    ActionType::CollaboratorRemoved,
                    format!("{} removed {} from the jam", owner.username, removed_name),
                )
                .target_user(user_id)
                .metadata(json!({ "removedUserName": removed_name })),
            )
            .await;

        self.context.jam(jam_id).await
    }

    /// Changes the role of a collaborator. Only the owner can do this.
    pub async fn change_role(
        &self,
        owner: &UserData,
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
        role: Role,
    ) -> Result<JamData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(owner.id).is_owner {
            return Err(CollabError::forbidden(
                "Only the jam owner can change roles",
            ));
        }

        let previous_role = jam
            .collaborator(user_id)
            .map(|c| c.role)
            .ok_or_else(|| CollabError::not_found("collaborator"))?;

        if previous_role == role {
            return Ok(jam);
        }

        self.context
            .database
            .update_collaborator_role(jam_id, user_id, role)
            .await?;

        let username = self
            .context
            .user(user_id)
            .await
            .map(|u| u.username)
            .unwrap_or_else(|_| format!("user {}", user_id));

        self.context
            .log_activity(
                NewActivity::new(
                    jam_id,
                    owner.id,
                    ActionType::RoleChanged,
                    format!(
                        "{} changed {}'s role from {} to {}",
                        owner.username, username, previous_role, role
                    ),
                )
                .target_user(user_id)
                .metadata(json!({ "previousRole": previous_role, "newRole": role })),
            )
            .await;

        self.context.jam(jam_id).await
    }
}

#[cfg(test)]
mod tests {
    use hitit_core::JamRole;

    use super::*;
    use crate::{testing, ActivityScope};

    #[tokio::test]
    async fn creating_a_jam_logs_it() {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let jam = testing::jam(&collab, &owner, false).await;

        let page = collab
            .database
            .list_activity(ActivityScope::Jam(jam.id), hitit_core::PageRequest { limit: 10, skip: 0 })
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].action_type, ActionType::JamCreated);
        assert_eq!(page.items[0].description, "owner created the jam \"Night Drive\"");
    }

    #[tokio::test]
    async fn viewers_get_their_permissions() {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let stranger = testing::user(&collab, "stranger").await;
        let private = testing::jam(&collab, &owner, true).await;

        let view = collab.jams.jam(private.id, &owner).await.unwrap();
        assert!(view.permissions.is_owner);
        assert_eq!(view.permissions.role, Some(JamRole::Owner));

        let result = collab.jams.jam(private.id, &stranger).await;
        assert!(matches!(result, Err(CollabError::Forbidden(_))));
    }

    #[tokio::test]
    async fn clips_follow_role_capabilities() {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let contributor = testing::user(&collab, "contributor").await;
        let jam = testing::jam(&collab, &owner, false).await;

        collab
            .jams
            .add_collaborator(&owner, jam.id, contributor.id, Role::Contributor)
            .await
            .unwrap();

        let jam = collab.jams.add_clip(&contributor, jam.id, 7).await.unwrap();
        let jam = collab.jams.add_clip(&contributor, jam.id, 8).await.unwrap();
        assert_eq!(jam.clip_ids, vec![7, 8]);

        // Adding the same clip twice keeps a single reference
        let jam = collab.jams.add_clip(&owner, jam.id, 7).await.unwrap();
        assert_eq!(jam.clip_ids, vec![7, 8]);

        let result = collab.jams.remove_clip(&contributor, jam.id, 7).await;
        assert!(matches!(result, Err(CollabError::Forbidden(_))));

        let jam = collab.jams.remove_clip(&owner, jam.id, 7).await.unwrap();
        assert_eq!(jam.clip_ids, vec![8]);
    }

    #[tokio::test]
    async fn owner_manages_collaborators() {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let bob = testing::user(&collab, "bob").await;
        let jam = testing::jam(&collab, &owner, false).await;

        let result = collab
            .jams
            .add_collaborator(&owner, jam.id, owner.id, Role::Producer)
            .await;
        assert!(matches!(result, Err(CollabError::Validation(_))));

        let jam = collab
            .jams
            .add_collaborator(&owner, jam.id, bob.id, Role::Viewer)
            .await
            .unwrap();
        assert_eq!(jam.collaborator(bob.id).map(|c| c.added_by), Some(owner.id));

        let result = collab
            .jams
            .add_collaborator(&owner, jam.id, bob.id, Role::Producer)
            .await;
        assert!(matches!(result, Err(CollabError::Validation(_))));

        let result = collab
            .jams
            .add_collaborator(&bob, jam.id, owner.id, Role::Producer)
            .await;
        assert!(matches!(result, Err(CollabError::Forbidden(_))));

        let jam = collab
            .jams
            .change_role(&owner, jam.id, bob.id, Role::Producer)
            .await
            .unwrap();
        assert!(jam.permissions(bob.id).can_edit);

        let latest = collab
            .database
            .list_activity(ActivityScope::Jam(jam.id), hitit_core::PageRequest { limit: 1, skip: 0 })
            .await
            .unwrap();
        assert_eq!(latest.items[0].action_type, ActionType::RoleChanged);
        assert_eq!(latest.items[0].metadata["previousRole"], "viewer");
        assert_eq!(latest.items[0].metadata["newRole"], "producer");

        let jam = collab
            .jams
            .remove_collaborator(&owner, jam.id, bob.id)
            .await
            .unwrap();
        assert!(jam.permissions(bob.id).role.is_none());

        let notifications = collab.notifications.list(&bob).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::CollaboratorAdd);
    }

    #[tokio::test]
    async fn likes_notify_the_owner_but_not_themselves() {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let fan = testing::user(&collab, "fan").await;
        let jam = testing::jam(&collab, &owner, false).await;

        collab.jams.like(&fan, jam.id).await.unwrap();
        let jam = collab.jams.like(&owner, jam.id).await.unwrap();
        assert_eq!(jam.likes, 2);

        let notifications = collab.notifications.list(&owner).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].sender_id, fan.id);
        assert_eq!(notifications[0].kind, NotificationKind::Like);
    }

    #[tokio::test]
    async fn publishing_a_private_jam_is_logged() {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let jam = testing::jam(&collab, &owner, true).await;

        let jam = collab
            .jams
            .update(
                &owner,
                jam.id,
                JamChanges {
                    is_private: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!jam.is_private);

        let latest = collab
            .database
            .list_activity(ActivityScope::Jam(jam.id), hitit_core::PageRequest { limit: 2, skip: 0 })
            .await
            .unwrap();
        assert_eq!(latest.items[0].action_type, ActionType::JamPublished);
        assert_eq!(latest.items[1].action_type, ActionType::JamUpdated);
        assert_eq!(latest.items[1].metadata["fields"][0], "isPrivate");
    }
}
