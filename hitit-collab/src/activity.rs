use chrono::{DateTime, Utc};
use hitit_core::{Page, PageRequest};
use log::info;

use crate::{
    ActivityData, ActivityScope, CollabContext, CollabError, NewActivity, PrimaryKey, UserData,
};

/// The append-only log of what happened in jams
pub struct ActivityLog {
    context: CollabContext,
}

impl ActivityLog {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Appends an entry. Never fails from the caller's point of view.
    pub async fn log(&self, new_activity: NewActivity) {
        self.context.log_activity(new_activity).await
    }

    /// Lists the activity of a jam, newest first
    pub async fn jam_activity(
        &self,
        jam_id: PrimaryKey,
        viewer: &UserData,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Page<ActivityData>, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(viewer.id).can_view {
            return Err(CollabError::forbidden(
                "You do not have permission to view this jam's activity",
            ));
        }

        self.list(ActivityScope::Jam(jam_id), limit, skip).await
    }

    /// Lists everything a user did, newest first
    pub async fn user_activity(
        &self,
        user_id: PrimaryKey,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Page<ActivityData>, CollabError> {
        self.list(ActivityScope::User(user_id), limit, skip).await
    }

    /// Lists the activity of every jam the user owns or collaborates on, newest first
    pub async fn feed(
        &self,
        user_id: PrimaryKey,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Page<ActivityData>, CollabError> {
        let jam_ids = self.context.database.jam_ids_for_member(user_id).await?;

        self.list(ActivityScope::Jams(jam_ids), limit, skip).await
    }

    /// Removes entries older than the retention window, returning the amount removed
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, CollabError> {
        let cutoff = now - self.context.config.activity_retention();
        let removed = self.context.database.delete_activity_before(cutoff).await?;

        if removed > 0 {
            info!("Pruned {} activity entries older than {}", removed, cutoff);
        }

        Ok(removed)
    }

    async fn list(
        &self,
        scope: ActivityScope,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Page<ActivityData>, CollabError> {
        let page = PageRequest::new(limit, skip, &self.context.config);

        Ok(self.context.database.list_activity(scope, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::{testing, ActionType};

    #[tokio::test]
    async fn jam_activity_is_newest_first_and_paginated() {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let jam = testing::jam(&collab, &owner, false).await;

        for i in 0..4 {
            collab
                .activity
                .log(
                    NewActivity::new(jam.id, owner.id, ActionType::MixUpdated, format!("mix {}", i))
                        .metadata(json!({ "step": i })),
                )
                .await;
        }

        // jam_created + 4 mix updates
        let page = collab
            .activity
            .jam_activity(jam.id, &owner, Some(2), Some(0))
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].description, "mix 3");
        assert_eq!(page.items[1].description, "mix 2");
        assert!(page.has_more());

        let last = collab
            .activity
            .jam_activity(jam.id, &owner, Some(2), Some(4))
            .await
            .unwrap();

        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].action_type, ActionType::JamCreated);
        assert!(!last.has_more());
    }

    #[tokio::test]
    async fn private_jam_activity_requires_access() {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let stranger = testing::user(&collab, "stranger").await;
        let private = testing::jam(&collab, &owner, true).await;
        let public = testing::jam(&collab, &owner, false).await;

        let result = collab
            .activity
            .jam_activity(private.id, &stranger, None, None)
            .await;
        assert!(matches!(result, Err(CollabError::Forbidden(_))));

        let result = collab
            .activity
            .jam_activity(public.id, &stranger, None, None)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn feed_covers_owned_and_collaborated_jams() {
        let collab = testing::collab();
        let alice = testing::user(&collab, "alice").await;
        let bob = testing::user(&collab, "bob").await;

        let own = testing::jam(&collab, &alice, false).await;
        let theirs = testing::jam(&collab, &bob, false).await;
        let unrelated = testing::jam(&collab, &bob, false).await;

        collab
            .jams
            .add_collaborator(&bob, theirs.id, alice.id, hitit_core::Role::Viewer)
            .await
            .unwrap();

        let feed = collab.activity.feed(alice.id, None, None).await.unwrap();
        let jams: Vec<_> = feed.items.iter().map(|a| a.jam_id).collect();

        assert!(jams.contains(&own.id));
        assert!(jams.contains(&theirs.id));
        assert!(!jams.contains(&unrelated.id));
        assert_eq!(feed.limit, 50);

        let mine = collab.activity.user_activity(alice.id, None, None).await.unwrap();
        assert!(mine.items.iter().all(|a| a.user_id == alice.id));
    }

    #[tokio::test]
    async fn pruning_keeps_recent_entries() {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let jam = testing::jam(&collab, &owner, false).await;

        let removed = collab.activity.prune_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 0);

        let far_future = Utc::now() + Duration::days(365);
        let removed = collab.activity.prune_expired(far_future).await.unwrap();
        assert_eq!(removed, 1);

        let page = collab
            .activity
            .jam_activity(jam.id, &owner, None, None)
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }
}
