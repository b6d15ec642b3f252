use crate::{CollabContext, CollabError, NewNotification, NotificationData, PrimaryKey, UserData};

/// How many notifications a listing returns
const LIST_LIMIT: usize = 50;

pub struct Notifications {
    context: CollabContext,
}

impl Notifications {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Sends a notification. Skipped when the sender is the recipient, and never fails.
    pub async fn notify(&self, new_notification: NewNotification) {
        self.context.notify(new_notification).await
    }

    /// The newest notifications of a user
    pub async fn list(&self, user: &UserData) -> Result<Vec<NotificationData>, CollabError> {
        Ok(self
            .context
            .database
            .notifications_for_user(user.id, LIST_LIMIT)
            .await?)
    }

    pub async fn mark_read(
        &self,
        user: &UserData,
        notification_id: PrimaryKey,
    ) -> Result<(), CollabError> {
        Ok(self
            .context
            .database
            .mark_notification_read(notification_id, user.id)
            .await?)
    }

    /// Marks every notification of the user as read, returning how many changed
    pub async fn mark_all_read(&self, user: &UserData) -> Result<u64, CollabError> {
        Ok(self
            .context
            .database
            .mark_all_notifications_read(user.id)
            .await?)
    }

    pub async fn unread_count(&self, user: &UserData) -> Result<u64, CollabError> {
        Ok(self
            .context
            .database
            .unread_notification_count(user.id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing, NotificationKind};

    fn mention(from: &UserData, to: &UserData, message: &str) -> NewNotification {
        NewNotification {
            recipient_id: to.id,
            sender_id: from.id,
            kind: NotificationKind::Mention,
            jam_id: None,
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn notifications_are_read_per_recipient() {
        let collab = testing::collab();
        let alice = testing::user(&collab, "alice").await;
        let bob = testing::user(&collab, "bob").await;

        collab.notifications.notify(mention(&alice, &bob, "first")).await;
        collab.notifications.notify(mention(&alice, &bob, "second")).await;
        collab.notifications.notify(mention(&bob, &bob, "self")).await;

        let list = collab.notifications.list(&bob).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].message, "second");
        assert_eq!(collab.notifications.unread_count(&bob).await.unwrap(), 2);

        // Alice can't read Bob's notifications
        let result = collab.notifications.mark_read(&alice, list[0].id).await;
        assert!(matches!(result, Err(CollabError::NotFound(_))));

        collab.notifications.mark_read(&bob, list[0].id).await.unwrap();
        assert_eq!(collab.notifications.unread_count(&bob).await.unwrap(), 1);

        assert_eq!(collab.notifications.mark_all_read(&bob).await.unwrap(), 1);
        assert_eq!(collab.notifications.unread_count(&bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn listing_is_capped() {
        let collab = testing::collab();
        let alice = testing::user(&collab, "alice").await;
        let bob = testing::user(&collab, "bob").await;

        for i in 0..(LIST_LIMIT + 5) {
            collab
                .notifications
                .notify(mention(&alice, &bob, &format!("ping {}", i)))
                .await;
        }

        let list = collab.notifications.list(&bob).await.unwrap();
        assert_eq!(list.len(), LIST_LIMIT);
        assert_eq!(list[0].message, format!("ping {}", LIST_LIMIT + 4));
    }
}
