use chrono::Utc;
use hitit_core::Role;
use log::info;
use serde_json::json;
use url::Url;

use crate::{
    ActionType, CollabContext, CollabError, DatabaseError, JamData, NewActivity, NewNotification,
    NewRequest, NotificationKind, PrimaryKey, RequestData, RequestStatus, UserData,
    MAX_MESSAGE_LENGTH,
};

const ALREADY_RESPONDED: &str = "This request has already been responded to";

/// Requests from users who want to join a jam
pub struct Requests {
    context: CollabContext,
}

#[derive(Debug, Clone, Default)]
pub struct RequestDetails {
    pub role: Role,
    pub message: String,
    pub skills: Vec<String>,
    pub portfolio: Option<String>,
}

impl Requests {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Asks the owner of a jam to join it
    pub async fn request_to_join(
        &self,
        user: &UserData,
        jam_id: PrimaryKey,
        details: RequestDetails,
    ) -> Result<RequestData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if jam.owner_id == user.id {
            return Err(CollabError::validation("You are the owner of this jam"));
        }

        if jam.collaborator(user.id).is_some() {
            return Err(CollabError::validation(
                "You are already a collaborator on this jam",
            ));
        }

        if details.message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(CollabError::validation(format!(
                "Message cannot be longer than {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }

        let portfolio = details
            .portfolio
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        if let Some(portfolio) = &portfolio {
            validate_portfolio(portfolio)?;
        }

        let skills = details
            .skills
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request = self
            .context
            .database
            .create_request(NewRequest {
                jam_id,
                requested_by: user.id,
                requested_role: details.role,
                message: details.message,
                skills,
                portfolio,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict { .. } => CollabError::conflict(
                    "You have already sent a request to join this jam",
                ),
                e => e.into(),
            })?;

        info!(
            "{} requested to join jam {} as a {}",
            user.username, jam_id, request.requested_role
        );

        self.context
            .notify(NewNotification {
                recipient_id: jam.owner_id,
                sender_id: user.id,
                kind: NotificationKind::CollaboratorAdd,
                jam_id: Some(jam_id),
                message: format!("{} requested to join \"{}\"", user.username, jam.title),
            })
            .await;

        self.context
            .log_activity(
                NewActivity::new(
                    jam_id,
                    user.id,
                    ActionType::RequestSent,
                    format!(
                        "{} requested to join as a {}",
                        user.username, request.requested_role
                    ),
                )
                .metadata(json!({ "requestedRole": request.requested_role })),
            )
            .await;

        Ok(request)
    }

    /// Approves a request, making the requester a collaborator. Only the owner can do this.
    pub async fn approve(
        &self,
        owner: &UserData,
        request_id: PrimaryKey,
    ) -> Result<RequestData, CollabError> {
        let (request, jam) = self.pending_request_for(owner, request_id).await?;

        let request = self
            .context
            .database
            .approve_request(request.id, owner.id, Utc::now())
            .await
            .map_err(already_responded)?;

        let requester_name = self
            .context
            .user(request.requested_by)
            .await
            .map(|u| u.username)
            .unwrap_or_else(|_| format!("user {}", request.requested_by));

        info!(
            "{} approved {} joining jam {} as a {}",
            owner.username, requester_name, jam.id, request.requested_role
        );

        self.context
            .notify(NewNotification {
                recipient_id: request.requested_by,
                sender_id: owner.id,
                kind: NotificationKind::CollaboratorAdd,
                jam_id: Some(jam.id),
                message: format!("Your request to join \"{}\" was approved!", jam.title),
            })
            .await;

        self.context
            .log_activity(
                NewActivity::new(
                    jam.id,
                    owner.id,
                    ActionType::RequestApproved,
                    format!(
                        "{} approved {}'s request to join as a {}",
                        owner.username, requester_name, request.requested_role
                    ),
                )
                .target_user(request.requested_by)
                .metadata(json!({
                    "role": request.requested_role,
                    "requestedUserName": requester_name,
                })),
            )
            .await;

        Ok(request)
    }

    /// Denies a request. Only the owner can do this.
    pub async fn deny(
        &self,
        owner: &UserData,
        request_id: PrimaryKey,
    ) -> Result<RequestData, CollabError> {
        let (request, _) = self.pending_request_for(owner, request_id).await?;

        self.context
            .database
            .deny_request(request.id, owner.id, Utc::now())
            .await
            .map_err(already_responded)
    }

    /// Pending requests of a jam. Only the owner can see these.
    pub async fn for_jam(
        &self,
        owner: &UserData,
        jam_id: PrimaryKey,
    ) -> Result<Vec<RequestData>, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(owner.id).is_owner {
            return Err(CollabError::forbidden(
                "Only the jam owner can view requests",
            ));
        }

        Ok(self.context.database.pending_requests_for_jam(jam_id).await?)
    }

    /// Every request the user has made, newest first
    pub async fn mine(&self, user: &UserData) -> Result<Vec<RequestData>, CollabError> {
        Ok(self.context.database.requests_by_user(user.id).await?)
    }

    /// Returns the request and its jam, if the user owns the jam and the request is still pending
    async fn pending_request_for(
        &self,
        owner: &UserData,
        request_id: PrimaryKey,
    ) -> Result<(RequestData, JamData), CollabError> {
        let request = self.context.database.request_by_id(request_id).await?;
        let jam = self.context.jam(request.jam_id).await?;

        if !jam.permissions(owner.id).is_owner {
            return Err(CollabError::forbidden(
                "Only the jam owner can respond to requests",
            ));
        }

        if request.status != RequestStatus::Pending {
            return Err(CollabError::conflict(ALREADY_RESPONDED));
        }

        Ok((request, jam))
    }
}

fn already_responded(error: DatabaseError) -> CollabError {
    match error {
        DatabaseError::Conflict { .. } => CollabError::conflict(ALREADY_RESPONDED),
        e => e.into(),
    }
}

fn validate_portfolio(portfolio: &str) -> Result<(), CollabError> {
    if portfolio.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(CollabError::validation("Portfolio link is too long"));
    }

    let url = Url::parse(portfolio)
        .map_err(|_| CollabError::validation("Portfolio must be a valid URL"))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(CollabError::validation(
            "Portfolio must be an http or https URL",
        )),
    }
}

#[cfg(test)]
mod tests {
    use hitit_core::JamRole;

    use super::*;
    use crate::{testing, Collab};

    async fn setup() -> (Collab, UserData, UserData, JamData) {
        let collab = testing::collab();
        let owner = testing::user(&collab, "owner").await;
        let fan = testing::user(&collab, "fan").await;
        let jam = testing::jam(&collab, &owner, false).await;

        (collab, owner, fan, jam)
    }

    fn details(role: Role) -> RequestDetails {
        RequestDetails {
            role,
            message: "I play bass".to_string(),
            skills: vec![" bass ".to_string(), "".to_string(), "mixing".to_string()],
            portfolio: Some("https://example.com/fan".to_string()),
        }
    }

    #[tokio::test]
    async fn approved_request_adds_the_requester() {
        let (collab, owner, fan, jam) = setup().await;

        let request = collab
            .requests
            .request_to_join(&fan, jam.id, details(Role::Producer))
            .await
            .unwrap();
        assert_eq!(request.skills, vec!["bass", "mixing"]);

        let pending = collab.requests.for_jam(&owner, jam.id).await.unwrap();
        assert_eq!(pending.len(), 1);

        let approved = collab.requests.approve(&owner, request.id).await.unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.responded_by, Some(owner.id));

        let jam = collab.database.jam_by_id(jam.id).await.unwrap();
        assert_eq!(jam.permissions(fan.id).role, Some(JamRole::Producer));
        assert_eq!(jam.collaborator(fan.id).map(|c| c.added_by), Some(owner.id));

        let result = collab.requests.deny(&owner, request.id).await;
        assert!(matches!(result, Err(CollabError::Conflict(_))));

        let notifications = collab.notifications.list(&fan).await.unwrap();
        assert_eq!(notifications.len(), 1);
    }

    #[tokio::test]
    async fn owners_and_collaborators_cannot_request() {
        let (collab, owner, fan, jam) = setup().await;

        let result = collab
            .requests
            .request_to_join(&owner, jam.id, RequestDetails::default())
            .await;
        match result {
            Err(CollabError::Validation(message)) => {
                assert_eq!(message, "You are the owner of this jam")
            }
            other => panic!("expected a validation error, got {:?}", other.map(|r| r.id)),
        }

        collab
            .jams
            .add_collaborator(&owner, jam.id, fan.id, Role::Viewer)
            .await
            .unwrap();

        let result = collab
            .requests
            .request_to_join(&fan, jam.id, RequestDetails::default())
            .await;
        assert!(matches!(result, Err(CollabError::Validation(_))));
    }

    #[tokio::test]
    async fn only_one_pending_request_per_user() {
        let (collab, _, fan, jam) = setup().await;

        collab
            .requests
            .request_to_join(&fan, jam.id, RequestDetails::default())
            .await
            .unwrap();

        let result = collab
            .requests
            .request_to_join(&fan, jam.id, RequestDetails::default())
            .await;
        assert!(matches!(result, Err(CollabError::Conflict(_))));
    }

    #[tokio::test]
    async fn denied_requests_leave_the_jam_alone() {
        let (collab, owner, fan, jam) = setup().await;

        let request = collab
            .requests
            .request_to_join(&fan, jam.id, RequestDetails::default())
            .await
            .unwrap();
        assert_eq!(request.requested_role, Role::Contributor);

        let result = collab.requests.deny(&fan, request.id).await;
        assert!(matches!(result, Err(CollabError::Forbidden(_))));

        let denied = collab.requests.deny(&owner, request.id).await.unwrap();
        assert_eq!(denied.status, RequestStatus::Denied);

        let jam = collab.database.jam_by_id(jam.id).await.unwrap();
        assert!(jam.collaborators.is_empty());

        let mine = collab.requests.mine(&fan).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, RequestStatus::Denied);

        // A new request is allowed once the old one was answered
        collab
            .requests
            .request_to_join(&fan, jam.id, RequestDetails::default())
            .await
            .unwrap();
    }

    #[test]
    fn portfolio_must_be_a_web_link() {
        assert!(validate_portfolio("https://soundcloud.com/fan").is_ok());
        assert!(validate_portfolio("http://fan.example").is_ok());
        assert!(validate_portfolio("ftp://fan.example").is_err());
        assert!(validate_portfolio("not a link").is_err());
    }
}
