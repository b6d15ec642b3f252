use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Json,
};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    serialized::{Count, Notification, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "notifications",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The newest notifications of the user", body = Vec<Notification>)
    )
)]
async fn notifications(
    session: Session,
    context: ServerContext,
) -> ServerResult<Json<Vec<Notification>>> {
    let notifications = context.collab.notifications.list(&session.user).await?;

    Ok(Json(notifications.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread",
    tag = "notifications",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Count)
    )
)]
async fn unread_count(session: Session, context: ServerContext) -> ServerResult<Json<Count>> {
    let count = context
        .collab
        .notifications
        .unread_count(&session.user)
        .await?;

    Ok(Json(Count::new(count)))
}

#[utoipa::path(
    post,
    path = "/api/notifications/{notificationId}/read",
    tag = "notifications",
    params(("notificationId" = i32, Path, description = "The id of the notification")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The notification was marked as read")
    )
)]
async fn mark_read(
    session: Session,
    context: ServerContext,
    Path(notification_id): Path<i32>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .notifications
        .mark_read(&session.user, notification_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/notifications/read-all",
    tag = "notifications",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "How many notifications were marked as read", body = Count)
    )
)]
async fn mark_all_read(session: Session, context: ServerContext) -> ServerResult<Json<Count>> {
    let count = context
        .collab
        .notifications
        .mark_all_read(&session.user)
        .await?;

    Ok(Json(Count::new(count)))
}

pub fn router() -> Router {
    Router::new()
        .route("/notifications", get(notifications))
        .route("/notifications/unread", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/:notificationId/read", post(mark_read))
}
