use axum::{
    extract::{Path, Query},
    routing::get,
    Json,
};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::PageQuery,
    serialized::{ActivityPage, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/api/jams/{jamId}/activity",
    tag = "activity",
    params(("jamId" = i32, Path, description = "The id of the jam"), PageQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ActivityPage)
    )
)]
async fn jam_activity(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
    Query(page): Query<PageQuery>,
) -> ServerResult<Json<ActivityPage>> {
    let activities = context
        .collab
        .activity
        .jam_activity(jam_id, &session.user, page.limit, page.skip)
        .await?;

    Ok(Json(activities.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/user/activity",
    tag = "activity",
    params(PageQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Everything the user did", body = ActivityPage)
    )
)]
async fn user_activity(
    session: Session,
    context: ServerContext,
    Query(page): Query<PageQuery>,
) -> ServerResult<Json<ActivityPage>> {
    let activities = context
        .collab
        .activity
        .user_activity(session.user.id, page.limit, page.skip)
        .await?;

    Ok(Json(activities.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/activity/feed",
    tag = "activity",
    params(PageQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Activity of every jam the user is part of", body = ActivityPage)
    )
)]
async fn feed(
    session: Session,
    context: ServerContext,
    Query(page): Query<PageQuery>,
) -> ServerResult<Json<ActivityPage>> {
    let activities = context
        .collab
        .activity
        .feed(session.user.id, page.limit, page.skip)
        .await?;

    Ok(Json(activities.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/jams/:jamId/activity", get(jam_activity))
        .route("/user/activity", get(user_activity))
        .route("/activity/feed", get(feed))
}
