use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Json,
};
use hitit_collab::RequestDetails;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{parse_role, JoinRequestSchema, ValidatedJson},
    serialized::{JoinRequest, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/api/jams/{jamId}/request",
    tag = "requests",
    params(("jamId" = i32, Path, description = "The id of the jam")),
    request_body = JoinRequestSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = JoinRequest),
        (status = 409, description = "You have already sent a request to join this jam")
    )
)]
async fn request_to_join(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<JoinRequestSchema>,
) -> ServerResult<(StatusCode, Json<JoinRequest>)> {
    let role = parse_role(body.requested_role.as_deref())?;
    let request = context
        .collab
        .requests
        .request_to_join(
            &session.user,
            jam_id,
            RequestDetails {
                role,
                message: body.message,
                skills: body.skills,
                portfolio: body.portfolio,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(request.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/api/jams/{jamId}/requests",
    tag = "requests",
    params(("jamId" = i32, Path, description = "The id of the jam")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<JoinRequest>)
    )
)]
async fn jam_requests(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
) -> ServerResult<Json<Vec<JoinRequest>>> {
    let requests = context
        .collab
        .requests
        .for_jam(&session.user, jam_id)
        .await?;

    Ok(Json(requests.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/my-requests",
    tag = "requests",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<JoinRequest>)
    )
)]
async fn my_requests(
    session: Session,
    context: ServerContext,
) -> ServerResult<Json<Vec<JoinRequest>>> {
    let requests = context.collab.requests.mine(&session.user).await?;

    Ok(Json(requests.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/requests/{requestId}/approve",
    tag = "requests",
    params(("requestId" = i32, Path, description = "The id of the join request")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JoinRequest),
        (status = 409, description = "This request has already been responded to")
    )
)]
async fn approve_request(
    session: Session,
    context: ServerContext,
    Path(request_id): Path<i32>,
) -> ServerResult<Json<JoinRequest>> {
    let request = context
        .collab
        .requests
        .approve(&session.user, request_id)
        .await?;

    Ok(Json(request.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/requests/{requestId}/deny",
    tag = "requests",
    params(("requestId" = i32, Path, description = "The id of the join request")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JoinRequest),
        (status = 409, description = "This request has already been responded to")
    )
)]
async fn deny_request(
    session: Session,
    context: ServerContext,
    Path(request_id): Path<i32>,
) -> ServerResult<Json<JoinRequest>> {
    let request = context
        .collab
        .requests
        .deny(&session.user, request_id)
        .await?;

    Ok(Json(request.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/jams/:jamId/request", post(request_to_join))
        .route("/jams/:jamId/requests", get(jam_requests))
        .route("/my-requests", get(my_requests))
        .route("/requests/:requestId/approve", post(approve_request))
        .route("/requests/:requestId/deny", post(deny_request))
}
