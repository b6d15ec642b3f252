use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Json,
};
use hitit_collab::InviteDetails;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{parse_role, InviteSchema, ValidatedJson},
    serialized::{Invite, Jam, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/api/jams/{jamId}/invite",
    tag = "invites",
    params(("jamId" = i32, Path, description = "The id of the jam")),
    request_body = InviteSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Invite),
        (status = 403, description = "Only the jam owner can send invites"),
        (status = 409, description = "There is already a pending invite for this user")
    )
)]
async fn send_invite(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<InviteSchema>,
) -> ServerResult<(StatusCode, Json<Invite>)> {
    let role = parse_role(body.role.as_deref())?;
    let invite = context
        .collab
        .invites
        .send(
            &session.user,
            jam_id,
            InviteDetails {
                invited_user_id: body.user_id,
                role,
                message: body.message,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(invite.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/api/jams/{jamId}/invites",
    tag = "invites",
    params(("jamId" = i32, Path, description = "The id of the jam")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Invite>)
    )
)]
async fn jam_invites(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
) -> ServerResult<Json<Vec<Invite>>> {
    let invites = context.collab.invites.for_jam(&session.user, jam_id).await?;

    Ok(Json(invites.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/invites",
    tag = "invites",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Pending invites addressed to the user", body = Vec<Invite>)
    )
)]
async fn my_invites(session: Session, context: ServerContext) -> ServerResult<Json<Vec<Invite>>> {
    let invites = context.collab.invites.mine(&session.user).await?;

    Ok(Json(invites.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/invites/{inviteId}/accept",
    tag = "invites",
    params(("inviteId" = i32, Path, description = "The id of the invite")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The jam the user now collaborates on", body = Jam),
        (status = 400, description = "This invite has expired"),
        (status = 409, description = "This invite has already been responded to")
    )
)]
async fn accept_invite(
    session: Session,
    context: ServerContext,
    Path(invite_id): Path<i32>,
) -> ServerResult<Json<Jam>> {
    let jam = context
        .collab
        .invites
        .accept(&session.user, invite_id)
        .await?;

    Ok(Json(jam.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/invites/{inviteId}/decline",
    tag = "invites",
    params(("inviteId" = i32, Path, description = "The id of the invite")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Invite),
        (status = 409, description = "This invite has already been responded to")
    )
)]
async fn decline_invite(
    session: Session,
    context: ServerContext,
    Path(invite_id): Path<i32>,
) -> ServerResult<Json<Invite>> {
    let invite = context
        .collab
        .invites
        .decline(&session.user, invite_id)
        .await?;

    Ok(Json(invite.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/jams/:jamId/invite", post(send_invite))
        .route("/jams/:jamId/invites", get(jam_invites))
        .route("/invites", get(my_invites))
        .route("/invites/:inviteId/accept", post(accept_invite))
        .route("/invites/:inviteId/decline", post(decline_invite))
}
