use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, patch, post},
    Json,
};
use hitit_collab::{JamChanges, JamDetails};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{
        parse_role, NewCollaboratorSchema, NewJamSchema, RoleSchema, UpdateJamSchema,
        ValidatedJson,
    },
    serialized::{Jam, JamWithPermissions, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/api/jams",
    tag = "jams",
    request_body = NewJamSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Jam)
    )
)]
async fn create_jam(
    session: Session,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<NewJamSchema>,
) -> ServerResult<(StatusCode, Json<Jam>)> {
    let jam = context
        .collab
        .jams
        .create(
            &session.user,
            JamDetails {
                title: body.title,
                description: body.description,
                genre: body.genre,
                image: body.image,
                is_private: body.is_private,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(jam.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/api/jams/{jamId}",
    tag = "jams",
    params(("jamId" = i32, Path, description = "The id of the jam")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JamWithPermissions),
        (status = 403, description = "The jam is private")
    )
)]
async fn jam(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
) -> ServerResult<Json<JamWithPermissions>> {
    let view = context.collab.jams.jam(jam_id, &session.user).await?;
    let active_users = context.collab.rooms.active_users(jam_id);

    Ok(Json(JamWithPermissions::new(&view, active_users)))
}

#[utoipa::path(
    patch,
    path = "/api/jams/{jamId}",
    tag = "jams",
    params(("jamId" = i32, Path, description = "The id of the jam")),
    request_body = UpdateJamSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Jam)
    )
)]
async fn update_jam(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<UpdateJamSchema>,
) -> ServerResult<Json<Jam>> {
    let jam = context
        .collab
        .jams
        .update(
            &session.user,
            jam_id,
            JamChanges {
                title: body.title,
                description: body.description,
                genre: body.genre,
                image: body.image,
                is_private: body.is_private,
            },
        )
        .await?;

    Ok(Json(jam.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/jams/{jamId}/clips/{clipId}",
    tag = "jams",
    params(
        ("jamId" = i32, Path, description = "The id of the jam"),
        ("clipId" = i32, Path, description = "The id of the clip")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Jam)
    )
)]
async fn add_clip(
    session: Session,
    context: ServerContext,
    Path((jam_id, clip_id)): Path<(i32, i32)>,
) -> ServerResult<Json<Jam>> {
    let jam = context
        .collab
        .jams
        .add_clip(&session.user, jam_id, clip_id)
        .await?;

    Ok(Json(jam.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/api/jams/{jamId}/clips/{clipId}",
    tag = "jams",
    params(
        ("jamId" = i32, Path, description = "The id of the jam"),
        ("clipId" = i32, Path, description = "The id of the clip")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Jam)
    )
)]
async fn remove_clip(
    session: Session,
    context: ServerContext,
    Path((jam_id, clip_id)): Path<(i32, i32)>,
) -> ServerResult<Json<Jam>> {
    let jam = context
        .collab
        .jams
        .remove_clip(&session.user, jam_id, clip_id)
        .await?;

    Ok(Json(jam.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/jams/{jamId}/like",
    tag = "jams",
    params(("jamId" = i32, Path, description = "The id of the jam")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Jam)
    )
)]
async fn like_jam(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
) -> ServerResult<Json<Jam>> {
    let jam = context.collab.jams.like(&session.user, jam_id).await?;

    Ok(Json(jam.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/jams/{jamId}/collaborators",
    tag = "jams",
    params(("jamId" = i32, Path, description = "The id of the jam")),
    request_body = NewCollaboratorSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Jam)
    )
)]
async fn add_collaborator(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<NewCollaboratorSchema>,
) -> ServerResult<Json<Jam>> {
    let role = parse_role(body.role.as_deref())?;
    let jam = context
        .collab
        .jams
        .add_collaborator(&session.user, jam_id, body.user_id, role)
        .await?;

    Ok(Json(jam.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/api/jams/{jamId}/collaborators/{userId}",
    tag = "jams",
    params(
        ("jamId" = i32, Path, description = "The id of the jam"),
        ("userId" = i32, Path, description = "The id of the collaborator")
    ),
    request_body = RoleSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Jam)
    )
)]
async fn change_role(
    session: Session,
    context: ServerContext,
    Path((jam_id, user_id)): Path<(i32, i32)>,
    ValidatedJson(body): ValidatedJson<RoleSchema>,
) -> ServerResult<Json<Jam>> {
    let role = parse_role(Some(&body.role))?;
    let jam = context
        .collab
        .jams
        .change_role(&session.user, jam_id, user_id, role)
        .await?;

    Ok(Json(jam.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/api/jams/{jamId}/collaborators/{userId}",
    tag = "jams",
    params(
        ("jamId" = i32, Path, description = "The id of the jam"),
        ("userId" = i32, Path, description = "The id of the collaborator")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Jam)
    )
)]
async fn remove_collaborator(
    session: Session,
    context: ServerContext,
    Path((jam_id, user_id)): Path<(i32, i32)>,
) -> ServerResult<Json<Jam>> {
    let jam = context
        .collab
        .jams
        .remove_collaborator(&session.user, jam_id, user_id)
        .await?;

    Ok(Json(jam.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/jams", post(create_jam))
        .route("/jams/:jamId", get(jam).patch(update_jam))
        .route("/jams/:jamId/clips/:clipId", post(add_clip).delete(remove_clip))
        .route("/jams/:jamId/like", post(like_jam))
        .route("/jams/:jamId/collaborators", post(add_collaborator))
        .route(
            "/jams/:jamId/collaborators/:userId",
            patch(change_role).delete(remove_collaborator),
        )
}
