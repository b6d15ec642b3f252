use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use hitit_collab::{VersionChanges, VersionDetails};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{
        CompareQuery, NewVersionSchema, PageQuery, RestoreSchema, UpdateVersionSchema,
        ValidatedJson,
    },
    serialized::{Comparison, Restoration, ToSerialized, Version, VersionPage},
    Router,
};

#[utoipa::path(
    post,
    path = "/api/jams/{jamId}/versions",
    tag = "versions",
    params(("jamId" = i32, Path, description = "The id of the jam")),
    request_body = NewVersionSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = Version),
        (status = 403, description = "The user can't edit the jam")
    )
)]
async fn create_version(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<NewVersionSchema>,
) -> ServerResult<(StatusCode, Json<Version>)> {
    let version = context
        .collab
        .versions
        .create(
            &session.user,
            jam_id,
            VersionDetails {
                name: body.version_name,
                description: body.description,
                tags: body.tags,
                is_pinned: body.is_pinned,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(version.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/api/jams/{jamId}/versions",
    tag = "versions",
    params(("jamId" = i32, Path, description = "The id of the jam"), PageQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Versions, newest first", body = VersionPage)
    )
)]
async fn list_versions(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
    Query(page): Query<PageQuery>,
) -> ServerResult<Json<VersionPage>> {
    let versions = context
        .collab
        .versions
        .list(&session.user, jam_id, page.limit, page.skip)
        .await?;

    Ok(Json(versions.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/jams/{jamId}/versions/compare",
    tag = "versions",
    params(("jamId" = i32, Path, description = "The id of the jam"), CompareQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Comparison),
        (status = 404, description = "One of the versions doesn't exist")
    )
)]
async fn compare_versions(
    session: Session,
    context: ServerContext,
    Path(jam_id): Path<i32>,
    Query(query): Query<CompareQuery>,
) -> ServerResult<Json<Comparison>> {
    let comparison = context
        .collab
        .versions
        .compare(&session.user, jam_id, query.v1, query.v2)
        .await?;

    Ok(Json(comparison.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/jams/{jamId}/versions/{versionNumber}",
    tag = "versions",
    params(
        ("jamId" = i32, Path, description = "The id of the jam"),
        ("versionNumber" = i32, Path, description = "The number of the version within the jam")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Version)
    )
)]
async fn version(
    session: Session,
    context: ServerContext,
    Path((jam_id, version_number)): Path<(i32, i32)>,
) -> ServerResult<Json<Version>> {
    let version = context
        .collab
        .versions
        .version(&session.user, jam_id, version_number)
        .await?;

    Ok(Json(version.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/api/jams/{jamId}/versions/{versionNumber}",
    tag = "versions",
    params(
        ("jamId" = i32, Path, description = "The id of the jam"),
        ("versionNumber" = i32, Path, description = "The number of the version within the jam")
    ),
    request_body = UpdateVersionSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Version)
    )
)]
async fn update_version(
    session: Session,
    context: ServerContext,
    Path((jam_id, version_number)): Path<(i32, i32)>,
    ValidatedJson(body): ValidatedJson<UpdateVersionSchema>,
) -> ServerResult<Json<Version>> {
    let version = context
        .collab
        .versions
        .update(
            &session.user,
            jam_id,
            version_number,
            VersionChanges {
                name: body.version_name,
                description: body.description,
                tags: body.tags,
                is_pinned: body.is_pinned,
            },
        )
        .await?;

    Ok(Json(version.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/api/jams/{jamId}/versions/{versionNumber}",
    tag = "versions",
    params(
        ("jamId" = i32, Path, description = "The id of the jam"),
        ("versionNumber" = i32, Path, description = "The number of the version within the jam")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The version was deleted")
    )
)]
async fn delete_version(
    session: Session,
    context: ServerContext,
    Path((jam_id, version_number)): Path<(i32, i32)>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .versions
        .delete(&session.user, jam_id, version_number)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/jams/{jamId}/versions/{versionNumber}/restore",
    tag = "versions",
    params(
        ("jamId" = i32, Path, description = "The id of the jam"),
        ("versionNumber" = i32, Path, description = "The number of the version within the jam")
    ),
    request_body = RestoreSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Restoration)
    )
)]
async fn restore_version(
    session: Session,
    context: ServerContext,
    Path((jam_id, version_number)): Path<(i32, i32)>,
    body: Option<Json<RestoreSchema>>,
) -> ServerResult<Json<Restoration>> {
    let Json(body) = body.unwrap_or_default();
    let restoration = context
        .collab
        .versions
        .restore(&session.user, jam_id, version_number, body.create_backup)
        .await?;

    Ok(Json(restoration.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/jams/:jamId/versions",
            get(list_versions).post(create_version),
        )
        .route("/jams/:jamId/versions/compare", get(compare_versions))
        .route(
            "/jams/:jamId/versions/:versionNumber",
            get(version).patch(update_version).delete(delete_version),
        )
        .route(
            "/jams/:jamId/versions/:versionNumber/restore",
            post(restore_version),
        )
}
