use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipauto::utoipauto;

#[utoipauto(paths = "./hitit-server/src")]
#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    tags(
        (name = "auth", description = "Accounts and sessions"),
        (name = "jams", description = "Jams, their clips, and their collaborators"),
        (name = "invites", description = "Invitations sent by jam owners"),
        (name = "requests", description = "Requests to join a jam"),
        (name = "activity", description = "What happened in a jam, newest first"),
        (name = "versions", description = "Saved snapshots of a jam, with compare and restore"),
        (name = "notifications", description = "Notifications of the logged in user"),
        (name = "collaboration", description = "Live room relay over a WebSocket")
    ),
    info(
        title = "hit.it collaboration API",
        description = "hitit-server exposes jams, invites, requests, activity, and versions, plus a live collaboration socket"
    ))
]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
