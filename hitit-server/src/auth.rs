use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    routing::{get, post},
    Json,
};
use hitit_collab::{Credentials, NewPlainUser, UserData};
use log::info;

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{LoginSchema, RegisterSchema, ValidatedJson},
    serialized::{LoginResult, ToSerialized, User},
    Router,
};

/// The cookie a browser client can carry its session token in
pub const SESSION_COOKIE: &str = "hitit_session";

/// The logged in user of a request
pub struct Session {
    pub token: String,
    pub user: UserData,
}

#[async_trait]
impl FromRequestParts<ServerContext> for Session {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .ok_or(ServerError::Unauthorized("Missing authorization"))?;

        let session = state
            .collab
            .auth
            .session(&token)
            .await
            .map_err(|_| ServerError::Unauthorized("Session does not exist"))?;

        Ok(Self {
            token,
            user: session.user,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|x| x.to_str().ok())?;

    let mut words = header.split_ascii_whitespace();

    match (words.next(), words.next()) {
        (Some("Bearer"), Some(token)) => Some(token.to_string()),
        _ => None,
    }
}

fn cookie_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|x| x.to_str().ok())
        .flat_map(|x| x.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterSchema,
    responses(
        (status = 201, body = User),
        (status = 409, description = "The username is taken")
    )
)]
async fn register(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<RegisterSchema>,
) -> ServerResult<(StatusCode, Json<User>)> {
    let user = context
        .collab
        .auth
        .register(NewPlainUser {
            username: body.username,
            password: body.password,
            display_name: body.display_name,
        })
        .await?;

    info!("Registered user {}", user.username);

    Ok((StatusCode::CREATED, Json(user.to_serialized())))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginSchema,
    responses(
        (status = 200, body = LoginResult),
        (status = 400, description = "Invalid credentials")
    )
)]
async fn login(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<LoginSchema>,
) -> ServerResult<Json<LoginResult>> {
    let session = context
        .collab
        .auth
        .login(Credentials {
            username: body.username,
            password: body.password,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The session was deleted")
    )
)]
async fn logout(session: Session, context: ServerContext) -> ServerResult<StatusCode> {
    context.collab.auth.logout(&session.token).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/auth/user",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User)
    )
)]
async fn user(session: Session) -> Json<User> {
    Json(session.user.to_serialized())
}

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/user", get(user))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, Request};

    use super::*;

    fn request_parts(name: header::HeaderName, value: &str) -> Parts {
        let (mut parts, _) = Request::new(()).into_parts();
        parts
            .headers
            .insert(name, HeaderValue::from_str(value).unwrap());
        parts
    }

    #[test]
    fn reads_bearer_tokens() {
        let parts = request_parts(header::AUTHORIZATION, "Bearer abc123");
        assert_eq!(bearer_token(&parts).as_deref(), Some("abc123"));

        let parts = request_parts(header::AUTHORIZATION, "Basic abc123");
        assert_eq!(bearer_token(&parts), None);
    }

    #[test]
    fn reads_session_cookies() {
        let parts = request_parts(header::COOKIE, "theme=dark; hitit_session=xyz; lang=en");
        assert_eq!(cookie_token(&parts).as_deref(), Some("xyz"));

        let parts = request_parts(header::COOKIE, "theme=dark");
        assert_eq!(cookie_token(&parts), None);
    }
}
