mod activity;
mod auth;
mod collaboration;
mod context;
mod docs;
mod errors;
mod invites;
mod jams;
mod notifications;
mod requests;
mod schemas;
mod serialized;
mod versions;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::routing::get;
use chrono::Utc;
use hitit_collab::{Collab, DatabaseError, MemoryDatabase, PgDatabase, SharedDatabase};
use hitit_core::Config;
use log::{error, info, warn};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use auth::SESSION_COOKIE;
pub use context::ServerContext;
pub use docs::ApiDoc;
pub use errors::ServerError;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

/// How often expired activity is pruned
const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60 * 24);

pub type Router = axum::Router<ServerContext>;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("Could not connect to database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Could not listen on address: {0}")]
    Io(#[from] std::io::Error),
}

impl StartError {
    pub fn hint(&self) -> String {
        match self {
            StartError::Database(_) => "Make sure HITIT_DATABASE_URL points to a running PostgreSQL instance, or unset it to use an in-memory database.".to_string(),
            StartError::Config(_) => "Check the HITIT_* environment variables and try again.".to_string(),
            StartError::Io(_) => "Another process might be using the port. Set HITIT_SERVER_PORT to use a different one.".to_string(),
        }
    }
}

/// Builds the full application, with the API nested under /api
pub fn build_router(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .nest("/auth", auth::router())
        .merge(jams::router())
        .merge(invites::router())
        .merge(requests::router())
        .merge(activity::router())
        .merge(versions::router())
        .merge(notifications::router());

    Router::new()
        .nest("/api", api_router)
        .merge(collaboration::router())
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context)
}

/// Starts the hit.it server
pub async fn run_server() -> Result<(), StartError> {
    let port = env_var("HITIT_SERVER_PORT")?.unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let config = build_config(env_var("HITIT_HEARTBEAT_SECONDS")?)?;
    let collab = Arc::new(Collab::new(connect_database().await?, config));

    spawn_heartbeat(collab.clone());
    spawn_pruning(collab.clone());

    let router = build_router(ServerContext { collab });
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on port {}", port);

    axum::serve(listener, router.into_make_service()).await?;

    Ok(())
}

async fn connect_database() -> Result<SharedDatabase, StartError> {
    match env::var("HITIT_DATABASE_URL") {
        Ok(url) => {
            info!("Connecting to database...");
            Ok(Arc::new(PgDatabase::new(&url).await?))
        }
        Err(_) => {
            warn!("HITIT_DATABASE_URL is not set, data will only be kept in memory");
            Ok(Arc::new(MemoryDatabase::new()))
        }
    }
}

fn build_config(heartbeat_seconds: Option<u64>) -> Result<Config, StartError> {
    let mut config = Config::default();

    if let Some(seconds) = heartbeat_seconds {
        // tokio intervals can't tick every 0 seconds
        if seconds == 0 {
            return Err(StartError::Config(
                "HITIT_HEARTBEAT_SECONDS must be at least 1".to_string(),
            ));
        }

        config.heartbeat_interval_in_seconds = seconds;
    }

    Ok(config)
}

fn env_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, StartError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| StartError::Config(format!("{} must be a number, got {:?}", name, value))),
        Err(_) => Ok(None),
    }
}

/// Pings live connections, terminating the ones that missed the last ping
fn spawn_heartbeat(collab: Arc<Collab>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(collab.config.heartbeat_interval());

        loop {
            interval.tick().await;
            collab.rooms.heartbeat();
        }
    });
}

fn spawn_pruning(collab: Arc<Collab>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);

        loop {
            interval.tick().await;

            if let Err(e) = collab.activity.prune_expired(Utc::now()).await {
                error!("Failed to prune activity: {}", e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use hitit_collab::{NewSession, NewUser};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use super::*;

    fn context() -> ServerContext {
        let collab = Collab::new(Arc::new(MemoryDatabase::new()), Config::default());

        ServerContext {
            collab: Arc::new(collab),
        }
    }

    /// Creates a user with a session, skipping password hashing
    async fn session(context: &ServerContext, username: &str) -> (i32, String) {
        let database = &context.collab.database;
        let user = database
            .create_user(NewUser {
                username: username.to_string(),
                password: "unused".to_string(),
                display_name: username.to_string(),
            })
            .await
            .unwrap();

        let session = database
            .create_session(NewSession {
                token: format!("{}-token", username),
                user_id: user.id,
                expires_at: Utc::now() + chrono::Duration::days(1),
            })
            .await
            .unwrap();

        (user.id, session.token)
    }

    async fn send(
        context: &ServerContext,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = build_router(context.clone())
            .oneshot(request)
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, value)
    }

    async fn create_jam(context: &ServerContext, token: &str) -> i64 {
        let (status, jam) = send(
            context,
            Method::POST,
            "/api/jams",
            Some(token),
            Some(json!({ "title": "Night Drive", "genre": "synthwave" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        jam["id"].as_i64().unwrap()
    }

    #[test]
    fn heartbeat_interval_must_be_positive() {
        assert!(matches!(build_config(Some(0)), Err(StartError::Config(_))));
        assert_eq!(
            build_config(Some(5)).unwrap().heartbeat_interval(),
            Duration::from_secs(5)
        );
        assert_eq!(
            build_config(None).unwrap().heartbeat_interval_in_seconds,
            Config::default().heartbeat_interval_in_seconds
        );
    }

    #[tokio::test]
    async fn registers_and_logs_in() {
        let context = context();

        let (status, user) = send(
            &context,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "displayName": "Alice",
                "username": "alice",
                "password": "correct horse"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["username"], "alice");

        let (status, login) = send(
            &context,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "correct horse" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);

        let token = login["token"].as_str().unwrap();
        let (status, me) = send(&context, Method::GET, "/api/auth/user", Some(token), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["displayName"], "Alice");

        let (status, _) = send(
            &context,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong password" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_requests_without_a_session() {
        let context = context();

        let (status, body) = send(&context, Method::GET, "/api/invites", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, _) = send(
            &context,
            Method::GET,
            "/api/notifications",
            Some("not-a-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invites_a_collaborator() {
        let context = context();
        let (_, owner) = session(&context, "alice").await;
        let (bob_id, bob) = session(&context, "bob").await;
        let jam_id = create_jam(&context, &owner).await;

        let invite_uri = format!("/api/jams/{}/invite", jam_id);
        let body = json!({ "userId": bob_id, "role": "producer" });

        let (status, invite) = send(
            &context,
            Method::POST,
            &invite_uri,
            Some(&owner),
            Some(body.clone()),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(invite["status"], "pending");

        let (status, _) = send(&context, Method::POST, &invite_uri, Some(&owner), Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &context,
            Method::POST,
            &invite_uri,
            Some(&bob),
            Some(json!({ "userId": bob_id })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, invites) = send(&context, Method::GET, "/api/invites", Some(&bob), None).await;
        let invite_id = invites[0]["id"].as_i64().unwrap();

        let (status, jam) = send(
            &context,
            Method::POST,
            &format!("/api/invites/{}/accept", invite_id),
            Some(&bob),
            None,
        )
        .await;

        let collaborator = jam["collaborators"]
            .as_array()
            .unwrap()
            .iter()
            .find(|x| x["userId"] == bob_id)
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(collaborator["role"], "producer");

        let (status, _) = send(
            &context,
            Method::POST,
            &format!("/api/invites/{}/decline", invite_id),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn saves_and_restores_versions() {
        let context = context();
        let (_, owner) = session(&context, "alice").await;
        let (_, stranger) = session(&context, "mallory").await;
        let jam_id = create_jam(&context, &owner).await;

        let versions_uri = format!("/api/jams/{}/versions", jam_id);

        let (status, version) = send(
            &context,
            Method::POST,
            &versions_uri,
            Some(&owner),
            Some(json!({ "versionName": "First take", "tags": ["Demo"] })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(version["versionNumber"], 1);
        assert_eq!(version["tags"], json!(["demo"]));

        let (status, _) = send(
            &context,
            Method::POST,
            &versions_uri,
            Some(&stranger),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, restoration) = send(
            &context,
            Method::POST,
            &format!("{}/1/restore", versions_uri),
            Some(&owner),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(restoration["backup"], Value::Null);

        let (_, restoration) = send(
            &context,
            Method::POST,
            &format!("{}/1/restore", versions_uri),
            Some(&owner),
            Some(json!({ "createBackup": true })),
        )
        .await;

        assert_eq!(restoration["backup"]["versionNumber"], 2);

        let (status, page) = send(&context, Method::GET, &versions_uri, Some(&owner), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["versions"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            &context,
            Method::GET,
            &format!("{}/9", versions_uri),
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_the_api_document() {
        let (status, document) = send(&context(), Method::GET, "/api.json", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(document["paths"]["/api/jams/{jamId}/versions"].is_object());

        let parameters = document["paths"]["/api/jams/{jamId}/versions/{versionNumber}"]["get"]
            ["parameters"]
            .as_array()
            .unwrap();

        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0]["in"], "path");
        assert_eq!(parameters[1]["description"], "The number of the version within the jam");

        let tags: Vec<_> = document["tags"]
            .as_array()
            .unwrap()
            .iter()
            .map(|x| x["name"].as_str().unwrap())
            .collect();

        assert!(tags.contains(&"versions"));
        assert!(tags.contains(&"collaboration"));
    }
}
