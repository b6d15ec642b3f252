use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::Utc;
use log::warn;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::{
    util::random_string, CollabContext, DatabaseError, NewSession, NewUser, SessionData, UserData,
};

/// The length of generated session tokens
const TOKEN_LENGTH: usize = 32;

pub struct Auth {
    context: CollabContext,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl Auth {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
            argon: Argon2::default(),
        }
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.clear_expired().await;

        let user = self
            .context
            .database
            .user_by_username(&credentials.username)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let new_session = NewSession {
            token: random_string(TOKEN_LENGTH),
            user_id: user.id,
            expires_at: Utc::now() + self.context.config.session_lifetime(),
        };

        self.context
            .database
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.context.database.delete_session_by_token(token).await
    }

    /// Creates a user with a hashed password
    pub async fn register(&self, new_user: NewPlainUser) -> Result<UserData, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon
            .hash_password(new_user.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        self.context
            .database
            .create_user(NewUser {
                username: new_user.username,
                password: hashed_password,
                display_name: new_user.display_name,
            })
            .await
            .map_err(AuthError::Db)
    }

    /// Returns a session if it exists and hasn't expired
    pub async fn session(&self, token: &str) -> Result<SessionData, DatabaseError> {
        let session = self.context.database.session_by_token(token).await?;

        if session.expires_at < Utc::now() {
            return Err(DatabaseError::not_found("session", "token"));
        }

        Ok(session)
    }

    async fn clear_expired(&self) {
        if let Err(e) = self.context.database.clear_expired_sessions(Utc::now()).await {
            warn!("Failed to clear expired sessions: {}", e);
        }
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewPlainUser {
    pub username: String,
    pub password: String,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn plain_user(username: &str) -> NewPlainUser {
        NewPlainUser {
            username: username.to_string(),
            password: "correct horse battery staple".to_string(),
            display_name: "Alice".to_string(),
        }
    }

    #[tokio::test]
    async fn registered_users_can_log_in() {
        let collab = testing::collab();
        let user = collab.auth.register(plain_user("alice")).await.unwrap();

        assert_ne!(user.password, "correct horse battery staple");

        let session = collab
            .auth
            .login(Credentials {
                username: "alice".to_string(),
                password: "correct horse battery staple".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(session.user.id, user.id);
        assert_eq!(session.token.len(), TOKEN_LENGTH);

        let found = collab.auth.session(&session.token).await.unwrap();
        assert_eq!(found.user.username, "alice");

        collab.auth.logout(&session.token).await.unwrap();
        assert!(collab.auth.session(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let collab = testing::collab();
        collab.auth.register(plain_user("alice")).await.unwrap();

        let result = collab
            .auth
            .login(Credentials {
                username: "alice".to_string(),
                password: "hunter2".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        let result = collab
            .auth
            .login(Credentials {
                username: "nobody".to_string(),
                password: "hunter2".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let collab = testing::collab();
        collab.auth.register(plain_user("alice")).await.unwrap();

        let result = collab.auth.register(plain_user("alice")).await;
        assert!(matches!(
            result,
            Err(AuthError::Db(DatabaseError::Conflict { .. }))
        ));
    }
}
