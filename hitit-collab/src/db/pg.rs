use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hitit_core::{Collaborator, JamSnapshot, Page, PageRequest, Role};
use serde_json::Value;
use sqlx::{
    migrate::Migrator, postgres::PgPoolOptions, query, query_as, types::Json, Error as SqlxError,
    FromRow, PgConnection, PgPool,
};

use crate::{
    ActivityData, ActivityScope, Database, DatabaseError, IntoDatabaseError, InviteData,
    InviteStatus, JamData, NewActivity, NewInvite, NewJam, NewNotification, NewRequest,
    NewSession, NewUser, NewVersion, NotificationData, PrimaryKey, RequestData, RequestStatus,
    Result, SessionData, UpdatedJam, UpdatedVersion, UserData, VersionData, VersionNumber,
};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// How many times a version insert is retried when another writer took the number
const VERSION_NUMBER_ATTEMPTS: usize = 5;

/// The error code postgres uses for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// A postgres database implementation for hit.it
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    password: String,
    display_name: String,
}

#[derive(FromRow)]
struct JamRow {
    id: PrimaryKey,
    user_id: PrimaryKey,
    title: String,
    description: String,
    genre: String,
    image: Option<String>,
    is_private: bool,
    likes: i32,
    clip_ids: Vec<PrimaryKey>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CollaboratorRow {
    user_id: PrimaryKey,
    role: String,
    added_at: DateTime<Utc>,
    added_by: PrimaryKey,
}

#[derive(FromRow)]
struct InviteRow {
    id: PrimaryKey,
    jam_id: PrimaryKey,
    invited_user_id: PrimaryKey,
    invited_by: PrimaryKey,
    role: String,
    status: String,
    message: String,
    expires_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct RequestRow {
    id: PrimaryKey,
    jam_id: PrimaryKey,
    requested_by: PrimaryKey,
    requested_role: String,
    status: String,
    message: String,
    skills: Vec<String>,
    portfolio: Option<String>,
    responded_at: Option<DateTime<Utc>>,
    responded_by: Option<PrimaryKey>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ActivityRow {
    id: PrimaryKey,
    jam_id: PrimaryKey,
    user_id: PrimaryKey,
    action_type: String,
    target_user_id: Option<PrimaryKey>,
    target_clip_id: Option<PrimaryKey>,
    metadata: Value,
    description: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct VersionRow {
    id: PrimaryKey,
    jam_id: PrimaryKey,
    version_number: VersionNumber,
    version_name: String,
    description: String,
    created_by: PrimaryKey,
    created_at: DateTime<Utc>,
    snapshot: Json<JamSnapshot>,
    tags: Vec<String>,
    is_pinned: bool,
}

#[derive(FromRow)]
struct NotificationRow {
    id: PrimaryKey,
    recipient_id: PrimaryKey,
    sender_id: PrimaryKey,
    kind: String,
    jam_id: Option<PrimaryKey>,
    message: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl PgDatabase {
    /// Connects to the database and applies pending migrations
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn jam_collaborators(&self, jam_id: PrimaryKey) -> Result<Vec<Collaborator>> {
        query_as::<_, CollaboratorRow>(
            "SELECT user_id, role, added_at, added_by
            FROM jam_collaborators
            WHERE jam_id = $1
            ORDER BY added_at, user_id",
        )
        .bind(jam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(Collaborator::try_from)
        .collect()
    }

    async fn insert_version(
        &self,
        new_version: &NewVersion,
    ) -> std::result::Result<VersionRow, SqlxError> {
        query_as::<_, VersionRow>(
            "INSERT INTO jam_versions
                (jam_id, version_number, version_name, description, created_by, snapshot, tags, is_pinned)
            SELECT $1, next.number, COALESCE($2, 'Version ' || next.number), $3, $4, $5, $6, $7
            FROM (
                SELECT COALESCE(MAX(version_number), 0) + 1 AS number
                FROM jam_versions
                WHERE jam_id = $1
            ) AS next
            RETURNING *",
        )
        .bind(new_version.jam_id)
        .bind(new_version.version_name.as_deref())
        .bind(&new_version.description)
        .bind(new_version.created_by)
        .bind(Json(&new_version.snapshot))
        .bind(&new_version.tags)
        .bind(new_version.is_pinned)
        .fetch_one(&self.pool)
        .await
    }

    /// Explains why a conditional update touched no rows
    async fn invite_not_pending(&self, invite_id: PrimaryKey) -> DatabaseError {
        match self.invite_by_id(invite_id).await {
            Ok(invite) => DatabaseError::conflict("invite", "status", invite.status),
            Err(e) => e,
        }
    }

    async fn request_not_pending(&self, request_id: PrimaryKey) -> DatabaseError {
        match self.request_by_id(request_id).await {
            Ok(request) => DatabaseError::conflict("request", "status", request.status),
            Err(e) => e,
        }
    }
}

async fn insert_collaborator(
    connection: &mut PgConnection,
    jam_id: PrimaryKey,
    user_id: PrimaryKey,
    role: Role,
    added_by: PrimaryKey,
    added_at: DateTime<Utc>,
) -> std::result::Result<(), SqlxError> {
    query(
        "INSERT INTO jam_collaborators (jam_id, user_id, role, added_at, added_by)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (jam_id, user_id) DO NOTHING",
    )
    .bind(jam_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(added_at)
    .bind(added_by)
    .execute(connection)
    .await
    .map(|_| ())
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserData>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        query_as::<_, UserData>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        query_as::<_, UserData>(
            "INSERT INTO users (username, password, display_name)
            VALUES ($1, $2, $3)
            RETURNING *",
        )
        .bind(&new_user.username)
        .bind(&new_user.password)
        .bind(&new_user.display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.conflict_or("user", "username", new_user.username.clone()))
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = query_as::<_, SessionRow>(
            "SELECT
                sessions.id,
                sessions.token,
                sessions.expires_at,
                sessions.user_id,
                users.username,
                users.password,
                users.display_name
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                password: row.password,
                display_name: row.display_name,
            },
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(new_session.user_id)
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| e.conflict_or("session", "token", new_session.token.clone()))?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let result = query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("session", "token"));
        }

        Ok(())
    }

    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<()> {
        query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn jam_by_id(&self, jam_id: PrimaryKey) -> Result<JamData> {
        let row = query_as::<_, JamRow>("SELECT * FROM jams WHERE id = $1")
            .bind(jam_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("jam", "id"))?;

        let collaborators = self.jam_collaborators(jam_id).await?;

        Ok(row.into_data(collaborators))
    }

    async fn jam_ids_for_member(&self, user_id: PrimaryKey) -> Result<Vec<PrimaryKey>> {
        query_as::<_, (PrimaryKey,)>(
            "SELECT id FROM jams WHERE user_id = $1
            UNION
            SELECT jam_id FROM jam_collaborators WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(|(id,)| id).collect())
        .map_err(|e| e.any())
    }

    async fn create_jam(&self, new_jam: NewJam) -> Result<JamData> {
        let row = query_as::<_, JamRow>(
            "INSERT INTO jams (user_id, title, description, genre, image, is_private)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *",
        )
        .bind(new_jam.user_id)
        .bind(&new_jam.title)
        .bind(&new_jam.description)
        .bind(&new_jam.genre)
        .bind(new_jam.image.as_deref())
        .bind(new_jam.is_private)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(row.into_data(vec![]))
    }

    async fn update_jam(&self, updated_jam: UpdatedJam) -> Result<JamData> {
        let jam = self.jam_by_id(updated_jam.id).await?;

        query(
            "UPDATE jams SET
                title = $1,
                description = $2,
                genre = $3,
                image = $4,
                is_private = $5
            WHERE id = $6",
        )
        .bind(updated_jam.title.unwrap_or(jam.title))
        .bind(updated_jam.description.unwrap_or(jam.description))
        .bind(updated_jam.genre.unwrap_or(jam.genre))
        .bind(updated_jam.image.or(jam.image))
        .bind(updated_jam.is_private.unwrap_or(jam.is_private))
        .bind(updated_jam.id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.jam_by_id(updated_jam.id).await
    }

    async fn add_clip(&self, jam_id: PrimaryKey, clip_id: PrimaryKey) -> Result<bool> {
        let result = query(
            "UPDATE jams SET clip_ids = array_append(clip_ids, $2)
            WHERE id = $1 AND NOT ($2 = ANY(clip_ids))",
        )
        .bind(jam_id)
        .bind(clip_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            // Either the jam is missing or the clip was already there
            self.jam_by_id(jam_id).await?;
            return Ok(false);
        }

        Ok(true)
    }

    async fn remove_clip(&self, jam_id: PrimaryKey, clip_id: PrimaryKey) -> Result<bool> {
        let result = query(
            "UPDATE jams SET clip_ids = array_remove(clip_ids, $2)
            WHERE id = $1 AND $2 = ANY(clip_ids)",
        )
        .bind(jam_id)
        .bind(clip_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            self.jam_by_id(jam_id).await?;
            return Ok(false);
        }

        Ok(true)
    }

    async fn increment_likes(&self, jam_id: PrimaryKey) -> Result<JamData> {
        query("UPDATE jams SET likes = likes + 1 WHERE id = $1")
            .bind(jam_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.jam_by_id(jam_id).await
    }

    async fn create_collaborator(
        &self,
        jam_id: PrimaryKey,
        collaborator: Collaborator,
    ) -> Result<()> {
        query(
            "INSERT INTO jam_collaborators (jam_id, user_id, role, added_at, added_by)
            VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(jam_id)
        .bind(collaborator.user_id)
        .bind(collaborator.role.as_str())
        .bind(collaborator.added_at)
        .bind(collaborator.added_by)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            e.conflict_or(
                "collaborator",
                "jam:user",
                format!("{}:{}", jam_id, collaborator.user_id),
            )
        })
        .map(|_| ())
    }

    async fn update_collaborator_role(
        &self,
        jam_id: PrimaryKey,
        user_id: PrimaryKey,
        role: Role,
    ) -> Result<()> {
        let result = query(
            "UPDATE jam_collaborators SET role = $3 WHERE jam_id = $1 AND user_id = $2",
        )
        .bind(jam_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("collaborator", "jam:user"));
        }

        Ok(())
    }

    async fn delete_collaborator(&self, jam_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM jam_collaborators WHERE jam_id = $1 AND user_id = $2")
            .bind(jam_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("collaborator", "jam:user"));
        }

        Ok(())
    }

    async fn restore_jam(&self, jam_id: PrimaryKey, snapshot: &JamSnapshot) -> Result<JamData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let result = query(
            "UPDATE jams SET
                title = $2,
                description = $3,
                genre = $4,
                is_private = $5,
                clip_ids = $6
            WHERE id = $1",
        )
        .bind(jam_id)
        .bind(&snapshot.title)
        .bind(&snapshot.description)
        .bind(&snapshot.genre)
        .bind(snapshot.is_private)
        .bind(&snapshot.clip_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("jam", "id"));
        }

        query("DELETE FROM jam_collaborators WHERE jam_id = $1")
            .bind(jam_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        for collaborator in &snapshot.collaborators {
            insert_collaborator(
                &mut *tx,
                jam_id,
                collaborator.user_id,
                collaborator.role,
                collaborator.added_by,
                collaborator.added_at,
            )
            .await
            .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())?;

        self.jam_by_id(jam_id).await
    }

    async fn invite_by_id(&self, invite_id: PrimaryKey) -> Result<InviteData> {
        query_as::<_, InviteRow>("SELECT * FROM jam_invites WHERE id = $1")
            .bind(invite_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("invite", "id"))?
            .try_into()
    }

    async fn create_invite(&self, new_invite: NewInvite) -> Result<InviteData> {
        query_as::<_, InviteRow>(
            "INSERT INTO jam_invites (jam_id, invited_user_id, invited_by, role, message, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *",
        )
        .bind(new_invite.jam_id)
        .bind(new_invite.invited_user_id)
        .bind(new_invite.invited_by)
        .bind(new_invite.role.as_str())
        .bind(&new_invite.message)
        .bind(new_invite.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            e.conflict_or(
                "pending invite",
                "jam:user",
                format!("{}:{}", new_invite.jam_id, new_invite.invited_user_id),
            )
        })?
        .try_into()
    }

    async fn pending_invites_for_user(
        &self,
        user_id: PrimaryKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<InviteData>> {
        query_as::<_, InviteRow>(
            "SELECT * FROM jam_invites
            WHERE invited_user_id = $1 AND status = 'pending' AND expires_at > $2
            ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(InviteData::try_from)
        .collect()
    }

    async fn pending_invites_for_jam(&self, jam_id: PrimaryKey) -> Result<Vec<InviteData>> {
        query_as::<_, InviteRow>(
            "SELECT * FROM jam_invites
            WHERE jam_id = $1 AND status = 'pending'
            ORDER BY created_at DESC, id DESC",
        )
        .bind(jam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(InviteData::try_from)
        .collect()
    }

    async fn accept_invite(
        &self,
        invite_id: PrimaryKey,
        responded_at: DateTime<Utc>,
    ) -> Result<InviteData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let row = query_as::<_, InviteRow>(
            "UPDATE jam_invites SET status = 'accepted', responded_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING *",
        )
        .bind(invite_id)
        .bind(responded_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let Some(row) = row else {
            drop(tx);
            return Err(self.invite_not_pending(invite_id).await);
        };

        let invite = InviteData::try_from(row)?;

        insert_collaborator(
            &mut *tx,
            invite.jam_id,
            invite.invited_user_id,
            invite.role,
            invite.invited_by,
            responded_at,
        )
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        Ok(invite)
    }

    async fn close_invite(
        &self,
        invite_id: PrimaryKey,
        status: InviteStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> Result<InviteData> {
        let row = query_as::<_, InviteRow>(
            "UPDATE jam_invites SET status = $2, responded_at = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING *",
        )
        .bind(invite_id)
        .bind(status.as_str())
        .bind(responded_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.invite_not_pending(invite_id).await),
        }
    }

    async fn request_by_id(&self, request_id: PrimaryKey) -> Result<RequestData> {
        query_as::<_, RequestRow>("SELECT * FROM jam_requests WHERE id = $1")
            .bind(request_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("request", "id"))?
            .try_into()
    }

    async fn create_request(&self, new_request: NewRequest) -> Result<RequestData> {
        query_as::<_, RequestRow>(
            "INSERT INTO jam_requests (jam_id, requested_by, requested_role, message, skills, portfolio)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *",
        )
        .bind(new_request.jam_id)
        .bind(new_request.requested_by)
        .bind(new_request.requested_role.as_str())
        .bind(&new_request.message)
        .bind(&new_request.skills)
        .bind(new_request.portfolio.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            e.conflict_or(
                "pending request",
                "jam:user",
                format!("{}:{}", new_request.jam_id, new_request.requested_by),
            )
        })?
        .try_into()
    }

    async fn pending_requests_for_jam(&self, jam_id: PrimaryKey) -> Result<Vec<RequestData>> {
        query_as::<_, RequestRow>(
            "SELECT * FROM jam_requests
            WHERE jam_id = $1 AND status = 'pending'
            ORDER BY created_at DESC, id DESC",
        )
        .bind(jam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(RequestData::try_from)
        .collect()
    }

    async fn requests_by_user(&self, user_id: PrimaryKey) -> Result<Vec<RequestData>> {
        query_as::<_, RequestRow>(
            "SELECT * FROM jam_requests
            WHERE requested_by = $1
            ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(RequestData::try_from)
        .collect()
    }

    async fn approve_request(
        &self,
        request_id: PrimaryKey,
        responded_by: PrimaryKey,
        responded_at: DateTime<Utc>,
    ) -> Result<RequestData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let row = query_as::<_, RequestRow>(
            "UPDATE jam_requests SET status = 'approved', responded_by = $2, responded_at = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING *",
        )
        .bind(request_id)
        .bind(responded_by)
        .bind(responded_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let Some(row) = row else {
            drop(tx);
            return Err(self.request_not_pending(request_id).await);
        };

        let request = RequestData::try_from(row)?;

        insert_collaborator(
            &mut *tx,
            request.jam_id,
            request.requested_by,
            request.requested_role,
            responded_by,
            responded_at,
        )
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        Ok(request)
    }

    async fn deny_request(
        &self,
        request_id: PrimaryKey,
        responded_by: PrimaryKey,
        responded_at: DateTime<Utc>,
    ) -> Result<RequestData> {
        let row = query_as::<_, RequestRow>(
            "UPDATE jam_requests SET status = 'denied', responded_by = $2, responded_at = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING *",
        )
        .bind(request_id)
        .bind(responded_by)
        .bind(responded_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.request_not_pending(request_id).await),
        }
    }

    async fn create_activity(&self, new_activity: NewActivity) -> Result<ActivityData> {
        query_as::<_, ActivityRow>(
            "INSERT INTO jam_activities
                (jam_id, user_id, action_type, target_user_id, target_clip_id, metadata, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *",
        )
        .bind(new_activity.jam_id)
        .bind(new_activity.user_id)
        .bind(new_activity.action_type.as_str())
        .bind(new_activity.target_user_id)
        .bind(new_activity.target_clip_id)
        .bind(&new_activity.metadata)
        .bind(&new_activity.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn list_activity(
        &self,
        scope: ActivityScope,
        page: PageRequest,
    ) -> Result<Page<ActivityData>> {
        let (filter, ids) = match scope {
            ActivityScope::Jam(jam_id) => ("jam_id = ANY($1)", vec![jam_id]),
            ActivityScope::User(user_id) => ("user_id = ANY($1)", vec![user_id]),
            ActivityScope::Jams(jam_ids) => ("jam_id = ANY($1)", jam_ids),
        };

        let (total,) = query_as::<_, (i64,)>(&format!(
            "SELECT COUNT(*) FROM jam_activities WHERE {filter}"
        ))
        .bind(&ids)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let items = query_as::<_, ActivityRow>(&format!(
            "SELECT * FROM jam_activities
            WHERE {filter}
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3"
        ))
        .bind(&ids)
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(ActivityData::try_from)
        .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as usize,
            limit: page.limit,
            skip: page.skip,
        })
    }

    async fn delete_activity_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        query("DELETE FROM jam_activities WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| e.any())
    }

    async fn version_by_number(
        &self,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
    ) -> Result<VersionData> {
        query_as::<_, VersionRow>(
            "SELECT * FROM jam_versions WHERE jam_id = $1 AND version_number = $2",
        )
        .bind(jam_id)
        .bind(version_number)
        .fetch_one(&self.pool)
        .await
        .map(VersionData::from)
        .map_err(|e| e.not_found_or("version", "jam:number"))
    }

    async fn latest_version_number(&self, jam_id: PrimaryKey) -> Result<Option<VersionNumber>> {
        query_as::<_, (Option<VersionNumber>,)>(
            "SELECT MAX(version_number) FROM jam_versions WHERE jam_id = $1",
        )
        .bind(jam_id)
        .fetch_one(&self.pool)
        .await
        .map(|(number,)| number)
        .map_err(|e| e.any())
    }

    async fn create_version(&self, new_version: NewVersion) -> Result<VersionData> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.insert_version(&new_version).await {
                Ok(row) => return Ok(row.into()),
                // Another writer took the number, try the next one
                Err(e) if is_unique_violation(&e) && attempt < VERSION_NUMBER_ATTEMPTS => {
                    log::debug!(
                        "Version number of jam {} was taken, retrying ({})",
                        new_version.jam_id,
                        attempt
                    );
                }
                Err(e) => {
                    return Err(e.conflict_or(
                        "version",
                        "jam:number",
                        new_version.jam_id.to_string(),
                    ))
                }
            }
        }
    }

    async fn list_versions(
        &self,
        jam_id: PrimaryKey,
        page: PageRequest,
    ) -> Result<Page<VersionData>> {
        let (total,) = query_as::<_, (i64,)>("SELECT COUNT(*) FROM jam_versions WHERE jam_id = $1")
            .bind(jam_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        let items = query_as::<_, VersionRow>(
            "SELECT * FROM jam_versions
            WHERE jam_id = $1
            ORDER BY version_number DESC
            LIMIT $2 OFFSET $3",
        )
        .bind(jam_id)
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(VersionData::from)
        .collect();

        Ok(Page {
            items,
            total: total as usize,
            limit: page.limit,
            skip: page.skip,
        })
    }

    async fn update_version(&self, updated_version: UpdatedVersion) -> Result<VersionData> {
        let version = self
            .version_by_number(updated_version.jam_id, updated_version.version_number)
            .await?;

        query_as::<_, VersionRow>(
            "UPDATE jam_versions SET
                version_name = $2,
                description = $3,
                tags = $4,
                is_pinned = $5
            WHERE id = $1
            RETURNING *",
        )
        .bind(version.id)
        .bind(updated_version.version_name.unwrap_or(version.version_name))
        .bind(updated_version.description.unwrap_or(version.description))
        .bind(updated_version.tags.unwrap_or(version.tags))
        .bind(updated_version.is_pinned.unwrap_or(version.is_pinned))
        .fetch_one(&self.pool)
        .await
        .map(VersionData::from)
        .map_err(|e| e.not_found_or("version", "jam:number"))
    }

    async fn delete_version(
        &self,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
    ) -> Result<()> {
        let result = query("DELETE FROM jam_versions WHERE jam_id = $1 AND version_number = $2")
            .bind(jam_id)
            .bind(version_number)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("version", "jam:number"));
        }

        Ok(())
    }

    async fn create_notification(
        &self,
        new_notification: NewNotification,
    ) -> Result<NotificationData> {
        query_as::<_, NotificationRow>(
            "INSERT INTO notifications (recipient_id, sender_id, kind, jam_id, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *",
        )
        .bind(new_notification.recipient_id)
        .bind(new_notification.sender_id)
        .bind(new_notification.kind.as_str())
        .bind(new_notification.jam_id)
        .bind(&new_notification.message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn notifications_for_user(
        &self,
        user_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<NotificationData>> {
        query_as::<_, NotificationRow>(
            "SELECT * FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(NotificationData::try_from)
        .collect()
    }

    async fn mark_notification_read(
        &self,
        notification_id: PrimaryKey,
        recipient_id: PrimaryKey,
    ) -> Result<()> {
        let result =
            query("UPDATE notifications SET read = true WHERE id = $1 AND recipient_id = $2")
                .bind(notification_id)
                .bind(recipient_id)
                .execute(&self.pool)
                .await
                .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("notification", "id"));
        }

        Ok(())
    }

    async fn mark_all_notifications_read(&self, recipient_id: PrimaryKey) -> Result<u64> {
        query("UPDATE notifications SET read = true WHERE recipient_id = $1 AND read = false")
            .bind(recipient_id)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| e.any())
    }

    async fn unread_notification_count(&self, recipient_id: PrimaryKey) -> Result<u64> {
        query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND read = false",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await
        .map(|(count,)| count as u64)
        .map_err(|e| e.any())
    }
}

fn is_unique_violation(error: &SqlxError) -> bool {
    match error {
        SqlxError::Database(e) => e.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

/// Turns a value that failed to decode into an internal error
fn corrupt(error: impl std::error::Error + Send + Sync + 'static) -> DatabaseError {
    DatabaseError::Internal(Box::new(error))
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }

    fn conflict_or(
        self,
        resource: &'static str,
        field: &'static str,
        value: String,
    ) -> DatabaseError {
        if is_unique_violation(&self) {
            return DatabaseError::Conflict {
                resource,
                field,
                value,
            };
        }

        self.any()
    }
}

impl JamRow {
    fn into_data(self, collaborators: Vec<Collaborator>) -> JamData {
        JamData {
            id: self.id,
            owner_id: self.user_id,
            title: self.title,
            description: self.description,
            genre: self.genre,
            image: self.image,
            is_private: self.is_private,
            likes: self.likes,
            clip_ids: self.clip_ids,
            collaborators,
            created_at: self.created_at,
        }
    }
}

impl TryFrom<CollaboratorRow> for Collaborator {
    type Error = DatabaseError;

    fn try_from(row: CollaboratorRow) -> Result<Self> {
        Ok(Collaborator {
            user_id: row.user_id,
            role: row.role.parse().map_err(corrupt)?,
            added_at: row.added_at,
            added_by: row.added_by,
        })
    }
}

impl TryFrom<InviteRow> for InviteData {
    type Error = DatabaseError;

    fn try_from(row: InviteRow) -> Result<Self> {
        Ok(InviteData {
            id: row.id,
            jam_id: row.jam_id,
            invited_user_id: row.invited_user_id,
            invited_by: row.invited_by,
            role: row.role.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            message: row.message,
            expires_at: row.expires_at,
            responded_at: row.responded_at,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<RequestRow> for RequestData {
    type Error = DatabaseError;

    fn try_from(row: RequestRow) -> Result<Self> {
        let status: RequestStatus = row.status.parse().map_err(corrupt)?;

        Ok(RequestData {
            id: row.id,
            jam_id: row.jam_id,
            requested_by: row.requested_by,
            requested_role: row.requested_role.parse().map_err(corrupt)?,
            status,
            message: row.message,
            skills: row.skills,
            portfolio: row.portfolio,
            responded_at: row.responded_at,
            responded_by: row.responded_by,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<ActivityRow> for ActivityData {
    type Error = DatabaseError;

    fn try_from(row: ActivityRow) -> Result<Self> {
        Ok(ActivityData {
            id: row.id,
            jam_id: row.jam_id,
            user_id: row.user_id,
            action_type: row.action_type.parse().map_err(corrupt)?,
            target_user_id: row.target_user_id,
            target_clip_id: row.target_clip_id,
            metadata: row.metadata,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

impl From<VersionRow> for VersionData {
    fn from(row: VersionRow) -> Self {
        VersionData {
            id: row.id,
            jam_id: row.jam_id,
            version_number: row.version_number,
            version_name: row.version_name,
            description: row.description,
            created_by: row.created_by,
            created_at: row.created_at,
            snapshot: row.snapshot.0,
            tags: row.tags,
            is_pinned: row.is_pinned,
        }
    }
}

impl TryFrom<NotificationRow> for NotificationData {
    type Error = DatabaseError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(NotificationData {
            id: row.id,
            recipient_id: row.recipient_id,
            sender_id: row.sender_id,
            kind: row.kind.parse().map_err(corrupt)?,
            jam_id: row.jam_id,
            message: row.message,
            read: row.read,
            created_at: row.created_at,
        })
    }
}
