//! Request bodies and query strings accepted by the endpoints

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    Json,
};
use hitit_core::{InvalidRole, Role};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(length(max = 128))]
    pub username: String,
    #[validate(length(max = 64))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterSchema {
    #[validate(length(min = 2, max = 128))]
    pub display_name: String,
    #[validate(length(min = 2, max = 128))]
    pub username: String,
    #[validate(length(min = 8, max = 64))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewJamSchema {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub description: String,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub genre: String,
    pub image: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateJamSchema {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub genre: Option<String>,
    pub image: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewCollaboratorSchema {
    pub user_id: i32,
    /// One of producer, contributor, or viewer. Defaults to contributor.
    pub role: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleSchema {
    pub role: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InviteSchema {
    pub user_id: i32,
    pub role: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinRequestSchema {
    pub requested_role: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub skills: Vec<String>,
    pub portfolio: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewVersionSchema {
    pub version_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateVersionSchema {
    pub version_name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}

#[derive(Debug, Default, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RestoreSchema {
    /// Save the current state as a version before restoring
    #[serde(default)]
    pub create_backup: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CompareQuery {
    pub v1: i32,
    pub v2: i32,
}

/// Parses a role from a body, defaulting to contributor when it is missing
pub fn parse_role(role: Option<&str>) -> Result<Role, ServerError> {
    match role {
        Some(role) => role
            .parse()
            .map_err(|e: InvalidRole| ServerError::Validation(e.to_string())),
        None => Ok(Role::default()),
    }
}

/// JSON that is validated before it reaches a handler
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|e| ServerError::Validation(e.body_text()))?;

        extracted_json
            .0
            .validate()
            .map_err(|e| ServerError::Validation(describe(&e)))?;

        Ok(Self(extracted_json.0))
    }
}

/// Lists the invalid fields, for example "Invalid fields: title, genre"
fn describe(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_keys().collect();
    fields.sort_unstable();

    format!("Invalid fields: {}", fields.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_fields_are_listed() {
        let schema = NewJamSchema {
            title: String::new(),
            description: String::new(),
            genre: "g".repeat(51),
            image: None,
            is_private: false,
        };

        let errors = schema.validate().unwrap_err();
        assert_eq!(describe(&errors), "Invalid fields: genre, title");
    }

    #[test]
    fn roles_default_to_contributor() {
        assert_eq!(parse_role(None).unwrap(), Role::Contributor);
        assert_eq!(parse_role(Some("producer")).unwrap(), Role::Producer);
        assert!(matches!(
            parse_role(Some("owner")),
            Err(ServerError::Validation(_))
        ));
    }

    #[test]
    fn restore_defaults_to_no_backup() {
        let schema: RestoreSchema = serde_json::from_str("{}").unwrap();
        assert!(!schema.create_backup);

        let schema: RestoreSchema = serde_json::from_str(r#"{"createBackup":true}"#).unwrap();
        assert!(schema.create_backup);
    }
}
