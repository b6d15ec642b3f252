use hitit_core::InvalidRole;
use thiserror::Error;

use crate::DatabaseError;

/// Errors returned by the collab services, mapped to a response by the server
#[derive(Debug, Error)]
pub enum CollabError {
    /// A resource doesn't exist, or isn't visible to the caller
    #[error("{0}")]
    NotFound(String),
    /// The caller is not allowed to perform the action
    #[error("{0}")]
    Forbidden(String),
    /// The action clashes with existing state, like a duplicate or an already answered invite
    #[error("{0}")]
    Conflict(String),
    /// The input is invalid
    #[error("{0}")]
    Validation(String),
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

impl CollabError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{} not found", capitalize(resource)))
    }
}

impl From<DatabaseError> for CollabError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { resource, .. } => Self::not_found(resource),
            DatabaseError::Conflict { .. } => Self::Conflict(value.to_string()),
            e => Self::Db(e),
        }
    }
}

impl From<InvalidRole> for CollabError {
    fn from(value: InvalidRole) -> Self {
        Self::Validation(value.to_string())
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();

    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_map_to_categories() {
        let error: CollabError = DatabaseError::not_found("jam", "id").into();
        assert_eq!(error.to_string(), "Jam not found");

        let error: CollabError = DatabaseError::conflict("pending invite", "jam:user", "1:2").into();
        assert!(matches!(error, CollabError::Conflict(_)));

        let error: CollabError = "owner".parse::<hitit_core::Role>().unwrap_err().into();
        assert!(matches!(error, CollabError::Validation(_)));
    }
}
