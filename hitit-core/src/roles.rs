use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PrimaryKey;

/// A role that can be granted to a collaborator of a jam.
/// Ownership is never granted, it is derived from the jam itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can edit jam settings and the mix, but not manage collaborators.
    Producer,
    /// Can add clips and comment.
    #[default]
    Contributor,
    /// Read-only access.
    Viewer,
}

/// The effective role a user has on a jam.
/// Variants are ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JamRole {
    Viewer,
    Contributor,
    Producer,
    Owner,
}

/// Something a role allows a user to do on a jam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    View,
    Contribute,
    Edit,
    Own,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Role must be one of: producer, contributor, viewer (got \"{0}\")")]
pub struct InvalidRole(pub String);

/// A user's membership of a jam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: PrimaryKey,
    pub role: Role,
    pub added_at: DateTime<Utc>,
    pub added_by: PrimaryKey,
}

/// Anything that knows who owns it and who collaborates on it.
pub trait Membership {
    fn owner_id(&self) -> PrimaryKey;
    fn is_private(&self) -> bool;
    fn collaborators(&self) -> &[Collaborator];
}

/// What a single user is allowed to do on a jam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub role: Option<JamRole>,
    pub is_owner: bool,
    pub can_edit: bool,
    pub can_contribute: bool,
    pub can_view: bool,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Producer, Role::Contributor, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Contributor => "contributor",
            Role::Viewer => "viewer",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| InvalidRole(s.to_string()))
    }
}

impl From<Role> for JamRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Producer => JamRole::Producer,
            Role::Contributor => JamRole::Contributor,
            Role::Viewer => JamRole::Viewer,
        }
    }
}

impl JamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            JamRole::Owner => "owner",
            JamRole::Producer => "producer",
            JamRole::Contributor => "contributor",
            JamRole::Viewer => "viewer",
        }
    }

    /// The capability table. Each role includes everything the roles below it can do.
    pub fn capabilities(self) -> &'static [Capability] {
        use Capability::*;

        match self {
            JamRole::Owner => &[View, Contribute, Edit, Own],
            JamRole::Producer => &[View, Contribute, Edit],
            JamRole::Contributor => &[View, Contribute],
            JamRole::Viewer => &[View],
        }
    }

    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// Returns the role of a user on a jam, or [None] if the user has no relation to it.
pub fn role_of(jam: &impl Membership, user_id: PrimaryKey) -> Option<JamRole> {
    if jam.owner_id() == user_id {
        return Some(JamRole::Owner);
    }

    jam.collaborators()
        .iter()
        .find(|c| c.user_id == user_id)
        .map(|c| c.role.into())
}

impl Permissions {
    pub fn resolve(jam: &impl Membership, user_id: PrimaryKey) -> Self {
        let role = role_of(jam, user_id);
        let can = |capability| role.map(|r| r.can(capability)).unwrap_or(false);

        Self {
            role,
            is_owner: can(Capability::Own),
            can_edit: can(Capability::Edit),
            can_contribute: can(Capability::Contribute),
            // Public jams are viewable by anyone
            can_view: can(Capability::View) || !jam.is_private(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestJam {
        owner: PrimaryKey,
        private: bool,
        collaborators: Vec<Collaborator>,
    }

    impl Membership for TestJam {
        fn owner_id(&self) -> PrimaryKey {
            self.owner
        }

        fn is_private(&self) -> bool {
            self.private
        }

        fn collaborators(&self) -> &[Collaborator] {
            &self.collaborators
        }
    }

    fn collaborator(user_id: PrimaryKey, role: Role) -> Collaborator {
        Collaborator {
            user_id,
            role,
            added_at: Utc::now(),
            added_by: 1,
        }
    }

    fn jam(private: bool) -> TestJam {
        TestJam {
            owner: 1,
            private,
            collaborators: vec![
                collaborator(2, Role::Producer),
                collaborator(3, Role::Contributor),
                collaborator(4, Role::Viewer),
            ],
        }
    }

    #[test]
    fn owner_is_derived_from_jam() {
        let jam = jam(true);

        assert_eq!(role_of(&jam, 1), Some(JamRole::Owner));
        assert_eq!(role_of(&jam, 2), Some(JamRole::Producer));
        assert_eq!(role_of(&jam, 3), Some(JamRole::Contributor));
        assert_eq!(role_of(&jam, 4), Some(JamRole::Viewer));
        assert_eq!(role_of(&jam, 5), None);
    }

    #[test]
    fn roles_are_ordered() {
        assert!(JamRole::Owner > JamRole::Producer);
        assert!(JamRole::Producer > JamRole::Contributor);
        assert!(JamRole::Contributor > JamRole::Viewer);
        assert!(Some(JamRole::Viewer) > None);
    }

    #[test]
    fn capabilities_are_monotonic() {
        let roles = [
            JamRole::Viewer,
            JamRole::Contributor,
            JamRole::Producer,
            JamRole::Owner,
        ];

        for pair in roles.windows(2) {
            for capability in pair[0].capabilities() {
                assert!(pair[1].can(*capability), "{:?} lost {:?}", pair[1], capability);
            }
        }
    }

    #[test]
    fn private_jam_permissions() {
        let jam = jam(true);

        let producer = Permissions::resolve(&jam, 2);
        assert!(producer.can_edit && producer.can_contribute && producer.can_view);
        assert!(!producer.is_owner);

        let contributor = Permissions::resolve(&jam, 3);
        assert!(contributor.can_contribute);
        assert!(!contributor.can_edit);

        let viewer = Permissions::resolve(&jam, 4);
        assert!(viewer.can_view);
        assert!(!viewer.can_contribute);

        let stranger = Permissions::resolve(&jam, 99);
        assert_eq!(stranger.role, None);
        assert!(!stranger.can_view);
    }

    #[test]
    fn public_jams_are_viewable_by_anyone() {
        let stranger = Permissions::resolve(&jam(false), 99);

        assert!(stranger.can_view);
        assert!(!stranger.can_contribute);
    }

    #[test]
    fn parses_grantable_roles_only() {
        assert_eq!("producer".parse(), Ok(Role::Producer));
        assert_eq!("viewer".parse(), Ok(Role::Viewer));
        assert_eq!(
            "owner".parse::<Role>(),
            Err(InvalidRole("owner".to_string()))
        );
    }
}
