use hitit_core::{Page, PageRequest, SnapshotDiff};
use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use serde_json::json;

use crate::{
    ActionType, CollabContext, CollabError, JamData, NewActivity, NewVersion, PrimaryKey,
    UpdatedVersion, UserData, VersionData, VersionNumber,
};

pub const MAX_VERSION_NAME_LENGTH: usize = 100;
pub const MAX_VERSION_DESCRIPTION_LENGTH: usize = 500;
pub const MAX_TAGS: usize = 10;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"^[a-z0-9][a-z0-9_-]{0,31}$").unwrap();
}

/// Saves, restores, and compares snapshots of jams
pub struct Versions {
    context: CollabContext,
}

/// User supplied fields of a new version
#[derive(Debug, Clone, Default)]
pub struct VersionDetails {
    /// Defaults to "Version N"
    pub name: Option<String>,
    pub description: String,
    pub tags: Vec<String>,
    pub is_pinned: bool,
}

/// Changes to a saved version. Fields left as [None] are kept.
#[derive(Debug, Clone, Default)]
pub struct VersionChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}

/// The result of restoring a jam to a version
#[derive(Debug, Clone)]
pub struct Restoration {
    /// The jam after the restore
    pub jam: JamData,
    /// The version the jam was restored to
    pub version: VersionData,
    /// The version saved right before restoring, if one was requested
    pub backup: Option<VersionData>,
}

/// Two versions of a jam and what changed between them
#[derive(Debug, Clone)]
pub struct VersionComparison {
    pub v1: VersionData,
    pub v2: VersionData,
    pub diff: SnapshotDiff,
}

impl Versions {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// The number the next version of the jam will get
    pub async fn next_version_number(&self, jam_id: PrimaryKey) -> Result<VersionNumber, CollabError> {
        let latest = self.context.database.latest_version_number(jam_id).await?;

        Ok(latest.unwrap_or(0) + 1)
    }

    /// Saves the current state of a jam as a new version. Requires edit rights.
    pub async fn create(
        &self,
        editor: &UserData,
        jam_id: PrimaryKey,
        details: VersionDetails,
    ) -> Result<VersionData, CollabError> {
        let jam = self.editable_jam(editor, jam_id).await?;
        let version = self.save(editor, &jam, details).await?;

        info!(
            "{} saved version {} of jam {}",
            editor.username, version.version_number, jam_id
        );

        self.context
            .log_activity(
                NewActivity::new(
                    jam_id,
                    editor.id,
                    ActionType::JamUpdated,
                    format!(
                        "{} saved version {}: \"{}\"",
                        editor.username, version.version_number, version.version_name
                    ),
                )
                .metadata(json!({
                    "versionNumber": version.version_number,
                    "versionName": version.version_name,
                    "clipCount": version.snapshot.clip_count,
                })),
            )
            .await;

        Ok(version)
    }

    /// Lists the versions of a jam, newest first
    pub async fn list(
        &self,
        viewer: &UserData,
        jam_id: PrimaryKey,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Page<VersionData>, CollabError> {
        self.viewable_jam(viewer, jam_id).await?;

        let page = PageRequest::new(limit, skip, &self.context.config);

        Ok(self.context.database.list_versions(jam_id, page).await?)
    }

    pub async fn version(
        &self,
        viewer: &UserData,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
    ) -> Result<VersionData, CollabError> {
        self.viewable_jam(viewer, jam_id).await?;

        Ok(self
            .context
            .database
            .version_by_number(jam_id, version_number)
            .await?)
    }

    /// Overwrites the jam with the state saved in a version. The image is never restored.
    ///
    /// With `create_backup`, the current state is saved as a version first.
    /// If the restore then fails, the backup stays.
    pub async fn restore(
        &self,
        editor: &UserData,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
        create_backup: bool,
    ) -> Result<Restoration, CollabError> {
        let jam = self.editable_jam(editor, jam_id).await?;
        let version = self
            .context
            .database
            .version_by_number(jam_id, version_number)
            .await?;

        let backup = if create_backup {
            let details = VersionDetails {
                name: Some(format!("Backup before restore to v{}", version_number)),
                description: "Automatic backup created before version restore".to_string(),
                tags: vec!["backup".to_string(), "auto".to_string()],
                is_pinned: false,
            };

            Some(self.save(editor, &jam, details).await?)
        } else {
            None
        };

        let restored = self
            .context
            .database
            .restore_jam(jam_id, &version.snapshot)
            .await?;

        info!(
            "{} restored jam {} to version {}",
            editor.username, jam_id, version_number
        );

        self.context
            .log_activity(
                NewActivity::new(
                    jam_id,
                    editor.id,
                    ActionType::JamUpdated,
                    format!(
                        "{} restored jam to version {}: \"{}\"",
                        editor.username, version_number, version.version_name
                    ),
                )
                .metadata(json!({
                    "versionNumber": version_number,
                    "versionName": version.version_name,
                    "previousClipCount": jam.clip_ids.len(),
                    "restoredClipCount": version.snapshot.clip_count,
                })),
            )
            .await;

        Ok(Restoration {
            jam: restored,
            version,
            backup,
        })
    }

    /// Renames, describes, tags, or pins a version. Only the jam owner or the version's creator can do this.
    pub async fn update(
        &self,
        user: &UserData,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
        changes: VersionChanges,
    ) -> Result<VersionData, CollabError> {
        self.managed_version(user, jam_id, version_number, "update")
            .await?;

        let version_name = match changes.name {
            Some(name) => Some(
                validate_name(Some(name))?
                    .ok_or_else(|| CollabError::validation("Version name cannot be empty"))?,
            ),
            None => None,
        };

        if let Some(description) = &changes.description {
            validate_description(description)?;
        }

        let tags = changes.tags.map(normalize_tags).transpose()?;

        Ok(self
            .context
            .database
            .update_version(UpdatedVersion {
                jam_id,
                version_number,
                version_name,
                description: changes.description,
                tags,
                is_pinned: changes.is_pinned,
            })
            .await?)
    }

    /// Deletes a version. Only the jam owner or the version's creator can do this.
    pub async fn delete(
        &self,
        user: &UserData,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
    ) -> Result<(), CollabError> {
        self.managed_version(user, jam_id, version_number, "delete")
            .await?;

        self.context
            .database
            .delete_version(jam_id, version_number)
            .await?;

        info!(
            "{} deleted version {} of jam {}",
            user.username, version_number, jam_id
        );

        Ok(())
    }

    /// Compares two versions. Clips in `v2` but not `v1` are added, the opposite are removed.
    pub async fn compare(
        &self,
        viewer: &UserData,
        jam_id: PrimaryKey,
        v1: VersionNumber,
        v2: VersionNumber,
    ) -> Result<VersionComparison, CollabError> {
        if v1 < 1 || v2 < 1 {
            return Err(CollabError::validation(
                "Version numbers must be positive integers",
            ));
        }

        self.viewable_jam(viewer, jam_id).await?;

        let v1 = self.context.database.version_by_number(jam_id, v1).await?;
        let v2 = self.context.database.version_by_number(jam_id, v2).await?;
        let diff = SnapshotDiff::between(&v1.snapshot, &v2.snapshot);

        Ok(VersionComparison { v1, v2, diff })
    }

    async fn save(
        &self,
        creator: &UserData,
        jam: &JamData,
        details: VersionDetails,
    ) -> Result<VersionData, CollabError> {
        validate_description(&details.description)?;

        let version = self
            .context
            .database
            .create_version(NewVersion {
                jam_id: jam.id,
                version_name: validate_name(details.name)?,
                description: details.description,
                created_by: creator.id,
                snapshot: jam.snapshot(),
                tags: normalize_tags(details.tags)?,
                is_pinned: details.is_pinned,
            })
            .await?;

        Ok(version)
    }

    async fn viewable_jam(&self, viewer: &UserData, jam_id: PrimaryKey) -> Result<JamData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(viewer.id).can_view {
            return Err(CollabError::forbidden(
                "You do not have permission to view this jam's versions",
            ));
        }

        Ok(jam)
    }

    async fn editable_jam(&self, editor: &UserData, jam_id: PrimaryKey) -> Result<JamData, CollabError> {
        let jam = self.context.jam(jam_id).await?;

        if !jam.permissions(editor.id).can_edit {
            return Err(CollabError::forbidden(
                "You do not have permission to manage versions of this jam",
            ));
        }

        Ok(jam)
    }

    /// Returns the version if the user owns the jam or created the version
    async fn managed_version(
        &self,
        user: &UserData,
        jam_id: PrimaryKey,
        version_number: VersionNumber,
        action: &str,
    ) -> Result<VersionData, CollabError> {
        let jam = self.context.jam(jam_id).await?;
        let version = self
            .context
            .database
            .version_by_number(jam_id, version_number)
            .await?;

        if jam.owner_id != user.id && version.created_by != user.id {
            return Err(CollabError::forbidden(format!(
                "Only the jam owner or the version creator can {} it",
                action
            )));
        }

        Ok(version)
    }
}

/// Trims the name, treating an empty one as missing
fn validate_name(name: Option<String>) -> Result<Option<String>, CollabError> {
    let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    if name
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_VERSION_NAME_LENGTH)
    {
        return Err(CollabError::validation(format!(
            "Version name cannot be longer than {} characters",
            MAX_VERSION_NAME_LENGTH
        )));
    }

    Ok(name)
}

fn validate_description(description: &str) -> Result<(), CollabError> {
    if description.chars().count() > MAX_VERSION_DESCRIPTION_LENGTH {
        return Err(CollabError::validation(format!(
            "Version description cannot be longer than {} characters",
            MAX_VERSION_DESCRIPTION_LENGTH
        )));
    }

    Ok(())
}

/// Lower-cases and deduplicates tags, rejecting malformed ones
fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, CollabError> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());

    for tag in tags {
        let tag = tag.trim().to_lowercase();

        if !TAG.is_match(&tag) {
            return Err(CollabError::validation(format!(
                "\"{}\" is not a valid tag, use letters, digits, dashes, and underscores",
                tag
            )));
        }

        if !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }

    if normalized.len() > MAX_TAGS {
        return Err(CollabError::validation(format!(
            "A version can have at most {} tags",
            MAX_TAGS
        )));
    }

    Ok(normalized)
}
