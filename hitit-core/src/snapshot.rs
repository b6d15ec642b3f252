//! Point-in-time copies of a jam's mutable state, and comparison between them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Collaborator, PrimaryKey};

/// An immutable copy of a jam's mutable fields, captured when a version is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JamSnapshot {
    pub title: String,
    pub description: String,
    pub genre: String,
    pub image: Option<String>,
    pub is_private: bool,
    /// Ordered clip references
    pub clip_ids: Vec<PrimaryKey>,
    pub collaborators: Vec<Collaborator>,
    pub clip_count: usize,
    pub collaborator_count: usize,
}

/// A field that may differ between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange<T> {
    pub changed: bool,
    pub v1: T,
    pub v2: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipChanges {
    /// Clips present in the second snapshot but not the first
    pub added: Vec<PrimaryKey>,
    /// Clips present in the first snapshot but not the second
    pub removed: Vec<PrimaryKey>,
    pub added_count: usize,
    pub removed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorChanges {
    pub v1_count: usize,
    pub v2_count: usize,
    pub changed: bool,
}

/// The structural difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDiff {
    pub title: FieldChange<String>,
    pub description: FieldChange<String>,
    pub genre: FieldChange<String>,
    pub is_private: FieldChange<bool>,
    pub clips: ClipChanges,
    pub collaborators: CollaboratorChanges,
}

impl JamSnapshot {
    /// Captures the given state, deriving the counts from the lists.
    pub fn capture(
        title: &str,
        description: &str,
        genre: &str,
        image: Option<&str>,
        is_private: bool,
        clip_ids: &[PrimaryKey],
        collaborators: &[Collaborator],
    ) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            genre: genre.to_string(),
            image: image.map(str::to_string),
            is_private,
            clip_ids: clip_ids.to_vec(),
            collaborators: collaborators.to_vec(),
            clip_count: clip_ids.len(),
            collaborator_count: collaborators.len(),
        }
    }
}

impl<T> FieldChange<T>
where
    T: PartialEq + Clone,
{
    fn between(v1: &T, v2: &T) -> Self {
        Self {
            changed: v1 != v2,
            v1: v1.clone(),
            v2: v2.clone(),
        }
    }
}

impl SnapshotDiff {
    /// Compares `v1` against `v2`. Clips are compared by identity,
    /// keeping the order they have in the snapshot they come from.
    pub fn between(v1: &JamSnapshot, v2: &JamSnapshot) -> Self {
        let added = clips_missing_from(&v2.clip_ids, &v1.clip_ids);
        let removed = clips_missing_from(&v1.clip_ids, &v2.clip_ids);

        Self {
            title: FieldChange::between(&v1.title, &v2.title),
            description: FieldChange::between(&v1.description, &v2.description),
            genre: FieldChange::between(&v1.genre, &v2.genre),
            is_private: FieldChange::between(&v1.is_private, &v2.is_private),
            clips: ClipChanges {
                added_count: added.len(),
                removed_count: removed.len(),
                added,
                removed,
            },
            collaborators: CollaboratorChanges {
                v1_count: v1.collaborator_count,
                v2_count: v2.collaborator_count,
                changed: v1.collaborator_count != v2.collaborator_count,
            },
        }
    }
}

/// Returns the clips in `source` that aren't in `other`
fn clips_missing_from(source: &[PrimaryKey], other: &[PrimaryKey]) -> Vec<PrimaryKey> {
    let other: HashSet<_> = other.iter().collect();
    let mut seen = HashSet::new();

    source
        .iter()
        .filter(|id| !other.contains(id) && seen.insert(**id))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::Role;

    fn snapshot(title: &str, clips: &[PrimaryKey], collaborators: usize) -> JamSnapshot {
        let collaborators: Vec<_> = (0..collaborators)
            .map(|i| Collaborator {
                user_id: 10 + i as PrimaryKey,
                role: Role::Contributor,
                added_at: Utc::now(),
                added_by: 1,
            })
            .collect();

        JamSnapshot::capture(
            title,
            "desc",
            "techno",
            Some("cover.png"),
            false,
            clips,
            &collaborators,
        )
    }

    #[test]
    fn capture_derives_counts() {
        let snapshot = snapshot("a", &[1, 2, 3], 2);

        assert_eq!(snapshot.clip_count, 3);
        assert_eq!(snapshot.collaborator_count, 2);
        assert_eq!(snapshot.image.as_deref(), Some("cover.png"));
    }

    #[test]
    fn diff_reports_changed_fields() {
        let v1 = snapshot("Demo", &[1, 2], 1);
        let v2 = snapshot("Final Mix", &[1, 2], 3);
        let diff = SnapshotDiff::between(&v1, &v2);

        assert!(diff.title.changed);
        assert_eq!(diff.title.v1, "Demo");
        assert_eq!(diff.title.v2, "Final Mix");
        assert!(!diff.genre.changed);
        assert!(!diff.is_private.changed);
        assert!(diff.collaborators.changed);
        assert_eq!(diff.collaborators.v2_count, 3);
        assert_eq!(diff.clips.added_count, 0);
    }

    #[test]
    fn diff_clip_sets_keep_snapshot_order() {
        let v1 = snapshot("a", &[5, 1, 2, 3], 0);
        let v2 = snapshot("a", &[3, 9, 7, 1], 0);
        let diff = SnapshotDiff::between(&v1, &v2);

        assert_eq!(diff.clips.added, vec![9, 7]);
        assert_eq!(diff.clips.removed, vec![5, 2]);
        assert_eq!(diff.clips.added_count, 2);
        assert_eq!(diff.clips.removed_count, 2);
    }

    #[test]
    fn clip_diff_is_anti_symmetric() {
        let a = snapshot("a", &[1, 2, 3, 4], 0);
        let b = snapshot("b", &[3, 4, 5, 6, 6], 0);

        let forward = SnapshotDiff::between(&a, &b);
        let backward = SnapshotDiff::between(&b, &a);

        assert_eq!(forward.clips.added, backward.clips.removed);
        assert_eq!(forward.clips.removed, backward.clips.added);
        assert_eq!(forward.clips.added, vec![5, 6]);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let value = serde_json::to_value(snapshot("a", &[1], 0)).expect("serializes");

        assert_eq!(value["isPrivate"], false);
        assert_eq!(value["clipIds"][0], 1);
        assert_eq!(value["clipCount"], 1);
    }
}
