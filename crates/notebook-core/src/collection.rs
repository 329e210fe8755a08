//! Collection nodes and hierarchical keys.
//!
//! A collection's key is its path: the parent's key and the slug of its name
//! joined by `/`. The root ("Uncategorized") has the empty key.

use crate::note::NoteId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Key of the root collection.
pub const ROOT_KEY: &str = "";

/// Separator between key segments.
pub const KEY_SEPARATOR: char = '/';

/// Deepest level a collection may sit at (root is level 0).
pub const MAX_DEPTH: u32 = 4;

/// A node in the collection tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNode {
    /// Hierarchical path key
    pub key: String,
    /// Display name
    pub name: String,
    /// Display color (CSS color string)
    pub color: String,
    /// Key of the parent (None only for the root)
    pub parent_key: Option<String>,
    /// Depth, root = 0
    pub level: u32,
    /// Creation time (ms since epoch)
    pub created: u64,
    /// Derived membership, maintained by the tree and the reconciler
    pub(crate) note_ids: BTreeSet<NoteId>,
}

impl CollectionNode {
    pub fn is_root(&self) -> bool {
        self.key == ROOT_KEY
    }

    /// Notes currently in this collection (not including descendants).
    pub fn note_ids(&self) -> &BTreeSet<NoteId> {
        &self.note_ids
    }

    pub fn to_snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            key: self.key.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            parent: self.parent_key.clone(),
            level: self.level,
            created: self.created,
        }
    }
}

/// Wire shape of a collection. Membership is never sent; it is rebuilt locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    pub key: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub created: u64,
}

/// Turn a display name into a key segment.
///
/// Lowercases, collapses whitespace runs into `-` and drops the key separator.
/// Returns an empty string if nothing usable remains.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.trim().chars() {
        if ch == KEY_SEPARATOR {
            continue;
        }
        if ch.is_whitespace() || ch == '-' {
            pending_dash = !slug.is_empty();
            continue;
        }
        if pending_dash {
            slug.push('-');
            pending_dash = false;
        }
        slug.extend(ch.to_lowercase());
    }

    slug
}

/// Key of a child named `name` under `parent_key`.
pub fn child_key(parent_key: &str, name: &str) -> String {
    let slug = slugify(name);
    if parent_key == ROOT_KEY {
        slug
    } else {
        format!("{}{}{}", parent_key, KEY_SEPARATOR, slug)
    }
}

/// Whether `candidate` is `key` or lies beneath it.
pub fn is_within(candidate: &str, key: &str) -> bool {
    if key == ROOT_KEY {
        return true;
    }
    match candidate.strip_prefix(key) {
        Some("") => true,
        Some(rest) => rest.starts_with(KEY_SEPARATOR),
        None => false,
    }
}

/// Substitute the `old_prefix` of `key` with `new_prefix`.
///
/// Callers must ensure `is_within(key, old_prefix)`.
pub fn rekey(key: &str, old_prefix: &str, new_prefix: &str) -> String {
    format!("{}{}", new_prefix, &key[old_prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Characters"), "characters");
        assert_eq!(slugify("  Main   Cast "), "main-cast");
        assert_eq!(slugify("A/B"), "ab");
        assert_eq!(slugify("Über-Plot"), "über-plot");
        assert_eq!(slugify(" / "), "");
    }

    #[test]
    fn test_child_key() {
        assert_eq!(child_key(ROOT_KEY, "Characters"), "characters");
        assert_eq!(
            child_key("characters", "Protagonists"),
            "characters/protagonists"
        );
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("characters", "characters"));
        assert!(is_within("characters/protagonists", "characters"));
        assert!(!is_within("characters-old", "characters"));
        assert!(!is_within("cast", "characters"));
        assert!(is_within("anything", ROOT_KEY));
    }

    #[test]
    fn test_rekey() {
        assert_eq!(
            rekey("characters/protagonists", "characters", "cast"),
            "cast/protagonists"
        );
        assert_eq!(rekey("characters", "characters", "cast"), "cast");
    }

    #[test]
    fn test_snapshot_parent_optional_on_wire() {
        let json = r##"{"key":"","name":"Uncategorized","color":"#fff"}"##;
        let snapshot: CollectionSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.parent, None);
        assert_eq!(snapshot.level, 0);
    }
}
