//! CollectionTree: the authoritative, path-keyed tree of collections.
//!
//! Nodes live in a flat map keyed by path; `parent_key` is a lookup-only back
//! reference. Every structural operation validates first and mutates second,
//! so a failed operation leaves the tree (and the notes passed in) untouched.
//!
//! Collapse state and sibling display order are also kept here. Neither is
//! part of a node's identity, but both must follow a node through a rekey.

use crate::clock::now_millis;
use crate::collection::{
    CollectionNode, CollectionSnapshot, KEY_SEPARATOR, MAX_DEPTH, ROOT_KEY, child_key, is_within,
    rekey, slugify,
};
use crate::config::NotebookConfig;
use crate::note::{Note, NoteId};
use crate::reorder::{self, ReorderError};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Collection name cannot be empty")]
    InvalidName,

    #[error("Cannot create a collection under '{parent}': maximum depth is {max}")]
    DepthExceeded { parent: String, max: u32 },

    #[error("A collection named '{name}' already exists here")]
    DuplicateName { name: String, key: String },

    #[error("The root collection cannot be renamed or deleted")]
    ProtectedNode,

    #[error("Unknown collection: '{0}'")]
    UnknownCollection(String),

    #[error("Unknown note: {0}")]
    UnknownNote(NoteId),

    #[error("Reorder rejected: {0}")]
    Reorder(#[from] ReorderError),
}

pub type Result<T> = std::result::Result<T, TreeError>;

/// Result of a rename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    pub old_key: String,
    pub new_key: String,
    /// Descendants whose keys were rewritten (old, new). Excludes the renamed node.
    pub descendants: Vec<(String, String)>,
    /// Notes whose `collection` was rewritten
    pub notes_rewritten: Vec<NoteId>,
}

impl RenameReport {
    pub fn rekeyed(&self) -> bool {
        self.old_key != self.new_key
    }
}

/// What deleting a collection would affect. Shown to the user before confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteImpact {
    /// Collections beneath the target
    pub subcollections: usize,
    /// Notes in the target or any of its descendants
    pub notes: usize,
}

impl DeleteImpact {
    pub fn requires_confirmation(&self) -> bool {
        self.subcollections > 0 || self.notes > 0
    }
}

/// Result of a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// The deleted collection followed by its descendants
    pub removed_keys: Vec<String>,
    /// Notes moved to the root
    pub orphaned_notes: Vec<NoteId>,
}

/// Result of replacing the tree with remote snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceReport {
    pub accepted: usize,
    /// Snapshot keys that could not be placed (missing parent, too deep, duplicate)
    pub skipped: Vec<String>,
    /// Snapshot keys that did not match their name, with the key they now have
    pub rekeyed: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct CollectionTree {
    nodes: HashMap<String, CollectionNode>,
    /// Non-root keys in display order
    order: Vec<String>,
    collapsed: HashSet<String>,
    /// Descendants each collapse newly collapsed, restored when it expands
    cascaded: HashMap<String, HashSet<String>>,
    /// Remote keys re-derived by the last `replace_with` -> their local key
    aliases: HashMap<String, String>,
    default_color: String,
}

impl Default for CollectionTree {
    fn default() -> Self {
        Self::from_config(&NotebookConfig::default())
    }
}

impl CollectionTree {
    /// Create a tree holding only the root.
    pub fn new(root_name: &str, default_color: &str) -> Self {
        let root = CollectionNode {
            key: ROOT_KEY.to_string(),
            name: root_name.to_string(),
            color: default_color.to_string(),
            parent_key: None,
            level: 0,
            created: now_millis(),
            note_ids: BTreeSet::new(),
        };

        let mut nodes = HashMap::new();
        nodes.insert(ROOT_KEY.to_string(), root);

        Self {
            nodes,
            order: Vec::new(),
            collapsed: HashSet::new(),
            cascaded: HashMap::new(),
            aliases: HashMap::new(),
            default_color: default_color.to_string(),
        }
    }

    pub fn from_config(config: &NotebookConfig) -> Self {
        Self::new(&config.root_name, &config.default_color)
    }

    // ========== Queries ==========

    pub fn root(&self) -> &CollectionNode {
        // The root is inserted at construction and never removed.
        &self.nodes[ROOT_KEY]
    }

    pub fn get(&self, key: &str) -> Option<&CollectionNode> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All nodes: the root first, then display order.
    pub fn iter(&self) -> impl Iterator<Item = &CollectionNode> {
        std::iter::once(self.root()).chain(self.order.iter().filter_map(|k| self.nodes.get(k)))
    }

    /// Direct children of `parent_key` in display order.
    pub fn children(&self, parent_key: &str) -> Vec<&CollectionNode> {
        self.order
            .iter()
            .filter_map(|k| self.nodes.get(k))
            .filter(|n| n.parent_key.as_deref() == Some(parent_key))
            .collect()
    }

    fn child_keys(&self, parent_key: &str) -> Vec<String> {
        self.children(parent_key)
            .into_iter()
            .map(|n| n.key.clone())
            .collect()
    }

    /// Every node beneath `key`, found by following parent links.
    pub fn descendants(&self, key: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut frontier = vec![key.to_string()];

        while let Some(current) = frontier.pop() {
            for child in self.child_keys(&current) {
                frontier.push(child.clone());
                found.push(child);
            }
        }

        found
    }

    /// Display names from the top-level ancestor down to `key`.
    ///
    /// The root's name is only included when asking for the root itself.
    pub fn get_path(&self, key: &str) -> Result<Vec<String>> {
        let mut node = self
            .nodes
            .get(key)
            .ok_or_else(|| TreeError::UnknownCollection(key.to_string()))?;

        if node.is_root() {
            return Ok(vec![node.name.clone()]);
        }

        let mut names = vec![node.name.clone()];
        while let Some(parent_key) = node.parent_key.as_deref() {
            if parent_key == ROOT_KEY {
                break;
            }
            let Some(parent) = self.nodes.get(parent_key) else {
                break;
            };
            names.push(parent.name.clone());
            node = parent;
        }

        names.reverse();
        Ok(names)
    }

    /// Breadcrumb string, e.g. "Characters / Protagonists".
    pub fn display_path(&self, key: &str) -> Result<String> {
        Ok(self.get_path(key)?.join(" / "))
    }

    /// Remote keys that `replace_with` had to re-derive, mapped to the local key.
    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }

    pub fn is_collapsed(&self, key: &str) -> bool {
        self.collapsed.contains(key)
    }

    /// A node is visible when none of its ancestors is collapsed.
    pub fn is_visible(&self, key: &str) -> bool {
        let mut current = self.nodes.get(key).and_then(|n| n.parent_key.as_deref());
        while let Some(parent_key) = current {
            if self.collapsed.contains(parent_key) {
                return false;
            }
            current = self.nodes.get(parent_key).and_then(|n| n.parent_key.as_deref());
        }
        true
    }

    /// Counts shown in the confirmation prompt before a delete.
    pub fn delete_impact(&self, key: &str, notes: &[Note]) -> Result<DeleteImpact> {
        if key == ROOT_KEY {
            return Err(TreeError::ProtectedNode);
        }
        if !self.contains(key) {
            return Err(TreeError::UnknownCollection(key.to_string()));
        }

        let descendants = self.descendants(key);
        let affected: HashSet<&str> = descendants
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(key))
            .collect();

        Ok(DeleteImpact {
            subcollections: descendants.len(),
            notes: notes
                .iter()
                .filter(|n| affected.contains(n.collection.as_str()))
                .count(),
        })
    }

    pub fn snapshot(&self) -> Vec<CollectionSnapshot> {
        self.iter().map(CollectionNode::to_snapshot).collect()
    }

    // ========== Structural operations ==========

    /// Fail with `DuplicateName` if `name`/`key` clashes with a child of `parent_key`.
    fn check_sibling_free(
        &self,
        parent_key: &str,
        name: &str,
        key: &str,
        ignore: Option<&str>,
    ) -> Result<()> {
        let lowered = name.to_lowercase();
        let clash = self
            .children(parent_key)
            .into_iter()
            .filter(|s| Some(s.key.as_str()) != ignore)
            .any(|s| s.key == key || s.name.to_lowercase() == lowered);

        if clash || (ignore != Some(key) && self.nodes.contains_key(key)) {
            return Err(TreeError::DuplicateName {
                name: name.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Create a collection under `parent_key`.
    ///
    /// Without an explicit color, a nested collection inherits its parent's
    /// color and a top-level one gets the default.
    pub fn create(
        &mut self,
        name: &str,
        color: Option<&str>,
        parent_key: &str,
    ) -> Result<&CollectionNode> {
        let name = name.trim();
        if slugify(name).is_empty() {
            return Err(TreeError::InvalidName);
        }

        let parent = self
            .nodes
            .get(parent_key)
            .ok_or_else(|| TreeError::UnknownCollection(parent_key.to_string()))?;

        let level = parent.level + 1;
        if level > MAX_DEPTH {
            return Err(TreeError::DepthExceeded {
                parent: parent_key.to_string(),
                max: MAX_DEPTH,
            });
        }

        let key = child_key(parent_key, name);
        self.check_sibling_free(parent_key, name, &key, None)?;

        let color = match color.map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ if !parent.is_root() => parent.color.clone(),
            _ => self.default_color.clone(),
        };

        let node = CollectionNode {
            key: key.clone(),
            name: name.to_string(),
            color,
            parent_key: Some(parent_key.to_string()),
            level,
            created: now_millis(),
            note_ids: BTreeSet::new(),
        };

        self.nodes.insert(key.clone(), node);
        self.order.push(key.clone());

        tracing::debug!("Created collection '{}' at level {}", key, level);
        Ok(&self.nodes[&key])
    }

    /// Rename a collection, rekeying its whole subtree if the key changes.
    ///
    /// Every descendant key, parent reference, collapse flag, display-order
    /// entry and note `collection` under the old key moves to the new key.
    pub fn rename(
        &mut self,
        key: &str,
        new_name: &str,
        new_color: Option<&str>,
        notes: &mut [Note],
    ) -> Result<RenameReport> {
        if key == ROOT_KEY {
            return Err(TreeError::ProtectedNode);
        }
        let node = self
            .nodes
            .get(key)
            .ok_or_else(|| TreeError::UnknownCollection(key.to_string()))?;

        let new_name = new_name.trim();
        if slugify(new_name).is_empty() {
            return Err(TreeError::InvalidName);
        }

        let parent_key = node.parent_key.clone().unwrap_or_default();
        let new_key = child_key(&parent_key, new_name);
        self.check_sibling_free(&parent_key, new_name, &new_key, Some(key))?;

        // Validation done. Nothing below can fail.
        let mut report = RenameReport {
            old_key: key.to_string(),
            new_key: new_key.clone(),
            ..Default::default()
        };

        if new_key != key {
            let affected: Vec<String> = std::iter::once(key.to_string())
                .chain(self.descendants(key))
                .collect();

            for old in &affected {
                let Some(mut moved) = self.nodes.remove(old) else {
                    continue;
                };
                let renamed = rekey(old, key, &new_key);
                moved.key = renamed.clone();
                if let Some(parent) = moved.parent_key.as_mut() {
                    if is_within(parent, key) {
                        *parent = rekey(parent, key, &new_key);
                    }
                }
                self.nodes.insert(renamed.clone(), moved);
                if old != key {
                    report.descendants.push((old.clone(), renamed));
                }
            }

            let affected: HashSet<&str> = affected.iter().map(String::as_str).collect();

            for slot in self.order.iter_mut() {
                if affected.contains(slot.as_str()) {
                    *slot = rekey(slot, key, &new_key);
                }
            }

            let moved = |k: String| {
                if affected.contains(k.as_str()) {
                    rekey(&k, key, &new_key)
                } else {
                    k
                }
            };
            self.collapsed = self.collapsed.drain().map(moved).collect();
            self.cascaded = self
                .cascaded
                .drain()
                .map(|(k, restored)| (moved(k), restored.into_iter().map(moved).collect()))
                .collect();
            for target in self.aliases.values_mut() {
                if affected.contains(target.as_str()) {
                    *target = rekey(target, key, &new_key);
                }
            }

            for note in notes.iter_mut() {
                if affected.contains(note.collection.as_str()) {
                    note.collection = rekey(&note.collection, key, &new_key);
                    report.notes_rewritten.push(note.id.clone());
                }
            }
        }

        if let Some(node) = self.nodes.get_mut(&new_key) {
            node.name = new_name.to_string();
            if let Some(color) = new_color.map(str::trim).filter(|c| !c.is_empty()) {
                node.color = color.to_string();
            }
        }

        tracing::info!(
            "Renamed collection '{}' -> '{}' ({} descendants, {} notes rekeyed)",
            key,
            new_key,
            report.descendants.len(),
            report.notes_rewritten.len()
        );
        Ok(report)
    }

    /// Change a collection's color. The root's color may be changed too.
    pub fn set_color(&mut self, key: &str, color: &str) -> Result<()> {
        let node = self
            .nodes
            .get_mut(key)
            .ok_or_else(|| TreeError::UnknownCollection(key.to_string()))?;
        node.color = color.trim().to_string();
        Ok(())
    }

    /// Delete a collection and its whole subtree. Notes inside move to the root.
    pub fn delete(&mut self, key: &str, notes: &mut [Note]) -> Result<DeleteReport> {
        if key == ROOT_KEY {
            return Err(TreeError::ProtectedNode);
        }
        if !self.contains(key) {
            return Err(TreeError::UnknownCollection(key.to_string()));
        }

        let mut removed_keys = vec![key.to_string()];
        removed_keys.extend(self.descendants(key));
        let removed: HashSet<&str> = removed_keys.iter().map(String::as_str).collect();

        for k in &removed_keys {
            self.nodes.remove(k);
            self.collapsed.remove(k);
            self.cascaded.remove(k);
        }
        for restored in self.cascaded.values_mut() {
            restored.retain(|k| !removed.contains(k.as_str()));
        }
        self.aliases.retain(|_, target| !removed.contains(target.as_str()));
        self.order.retain(|k| !removed.contains(k.as_str()));

        let mut orphaned_notes = Vec::new();
        for note in notes.iter_mut() {
            if removed.contains(note.collection.as_str()) {
                note.collection = ROOT_KEY.to_string();
                orphaned_notes.push(note.id.clone());
            }
        }

        if let Some(root) = self.nodes.get_mut(ROOT_KEY) {
            root.note_ids.extend(orphaned_notes.iter().cloned());
        }

        tracing::info!(
            "Deleted collection '{}' ({} removed, {} notes moved to root)",
            key,
            removed_keys.len(),
            orphaned_notes.len()
        );

        Ok(DeleteReport {
            removed_keys,
            orphaned_notes,
        })
    }

    /// Move a note between collections.
    ///
    /// Returns `false` (and changes nothing) when `from_key == to_key`.
    pub fn move_note(
        &mut self,
        notes: &mut [Note],
        note_id: &NoteId,
        from_key: &str,
        to_key: &str,
    ) -> Result<bool> {
        if !self.contains(to_key) {
            return Err(TreeError::UnknownCollection(to_key.to_string()));
        }
        let note = notes
            .iter_mut()
            .find(|n| &n.id == note_id)
            .ok_or_else(|| TreeError::UnknownNote(note_id.clone()))?;

        if from_key == to_key {
            return Ok(false);
        }

        if let Some(from) = self.nodes.get_mut(from_key) {
            from.note_ids.remove(note_id);
        }
        if note.collection != from_key {
            if let Some(actual) = self.nodes.get_mut(&note.collection) {
                actual.note_ids.remove(note_id);
            }
        }
        if let Some(to) = self.nodes.get_mut(to_key) {
            to.note_ids.insert(note_id.clone());
        }
        note.collection = to_key.to_string();

        tracing::debug!("Moved note {} from '{}' to '{}'", note_id, from_key, to_key);
        Ok(true)
    }

    /// Flip a collection between expanded and collapsed.
    ///
    /// Collapsing also collapses every descendant. Expanding reopens only the
    /// descendants this node's collapse closed; any that were collapsed
    /// beforehand stay collapsed. Returns the new collapsed state.
    pub fn toggle_collapse(&mut self, key: &str) -> Result<bool> {
        if !self.contains(key) {
            return Err(TreeError::UnknownCollection(key.to_string()));
        }

        if self.collapsed.remove(key) {
            for descendant in self.cascaded.remove(key).unwrap_or_default() {
                self.collapsed.remove(&descendant);
            }
            return Ok(false);
        }

        self.collapsed.insert(key.to_string());
        let newly: HashSet<String> = self
            .descendants(key)
            .into_iter()
            .filter(|d| self.collapsed.insert(d.clone()))
            .collect();
        self.cascaded.insert(key.to_string(), newly);
        Ok(true)
    }

    /// Reorder the children of `parent_key`.
    ///
    /// `order[i]` is the current index (among those children) of the child
    /// that should end up at position `i`.
    pub fn reorder_children(&mut self, parent_key: &str, order: &[usize]) -> Result<()> {
        if !self.contains(parent_key) {
            return Err(TreeError::UnknownCollection(parent_key.to_string()));
        }

        let siblings = self.child_keys(parent_key);
        let reordered = reorder::apply_permutation(&siblings, order)?;
        let sibling_set: HashSet<&str> = siblings.iter().map(String::as_str).collect();

        let mut next = reordered.into_iter();
        let new_order: Vec<String> = self
            .order
            .iter()
            .map(|k| {
                if sibling_set.contains(k.as_str()) {
                    next.next().unwrap_or_else(|| k.clone())
                } else {
                    k.clone()
                }
            })
            .collect();

        self.order = new_order;
        Ok(())
    }

    // ========== Bulk replacement ==========

    /// Replace every collection with the given snapshots.
    ///
    /// The root survives (only its color may be taken from a root snapshot).
    /// Levels are recomputed from parent links rather than trusted, and so is
    /// the last key segment: a snapshot whose key does not match its name is
    /// placed at the key its name derives, and the old key is kept in
    /// `aliases` so notes still pointing at it can follow. Snapshots that
    /// cannot be placed are skipped. Membership is left empty for the
    /// reconciler to rebuild.
    pub fn replace_with(&mut self, snapshots: &[CollectionSnapshot]) -> ReplaceReport {
        let mut root = self.root().clone();
        root.note_ids.clear();
        if let Some(remote_root) = snapshots.iter().find(|s| s.key == ROOT_KEY) {
            if !remote_root.color.trim().is_empty() {
                root.color = remote_root.color.clone();
            }
        }

        let mut fresh = Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            collapsed: HashSet::new(),
            cascaded: HashMap::new(),
            aliases: HashMap::new(),
            default_color: self.default_color.clone(),
        };
        fresh.nodes.insert(ROOT_KEY.to_string(), root);

        let mut pending: Vec<(usize, &CollectionSnapshot)> = snapshots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.key != ROOT_KEY)
            .collect();
        let mut placed: Vec<(usize, String)> = Vec::new();
        let mut skipped = Vec::new();
        let mut rekeyed = Vec::new();
        // Remote key -> local key, for resolving parents of later entries
        let mut resolved: HashMap<String, String> =
            HashMap::from([(ROOT_KEY.to_string(), ROOT_KEY.to_string())]);

        // Parents may arrive after their children; keep passing until stable.
        loop {
            let before = pending.len();
            let mut waiting = Vec::new();

            for (index, snapshot) in pending {
                let remote_parent = snapshot.parent.as_deref().unwrap_or_default();
                let Some(parent_key) = resolved.get(remote_parent).cloned() else {
                    waiting.push((index, snapshot));
                    continue;
                };
                let Some(parent_level) = fresh.nodes.get(&parent_key).map(|p| p.level) else {
                    waiting.push((index, snapshot));
                    continue;
                };

                let name = snapshot.name.trim();
                let key = child_key(&parent_key, name);
                let level = parent_level + 1;
                let valid = level <= MAX_DEPTH
                    && !slugify(name).is_empty()
                    && is_direct_child_key(&snapshot.key, remote_parent)
                    && fresh
                        .check_sibling_free(&parent_key, name, &key, None)
                        .is_ok();

                if !valid {
                    tracing::warn!("Skipping remote collection '{}'", snapshot.key);
                    skipped.push(snapshot.key.clone());
                    continue;
                }

                if key != snapshot.key {
                    tracing::warn!(
                        "Remote collection '{}' does not match its name '{}', using '{}'",
                        snapshot.key,
                        name,
                        key
                    );
                    rekeyed.push((snapshot.key.clone(), key.clone()));
                }
                resolved.insert(snapshot.key.clone(), key.clone());

                fresh.nodes.insert(
                    key.clone(),
                    CollectionNode {
                        key: key.clone(),
                        name: name.to_string(),
                        color: snapshot.color.clone(),
                        parent_key: Some(parent_key),
                        level,
                        created: snapshot.created,
                        note_ids: BTreeSet::new(),
                    },
                );
                // Keep display order stable while later passes fill in.
                fresh.order.push(key.clone());
                placed.push((index, key));
            }

            pending = waiting;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }

        for (_, snapshot) in pending {
            tracing::warn!(
                "Skipping remote collection '{}': parent '{}' not found",
                snapshot.key,
                snapshot.parent.as_deref().unwrap_or_default()
            );
            skipped.push(snapshot.key.clone());
        }

        placed.sort_by_key(|(index, _)| *index);
        fresh.order = placed.into_iter().map(|(_, key)| key).collect();
        fresh.collapsed = self
            .collapsed
            .iter()
            .filter(|k| fresh.nodes.contains_key(k.as_str()))
            .cloned()
            .collect();
        fresh.cascaded = self
            .cascaded
            .iter()
            .filter(|(k, _)| fresh.nodes.contains_key(k.as_str()))
            .map(|(k, restored)| {
                let kept = restored
                    .iter()
                    .filter(|d| fresh.nodes.contains_key(d.as_str()))
                    .cloned()
                    .collect();
                (k.clone(), kept)
            })
            .collect();

        fresh.aliases = rekeyed.iter().cloned().collect();

        let report = ReplaceReport {
            accepted: fresh.order.len(),
            skipped,
            rekeyed,
        };
        *self = fresh;
        report
    }

    /// Drop every collection except the root and restore the root's color.
    pub(crate) fn reset(&mut self) {
        let root_name = self.root().name.clone();
        *self = Self::new(&root_name, &self.default_color.clone());
    }

    // ========== Membership (used by the reconciler) ==========

    pub(crate) fn clear_memberships(&mut self) {
        for node in self.nodes.values_mut() {
            node.note_ids.clear();
        }
    }

    /// Add `note_id` to `key`'s membership. Returns false if `key` is unknown.
    pub(crate) fn add_member(&mut self, key: &str, note_id: NoteId) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                node.note_ids.insert(note_id);
                true
            }
            None => false,
        }
    }
}

/// Whether `key` names a direct child of `parent_key`.
fn is_direct_child_key(key: &str, parent_key: &str) -> bool {
    let segment = if parent_key == ROOT_KEY {
        Some(key)
    } else {
        key.strip_prefix(parent_key)
            .and_then(|rest| rest.strip_prefix(KEY_SEPARATOR))
    };
    segment.is_some_and(|s| !s.is_empty() && !s.contains(KEY_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> CollectionTree {
        CollectionTree::new("Uncategorized", "#6c757d")
    }

    fn keys(tree: &CollectionTree) -> Vec<String> {
        tree.iter().map(|n| n.key.clone()).collect()
    }

    #[test]
    fn test_new_tree_has_only_root() {
        let tree = tree();
        assert_eq!(tree.len(), 1);
        assert!(tree.is_empty());
        assert_eq!(tree.root().level, 0);
        assert_eq!(tree.root().parent_key, None);
    }

    #[test]
    fn test_create_nested_collection() {
        let mut tree = tree();
        tree.create("Characters", Some("#87ceeb"), ROOT_KEY).unwrap();
        let child = tree
            .create("Protagonists", None, "characters")
            .unwrap()
            .clone();

        assert_eq!(child.key, "characters/protagonists");
        assert_eq!(child.level, 2);
        assert_eq!(child.parent_key.as_deref(), Some("characters"));
        // Inherits the parent's color
        assert_eq!(child.color, "#87ceeb");
    }

    #[test]
    fn test_top_level_gets_default_color() {
        let mut tree = tree();
        let node = tree.create("Places", None, ROOT_KEY).unwrap();
        assert_eq!(node.color, "#6c757d");
    }

    #[test]
    fn test_create_rejects_blank_name() {
        let mut tree = tree();
        assert_eq!(tree.create("   ", None, ROOT_KEY), Err(TreeError::InvalidName));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_create_unknown_parent() {
        let mut tree = tree();
        assert_eq!(
            tree.create("X", None, "missing").unwrap_err(),
            TreeError::UnknownCollection("missing".into())
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut tree = tree();
        let mut parent = ROOT_KEY.to_string();
        for name in ["a", "b", "c", "d"] {
            parent = tree.create(name, None, &parent).unwrap().key.clone();
        }
        assert_eq!(tree.get("a/b/c/d").unwrap().level, 4);

        let before = keys(&tree);
        let err = tree.create("e", None, "a/b/c/d").unwrap_err();
        assert_eq!(
            err,
            TreeError::DepthExceeded {
                parent: "a/b/c/d".into(),
                max: MAX_DEPTH
            }
        );
        assert_eq!(keys(&tree), before);
    }

    #[test]
    fn test_duplicate_sibling_name_case_insensitive() {
        let mut tree = tree();
        tree.create("Characters", None, ROOT_KEY).unwrap();

        let err = tree.create("CHARACTERS", None, ROOT_KEY).unwrap_err();
        assert!(matches!(err, TreeError::DuplicateName { .. }));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_duplicate_key_from_different_name() {
        let mut tree = tree();
        tree.create("Main Cast", None, ROOT_KEY).unwrap();
        assert!(matches!(
            tree.create("main-cast", None, ROOT_KEY),
            Err(TreeError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_same_name_under_different_parents() {
        let mut tree = tree();
        tree.create("Book One", None, ROOT_KEY).unwrap();
        tree.create("Book Two", None, ROOT_KEY).unwrap();
        tree.create("Notes", None, "book-one").unwrap();
        tree.create("Notes", None, "book-two").unwrap();

        assert_eq!(tree.get_path("book-one/notes").unwrap(), vec!["Book One", "Notes"]);
        assert_eq!(tree.get_path("book-two/notes").unwrap(), vec!["Book Two", "Notes"]);
    }

    #[test]
    fn test_rename_rekeys_subtree_and_notes() {
        let mut tree = tree();
        tree.create("Characters", None, ROOT_KEY).unwrap();
        tree.create("Protagonists", None, "characters").unwrap();
        tree.create("Heroes", None, "characters/protagonists").unwrap();
        tree.create("Places", None, ROOT_KEY).unwrap();

        let mut notes = vec![
            Note::with_id("n1", "One", "characters"),
            Note::with_id("n2", "Two", "characters/protagonists/heroes"),
            Note::with_id("n3", "Three", "places"),
        ];

        let report = tree
            .rename("characters", "Cast", None, &mut notes)
            .unwrap();

        assert_eq!(report.new_key, "cast");
        assert_eq!(report.descendants.len(), 2);
        assert_eq!(report.notes_rewritten.len(), 2);

        assert!(!tree.contains("characters"));
        assert_eq!(tree.get("cast").unwrap().name, "Cast");
        let heroes = tree.get("cast/protagonists/heroes").unwrap();
        assert_eq!(heroes.parent_key.as_deref(), Some("cast/protagonists"));
        assert_eq!(
            tree.get("cast/protagonists").unwrap().parent_key.as_deref(),
            Some("cast")
        );

        assert_eq!(notes[0].collection, "cast");
        assert_eq!(notes[1].collection, "cast/protagonists/heroes");
        assert_eq!(notes[2].collection, "places");
    }

    #[test]
    fn test_rename_keeps_display_position() {
        let mut tree = tree();
        tree.create("A", None, ROOT_KEY).unwrap();
        tree.create("B", None, ROOT_KEY).unwrap();
        tree.create("C", None, ROOT_KEY).unwrap();

        tree.rename("b", "Zed", None, &mut []).unwrap();
        assert_eq!(keys(&tree), vec!["", "a", "zed", "c"]);
    }

    #[test]
    fn test_rename_case_only_keeps_key() {
        let mut tree = tree();
        tree.create("characters", None, ROOT_KEY).unwrap();
        let report = tree
            .rename("characters", "Characters", Some("#ff0000"), &mut [])
            .unwrap();

        assert!(!report.rekeyed());
        let node = tree.get("characters").unwrap();
        assert_eq!(node.name, "Characters");
        assert_eq!(node.color, "#ff0000");
    }

    #[test]
    fn test_rename_to_existing_sibling_fails_unchanged() {
        let mut tree = tree();
        tree.create("A", None, ROOT_KEY).unwrap();
        tree.create("B", None, ROOT_KEY).unwrap();
        let mut notes = vec![Note::with_id("n1", "One", "a")];

        let err = tree.rename("a", "b", None, &mut notes).unwrap_err();
        assert!(matches!(err, TreeError::DuplicateName { .. }));
        assert!(tree.contains("a"));
        assert_eq!(notes[0].collection, "a");
    }

    #[test]
    fn test_rename_root_is_protected() {
        let mut tree = tree();
        assert_eq!(
            tree.rename(ROOT_KEY, "Inbox", None, &mut []),
            Err(TreeError::ProtectedNode)
        );
    }

    #[test]
    fn test_rename_moves_collapse_state() {
        let mut tree = tree();
        tree.create("A", None, ROOT_KEY).unwrap();
        tree.create("B", None, "a").unwrap();
        tree.toggle_collapse("a").unwrap();

        tree.rename("a", "Z", None, &mut []).unwrap();
        assert!(tree.is_collapsed("z"));
        assert!(tree.is_collapsed("z/b"));
        assert!(!tree.is_collapsed("a"));
    }

    #[test]
    fn test_delete_cascades_and_orphans_notes() {
        let mut tree = tree();
        tree.create("A", None, ROOT_KEY).unwrap();
        tree.create("B", None, "a").unwrap();
        tree.create("C", None, "a/b").unwrap();
        tree.create("D", None, ROOT_KEY).unwrap();

        let mut notes = vec![
            Note::with_id("n1", "One", "a"),
            Note::with_id("n2", "Two", "a/b/c"),
            Note::with_id("n3", "Three", "d"),
        ];

        let impact = tree.delete_impact("a", &notes).unwrap();
        assert_eq!(impact.subcollections, 2);
        assert_eq!(impact.notes, 2);
        assert!(impact.requires_confirmation());

        let report = tree.delete("a", &mut notes).unwrap();
        assert_eq!(report.removed_keys.len(), 3);
        assert_eq!(report.orphaned_notes.len(), 2);

        assert_eq!(keys(&tree), vec!["", "d"]);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].collection, ROOT_KEY);
        assert_eq!(notes[1].collection, ROOT_KEY);
        assert_eq!(notes[2].collection, "d");
        assert!(tree.root().note_ids().contains(&NoteId::from("n2")));
    }

    #[test]
    fn test_delete_root_is_protected() {
        let mut tree = tree();
        assert_eq!(tree.delete(ROOT_KEY, &mut []), Err(TreeError::ProtectedNode));
        assert_eq!(
            tree.delete_impact(ROOT_KEY, &[]),
            Err(TreeError::ProtectedNode)
        );
    }

    #[test]
    fn test_empty_delete_needs_no_confirmation() {
        let mut tree = tree();
        tree.create("A", None, ROOT_KEY).unwrap();
        assert!(!tree.delete_impact("a", &[]).unwrap().requires_confirmation());
    }

    #[test]
    fn test_move_note() {
        let mut tree = tree();
        tree.create("A", None, ROOT_KEY).unwrap();
        let mut notes = vec![Note::with_id("n1", "One", ROOT_KEY)];
        let id = NoteId::from("n1");
        tree.add_member(ROOT_KEY, id.clone());

        assert!(tree.move_note(&mut notes, &id, ROOT_KEY, "a").unwrap());
        assert_eq!(notes[0].collection, "a");
        assert!(tree.get("a").unwrap().note_ids().contains(&id));
        assert!(!tree.root().note_ids().contains(&id));
    }

    #[test]
    fn test_move_note_same_collection_is_noop() {
        let mut tree = tree();
        let mut notes = vec![Note::with_id("n1", "One", ROOT_KEY)];
        let id = NoteId::from("n1");
        assert!(!tree.move_note(&mut notes, &id, ROOT_KEY, ROOT_KEY).unwrap());
    }

    #[test]
    fn test_move_note_unknown_target() {
        let mut tree = tree();
        let mut notes = vec![Note::with_id("n1", "One", ROOT_KEY)];
        let err = tree
            .move_note(&mut notes, &NoteId::from("n1"), ROOT_KEY, "nowhere")
            .unwrap_err();
        assert_eq!(err, TreeError::UnknownCollection("nowhere".into()));
        assert_eq!(notes[0].collection, ROOT_KEY);
    }

    #[test]
    fn test_move_unknown_note() {
        let mut tree = tree();
        let err = tree
            .move_note(&mut [], &NoteId::from("ghost"), ROOT_KEY, ROOT_KEY)
            .unwrap_err();
        assert_eq!(err, TreeError::UnknownNote(NoteId::from("ghost")));
    }

    #[test]
    fn test_collapse_cascades_expand_restores() {
        let mut tree = tree();
        tree.create("P", None, ROOT_KEY).unwrap();
        tree.create("A", None, "p").unwrap();
        tree.create("B", None, "p/a").unwrap();

        assert!(tree.toggle_collapse("p").unwrap());
        assert!(tree.is_collapsed("p/a"));
        assert!(tree.is_collapsed("p/a/b"));
        assert!(!tree.is_visible("p/a"));

        assert!(!tree.toggle_collapse("p").unwrap());
        assert!(!tree.is_collapsed("p"));
        assert!(!tree.is_collapsed("p/a"));
        assert!(!tree.is_collapsed("p/a/b"));
        assert!(tree.is_visible("p/a/b"));
    }

    #[test]
    fn test_expand_keeps_descendants_collapsed_beforehand() {
        let mut tree = tree();
        tree.create("P", None, ROOT_KEY).unwrap();
        tree.create("A", None, "p").unwrap();
        tree.create("B", None, "p/a").unwrap();

        // B collapsed on its own beforehand
        assert!(tree.toggle_collapse("p/a/b").unwrap());

        tree.toggle_collapse("p").unwrap();
        assert!(tree.is_collapsed("p/a"));
        tree.toggle_collapse("p").unwrap();

        assert!(!tree.is_collapsed("p/a"));
        assert!(tree.is_collapsed("p/a/b"));
        assert!(tree.is_visible("p/a/b"));
    }

    #[test]
    fn test_nested_collapses_unwind_independently() {
        let mut tree = tree();
        tree.create("P", None, ROOT_KEY).unwrap();
        tree.create("A", None, "p").unwrap();
        tree.create("B", None, "p/a").unwrap();

        tree.toggle_collapse("p/a").unwrap();
        tree.toggle_collapse("p").unwrap();
        tree.toggle_collapse("p").unwrap();
        // A's own collapse predates P's and survives it
        assert!(tree.is_collapsed("p/a"));
        assert!(tree.is_collapsed("p/a/b"));

        tree.toggle_collapse("p/a").unwrap();
        assert!(!tree.is_collapsed("p/a/b"));
    }

    #[test]
    fn test_expand_after_rename_restores_rekeyed_descendants() {
        let mut tree = tree();
        tree.create("P", None, ROOT_KEY).unwrap();
        tree.create("A", None, "p").unwrap();
        tree.toggle_collapse("p").unwrap();

        tree.rename("p", "Q", None, &mut []).unwrap();
        assert!(tree.is_collapsed("q/a"));

        tree.toggle_collapse("q").unwrap();
        assert!(!tree.is_collapsed("q/a"));
        assert!(!tree.is_collapsed("p/a"));
    }

    #[test]
    fn test_delete_under_collapse_forgets_descendant() {
        let mut tree = tree();
        tree.create("P", None, ROOT_KEY).unwrap();
        tree.create("A", None, "p").unwrap();
        tree.toggle_collapse("p").unwrap();

        tree.delete("p/a", &mut []).unwrap();
        tree.create("A", None, "p").unwrap();
        tree.toggle_collapse("p").unwrap();

        assert!(!tree.is_collapsed("p/a"));
        assert!(!tree.is_collapsed("p"));
    }

    #[test]
    fn test_get_path() {
        let mut tree = tree();
        tree.create("Characters", None, ROOT_KEY).unwrap();
        tree.create("Protagonists", None, "characters").unwrap();

        assert_eq!(
            tree.get_path("characters/protagonists").unwrap(),
            vec!["Characters", "Protagonists"]
        );
        assert_eq!(tree.get_path(ROOT_KEY).unwrap(), vec!["Uncategorized"]);
        assert_eq!(
            tree.display_path("characters/protagonists").unwrap(),
            "Characters / Protagonists"
        );
        assert!(tree.get_path("missing").is_err());
    }

    #[test]
    fn test_reorder_children_only_touches_siblings() {
        let mut tree = tree();
        tree.create("A", None, ROOT_KEY).unwrap();
        tree.create("X", None, "a").unwrap();
        tree.create("B", None, ROOT_KEY).unwrap();
        tree.create("Y", None, "a").unwrap();
        tree.create("C", None, ROOT_KEY).unwrap();

        tree.reorder_children(ROOT_KEY, &[2, 0, 1]).unwrap();
        assert_eq!(keys(&tree), vec!["", "c", "a/x", "a", "a/y", "b"]);

        let children: Vec<_> = tree.children(ROOT_KEY).iter().map(|n| n.key.clone()).collect();
        assert_eq!(children, vec!["c", "a", "b"]);
        let nested: Vec<_> = tree.children("a").iter().map(|n| n.key.clone()).collect();
        assert_eq!(nested, vec!["a/x", "a/y"]);
    }

    #[test]
    fn test_reorder_children_rejects_bad_order() {
        let mut tree = tree();
        tree.create("A", None, ROOT_KEY).unwrap();
        tree.create("B", None, ROOT_KEY).unwrap();

        let err = tree.reorder_children(ROOT_KEY, &[0]).unwrap_err();
        assert!(matches!(err, TreeError::Reorder(ReorderError::LengthMismatch { .. })));
        assert_eq!(keys(&tree), vec!["", "a", "b"]);
    }

    #[test]
    fn test_snapshot_round_trips_through_replace() {
        let mut tree = tree();
        tree.create("B", Some("#111111"), ROOT_KEY).unwrap();
        tree.create("A", None, ROOT_KEY).unwrap();
        tree.create("Child", None, "b").unwrap();
        tree.set_color(ROOT_KEY, "#abcdef").unwrap();
        let snapshot = tree.snapshot();

        let mut other = CollectionTree::new("Uncategorized", "#6c757d");
        let report = other.replace_with(&snapshot);

        assert_eq!(report.accepted, 3);
        assert!(report.skipped.is_empty());
        assert_eq!(keys(&other), keys(&tree));
        assert_eq!(other.root().color, "#abcdef");
        assert_eq!(other.get("b/child").unwrap().color, "#111111");
    }

    #[test]
    fn test_replace_handles_children_before_parents() {
        let snapshots = vec![
            CollectionSnapshot {
                key: "a/b".into(),
                name: "B".into(),
                color: "#1".into(),
                parent: Some("a".into()),
                level: 7,
                created: 2,
            },
            CollectionSnapshot {
                key: "a".into(),
                name: "A".into(),
                color: "#2".into(),
                parent: None,
                level: 1,
                created: 1,
            },
        ];

        let mut tree = tree();
        let report = tree.replace_with(&snapshots);

        assert_eq!(report.accepted, 2);
        // Level recomputed, not trusted
        assert_eq!(tree.get("a/b").unwrap().level, 2);
        // Display order follows the snapshot list
        assert_eq!(keys(&tree), vec!["", "a/b", "a"]);
    }

    #[test]
    fn test_replace_skips_orphans_and_inconsistent_keys() {
        let snapshots = vec![
            CollectionSnapshot {
                key: "ghost/child".into(),
                name: "Child".into(),
                color: "#1".into(),
                parent: Some("ghost".into()),
                level: 2,
                created: 0,
            },
            CollectionSnapshot {
                key: "elsewhere/x".into(),
                name: "X".into(),
                color: "#1".into(),
                parent: None,
                level: 1,
                created: 0,
            },
        ];

        let mut tree = tree();
        tree.create("Local", None, ROOT_KEY).unwrap();
        let report = tree.replace_with(&snapshots);

        assert_eq!(report.accepted, 0);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_replace_rederives_key_from_name() {
        let snapshots = vec![
            CollectionSnapshot {
                key: "a".into(),
                name: "Zed".into(),
                color: "#1".into(),
                parent: None,
                level: 1,
                created: 0,
            },
            CollectionSnapshot {
                key: "a/b".into(),
                name: "B".into(),
                color: "#1".into(),
                parent: Some("a".into()),
                level: 2,
                created: 0,
            },
        ];

        let mut tree = tree();
        let report = tree.replace_with(&snapshots);

        assert_eq!(report.accepted, 2);
        assert_eq!(
            report.rekeyed,
            vec![
                ("a".to_string(), "zed".to_string()),
                ("a/b".to_string(), "zed/b".to_string())
            ]
        );
        assert!(!tree.contains("a"));
        assert_eq!(tree.get("zed/b").unwrap().parent_key.as_deref(), Some("zed"));
        assert_eq!(tree.aliases().get("a/b").map(String::as_str), Some("zed/b"));

        // The snapshot now carries keys derived from names
        let again = tree.snapshot();
        let mut other = CollectionTree::new("Uncategorized", "#6c757d");
        assert!(other.replace_with(&again).rekeyed.is_empty());
        assert!(other.aliases().is_empty());
    }

    #[test]
    fn test_aliases_follow_rename_and_delete() {
        let mut tree = tree();
        tree.replace_with(&[CollectionSnapshot {
            key: "a".into(),
            name: "Zed".into(),
            color: "#1".into(),
            parent: None,
            level: 1,
            created: 0,
        }]);

        tree.rename("zed", "Omega", None, &mut []).unwrap();
        assert_eq!(tree.aliases().get("a").map(String::as_str), Some("omega"));

        tree.delete("omega", &mut []).unwrap();
        assert!(tree.aliases().is_empty());
    }

    #[test]
    fn test_reset_keeps_root() {
        let mut tree = tree();
        tree.create("A", None, ROOT_KEY).unwrap();
        tree.set_color(ROOT_KEY, "#000").unwrap();

        tree.reset();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root().name, "Uncategorized");
        assert_eq!(tree.root().color, "#6c757d");
    }
}
