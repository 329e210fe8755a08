//! The notebook: a collection tree plus the canonical note list.
//!
//! Owning both lets every structural operation rewrite notes and refresh
//! membership in one synchronous step, before any network call is issued.

use crate::clear::{ClearError, ClearReason};
use crate::collection::{CollectionSnapshot, ROOT_KEY};
use crate::config::NotebookConfig;
use crate::events::{EventBus, NotebookEvent};
use crate::membership::{MembershipReconciler, RebuildReport};
use crate::note::{Note, NoteId};
use crate::tree::{
    CollectionTree, DeleteImpact, DeleteReport, RenameReport, ReplaceReport, Result, TreeError,
};
use std::sync::Arc;

/// What happened to remote data offered to the notebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local state was replaced
    Applied { count: usize },
    /// Remote returned nothing while local state was non-empty; local state kept
    Preserved,
}

/// Draft values for editing one collection.
///
/// Created from the tree, edited freely, then handed back to
/// `Notebook::commit_edit`. Nothing is changed until the commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    key: String,
    pub name: String,
    pub color: String,
}

impl EditSession {
    pub fn collection(tree: &CollectionTree, key: &str) -> Result<Self> {
        if key == ROOT_KEY {
            return Err(TreeError::ProtectedNode);
        }
        let node = tree
            .get(key)
            .ok_or_else(|| TreeError::UnknownCollection(key.to_string()))?;
        Ok(Self {
            key: key.to_string(),
            name: node.name.clone(),
            color: node.color.clone(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug)]
pub struct Notebook {
    tree: CollectionTree,
    notes: Vec<Note>,
    reconciler: MembershipReconciler,
    events: Arc<EventBus>,
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new(&NotebookConfig::default())
    }
}

impl Notebook {
    pub fn new(config: &NotebookConfig) -> Self {
        Self {
            tree: CollectionTree::from_config(config),
            notes: Vec::new(),
            reconciler: MembershipReconciler::from_config(config),
            events: Arc::new(EventBus::new()),
        }
    }

    /// Share an event bus with other components (e.g. the sync layer).
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn tree(&self) -> &CollectionTree {
        &self.tree
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| &n.id == id)
    }

    /// Notes directly in `key`, in note-list order.
    pub fn notes_in(&self, key: &str) -> Vec<&Note> {
        let Some(node) = self.tree.get(key) else {
            return Vec::new();
        };
        self.notes
            .iter()
            .filter(|n| node.note_ids().contains(&n.id))
            .collect()
    }

    /// No collections besides the root and no notes.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty() && self.notes.is_empty()
    }

    pub fn snapshot(&self) -> Vec<CollectionSnapshot> {
        self.tree.snapshot()
    }

    // ========== Collections ==========

    /// Create a collection and return its key.
    pub fn create_collection(
        &mut self,
        name: &str,
        color: Option<&str>,
        parent_key: &str,
    ) -> Result<String> {
        let key = self.tree.create(name, color, parent_key)?.key.clone();
        self.events
            .emit(NotebookEvent::CollectionCreated { key: key.clone() });
        Ok(key)
    }

    pub fn rename_collection(
        &mut self,
        key: &str,
        new_name: &str,
        new_color: Option<&str>,
    ) -> Result<RenameReport> {
        let report = self
            .tree
            .rename(key, new_name, new_color, &mut self.notes)?;
        self.rebuild_membership();
        self.events.emit(NotebookEvent::CollectionRenamed {
            old_key: report.old_key.clone(),
            new_key: report.new_key.clone(),
        });
        Ok(report)
    }

    pub fn set_collection_color(&mut self, key: &str, color: &str) -> Result<()> {
        self.tree.set_color(key, color)
    }

    pub fn begin_edit(&self, key: &str) -> Result<EditSession> {
        EditSession::collection(&self.tree, key)
    }

    /// Apply an edit session's draft name and color.
    pub fn commit_edit(&mut self, session: EditSession) -> Result<RenameReport> {
        self.rename_collection(&session.key, &session.name, Some(&session.color))
    }

    pub fn delete_impact(&self, key: &str) -> Result<DeleteImpact> {
        self.tree.delete_impact(key, &self.notes)
    }

    pub fn delete_collection(&mut self, key: &str) -> Result<DeleteReport> {
        let report = self.tree.delete(key, &mut self.notes)?;
        self.rebuild_membership();
        self.events.emit(NotebookEvent::CollectionDeleted {
            key: key.to_string(),
            removed: report.removed_keys.len(),
            orphaned: report.orphaned_notes.len(),
        });
        Ok(report)
    }

    pub fn toggle_collapse(&mut self, key: &str) -> Result<bool> {
        let collapsed = self.tree.toggle_collapse(key)?;
        self.events.emit(NotebookEvent::CollapseToggled {
            key: key.to_string(),
            collapsed,
        });
        Ok(collapsed)
    }

    pub fn reorder_collections(&mut self, parent_key: &str, order: &[usize]) -> Result<()> {
        self.tree.reorder_children(parent_key, order)?;
        self.events.emit(NotebookEvent::Reordered {
            parent: parent_key.to_string(),
        });
        Ok(())
    }

    // ========== Notes ==========

    /// Move a note to `to_key`. Returns false if it was already there.
    pub fn move_note(&mut self, id: &NoteId, to_key: &str) -> Result<bool> {
        let from_key = self
            .note(id)
            .map(|n| n.collection.clone())
            .ok_or_else(|| TreeError::UnknownNote(id.clone()))?;

        let moved = self
            .tree
            .move_note(&mut self.notes, id, &from_key, to_key)?;
        if moved {
            self.events.emit(NotebookEvent::NoteMoved {
                note_id: id.to_string(),
                from: from_key,
                to: to_key.to_string(),
            });
        }
        Ok(moved)
    }

    /// Add a new note. Its collection must exist.
    pub fn add_note(&mut self, note: Note) -> Result<()> {
        if !self.tree.contains(&note.collection) {
            return Err(TreeError::UnknownCollection(note.collection));
        }
        self.upsert_note(note);
        Ok(())
    }

    /// Insert or replace a note by id (e.g. the copy returned by a save).
    ///
    /// Unknown collections are healed to the root.
    pub fn upsert_note(&mut self, note: Note) {
        match self.notes.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => *existing = note,
            None => self.notes.push(note),
        }
        self.rebuild_membership();
    }

    pub fn remove_note(&mut self, id: &NoteId) -> Option<Note> {
        let index = self.notes.iter().position(|n| &n.id == id)?;
        let note = self.notes.remove(index);
        self.rebuild_membership();
        Some(note)
    }

    pub fn rebuild_membership(&mut self) -> RebuildReport {
        let report = self.reconciler.rebuild(&mut self.tree, &mut self.notes);
        if report.changed_notes() {
            self.events.emit(NotebookEvent::MembershipRebuilt {
                healed: report.healed,
                migrated: report.migrated,
                realigned: report.realigned,
            });
        }
        report
    }

    // ========== Remote data ==========

    /// Replace every collection with `snapshots` and rebuild membership.
    pub fn replace_collections(&mut self, snapshots: &[CollectionSnapshot]) -> ReplaceReport {
        let report = self.tree.replace_with(snapshots);
        self.rebuild_membership();
        report
    }

    /// Replace the note list and rebuild membership.
    pub fn replace_notes(&mut self, notes: Vec<Note>) -> RebuildReport {
        self.notes = notes;
        self.rebuild_membership()
    }

    /// Replace collections from a remote load, unless that would blank a
    /// non-empty local tree.
    pub fn apply_remote_collections(&mut self, snapshots: &[CollectionSnapshot]) -> ApplyOutcome {
        let has_collections = snapshots.iter().any(|s| s.key != ROOT_KEY);
        if !has_collections && !self.tree.is_empty() {
            tracing::warn!(
                "Remote returned no collections; keeping {} local collections",
                self.tree.len() - 1
            );
            self.events.emit(NotebookEvent::LocalPreserved {
                resource: "collections".into(),
            });
            return ApplyOutcome::Preserved;
        }

        let report = self.replace_collections(snapshots);
        tracing::info!(
            "Loaded {} collections ({} skipped)",
            report.accepted,
            report.skipped.len()
        );
        ApplyOutcome::Applied {
            count: report.accepted,
        }
    }

    /// Replace notes from a remote load, unless that would blank a non-empty
    /// local note list.
    pub fn apply_remote_notes(&mut self, notes: Vec<Note>) -> ApplyOutcome {
        if notes.is_empty() && !self.notes.is_empty() {
            tracing::warn!(
                "Remote returned no notes; keeping {} local notes",
                self.notes.len()
            );
            self.events.emit(NotebookEvent::LocalPreserved {
                resource: "notes".into(),
            });
            return ApplyOutcome::Preserved;
        }

        let count = notes.len();
        self.replace_notes(notes);
        tracing::info!("Loaded {} notes", count);
        ApplyOutcome::Applied { count }
    }

    /// Wipe collections and notes. Only confirmed reasons are accepted.
    pub fn clear(&mut self, reason: &ClearReason) -> std::result::Result<(), ClearError> {
        if let Err(err) = reason.require_confirmed() {
            self.events.emit(NotebookEvent::ClearRejected {
                reason: reason.to_string(),
            });
            return Err(err);
        }

        self.tree.reset();
        self.notes.clear();
        tracing::info!("Cleared notebook ({})", reason);
        self.events.emit(NotebookEvent::StateCleared {
            reason: reason.to_string(),
        });
        Ok(())
    }
}
