//! Membership reconciliation.
//!
//! `Note::collection` is canonical. `rebuild` derives every node's `note_ids`
//! from it, healing references to collections that no longer exist.

use crate::collection::ROOT_KEY;
use crate::config::NotebookConfig;
use crate::note::Note;
use crate::tree::CollectionTree;

/// What a rebuild had to fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Notes whose collection did not exist and were moved to the root
    pub healed: usize,
    /// Notes still on a legacy root key, moved to the root
    pub migrated: usize,
    /// Notes on a remote key the tree re-derived, moved to the derived key
    pub realigned: usize,
    /// Notes assigned in total
    pub assigned: usize,
}

impl RebuildReport {
    pub fn changed_notes(&self) -> bool {
        self.healed > 0 || self.migrated > 0 || self.realigned > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct MembershipReconciler {
    legacy_root_keys: Vec<String>,
}

impl MembershipReconciler {
    pub fn new(legacy_root_keys: Vec<String>) -> Self {
        Self { legacy_root_keys }
    }

    pub fn from_config(config: &NotebookConfig) -> Self {
        Self::new(config.legacy_root_keys.clone())
    }

    /// Recompute membership for every node from `notes`.
    ///
    /// Idempotent: a second run over the same notes changes nothing.
    pub fn rebuild(&self, tree: &mut CollectionTree, notes: &mut [Note]) -> RebuildReport {
        tree.clear_memberships();
        let mut report = RebuildReport::default();

        for note in notes.iter_mut() {
            // A legacy key only means "root" if no live collection now owns it.
            if self.is_legacy_root(&note.collection) && !tree.contains(&note.collection) {
                tracing::debug!(
                    "Migrating note {} from legacy key '{}' to root",
                    note.id,
                    note.collection
                );
                note.collection = ROOT_KEY.to_string();
                report.migrated += 1;
            }

            if !tree.contains(&note.collection) {
                if let Some(target) = tree.aliases().get(&note.collection) {
                    tracing::debug!(
                        "Note {} follows re-derived key '{}' -> '{}'",
                        note.id,
                        note.collection,
                        target
                    );
                    note.collection = target.clone();
                    report.realigned += 1;
                }
            }

            if !tree.add_member(&note.collection, note.id.clone()) {
                tracing::debug!(
                    "Note {} referenced missing collection '{}', moving to root",
                    note.id,
                    note.collection
                );
                note.collection = ROOT_KEY.to_string();
                tree.add_member(ROOT_KEY, note.id.clone());
                report.healed += 1;
            }
            report.assigned += 1;
        }

        if report.changed_notes() {
            tracing::info!(
                "Rebuilt membership: {} notes, {} healed, {} migrated, {} realigned",
                report.assigned,
                report.healed,
                report.migrated,
                report.realigned
            );
        }
        report
    }

    fn is_legacy_root(&self, key: &str) -> bool {
        key != ROOT_KEY && self.legacy_root_keys.iter().any(|k| k == key)
    }
}
