//! Subcommands and the session that runs them.
//!
//! A session loads the notebook through the sync layer, applies one command
//! locally, then pushes whatever the command changed.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use notebook_core::{
    ClearReason, ClientCache, IdentitySource, Note, NoteId, Notebook, NotebookConfig, ROOT_KEY,
    RemoteStore, SyncLayer, SyncOutcome,
};
use std::collections::HashSet;
use std::fmt::Write as _;
use tracing::{info, warn};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the collection tree
    Tree,

    /// Create a collection
    Create {
        name: String,
        /// Parent collection key (root if omitted)
        #[arg(long, default_value = "")]
        parent: String,
        #[arg(long)]
        color: Option<String>,
    },

    /// Rename a collection (rekeys its whole subtree)
    Rename {
        key: String,
        name: String,
        #[arg(long)]
        color: Option<String>,
    },

    /// Change a collection's color (the root's too)
    Color { key: String, color: String },

    /// Delete a collection; its notes move to the root
    Delete {
        key: String,
        /// Confirm deleting a non-empty collection
        #[arg(long)]
        yes: bool,
    },

    /// Move a note to another collection
    Move { note: String, to: String },

    /// Add a note
    NoteAdd {
        name: String,
        #[arg(long, default_value = "")]
        collection: String,
        #[arg(long, default_value = "")]
        content: String,
    },

    /// Delete a note (with its favorite flag and tags)
    NoteDelete {
        note: String,
        /// Confirm the delete
        #[arg(long)]
        yes: bool,
    },

    /// Toggle a note's favorite flag
    Favorite { note: String },

    /// Tag (or with --remove, untag) a note
    Tag {
        tag: String,
        note: String,
        #[arg(long)]
        remove: bool,
    },

    /// Forget the signed-in user and clear local state
    Logout,
}

pub struct Session<R, S> {
    pub notebook: Notebook,
    pub cache: ClientCache,
    pub sync: SyncLayer<R, S>,
}

impl<R: RemoteStore, S: IdentitySource> Session<R, S> {
    pub fn new(sync: SyncLayer<R, S>, config: &NotebookConfig) -> Self {
        let notebook = Notebook::new(config).with_events(sync.events().clone());
        Self {
            notebook,
            cache: ClientCache::new(),
            sync,
        }
    }

    /// Pull collections, notes and preferences.
    ///
    /// A failed load is an error: pushing on top of an unloaded notebook
    /// would overwrite the remote copy.
    pub async fn load(&mut self) -> Result<bool> {
        let outcome = self
            .sync
            .pull_all(&mut self.notebook, &mut self.cache)
            .await
            .context("Failed to load notebook")?;
        if outcome.is_skipped() {
            warn!("Not signed in; working on an empty local notebook");
            return Ok(false);
        }
        self.repair_remote_keys().await?;
        Ok(true)
    }

    /// Save back collections whose remote key did not match their name, and
    /// the notes that followed them to the corrected key.
    async fn repair_remote_keys(&mut self) -> Result<()> {
        let ids: Vec<NoteId> = {
            let targets: HashSet<&String> = self.notebook.tree().aliases().values().collect();
            if targets.is_empty() {
                return Ok(());
            }
            self.notebook
                .notes()
                .iter()
                .filter(|n| targets.contains(&n.collection))
                .map(|n| n.id.clone())
                .collect()
        };

        info!(
            "Repairing {} remote collection key(s) and {} note(s)",
            self.notebook.tree().aliases().len(),
            ids.len()
        );
        self.push_tree().await?;
        self.push_notes(&ids).await?;
        Ok(())
    }

    pub async fn execute(&mut self, command: Command) -> Result<String> {
        match command {
            Command::Tree => Ok(render_tree(&self.notebook)),

            Command::Create {
                name,
                parent,
                color,
            } => {
                let key = self
                    .notebook
                    .create_collection(&name, color.as_deref(), &parent)?;
                let saved = self.push_tree().await?;
                Ok(with_status(format!("Created collection '{}'", key), saved))
            }

            Command::Rename { key, name, color } => {
                let report = self
                    .notebook
                    .rename_collection(&key, &name, color.as_deref())?;
                let mut saved = self.push_tree().await?;
                saved &= self.push_notes(&report.notes_rewritten).await?;
                Ok(with_status(
                    format!(
                        "Renamed '{}' to '{}' ({} subcollections, {} notes rekeyed)",
                        report.old_key,
                        report.new_key,
                        report.descendants.len(),
                        report.notes_rewritten.len()
                    ),
                    saved,
                ))
            }

            Command::Color { key, color } => {
                self.notebook.set_collection_color(&key, &color)?;
                let saved = self.push_tree().await?;
                Ok(with_status(format!("Set color of '{}' to {}", key, color), saved))
            }

            Command::Delete { key, yes } => {
                let impact = self.notebook.delete_impact(&key)?;
                if impact.requires_confirmation() && !yes {
                    bail!(
                        "'{}' contains {} subcollection(s) and {} note(s); rerun with --yes to delete it",
                        key,
                        impact.subcollections,
                        impact.notes
                    );
                }
                let report = self.notebook.delete_collection(&key)?;
                let mut saved = self.push_tree().await?;
                saved &= self.push_notes(&report.orphaned_notes).await?;
                Ok(with_status(
                    format!(
                        "Deleted {} collection(s); {} note(s) moved to {}",
                        report.removed_keys.len(),
                        report.orphaned_notes.len(),
                        self.notebook.tree().root().name
                    ),
                    saved,
                ))
            }

            Command::Move { note, to } => {
                let id = parse_note_id(&note)?;
                if !self.notebook.move_note(&id, &to)? {
                    return Ok(format!("Note {} is already in '{}'", id, to));
                }
                let saved = self.push_notes(std::slice::from_ref(&id)).await?;
                Ok(with_status(format!("Moved note {} to '{}'", id, to), saved))
            }

            Command::NoteAdd {
                name,
                collection,
                content,
            } => {
                let note = Note::new(&name, &content, &collection);
                let id = note.id.clone();
                self.notebook.add_note(note)?;
                let saved = self.push_notes(std::slice::from_ref(&id)).await?;
                Ok(with_status(format!("Added note {}", id), saved))
            }

            Command::NoteDelete { note, yes } => {
                let id = self.known_note(&note)?;
                let name = self
                    .notebook
                    .note(&id)
                    .map(|n| n.name.clone())
                    .unwrap_or_default();
                if !yes {
                    bail!(
                        "Deleting note '{}' ({}) cannot be undone; rerun with --yes to delete it",
                        name,
                        id
                    );
                }

                self.notebook.remove_note(&id);
                let (favorites, tags) = self.cache.forget_note(&id);

                let mut saved = !self
                    .sync
                    .delete_note(&id)
                    .await
                    .with_context(|| format!("Failed to delete note {}", id))?
                    .is_skipped();
                if favorites {
                    saved &= !self
                        .sync
                        .save_favorites(self.cache.favorites())
                        .await?
                        .is_skipped();
                }
                if tags {
                    saved &= !self.sync.save_tags(self.cache.tags()).await?.is_skipped();
                }
                Ok(with_status(format!("Deleted note '{}' ({})", name, id), saved))
            }

            Command::Favorite { note } => {
                let id = self.known_note(&note)?;
                let now = self.cache.toggle_favorite(&id);
                let saved = !self
                    .sync
                    .save_favorites(self.cache.favorites())
                    .await?
                    .is_skipped();
                let verb = if now { "Favorited" } else { "Unfavorited" };
                Ok(with_status(format!("{} note {}", verb, id), saved))
            }

            Command::Tag { tag, note, remove } => {
                let id = self.known_note(&note)?;
                let changed = if remove {
                    self.cache.untag_note(&tag, &id)
                } else {
                    self.cache.tag_note(&tag, &id)
                };
                if !changed {
                    return Ok(format!("Nothing to change for tag '{}' on note {}", tag, id));
                }
                let saved = !self.sync.save_tags(self.cache.tags()).await?.is_skipped();
                let verb = if remove { "Untagged" } else { "Tagged" };
                Ok(with_status(format!("{} note {} with '{}'", verb, id, tag), saved))
            }

            Command::Logout => {
                self.sync.confirm_logout();
                let reason = ClearReason::ConfirmedLogout;
                self.notebook.clear(&reason)?;
                self.cache.clear(&reason)?;
                info!("Logged out");
                Ok("Logged out; local state cleared".to_string())
            }
        }
    }

    /// Push the current tree. Returns false when skipped for a guest.
    async fn push_tree(&self) -> Result<bool> {
        let outcome = self
            .sync
            .push_notebook(&self.notebook)
            .await
            .context("Failed to save collections")?;
        Ok(!outcome.is_skipped())
    }

    /// Save the given notes. Returns false when skipped for a guest.
    async fn push_notes(&mut self, ids: &[NoteId]) -> Result<bool> {
        let mut saved = true;
        for id in ids {
            let Some(note) = self.notebook.note(id).cloned() else {
                continue;
            };
            match self
                .sync
                .save_note(&note)
                .await
                .with_context(|| format!("Failed to save note {}", id))?
            {
                SyncOutcome::Synced(stored) => self.notebook.upsert_note(stored),
                SyncOutcome::Skipped => saved = false,
            }
        }
        Ok(saved)
    }

    fn known_note(&self, raw: &str) -> Result<NoteId> {
        let id = parse_note_id(raw)?;
        if self.notebook.note(&id).is_none() {
            bail!("Unknown note: {}", id);
        }
        Ok(id)
    }
}

fn parse_note_id(raw: &str) -> Result<NoteId> {
    raw.parse::<NoteId>()
        .with_context(|| format!("Invalid note id '{}'", raw))
}

fn with_status(message: String, saved: bool) -> String {
    if saved {
        message
    } else {
        format!("{} (not signed in; not saved)", message)
    }
}

/// Indented outline of visible collections with note counts.
pub fn render_tree(notebook: &Notebook) -> String {
    let tree = notebook.tree();
    let mut out = String::new();

    for node in tree.iter() {
        if !tree.is_visible(&node.key) {
            continue;
        }
        let indent = "  ".repeat(node.level as usize);
        let marker = if tree.is_collapsed(&node.key) { "+" } else { "-" };
        let key = if node.key == ROOT_KEY {
            String::new()
        } else {
            format!(" [{}]", node.key)
        };
        let _ = writeln!(
            out,
            "{}{} {}{} ({} notes)",
            indent,
            marker,
            node.name,
            key,
            node.note_ids().len()
        );
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tree() {
        let mut notebook = Notebook::default();
        notebook
            .create_collection("Characters", None, ROOT_KEY)
            .unwrap();
        notebook
            .create_collection("Heroes", None, "characters")
            .unwrap();
        notebook
            .add_note(Note::with_id("n1", "Ada", "characters/heroes"))
            .unwrap();

        let rendered = render_tree(&notebook);
        assert_eq!(
            rendered,
            "- Uncategorized (0 notes)\n  - Characters [characters] (0 notes)\n    - Heroes [characters/heroes] (1 notes)"
        );

        notebook.toggle_collapse("characters").unwrap();
        assert_eq!(
            render_tree(&notebook),
            "- Uncategorized (0 notes)\n  + Characters [characters] (0 notes)"
        );
    }
}
