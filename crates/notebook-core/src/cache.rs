//! Client-cached preferences: favorites and tags.
//!
//! Both live remotely inside the shared preferences bundle. Locally they are
//! plain sets that are replaced from the bundle on load and cleared only for a
//! confirmed reason.

use crate::clear::{ClearError, ClearReason};
use crate::note::NoteId;
use crate::remote::PreferencesBundle;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCache {
    favorites: BTreeSet<NoteId>,
    tags: BTreeMap<String, BTreeSet<NoteId>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn favorites(&self) -> &BTreeSet<NoteId> {
        &self.favorites
    }

    pub fn tags(&self) -> &BTreeMap<String, BTreeSet<NoteId>> {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty() && self.tags.is_empty()
    }

    pub fn is_favorite(&self, id: &NoteId) -> bool {
        self.favorites.contains(id)
    }

    /// Flip favorite status. Returns whether the note is now a favorite.
    pub fn toggle_favorite(&mut self, id: &NoteId) -> bool {
        if self.favorites.remove(id) {
            false
        } else {
            self.favorites.insert(id.clone());
            true
        }
    }

    /// Returns false if the note already had the tag or the tag is blank.
    pub fn tag_note(&mut self, tag: &str, id: &NoteId) -> bool {
        let tag = tag.trim();
        if tag.is_empty() {
            return false;
        }
        self.tags
            .entry(tag.to_string())
            .or_default()
            .insert(id.clone())
    }

    /// Returns false if the note did not have the tag. Empty tags are dropped.
    pub fn untag_note(&mut self, tag: &str, id: &NoteId) -> bool {
        let tag = tag.trim();
        let Some(ids) = self.tags.get_mut(tag) else {
            return false;
        };
        let removed = ids.remove(id);
        if ids.is_empty() {
            self.tags.remove(tag);
        }
        removed
    }

    pub fn tags_for(&self, id: &NoteId) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|(_, ids)| ids.contains(id))
            .map(|(tag, _)| tag.as_str())
            .collect()
    }

    /// Drop a deleted note from favorites and every tag.
    /// Drop a deleted note from favorites and every tag.
    ///
    /// Returns (favorites changed, tags changed).
    pub fn forget_note(&mut self, id: &NoteId) -> (bool, bool) {
        let favorites = self.favorites.remove(id);
        let mut tags = false;
        self.tags.retain(|_, ids| {
            tags |= ids.remove(id);
            !ids.is_empty()
        });
        (favorites, tags)
    }

    /// Take favorites and tags from a remote bundle.
    ///
    /// A concern missing from the bundle leaves the local copy alone.
    /// Returns whether anything was replaced.
    pub fn apply_bundle(&mut self, bundle: &PreferencesBundle) -> bool {
        let mut applied = false;
        if let Some(favorites) = &bundle.favorites {
            self.favorites = favorites.clone();
            applied = true;
        }
        if let Some(tags) = &bundle.tags {
            self.tags = tags
                .iter()
                .filter(|(_, ids)| !ids.is_empty())
                .map(|(tag, ids)| (tag.clone(), ids.clone()))
                .collect();
            applied = true;
        }
        if !applied {
            tracing::debug!("Preferences bundle had no favorites or tags, keeping local cache");
        }
        applied
    }

    pub fn clear(&mut self, reason: &ClearReason) -> Result<(), ClearError> {
        reason.require_confirmed()?;
        self.favorites.clear();
        self.tags.clear();
        tracing::info!("Cleared favorites and tags ({})", reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NoteId {
        NoteId::from(s)
    }

    #[test]
    fn test_toggle_favorite() {
        let mut cache = ClientCache::new();
        assert!(cache.toggle_favorite(&id("n1")));
        assert!(cache.is_favorite(&id("n1")));
        assert!(!cache.toggle_favorite(&id("n1")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tagging() {
        let mut cache = ClientCache::new();
        assert!(cache.tag_note("villain", &id("n1")));
        assert!(!cache.tag_note("villain", &id("n1")));
        assert!(!cache.tag_note("  ", &id("n1")));
        cache.tag_note("draft", &id("n1"));

        assert_eq!(cache.tags_for(&id("n1")), vec!["draft", "villain"]);

        assert!(cache.untag_note("villain", &id("n1")));
        assert!(!cache.tags().contains_key("villain"));
        assert!(!cache.untag_note("villain", &id("n1")));
    }

    #[test]
    fn test_forget_note() {
        let mut cache = ClientCache::new();
        cache.toggle_favorite(&id("n1"));
        cache.tag_note("a", &id("n1"));
        cache.tag_note("a", &id("n2"));

        assert_eq!(cache.forget_note(&id("n1")), (true, true));
        assert!(!cache.is_favorite(&id("n1")));
        assert_eq!(cache.tags()["a"].len(), 1);

        assert_eq!(cache.forget_note(&id("n1")), (false, false));
        assert_eq!(cache.forget_note(&id("n2")), (false, true));
        assert!(cache.tags().is_empty());
    }

    #[test]
    fn test_missing_concern_keeps_local() {
        let mut cache = ClientCache::new();
        cache.toggle_favorite(&id("n1"));
        cache.tag_note("a", &id("n1"));

        let bundle = PreferencesBundle {
            tags: Some(BTreeMap::new()),
            ..Default::default()
        };
        assert!(cache.apply_bundle(&bundle));

        assert!(cache.is_favorite(&id("n1")));
        assert!(cache.tags().is_empty());
        assert!(!cache.apply_bundle(&PreferencesBundle::default()));
    }

    #[test]
    fn test_clear_requires_confirmation() {
        let mut cache = ClientCache::new();
        cache.toggle_favorite(&id("n1"));

        let before = cache.clone();
        assert!(cache.clear(&ClearReason::Unrecognized("oops".into())).is_err());
        assert_eq!(cache, before);

        cache.clear(&ClearReason::ConfirmedLogout).unwrap();
        assert!(cache.is_empty());
    }
}
