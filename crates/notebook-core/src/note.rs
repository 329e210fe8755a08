//! Notes and their identifiers.
//!
//! A note belongs to exactly one collection, recorded in `Note::collection`.
//! Collection membership lists are derived from this field, never the reverse.

use crate::clock::now_millis;
use crate::collection::ROOT_KEY;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoteIdError {
    #[error("Note ID cannot be empty")]
    Empty,
}

/// Opaque note identifier.
///
/// New notes get a random UUID; identifiers loaded from the remote store are
/// kept verbatim whatever their format.
///
/// # Examples
/// ```
/// use notebook_core::NoteId;
///
/// let id: NoteId = "n1".parse().unwrap();
/// assert_eq!(id.to_string(), "n1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Generate a new random note ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NoteId {
    type Err = NoteIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(NoteIdError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for NoteId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A note as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub name: String,
    #[serde(default)]
    pub content: String,
    /// Key of the owning collection. Missing on the wire means the root.
    #[serde(default = "root_key")]
    pub collection: String,
    /// Creation time (ms since epoch)
    #[serde(default)]
    pub created: u64,
    /// Last modification time (ms since epoch)
    #[serde(default)]
    pub last_modified: u64,
}

fn root_key() -> String {
    ROOT_KEY.to_string()
}

impl Note {
    /// Create a new note with a fresh ID in the given collection.
    pub fn new(name: &str, content: &str, collection: &str) -> Self {
        let now = now_millis();
        Self {
            id: NoteId::generate(),
            name: name.to_string(),
            content: content.to_string(),
            collection: collection.to_string(),
            created: now,
            last_modified: now,
        }
    }

    /// Same as `new` but with a caller-chosen ID.
    pub fn with_id(id: impl Into<NoteId>, name: &str, collection: &str) -> Self {
        let mut note = Self::new(name, "", collection);
        note.id = id.into();
        note
    }
}
