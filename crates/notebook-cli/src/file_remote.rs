//! Remote store backed by JSON files on disk.
//!
//! Layout under the base directory, one subdirectory per user:
//!
//! ```text
//! <base>/<user>/collections.json
//! <base>/<user>/notes.json
//! <base>/<user>/preferences.json
//! ```
//!
//! Missing files read as empty. Writes go to a temp file and are renamed into
//! place so a crash never leaves a half-written document.

use async_trait::async_trait;
use notebook_core::remote::Result;
use notebook_core::{
    CollectionSnapshot, Note, NoteId, PreferencesBundle, RemoteContext, RemoteError, RemoteStore,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const COLLECTIONS_FILE: &str = "collections.json";
pub const NOTES_FILE: &str = "notes.json";
pub const PREFERENCES_FILE: &str = "preferences.json";

pub struct FileRemote {
    base_path: PathBuf,
}

impl FileRemote {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn user_dir(&self, ctx: &RemoteContext) -> Result<PathBuf> {
        let user = ctx.user_id.as_str();
        let safe = !user.is_empty()
            && user != "."
            && user != ".."
            && !user.contains(['/', '\\']);
        if !safe {
            return Err(RemoteError::Rejected {
                status: 400,
                message: format!("invalid user id '{}'", user),
            });
        }
        Ok(self.base_path.join(user))
    }

    async fn read<T: DeserializeOwned + Default>(&self, ctx: &RemoteContext, file: &str) -> Result<T> {
        let path = self.user_dir(ctx)?.join(file);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(RemoteError::Network(format!("{}: {}", path.display(), e))),
        };

        if contents.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&contents).map_err(|e| RemoteError::Rejected {
            status: 422,
            message: format!("{}: {}", path.display(), e),
        })
    }

    async fn write<T: Serialize + ?Sized>(
        &self,
        ctx: &RemoteContext,
        file: &str,
        value: &T,
    ) -> Result<()> {
        let dir = self.user_dir(ctx)?;
        let path = dir.join(file);
        let tmp = dir.join(format!(".{}.tmp", file));

        let contents = serde_json::to_string_pretty(value).map_err(|e| RemoteError::Rejected {
            status: 500,
            message: e.to_string(),
        })?;

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        fs::write(&tmp, contents)
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        tracing::debug!("Wrote {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FileRemote {
    async fn load_collections(&self, ctx: &RemoteContext) -> Result<Vec<CollectionSnapshot>> {
        self.read(ctx, COLLECTIONS_FILE).await
    }

    async fn save_collections(
        &self,
        ctx: &RemoteContext,
        collections: &[CollectionSnapshot],
    ) -> Result<()> {
        self.write(ctx, COLLECTIONS_FILE, collections).await
    }

    async fn load_notes(&self, ctx: &RemoteContext) -> Result<Vec<Note>> {
        self.read(ctx, NOTES_FILE).await
    }

    async fn save_note(&self, ctx: &RemoteContext, note: &Note) -> Result<Note> {
        let mut notes: Vec<Note> = self.read(ctx, NOTES_FILE).await?;
        match notes.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => *existing = note.clone(),
            None => notes.push(note.clone()),
        }
        self.write(ctx, NOTES_FILE, &notes).await?;
        Ok(note.clone())
    }

    async fn delete_note(&self, ctx: &RemoteContext, id: &NoteId) -> Result<()> {
        let mut notes: Vec<Note> = self.read(ctx, NOTES_FILE).await?;
        let before = notes.len();
        notes.retain(|n| &n.id != id);
        if notes.len() != before {
            self.write(ctx, NOTES_FILE, &notes).await?;
        }
        Ok(())
    }

    async fn get_preferences(&self, ctx: &RemoteContext) -> Result<PreferencesBundle> {
        self.read(ctx, PREFERENCES_FILE).await
    }

    async fn save_preferences(
        &self,
        ctx: &RemoteContext,
        bundle: &PreferencesBundle,
    ) -> Result<()> {
        self.write(ctx, PREFERENCES_FILE, bundle).await
    }
}
