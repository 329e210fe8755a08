//! Remote store boundary.
//!
//! `RemoteStore` is the contract with the persistence service. Collections are
//! saved by full replacement; notes one at a time; preferences as a single
//! bundle that several concerns share.
//!
//! `InMemoryRemote` implements the contract for tests and embedding, with
//! failure injection and call counters.

use crate::collection::CollectionSnapshot;
use crate::note::{Note, NoteId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Token identifying whose data a remote call touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteContext {
    pub user_id: String,
}

impl RemoteContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl Display for RemoteContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Request aborted")]
    Aborted,
}

impl RemoteError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Network(_) | RemoteError::Timeout | RemoteError::Rejected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// The shared preferences document.
///
/// Keys this crate does not manage are carried in `extra` so that a
/// read-merge-write round trip never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorites: Option<BTreeSet<NoteId>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, BTreeSet<NoteId>>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn load_collections(&self, ctx: &RemoteContext) -> Result<Vec<CollectionSnapshot>>;

    /// Replace the whole collection set.
    async fn save_collections(
        &self,
        ctx: &RemoteContext,
        collections: &[CollectionSnapshot],
    ) -> Result<()>;

    async fn load_notes(&self, ctx: &RemoteContext) -> Result<Vec<Note>>;

    /// Insert or replace a note. Returns the note as stored.
    async fn save_note(&self, ctx: &RemoteContext, note: &Note) -> Result<Note>;

    async fn delete_note(&self, ctx: &RemoteContext, id: &NoteId) -> Result<()>;

    async fn get_preferences(&self, ctx: &RemoteContext) -> Result<PreferencesBundle>;

    async fn save_preferences(&self, ctx: &RemoteContext, bundle: &PreferencesBundle)
        -> Result<()>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn load_collections(&self, ctx: &RemoteContext) -> Result<Vec<CollectionSnapshot>> {
        (**self).load_collections(ctx).await
    }

    async fn save_collections(
        &self,
        ctx: &RemoteContext,
        collections: &[CollectionSnapshot],
    ) -> Result<()> {
        (**self).save_collections(ctx, collections).await
    }

    async fn load_notes(&self, ctx: &RemoteContext) -> Result<Vec<Note>> {
        (**self).load_notes(ctx).await
    }

    async fn save_note(&self, ctx: &RemoteContext, note: &Note) -> Result<Note> {
        (**self).save_note(ctx, note).await
    }

    async fn delete_note(&self, ctx: &RemoteContext, id: &NoteId) -> Result<()> {
        (**self).delete_note(ctx, id).await
    }

    async fn get_preferences(&self, ctx: &RemoteContext) -> Result<PreferencesBundle> {
        (**self).get_preferences(ctx).await
    }

    async fn save_preferences(
        &self,
        ctx: &RemoteContext,
        bundle: &PreferencesBundle,
    ) -> Result<()> {
        (**self).save_preferences(ctx, bundle).await
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Clone, Default)]
struct UserData {
    collections: Vec<CollectionSnapshot>,
    notes: Vec<Note>,
    preferences: PreferencesBundle,
}

/// Remote operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    LoadCollections,
    SaveCollections,
    LoadNotes,
    SaveNote,
    DeleteNote,
    GetPreferences,
    SavePreferences,
}

/// A `RemoteStore` held in memory, keyed by user.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    users: RwLock<HashMap<String, UserData>>,
    failures: Mutex<VecDeque<(Option<RemoteOp>, RemoteError)>>,
    latency: RwLock<Option<Duration>>,
    calls: Mutex<HashMap<RemoteOp, usize>>,
    total_calls: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of any kind with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.push_failure(None, error);
    }

    /// Fail the next `count` calls of any kind with `error`.
    pub fn fail_next_n(&self, count: usize, error: RemoteError) {
        for _ in 0..count {
            self.push_failure(None, error.clone());
        }
    }

    /// Fail the next call of `op` with `error`. Other calls are unaffected.
    pub fn fail_next_op(&self, op: RemoteOp, error: RemoteError) {
        self.push_failure(Some(op), error);
    }

    fn push_failure(&self, op: Option<RemoteOp>, error: RemoteError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back((op, error));
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    pub fn calls(&self, op: RemoteOp) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn seed_collections(&self, user_id: &str, collections: Vec<CollectionSnapshot>) {
        self.with_user(user_id, |data| data.collections = collections);
    }

    pub fn seed_notes(&self, user_id: &str, notes: Vec<Note>) {
        self.with_user(user_id, |data| data.notes = notes);
    }

    pub fn seed_preferences(&self, user_id: &str, preferences: PreferencesBundle) {
        self.with_user(user_id, |data| data.preferences = preferences);
    }

    pub fn stored_collections(&self, user_id: &str) -> Vec<CollectionSnapshot> {
        self.read_user(user_id, |data| data.collections.clone())
    }

    pub fn stored_notes(&self, user_id: &str) -> Vec<Note> {
        self.read_user(user_id, |data| data.notes.clone())
    }

    pub fn stored_preferences(&self, user_id: &str) -> PreferencesBundle {
        self.read_user(user_id, |data| data.preferences.clone())
    }

    fn with_user<T>(&self, user_id: &str, f: impl FnOnce(&mut UserData) -> T) -> T {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        f(users.entry(user_id.to_string()).or_default())
    }

    fn read_user<T: Default>(&self, user_id: &str, f: impl FnOnce(&UserData) -> T) -> T {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.get(user_id).map(f).unwrap_or_default()
    }

    /// Count the call, wait out any latency, then consume a matching injected failure.
    async fn begin(&self, op: RemoteOp) -> Result<()> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(op)
            .or_default() += 1;

        let latency = *self.latency.read().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let position = failures
            .iter()
            .position(|(target, _)| target.is_none_or(|t| t == op));
        match position.and_then(|i| failures.remove(i)) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn load_collections(&self, ctx: &RemoteContext) -> Result<Vec<CollectionSnapshot>> {
        self.begin(RemoteOp::LoadCollections).await?;
        Ok(self.stored_collections(&ctx.user_id))
    }

    async fn save_collections(
        &self,
        ctx: &RemoteContext,
        collections: &[CollectionSnapshot],
    ) -> Result<()> {
        self.begin(RemoteOp::SaveCollections).await?;
        self.with_user(&ctx.user_id, |data| data.collections = collections.to_vec());
        Ok(())
    }

    async fn load_notes(&self, ctx: &RemoteContext) -> Result<Vec<Note>> {
        self.begin(RemoteOp::LoadNotes).await?;
        Ok(self.stored_notes(&ctx.user_id))
    }

    async fn save_note(&self, ctx: &RemoteContext, note: &Note) -> Result<Note> {
        self.begin(RemoteOp::SaveNote).await?;
        let stored = note.clone();
        self.with_user(&ctx.user_id, |data| {
            match data.notes.iter_mut().find(|n| n.id == stored.id) {
                Some(existing) => *existing = stored.clone(),
                None => data.notes.push(stored.clone()),
            }
        });
        Ok(stored)
    }

    async fn delete_note(&self, ctx: &RemoteContext, id: &NoteId) -> Result<()> {
        self.begin(RemoteOp::DeleteNote).await?;
        self.with_user(&ctx.user_id, |data| data.notes.retain(|n| &n.id != id));
        Ok(())
    }

    async fn get_preferences(&self, ctx: &RemoteContext) -> Result<PreferencesBundle> {
        self.begin(RemoteOp::GetPreferences).await?;
        Ok(self.stored_preferences(&ctx.user_id))
    }

    async fn save_preferences(
        &self,
        ctx: &RemoteContext,
        bundle: &PreferencesBundle,
    ) -> Result<()> {
        self.begin(RemoteOp::SavePreferences).await?;
        self.with_user(&ctx.user_id, |data| data.preferences = bundle.clone());
        Ok(())
    }
}
