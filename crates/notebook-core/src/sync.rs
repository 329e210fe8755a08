//! Resilient sync between local state and a `RemoteStore`.
//!
//! Every call resolves identity first (with hysteresis), is skipped for
//! guests, and is retried with backoff on transient failures. Failures never
//! touch local state: they are returned to the caller and published on the
//! event bus.

use crate::cache::ClientCache;
use crate::clock::{Clock, SystemClock};
use crate::collection::CollectionSnapshot;
use crate::config::SyncConfig;
use crate::events::{EventBus, NotebookEvent};
use crate::identity::{IdentityContext, IdentityResolver, IdentitySource};
use crate::note::{Note, NoteId};
use crate::notebook::{ApplyOutcome, Notebook};
use crate::remote::{PreferencesBundle, RemoteContext, RemoteError, RemoteStore};
use crate::retry::{RetryFailure, RetryPolicy, with_retry};
use futures::future::{AbortHandle, Aborted};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Remote store reports the session is not authenticated")]
    Unauthenticated,

    #[error("{operation} failed after {attempts} attempt(s): {message}")]
    NetworkFailure {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("{operation} rejected by server ({status}): {message}")]
    ServerRejected {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{0} was aborted")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<RetryFailure> for SyncError {
    fn from(failure: RetryFailure) -> Self {
        let RetryFailure {
            operation,
            attempts,
            error,
        } = failure;
        match error {
            RemoteError::Network(message) => SyncError::NetworkFailure {
                operation,
                attempts,
                message,
            },
            RemoteError::Timeout => SyncError::NetworkFailure {
                operation,
                attempts,
                message: "request timed out".to_string(),
            },
            RemoteError::Rejected { status, message } => SyncError::ServerRejected {
                operation,
                status,
                message,
            },
            RemoteError::Unauthenticated => SyncError::Unauthenticated,
            RemoteError::Aborted => SyncError::Aborted(operation),
        }
    }
}

/// Result of a sync call that may legitimately not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome<T> {
    Synced(T),
    /// Guest context; nothing was sent
    Skipped,
}

impl<T> SyncOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped)
    }

    pub fn synced(self) -> Option<T> {
        match self {
            SyncOutcome::Synced(value) => Some(value),
            SyncOutcome::Skipped => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SyncOutcome<U> {
        match self {
            SyncOutcome::Synced(value) => SyncOutcome::Synced(f(value)),
            SyncOutcome::Skipped => SyncOutcome::Skipped,
        }
    }
}

pub struct SyncLayer<R, S> {
    remote: R,
    identity: S,
    resolver: Mutex<IdentityResolver>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    events: Arc<EventBus>,
}

impl<R: RemoteStore, S: IdentitySource> SyncLayer<R, S> {
    pub fn new(remote: R, identity: S, config: &SyncConfig) -> Self {
        Self {
            remote,
            identity,
            resolver: Mutex::new(IdentityResolver::new(config.identity_grace_ms)),
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::from_config(config),
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    // ========== Identity ==========

    /// Poll the identity source and fold the answer through the resolver.
    pub async fn context(&self) -> IdentityContext {
        let observed = self.identity.resolve_identity().await;
        let now = self.clock.now_ms();
        self.resolver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .observe(&observed, now)
    }

    /// Drop the remembered user without waiting out the grace window.
    pub fn confirm_logout(&self) {
        self.resolver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .confirm_logout();
    }

    /// Remote context for `operation`, or `None` (and a skip event) for guests.
    async fn remote_context(&self, operation: &str) -> Option<RemoteContext> {
        let ctx = self.context().await;
        match ctx.remote_context() {
            Some(remote) => {
                if ctx.is_ambiguous {
                    debug!(operation, user = %remote, "Using held identity during grace window");
                }
                Some(remote)
            }
            None => {
                debug!(operation, "Guest context, skipping remote call");
                self.events.emit(NotebookEvent::SyncSkipped {
                    operation: operation.to_string(),
                });
                None
            }
        }
    }

    // ========== Retry plumbing ==========

    /// Run one remote call under the retry policy, reporting a final failure.
    async fn attempt<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        match with_retry(&self.policy, operation, call).await {
            Ok(value) => Ok(value),
            Err(failure) => {
                let err = SyncError::from(failure);
                self.report_failure(operation, &err);
                Err(err)
            }
        }
    }

    fn report_failure(&self, operation: &str, err: &SyncError) {
        match err {
            SyncError::Aborted(_) => debug!(operation, "Remote call aborted"),
            _ => error!(operation, error = %err, "Remote call failed, keeping local state"),
        }
        self.events.emit(NotebookEvent::SyncFailed {
            operation: operation.to_string(),
            error: err.to_string(),
        });
    }

    fn succeeded(&self, operation: &str) {
        debug!(operation, "Remote call succeeded");
        self.events.emit(NotebookEvent::Synced {
            operation: operation.to_string(),
        });
    }

    /// Resolve the context then run `call` with retries.
    async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<SyncOutcome<T>>
    where
        F: FnMut(RemoteContext) -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        let Some(ctx) = self.remote_context(operation).await else {
            return Ok(SyncOutcome::Skipped);
        };
        let value = self.attempt(operation, || call(ctx.clone())).await?;
        self.succeeded(operation);
        Ok(SyncOutcome::Synced(value))
    }

    // ========== Collections ==========

    pub async fn fetch_collections(&self) -> Result<SyncOutcome<Vec<CollectionSnapshot>>> {
        self.run("load_collections", |ctx| async move {
            self.remote.load_collections(&ctx).await
        })
        .await
    }

    /// Save the full collection set.
    pub async fn push_collections(
        &self,
        snapshots: &[CollectionSnapshot],
    ) -> Result<SyncOutcome<()>> {
        self.run("save_collections", |ctx| async move {
            self.remote.save_collections(&ctx, snapshots).await
        })
        .await
    }

    /// Save the notebook's current tree. Later mutations are picked up by later pushes.
    pub async fn push_notebook(&self, notebook: &Notebook) -> Result<SyncOutcome<()>> {
        let snapshots = notebook.snapshot();
        self.push_collections(&snapshots).await
    }

    /// Load collections into `notebook`. On failure the notebook is untouched.
    pub async fn pull_collections(
        &self,
        notebook: &mut Notebook,
    ) -> Result<SyncOutcome<ApplyOutcome>> {
        let fetched = self.fetch_collections().await?;
        Ok(fetched.map(|snapshots| notebook.apply_remote_collections(&snapshots)))
    }

    // ========== Notes ==========

    pub async fn fetch_notes(&self) -> Result<SyncOutcome<Vec<Note>>> {
        self.run("load_notes", |ctx| async move {
            self.remote.load_notes(&ctx).await
        })
        .await
    }

    /// Load notes into `notebook`. On failure the notebook is untouched.
    pub async fn pull_notes(&self, notebook: &mut Notebook) -> Result<SyncOutcome<ApplyOutcome>> {
        let fetched = self.fetch_notes().await?;
        Ok(fetched.map(|notes| notebook.apply_remote_notes(notes)))
    }

    pub async fn save_note(&self, note: &Note) -> Result<SyncOutcome<Note>> {
        self.run("save_note", |ctx| async move {
            self.remote.save_note(&ctx, note).await
        })
        .await
    }

    pub async fn delete_note(&self, id: &NoteId) -> Result<SyncOutcome<()>> {
        self.run("delete_note", |ctx| async move {
            self.remote.delete_note(&ctx, id).await
        })
        .await
    }

    // ========== Preferences ==========

    pub async fn fetch_preferences(&self) -> Result<SyncOutcome<PreferencesBundle>> {
        self.run("get_preferences", |ctx| async move {
            self.remote.get_preferences(&ctx).await
        })
        .await
    }

    /// Load favorites and tags into `cache`. On failure the cache is untouched.
    pub async fn pull_preferences(&self, cache: &mut ClientCache) -> Result<SyncOutcome<bool>> {
        let fetched = self.fetch_preferences().await?;
        Ok(fetched.map(|bundle| cache.apply_bundle(&bundle)))
    }

    /// Fetch the bundle, let `merge` change one concern, write it back.
    ///
    /// If the fetch fails nothing is written, so other concerns stored in the
    /// bundle are never overwritten with defaults.
    async fn merge_preferences(
        &self,
        operation: &str,
        merge: impl FnOnce(&mut PreferencesBundle),
    ) -> Result<SyncOutcome<()>> {
        let Some(ctx) = self.remote_context(operation).await else {
            return Ok(SyncOutcome::Skipped);
        };

        let ctx = &ctx;
        let mut bundle = self
            .attempt(operation, || async move {
                self.remote.get_preferences(ctx).await
            })
            .await?;

        merge(&mut bundle);

        let bundle = &bundle;
        self.attempt(operation, || async move {
            self.remote.save_preferences(ctx, bundle).await
        })
        .await?;

        self.succeeded(operation);
        Ok(SyncOutcome::Synced(()))
    }

    pub async fn save_favorites(&self, favorites: &BTreeSet<NoteId>) -> Result<SyncOutcome<()>> {
        let favorites = favorites.clone();
        self.merge_preferences("save_favorites", move |bundle| {
            bundle.favorites = Some(favorites);
        })
        .await
    }

    pub async fn save_tags(
        &self,
        tags: &BTreeMap<String, BTreeSet<NoteId>>,
    ) -> Result<SyncOutcome<()>> {
        let tags = tags.clone();
        self.merge_preferences("save_tags", move |bundle| {
            bundle.tags = Some(tags);
        })
        .await
    }

    // ========== Whole-state ==========

    /// Load collections, then notes, then preferences.
    ///
    /// Stops at the first failure; whatever was already applied stays applied.
    pub async fn pull_all(
        &self,
        notebook: &mut Notebook,
        cache: &mut ClientCache,
    ) -> Result<SyncOutcome<()>> {
        if self.pull_collections(notebook).await?.is_skipped() {
            return Ok(SyncOutcome::Skipped);
        }
        self.pull_notes(notebook).await?;
        self.pull_preferences(cache).await?;
        info!(
            collections = notebook.tree().len() - 1,
            notes = notebook.notes().len(),
            "Pulled notebook from remote"
        );
        Ok(SyncOutcome::Synced(()))
    }
}

/// Wrap a sync future so the caller can cancel it.
///
/// Aborting resolves the future to `SyncError::Aborted`.
pub fn abortable<T, F>(
    operation: &str,
    fut: F,
) -> (impl Future<Output = Result<T>> + use<T, F>, AbortHandle)
where
    F: Future<Output = Result<T>>,
{
    let (fut, handle) = futures::future::abortable(fut);
    let operation = operation.to_string();
    let wrapped = async move {
        match fut.await {
            Ok(result) => result,
            Err(Aborted) => {
                debug!(operation = %operation, "Sync call aborted by caller");
                Err(SyncError::Aborted(operation))
            }
        }
    };
    (wrapped, handle)
}
