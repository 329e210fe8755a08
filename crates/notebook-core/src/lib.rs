//! notebook-core: Hierarchical note collections kept in sync with a remote store.
//!
//! This crate provides:
//! - `CollectionTree`: a path-keyed tree of named, colored collections
//! - `MembershipReconciler`: derives collection membership from the note list
//! - `SyncLayer`: retrying, identity-aware load/save against a `RemoteStore`
//! - `reorder`: committing a drag-and-drop order back into a backing list
//!
//! All tree mutations are synchronous. Only the sync layer awaits.

pub mod cache;
pub mod clear;
pub mod clock;
pub mod collection;
pub mod config;
pub mod events;
pub mod identity;
pub mod membership;
pub mod note;
pub mod notebook;
pub mod remote;
pub mod reorder;
pub mod retry;
pub mod sync;
pub mod tree;

pub use cache::ClientCache;
pub use clear::{ClearError, ClearReason};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collection::{CollectionNode, CollectionSnapshot, MAX_DEPTH, ROOT_KEY};
pub use config::{Config, NotebookConfig, SyncConfig};
pub use events::{EventBus, NotebookEvent, Subscription};
pub use identity::{
    Identity, IdentityContext, IdentityResolver, IdentitySource, ScriptedIdentity, StaticIdentity,
};
pub use membership::{MembershipReconciler, RebuildReport};
pub use note::{Note, NoteId};
pub use notebook::{ApplyOutcome, EditSession, Notebook};
pub use remote::{
    InMemoryRemote, PreferencesBundle, RemoteContext, RemoteError, RemoteOp, RemoteStore,
};
pub use retry::{Backoff, RetryFailure, RetryPolicy};
pub use sync::{SyncError, SyncLayer, SyncOutcome, abortable};
pub use tree::{
    CollectionTree, DeleteImpact, DeleteReport, RenameReport, ReplaceReport, TreeError,
};
