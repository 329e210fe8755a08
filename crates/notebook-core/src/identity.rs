//! Identity resolution with hysteresis.
//!
//! The identity provider is polled. A poll that suddenly reports nobody after
//! a signed-in poll is treated as ambiguous: the last known user is kept for a
//! grace window, and only if the window passes without recovery is the
//! context demoted to guest.

use crate::remote::RemoteContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

/// What the identity provider reports on one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub authenticated: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Identity {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id.into()),
        }
    }

    /// Authenticated with a usable user id.
    pub fn signed_in_user(&self) -> Option<&str> {
        if self.authenticated {
            self.user_id.as_deref().filter(|id| !id.is_empty())
        } else {
            None
        }
    }
}

#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn resolve_identity(&self) -> Identity;
}

#[async_trait]
impl<T: IdentitySource + ?Sized> IdentitySource for Arc<T> {
    async fn resolve_identity(&self) -> Identity {
        (**self).resolve_identity().await
    }
}

/// The context every remote call is made under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContext {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub is_ambiguous: bool,
    pub ambiguous_since: Option<u64>,
}

impl IdentityContext {
    pub fn guest() -> Self {
        Self::default()
    }

    fn signed_in(user_id: String) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id),
            is_ambiguous: false,
            ambiguous_since: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.remote_context().is_none()
    }

    /// Context token for remote calls, or `None` for guests.
    pub fn remote_context(&self) -> Option<RemoteContext> {
        if !self.authenticated {
            return None;
        }
        self.user_id.clone().map(RemoteContext::new)
    }
}

/// Turns raw identity polls into an `IdentityContext`.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    grace_ms: u64,
    last_user: Option<String>,
    ambiguous_since: Option<u64>,
}

impl IdentityResolver {
    pub fn new(grace_ms: u64) -> Self {
        Self {
            grace_ms,
            last_user: None,
            ambiguous_since: None,
        }
    }

    /// Fold one poll into the resolver's state.
    pub fn observe(&mut self, observed: &Identity, now_ms: u64) -> IdentityContext {
        if let Some(user) = observed.signed_in_user() {
            if self.ambiguous_since.take().is_some() {
                tracing::info!("Identity recovered for user {}", user);
            }
            if self.last_user.as_deref() != Some(user) {
                tracing::debug!("Identity resolved to user {}", user);
            }
            self.last_user = Some(user.to_string());
            return IdentityContext::signed_in(user.to_string());
        }

        let Some(user) = self.last_user.clone() else {
            return IdentityContext::guest();
        };

        let since = *self.ambiguous_since.get_or_insert_with(|| {
            tracing::warn!("Identity for user {} went missing, holding context", user);
            now_ms
        });

        if now_ms.saturating_sub(since) < self.grace_ms {
            return IdentityContext {
                authenticated: true,
                user_id: Some(user),
                is_ambiguous: true,
                ambiguous_since: Some(since),
            };
        }

        tracing::warn!(
            "Identity for user {} missing for {}ms, demoting to guest",
            user,
            now_ms.saturating_sub(since)
        );
        self.reset();
        IdentityContext::guest()
    }

    /// Forget the last user immediately (confirmed logout).
    pub fn confirm_logout(&mut self) {
        self.reset();
    }

    pub fn last_user(&self) -> Option<&str> {
        self.last_user.as_deref()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous_since.is_some()
    }

    fn reset(&mut self) {
        self.last_user = None;
        self.ambiguous_since = None;
    }
}

/// Identity source that reports whatever it was last set to.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    identity: RwLock<Identity>,
}

impl StaticIdentity {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: RwLock::new(identity),
        }
    }

    pub fn set(&self, identity: Identity) {
        *self.identity.write().unwrap_or_else(|e| e.into_inner()) = identity;
    }
}

#[async_trait]
impl IdentitySource for StaticIdentity {
    async fn resolve_identity(&self) -> Identity {
        self.identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Identity source that plays back a fixed sequence of polls.
///
/// Once the script runs out, the final entry repeats.
#[derive(Debug, Default)]
pub struct ScriptedIdentity {
    script: Mutex<VecDeque<Identity>>,
    last: Mutex<Identity>,
}

impl ScriptedIdentity {
    pub fn new(script: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(Identity::guest()),
        }
    }
}

#[async_trait]
impl IdentitySource for ScriptedIdentity {
    async fn resolve_identity(&self) -> Identity {
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(identity) = next {
            *last = identity;
        }
        last.clone()
    }
}
