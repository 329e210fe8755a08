//! Reasons for wiping local state.
//!
//! Local data is only ever destroyed on an explicit, recognised signal. A
//! failed request or an empty response is never one of them.

use std::convert::Infallible;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearReason {
    /// The user signed out and the identity provider confirmed it
    ConfirmedLogout,
    /// A different user signed in on this client
    AccountSwitched,
    /// Anything else. Always rejected.
    Unrecognized(String),
}

impl ClearReason {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ClearReason::ConfirmedLogout | ClearReason::AccountSwitched)
    }

    /// Ok for confirmed reasons, `ClearError::Unconfirmed` otherwise.
    pub fn require_confirmed(&self) -> Result<(), ClearError> {
        if self.is_confirmed() {
            Ok(())
        } else {
            tracing::warn!("Rejected clear request with reason '{}'", self);
            Err(ClearError::Unconfirmed(self.to_string()))
        }
    }
}

impl Display for ClearReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ClearReason::ConfirmedLogout => f.write_str("confirmed-logout"),
            ClearReason::AccountSwitched => f.write_str("account-switched"),
            ClearReason::Unrecognized(reason) => f.write_str(reason),
        }
    }
}

impl FromStr for ClearReason {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "confirmed-logout" => ClearReason::ConfirmedLogout,
            "account-switched" => ClearReason::AccountSwitched,
            other => ClearReason::Unrecognized(other.to_string()),
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClearError {
    #[error("Refusing to clear local state: '{0}' is not a confirmed reason")]
    Unconfirmed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reasons() {
        assert_eq!(
            "confirmed-logout".parse::<ClearReason>().unwrap(),
            ClearReason::ConfirmedLogout
        );
        assert_eq!(
            "account-switched".parse::<ClearReason>().unwrap(),
            ClearReason::AccountSwitched
        );
        assert_eq!(
            "load-failed".parse::<ClearReason>().unwrap(),
            ClearReason::Unrecognized("load-failed".into())
        );
    }

    #[test]
    fn test_only_confirmed_reasons_pass() {
        assert!(ClearReason::ConfirmedLogout.require_confirmed().is_ok());
        assert!(ClearReason::AccountSwitched.require_confirmed().is_ok());
        assert_eq!(
            ClearReason::Unrecognized(String::new()).require_confirmed(),
            Err(ClearError::Unconfirmed(String::new()))
        );
    }
}
