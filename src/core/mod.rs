//! Core types shared across the crate: the error taxonomy and session ids.

pub mod error;

pub use error::{Error, Result};

use std::fmt;

use uuid::Uuid;

/// Identifier of one top-level load invocation (or one live loader
/// instance).
///
/// A session owns a cycle graph and a set of touched cache entries; both are
/// torn down when the session completes, whether it succeeded or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
