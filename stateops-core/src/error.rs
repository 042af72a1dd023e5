//! Error types of the state core.
//!
//! Errors fall in three groups: a malformed address ([`PatternSyntaxError`]),
//! a state that could not be obtained ([`StateError`]), and a mutated state
//! that could not be committed ([`CommitError`]).

use std::io;
use std::path::PathBuf;

/// An address pattern could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error parsing address {pattern:?}: {reason}")]
pub struct PatternSyntaxError {
    pub pattern: String,
    pub reason: String,
}

impl PatternSyntaxError {
    pub fn new(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        PatternSyntaxError {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Problems with the contents of a state document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("could not read state document")]
    Io(#[from] io::Error),

    #[error("state document is not valid")]
    Json(#[from] serde_json::Error),

    #[error("state document contains an invalid module address")]
    ModuleAddress(#[from] PatternSyntaxError),
}

/// The state could not be obtained from its backing store.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Error loading the state from {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to refresh state from {}", path.display())]
    Refresh {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("No state file was found!")]
    NotFound,
}

/// A mutated state could not be committed. In both cases the persisted state
/// is unchanged and no backup remains.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("state cannot be serialized: {0}")]
    Serialization(String),

    #[error("failed to persist state")]
    Persist(#[source] io::Error),
}

impl From<serde_json::Error> for CommitError {
    fn from(e: serde_json::Error) -> Self {
        CommitError::Serialization(e.to_string())
    }
}
