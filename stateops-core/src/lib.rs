//! Selecting and removing entries from a persisted infrastructure state.
//!
//! A state is a tree of module instances, resources and resource instances
//! ([`state::StateTree`]). User-supplied address patterns ([`addrs`]) are
//! resolved by the [`filter`], removals are applied through the
//! [`sync::SyncState`] wrapper, and the result is committed through the
//! [`persist`] gate, which always backs up the prior state first.

pub mod addrs;
pub mod describe;
pub mod error;
pub mod filter;
pub mod handle;
pub mod local;
pub mod persist;
pub mod state;
pub mod sync;

pub use error::{CommitError, DocumentError, PatternSyntaxError, StateError};
pub use handle::StateHandle;
