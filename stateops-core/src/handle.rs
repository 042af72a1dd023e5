use crate::error::{CommitError, StateError};
use crate::state::StateTree;

/// Access to the latest persisted state and the means to commit changes to
/// it.
///
/// Callers are expected to hold whatever lock guards the backing store for as
/// long as they use the handle.
pub trait StateHandle {
    /// Reload the persisted state, discarding in-memory changes.
    fn refresh_state(&mut self) -> Result<(), StateError>;

    /// The state as of the last refresh or commit; `None` if nothing has
    /// been persisted yet.
    fn state(&self) -> Option<&StateTree>;

    fn state_mut(&mut self) -> Option<&mut StateTree>;

    /// Persist the current in-memory state, backing up the prior one.
    fn commit(&mut self) -> Result<(), CommitError>;
}
