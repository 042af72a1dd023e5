//! Committing a mutated state: stage, then back up the prior state and write
//! the new one.
//!
//! Staging only serializes and validates, so a state that cannot be written
//! never reaches storage. Persisting stages the backup, writes the primary
//! copy, and only then moves the backup into place. A failed primary write
//! drops the staged backup, so a failed commit leaves storage as it was,
//! including any file already at the backup location.

use std::io;

use tracing::{debug, info, warn, Level};

use crate::error::CommitError;
use crate::state::file::StateFile;
use crate::state::StateTree;

/// Storage for a persisted state and its backups.
pub trait PersistenceBackend {
    /// The currently persisted document, if any.
    fn read_persisted(&self) -> io::Result<Option<Vec<u8>>>;

    /// Stage a copy of the prior document. It must not replace anything at
    /// the backup location until `keep_backup`.
    fn write_backup(&mut self, prior: &[u8]) -> io::Result<()>;

    /// Move the staged backup to the backup location.
    fn keep_backup(&mut self) -> io::Result<()>;

    /// Drop the staged backup.
    fn discard_backup(&mut self) -> io::Result<()>;

    /// Replace the persisted document.
    fn write_primary(&mut self, document: &[u8]) -> io::Result<()>;
}

/// A serialized state that passed validation and is ready to be persisted.
#[derive(Debug)]
pub struct Staged {
    document: StateFile,
    bytes: Vec<u8>,
}

impl Staged {
    pub fn stage(tree: &StateTree) -> Result<Staged, CommitError> {
        tree.check_invariants()
            .map_err(CommitError::Serialization)?;
        let document = StateFile::from_tree(tree, tree.serial() + 1);
        let mut bytes = serde_json::to_vec_pretty(&document)?;
        bytes.push(b'\n');
        Ok(Staged { document, bytes })
    }

    pub fn serial(&self) -> u64 {
        self.document.serial
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Back up the prior document (when there is one) and write this one.
    pub fn persist<B: PersistenceBackend + ?Sized>(&self, backend: &mut B) -> Result<(), CommitError> {
        let prior = backend.read_persisted().map_err(CommitError::Persist)?;

        if let Some(prior) = &prior {
            log_changes(prior, &self.document);
            backend.write_backup(prior).map_err(CommitError::Persist)?;
        }

        if let Err(e) = backend.write_primary(&self.bytes) {
            if prior.is_some() {
                if let Err(discard) = backend.discard_backup() {
                    warn!("Could not remove backup after failed write: {}", discard);
                }
            }
            return Err(CommitError::Persist(e));
        }

        if prior.is_some() {
            // The new state is already durable
            if let Err(e) = backend.keep_backup() {
                warn!("State written, but the backup could not be moved into place: {}", e);
            }
        }

        info!(serial = self.document.serial, "state persisted");
        Ok(())
    }
}

fn log_changes(prior: &[u8], next: &StateFile) {
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }
    match change_count(prior, next) {
        Ok(operations) => debug!(operations, "staged state changes"),
        Err(e) => debug!("could not compute state changes: {}", e),
    }
}

/// Number of JSON Patch operations turning `prior` into `next`.
fn change_count(prior: &[u8], next: &StateFile) -> serde_json::Result<usize> {
    let prior = serde_json::from_slice::<serde_json::Value>(prior)?;
    let next = serde_json::to_value(next)?;
    Ok(json_patch::diff(&prior, &next).0.len())
}

/// Stage `tree` and persist it through `backend`. On success the tree takes
/// the serial of the written document.
pub fn commit<B: PersistenceBackend + ?Sized>(
    backend: &mut B,
    tree: &mut StateTree,
) -> Result<(), CommitError> {
    let staged = Staged::stage(tree)?;
    staged.persist(backend)?;
    tree.serial = staged.serial();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{InstanceKey, ModuleInstance, Resource};
    use crate::state::InstanceRecord;
    use serde_json::json;

    #[derive(Default)]
    struct MemoryBackend {
        primary: Option<Vec<u8>>,
        staged_backup: Option<Vec<u8>>,
        backups: Vec<Vec<u8>>,
        fail_backup: bool,
        fail_primary: bool,
    }

    impl PersistenceBackend for MemoryBackend {
        fn read_persisted(&self) -> io::Result<Option<Vec<u8>>> {
            Ok(self.primary.clone())
        }

        fn write_backup(&mut self, prior: &[u8]) -> io::Result<()> {
            if self.fail_backup {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "backup"));
            }
            self.staged_backup = Some(prior.to_vec());
            Ok(())
        }

        fn keep_backup(&mut self) -> io::Result<()> {
            self.backups.extend(self.staged_backup.take());
            Ok(())
        }

        fn discard_backup(&mut self) -> io::Result<()> {
            self.staged_backup = None;
            Ok(())
        }

        fn write_primary(&mut self, document: &[u8]) -> io::Result<()> {
            if self.fail_primary {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.primary = Some(document.to_vec());
            Ok(())
        }
    }

    fn tree() -> StateTree {
        let mut tree = StateTree::new();
        tree.set_resource_instance(
            &ModuleInstance::root()
                .resource(Resource::managed("aws_instance", "web"))
                .instance(InstanceKey::Int(0)),
            InstanceRecord::new(json!({"id": "i-0"})),
        );
        tree
    }

    #[test]
    fn first_commit_writes_without_backup() {
        let mut backend = MemoryBackend::default();
        let mut tree = tree();
        commit(&mut backend, &mut tree).unwrap();
        assert!(backend.backups.is_empty());
        assert_eq!(tree.serial(), 1);
        let written = StateFile::from_slice(backend.primary.as_deref().unwrap())
            .unwrap()
            .into_tree()
            .unwrap();
        assert_eq!(written, tree);
    }

    #[test]
    fn commit_backs_up_prior_state() {
        let mut backend = MemoryBackend::default();
        let mut tree = tree();
        commit(&mut backend, &mut tree).unwrap();
        let prior = backend.primary.clone().unwrap();

        tree.sync_wrapper().remove_module(&ModuleInstance::root());
        commit(&mut backend, &mut tree).unwrap();

        assert_eq!(backend.backups, vec![prior]);
        assert_eq!(tree.serial(), 2);
    }

    #[test]
    fn failed_backup_leaves_primary_untouched() {
        let mut backend = MemoryBackend::default();
        let mut tree = tree();
        commit(&mut backend, &mut tree).unwrap();
        let prior = backend.primary.clone();

        backend.fail_backup = true;
        tree.sync_wrapper().remove_module(&ModuleInstance::root());
        let err = commit(&mut backend, &mut tree).unwrap_err();
        assert!(matches!(err, CommitError::Persist(_)));
        assert_eq!(backend.primary, prior);
        assert_eq!(tree.serial(), 1);
    }

    #[test]
    fn failed_primary_write_discards_backup() {
        let mut backend = MemoryBackend::default();
        let mut tree = tree();
        commit(&mut backend, &mut tree).unwrap();
        let prior = backend.primary.clone();

        backend.fail_primary = true;
        let err = commit(&mut backend, &mut tree).unwrap_err();
        assert!(matches!(err, CommitError::Persist(_)));
        assert!(backend.backups.is_empty());
        assert!(backend.staged_backup.is_none());
        assert_eq!(backend.primary, prior);
    }

    #[test]
    fn counts_changes_between_documents() {
        let mut tree = tree();
        let prior = serde_json::to_vec(&StateFile::from_tree(&tree, 1)).unwrap();
        assert_eq!(change_count(&prior, &StateFile::from_tree(&tree, 1)).unwrap(), 0);

        tree.sync_wrapper().remove_module(&ModuleInstance::root());
        assert!(change_count(&prior, &StateFile::from_tree(&tree, 2)).unwrap() > 0);
        assert!(change_count(b"not json", &StateFile::from_tree(&tree, 2)).is_err());
    }

    #[test]
    fn invalid_tree_is_rejected_before_storage() {
        let mut backend = MemoryBackend::default();
        let mut tree = tree();
        tree.root
            .resources
            .values_mut()
            .for_each(|r| r.instances.clear());

        let err = commit(&mut backend, &mut tree).unwrap_err();
        assert!(matches!(err, CommitError::Serialization(_)));
        assert!(backend.primary.is_none());
        assert!(backend.backups.is_empty());
    }
}
