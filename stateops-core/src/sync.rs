//! Removal operations on a [`StateTree`] that keep it free of empty entries.
//!
//! Every operation deletes its target if present and is a no-op otherwise,
//! so overlapping matches can be applied one after another.

use tracing::debug;

use crate::addrs::{AbsResource, AbsResourceInstance, Address, ModuleInstance};
use crate::state::StateTree;

/// Exclusive access to a tree for the duration of a batch of removals.
pub struct SyncState<'a> {
    state: &'a mut StateTree,
}

impl StateTree {
    pub fn sync_wrapper(&mut self) -> SyncState<'_> {
        SyncState { state: self }
    }
}

impl<'a> SyncState<'a> {
    /// Remove a module instance with everything nested in it. Removing the
    /// root module empties the tree.
    ///
    /// Returns whether anything was removed.
    pub fn remove_module(&mut self, addr: &ModuleInstance) -> bool {
        let Some((last, parent_steps)) = addr.steps().split_last() else {
            let removed = !self.state.root.is_empty();
            self.state.root = Default::default();
            return removed;
        };
        let parent = ModuleInstance(parent_steps.to_vec());
        let removed = self
            .state
            .module_mut(&parent)
            .and_then(|m| m.children.remove(last))
            .is_some();
        if removed {
            self.state.prune(&parent);
        }
        debug!(module = %addr, removed, "remove module");
        removed
    }

    /// Remove a resource with all of its instances, then any modules left
    /// empty.
    pub fn remove_resource(&mut self, addr: &AbsResource) -> bool {
        let removed = self
            .state
            .module_mut(&addr.module)
            .and_then(|m| m.resources.remove(&addr.resource))
            .is_some();
        if removed {
            self.state.prune(&addr.module);
        }
        debug!(resource = %addr, removed, "remove resource");
        removed
    }

    /// Stop tracking a single instance. Nothing is deprovisioned; the
    /// resource and modules it leaves empty are removed as well.
    pub fn forget_resource_instance(&mut self, addr: &AbsResourceInstance) -> bool {
        let Some(module) = self.state.module_mut(&addr.resource.module) else {
            debug!(instance = %addr, removed = false, "forget resource instance");
            return false;
        };
        let Some(resource) = module.resources.get_mut(&addr.resource.resource) else {
            debug!(instance = %addr, removed = false, "forget resource instance");
            return false;
        };
        let removed = resource.instances.remove(&addr.key).is_some();
        if resource.instances.is_empty() {
            module.resources.remove(&addr.resource.resource);
        }
        if removed {
            self.state.prune(&addr.resource.module);
        }
        debug!(instance = %addr, removed, "forget resource instance");
        removed
    }

    /// Apply the removal matching the address granularity.
    pub fn remove(&mut self, addr: &Address) -> bool {
        match addr {
            Address::Module(a) => self.remove_module(a),
            Address::Resource(a) => self.remove_resource(a),
            Address::Instance(a) => self.forget_resource_instance(a),
        }
    }
}
