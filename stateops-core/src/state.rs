//! The in-memory state tree.
//!
//! Modules own their resources and their child module instances; resources
//! own their instances. The tree never contains a resource without instances
//! or a non-root module without contents: every mutation in
//! [`crate::sync`] prunes what it empties.

pub mod file;

use std::collections::BTreeMap;

use crate::addrs::{AbsResource, AbsResourceInstance, InstanceKey, ModuleInstance, ModuleStep, Resource};

/// The root of a state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateTree {
    pub(crate) root: ModuleRecord,
    /// Incremented on every persisted change
    pub(crate) serial: u64,
    pub(crate) lineage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRecord {
    pub(crate) resources: BTreeMap<Resource, ResourceRecord>,
    pub(crate) children: BTreeMap<ModuleStep, ModuleRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRecord {
    pub(crate) instances: BTreeMap<InstanceKey, InstanceRecord>,
}

/// A tracked resource instance. The attributes are opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub attributes: serde_json::Value,
}

impl InstanceRecord {
    pub fn new(attributes: serde_json::Value) -> Self {
        InstanceRecord { attributes }
    }
}

impl ModuleRecord {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.children.is_empty()
    }

    pub fn resources(&self) -> impl Iterator<Item = (&Resource, &ResourceRecord)> {
        self.resources.iter()
    }

    pub fn children(&self) -> impl Iterator<Item = (&ModuleStep, &ModuleRecord)> {
        self.children.iter()
    }
}

impl ResourceRecord {
    pub fn instances(&self) -> impl Iterator<Item = (&InstanceKey, &InstanceRecord)> {
        self.instances.iter()
    }
}

impl StateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn lineage(&self) -> Option<&str> {
        self.lineage.as_deref()
    }

    /// True when the tree tracks no resources at all.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn root_module(&self) -> &ModuleRecord {
        &self.root
    }

    pub fn module(&self, addr: &ModuleInstance) -> Option<&ModuleRecord> {
        addr.steps()
            .iter()
            .try_fold(&self.root, |m, step| m.children.get(step))
    }

    pub(crate) fn module_mut(&mut self, addr: &ModuleInstance) -> Option<&mut ModuleRecord> {
        addr.steps()
            .iter()
            .try_fold(&mut self.root, |m, step| m.children.get_mut(step))
    }

    pub fn resource(&self, addr: &AbsResource) -> Option<&ResourceRecord> {
        self.module(&addr.module)?.resources.get(&addr.resource)
    }

    pub fn instance(&self, addr: &AbsResourceInstance) -> Option<&InstanceRecord> {
        self.resource(&addr.resource)?.instances.get(&addr.key)
    }

    /// All module instances, parents before their children, the root first.
    pub fn modules(&self) -> Vec<(ModuleInstance, &ModuleRecord)> {
        let mut out = Vec::new();
        collect_modules(ModuleInstance::root(), &self.root, &mut out);
        out
    }

    /// All resource instance addresses, in address order.
    pub fn instance_addresses(&self) -> Vec<AbsResourceInstance> {
        let mut out = Vec::new();
        for (module_addr, module) in self.modules() {
            for (resource, record) in module.resources() {
                let abs = module_addr.resource(resource.clone());
                out.extend(record.instances.keys().map(|k| abs.instance(k.clone())));
            }
        }
        out.sort();
        out
    }

    /// Record an instance, creating its module instances and resource as
    /// needed. An existing instance at the same address is replaced.
    pub fn set_resource_instance(&mut self, addr: &AbsResourceInstance, record: InstanceRecord) {
        let module = addr
            .resource
            .module
            .steps()
            .iter()
            .fold(&mut self.root, |m, step| {
                m.children.entry(step.clone()).or_default()
            });
        module
            .resources
            .entry(addr.resource.resource.clone())
            .or_default()
            .instances
            .insert(addr.key.clone(), record);
    }

    /// Remove the module instances along `addr` that have become empty,
    /// deepest first. The root module is never removed.
    pub(crate) fn prune(&mut self, addr: &ModuleInstance) {
        prune_steps(&mut self.root, addr.steps());
    }

    /// Describes the first violated structural invariant, if any.
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        for (module_addr, module) in self.modules() {
            if !module_addr.is_root() && module.is_empty() {
                return Err(format!("module {} is empty", module_addr));
            }
            for (resource, record) in module.resources() {
                if record.instances.is_empty() {
                    return Err(format!(
                        "resource {} has no instances",
                        module_addr.resource(resource.clone())
                    ));
                }
            }
        }
        Ok(())
    }
}

fn collect_modules<'a>(
    addr: ModuleInstance,
    module: &'a ModuleRecord,
    out: &mut Vec<(ModuleInstance, &'a ModuleRecord)>,
) {
    out.push((addr.clone(), module));
    for (step, child) in module.children() {
        collect_modules(addr.child(step.name.clone(), step.key.clone()), child, out);
    }
}

fn prune_steps(module: &mut ModuleRecord, steps: &[ModuleStep]) {
    if let Some((first, rest)) = steps.split_first() {
        if let Some(child) = module.children.get_mut(first) {
            prune_steps(child, rest);
            if child.is_empty() {
                module.children.remove(first);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn web(key: i64) -> AbsResourceInstance {
        ModuleInstance::root()
            .child("app", InstanceKey::NoKey)
            .resource(Resource::managed("aws_instance", "web"))
            .instance(InstanceKey::Int(key))
    }

    #[test]
    fn set_creates_modules_implicitly() {
        let mut tree = StateTree::new();
        assert!(tree.is_empty());
        tree.set_resource_instance(&web(0), InstanceRecord::new(json!({"id": "i-0"})));
        assert!(!tree.is_empty());
        assert!(tree.module(&web(0).resource.module).is_some());
        assert_eq!(
            tree.instance(&web(0)).map(|i| &i.attributes),
            Some(&json!({"id": "i-0"}))
        );
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn modules_lists_parents_first() {
        let mut tree = StateTree::new();
        let nested = ModuleInstance::root()
            .child("a", InstanceKey::NoKey)
            .child("b", InstanceKey::Int(1));
        let addr = nested
            .resource(Resource::managed("null_resource", "n"))
            .instance(InstanceKey::NoKey);
        tree.set_resource_instance(&addr, InstanceRecord::new(json!({})));
        let modules: Vec<String> = tree.modules().iter().map(|(a, _)| a.to_string()).collect();
        assert_eq!(modules, vec!["", "module.a", "module.a.module.b[1]"]);
    }

    #[test]
    fn invariant_violations_are_reported() {
        let mut tree = StateTree::new();
        tree.set_resource_instance(&web(0), InstanceRecord::new(json!({})));
        tree.module_mut(&web(0).resource.module)
            .unwrap()
            .resources
            .get_mut(&web(0).resource.resource)
            .unwrap()
            .instances
            .clear();
        assert_eq!(
            tree.check_invariants(),
            Err("resource module.app.aws_instance.web has no instances".to_string())
        );
    }
}
