//! Resolution of address patterns against a [`StateTree`].

use tracing::debug;

use crate::addrs::{
    AbsResource, AbsResourceInstance, Address, AddressPattern, Granularity, InstanceKey,
    ModuleInstance,
};
use crate::error::PatternSyntaxError;
use crate::state::{InstanceRecord, ModuleRecord, ResourceRecord, StateTree};

/// A concrete state entry denoted by a pattern, together with the record it
/// refers to. The borrow ties results to the tree they were resolved from, so
/// the tree cannot be mutated while results are still around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterResult<'a> {
    Module(ModuleInstance, &'a ModuleRecord),
    Resource(AbsResource, &'a ResourceRecord),
    Instance(AbsResourceInstance, &'a InstanceRecord),
}

impl<'a> FilterResult<'a> {
    pub fn address(&self) -> Address {
        match self {
            FilterResult::Module(a, _) => Address::Module(a.clone()),
            FilterResult::Resource(a, _) => Address::Resource(a.clone()),
            FilterResult::Instance(a, _) => Address::Instance(a.clone()),
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            FilterResult::Module(..) => Granularity::Module,
            FilterResult::Resource(..) => Granularity::Resource,
            FilterResult::Instance(..) => Granularity::Instance,
        }
    }
}

pub struct Filter<'a> {
    state: &'a StateTree,
}

impl<'a> Filter<'a> {
    pub fn new(state: &'a StateTree) -> Self {
        Filter { state }
    }

    /// Resolve each pattern and normalize its matches to the coarsest
    /// granularity it produced. Results are concatenated in pattern order;
    /// overlapping patterns may yield overlapping matches.
    ///
    /// A pattern that matches nothing contributes nothing.
    pub fn filter<S: AsRef<str>>(
        &self,
        patterns: &[S],
    ) -> Result<Vec<FilterResult<'a>>, PatternSyntaxError> {
        let parsed = patterns
            .iter()
            .map(|p| p.as_ref().parse::<AddressPattern>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = Vec::new();
        for (text, pattern) in patterns.iter().zip(&parsed) {
            let matches = normalize(self.filter_raw(pattern));
            debug!(
                pattern = text.as_ref(),
                matches = matches.len(),
                "resolved address pattern"
            );
            results.extend(matches);
        }
        Ok(results)
    }

    /// Every module, resource and instance in the tree, without
    /// normalization.
    pub fn filter_all(&self) -> Vec<FilterResult<'a>> {
        let mut results = Vec::new();
        for (module_addr, module) in self.state.modules() {
            if !module_addr.is_root() {
                results.push(FilterResult::Module(module_addr.clone(), module));
            }
            push_resources(&module_addr, module, &mut results, |_, _| true);
        }
        results.sort_by_key(FilterResult::address);
        results
    }

    /// All entries a single pattern denotes, at every granularity, in address
    /// order.
    ///
    /// A module pattern selects the module instance and its descendants; a
    /// resource pattern selects the resource and its instances.
    pub fn filter_raw(&self, pattern: &AddressPattern) -> Vec<FilterResult<'a>> {
        let module_filter = match pattern {
            AddressPattern::Module(m) => Some(m),
            _ => None,
        };

        let mut results = Vec::new();
        for (module_addr, module) in self.state.modules() {
            match module_filter {
                Some(m) if *m == module_addr || m.is_ancestor_of(&module_addr) => {
                    results.push(FilterResult::Module(module_addr.clone(), module));
                }
                Some(_) => continue,
                None => {}
            }
            push_resources(&module_addr, module, &mut results, |abs, key| {
                relevant(pattern, abs, key)
            });
        }
        results.sort_by_key(FilterResult::address);
        results
    }
}

fn push_resources<'a>(
    module_addr: &ModuleInstance,
    module: &'a ModuleRecord,
    results: &mut Vec<FilterResult<'a>>,
    relevant: impl Fn(&AbsResource, Option<&InstanceKey>) -> bool,
) {
    for (resource, record) in module.resources() {
        let abs = module_addr.resource(resource.clone());
        if relevant(&abs, None) {
            results.push(FilterResult::Resource(abs.clone(), record));
        }
        for (key, instance) in record.instances() {
            if relevant(&abs, Some(key)) {
                results.push(FilterResult::Instance(abs.instance(key.clone()), instance));
            }
        }
    }
}

/// Whether `pattern` selects the resource `abs` (`key` is `None`) or its
/// instance `key`. Patterns without a module path match in any module.
fn relevant(pattern: &AddressPattern, abs: &AbsResource, key: Option<&InstanceKey>) -> bool {
    match pattern {
        AddressPattern::Module(_) => true,
        AddressPattern::Resource { module, resource } => {
            module.as_ref().map_or(true, |m| *m == abs.module) && *resource == abs.resource
        }
        AddressPattern::Instance {
            module,
            resource,
            key: pattern_key,
        } => {
            module.as_ref().map_or(true, |m| *m == abs.module)
                && *resource == abs.resource
                && key == Some(pattern_key)
        }
    }
}

/// Keep only the matches of the coarsest granularity present, so that a
/// module match is not followed by removals of entries it already contains.
pub fn normalize<'a>(raw: Vec<FilterResult<'a>>) -> Vec<FilterResult<'a>> {
    match raw.iter().map(FilterResult::granularity).min() {
        None => raw,
        Some(coarsest) => raw
            .into_iter()
            .filter(|m| m.granularity() == coarsest)
            .collect(),
    }
}
