//! The persisted state document.
//!
//! On disk, state is a JSON object holding a flat list of resources, each
//! tagged with the module instance it belongs to:
//!
//! ```json
//! {
//!   "version": 4,
//!   "serial": 3,
//!   "resources": [
//!     {
//!       "module": "module.app",
//!       "mode": "managed",
//!       "type": "aws_instance",
//!       "name": "web",
//!       "instances": [ { "index_key": 0, "attributes": { "id": "i-0" } } ]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::addrs::{InstanceKey, ModuleInstance, Resource, ResourceMode};
use crate::error::DocumentError;
use crate::state::{InstanceRecord, StateTree};

pub const STATE_VERSION: u64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateFile {
    #[serde(deserialize_with = "version_is_supported")]
    pub version: u64,
    #[serde(default)]
    pub serial: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

fn version_is_supported<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v: u64 = Deserialize::deserialize(deserializer)?;
    if v == STATE_VERSION {
        Ok(v)
    } else {
        Err(serde::de::Error::custom(format!(
            "unsupported state version: expected {}, got {}",
            STATE_VERSION, v
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceEntry {
    /// Module instance path; absent for the root module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub mode: ResourceMode,
    #[serde(rename = "type")]
    pub type_: String,
    pub name: String,
    #[serde(default)]
    pub instances: Vec<InstanceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InstanceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_key: Option<IndexKey>,
    #[serde(default)]
    pub attributes: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum IndexKey {
    Int(i64),
    Str(String),
}

fn index_key(key: &InstanceKey) -> Option<IndexKey> {
    match key {
        InstanceKey::NoKey => None,
        InstanceKey::Int(i) => Some(IndexKey::Int(*i)),
        InstanceKey::Str(s) => Some(IndexKey::Str(s.clone())),
    }
}

impl From<Option<IndexKey>> for InstanceKey {
    fn from(key: Option<IndexKey>) -> Self {
        match key {
            None => InstanceKey::NoKey,
            Some(IndexKey::Int(i)) => InstanceKey::Int(i),
            Some(IndexKey::Str(s)) => InstanceKey::Str(s),
        }
    }
}

impl StateFile {
    pub fn from_slice(bytes: &[u8]) -> Result<StateFile, DocumentError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Flatten a tree into its document form, with the given serial.
    pub fn from_tree(tree: &StateTree, serial: u64) -> StateFile {
        let mut resources = Vec::new();
        for (module_addr, module) in tree.modules() {
            for (resource, record) in module.resources() {
                resources.push(ResourceEntry {
                    module: (!module_addr.is_root()).then(|| module_addr.to_string()),
                    mode: resource.mode,
                    type_: resource.type_.clone(),
                    name: resource.name.clone(),
                    instances: record
                        .instances()
                        .map(|(key, instance)| InstanceEntry {
                            index_key: index_key(key),
                            attributes: instance.attributes.clone(),
                        })
                        .collect(),
                });
            }
        }
        StateFile {
            version: STATE_VERSION,
            serial,
            lineage: tree.lineage.clone(),
            resources,
        }
    }

    pub fn into_tree(self) -> Result<StateTree, DocumentError> {
        let mut tree = StateTree {
            serial: self.serial,
            lineage: self.lineage,
            ..Default::default()
        };
        for entry in self.resources {
            let module = match &entry.module {
                Some(m) => m.parse::<ModuleInstance>()?,
                None => ModuleInstance::root(),
            };
            let abs = module.resource(Resource {
                mode: entry.mode,
                type_: entry.type_,
                name: entry.name,
            });
            if entry.instances.is_empty() {
                warn!("Dropping resource {} from state: it has no instances", abs);
                continue;
            }
            for instance in entry.instances {
                tree.set_resource_instance(
                    &abs.instance(instance.index_key.into()),
                    InstanceRecord::new(instance.attributes),
                );
            }
        }
        Ok(tree)
    }
}
