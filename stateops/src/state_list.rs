use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use stateops_core::addrs::{AbsResourceInstance, AddressPattern};
use stateops_core::filter::{Filter, FilterResult};
use stateops_core::local::{LocalState, StateLock, DEFAULT_STATE_PATH};
use stateops_core::{StateError, StateHandle};

/// List resource instances in the state.
///
/// Without addresses, every resource instance is listed. Otherwise only the
/// instances within the given modules, resources or instances are listed.
#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// Path to the state file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_STATE_PATH)]
    pub(crate) state: PathBuf,

    /// Modules, resources or resource instances to list
    #[arg(value_name = "ADDRESS")]
    pub(crate) addresses: Vec<String>,
}

pub(crate) fn state_list(args: &Args, out: &mut impl Write) -> Result<()> {
    let lock = StateLock::open(&args.state)?;
    let _guard = lock.read()?;

    let mut handle = LocalState::new(&args.state, None);
    handle.refresh_state()?;
    let state = handle.state().ok_or(StateError::NotFound)?;
    let filter = Filter::new(state);

    let matches = if args.addresses.is_empty() {
        filter.filter_all()
    } else {
        let patterns = args
            .addresses
            .iter()
            .map(|a| a.parse::<AddressPattern>())
            .collect::<Result<Vec<_>, _>>()?;
        patterns.iter().flat_map(|p| filter.filter_raw(p)).collect()
    };

    let instances: BTreeSet<AbsResourceInstance> = matches
        .into_iter()
        .filter_map(|m| match m {
            FilterResult::Instance(addr, _) => Some(addr),
            _ => None,
        })
        .collect();
    for addr in instances {
        writeln!(out, "{}", addr)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn list(dir: &tempfile::TempDir, addresses: &[&str]) -> Result<String> {
        let args = Args {
            state: dir.path().join("terraform.tfstate"),
            addresses: addresses.iter().map(|s| s.to_string()).collect(),
        };
        let mut out = Vec::new();
        state_list(&args, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn with_state() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let state = json!({
            "version": 4,
            "serial": 7,
            "lineage": "3f1c",
            "resources": [
                {
                    "mode": "managed",
                    "type": "aws_instance",
                    "name": "web",
                    "instances": [
                        { "index_key": "b", "attributes": {} },
                        { "index_key": "a", "attributes": {} }
                    ]
                },
                {
                    "module": "module.app",
                    "mode": "data",
                    "type": "aws_ami",
                    "name": "base",
                    "instances": [ { "attributes": {} } ]
                }
            ]
        });
        fs::write(dir.path().join("terraform.tfstate"), state.to_string()).unwrap();
        dir
    }

    #[test]
    fn lists_everything() {
        let dir = with_state();
        assert_eq!(
            list(&dir, &[]).unwrap(),
            "aws_instance.web[\"a\"]\n\
             aws_instance.web[\"b\"]\n\
             module.app.data.aws_ami.base\n"
        );
    }

    #[test]
    fn lists_within_module() {
        let dir = with_state();
        assert_eq!(
            list(&dir, &["module.app"]).unwrap(),
            "module.app.data.aws_ami.base\n"
        );
    }

    #[test]
    fn overlapping_addresses_list_once() {
        let dir = with_state();
        assert_eq!(
            list(&dir, &["aws_instance.web[\"a\"]", "aws_instance.web"]).unwrap(),
            "aws_instance.web[\"a\"]\naws_instance.web[\"b\"]\n"
        );
    }

    #[test]
    fn missing_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = list(&dir, &[]).unwrap_err();
        assert_eq!(err.to_string(), "No state file was found!");
    }

    #[test]
    fn malformed_address() {
        let dir = with_state();
        assert!(list(&dir, &["module."]).is_err());
    }
}
