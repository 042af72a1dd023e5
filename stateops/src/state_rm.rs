use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use stateops_core::addrs::Address;
use stateops_core::describe::{describe, removal_line};
use stateops_core::filter::{Filter, FilterResult};
use stateops_core::local::{LocalState, StateLock, DEFAULT_STATE_PATH};
use stateops_core::{StateError, StateHandle};
use tracing::{info, instrument};

const ERR_STATE_RM_PERSIST: &str = "Error saving the state.

The state was not saved. No items were removed from the persisted
state. No backup was created since no modification occurred. Please
resolve the issue above and try again.";

/// Remove one or more items from the state.
///
/// This command removes one or more resource instances from the state based
/// on the addresses given. You can view and list the available instances
/// with `stateops state list`.
///
/// This command creates a timestamped backup of the state on every
/// invocation. This can't be disabled.
#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// Print what would be removed, but don't remove anything
    #[arg(long)]
    pub(crate) dry_run: bool,

    /// Path where the backup of the prior state is written.
    /// Defaults to the state path with a timestamped `.backup` extension.
    #[arg(long, value_name = "PATH")]
    pub(crate) backup: Option<PathBuf>,

    /// Path to the source state file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_STATE_PATH)]
    pub(crate) state: PathBuf,

    /// Modules, resources or resource instances to remove
    #[arg(value_name = "ADDRESS")]
    pub(crate) addresses: Vec<String>,
}

/// Run the `state rm` command.
#[instrument(level = "debug", skip_all, fields(state = %args.state.display()))]
pub(crate) fn state_rm(args: &Args, out: &mut impl Write) -> Result<()> {
    if args.addresses.is_empty() {
        bail!("At least one resource address is required.");
    }

    let mut lock = StateLock::open(&args.state)?;
    let mut handle = LocalState::new(&args.state, args.backup.clone());

    if args.dry_run {
        let _guard = lock.read()?;
        return dry_run(&mut handle, &args.addresses, out);
    }

    let _guard = lock.write()?;
    remove(&mut handle, &args.addresses, out)
}

/// Print what `remove` would do.
fn dry_run<H: StateHandle>(
    handle: &mut H,
    patterns: &[String],
    out: &mut impl Write,
) -> Result<()> {
    handle.refresh_state()?;
    let state = handle.state().ok_or(StateError::NotFound)?;
    let matches = Filter::new(state).filter(patterns)?;
    writeln!(out, "{}", describe(&matches))?;
    Ok(())
}

fn remove<H: StateHandle>(handle: &mut H, patterns: &[String], out: &mut impl Write) -> Result<()> {
    handle.refresh_state()?;
    let state = handle.state().ok_or(StateError::NotFound)?;
    let targets: Vec<Address> = Filter::new(state)
        .filter(patterns)?
        .iter()
        .map(FilterResult::address)
        .collect();

    let state = handle.state_mut().ok_or(StateError::NotFound)?;
    let mut ss = state.sync_wrapper();
    for target in &targets {
        writeln!(out, "{}", removal_line(target))?;
        ss.remove(target);
    }

    handle.commit().context(ERR_STATE_RM_PERSIST)?;
    info!(removed = targets.len(), "state updated");
    writeln!(out, "Updated state written successfully.")?;
    Ok(())
}
