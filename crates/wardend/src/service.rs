//! Service identity and the work the watchdog performs each wake.

use std::io;

use tracing::trace;
use warden_core::{WorkError, WorkUnit};
use warden_registry::ServiceDefinition;

pub(crate) const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Name the service is registered under.
pub(crate) const SERVICE_NAME: &str = "wardend";
/// Name shown in management tooling.
pub(crate) const DISPLAY_NAME: &str = "Warden Watchdog Service";
/// Description stored with the registration record.
pub(crate) const DESCRIPTION: &str =
    "Background watchdog that performs periodic monitoring work until stopped.";

/// Builds the registration record for the currently running executable.
pub(crate) fn definition() -> io::Result<ServiceDefinition> {
    ServiceDefinition::for_current_executable(SERVICE_NAME, DISPLAY_NAME, DESCRIPTION)
}

/// The periodic monitoring pass.
///
/// Concrete checks slot in here; the loop cadence, progress logging, and
/// failure isolation all live in the worker executor.
pub(crate) struct HeartbeatWork;

impl WorkUnit for HeartbeatWork {
    fn run_iteration(&mut self, iteration: u64) -> Result<(), WorkError> {
        trace!(target: SERVICE_TARGET, iteration, "heartbeat");
        Ok(())
    }
}
