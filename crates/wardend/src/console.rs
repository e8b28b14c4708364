//! Foreground run mode.
//!
//! Stands in for the OS service manager during development: status reports
//! land in the log, and termination signals play the part of the manager's
//! stop control.

use std::io;
use std::sync::Arc;
use std::thread;

use tracing::info;
use warden_core::{
    ControlRegistrar, ControlRequest, HandlerSlot, PublishError, RegisterError, ServiceStatus,
    StatusSink,
};

pub(crate) const CONSOLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::console");

/// Status sink that logs transitions instead of notifying a manager.
struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn publish(&self, status: &ServiceStatus) -> Result<(), PublishError> {
        info!(
            target: CONSOLE_TARGET,
            state = %status.current_state,
            checkpoint = status.checkpoint,
            exit_code = status.exit_code,
            "status"
        );
        Ok(())
    }
}

/// Registrar for foreground runs.
///
/// Installs a termination-signal listener that dispatches a stop request
/// through the control slot, then hands back the logging sink.
pub(crate) struct ConsoleRegistrar;

impl ControlRegistrar for ConsoleRegistrar {
    fn register(&self, slot: HandlerSlot) -> Result<Arc<dyn StatusSink>, RegisterError> {
        spawn_signal_listener(slot)?;
        Ok(Arc::new(ConsoleSink))
    }
}

fn register_error(message: &str, source: &io::Error) -> RegisterError {
    RegisterError {
        code: source.raw_os_error().map_or(1, |code| code.unsigned_abs()),
        message: format!("{message}: {source}"),
    }
}

#[cfg(unix)]
fn spawn_signal_listener(slot: HandlerSlot) -> Result<(), RegisterError> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|source| register_error("failed to install signal handlers", &source))?;
    thread::Builder::new()
        .name(String::from("warden-signals"))
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(target: CONSOLE_TARGET, signal, "termination signal received");
                slot.dispatch(ControlRequest::Stop);
            }
        })
        .map_err(|source| register_error("failed to launch signal listener", &source))?;
    Ok(())
}

// The iterator module is unavailable on Windows; a console Ctrl+C sets a
// flag that a listener thread polls.
#[cfg(windows)]
fn spawn_signal_listener(slot: HandlerSlot) -> Result<(), RegisterError> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))
        .map_err(|source| register_error("failed to install signal handlers", &source))?;
    thread::Builder::new()
        .name(String::from("warden-signals"))
        .spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(200));
            }
            info!(target: CONSOLE_TARGET, "console interrupt received");
            slot.dispatch(ControlRequest::Stop);
        })
        .map_err(|source| register_error("failed to launch signal listener", &source))?;
    Ok(())
}
