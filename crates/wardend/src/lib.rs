//! Command-line runtime for the Warden watchdog service.
//!
//! One binary covers every mode the service is used in: registration
//! management (`install`, `uninstall`, `status`), a foreground development
//! mode (`debug`), and service dispatch (`run`, or a bare invocation — the
//! form the OS service manager uses when it starts the service). The
//! interface is designed to be exercised both from the binary entrypoint
//! and from tests where the IO streams are substituted.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::info;
use warden_core::{RuntimeOptions, ServiceRuntime};

mod cli;
mod console;
#[cfg(windows)]
mod scm;
mod service;
pub mod telemetry;

use cli::{Cli, Command, OutputFormat};
use console::ConsoleRegistrar;
use service::HeartbeatWork;

pub(crate) const APP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::app");

#[cfg(not(windows))]
const PLATFORM_MESSAGE: &str =
    "this command drives the Windows service manager; use 'wardend debug' to run in the foreground";

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => return report_parse_outcome(&error, stdout, stderr),
    };
    if let Err(error) = telemetry::initialise() {
        let _ = writeln!(stderr, "{error}");
        return ExitCode::FAILURE;
    }
    match cli.command {
        Some(Command::Install) => install(stdout, stderr),
        Some(Command::Uninstall) => uninstall(stdout, stderr),
        Some(Command::Status { output }) => status(output, stdout, stderr),
        Some(Command::Debug) => run_foreground(stdout, stderr),
        Some(Command::Run) | None => dispatch_service(stderr),
    }
}

/// Help and version requests are successes; everything else is usage
/// feedback on stderr.
fn report_parse_outcome<W, E>(error: &clap::Error, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    W: Write,
    E: Write,
{
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = write!(stdout, "{error}");
            ExitCode::SUCCESS
        }
        _ => {
            let _ = write!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

/// Fallback for OS error codes that do not fit a process exit status.
/// Distinct from `1`, which the argument parser uses for usage errors.
const EXIT_OS_ERROR_FALLBACK: u8 = 2;

fn exit_status_from(code: u32) -> u8 {
    u8::try_from(code).unwrap_or(EXIT_OS_ERROR_FALLBACK)
}

fn exit_code_from(code: u32) -> ExitCode {
    ExitCode::from(exit_status_from(code))
}

#[cfg(windows)]
fn registration_manager() -> warden_registry::RegistrationManager<warden_registry::ScmDatabase> {
    warden_registry::RegistrationManager::new(warden_registry::ScmDatabase::new())
}

#[cfg(not(windows))]
fn unsupported_platform<E: Write>(stderr: &mut E) -> ExitCode {
    let _ = writeln!(stderr, "{PLATFORM_MESSAGE}");
    ExitCode::FAILURE
}

#[cfg(windows)]
fn install<W: Write, E: Write>(stdout: &mut W, stderr: &mut E) -> ExitCode {
    let definition = match service::definition() {
        Ok(definition) => definition,
        Err(error) => {
            let _ = writeln!(stderr, "failed to resolve the service executable: {error}");
            return ExitCode::FAILURE;
        }
    };
    match registration_manager().install(&definition) {
        Ok(warden_registry::InstallOutcome::Created) => {
            let _ = writeln!(stdout, "Service '{}' installed.", service::SERVICE_NAME);
            ExitCode::SUCCESS
        }
        Ok(warden_registry::InstallOutcome::AlreadyExists) => {
            let _ = writeln!(
                stdout,
                "Service '{}' is already installed.",
                service::SERVICE_NAME
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(windows))]
fn install<W: Write, E: Write>(_stdout: &mut W, stderr: &mut E) -> ExitCode {
    unsupported_platform(stderr)
}

#[cfg(windows)]
fn uninstall<W: Write, E: Write>(stdout: &mut W, stderr: &mut E) -> ExitCode {
    match registration_manager().uninstall(service::SERVICE_NAME) {
        Ok(warden_registry::UninstallOutcome::Removed) => {
            let _ = writeln!(stdout, "Service '{}' removed.", service::SERVICE_NAME);
            ExitCode::SUCCESS
        }
        Ok(warden_registry::UninstallOutcome::MarkedForDeletion) => {
            let _ = writeln!(
                stdout,
                "Service '{}' is marked for deletion; the manager completes the removal.",
                service::SERVICE_NAME
            );
            ExitCode::SUCCESS
        }
        Ok(warden_registry::UninstallOutcome::NotInstalled) => {
            let _ = writeln!(stdout, "Service '{}' is not installed.", service::SERVICE_NAME);
            ExitCode::SUCCESS
        }
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(windows))]
fn uninstall<W: Write, E: Write>(_stdout: &mut W, stderr: &mut E) -> ExitCode {
    unsupported_platform(stderr)
}

#[cfg(windows)]
fn status<W: Write, E: Write>(output: OutputFormat, stdout: &mut W, stderr: &mut E) -> ExitCode {
    let snapshot = match registration_manager().query_status(service::SERVICE_NAME) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            return ExitCode::FAILURE;
        }
    };
    match output {
        OutputFormat::Human => {
            let _ = writeln!(stdout, "{}: {}", snapshot.display_name, snapshot.current_state);
            if let Some(pid) = snapshot.process_id {
                let _ = writeln!(stdout, "  process id: {pid}");
            }
            if snapshot.current_state.is_pending() {
                let _ = writeln!(
                    stdout,
                    "  checkpoint: {} (wait hint {} ms)",
                    snapshot.checkpoint, snapshot.wait_hint_ms
                );
            }
        }
        OutputFormat::Json => {
            let _ = serde_json::to_writer_pretty(&mut *stdout, &snapshot);
            let _ = writeln!(stdout);
        }
    }
    ExitCode::SUCCESS
}

#[cfg(not(windows))]
fn status<W: Write, E: Write>(output: OutputFormat, _stdout: &mut W, stderr: &mut E) -> ExitCode {
    let _ = output;
    unsupported_platform(stderr)
}

/// Runs the full service lifecycle in the foreground.
fn run_foreground<W: Write, E: Write>(stdout: &mut W, stderr: &mut E) -> ExitCode {
    let _ = writeln!(stdout, "Running in console mode; press Ctrl+C to stop.");
    let runtime = ServiceRuntime::new(RuntimeOptions::default());
    match runtime.run(&ConsoleRegistrar, HeartbeatWork) {
        Ok(summary) => {
            info!(
                target: APP_TARGET,
                iterations = summary.iterations,
                "console run finished"
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            exit_code_from(error.exit_code())
        }
    }
}

#[cfg(windows)]
fn dispatch_service<E: Write>(stderr: &mut E) -> ExitCode {
    match scm::dispatch() {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => {
            if code == scm::ERROR_FAILED_SERVICE_CONTROLLER_CONNECT {
                let _ = writeln!(
                    stderr,
                    "not started by the service manager; use 'wardend debug' to run in the foreground"
                );
            } else {
                let _ = writeln!(stderr, "service dispatch failed (os error {code})");
            }
            exit_code_from(code)
        }
    }
}

#[cfg(not(windows))]
fn dispatch_service<E: Write>(stderr: &mut E) -> ExitCode {
    let _ = writeln!(
        stderr,
        "service dispatch is only available under the Windows service manager; use 'wardend debug' to run in the foreground"
    );
    ExitCode::FAILURE
}
