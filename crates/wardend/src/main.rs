//! Binary entrypoint for the Warden watchdog service.
//!
//! The binary delegates to [`wardend::run`], which parses command-line
//! arguments and drives the install, uninstall, status, and run flows.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    wardend::run(std::env::args_os(), &mut stdout, &mut stderr)
}
