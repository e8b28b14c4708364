//! Lifecycle orchestration for one service run.
//!
//! [`ServiceRuntime::run`] drives the state machine the manager expects:
//! register the control handler, report `StartPending`, launch the worker,
//! report `Running`, block until stop is signalled, join the worker, and
//! report the terminal `Stopped`. A run is single-use; a fresh invocation
//! builds a fresh stop signal and handler registration.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

use crate::control::{ControlHandler, HandlerSlot};
use crate::signal::StopSignal;
use crate::status::{NO_ERROR, PublishError, ServiceState, StatusReporter, StatusSink};
use crate::worker::{WorkUnit, WorkerExecutor, WorkerPanicked};

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Exit code reported when no OS code is available for a failure.
const FAILURE_FALLBACK_CODE: u32 = 1;

/// Registers the control callback with the service manager.
///
/// Implementations capture the [`HandlerSlot`] for their callback and return
/// the status publication sink bound to the registration.
pub trait ControlRegistrar {
    /// Performs the registration for one run.
    fn register(&self, slot: HandlerSlot) -> Result<Arc<dyn StatusSink>, RegisterError>;
}

/// Raised when the manager rejects the control handler registration.
#[derive(Debug, Clone, Error)]
#[error("control handler registration rejected: {message} (os error {code})")]
pub struct RegisterError {
    /// OS error code reported by the manager.
    pub code: u32,
    /// Human-readable description from the adapter.
    pub message: String,
}

/// Errors surfaced while orchestrating a service run.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Control handler registration failed; nothing was reported.
    #[error("failed to register control handler: {source}")]
    Register {
        /// Underlying registration error.
        #[source]
        source: RegisterError,
    },
    /// The manager rejected a status report the run cannot proceed without.
    #[error("status report for '{state}' was rejected: {source}")]
    Publish {
        /// State whose report was rejected.
        state: ServiceState,
        /// Underlying publication error.
        #[source]
        source: PublishError,
    },
    /// The worker thread could not be launched.
    #[error("failed to launch worker thread: {source}")]
    SpawnWorker {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The worker thread panicked instead of exiting cleanly.
    #[error("worker execution failed: {source}")]
    Worker {
        /// Underlying join failure.
        #[source]
        source: WorkerPanicked,
    },
}

impl LifecycleError {
    /// OS error code carried into the terminal status report and usable as
    /// a process exit code.
    #[must_use]
    pub fn exit_code(&self) -> u32 {
        match self {
            Self::Register { source } => source.code,
            Self::Publish { source, .. } => source.code,
            Self::SpawnWorker { source } => source
                .raw_os_error()
                .map_or(FAILURE_FALLBACK_CODE, |code| code as u32),
            Self::Worker { .. } => FAILURE_FALLBACK_CODE,
        }
    }
}

/// Tunable timing for one service run.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Bounded wait between work-iterations.
    pub poll_interval: Duration,
    /// Wait hint reported with `StartPending`.
    pub start_wait_hint: Duration,
    /// Wait hint reported with `StopPending`.
    pub stop_wait_hint: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            start_wait_hint: Duration::from_secs(3),
            stop_wait_hint: Duration::from_secs(3),
        }
    }
}

/// Result of a completed service run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Work-iteration attempts performed before shutdown.
    pub iterations: u64,
}

/// Owned context for a single service run.
///
/// Replaces the free-standing process globals of a classic service skeleton:
/// the reporter, stop signal, and handler all live inside one run of
/// [`ServiceRuntime::run`] and are released when it returns.
#[derive(Debug, Default)]
pub struct ServiceRuntime {
    options: RuntimeOptions,
}

impl ServiceRuntime {
    /// Builds a runtime with the given timing options.
    #[must_use]
    pub fn new(options: RuntimeOptions) -> Self {
        Self { options }
    }

    /// Runs the service until stopped.
    ///
    /// Fatal startup failures (registration, worker launch) are reported as
    /// `Stopped` with the originating OS error code where a status handle
    /// exists, then returned; none of them is retried.
    pub fn run<R, W>(&self, registrar: &R, work: W) -> Result<RunSummary, LifecycleError>
    where
        R: ControlRegistrar + ?Sized,
        W: WorkUnit,
    {
        let slot = HandlerSlot::new();
        let sink = registrar
            .register(slot.clone())
            .map_err(|source| LifecycleError::Register { source })?;
        let reporter = StatusReporter::new(sink);
        let stop = Arc::new(StopSignal::new());
        slot.bind(ControlHandler::new(
            reporter.clone(),
            Arc::clone(&stop),
            self.options.stop_wait_hint,
        ));

        report_or_fail(
            &reporter,
            ServiceState::StartPending,
            NO_ERROR,
            self.options.start_wait_hint,
        )?;

        let executor = WorkerExecutor::new(work, Arc::clone(&stop), self.options.poll_interval);
        let worker = match executor.spawn() {
            Ok(worker) => worker,
            Err(source) => {
                let code = source
                    .raw_os_error()
                    .map_or(FAILURE_FALLBACK_CODE, |code| code as u32);
                report_stopped_best_effort(&reporter, code);
                return Err(LifecycleError::SpawnWorker { source });
            }
        };

        // The worker is already live; a rejected Running report must not
        // leak it past the run. Wind the thread down before surfacing the
        // error so the caller's work unit stops with the run.
        if let Err(error) = report_or_fail(&reporter, ServiceState::Running, NO_ERROR, Duration::ZERO)
        {
            stop.signal();
            let _ = worker.join();
            report_stopped_best_effort(&reporter, error.exit_code());
            return Err(error);
        }
        info!(target: LIFECYCLE_TARGET, "service running; awaiting stop signal");

        stop.wait();
        info!(target: LIFECYCLE_TARGET, "stop signalled; joining worker");

        let iterations = match worker.join() {
            Ok(iterations) => iterations,
            Err(source) => {
                report_stopped_best_effort(&reporter, FAILURE_FALLBACK_CODE);
                return Err(LifecycleError::Worker { source });
            }
        };

        report_or_fail(&reporter, ServiceState::Stopped, NO_ERROR, Duration::ZERO)?;
        info!(target: LIFECYCLE_TARGET, iterations, "service stopped cleanly");
        Ok(RunSummary { iterations })
    }
}

fn report_or_fail(
    reporter: &StatusReporter,
    state: ServiceState,
    exit_code: u32,
    wait_hint: Duration,
) -> Result<(), LifecycleError> {
    reporter
        .report(state, exit_code, wait_hint)
        .map_err(|source| LifecycleError::Publish { state, source })
}

/// Reports the terminal status for a failed run without masking the
/// original error.
fn report_stopped_best_effort(reporter: &StatusReporter, code: u32) {
    if let Err(error) = reporter.report(ServiceState::Stopped, code, Duration::ZERO) {
        error!(
            target: LIFECYCLE_TARGET,
            error = %error,
            "failed to report terminal status"
        );
    }
}
