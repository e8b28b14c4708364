//! Service status modelling and publication.
//!
//! [`StatusReporter`] owns the checkpoint counter and the last published
//! snapshot, composing each [`ServiceStatus`] per the manager protocol
//! before handing it to the bound [`StatusSink`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub(crate) const STATUS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::status");

/// Successful OS exit code in a status report.
pub const NO_ERROR: u32 = 0;

/// Lifecycle states recognised by the service manager protocol.
///
/// Only the first four are produced by this design; the pause family is
/// carried for protocol completeness and for decoding foreign records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    StartPending,
    Running,
    StopPending,
    Stopped,
    PausePending,
    Paused,
    ContinuePending,
}

impl ServiceState {
    /// Returns whether the state is a pending transition requiring
    /// checkpoint progress.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            Self::StartPending | Self::StopPending | Self::PausePending | Self::ContinuePending
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartPending => "start_pending",
            Self::Running => "running",
            Self::StopPending => "stop_pending",
            Self::Stopped => "stopped",
            Self::PausePending => "pause_pending",
            Self::Paused => "paused",
            Self::ContinuePending => "continue_pending",
        };
        formatter.write_str(name)
    }
}

/// Control codes the service currently advertises as accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcceptedControls {
    /// Whether the manager may deliver a stop request.
    pub stop: bool,
}

impl AcceptedControls {
    /// No controls accepted; reported while start is pending.
    pub const NONE: Self = Self { stop: false };
    /// Stop only; reported in every other state.
    pub const STOP: Self = Self { stop: true };

    /// Returns whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        !self.stop
    }
}

/// Snapshot published to the service manager on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Current lifecycle state.
    pub current_state: ServiceState,
    /// Controls the service accepts in this state.
    pub accepted_controls: AcceptedControls,
    /// 0 for success, otherwise the originating OS error code.
    pub exit_code: u32,
    /// Advisory interval the manager should allow before treating the
    /// service as hung.
    pub wait_hint: Duration,
    /// Forward-progress counter; non-zero only while a transition pends.
    pub checkpoint: u32,
}

/// Publication endpoint bound to one registered service identity.
///
/// The manager binds status reports to the handle returned at registration,
/// so a sink is valid for exactly one run.
pub trait StatusSink: Send + Sync {
    /// Publishes the snapshot to the manager.
    fn publish(&self, status: &ServiceStatus) -> Result<(), PublishError>;
}

/// Raised when the manager rejects a status report.
///
/// Non-recoverable for the run that hits it: a stale pending state cannot
/// be un-reported.
#[derive(Debug, Clone, Error)]
#[error("status publication rejected: {message} (os error {code})")]
pub struct PublishError {
    /// OS error code reported by the manager.
    pub code: u32,
    /// Human-readable description from the adapter.
    pub message: String,
}

#[derive(Default)]
struct ReporterState {
    checkpoint: u32,
    last: Option<ServiceStatus>,
}

/// Composes and publishes status snapshots for one service run.
///
/// Cloneable handle; clones share the checkpoint counter and last snapshot,
/// so the control handler and orchestrator never race the protocol state.
#[derive(Clone)]
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
    state: Arc<Mutex<ReporterState>>,
}

impl StatusReporter {
    /// Binds a reporter to the publication sink for this run.
    #[must_use]
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(ReporterState::default())),
        }
    }

    /// Composes and publishes a status report.
    ///
    /// The checkpoint strictly increases on each pending-state report and
    /// resets to zero on reaching `Running` or `Stopped`; accepted controls
    /// are empty only while start is pending. Publication happens under the
    /// reporter lock so the manager observes checkpoints in order.
    pub fn report(
        &self,
        state: ServiceState,
        exit_code: u32,
        wait_hint: Duration,
    ) -> Result<(), PublishError> {
        let mut guard = self.lock();
        let checkpoint = if state.is_pending() {
            guard.checkpoint += 1;
            guard.checkpoint
        } else {
            guard.checkpoint = 0;
            0
        };
        let accepted_controls = if state == ServiceState::StartPending {
            AcceptedControls::NONE
        } else {
            AcceptedControls::STOP
        };
        let status = ServiceStatus {
            current_state: state,
            accepted_controls,
            exit_code,
            wait_hint,
            checkpoint,
        };
        guard.last = Some(status.clone());
        self.sink.publish(&status)?;
        debug!(
            target: STATUS_TARGET,
            state = %state,
            checkpoint,
            exit_code,
            wait_hint_ms = wait_hint.as_millis() as u64,
            "status reported"
        );
        Ok(())
    }

    /// Re-publishes the last reported status unchanged.
    ///
    /// Used for interrogation; a no-op before the first report.
    pub fn republish(&self) -> Result<(), PublishError> {
        let guard = self.lock();
        match &guard.last {
            Some(status) => self.sink.publish(status),
            None => {
                debug!(target: STATUS_TARGET, "interrogated before first report; nothing to republish");
                Ok(())
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        // Checkpoint state stays coherent even if a publisher panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
