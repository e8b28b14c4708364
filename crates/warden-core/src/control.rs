//! Inbound control request handling.
//!
//! The manager invokes the control callback on a thread it owns, at any
//! point relative to the orchestrator. [`ControlHandler`] therefore only
//! touches two thread-safe primitives: it publishes through the
//! [`StatusReporter`](crate::StatusReporter) and sets the
//! [`StopSignal`](crate::StopSignal). It never blocks on IO or on the
//! worker.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::signal::StopSignal;
use crate::status::{NO_ERROR, ServiceState, StatusReporter};

pub(crate) const CONTROL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::control");

/// Control request delivered asynchronously by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Graceful shutdown request.
    Stop,
    /// Status interrogation; the current status is re-published unchanged.
    Interrogate,
    /// Any control code this design does not act on.
    Unknown(u32),
}

/// Translates manager control requests into status transitions and stop
/// signalling.
pub struct ControlHandler {
    reporter: StatusReporter,
    stop: Arc<StopSignal>,
    stop_wait_hint: Duration,
}

impl ControlHandler {
    /// Builds a handler over the run's reporter and stop signal.
    #[must_use]
    pub fn new(reporter: StatusReporter, stop: Arc<StopSignal>, stop_wait_hint: Duration) -> Self {
        Self {
            reporter,
            stop,
            stop_wait_hint,
        }
    }

    /// Processes one control request. Must return quickly; publish failures
    /// are logged and the run continues degraded.
    ///
    /// A stop request reports `StopPending` and sets the stop signal; the
    /// terminal `Stopped` report is deferred to the orchestrator once the
    /// worker has joined.
    pub fn handle(&self, request: ControlRequest) {
        match request {
            ControlRequest::Stop => {
                info!(target: CONTROL_TARGET, "stop requested by manager");
                if let Err(source) =
                    self.reporter
                        .report(ServiceState::StopPending, NO_ERROR, self.stop_wait_hint)
                {
                    error!(
                        target: CONTROL_TARGET,
                        error = %source,
                        "failed to report stop pending; continuing shutdown"
                    );
                }
                self.stop.signal();
            }
            ControlRequest::Interrogate => {
                if let Err(source) = self.reporter.republish() {
                    error!(
                        target: CONTROL_TARGET,
                        error = %source,
                        "failed to answer interrogation"
                    );
                }
            }
            ControlRequest::Unknown(code) => {
                warn!(target: CONTROL_TARGET, code, "ignoring unrecognised control code");
            }
        }
    }
}

/// Shared slot a host adapter polls to dispatch control requests.
///
/// The manager ABI mandates a no-argument callback registered before the
/// first status report, yet the handler needs the status handle produced by
/// that same registration. The slot breaks the cycle: the adapter captures
/// it when registering and the orchestrator binds the handler immediately
/// after registration returns. This is the one sanctioned process-shared
/// cell, scoped to a single run.
#[derive(Clone, Default)]
pub struct HandlerSlot {
    handler: Arc<OnceLock<ControlHandler>>,
}

impl HandlerSlot {
    /// Creates an unbound slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the handler. Returns `false` if the slot was already bound.
    pub(crate) fn bind(&self, handler: ControlHandler) -> bool {
        self.handler.set(handler).is_ok()
    }

    /// Dispatches a request to the bound handler.
    ///
    /// Returns `false` when the handler is not yet bound; the request is
    /// dropped, which can only affect interrogation in the narrow window
    /// between registration and the first status report.
    pub fn dispatch(&self, request: ControlRequest) -> bool {
        match self.handler.get() {
            Some(handler) => {
                handler.handle(request);
                true
            }
            None => {
                warn!(
                    target: CONTROL_TARGET,
                    ?request,
                    "control request arrived before handler binding; dropped"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::signal::StopSignal;
    use crate::status::{
        PublishError, ServiceState, ServiceStatus, StatusReporter, StatusSink,
    };

    use super::{ControlHandler, ControlRequest, HandlerSlot};

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<ServiceStatus>>,
    }

    impl StatusSink for RecordingSink {
        fn publish(&self, status: &ServiceStatus) -> Result<(), PublishError> {
            self.published.lock().expect("sink lock").push(status.clone());
            Ok(())
        }
    }

    fn handler_fixture() -> (Arc<RecordingSink>, Arc<StopSignal>, ControlHandler) {
        let sink = Arc::new(RecordingSink::default());
        let reporter = StatusReporter::new(Arc::clone(&sink) as _);
        let stop = Arc::new(StopSignal::new());
        let handler = ControlHandler::new(reporter, Arc::clone(&stop), Duration::from_secs(3));
        (sink, stop, handler)
    }

    #[test]
    fn stop_reports_pending_then_signals_without_reporting_stopped() {
        let (sink, stop, handler) = handler_fixture();
        handler.handle(ControlRequest::Stop);
        assert!(stop.is_signalled());
        let published = sink.published.lock().expect("sink lock");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].current_state, ServiceState::StopPending);
    }

    #[test]
    fn interrogate_leaves_state_untouched() {
        let (sink, stop, handler) = handler_fixture();
        handler.handle(ControlRequest::Interrogate);
        assert!(!stop.is_signalled());
        assert!(sink.published.lock().expect("sink lock").is_empty());
    }

    #[test]
    fn unknown_codes_are_ignored() {
        let (sink, stop, handler) = handler_fixture();
        handler.handle(ControlRequest::Unknown(200));
        assert!(!stop.is_signalled());
        assert!(sink.published.lock().expect("sink lock").is_empty());
    }

    #[test]
    fn slot_drops_requests_until_bound() {
        let slot = HandlerSlot::new();
        assert!(!slot.dispatch(ControlRequest::Interrogate));
        let (_sink, stop, handler) = handler_fixture();
        assert!(slot.bind(handler));
        assert!(slot.dispatch(ControlRequest::Stop));
        assert!(stop.is_signalled());
    }
}
