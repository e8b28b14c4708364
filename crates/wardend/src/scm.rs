//! Service Control Manager run mode.
//!
//! Connects the binary to the manager's dispatcher and adapts the manager's
//! control callbacks and status handle to the runtime's seams. Compiled on
//! Windows only.

use std::ffi::OsString;
use std::sync::Arc;

use tracing::error;
use warden_core::{
    ControlRegistrar, ControlRequest, HandlerSlot, PublishError, RegisterError, RuntimeOptions,
    ServiceRuntime, StatusSink,
};
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
    ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult,
    ServiceStatusHandle};
use windows_service::{define_windows_service, service_dispatcher};

use crate::service::{self, HeartbeatWork};

const SCM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scm");

/// Raised by the dispatcher when the process was not started as a service.
pub(crate) const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: u32 = 1063;

define_windows_service!(ffi_service_main, service_main);

/// Hands the calling thread to the manager's dispatcher.
///
/// Blocks until the service run completes; a failure to connect means the
/// process was launched from a console rather than by the manager.
pub(crate) fn dispatch() -> Result<(), u32> {
    service_dispatcher::start(service::SERVICE_NAME, ffi_service_main).map_err(|error| raw_code(&error))
}

fn service_main(_arguments: Vec<OsString>) {
    let runtime = ServiceRuntime::new(RuntimeOptions::default());
    if let Err(error) = runtime.run(&ScmRegistrar, HeartbeatWork) {
        error!(target: SCM_TARGET, %error, "service run failed");
    }
}

/// Registers the control callback with the manager for one run.
struct ScmRegistrar;

impl ControlRegistrar for ScmRegistrar {
    fn register(&self, slot: HandlerSlot) -> Result<Arc<dyn StatusSink>, RegisterError> {
        let handle =
            service_control_handler::register(service::SERVICE_NAME, move |control| match control {
                ServiceControl::Stop => {
                    slot.dispatch(ControlRequest::Stop);
                    ServiceControlHandlerResult::NoError
                }
                ServiceControl::Interrogate => {
                    slot.dispatch(ControlRequest::Interrogate);
                    ServiceControlHandlerResult::NoError
                }
                _ => ServiceControlHandlerResult::NotImplemented,
            })
            .map_err(|error| RegisterError {
                code: raw_code(&error),
                message: error.to_string(),
            })?;
        Ok(Arc::new(ScmSink { handle }))
    }
}

/// Publishes status snapshots through the manager's status handle.
struct ScmSink {
    handle: ServiceStatusHandle,
}

impl StatusSink for ScmSink {
    fn publish(&self, status: &warden_core::ServiceStatus) -> Result<(), PublishError> {
        self.handle
            .set_service_status(convert(status))
            .map_err(|error| PublishError {
                code: raw_code(&error),
                message: error.to_string(),
            })
    }
}

fn convert(status: &warden_core::ServiceStatus) -> ServiceStatus {
    ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: state(status.current_state),
        controls_accepted: if status.accepted_controls.stop {
            ServiceControlAccept::STOP
        } else {
            ServiceControlAccept::empty()
        },
        exit_code: ServiceExitCode::Win32(status.exit_code),
        checkpoint: status.checkpoint,
        wait_hint: status.wait_hint,
        process_id: None,
    }
}

fn state(state: warden_core::ServiceState) -> ServiceState {
    match state {
        warden_core::ServiceState::Stopped => ServiceState::Stopped,
        warden_core::ServiceState::StartPending => ServiceState::StartPending,
        warden_core::ServiceState::StopPending => ServiceState::StopPending,
        warden_core::ServiceState::Running => ServiceState::Running,
        warden_core::ServiceState::ContinuePending => ServiceState::ContinuePending,
        warden_core::ServiceState::PausePending => ServiceState::PausePending,
        warden_core::ServiceState::Paused => ServiceState::Paused,
    }
}

fn raw_code(error: &windows_service::Error) -> u32 {
    let windows_service::Error::Winapi(io_error) = error else {
        return 1;
    };
    io_error.raw_os_error().map_or(1, |code| code.unsigned_abs())
}
