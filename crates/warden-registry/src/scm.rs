//! Service Control Manager backend for the registration database.
//!
//! Compiled on Windows only; every other platform drives the traits in
//! [`crate::database`] with test doubles instead.

use std::ffi::OsString;

use tracing::warn;
use windows_service::service::{
    Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceState,
    ServiceType,
};
use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};

use crate::database::{
    DatabaseError, ServiceDatabase, ServiceDefinition, ServiceEntry, StartMode, StatusSnapshot,
};

const SCM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scm");

const ERROR_ACCESS_DENIED: i32 = 5;
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;
const ERROR_SERVICE_MARKED_FOR_DELETE: i32 = 1072;
const ERROR_SERVICE_EXISTS: i32 = 1073;

/// Service database backed by the local Service Control Manager.
pub struct ScmDatabase;

impl ScmDatabase {
    /// Connects lazily; each operation opens its own manager handle with the
    /// narrowest access rights it needs.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn connect(access: ServiceManagerAccess) -> Result<ServiceManager, DatabaseError> {
        ServiceManager::local_computer(None::<&str>, access).map_err(map_error)
    }
}

impl Default for ScmDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDatabase for ScmDatabase {
    fn create(
        &self,
        definition: &ServiceDefinition,
    ) -> Result<Box<dyn ServiceEntry>, DatabaseError> {
        let manager =
            Self::connect(ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE)?;
        let info = ServiceInfo {
            name: OsString::from(&definition.name),
            display_name: OsString::from(&definition.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: start_type(definition.start_mode),
            error_control: ServiceErrorControl::Normal,
            executable_path: definition.executable.clone(),
            launch_arguments: vec![],
            dependencies: vec![],
            account_name: definition.account.as_ref().map(OsString::from),
            account_password: None,
        };
        let service = manager
            .create_service(&info, ServiceAccess::CHANGE_CONFIG | ServiceAccess::QUERY_CONFIG)
            .map_err(map_error)?;
        // The record is usable without a description; failing here would
        // leave a half-installed service behind.
        if let Err(error) = service.set_description(&definition.description) {
            warn!(
                target: SCM_TARGET,
                service = %definition.name,
                %error,
                "failed to set service description"
            );
        }
        Ok(Box::new(ScmEntry {
            service,
            display_name: definition.display_name.clone(),
        }))
    }

    fn open(&self, name: &str) -> Result<Box<dyn ServiceEntry>, DatabaseError> {
        let manager = Self::connect(ServiceManagerAccess::CONNECT)?;
        let service = manager
            .open_service(
                name,
                ServiceAccess::QUERY_CONFIG
                    | ServiceAccess::QUERY_STATUS
                    | ServiceAccess::STOP
                    | ServiceAccess::DELETE,
            )
            .map_err(map_error)?;
        let display_name = service
            .query_config()
            .map(|config| config.display_name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| name.to_owned());
        Ok(Box::new(ScmEntry {
            service,
            display_name,
        }))
    }
}

/// Open handle to one registered service.
struct ScmEntry {
    service: Service,
    display_name: String,
}

impl ServiceEntry for ScmEntry {
    fn status(&self) -> Result<StatusSnapshot, DatabaseError> {
        let status = self.service.query_status().map_err(map_error)?;
        Ok(StatusSnapshot {
            display_name: self.display_name.clone(),
            current_state: map_state(status.current_state),
            process_id: status.process_id,
            checkpoint: status.checkpoint,
            wait_hint_ms: status.wait_hint.as_millis().min(u128::from(u64::MAX)) as u64,
        })
    }

    fn send_stop(&self) -> Result<(), DatabaseError> {
        self.service.stop().map(|_| ()).map_err(map_error)
    }

    fn delete(&self) -> Result<(), DatabaseError> {
        self.service.delete().map_err(map_error)
    }
}

fn start_type(mode: StartMode) -> ServiceStartType {
    match mode {
        StartMode::Demand => ServiceStartType::OnDemand,
        StartMode::Automatic => ServiceStartType::AutoStart,
    }
}

fn map_state(state: ServiceState) -> warden_core::ServiceState {
    match state {
        ServiceState::Stopped => warden_core::ServiceState::Stopped,
        ServiceState::StartPending => warden_core::ServiceState::StartPending,
        ServiceState::StopPending => warden_core::ServiceState::StopPending,
        ServiceState::Running => warden_core::ServiceState::Running,
        ServiceState::ContinuePending => warden_core::ServiceState::ContinuePending,
        ServiceState::PausePending => warden_core::ServiceState::PausePending,
        ServiceState::Paused => warden_core::ServiceState::Paused,
    }
}

fn map_error(error: windows_service::Error) -> DatabaseError {
    let windows_service::Error::Winapi(io_error) = error else {
        return DatabaseError::Os { code: 0 };
    };
    match io_error.raw_os_error() {
        Some(ERROR_ACCESS_DENIED) => DatabaseError::PermissionDenied,
        Some(ERROR_SERVICE_EXISTS) => DatabaseError::AlreadyExists,
        Some(ERROR_SERVICE_DOES_NOT_EXIST) => DatabaseError::NotFound,
        Some(ERROR_SERVICE_MARKED_FOR_DELETE) => DatabaseError::MarkedForDeletion,
        Some(ERROR_SERVICE_NOT_ACTIVE) => DatabaseError::NotActive,
        Some(code) => DatabaseError::Os {
            code: code.unsigned_abs(),
        },
        None => DatabaseError::Os { code: 0 },
    }
}
