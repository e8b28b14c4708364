//! Service database seam and record types.

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use warden_core::ServiceState;

/// How the manager launches the service at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Started on demand via an explicit start request.
    #[default]
    Demand,
    /// Started automatically at system boot.
    Automatic,
}

/// Input for creating a registration record.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    /// Internal service name the record is keyed by.
    pub name: String,
    /// Name shown in management tooling.
    pub display_name: String,
    /// Free-form description stored with the record.
    pub description: String,
    /// Executable the manager launches.
    pub executable: PathBuf,
    /// Boot-time start behaviour.
    pub start_mode: StartMode,
    /// Account the service runs under; `None` selects the local system
    /// account.
    pub account: Option<String>,
}

impl ServiceDefinition {
    /// Builds a demand-start definition pointing at the current executable.
    pub fn for_current_executable(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> io::Result<Self> {
        Ok(Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            executable: std::env::current_exe()?,
            start_mode: StartMode::default(),
            account: None,
        })
    }
}

/// Point-in-time view of a registration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Name shown in management tooling.
    pub display_name: String,
    /// Current run state recorded by the manager.
    pub current_state: ServiceState,
    /// Hosting process, when the service is running.
    pub process_id: Option<u32>,
    /// Forward-progress counter of an in-flight transition.
    pub checkpoint: u32,
    /// Advisory hang deadline in milliseconds.
    pub wait_hint_ms: u64,
}

/// Errors surfaced by service database adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseError {
    /// The caller lacks the rights the operation needs.
    #[error("access to the service database was denied")]
    PermissionDenied,
    /// A record with the same name already exists.
    #[error("a service with this name is already registered")]
    AlreadyExists,
    /// No record with the requested name exists.
    #[error("service is not registered")]
    NotFound,
    /// The record is already marked for deletion; the manager completes the
    /// removal once the last handle closes.
    #[error("service is marked for deletion")]
    MarkedForDeletion,
    /// The record exists but is not running, so controls cannot be
    /// delivered.
    #[error("service is not active")]
    NotActive,
    /// Any other manager failure, carrying the OS error code.
    #[error("service database operation failed (os error {code})")]
    Os {
        /// OS error code reported by the manager.
        code: u32,
    },
}

/// Connection to the manager's persisted service database.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceDatabase {
    /// Creates a registration record, returning a transient handle to it.
    fn create(&self, definition: &ServiceDefinition) -> Result<Box<dyn ServiceEntry>, DatabaseError>;

    /// Opens an existing record by name.
    fn open(&self, name: &str) -> Result<Box<dyn ServiceEntry>, DatabaseError>;
}

/// Transient handle to one registration record.
///
/// Handles are released when dropped, on every exit path.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceEntry {
    /// Reads the record's extended status.
    fn status(&self) -> Result<StatusSnapshot, DatabaseError>;

    /// Sends a stop control to the running service.
    fn send_stop(&self) -> Result<(), DatabaseError>;

    /// Deletes the record from the database.
    fn delete(&self) -> Result<(), DatabaseError>;
}
