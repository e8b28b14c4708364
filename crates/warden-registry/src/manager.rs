//! Install, uninstall, and query flows over the service database.

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use warden_core::ServiceState;

use crate::database::{DatabaseError, ServiceDatabase, ServiceDefinition, ServiceEntry, StatusSnapshot};

pub(crate) const MANAGER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::manager");

/// Result of an install request. Both variants are successes for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// A fresh registration record was created.
    Created,
    /// A record with the same name already existed; nothing was changed.
    AlreadyExists,
}

/// Result of an uninstall request. All variants are successes for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    /// The record was deleted.
    Removed,
    /// The manager will complete the removal once the last handle closes.
    MarkedForDeletion,
    /// No record existed; there was nothing to remove.
    NotInstalled,
}

/// Errors surfaced by registration operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The caller lacks the rights the operation needs; re-invoke elevated.
    #[error("insufficient privileges for the service database; re-run elevated")]
    PermissionDenied,
    /// The record does not exist.
    #[error("service '{name}' is not installed")]
    NotInstalled {
        /// Requested service name.
        name: String,
    },
    /// The service did not reach `Stopped` within the poll budget.
    #[error("service '{name}' did not stop within {attempts} status polls")]
    TimedOutWaitingForStop {
        /// Requested service name.
        name: String,
        /// Number of polls performed.
        attempts: u32,
    },
    /// Reading the record's status failed.
    #[error("failed to query service '{name}': {source}")]
    QueryFailed {
        /// Requested service name.
        name: String,
        /// Underlying database error.
        #[source]
        source: DatabaseError,
    },
    /// Any other database failure.
    #[error("service database error: {source}")]
    Database {
        /// Underlying database error.
        #[from]
        source: DatabaseError,
    },
}

/// Poll cadence for the uninstall stop wait.
///
/// Bounded by `max_attempts` so uninstall stays total-ordered and
/// terminating rather than looping forever on a wedged service.
#[derive(Debug, Clone, Copy)]
pub struct StopPollPolicy {
    /// Delay between status polls.
    pub interval: Duration,
    /// Maximum number of polls before giving up.
    pub max_attempts: u32,
}

impl Default for StopPollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

/// Out-of-process-lifecycle manager for the registration record.
///
/// Used at setup and teardown time only; the running service never touches
/// the database.
pub struct RegistrationManager<D> {
    database: D,
    poll: StopPollPolicy,
}

impl<D: ServiceDatabase> RegistrationManager<D> {
    /// Builds a manager with the default stop-poll policy.
    #[must_use]
    pub fn new(database: D) -> Self {
        Self {
            database,
            poll: StopPollPolicy::default(),
        }
    }

    /// Overrides the stop-poll cadence.
    #[must_use]
    pub fn with_poll_policy(mut self, poll: StopPollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Creates the registration record.
    ///
    /// An existing record with the same name is a soft success; the record
    /// is left untouched.
    pub fn install(&self, definition: &ServiceDefinition) -> Result<InstallOutcome, RegistryError> {
        match self.database.create(definition) {
            Ok(_entry) => {
                info!(
                    target: MANAGER_TARGET,
                    service = %definition.name,
                    executable = %definition.executable.display(),
                    "registration record created"
                );
                Ok(InstallOutcome::Created)
            }
            Err(DatabaseError::AlreadyExists) => {
                info!(
                    target: MANAGER_TARGET,
                    service = %definition.name,
                    "registration record already exists; nothing to do"
                );
                Ok(InstallOutcome::AlreadyExists)
            }
            Err(DatabaseError::PermissionDenied) => Err(RegistryError::PermissionDenied),
            Err(source) => Err(source.into()),
        }
    }

    /// Removes the registration record, stopping the service first when it
    /// is running.
    pub fn uninstall(&self, name: &str) -> Result<UninstallOutcome, RegistryError> {
        let entry = match self.database.open(name) {
            Ok(entry) => entry,
            Err(DatabaseError::NotFound) => {
                info!(target: MANAGER_TARGET, service = name, "not installed; nothing to remove");
                return Ok(UninstallOutcome::NotInstalled);
            }
            Err(DatabaseError::PermissionDenied) => return Err(RegistryError::PermissionDenied),
            Err(source) => return Err(source.into()),
        };
        self.stop_and_wait(name, entry.as_ref())?;
        match entry.delete() {
            Ok(()) => {
                info!(target: MANAGER_TARGET, service = name, "registration record deleted");
                Ok(UninstallOutcome::Removed)
            }
            Err(DatabaseError::MarkedForDeletion) => {
                info!(
                    target: MANAGER_TARGET,
                    service = name,
                    "record marked for deletion; manager completes removal"
                );
                Ok(UninstallOutcome::MarkedForDeletion)
            }
            Err(DatabaseError::PermissionDenied) => Err(RegistryError::PermissionDenied),
            Err(source) => Err(source.into()),
        }
    }

    /// Reads the record's extended status.
    pub fn query_status(&self, name: &str) -> Result<StatusSnapshot, RegistryError> {
        let entry = match self.database.open(name) {
            Ok(entry) => entry,
            Err(DatabaseError::NotFound) => {
                return Err(RegistryError::NotInstalled { name: name.into() });
            }
            Err(DatabaseError::PermissionDenied) => return Err(RegistryError::PermissionDenied),
            Err(source) => return Err(source.into()),
        };
        entry.status().map_err(|source| RegistryError::QueryFailed {
            name: name.into(),
            source,
        })
    }

    /// Sends a stop control when the service is running and polls until it
    /// reports `Stopped`, bounded by the poll policy.
    fn stop_and_wait(&self, name: &str, entry: &dyn ServiceEntry) -> Result<(), RegistryError> {
        let snapshot = self.query_entry(name, entry)?;
        if snapshot.current_state == ServiceState::Stopped {
            return Ok(());
        }
        match entry.send_stop() {
            // A service that stopped between the query and the control is
            // already where we want it.
            Ok(()) | Err(DatabaseError::NotActive) => {}
            Err(DatabaseError::PermissionDenied) => return Err(RegistryError::PermissionDenied),
            Err(source) => return Err(source.into()),
        }
        for attempt in 1..=self.poll.max_attempts {
            thread::sleep(self.poll.interval);
            let snapshot = self.query_entry(name, entry)?;
            if snapshot.current_state == ServiceState::Stopped {
                info!(target: MANAGER_TARGET, service = name, attempt, "service stopped");
                return Ok(());
            }
            debug!(
                target: MANAGER_TARGET,
                service = name,
                attempt,
                state = %snapshot.current_state,
                "waiting for service to stop"
            );
        }
        Err(RegistryError::TimedOutWaitingForStop {
            name: name.into(),
            attempts: self.poll.max_attempts,
        })
    }

    fn query_entry(
        &self,
        name: &str,
        entry: &dyn ServiceEntry,
    ) -> Result<StatusSnapshot, RegistryError> {
        entry.status().map_err(|source| RegistryError::QueryFailed {
            name: name.into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests;
