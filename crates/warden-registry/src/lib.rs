//! Service registration management for Warden.
//!
//! The registration record lives in the OS service database, not in files
//! owned by this process; everything here holds only transient handles to
//! it. [`RegistrationManager`] implements the install/uninstall/query flows
//! over the [`ServiceDatabase`] seam so they can be exercised without an OS
//! service manager present. The Windows adapter binds the seam to the
//! Service Control Manager.

mod database;
mod manager;
#[cfg(windows)]
mod scm;

pub use database::{
    DatabaseError, ServiceDatabase, ServiceDefinition, ServiceEntry, StartMode, StatusSnapshot,
};
pub use manager::{
    InstallOutcome, RegistrationManager, RegistryError, StopPollPolicy, UninstallOutcome,
};
#[cfg(windows)]
pub use scm::ScmDatabase;
