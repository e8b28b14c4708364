//! Registration manager flows against an in-memory database double.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;
use warden_core::ServiceState;

use crate::database::{
    DatabaseError, MockServiceDatabase, MockServiceEntry, ServiceDatabase, ServiceDefinition,
    ServiceEntry, StartMode, StatusSnapshot,
};

use super::{InstallOutcome, RegistrationManager, RegistryError, StopPollPolicy, UninstallOutcome};

fn definition(name: &str) -> ServiceDefinition {
    ServiceDefinition {
        name: name.into(),
        display_name: format!("{name} display"),
        description: String::from("test service"),
        executable: std::path::PathBuf::from("/opt/warden/wardend"),
        start_mode: StartMode::Demand,
        account: None,
    }
}

fn fast_poll() -> StopPollPolicy {
    StopPollPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 3,
    }
}

/// One record in the in-memory service database.
struct FakeService {
    display_name: String,
    state: Mutex<ServiceState>,
    // Status polls a stop takes to land; `None` leaves the state wedged.
    stop_latency: Option<u32>,
    polls_remaining: Mutex<Option<u32>>,
    stop_requests: AtomicU32,
    deleted: AtomicBool,
    delete_error: Option<DatabaseError>,
}

impl FakeService {
    fn new(display_name: &str, state: ServiceState, stop_latency: Option<u32>) -> Self {
        Self {
            display_name: display_name.into(),
            state: Mutex::new(state),
            stop_latency,
            polls_remaining: Mutex::new(None),
            stop_requests: AtomicU32::new(0),
            deleted: AtomicBool::new(false),
            delete_error: None,
        }
    }
}

struct FakeEntry(Arc<FakeService>);

impl ServiceEntry for FakeEntry {
    fn status(&self) -> Result<StatusSnapshot, DatabaseError> {
        let mut remaining = self.0.polls_remaining.lock().expect("polls lock");
        if let Some(left) = remaining.as_mut() {
            if *left > 0 {
                *left -= 1;
            }
            if *left == 0 {
                *self.0.state.lock().expect("state lock") = ServiceState::Stopped;
            }
        }
        let state = *self.0.state.lock().expect("state lock");
        Ok(StatusSnapshot {
            display_name: self.0.display_name.clone(),
            current_state: state,
            process_id: (state == ServiceState::Running).then_some(4242),
            checkpoint: 0,
            wait_hint_ms: 0,
        })
    }

    fn send_stop(&self) -> Result<(), DatabaseError> {
        self.0.stop_requests.fetch_add(1, Ordering::SeqCst);
        *self.0.polls_remaining.lock().expect("polls lock") = self.0.stop_latency;
        Ok(())
    }

    fn delete(&self) -> Result<(), DatabaseError> {
        if let Some(error) = &self.0.delete_error {
            return Err(error.clone());
        }
        self.0.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeDatabase {
    services: Mutex<HashMap<String, Arc<FakeService>>>,
}

impl FakeDatabase {
    fn with_service(service: FakeService) -> (Self, Arc<FakeService>) {
        let service = Arc::new(service);
        let database = Self::default();
        database
            .services
            .lock()
            .expect("services lock")
            .insert(service.display_name.clone(), Arc::clone(&service));
        (database, service)
    }
}

impl ServiceDatabase for FakeDatabase {
    fn create(
        &self,
        definition: &ServiceDefinition,
    ) -> Result<Box<dyn ServiceEntry>, DatabaseError> {
        let mut services = self.services.lock().expect("services lock");
        if services.contains_key(&definition.name) {
            return Err(DatabaseError::AlreadyExists);
        }
        let service = Arc::new(FakeService::new(
            &definition.display_name,
            ServiceState::Stopped,
            None,
        ));
        services.insert(definition.name.clone(), Arc::clone(&service));
        Ok(Box::new(FakeEntry(service)))
    }

    fn open(&self, name: &str) -> Result<Box<dyn ServiceEntry>, DatabaseError> {
        self.services
            .lock()
            .expect("services lock")
            .get(name)
            .map(|service| Box::new(FakeEntry(Arc::clone(service))) as Box<dyn ServiceEntry>)
            .ok_or(DatabaseError::NotFound)
    }
}

#[test]
fn install_twice_reports_created_then_already_exists() {
    let manager = RegistrationManager::new(FakeDatabase::default());
    let definition = definition("warden-test");
    assert_eq!(
        manager.install(&definition).expect("first install"),
        InstallOutcome::Created
    );
    assert_eq!(
        manager.install(&definition).expect("second install"),
        InstallOutcome::AlreadyExists
    );
}

#[test]
fn uninstall_of_missing_service_is_a_soft_success() {
    let manager = RegistrationManager::new(FakeDatabase::default());
    assert_eq!(
        manager.uninstall("absent").expect("uninstall"),
        UninstallOutcome::NotInstalled
    );
}

#[test]
fn uninstall_stops_a_running_service_before_deleting() {
    let (database, service) = FakeDatabase::with_service(FakeService::new(
        "running-svc",
        ServiceState::Running,
        Some(2),
    ));
    let manager = RegistrationManager::new(database).with_poll_policy(fast_poll());
    assert_eq!(
        manager.uninstall("running-svc").expect("uninstall"),
        UninstallOutcome::Removed
    );
    assert_eq!(service.stop_requests.load(Ordering::SeqCst), 1);
    assert!(service.deleted.load(Ordering::SeqCst));
}

#[test]
fn uninstall_of_stopped_service_sends_no_stop() {
    let (database, service) = FakeDatabase::with_service(FakeService::new(
        "stopped-svc",
        ServiceState::Stopped,
        None,
    ));
    let manager = RegistrationManager::new(database).with_poll_policy(fast_poll());
    assert_eq!(
        manager.uninstall("stopped-svc").expect("uninstall"),
        UninstallOutcome::Removed
    );
    assert_eq!(service.stop_requests.load(Ordering::SeqCst), 0);
}

#[test]
fn uninstall_gives_up_after_the_poll_budget() {
    let (database, service) = FakeDatabase::with_service(FakeService::new(
        "wedged-svc",
        ServiceState::Running,
        None,
    ));
    let manager = RegistrationManager::new(database).with_poll_policy(fast_poll());
    let error = manager
        .uninstall("wedged-svc")
        .expect_err("uninstall must time out");
    let RegistryError::TimedOutWaitingForStop { name, attempts } = &error else {
        panic!("expected TimedOutWaitingForStop, got {error:?}");
    };
    assert_eq!(name, "wedged-svc");
    assert_eq!(*attempts, 3);
    assert!(!service.deleted.load(Ordering::SeqCst));
}

#[test]
fn uninstall_treats_marked_for_deletion_as_success() {
    let mut service = FakeService::new("lingering-svc", ServiceState::Stopped, None);
    service.delete_error = Some(DatabaseError::MarkedForDeletion);
    let (database, _service) = FakeDatabase::with_service(service);
    let manager = RegistrationManager::new(database).with_poll_policy(fast_poll());
    assert_eq!(
        manager.uninstall("lingering-svc").expect("uninstall"),
        UninstallOutcome::MarkedForDeletion
    );
}

#[rstest]
#[case::install(true)]
#[case::uninstall(false)]
fn permission_denied_is_surfaced_without_retry(#[case] installing: bool) {
    let mut database = MockServiceDatabase::new();
    if installing {
        database
            .expect_create()
            .times(1)
            .returning(|_| Err(DatabaseError::PermissionDenied));
    } else {
        database
            .expect_open()
            .times(1)
            .returning(|_| Err(DatabaseError::PermissionDenied));
    }
    let manager = RegistrationManager::new(database);
    let result = if installing {
        manager.install(&definition("denied")).map(|_| ())
    } else {
        manager.uninstall("denied").map(|_| ())
    };
    assert!(matches!(result, Err(RegistryError::PermissionDenied)));
}

#[test]
fn query_status_returns_the_extended_snapshot() {
    let mut database = MockServiceDatabase::new();
    database.expect_open().returning(|_| {
        let mut entry = MockServiceEntry::new();
        entry.expect_status().returning(|| {
            Ok(StatusSnapshot {
                display_name: String::from("Warden Watchdog"),
                current_state: ServiceState::Running,
                process_id: Some(1234),
                checkpoint: 0,
                wait_hint_ms: 0,
            })
        });
        Ok(Box::new(entry))
    });
    let manager = RegistrationManager::new(database);
    let snapshot = manager.query_status("wardend").expect("query");
    assert_eq!(snapshot.current_state, ServiceState::Running);
    assert_eq!(snapshot.process_id, Some(1234));
}

#[test]
fn query_status_distinguishes_not_installed_from_query_failure() {
    let mut database = MockServiceDatabase::new();
    database
        .expect_open()
        .returning(|_| Err(DatabaseError::NotFound));
    let manager = RegistrationManager::new(database);
    assert!(matches!(
        manager.query_status("absent"),
        Err(RegistryError::NotInstalled { .. })
    ));

    let mut database = MockServiceDatabase::new();
    database.expect_open().returning(|_| {
        let mut entry = MockServiceEntry::new();
        entry
            .expect_status()
            .returning(|| Err(DatabaseError::Os { code: 1053 }));
        Ok(Box::new(entry))
    });
    let manager = RegistrationManager::new(database);
    assert!(matches!(
        manager.query_status("broken"),
        Err(RegistryError::QueryFailed { .. })
    ));
}
