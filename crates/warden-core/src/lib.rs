//! Core service control state machine for Warden.
//!
//! The crate models the contract between a long-running background service
//! and the OS service manager that supervises it: the status transitions the
//! service must report to stay recognised as healthy, the control requests
//! the manager delivers asynchronously, and the stop signalling that
//! coordinates graceful shutdown across threads.
//!
//! Everything here is platform-neutral. Host adapters bind the seams to a
//! concrete manager ABI:
//! - [`StatusSink`] publishes composed [`ServiceStatus`] snapshots through
//!   the handle obtained at registration.
//! - [`ControlRegistrar`] registers the control callback with the manager
//!   and hands back the publication sink.
//! - [`WorkUnit`] is the pluggable monitoring action the worker performs
//!   once per wake.
//!
//! [`ServiceRuntime`] wires the pieces together for one run: register the
//! handler, report the startup sequence, launch the worker, block until stop
//! is signalled, join the worker, and report the terminal status.

mod control;
mod lifecycle;
mod signal;
mod status;
mod worker;

pub use control::{ControlHandler, ControlRequest, HandlerSlot};
pub use lifecycle::{
    ControlRegistrar, LifecycleError, RegisterError, RunSummary, RuntimeOptions, ServiceRuntime,
};
pub use signal::{StopSignal, WaitOutcome};
pub use status::{
    AcceptedControls, NO_ERROR, PublishError, ServiceState, ServiceStatus, StatusReporter,
    StatusSink,
};
pub use worker::{WorkError, WorkUnit, WorkerExecutor, WorkerHandle, WorkerPanicked};
