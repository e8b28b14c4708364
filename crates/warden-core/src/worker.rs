//! Supervised worker execution.
//!
//! The worker runs the pluggable unit of work on a dedicated thread. Each
//! pass waits on the stop signal with a bounded timeout; a timeout means one
//! work-iteration, a signalled wait means a clean exit. Iteration failures
//! are isolated at the loop boundary and never end the run.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::signal::{StopSignal, WaitOutcome};

pub(crate) const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

const PROGRESS_LOG_EVERY: u64 = 10;

/// Error produced by one work-iteration.
pub type WorkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One pluggable unit of monitoring work, invoked once per wake.
///
/// An iteration runs to completion once started; there is no intra-iteration
/// cancellation. A returned error is logged and the loop continues.
pub trait WorkUnit: Send + 'static {
    /// Performs the work for the given 1-based iteration number.
    fn run_iteration(&mut self, iteration: u64) -> Result<(), WorkError>;
}

impl<F> WorkUnit for F
where
    F: FnMut(u64) -> Result<(), WorkError> + Send + 'static,
{
    fn run_iteration(&mut self, iteration: u64) -> Result<(), WorkError> {
        self(iteration)
    }
}

/// Raised when the worker thread panicked before completing its loop.
#[derive(Debug, Error)]
#[error("worker thread panicked before completing its loop")]
pub struct WorkerPanicked;

/// Handle to the running worker thread.
pub struct WorkerHandle {
    thread: JoinHandle<u64>,
}

impl WorkerHandle {
    /// Joins the worker, returning the number of completed iteration
    /// attempts.
    pub fn join(self) -> Result<u64, WorkerPanicked> {
        self.thread.join().map_err(|_panic| WorkerPanicked)
    }
}

/// Runs a [`WorkUnit`] until the stop signal is observed.
pub struct WorkerExecutor<W> {
    work: W,
    stop: Arc<StopSignal>,
    interval: Duration,
}

impl<W: WorkUnit> WorkerExecutor<W> {
    /// Builds an executor polling the stop signal at the given interval.
    #[must_use]
    pub fn new(work: W, stop: Arc<StopSignal>, interval: Duration) -> Self {
        Self {
            work,
            stop,
            interval,
        }
    }

    /// Runs the loop on the calling thread, returning the iteration count.
    ///
    /// With the signal already set, the first wait returns immediately and
    /// zero iterations occur.
    pub fn run(mut self) -> u64 {
        debug!(
            target: WORKER_TARGET,
            interval_ms = self.interval.as_millis() as u64,
            "worker loop started"
        );
        let mut iterations: u64 = 0;
        while self.stop.wait_timeout(self.interval) == WaitOutcome::TimedOut {
            iterations += 1;
            match self.work.run_iteration(iterations) {
                Ok(()) => {
                    trace!(target: WORKER_TARGET, iteration = iterations, "work iteration completed");
                }
                Err(error) => {
                    warn!(
                        target: WORKER_TARGET,
                        iteration = iterations,
                        error = %error,
                        "work iteration failed; loop continues"
                    );
                }
            }
            if iterations % PROGRESS_LOG_EVERY == 0 {
                info!(target: WORKER_TARGET, iterations, "worker still running");
            }
        }
        info!(target: WORKER_TARGET, iterations, "worker loop exiting on stop signal");
        iterations
    }

    /// Launches the loop on a dedicated named thread.
    pub fn spawn(self) -> io::Result<WorkerHandle> {
        let thread = thread::Builder::new()
            .name(String::from("warden-worker"))
            .spawn(move || self.run())?;
        Ok(WorkerHandle { thread })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use crate::signal::StopSignal;

    use super::{WorkError, WorkerExecutor};

    const TEST_INTERVAL: Duration = Duration::from_millis(5);

    #[test]
    fn pre_signalled_stop_runs_zero_iterations() {
        let stop = Arc::new(StopSignal::new());
        stop.signal();
        let attempts = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&attempts);
        let executor = WorkerExecutor::new(
            move |_iteration| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            stop,
            TEST_INTERVAL,
        );
        assert_eq!(executor.run(), 0);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_after_third_window_yields_exactly_three_iterations() {
        let stop = Arc::new(StopSignal::new());
        let signal = Arc::clone(&stop);
        let executor = WorkerExecutor::new(
            move |iteration| {
                if iteration == 3 {
                    signal.signal();
                }
                Ok(())
            },
            Arc::clone(&stop),
            TEST_INTERVAL,
        );
        assert_eq!(executor.run(), 3);
    }

    #[test]
    fn iteration_failures_do_not_end_the_loop() {
        let stop = Arc::new(StopSignal::new());
        let signal = Arc::clone(&stop);
        let attempts = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&attempts);
        let executor = WorkerExecutor::new(
            move |iteration| {
                counter.fetch_add(1, Ordering::SeqCst);
                if iteration == 4 {
                    signal.signal();
                    return Ok(());
                }
                if iteration == 2 {
                    return Err(WorkError::from("heartbeat target unreachable"));
                }
                Ok(())
            },
            Arc::clone(&stop),
            TEST_INTERVAL,
        );
        // The failure on iteration 2 is isolated; the loop still advances
        // through iterations 3 and 4.
        assert_eq!(executor.run(), 4);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn spawned_worker_joins_with_iteration_count() {
        let stop = Arc::new(StopSignal::new());
        let signal = Arc::clone(&stop);
        let executor = WorkerExecutor::new(
            move |iteration| {
                if iteration == 2 {
                    signal.signal();
                }
                Ok(())
            },
            Arc::clone(&stop),
            TEST_INTERVAL,
        );
        let handle = executor.spawn().expect("spawn worker");
        assert_eq!(handle.join().expect("join worker"), 2);
    }

    #[test]
    fn panicking_work_unit_surfaces_on_join() {
        let stop = Arc::new(StopSignal::new());
        let executor = WorkerExecutor::new(
            |_iteration| -> Result<(), WorkError> { panic!("work unit defect") },
            Arc::clone(&stop),
            TEST_INTERVAL,
        );
        let handle = executor.spawn().expect("spawn worker");
        assert!(handle.join().is_err());
    }
}
