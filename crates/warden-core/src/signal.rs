//! Cross-thread stop signalling.
//!
//! [`StopSignal`] is a manual-reset event: once set it stays set and every
//! current and future waiter observes it immediately. It is the only shared
//! mutable state between the control handler, the orchestrator's main
//! thread, and the worker loop.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

pub(crate) const SIGNAL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::signal");

/// Result of a bounded wait on the stop signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The signal was set before the timeout elapsed.
    Signaled,
    /// The timeout elapsed with the signal still unset.
    TimedOut,
}

/// Manual-reset shutdown event shared across execution contexts.
///
/// The control handler is the single writer; the worker loop polls with a
/// bounded wait and the orchestrator blocks unboundedly. The signal lives
/// for exactly one service run.
#[derive(Debug, Default)]
pub struct StopSignal {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal and wakes every waiter. Idempotent.
    pub fn signal(&self) {
        let mut signalled = self.lock();
        if !*signalled {
            *signalled = true;
            debug!(target: SIGNAL_TARGET, "stop signal set");
        }
        drop(signalled);
        self.condvar.notify_all();
    }

    /// Returns whether the signal has been set.
    #[must_use]
    pub fn is_signalled(&self) -> bool {
        *self.lock()
    }

    /// Blocks until the signal is set.
    pub fn wait(&self) {
        let mut signalled = self.lock();
        while !*signalled {
            signalled = self
                .condvar
                .wait(signalled)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Waits for the signal with an upper bound.
    ///
    /// Returns [`WaitOutcome::Signaled`] immediately when the signal is
    /// already set, so no wakeup can be lost between a `signal` call and a
    /// subsequent wait.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut signalled = self.lock();
        while !*signalled {
            let now = Instant::now();
            let Some(remaining) = deadline.checked_duration_since(now).filter(|d| !d.is_zero())
            else {
                return WaitOutcome::TimedOut;
            };
            let (guard, _timed_out) = self
                .condvar
                .wait_timeout(signalled, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            signalled = guard;
        }
        WaitOutcome::Signaled
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, bool> {
        // A poisoned lock means a waiter panicked; the boolean is still
        // coherent, so shutdown signalling keeps working.
        self.signalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
