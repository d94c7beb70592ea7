//! Process-wide termination token
//!
//! A [`Terminator`] is cloned into every long-running loop. Terminating it is
//! idempotent: the first call records the error, wakes every sleeper and
//! runs the registered cleanup actions once, most recent first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

type Action = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
    error: Option<String>,
    actions: Vec<Action>,
}

#[derive(Default)]
struct Inner {
    terminating: AtomicBool,
    state: Mutex<State>,
    wake: Condvar,
}

/// Cloneable cancellation token with ordered cleanup actions
#[derive(Clone, Default)]
pub struct Terminator {
    inner: Arc<Inner>,
}

impl Terminator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination, optionally recording why
    ///
    /// Only the first call stores its error and runs the cleanup actions.
    pub fn terminate(&self, err: Option<String>) {
        let actions = {
            let mut state = self.inner.state.lock();
            if let Some(ref e) = err {
                error!("{}", e);
            }
            if self.inner.terminating.swap(true, Ordering::SeqCst) {
                return;
            }
            info!("Terminating");
            state.error = err;
            std::mem::take(&mut state.actions)
        };
        self.inner.wake.notify_all();

        debug!("Running {} cleanup action(s)", actions.len());
        for action in actions.into_iter().rev() {
            action();
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.inner.terminating.load(Ordering::SeqCst)
    }

    /// Register a cleanup action; runs it immediately if already terminated
    pub fn on_terminate<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if self.is_terminating() {
            drop(state);
            action();
            return;
        }
        state.actions.push(Box::new(action));
    }

    /// Sleep for `duration` unless terminated first
    ///
    /// Returns `true` if the full duration elapsed, `false` on termination.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.inner.state.lock();
        while !self.is_terminating() {
            if self.inner.wake.wait_until(&mut state, deadline).timed_out() {
                return !self.is_terminating();
            }
        }
        false
    }

    /// Error recorded by the first `terminate` call
    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }
}

impl std::fmt::Debug for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminator")
            .field("terminating", &self.is_terminating())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_terminate_is_idempotent() {
        let terminator = Terminator::new();
        let runs = Arc::new(Mutex::new(0));
        let counter = runs.clone();
        terminator.on_terminate(move || *counter.lock() += 1);

        terminator.terminate(Some("first".into()));
        terminator.terminate(Some("second".into()));
        terminator.terminate(None);

        assert!(terminator.is_terminating());
        assert_eq!(*runs.lock(), 1);
        assert_eq!(terminator.error().as_deref(), Some("first"));
    }

    #[test]
    fn test_clean_termination_has_no_error() {
        let terminator = Terminator::new();
        terminator.terminate(None);
        assert!(terminator.error().is_none());
    }

    #[test]
    fn test_actions_run_in_reverse_order() {
        let terminator = Terminator::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            terminator.on_terminate(move || order.lock().push(i));
        }
        terminator.terminate(None);
        assert_eq!(*order.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn test_late_action_runs_immediately() {
        let terminator = Terminator::new();
        terminator.terminate(None);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        terminator.on_terminate(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_sleep_completes() {
        let terminator = Terminator::new();
        assert!(terminator.sleep(Duration::from_millis(20)));
    }

    #[test]
    fn test_sleep_wakes_on_terminate() {
        let terminator = Terminator::new();
        let sleeper = terminator.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(50));
        terminator.terminate(None);

        assert!(!handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_after_terminate_returns_at_once() {
        let terminator = Terminator::new();
        terminator.terminate(None);
        assert!(!terminator.sleep(Duration::from_secs(30)));
    }
}
