//! # Resolution Signals
//!
//! A [`Signal`] is a single-assignment, multi-waiter cell: the first `resolve` wins,
//! every later `resolve` returns `false` and leaves the value untouched, and any number
//! of threads may block on it and observe the same value.
//!
//! The response collector owns two of them (headers-ready and completion) and hands
//! out wait-only [`Observer`]s. Waiting threads can be woken early by an
//! [`Interrupter`], which is how a blocked test call is cancelled from outside.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

/// Result of a bounded, interruptible wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Resolved(T),
    TimedOut,
    Interrupted,
}

trait Wake: Send + Sync {
    fn wake(&self);
}

struct Slot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send> Wake for Slot<T> {
    fn wake(&self) {
        // Taking the lock orders the wake-up after a waiter's generation check.
        let _guard = self.lock();
        self.ready.notify_all();
    }
}

/// Single-assignment cell; the resolving side.
pub struct Signal<T> {
    slot: Arc<Slot<T>>,
}

impl<T: Clone + Send + 'static> Signal<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// Store `value` unless already resolved. Returns whether this call won.
    pub fn resolve(&self, value: T) -> bool {
        let mut guard = self.slot.lock();
        if guard.is_some() {
            return false;
        }
        *guard = Some(value);
        self.slot.ready.notify_all();
        true
    }

    /// Wait-only view sharing this signal's slot.
    #[must_use]
    pub fn observer(&self) -> Observer<T> {
        Observer {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait-only view of a [`Signal`].
#[derive(Clone)]
pub struct Observer<T> {
    slot: Arc<Slot<T>>,
}

impl<T: Clone + Send + 'static> Observer<T> {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Current value without blocking.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.slot.lock().clone()
    }

    /// Block up to `timeout` for the value.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        match self.wait_until(timeout, None) {
            WaitOutcome::Resolved(value) => Some(value),
            _ => None,
        }
    }

    /// Block up to `timeout` for the value, giving up early if `interrupter` fires.
    ///
    /// Only interruptions issued after this wait started count.
    #[must_use]
    pub fn wait_interruptible(&self, timeout: Duration, interrupter: &Interrupter) -> WaitOutcome<T> {
        let started_at = interrupter.generation();
        let waker: Arc<dyn Wake> = Arc::clone(&self.slot) as Arc<dyn Wake>;
        interrupter.register(Arc::downgrade(&waker));
        self.wait_until(timeout, Some((interrupter, started_at)))
    }

    fn wait_until(&self, timeout: Duration, interrupter: Option<(&Interrupter, u64)>) -> WaitOutcome<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.slot.lock();
        loop {
            if let Some(value) = guard.as_ref() {
                return WaitOutcome::Resolved(value.clone());
            }
            if interrupter.is_some_and(|(i, started_at)| i.generation() != started_at) {
                return WaitOutcome::Interrupted;
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    deadline - now
                }
                // Bound too large to represent: wait in long slices
                None => Duration::from_secs(3600),
            };
            guard = self
                .slot
                .ready
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

#[derive(Default)]
struct InterruptState {
    /// Bumped by every `interrupt()`; a wait fires when it moves past its start value
    generation: AtomicU64,
    waiters: Mutex<Vec<Weak<dyn Wake>>>,
}

/// Cross-thread interruption handle for blocked waits.
///
/// Clones share state. `interrupt()` cancels every wait in progress at that moment and
/// has no effect on waits started afterwards.
#[derive(Clone, Default)]
pub struct Interrupter {
    state: Arc<InterruptState>,
}

impl Interrupter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        let waiters: Vec<Arc<dyn Wake>> = self
            .lock_waiters()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for waiter in waiters {
            waiter.wake();
        }
    }

    /// Number of interruptions issued so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::SeqCst)
    }

    fn register(&self, waiter: Weak<dyn Wake>) {
        let mut waiters = self.lock_waiters();
        waiters.retain(|w| w.strong_count() > 0);
        waiters.push(waiter);
    }

    fn lock_waiters(&self) -> MutexGuard<'_, Vec<Weak<dyn Wake>>> {
        self.state
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupter")
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_first_resolution_wins() {
        let signal = Signal::new();
        assert!(signal.resolve(1));
        assert!(!signal.resolve(2));
        assert_eq!(signal.observer().peek(), Some(1));
    }

    #[test]
    fn test_all_waiters_observe_same_value() {
        let signal: Signal<&'static str> = Signal::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let observer = signal.observer();
                thread::spawn(move || observer.wait_timeout(Duration::from_secs(5)))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        signal.resolve("done");
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Some("done"));
        }
    }

    #[test]
    fn test_wait_times_out() {
        let signal: Signal<u8> = Signal::new();
        let started = Instant::now();
        assert_eq!(signal.observer().wait_timeout(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_interrupt_wakes_every_waiter_in_progress() {
        let signal: Signal<u8> = Signal::new();
        let interrupter = Interrupter::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let observer = signal.observer();
                let remote = interrupter.clone();
                thread::spawn(move || observer.wait_interruptible(Duration::from_secs(30), &remote))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        interrupter.interrupt();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), WaitOutcome::Interrupted);
        }
        assert_eq!(interrupter.generation(), 1);
    }

    #[test]
    fn test_interrupt_before_wait_is_ignored() {
        let signal: Signal<u8> = Signal::new();
        let interrupter = Interrupter::new();
        interrupter.interrupt();

        let observer = signal.observer();
        let remote = interrupter.clone();
        let handle = thread::spawn(move || observer.wait_interruptible(Duration::from_secs(5), &remote));
        thread::sleep(Duration::from_millis(20));
        signal.resolve(3);
        assert_eq!(handle.join().unwrap(), WaitOutcome::Resolved(3));
    }

    #[test]
    fn test_resolved_value_wins_over_earlier_interrupt() {
        let signal = Signal::new();
        signal.resolve(7u8);
        let interrupter = Interrupter::new();
        interrupter.interrupt();
        assert_eq!(
            signal
                .observer()
                .wait_interruptible(Duration::from_millis(10), &interrupter),
            WaitOutcome::Resolved(7)
        );
    }
}
