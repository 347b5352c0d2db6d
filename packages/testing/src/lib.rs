#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and benchmarks in the allocator and container packages.

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tiered_alloc::TypeTraits;

/// Runs a test with a timeout to prevent infinite hangs.
///
/// Out-of-memory retry loops spin until memory appears; a broken test setup would hang them
/// forever. This runs the closure on a separate thread and fails the test if it takes longer
/// than 10 seconds (60 seconds under Miri).
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test function is executed directly, so that mutation testing can detect hangs itself.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode) or if the test
/// itself panics.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {timeout:?} timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected unexpectedly"),
            Err(e) => panic::resume_unwind(e),
        },
    }
}

#[derive(Debug, Default)]
struct CounterState {
    live: Cell<usize>,
    clones: Cell<usize>,
    drops: Cell<usize>,

    // Clones remaining until the injected failure, counting the failing one.
    clones_until_panic: Cell<Option<usize>>,
}

/// Shared counters observed by a family of [`Tracked`] values.
///
/// Cloning a `Counters` yields another view of the same counters.
#[derive(Clone, Debug, Default)]
pub struct Counters {
    state: Rc<CounterState>,
}

impl Counters {
    /// Creates a fresh set of counters, all zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked values currently alive.
    #[must_use]
    pub fn live(&self) -> usize {
        self.state.live.get()
    }

    /// Number of successful clones so far.
    #[must_use]
    pub fn clones(&self) -> usize {
        self.state.clones.get()
    }

    /// Number of tracked values dropped so far.
    #[must_use]
    pub fn drops(&self) -> usize {
        self.state.drops.get()
    }

    /// Makes the `nth` clone from now on panic (1 means the very next clone). Only one
    /// failure is injected; clones after it succeed again.
    ///
    /// # Panics
    ///
    /// Panics if `nth` is zero.
    pub fn panic_on_clone(&self, nth: usize) {
        assert!(nth > 0, "clone failures are counted from 1");
        self.state.clones_until_panic.set(Some(nth));
    }

    /// Cancels a pending injected clone failure.
    pub fn disarm(&self) {
        self.state.clones_until_panic.set(None);
    }

    fn on_create(&self) {
        self.state.live.set(self.state.live.get().wrapping_add(1));
    }

    fn on_clone(&self) {
        match self.state.clones_until_panic.get() {
            Some(1) => {
                self.state.clones_until_panic.set(None);
                panic!("injected clone failure");
            }
            Some(remaining) => {
                self.state
                    .clones_until_panic
                    .set(Some(remaining.wrapping_sub(1)));
            }
            None => {}
        }

        self.state.clones.set(self.state.clones.get().wrapping_add(1));
        self.on_create();
    }

    fn on_drop(&self) {
        self.state.live.set(self.state.live.get().wrapping_sub(1));
        self.state.drops.set(self.state.drops.get().wrapping_add(1));
    }
}

/// A container element that reports its lifecycle to shared [`Counters`].
///
/// Use it to check that a container constructs, clones and drops exactly the values it should,
/// and to inject a panic into a chosen clone to exercise rollback paths.
///
/// Comparison, ordering and hashing look at the value only.
///
/// # Example
///
/// ```rust
/// use testing::{Counters, Tracked};
///
/// let counters = Counters::new();
/// let first = Tracked::new(1, &counters);
/// let second = first.clone();
///
/// assert_eq!(counters.live(), 2);
/// assert_eq!(counters.clones(), 1);
///
/// drop(first);
/// drop(second);
/// assert_eq!(counters.live(), 0);
/// ```
pub struct Tracked {
    value: i32,
    counters: Counters,
}

impl Tracked {
    /// Creates a tracked value reporting to `counters`.
    #[must_use]
    pub fn new(value: i32, counters: &Counters) -> Self {
        counters.on_create();

        Self {
            value,
            counters: counters.clone(),
        }
    }

    /// The wrapped value.
    #[must_use]
    pub fn value(&self) -> i32 {
        self.value
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        self.counters.on_clone();

        Self {
            value: self.value,
            counters: self.counters.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counters.on_drop();
    }
}

impl fmt::Debug for Tracked {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tracked({})", self.value)
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Tracked {}

impl PartialOrd for Tracked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tracked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl Hash for Tracked {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

// SAFETY: Conservative defaults; every clone and drop must run to be counted.
unsafe impl TypeTraits for Tracked {}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn watchdog_returns_value() {
        assert_eq!(with_watchdog(|| 42), 42);
    }

    #[test]
    fn counts_lifecycle() {
        let counters = Counters::new();

        let value = Tracked::new(7, &counters);
        let copies: Vec<_> = (0..3).map(|_| value.clone()).collect();

        assert_eq!(counters.live(), 4);
        assert_eq!(counters.clones(), 3);

        drop(copies);
        assert_eq!(counters.live(), 1);
        assert_eq!(counters.drops(), 3);

        drop(value);
        assert_eq!(counters.live(), 0);
    }

    #[test]
    fn injected_clone_failure_fires_once() {
        let counters = Counters::new();
        let value = Tracked::new(1, &counters);

        counters.panic_on_clone(2);

        let first = value.clone();
        let failed = catch_unwind(AssertUnwindSafe(|| value.clone()));
        assert!(failed.is_err());

        let third = value.clone();

        assert_eq!(counters.clones(), 2);
        assert_eq!(counters.live(), 3);

        drop((first, third));
    }

    #[test]
    fn disarm_cancels_failure() {
        let counters = Counters::new();
        let value = Tracked::new(1, &counters);

        counters.panic_on_clone(1);
        counters.disarm();

        let copy = value.clone();
        assert_eq!(copy, value);
    }
}
