//! Cooperative run-loop execution, abstracted so C8's timeout loops are
//! testable without an actual macOS run loop (spec §9 design note).
//!
//! The real implementation ([`CfRunLoopExecutor`]) pumps
//! `CFRunLoopRunInMode` in short slices until either the watched
//! [`DaRequest`](mediachanger_types::DaRequest) completes or the deadline
//! passes. Tests substitute [`FakeExecutor`], which just ticks a closure
//! without touching any real run loop.

use std::time::{Duration, Instant};

use mediachanger_types::DaRequest;

/// Pumps an event loop in bounded slices until a predicate is satisfied or
/// a deadline elapses.
pub trait RunLoopExecutor {
    /// Run the loop in slices no longer than `slice`, calling `done` after
    /// each slice, until `done` returns `true` or `deadline` is reached.
    /// Returns `true` if `done` became true before the deadline.
    fn run_until(&mut self, deadline: Instant, slice: Duration, done: &mut dyn FnMut() -> bool) -> bool;
}

/// Production executor: pumps the current thread's `CFRunLoop` in `slice`
/// increments via `mediachanger_io::ffi::disk_arbitration`.
#[derive(Debug, Default)]
pub struct CfRunLoopExecutor;

impl RunLoopExecutor for CfRunLoopExecutor {
    fn run_until(&mut self, deadline: Instant, slice: Duration, done: &mut dyn FnMut() -> bool) -> bool {
        loop {
            if done() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            crate::ffi::disk_arbitration::run_in_mode(slice.min(remaining));
        }
    }
}

/// Test executor: no real run loop, just repeatedly calls `done` with a
/// caller-supplied step function standing in for "time passing" and
/// "the callback fired".
pub struct FakeExecutor<F: FnMut()> {
    pub step: F,
}

impl<F: FnMut()> RunLoopExecutor for FakeExecutor<F> {
    fn run_until(&mut self, deadline: Instant, _slice: Duration, done: &mut dyn FnMut() -> bool) -> bool {
        loop {
            if done() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            (self.step)();
        }
    }
}

/// Convenience used by C8 to build a one-shot request/wait pairing against
/// whichever executor is in play.
pub fn wait_for_request(
    executor: &mut dyn RunLoopExecutor,
    request: &std::cell::RefCell<DaRequest>,
    timeout: Duration,
    slice: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    let mut done = || request.borrow().is_done();
    let finished = executor.run_until(deadline, slice, &mut done);
    if !finished {
        let mut req = request.borrow_mut();
        if !req.is_done() {
            req.state = mediachanger_types::DaState::Cancelled;
        }
    }
    finished
}

#[cfg(test)]
mod test {
    use super::*;
    use mediachanger_types::{DaOperation, DeviceIdentifier};
    use std::cell::RefCell;

    #[test]
    fn fake_executor_resolves_once_step_completes_request() {
        let request = RefCell::new(DaRequest::new(DeviceIdentifier::new("disk3"), DaOperation::Mount));
        let mut calls = 0;
        let mut exec = FakeExecutor {
            step: || {
                calls += 1;
                if calls == 3 {
                    request.borrow_mut().state = mediachanger_types::DaState::Completed { dissent: None };
                }
            },
        };
        let ok = wait_for_request(&mut exec, &request, Duration::from_secs(5), Duration::from_millis(10));
        assert!(ok);
        assert!(request.borrow().is_done());
    }

    #[test]
    fn timeout_cancels_request() {
        let request = RefCell::new(DaRequest::new(DeviceIdentifier::new("disk3"), DaOperation::Mount));
        let mut exec = FakeExecutor { step: || {} };
        let ok = wait_for_request(&mut exec, &request, Duration::from_millis(1), Duration::from_millis(1));
        assert!(!ok);
        assert_eq!(request.borrow().state, mediachanger_types::DaState::Cancelled);
    }
}
