//! C8 — Disk Arbitration Coordinator.
//!
//! Sequences one mount, unmount or eject through `DiskArbitration.framework`
//! and blocks the caller until it settles or the timeout from spec §4.9
//! elapses. The request/executor split (spec §9) is what lets this module
//! run under `FakeExecutor` in tests without a real run loop.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use mediachanger_types::{ChangerError, DaOperation, DaRequest, DaState, DeviceIdentifier, MountPoint};

use crate::executor::{wait_for_request, RunLoopExecutor};
use crate::ffi::disk_arbitration::DaSession;

/// Default slice between run-loop pumps (spec §4.9 step 4) and default
/// wait before giving up on a mount/unmount/eject.
pub const DEFAULT_POLL_SLICE: Duration = Duration::from_millis(100);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Arbitrator {
    session: DaSession,
}

impl Arbitrator {
    pub fn new() -> Result<Self, ChangerError> {
        let session = DaSession::create()
            .ok_or_else(|| ChangerError::CommandTransport("DASessionCreate failed".into()))?;
        Ok(Self { session })
    }

    /// Run one disk-arbitration operation to completion, or time out.
    /// Returns the resolved mount point only for `Mount` — other
    /// operations resolve with `None` (spec §4.8/§4.9).
    pub fn run(
        &self,
        executor: &mut dyn RunLoopExecutor,
        device: DeviceIdentifier,
        operation: DaOperation,
        timeout: Duration,
    ) -> Result<Option<MountPoint>, ChangerError> {
        let request = Rc::new(RefCell::new(DaRequest::new(device.clone(), operation)));

        if !self.session.begin(device.as_str(), Rc::clone(&request)) {
            return Err(ChangerError::NotFound(format!("no such device: {device}")));
        }

        let op_name = match operation {
            DaOperation::Mount => "mount",
            DaOperation::Unmount { .. } => "unmount",
            DaOperation::Eject { .. } => "eject",
        };

        let finished = wait_for_request(executor, &request, timeout, DEFAULT_POLL_SLICE);
        if !finished {
            return Err(ChangerError::Timeout { op: op_name.to_string() });
        }

        return self.resolve(request, op_name);
    }

    /// Read the current volume name straight from the disk description,
    /// bypassing the request/executor machinery — used by
    /// `get_volume_name`, which has nothing to wait on.
    pub fn volume_name(&self, device: &DeviceIdentifier) -> Option<String> {
        self.session.volume_name(device.as_str())
    }

    fn resolve(&self, request: Rc<RefCell<DaRequest>>, op_name: &str) -> Result<Option<MountPoint>, ChangerError> {
        let state = request.borrow().state.clone();
        match state {
            DaState::Completed { dissent: None } => Ok(request.borrow().mount_point.clone()),
            DaState::Completed { dissent: Some(d) } => Err(ChangerError::DaDissent {
                status: d.status,
                reason: d.reason,
            }),
            DaState::Cancelled => Err(ChangerError::Timeout { op: op_name.to_string() }),
            DaState::Pending => unreachable!("wait_for_request only returns true once done() holds"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::executor::FakeExecutor;
    use mediachanger_types::DaDissent;

    // These tests exercise the request/executor state machine directly —
    // `Arbitrator::run` itself needs a live `DASession` and is exercised by
    // the root crate's higher-level tests with a real or mocked session.

    #[test]
    fn completed_without_dissent_resolves_ok() {
        let request = Rc::new(RefCell::new(DaRequest::new(DeviceIdentifier::new("disk3"), DaOperation::Mount)));
        let req2 = Rc::clone(&request);
        let mut exec = FakeExecutor {
            step: move || {
                req2.borrow_mut().state = DaState::Completed { dissent: None };
            },
        };
        let ok = wait_for_request(&mut exec, &request, Duration::from_secs(1), Duration::from_millis(1));
        assert!(ok);
        assert_eq!(request.borrow().state, DaState::Completed { dissent: None });
    }

    #[test]
    fn dissent_is_preserved() {
        let request = Rc::new(RefCell::new(DaRequest::new(
            DeviceIdentifier::new("disk3"),
            DaOperation::Unmount { force: false },
        )));
        let req2 = Rc::clone(&request);
        let mut exec = FakeExecutor {
            step: move || {
                req2.borrow_mut().state = DaState::Completed {
                    dissent: Some(DaDissent { status: -35, reason: Some("busy".into()) }),
                };
            },
        };
        wait_for_request(&mut exec, &request, Duration::from_secs(1), Duration::from_millis(1));
        match &request.borrow().state {
            DaState::Completed { dissent: Some(d) } => assert_eq!(d.status, -35),
            other => panic!("unexpected state: {other:?}"),
        }
    }
}
