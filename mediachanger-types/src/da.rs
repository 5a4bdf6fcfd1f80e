use std::fmt;

/// A BSD device identifier ("disk3"), normalized so a leading `/dev/` never
/// leaks into a disk-arbitration call (spec §4.8 step 2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentifier(String);

impl DeviceIdentifier {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref();
        let stripped = raw.strip_prefix("/dev/").unwrap_or(raw);
        Self(stripped.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceIdentifier {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for DeviceIdentifier {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Resolved mount point path (e.g. `/Volumes/XYZ`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint(pub String);

/// Volume name as read from the disc description (e.g. `XYZ`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeName(pub String);

/// The three disk-arbitration operations C8 supports, all sharing the
/// asynchronous shape in spec §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaOperation {
    Mount,
    /// `force` maps to `UnmountOption::Force`.
    Unmount { force: bool },
    /// `force` is accepted for interface symmetry with `Unmount` but never
    /// honored — eject always uses default options (spec §4.8, §9 open
    /// question). An implementer must not silently promote this to a
    /// forced eject.
    Eject { force: bool },
}

/// Internal to C8: pairs a disc identifier with a pending asynchronous
/// operation, a completion flag, a dissent status, and an optional resolved
/// mount point (spec §3 `DaRequest`). One-shot: consumed and discarded when
/// the operation completes or times out (spec §4.9).
#[derive(Debug, Clone)]
pub struct DaRequest {
    pub device: DeviceIdentifier,
    pub operation: DaOperation,
    pub state: DaState,
    pub mount_point: Option<MountPoint>,
}

impl DaRequest {
    pub fn new(device: DeviceIdentifier, operation: DaOperation) -> Self {
        Self {
            device,
            operation,
            state: DaState::Pending,
            mount_point: None,
        }
    }

    pub fn is_done(&self) -> bool {
        !matches!(self.state, DaState::Pending)
    }
}

/// `Pending -> Completed(ok | dissent) | Cancelled`. Terminal transitions
/// are single-shot (spec §4.9).
///
/// `Cancelled` is reached only when the waiter gives up on timeout; it
/// exists so a callback that fires after the deadline has something safe
/// to observe instead of writing into a dropped context (spec §9 design
/// note on callback contexts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaState {
    Pending,
    Completed { dissent: Option<DaDissent> },
    Cancelled,
}

/// An opaque dissenter from the OS disk-arbitration layer, reduced to its
/// status code and (when available) a human-readable reason string —
/// the latter is what the original implementation's logs actually show an
/// operator (spec §4.8 step 6, supplemented per SPEC_FULL §4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaDissent {
    pub status: i32,
    pub reason: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strips_dev_prefix() {
        assert_eq!(DeviceIdentifier::new("/dev/disk3").as_str(), "disk3");
        assert_eq!(DeviceIdentifier::new("disk3").as_str(), "disk3");
    }

    #[test]
    fn fresh_request_is_pending() {
        let req = DaRequest::new(DeviceIdentifier::new("disk3"), DaOperation::Mount);
        assert!(!req.is_done());
    }
}
