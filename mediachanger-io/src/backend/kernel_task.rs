//! C3 — Kernel SCSI Task backend.
//!
//! Drives a changer through `IOSCSIArchitectureModelFamily`'s in-kernel
//! task object, the same path Disk Utility and `diskutil` use. This is
//! the backend a caller should prefer whenever the changer's driver
//! exposes `IOSCSIPeripheralDeviceNub` (spec §4.3) — it's what C5 tries
//! first.

use std::time::Duration;

use io_kit_sys::types::io_service_t;
use mediachanger_types::ChangerError;

use crate::backend::ChangerBackend;
use crate::cdb::{Cdb, CdbOutcome};
use crate::ffi::iokit::ScsiTaskDevice;

pub struct KernelTaskBackend {
    device: ScsiTaskDevice,
}

impl KernelTaskBackend {
    pub fn open(service: io_service_t) -> Result<Self, ChangerError> {
        let device = ScsiTaskDevice::open(service)?;
        device.obtain_exclusive_access()?;
        Ok(Self { device })
    }

    pub fn timeout_floor() -> Duration {
        Duration::from_secs(1)
    }
}

impl ChangerBackend for KernelTaskBackend {
    fn execute(&self, cdb: &Cdb) -> CdbOutcome {
        self.device.execute(cdb)
    }
}
