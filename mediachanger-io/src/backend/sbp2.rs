//! C4 — Direct SBP-2 backend.
//!
//! Fallback used when a changer sits behind an `IOFireWireSBP2LUN` that
//! never registers a kernel SCSI Task nub — some older jukeboxes only
//! expose the raw SBP-2 login target (spec §4.4). Same CDB-in,
//! outcome-out shape as [`KernelTaskBackend`](crate::backend::kernel_task::KernelTaskBackend),
//! so C6 never needs to know which one it's talking to.

use io_kit_sys::types::io_service_t;
use mediachanger_types::ChangerError;

use crate::backend::ChangerBackend;
use crate::cdb::{Cdb, CdbOutcome};
use crate::ffi::sbp2::Sbp2Lun;

pub struct Sbp2Backend {
    lun: Sbp2Lun,
}

impl Sbp2Backend {
    pub fn open(service: io_service_t) -> Result<Self, ChangerError> {
        let lun = Sbp2Lun::login(service)?;
        Ok(Self { lun })
    }
}

impl ChangerBackend for Sbp2Backend {
    fn execute(&self, cdb: &Cdb) -> CdbOutcome {
        self.lun.execute(cdb)
    }
}
