//! C3/C4 — Transport backend selection.
//!
//! The spec's redesign note replaces the trait-object polymorphism a
//! caller might reach for first with a closed two-variant enum: there are
//! exactly two ways this crate can reach a changer, never more, and a
//! `match` on two known variants is both cheaper and easier to exhaustively
//! test than a `Box<dyn Backend>` would be. Each variant still implements
//! the same one-method `ChangerBackend` trait internally, kept private so
//! nothing outside this module is tempted to box it.

pub mod kernel_task;
pub mod sbp2;

use io_kit_sys::types::io_service_t;
use mediachanger_types::ChangerError;

use crate::cdb::{Cdb, CdbOutcome};
use kernel_task::KernelTaskBackend;
use sbp2::Sbp2Backend;

pub(crate) trait ChangerBackend {
    fn execute(&self, cdb: &Cdb) -> CdbOutcome;
}

/// Which transport a [`ChangerConnection`](../../mediachanger/struct.ChangerConnection.html)
/// ended up using. Chosen once at connect time (spec §4.3/§4.4) and never
/// switched mid-session.
pub enum Backend {
    KernelTask(KernelTaskBackend),
    Sbp2(Sbp2Backend),
}

impl Backend {
    /// Try the kernel SCSI Task path first; only fall back to direct SBP-2
    /// if that backend reports the service has no task nub to open
    /// (spec §4.3 step 3).
    pub fn open(service: io_service_t) -> Result<Self, ChangerError> {
        match KernelTaskBackend::open(service) {
            Ok(backend) => Ok(Backend::KernelTask(backend)),
            Err(kernel_err) => match Sbp2Backend::open(service) {
                Ok(backend) => Ok(Backend::Sbp2(backend)),
                Err(sbp2_err) => {
                    log::warn!("no usable transport: kernel task ({kernel_err}), sbp2 ({sbp2_err})");
                    Err(ChangerError::TransportUnavailable)
                }
            },
        }
    }

    pub fn execute(&self, cdb: &Cdb) -> CdbOutcome {
        match self {
            Backend::KernelTask(b) => ChangerBackend::execute(b, cdb),
            Backend::Sbp2(b) => ChangerBackend::execute(b, cdb),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::KernelTask(_) => "kernel-task",
            Backend::Sbp2(_) => "sbp2",
        }
    }
}
