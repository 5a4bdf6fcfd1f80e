//! Binding to `IOFireWireSBP2LibLUNInterface`, used by the direct-SBP2
//! backend (C4) when a changer's kernel SCSI Task path is unavailable and
//! the caller has opted into driving the FireWire login/ORB exchange
//! directly (spec §4.4).
//!
//! An ORB (Operation Request Block) carries the same CDB bytes as the
//! kernel-task path; the difference is entirely in how the command is
//! handed to the device (a DMA-mapped ORB chain instead of a task object).

use std::ffi::c_void;
use std::ptr::NonNull;

use io_kit_sys::types::io_service_t;
use mach2::kern_return::kern_return_t;

use mediachanger_types::ChangerError;

use super::check_io_return;
use super::iokit::IoReturn;

/// Owns a logged-in SBP-2 LUN. `Drop` logs out before releasing the
/// interface, mirroring the login/logout symmetry Apple's SBP-2 sample
/// code requires — an ORB submitted after logout is simply dropped by the
/// device, which would otherwise look like a silent timeout to C8/C6.
pub struct Sbp2Lun {
    lun: NonNull<c_void>,
    logged_in: bool,
}

impl Sbp2Lun {
    pub fn login(service: io_service_t) -> Result<Self, ChangerError> {
        let mut lun: *mut c_void = std::ptr::null_mut();
        let kr: kern_return_t = unsafe { sbp2_create_lun_interface(service, &mut lun) };
        check_io_return(kr, "SBP2 create LUN interface")?;

        let rc: IoReturn = unsafe { sbp2_login(lun) };
        if rc != 0 {
            unsafe { sbp2_release_lun_interface(lun) };
            return Err(ChangerError::CommandTransport(format!("SBP2 login failed: IOReturn 0x{rc:08x}")));
        }

        Ok(Self {
            lun: NonNull::new(lun).expect("checked above"),
            logged_in: true,
        })
    }

    /// Build, submit and wait for one ORB wrapping `cdb`. The device
    /// returns status via a status-FIFO write the kernel already parses
    /// into a short status block; `execute` only needs to wait for it and
    /// copy out the pieces C6 cares about.
    pub fn execute(&self, cdb: &crate::cdb::Cdb) -> crate::cdb::CdbOutcome {
        let mut status: u8 = 0;
        let mut data = cdb.buffer.clone();
        let mut data_len: usize = data.len();
        // spec §4.3: harvest up to 96 bytes of auto-sense, not just the
        // fixed-format minimum — vendor-specific descriptors can run past it.
        let mut sense = vec![0u8; 96];
        let mut sense_len: usize = sense.len();

        let rc = unsafe {
            sbp2_submit_orb(
                self.lun.as_ptr(),
                cdb.bytes.as_ptr(),
                cdb.bytes.len(),
                matches!(cdb.direction, crate::cdb::CdbDirection::FromDevice),
                data.as_mut_ptr(),
                &mut data_len,
                cdb.timeout.as_millis() as u32,
                &mut status,
                sense.as_mut_ptr(),
                &mut sense_len,
            )
        };
        if rc != 0 {
            return crate::cdb::CdbOutcome::ErrTransport(format!("SBP2 submit ORB failed: IOReturn 0x{rc:08x}"));
        }

        data.truncate(data_len);
        sense.truncate(sense_len);
        crate::cdb::classify(status, data, crate::sense::decode_sense(&sense))
    }
}

impl Drop for Sbp2Lun {
    fn drop(&mut self) {
        if self.logged_in {
            unsafe { sbp2_logout(self.lun.as_ptr()) };
        }
        unsafe { sbp2_release_lun_interface(self.lun.as_ptr()) };
    }
}

extern "C" {
    fn sbp2_create_lun_interface(service: io_service_t, lun: *mut *mut c_void) -> kern_return_t;
    fn sbp2_login(lun: *mut c_void) -> IoReturn;
    fn sbp2_logout(lun: *mut c_void) -> IoReturn;
    fn sbp2_release_lun_interface(lun: *mut c_void);
    fn sbp2_submit_orb(
        lun: *mut c_void,
        cdb: *const u8,
        cdb_len: usize,
        data_in: bool,
        data: *mut u8,
        data_len: *mut usize,
        timeout_ms: u32,
        status: *mut u8,
        sense: *mut u8,
        sense_len: *mut usize,
    ) -> IoReturn;
}
