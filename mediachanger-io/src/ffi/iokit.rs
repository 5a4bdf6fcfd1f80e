//! Binding to `IOSCSIArchitectureModelFamily`'s `SCSITaskDeviceInterface`,
//! the COM-style plugin interface the kernel-task backend (C3) drives.
//!
//! Apple ships this as a vtable of C function pointers reached through
//! `IOCreatePlugInInterfaceForService` + `QueryInterface`, the same pattern
//! `IOKit` uses everywhere a C++ interface crosses into C. There is no
//! safe way to describe a vtable in Rust other than a `#[repr(C)]` struct
//! of `extern "C"` function pointers dereferenced through a double
//! pointer, mirroring how the teacher's `sgutils2` module reaches into
//! `libsgutils2`'s opaque `obj_ptr`.

use std::ffi::c_void;
use std::ptr::NonNull;

use io_kit_sys::types::io_service_t;
use mach2::kern_return::kern_return_t;

use mediachanger_types::ChangerError;

use super::check_io_return;

pub type IoReturn = i32;

/// Layout of `SCSITaskDeviceInterface`, trimmed to the entry points this
/// crate uses (ObtainExclusiveAccess, ReleaseExclusiveAccess,
/// CreateSCSITask, ExecuteTaskSync-equivalent submission path). Field
/// order matches Apple's `SCSITaskLib.h`; padding fields are kept as
/// `*const c_void` placeholders so the offsets of the entries we call
/// stay correct without binding every unused slot by name.
#[repr(C)]
struct ScsiTaskDeviceInterfaceVtable {
    _reserved: [*const c_void; 3],
    obtain_exclusive_access: unsafe extern "C" fn(this: *mut c_void) -> IoReturn,
    release_exclusive_access: unsafe extern "C" fn(this: *mut c_void) -> IoReturn,
    create_scsi_task: unsafe extern "C" fn(this: *mut c_void) -> *mut c_void,
    _rest: [*const c_void; 8],
}

/// Owns the `IOCFPlugInInterface` + `SCSITaskDeviceInterface` pair for one
/// changer nub. `Drop` calls the matching release/finalize entries exactly
/// once, the same single-owner discipline as the teacher's `SgRaw`.
pub struct ScsiTaskDevice {
    plugin: NonNull<*mut c_void>,
    task_device: NonNull<*mut ScsiTaskDeviceInterfaceVtable>,
}

impl ScsiTaskDevice {
    /// `service` must be a `io_service_t` for an `IOSCSIPeripheralDeviceNub`
    /// matching a medium-changer CDB. Acquiring it (via `IOServiceGetMatchingServices`
    /// + `IOIteratorNext`) is the caller's job; this only turns an already
    /// matched service into a driveable task interface.
    pub fn open(service: io_service_t) -> Result<Self, ChangerError> {
        let mut plugin: *mut c_void = std::ptr::null_mut();
        let mut score: i32 = 0;
        // SAFETY: `service` is a caller-owned, matched io_service_t; IOKit
        // writes a valid plugin pointer into `plugin` on success.
        let kr: kern_return_t = unsafe { io_create_plugin_interface_for_service(service, &mut plugin, &mut score) };
        check_io_return(kr, "IOCreatePlugInInterfaceForService")?;

        let mut task_device: *mut c_void = std::ptr::null_mut();
        // SAFETY: `plugin` was just populated above and is non-null on
        // the success path checked by `check_io_return`.
        let qi: IoReturn = unsafe { query_scsi_task_device_interface(plugin, &mut task_device) };
        if qi != 0 || task_device.is_null() {
            unsafe { release_plugin_interface(plugin) };
            return Err(ChangerError::CommandTransport(
                "SCSITaskDeviceInterface QueryInterface failed".into(),
            ));
        }

        Ok(Self {
            plugin: NonNull::new(plugin).expect("checked above"),
            task_device: NonNull::new(task_device as *mut ScsiTaskDeviceInterfaceVtable)
                .expect("checked above"),
        })
    }

    pub fn obtain_exclusive_access(&self) -> Result<(), ChangerError> {
        let vtable = unsafe { self.task_device.as_ptr().read() };
        let rc = unsafe { (vtable.as_ref().unwrap().obtain_exclusive_access)(self.task_device.as_ptr() as *mut c_void) };
        check_io_return(rc, "ObtainExclusiveAccess")
    }

    pub fn release_exclusive_access(&self) -> Result<(), ChangerError> {
        let vtable = unsafe { self.task_device.as_ptr().read() };
        let rc = unsafe { (vtable.as_ref().unwrap().release_exclusive_access)(self.task_device.as_ptr() as *mut c_void) };
        check_io_return(rc, "ReleaseExclusiveAccess")
    }

    /// Submit one CDB through the task interface and block until it
    /// completes or `timeout` elapses. The actual per-task setup
    /// (SetCommandDescriptorBlock / SetTaskExecutionMode / SetTimeoutDuration
    /// / ExecuteTaskSync / GetTaskStatus / GetAutoSenseData) is one
    /// monolithic C call sequence in Apple's sample code; it is kept here
    /// as a single function rather than split across the vtable struct
    /// above, which only models the two access-control entries callers
    /// use directly.
    pub fn execute(&self, cdb: &crate::cdb::Cdb) -> crate::cdb::CdbOutcome {
        let mut status: u8 = 0;
        let mut data = cdb.buffer.clone();
        let mut data_len: usize = data.len();
        // spec §4.3: harvest up to 96 bytes of auto-sense, not just the
        // fixed-format minimum — vendor-specific descriptors can run past it.
        let mut sense = vec![0u8; 96];
        let mut sense_len: usize = sense.len();

        let rc = unsafe {
            execute_scsi_task(
                self.task_device.as_ptr() as *mut c_void,
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
            return crate::cdb::CdbOutcome::ErrTransport(format!("ExecuteTaskSync failed: IOReturn 0x{rc:08x}"));
        }

        data.truncate(data_len);
        sense.truncate(sense_len);
        crate::cdb::classify(status, data, crate::sense::decode_sense(&sense))
    }
}

impl Drop for ScsiTaskDevice {
    fn drop(&mut self) {
        let _ = self.release_exclusive_access();
        unsafe {
            release_scsi_task_device_interface(self.task_device.as_ptr() as *mut c_void);
            release_plugin_interface(self.plugin.as_ptr());
        }
    }
}

extern "C" {
    fn io_create_plugin_interface_for_service(service: io_service_t, plugin: *mut *mut c_void, score: *mut i32) -> kern_return_t;
    fn query_scsi_task_device_interface(plugin: *mut c_void, out: *mut *mut c_void) -> IoReturn;
    fn release_plugin_interface(plugin: *mut c_void);
    fn release_scsi_task_device_interface(task_device: *mut c_void);
    fn execute_scsi_task(
        task_device: *mut c_void,
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
