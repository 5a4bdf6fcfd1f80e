//! Binding to `DiskArbitration.framework`, used by C8 for mount/unmount/
//! eject and by [`CfRunLoopExecutor`](crate::executor::CfRunLoopExecutor)
//! to pump the run loop that delivers DA's callbacks.
//!
//! `core-foundation` gives us `CFRunLoop`/`CFString` already; only the
//! `DASession`/`DADisk` surface is missing from the crate ecosystem, so
//! it's bound directly here the same way the teacher reaches past
//! `libsgutils2`'s high-level helpers straight to `do_scsi_pt` when it
//! needs a primitive the wrapper doesn't expose.

use std::cell::RefCell;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::Duration;

use core_foundation::base::TCFType;
use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopRunInMode};
use core_foundation::string::CFString;

use mediachanger_types::{DaDissent, DaOperation, DaRequest, DaState, MountPoint};

/// Opaque `DASessionRef`, scheduled on the current thread's run loop for
/// its whole lifetime. One session per [`ChangerConnection`](../../mediachanger/struct.ChangerConnection.html)
/// is the pattern spec §4.8 assumes.
pub struct DaSession {
    session: NonNull<c_void>,
}

impl DaSession {
    pub fn create() -> Option<Self> {
        let session = unsafe { da_session_create(std::ptr::null()) };
        let session = NonNull::new(session)?;
        unsafe {
            da_session_schedule_with_run_loop(
                session.as_ptr(),
                CFRunLoop::get_current().as_concrete_TypeRef() as *const c_void,
                kCFRunLoopDefaultMode.as_concrete_TypeRef() as *const c_void,
            );
        }
        Some(Self { session })
    }

    /// Resolve a BSD device identifier (`disk3`) to a `DADiskRef`. The
    /// disk reference is not retained beyond the call that uses it — each
    /// operation below creates, uses, and releases its own.
    fn disk_for(&self, bsd_name: &str) -> Option<NonNull<c_void>> {
        let c_name = std::ffi::CString::new(bsd_name).ok()?;
        let disk = unsafe { da_disk_create_from_bsd_name(std::ptr::null(), self.session.as_ptr(), c_name.as_ptr()) };
        NonNull::new(disk)
    }

    /// Read `kDADiskDescriptionVolumeNameKey` out of the disk's current
    /// description dictionary. `None` covers both "no such disk" and "disk
    /// has no volume name yet" (e.g. unmounted) — callers distinguish those
    /// by first checking `is_mounted`.
    pub fn volume_name(&self, bsd_name: &str) -> Option<String> {
        let disk = self.disk_for(bsd_name)?;
        let name_ref = unsafe { da_disk_copy_volume_name(disk.as_ptr()) };
        unsafe { da_release(disk.as_ptr()) };
        if name_ref.is_null() {
            return None;
        }
        Some(unsafe { CFString::wrap_under_create_rule(name_ref as _) }.to_string())
    }

    /// Begin an asynchronous mount, unmount, or eject and route its
    /// completion back into `request` (spec §4.8 steps 3-6). `request` is
    /// kept alive by the `Rc` clone handed to the C callback's refcon, so
    /// a completion firing after the caller's wait gives up still has
    /// somewhere safe to write (spec §9 callback-context design note) —
    /// it just updates a request nobody is polling anymore.
    pub fn begin(&self, bsd_name: &str, request: Rc<RefCell<DaRequest>>) -> bool {
        let Some(disk) = self.disk_for(bsd_name) else { return false };
        let op = request.borrow().operation;
        let refcon = Rc::into_raw(request) as *mut c_void;

        unsafe {
            match op {
                mediachanger_types::DaOperation::Mount => {
                    da_disk_mount(disk.as_ptr(), std::ptr::null(), mount_callback, refcon);
                }
                mediachanger_types::DaOperation::Unmount { force } => {
                    let options = if force { 1u32 } else { 0u32 };
                    da_disk_unmount(disk.as_ptr(), options, unmount_callback, refcon);
                }
                mediachanger_types::DaOperation::Eject { .. } => {
                    da_disk_eject(disk.as_ptr(), 0, eject_callback, refcon);
                }
            }
            da_release(disk.as_ptr());
        }
        true
    }
}

impl Drop for DaSession {
    fn drop(&mut self) {
        unsafe {
            da_session_unschedule_with_run_loop(
                self.session.as_ptr(),
                CFRunLoop::get_current().as_concrete_TypeRef() as *const c_void,
                kCFRunLoopDefaultMode.as_concrete_TypeRef() as *const c_void,
            );
            da_release(self.session.as_ptr());
        }
    }
}

/// Pump the calling thread's run loop for up to `slice`, same entry point
/// `CfRunLoopExecutor` drives; kept here rather than in `executor.rs`
/// because it's the one place in this crate that touches `CFRunLoopRunInMode`
/// directly.
pub fn run_in_mode(slice: Duration) {
    unsafe {
        CFRunLoopRunInMode(kCFRunLoopDefaultMode, slice.as_secs_f64(), 0);
    }
}

fn dissent_from(dissenter: *const c_void) -> Option<DaDissent> {
    if dissenter.is_null() {
        return None;
    }
    let status = unsafe { da_dissenter_get_status(dissenter) };
    let reason_ref = unsafe { da_dissenter_get_status_string(dissenter) };
    let reason = if reason_ref.is_null() {
        None
    } else {
        Some(unsafe { CFString::wrap_under_get_rule(reason_ref as _) }.to_string())
    };
    Some(DaDissent { status, reason })
}

/// Read `kDADiskDescriptionVolumePathKey` off a just-mounted disk (spec
/// §4.8 step 6) — only meaningful right after a successful `Mount`.
unsafe fn mount_point_from_disk(disk: *const c_void) -> Option<MountPoint> {
    if disk.is_null() {
        return None;
    }
    let path_ref = da_disk_copy_volume_path(disk as *mut c_void);
    if path_ref.is_null() {
        return None;
    }
    Some(MountPoint(CFString::wrap_under_create_rule(path_ref as _).to_string()))
}

unsafe fn complete(refcon: *mut c_void, disk: *const c_void, dissenter: *const c_void) {
    let request = Rc::from_raw(refcon as *const RefCell<DaRequest>);
    let dissent = dissent_from(dissenter);
    let mount_point = if dissent.is_none() && matches!(request.borrow().operation, DaOperation::Mount) {
        mount_point_from_disk(disk)
    } else {
        None
    };
    {
        let mut req = request.borrow_mut();
        req.mount_point = mount_point;
        req.state = DaState::Completed { dissent };
    }
    // drop the Rc's strong count acquired via into_raw without freeing the
    // cell early if other clones are still held by the waiting side.
    std::mem::drop(request);
}

unsafe extern "C" fn mount_callback(disk: *const c_void, dissenter: *const c_void, refcon: *mut c_void) {
    complete(refcon, disk, dissenter);
}

unsafe extern "C" fn unmount_callback(disk: *const c_void, dissenter: *const c_void, refcon: *mut c_void) {
    complete(refcon, disk, dissenter);
}

unsafe extern "C" fn eject_callback(disk: *const c_void, dissenter: *const c_void, refcon: *mut c_void) {
    complete(refcon, disk, dissenter);
}

extern "C" {
    fn da_session_create(allocator: *const c_void) -> *mut c_void;
    fn da_session_schedule_with_run_loop(session: *mut c_void, run_loop: *const c_void, mode: *const c_void);
    fn da_session_unschedule_with_run_loop(session: *mut c_void, run_loop: *const c_void, mode: *const c_void);
    fn da_disk_create_from_bsd_name(allocator: *const c_void, session: *mut c_void, bsd_name: *const i8) -> *mut c_void;
    fn da_disk_mount(
        disk: *mut c_void,
        path: *const c_void,
        callback: unsafe extern "C" fn(*const c_void, *const c_void, *mut c_void),
        refcon: *mut c_void,
    );
    fn da_disk_unmount(
        disk: *mut c_void,
        options: u32,
        callback: unsafe extern "C" fn(*const c_void, *const c_void, *mut c_void),
        refcon: *mut c_void,
    );
    fn da_disk_eject(
        disk: *mut c_void,
        options: u32,
        callback: unsafe extern "C" fn(*const c_void, *const c_void, *mut c_void),
        refcon: *mut c_void,
    );
    fn da_disk_copy_volume_name(disk: *mut c_void) -> *const c_void;
    fn da_disk_copy_volume_path(disk: *mut c_void) -> *const c_void;
    fn da_dissenter_get_status(dissenter: *const c_void) -> i32;
    fn da_dissenter_get_status_string(dissenter: *const c_void) -> *const c_void;
    fn da_release(obj: *mut c_void);
}
