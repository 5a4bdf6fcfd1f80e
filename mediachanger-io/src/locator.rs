//! C7 — Optical-Media Locator.
//!
//! Enumerates IOKit services that look like the jukebox's SCSI media
//! changer nub, the way the teacher's `linux_list_drives` walks `/sys`
//! for changer-class SCSI generic devices — here the walk is over the
//! IOKit registry instead of sysfs (spec §4.7).

use std::ffi::CStr;
use std::os::raw::c_char;
use std::time::{Duration, Instant};

use io_kit_sys::types::io_service_t;
use mediachanger_types::ChangerError;

/// Polling cadence `find_optical_drive` waits between registry scans,
/// matching the original `FindOpticalDrive`'s cadence.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One candidate changer nub found in the IOKit registry, not yet opened.
#[derive(Debug, Clone)]
pub struct ChangerLocator {
    pub service: io_service_t,
    pub bsd_path: Option<String>,
}

/// Walk `IOServiceGetMatchingServices` for `IOSCSIPeripheralDeviceNub`
/// entries whose INQUIRY peripheral device type is 8 (medium changer),
/// same filter the teacher applies by peripheral type byte when scanning
/// `/sys/class/scsi_generic` (spec §4.7).
pub fn find_changer_devices() -> Result<Vec<ChangerLocator>, ChangerError> {
    let mut locators = Vec::new();
    let mut iterator: u32 = 0;
    let kr = unsafe { io_service_matching_changers(&mut iterator) };
    if kr != 0 {
        return Err(ChangerError::CommandTransport(format!(
            "IOServiceGetMatchingServices failed: kern_return_t {kr}"
        )));
    }

    loop {
        let service = unsafe { io_iterator_next(iterator) };
        if service == 0 {
            break;
        }
        let bsd_path = unsafe {
            let raw = io_service_bsd_path(service);
            if raw.is_null() {
                None
            } else {
                Some(CStr::from_ptr(raw).to_string_lossy().into_owned())
            }
        };
        locators.push(ChangerLocator { service, bsd_path });
    }
    unsafe { io_object_release(iterator) };

    Ok(locators)
}

/// Narrow `find_changer_devices` to the single device at a caller-known
/// IOKit registry path or BSD identifier — used when a
/// [`ChangerConfig`](mediachanger_types::ChangerConfig) already names one
/// (spec §4.7, supplements the original's `--path` flag).
pub fn find_changer_by_path(path: &str) -> Result<Option<ChangerLocator>, ChangerError> {
    let wanted = path.strip_prefix("/dev/").unwrap_or(path);
    Ok(find_changer_devices()?
        .into_iter()
        .find(|l| l.bsd_path.as_deref().map(|p| p.trim_start_matches("/dev/") == wanted).unwrap_or(false)))
}

/// Poll the IOKit registry every [`POLL_INTERVAL`] until a changer at
/// `path` shows up or `timeout` elapses — the original `FindOpticalDrive`
/// waited out a drive's post-boot enumeration delay the same way, rather
/// than failing on the first empty scan.
pub fn find_optical_drive(path: &str, timeout: Duration) -> Result<Option<ChangerLocator>, ChangerError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(locator) = find_changer_by_path(path)? {
            return Ok(Some(locator));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
}

extern "C" {
    fn io_service_matching_changers(iterator: *mut u32) -> i32;
    fn io_iterator_next(iterator: u32) -> io_service_t;
    fn io_service_bsd_path(service: io_service_t) -> *const c_char;
    fn io_object_release(obj: u32) -> i32;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strips_dev_prefix_for_matching() {
        let locators = vec![ChangerLocator { service: 1, bsd_path: Some("/dev/disk3".into()) }];
        let wanted = "disk3";
        assert!(locators
            .iter()
            .any(|l| l.bsd_path.as_deref().map(|p| p.trim_start_matches("/dev/") == wanted).unwrap_or(false)));
    }

    #[test]
    fn poll_interval_is_500ms() {
        assert_eq!(POLL_INTERVAL, Duration::from_millis(500));
    }
}
