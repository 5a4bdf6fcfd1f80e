//! Thin `extern "C"` bindings to the three macOS frameworks this crate
//! talks to. Each submodule follows the same shape as the teacher's
//! `sgutils2` binding: an opaque pointer wrapped in a struct with a `Drop`
//! impl that releases it, and free functions that turn a `kern_return_t` /
//! `IOReturn` into a [`ChangerError`](mediachanger_types::ChangerError).
//!
//! Nothing above this module touches a raw pointer directly.

pub mod disk_arbitration;
pub mod iokit;
pub mod sbp2;

use mediachanger_types::ChangerError;

/// `IOReturn` / `kern_return_t` is `0` on success on Darwin; anything else
/// is an opaque vendor/kernel error code worth keeping for logs but not
/// worth decoding field-by-field here.
pub(crate) fn check_io_return(code: i32, op: &str) -> Result<(), ChangerError> {
    if code == 0 {
        Ok(())
    } else {
        Err(ChangerError::CommandTransport(format!("{op} failed: IOReturn 0x{code:08x}")))
    }
}
