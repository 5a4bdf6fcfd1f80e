//! Sense decoding, CDB execution, the two transport backends, the
//! media-changer command set, device location, and disk-arbitration
//! coordination — everything in this crate runs below the connection
//! state machine the root `mediachanger` crate exposes.

#[cfg(target_os = "macos")]
pub mod arbitration;
#[cfg(target_os = "macos")]
pub mod backend;
pub mod cdb;
pub mod commands;
#[cfg(target_os = "macos")]
pub mod executor;
#[cfg(target_os = "macos")]
pub mod ffi;
#[cfg(target_os = "macos")]
pub mod locator;
pub mod sense;

#[cfg(target_os = "macos")]
pub use backend::Backend;
pub use cdb::{Cdb, CdbDirection, CdbOutcome};
#[cfg(target_os = "macos")]
pub use locator::{find_changer_by_path, find_changer_devices, find_optical_drive, ChangerLocator};
