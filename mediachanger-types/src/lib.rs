//! Data model shared by the changer transport and command layers.
//!
//! Nothing in this crate touches a device: it only defines the shapes that
//! [`mediachanger-io`](../mediachanger_io/index.html) and the top-level
//! `mediachanger` crate pass between each other.

mod config;
mod da;
mod device;
mod element;
mod error;
mod sense;

pub use config::ChangerConfig;
pub use da::{DaOperation, DaRequest, DaState, DeviceIdentifier, MountPoint, VolumeName};
pub use device::DeviceInfo;
pub use element::{ElementMap, ElementStatus, ElementType};
pub use error::ChangerError;
pub use sense::{SenseData, SenseKind};
