use crate::SenseData;

/// Closed failure taxonomy (spec §7). Every fallible operation in this
/// workspace eventually resolves to one of these variants; nothing bubbles
/// up a bare `std::io::Error` or FFI return code past the backend that
/// produced it.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ChangerError {
    /// Neither transport backend could attach to the changer.
    #[error("no changer transport available")]
    TransportUnavailable,

    /// The CDB never reached GOOD status and the transport returned no
    /// sense data (link error, aborted task, OS error submitting it).
    #[error("transport error executing command: {0}")]
    CommandTransport(String),

    /// The command was transmitted and the device responded with a
    /// non-GOOD status carrying sense data.
    #[error("command failed: {}", SenseData::new(true, *key, *asc, *ascq).describe())]
    CommandSense { key: u8, asc: u8, ascq: u8 },

    /// A response was shorter than required, carried an unexpected page
    /// code, or had internally inconsistent descriptor lengths.
    #[error("protocol parse error: {0}")]
    ProtocolParse(String),

    /// A deadline elapsed while waiting on a suspension point (§5).
    #[error("operation '{op}' timed out")]
    Timeout { op: String },

    /// The disk-arbitration layer refused the request.
    #[error("disk arbitration refused: status {status}{}", reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default())]
    DaDissent {
        status: i32,
        reason: Option<String>,
    },

    /// No optical media, or no changer device, could be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller passed a null/empty identifier, a zero-length buffer with a
    /// read/write direction, or another argument that violates a
    /// documented precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ChangerError {
    pub fn command_sense(sense: &SenseData) -> Self {
        ChangerError::CommandSense {
            key: sense.sense_key,
            asc: sense.asc,
            ascq: sense.ascq,
        }
    }
}
