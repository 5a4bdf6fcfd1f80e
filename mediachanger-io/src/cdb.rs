//! C2 — CDB Execution Engine.
//!
//! A backend-agnostic description of one SCSI command: the command
//! descriptor block bytes, which way the data phase moves, and how long to
//! wait before giving up. Both backends (C3 kernel task, C4 direct SBP-2)
//! consume the same [`Cdb`] and produce the same [`CdbOutcome`], which is
//! what lets C6's command builders stay backend-agnostic (spec §4.2).

use std::time::Duration;

use mediachanger_types::SenseData;

/// Direction of the data phase following the command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdbDirection {
    /// No data phase (e.g. TEST UNIT READY, MOVE MEDIUM).
    None,
    /// Device writes into the caller's buffer (e.g. INQUIRY, READ ELEMENT
    /// STATUS).
    FromDevice,
    /// Caller writes into the device (e.g. MODE SELECT — unused by this
    /// command set today, kept for completeness of the direction enum).
    ToDevice,
}

/// One fully-built command, ready for either backend to execute.
///
/// `buffer` is sized by the caller to the maximum expected response; a
/// backend never reallocates it, only truncates the copy it returns in
/// `CdbOutcome::Ok`.
#[derive(Debug, Clone)]
pub struct Cdb {
    pub bytes: Vec<u8>,
    pub direction: CdbDirection,
    pub buffer: Vec<u8>,
    pub timeout: Duration,
}

impl Cdb {
    pub fn new(bytes: Vec<u8>, direction: CdbDirection, buffer_len: usize, timeout: Duration) -> Self {
        Self {
            bytes,
            direction,
            buffer: vec![0u8; buffer_len],
            timeout,
        }
    }
}

/// Result of handing a [`Cdb`] to a backend (spec §4.2's contract exactly):
/// a successful transfer carries the response bytes, a CHECK CONDITION
/// carries the decoded sense, and anything else a backend can't recover
/// from (link error, aborted task, OS error submitting it) is a bare
/// transport error string.
#[derive(Debug, Clone)]
pub enum CdbOutcome {
    Ok(Vec<u8>),
    ErrSense(SenseData),
    ErrTransport(String),
}

impl CdbOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CdbOutcome::Ok(_))
    }
}

/// Classify a raw SCSI status byte plus decoded sense into a
/// [`CdbOutcome`] — shared by both backends so neither has to repeat the
/// GOOD / CHECK CONDITION / other-status decision independently.
pub fn classify(status: u8, data: Vec<u8>, sense: SenseData) -> CdbOutcome {
    match status {
        0x00 => CdbOutcome::Ok(data),
        0x02 if sense.valid => CdbOutcome::ErrSense(sense),
        other => CdbOutcome::ErrTransport(format!("unexpected SCSI status 0x{other:02x}")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn buffer_is_preallocated_to_requested_length() {
        let cdb = Cdb::new(vec![0x12, 0, 0, 0, 96, 0], CdbDirection::FromDevice, 96, Duration::from_secs(5));
        assert_eq!(cdb.buffer.len(), 96);
    }

    #[test]
    fn good_status_yields_ok() {
        let outcome = classify(0x00, vec![1, 2, 3], SenseData::invalid());
        assert!(outcome.is_ok());
        assert!(matches!(outcome, CdbOutcome::Ok(data) if data == vec![1, 2, 3]));
    }

    #[test]
    fn check_condition_with_valid_sense_yields_err_sense() {
        let sense = SenseData::new(true, 0x05, 0x3b, 0x0e);
        let outcome = classify(0x02, vec![], sense);
        assert!(matches!(outcome, CdbOutcome::ErrSense(s) if s == sense));
    }

    #[test]
    fn check_condition_without_valid_sense_yields_err_transport() {
        let outcome = classify(0x02, vec![], SenseData::invalid());
        assert!(matches!(outcome, CdbOutcome::ErrTransport(_)));
    }

    #[test]
    fn other_status_yields_err_transport() {
        let outcome = classify(0x08, vec![], SenseData::invalid());
        assert!(matches!(outcome, CdbOutcome::ErrTransport(_)));
    }
}
