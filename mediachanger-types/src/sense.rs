/// Parsed fixed-format SCSI sense triple (spec §3 `SenseData`, §4.1).
///
/// `valid` is true iff the last executed CDB returned non-GOOD status and
/// the sense response code was 0x70 or 0x71 (fixed format). A single sense
/// slot lives on each `ChangerConnection` — never process-wide (spec §9's
/// redesign note) — so two connections in the same process never clobber
/// each other's last-sense value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SenseData {
    pub valid: bool,
    pub sense_key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl SenseData {
    pub const fn new(valid: bool, sense_key: u8, asc: u8, ascq: u8) -> Self {
        Self {
            valid,
            sense_key,
            asc,
            ascq,
        }
    }

    pub const fn invalid() -> Self {
        Self {
            valid: false,
            sense_key: 0,
            asc: 0,
            ascq: 0,
        }
    }

    /// Classify into the closed set of meanings table in spec §4.1.
    pub fn kind(&self) -> SenseKind {
        if !self.valid {
            return SenseKind::Unknown;
        }
        match (self.sense_key, self.asc, self.ascq) {
            (0x00, _, _) => SenseKind::NoSense,
            (0x02, 0x04, 0x00) => SenseKind::NotReadyCauseNotReportable,
            (0x02, 0x04, 0x01) => SenseKind::BecomingReady,
            (0x02, 0x04, 0x02) => SenseKind::NeedsInitializeElementStatus,
            (0x02, 0x04, 0x03) => SenseKind::ManualInterventionRequired,
            (0x02, 0x3a, _) => SenseKind::MediumNotPresent,
            (0x05, 0x21, _) => SenseKind::InvalidElementAddress,
            (0x05, 0x24, _) => SenseKind::InvalidFieldInCdb,
            (0x05, 0x3b, 0x0d) | (0x0b, 0x3b, 0x0d) => SenseKind::MediumDestinationFull,
            (0x05, 0x3b, 0x0e) | (0x0b, 0x3b, 0x0e) => SenseKind::MediumSourceEmpty,
            (0x05, 0x3b, _) | (0x0b, 0x3b, _) => SenseKind::ElementPositionError,
            (0x06, 0x28, _) => SenseKind::MediumMayHaveChanged,
            (0x06, 0x29, _) => SenseKind::PowerOnOrReset,
            _ => SenseKind::Unknown,
        }
    }

    /// Human string for the decoded meaning (spec §4.1, reproduced
    /// byte-for-byte since tests and the UI both depend on the exact
    /// wording).
    pub fn describe(&self) -> String {
        match self.kind() {
            SenseKind::NoSense => "No sense".to_string(),
            SenseKind::NotReadyCauseNotReportable => {
                "Not ready, cause not reportable".to_string()
            }
            SenseKind::BecomingReady => "Becoming ready".to_string(),
            SenseKind::NeedsInitializeElementStatus => {
                "Needs INITIALIZE ELEMENT STATUS".to_string()
            }
            SenseKind::ManualInterventionRequired => "Manual intervention required".to_string(),
            SenseKind::MediumNotPresent => "Medium not present".to_string(),
            SenseKind::InvalidElementAddress => "Invalid element address".to_string(),
            SenseKind::InvalidFieldInCdb => "Invalid field in CDB".to_string(),
            SenseKind::MediumDestinationFull => "Medium destination full".to_string(),
            SenseKind::MediumSourceEmpty => "Medium source empty".to_string(),
            SenseKind::ElementPositionError => "Element position error".to_string(),
            SenseKind::MediumMayHaveChanged => "Medium may have changed".to_string(),
            SenseKind::PowerOnOrReset => "Power on or reset".to_string(),
            SenseKind::Unknown => {
                if self.valid {
                    format!(
                        "Unknown sense (key={:02x} asc={:02x} ascq={:02x})",
                        self.sense_key, self.asc, self.ascq
                    )
                } else {
                    "No sense data".to_string()
                }
            }
        }
    }
}

/// Closed classification of (key, ASC, ASCQ) triples (spec §4.1 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseKind {
    NoSense,
    NotReadyCauseNotReportable,
    BecomingReady,
    NeedsInitializeElementStatus,
    ManualInterventionRequired,
    MediumNotPresent,
    InvalidElementAddress,
    InvalidFieldInCdb,
    MediumDestinationFull,
    MediumSourceEmpty,
    ElementPositionError,
    MediumMayHaveChanged,
    PowerOnOrReset,
    Unknown,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn medium_source_empty_string() {
        let sense = SenseData::new(true, 0x05, 0x3b, 0x0e);
        assert_eq!(sense.describe(), "Medium source empty");
        assert_eq!(sense.kind(), SenseKind::MediumSourceEmpty);
    }

    #[test]
    fn invalid_sense_has_no_meaning() {
        let sense = SenseData::invalid();
        assert_eq!(sense.kind(), SenseKind::Unknown);
        assert!(!sense.valid);
    }
}
