//! C1 — Sense Decoder.
//!
//! Parses fixed-format SCSI sense bytes exactly as returned alongside a
//! failing CDB (spec §4.1). Byte offsets here are normative — this is a
//! wire format, not an internal representation, so there is no flexibility
//! in how a conforming device's response is read.

use mediachanger_types::SenseData;

/// Parse up to 255 raw sense bytes into a [`SenseData`].
///
/// Rule (spec §4.1): if `len >= 8` and `bytes[0] & 0x7F` is `0x70` or
/// `0x71` (fixed format), extract `sense_key = bytes[2] & 0x0F`,
/// `asc = bytes[12]` if `len >= 13`, `ascq = bytes[13]` if `len >= 14`.
/// Anything shorter, or a different response code (deferred/descriptor
/// format), decodes to an invalid `SenseData`.
pub fn decode_sense(bytes: &[u8]) -> SenseData {
    if bytes.len() < 8 {
        return SenseData::invalid();
    }

    let response_code = bytes[0] & 0x7f;
    if response_code != 0x70 && response_code != 0x71 {
        return SenseData::invalid();
    }

    let sense_key = bytes[2] & 0x0f;
    let asc = if bytes.len() >= 13 { bytes[12] } else { 0 };
    let ascq = if bytes.len() >= 14 { bytes[13] } else { 0 };

    SenseData::new(true, sense_key, asc, ascq)
}

/// Human string for the decoded meaning — a thin re-export of
/// [`SenseData::describe`] kept here so callers of the command layer don't
/// need to import `mediachanger_types` just to stringify a sense result.
pub fn sense_string(sense: &SenseData) -> String {
    sense.describe()
}

#[cfg(test)]
mod test {
    use super::*;

    fn fixed_sense(key: u8, asc: u8, ascq: u8) -> Vec<u8> {
        let mut buf = vec![0u8; 18];
        buf[0] = 0x70;
        buf[2] = key;
        buf[12] = asc;
        buf[13] = ascq;
        buf
    }

    #[test]
    fn decodes_fixed_format() {
        let bytes = fixed_sense(0x05, 0x3b, 0x0e);
        let sense = decode_sense(&bytes);
        assert!(sense.valid);
        assert_eq!((sense.sense_key, sense.asc, sense.ascq), (0x05, 0x3b, 0x0e));
        assert_eq!(sense_string(&sense), "Medium source empty");
    }

    #[test]
    fn too_short_is_invalid() {
        let sense = decode_sense(&[0x70, 0, 0, 0, 0, 0, 0]);
        assert!(!sense.valid);
    }

    #[test]
    fn wrong_response_code_is_invalid() {
        let bytes = fixed_sense(0x05, 0x3b, 0x0e);
        let mut bytes = bytes;
        bytes[0] = 0x72; // descriptor format, not handled here
        assert!(!decode_sense(&bytes).valid);
    }

    #[test]
    fn short_buffer_defaults_asc_ascq_to_zero() {
        let mut buf = vec![0u8; 9];
        buf[0] = 0x70;
        buf[2] = 0x06;
        let sense = decode_sense(&buf);
        assert!(sense.valid);
        assert_eq!((sense.asc, sense.ascq), (0, 0));
    }
}
