//! C6 — Media-Changer Command Set.
//!
//! Builds the six CDBs this crate ever sends and parses their responses.
//! Ported from the teacher's `sg_pt_changer` module, keeping its
//! "build bytes by hand, parse bytes by hand" style rather than reaching
//! for a SCSI crate — the command set here is small and fixed, and every
//! field offset is already normative in spec §4.6.

use std::time::Duration;

use endian_trait::Endian;

use mediachanger_types::{ChangerError, DeviceInfo, ElementMap, ElementStatus, ElementType};

#[cfg(target_os = "macos")]
use crate::backend::Backend;
use crate::cdb::{Cdb, CdbDirection, CdbOutcome};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// TEST UNIT READY's own timeout (spec §4.6.1) — shorter than the default
/// since it never waits on robot motion.
const TEST_UNIT_READY_TIMEOUT: Duration = Duration::from_secs(10);
/// MOVE MEDIUM and INITIALIZE ELEMENT STATUS timeout (spec §4.6.5/§4.6.6,
/// §5): "the 120 s timeout covers the worst mechanical case."
const MECHANICAL_TIMEOUT: Duration = Duration::from_secs(120);
/// How many times `mode_sense_element_address` retries TEST UNIT READY,
/// 100 ms apart, to clear a lingering UNIT ATTENTION before MODE SENSE
/// (spec §4.6.3/§4.10).
const UNIT_ATTENTION_RETRIES: u32 = 3;
const UNIT_ATTENTION_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Collapse a [`CdbOutcome`] into the one `Result` shape every command
/// function returns, folding sense data and transport errors into the
/// same closed `ChangerError` taxonomy (spec §7).
fn require_ok(outcome: CdbOutcome) -> Result<Vec<u8>, ChangerError> {
    match outcome {
        CdbOutcome::Ok(data) => Ok(data),
        CdbOutcome::ErrSense(sense) => Err(ChangerError::command_sense(&sense)),
        CdbOutcome::ErrTransport(msg) => Err(ChangerError::CommandTransport(msg)),
    }
}

/// TEST UNIT READY (0x00) — spec §4.6.1.
#[cfg(target_os = "macos")]
pub fn test_unit_ready(backend: &Backend, timeout: Duration) -> Result<(), ChangerError> {
    let cdb = Cdb::new(vec![0x00, 0, 0, 0, 0, 0], CdbDirection::None, 0, timeout);
    require_ok(backend.execute(&cdb))?;
    Ok(())
}

/// INQUIRY (0x12) — spec §4.6.2/§6. Reads the full 96-byte response (the
/// standard 36 bytes plus the vendor-specific region some changers fill
/// with a version string).
#[cfg(target_os = "macos")]
pub fn inquiry(backend: &Backend, timeout: Duration) -> Result<DeviceInfo, ChangerError> {
    let cdb = Cdb::new(vec![0x12, 0, 0, 0, 0x60, 0], CdbDirection::FromDevice, 0x60, timeout);
    let data = require_ok(backend.execute(&cdb))?;
    parse_inquiry(&data)
}

fn parse_inquiry(data: &[u8]) -> Result<DeviceInfo, ChangerError> {
    if data.len() < 36 {
        return Err(ChangerError::ProtocolParse(format!(
            "INQUIRY response too short: {} bytes",
            data.len()
        )));
    }
    let trim = |s: &[u8]| String::from_utf8_lossy(s).trim_end().to_string();
    Ok(DeviceInfo {
        peripheral_device_type: data[0] & 0x1f,
        vendor: trim(&data[8..16]),
        product: trim(&data[16..32]),
        revision: trim(&data[32..36]),
    })
}

/// Fixed 8-byte MODE SENSE(10) parameter header. `block_descriptor_length`
/// tells us how many bytes to skip before the page itself starts — a
/// well-behaved device honors our DBD bit and reports 0, but the offset is
/// still computed from this field rather than assumed (spec §4.6.3).
#[repr(C, packed)]
#[derive(Endian, Default, Clone, Copy)]
struct ModeParameterHeader10 {
    mode_data_length: u16,
    medium_type: u8,
    device_specific: u8,
    reserved: u16,
    block_descriptor_length: u16,
}

#[repr(C, packed)]
#[derive(Endian, Default)]
struct ElementAddressPage {
    page_code: u8,
    page_length: u8,
    medium_transport_element_address: u16,
    medium_transport_element_count: u16,
    storage_element_address: u16,
    storage_element_count: u16,
    import_export_element_address: u16,
    import_export_element_count: u16,
    data_transfer_element_address: u16,
    data_transfer_element_count: u16,
    reserved2: u16,
}

/// MODE SENSE(10), page 0x1D (Element Address Assignment) — spec §4.6.3.
/// DBD (byte 1, `0x08`) asks the device to omit its block descriptor;
/// `parse_element_address_page` still honors a nonzero
/// `block_descriptor_length` in case a device returns one anyway.
#[cfg(target_os = "macos")]
pub fn mode_sense_element_address(backend: &Backend, timeout: Duration) -> Result<ElementMap, ChangerError> {
    for attempt in 0..UNIT_ATTENTION_RETRIES {
        if test_unit_ready(backend, TEST_UNIT_READY_TIMEOUT).is_ok() {
            break;
        }
        if attempt + 1 < UNIT_ATTENTION_RETRIES {
            std::thread::sleep(UNIT_ATTENTION_RETRY_DELAY);
        }
    }

    let alloc_len: u16 = 0x00ff;
    let cdb = Cdb::new(
        vec![
            0x5a,
            0x08,
            0x1d,
            0x00,
            0x00,
            0x00,
            0x00,
            (alloc_len >> 8) as u8,
            (alloc_len & 0xff) as u8,
            0x00,
        ],
        CdbDirection::FromDevice,
        0x0100,
        timeout,
    );
    let data = require_ok(backend.execute(&cdb))?;
    parse_element_address_page(&data)
}

fn parse_element_address_page(data: &[u8]) -> Result<ElementMap, ChangerError> {
    let header_size = std::mem::size_of::<ModeParameterHeader10>();
    let page_size = std::mem::size_of::<ElementAddressPage>();
    if data.len() < header_size {
        return Err(ChangerError::ProtocolParse(format!(
            "MODE SENSE page 0x1D response too short: {} bytes",
            data.len()
        )));
    }
    // SAFETY: both structs are `repr(C, packed)`; lengths are checked
    // against the buffer before each read.
    let header: ModeParameterHeader10 =
        unsafe { std::ptr::read_unaligned(data.as_ptr() as *const ModeParameterHeader10) }.from_be();

    let page_offset = header_size + header.block_descriptor_length as usize;
    if data.len() < page_offset + page_size {
        return Err(ChangerError::ProtocolParse(format!(
            "MODE SENSE page 0x1D response too short for a {page_size}-byte page at offset {page_offset}: {} bytes",
            data.len()
        )));
    }
    let page: ElementAddressPage =
        unsafe { std::ptr::read_unaligned(data[page_offset..].as_ptr() as *const ElementAddressPage) }.from_be();

    let ie_addr = if page.import_export_element_count > 0 {
        Some(page.import_export_element_address)
    } else {
        None
    };

    let slots: Vec<u16> = (0..page.storage_element_count)
        .map(|i| page.storage_element_address + i)
        .collect();

    Ok(ElementMap {
        transport_addr: page.medium_transport_element_address,
        drive_addr: page.data_transfer_element_address,
        ie_addr,
        slots,
    })
}

#[repr(C, packed)]
#[derive(Endian, Default, Clone, Copy)]
struct ElementStatusPageHeader {
    first_element_address: u16,
    number_of_elements: u16,
    reserved: u8,
    byte_count_of_descriptor_data: [u8; 3],
}

#[repr(C, packed)]
#[derive(Endian, Default, Clone, Copy)]
struct ElementStatusDescriptorHeader {
    element_type_code: u8,
    flags: u8,
    descriptor_length: u16,
}

#[repr(C, packed)]
#[derive(Endian, Default, Clone, Copy)]
struct ElementDescriptor {
    element_address: u16,
    flags1: u8,
    reserved: u8,
    additional_sense_code: u8,
    additional_sense_code_qualifier: u8,
    reserved2: [u8; 3],
    source_flags: u8,
    source_storage_element_address: u16,
    reserved3: [u8; 2],
}

/// READ ELEMENT STATUS (0xB8) — spec §4.6.4. `element_type` restricts the
/// scan to one element type (storage, import/export, ...); callers that
/// want everything pass `ElementType::Storage` then `ImportExport` etc.
/// separately, mirroring how the original always scanned per-type.
#[cfg(target_os = "macos")]
pub fn read_element_status(
    backend: &Backend,
    map: &ElementMap,
    element_type: ElementType,
    timeout: Duration,
) -> Result<Vec<ElementStatus>, ChangerError> {
    let starting_address = match element_type {
        ElementType::MediumTransport => map.transport_addr,
        ElementType::Storage => map.slot_address(0).unwrap_or(0),
        ElementType::ImportExport => map.ie_addr.unwrap_or(0),
        ElementType::DataTransfer => map.drive_addr,
    };
    let count = match element_type {
        ElementType::Storage => map.slot_count() as u16,
        ElementType::ImportExport => u16::from(map.has_ie()),
        _ => 1,
    };
    if count == 0 {
        return Ok(Vec::new());
    }

    // spec §4.6: allocate enough for every descriptor the device might
    // report, never less than 4096 and never more than a 16-bit field holds.
    let alloc_len: u32 = (4096u32.max(16 + 24 * u32::from(count))).min(0xffff);
    let cdb = Cdb::new(
        vec![
            0xb8,
            element_type.code(),
            (starting_address >> 8) as u8,
            (starting_address & 0xff) as u8,
            (count >> 8) as u8,
            (count & 0xff) as u8,
            0x00,
            (alloc_len >> 16) as u8,
            (alloc_len >> 8) as u8,
            (alloc_len & 0xff) as u8,
            0x00,
            0x00,
        ],
        CdbDirection::FromDevice,
        alloc_len as usize,
        timeout,
    );
    let data = require_ok(backend.execute(&cdb))?;
    parse_element_status(&data)
}

fn parse_element_status(data: &[u8]) -> Result<Vec<ElementStatus>, ChangerError> {
    let header_size = std::mem::size_of::<ElementStatusPageHeader>();
    let desc_header_size = std::mem::size_of::<ElementStatusDescriptorHeader>();
    if data.len() < header_size + desc_header_size {
        return Err(ChangerError::ProtocolParse("READ ELEMENT STATUS header truncated".into()));
    }

    // SAFETY: both structs are `repr(C, packed)`; lengths are checked above.
    let page_header: ElementStatusPageHeader =
        unsafe { std::ptr::read_unaligned(data.as_ptr() as *const ElementStatusPageHeader) }.from_be();
    let _ = page_header; // first_element_address / number_of_elements are informational only here

    let desc_header: ElementStatusDescriptorHeader = unsafe {
        std::ptr::read_unaligned(data[header_size..].as_ptr() as *const ElementStatusDescriptorHeader)
    }
    .from_be();

    let element_desc_size = std::mem::size_of::<ElementDescriptor>();
    let mut offset = header_size + desc_header_size;
    let mut results = Vec::new();

    while offset + element_desc_size <= data.len() {
        // Storage pages pad unused slots with an all-zero descriptor;
        // skip it rather than surfacing a bogus empty/non-full element
        // (spec §4.6, storage pages only).
        if desc_header.element_type_code == 0x02 && data[offset..offset + 12].iter().all(|b| *b == 0) {
            offset += std::cmp::max(element_desc_size, desc_header.descriptor_length as usize);
            continue;
        }

        // SAFETY: loop condition guarantees `element_desc_size` bytes remain.
        let elem: ElementDescriptor =
            unsafe { std::ptr::read_unaligned(data[offset..].as_ptr() as *const ElementDescriptor) }.from_be();

        let full = elem.flags1 & 0x01 != 0;
        let exception = elem.flags1 & 0x04 != 0;
        let source_address = if elem.source_flags & 0x80 != 0 {
            Some(elem.source_storage_element_address)
        } else {
            None
        };

        results.push(ElementStatus {
            address: elem.element_address,
            full,
            exception,
            source_address,
        });

        offset += std::cmp::max(element_desc_size, desc_header.descriptor_length as usize);
    }

    Ok(results)
}

/// MOVE MEDIUM (0xA5) — spec §4.6.5.
#[cfg(target_os = "macos")]
pub fn move_medium(
    backend: &Backend,
    map: &ElementMap,
    source_address: u16,
    destination_address: u16,
    timeout: Duration,
) -> Result<(), ChangerError> {
    let cdb = Cdb::new(
        vec![
            0xa5,
            0x00,
            (map.transport_addr >> 8) as u8,
            (map.transport_addr & 0xff) as u8,
            (source_address >> 8) as u8,
            (source_address & 0xff) as u8,
            (destination_address >> 8) as u8,
            (destination_address & 0xff) as u8,
            0x00,
            0x00,
            0x00,
            0x00,
        ],
        CdbDirection::None,
        0,
        timeout,
    );
    require_ok(backend.execute(&cdb))?;
    Ok(())
}

/// INITIALIZE ELEMENT STATUS (0x07) — spec §4.6.6.
///
/// A caller that sees `ChangerError::CommandSense { key: 0x02, asc: 0x04,
/// ascq: 0x02, .. }` ("needs INITIALIZE ELEMENT STATUS") from any other
/// command should issue this once and retry; this function itself never
/// retries on its own failure (spec §7 propagation policy).
#[cfg(target_os = "macos")]
pub fn init_element_status(backend: &Backend, timeout: Duration) -> Result<(), ChangerError> {
    let cdb = Cdb::new(vec![0x07, 0, 0, 0, 0, 0], CdbDirection::None, 0, timeout);
    require_ok(backend.execute(&cdb))?;
    Ok(())
}

pub fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// TEST UNIT READY's timeout (spec §4.6.1).
pub fn test_unit_ready_timeout() -> Duration {
    TEST_UNIT_READY_TIMEOUT
}

/// MOVE MEDIUM / INITIALIZE ELEMENT STATUS's timeout (spec §4.6.5/§4.6.6).
pub fn mechanical_timeout() -> Duration {
    MECHANICAL_TIMEOUT
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_inquiry_response() {
        let mut data = vec![0u8; 36];
        data[0] = 0x08; // medium changer
        data[8..16].copy_from_slice(b"VENDOR  ");
        data[16..32].copy_from_slice(b"CHANGER MODEL   ");
        data[32..36].copy_from_slice(b"1.0 ");
        let info = parse_inquiry(&data).unwrap();
        assert!(info.is_media_changer());
        assert_eq!(info.vendor, "VENDOR");
        assert_eq!(info.product, "CHANGER MODEL");
        assert_eq!(info.revision, "1.0");
    }

    #[test]
    fn inquiry_too_short_is_protocol_error() {
        let err = parse_inquiry(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, ChangerError::ProtocolParse(_)));
    }

    #[test]
    fn require_ok_maps_each_outcome_variant() {
        assert!(require_ok(CdbOutcome::Ok(vec![1])).is_ok());
        assert!(matches!(
            require_ok(CdbOutcome::ErrSense(mediachanger_types::SenseData::new(true, 0x05, 0x3b, 0x0e))),
            Err(ChangerError::CommandSense { key: 0x05, asc: 0x3b, ascq: 0x0e })
        ));
        assert!(matches!(
            require_ok(CdbOutcome::ErrTransport("boom".into())),
            Err(ChangerError::CommandTransport(_))
        ));
    }

    /// Builds a full MODE SENSE(10) response: the 8-byte parameter header
    /// (with the given block-descriptor length, zero-filled) followed by
    /// the page 0x1D body.
    fn build_element_address_page_with_bdl(
        bdl: u16,
        transport: u16,
        storage_addr: u16,
        storage_count: u16,
        ie_addr: u16,
        ie_count: u16,
        drive: u16,
    ) -> Vec<u8> {
        let header_size = std::mem::size_of::<ModeParameterHeader10>();
        let page_size = std::mem::size_of::<ElementAddressPage>();
        let mut v = vec![0u8; header_size + bdl as usize + page_size];
        v[6..8].copy_from_slice(&bdl.to_be_bytes());

        let page = header_size + bdl as usize;
        v[page] = 0x1d; // page_code
        v[page + 1] = 0x12; // page_length
        v[page + 2..page + 4].copy_from_slice(&transport.to_be_bytes());
        v[page + 4..page + 6].copy_from_slice(&1u16.to_be_bytes());
        v[page + 6..page + 8].copy_from_slice(&storage_addr.to_be_bytes());
        v[page + 8..page + 10].copy_from_slice(&storage_count.to_be_bytes());
        v[page + 10..page + 12].copy_from_slice(&ie_addr.to_be_bytes());
        v[page + 12..page + 14].copy_from_slice(&ie_count.to_be_bytes());
        v[page + 14..page + 16].copy_from_slice(&drive.to_be_bytes());
        v[page + 16..page + 18].copy_from_slice(&1u16.to_be_bytes());
        v
    }

    fn build_element_address_page(transport: u16, storage_addr: u16, storage_count: u16, ie_addr: u16, ie_count: u16, drive: u16) -> Vec<u8> {
        build_element_address_page_with_bdl(0, transport, storage_addr, storage_count, ie_addr, ie_count, drive)
    }

    #[test]
    fn parses_element_address_page() {
        let data = build_element_address_page(1, 16, 30, 17, 1, 4);
        let map = parse_element_address_page(&data).unwrap();
        assert_eq!(map.transport_addr, 1);
        assert_eq!(map.drive_addr, 4);
        assert_eq!(map.ie_addr, Some(17));
        assert_eq!(map.slot_count(), 30);
        assert_eq!(map.slot_address(0), Some(16));
    }

    #[test]
    fn no_import_export_slots_yields_none() {
        let data = build_element_address_page(1, 16, 30, 0, 0, 4);
        let map = parse_element_address_page(&data).unwrap();
        assert!(!map.has_ie());
        assert_eq!(map.ie_addr, None);
    }

    #[test]
    fn honors_nonzero_block_descriptor_length() {
        let data = build_element_address_page_with_bdl(8, 1, 16, 30, 17, 1, 4);
        let map = parse_element_address_page(&data).unwrap();
        assert_eq!(map.transport_addr, 1);
        assert_eq!(map.drive_addr, 4);
        assert_eq!(map.slot_address(0), Some(16));
    }

    fn build_element_status_page(entries: &[(u16, bool, bool, Option<u16>)]) -> Vec<u8> {
        let header_size = std::mem::size_of::<ElementStatusPageHeader>();
        let desc_header_size = std::mem::size_of::<ElementStatusDescriptorHeader>();
        let elem_size = std::mem::size_of::<ElementDescriptor>();

        let mut v = vec![0u8; header_size + desc_header_size];
        v[2..4].copy_from_slice(&(entries.len() as u16).to_be_bytes());
        v[header_size] = 0x02; // storage element
        v[header_size + 2..header_size + 4].copy_from_slice(&(elem_size as u16).to_be_bytes());

        for (addr, full, exception, source) in entries {
            let mut e = vec![0u8; elem_size];
            e[0..2].copy_from_slice(&addr.to_be_bytes());
            let mut flags = 0u8;
            if *full {
                flags |= 0x01;
            }
            if *exception {
                flags |= 0x04;
            }
            e[2] = flags;
            if let Some(src) = source {
                e[8] = 0x80;
                e[9..11].copy_from_slice(&src.to_be_bytes());
            }
            v.extend_from_slice(&e);
        }
        v
    }

    #[test]
    fn parses_element_status_entries() {
        let data = build_element_status_page(&[(16, true, false, Some(4)), (17, false, false, None)]);
        let statuses = parse_element_status(&data).unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].address, 16);
        assert!(statuses[0].full);
        assert_eq!(statuses[0].source_address, Some(4));
        assert!(!statuses[1].full);
        assert_eq!(statuses[1].source_address, None);
    }

    #[test]
    fn truncated_header_is_protocol_error() {
        let err = parse_element_status(&[0u8; 3]).unwrap_err();
        assert!(matches!(err, ChangerError::ProtocolParse(_)));
    }

    #[test]
    fn storage_padding_descriptor_is_skipped() {
        let mut data = build_element_status_page(&[(16, true, false, None)]);
        data.extend_from_slice(&vec![0u8; std::mem::size_of::<ElementDescriptor>()]);
        let statuses = parse_element_status(&data).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].address, 16);
    }
}
