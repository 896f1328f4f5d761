//! JPEG EXIF codec: APP1/COM segment stripping and EXIF fabrication.
//!
//! JPEG files are a chain of `FF xx` marker segments. Metadata lives in
//! APP1 (`FF E1`, EXIF or XMP) and COM (`FF FE`) segments, each carrying a
//! 2-byte big-endian length that covers the length field itself. The walk
//! ends at SOS — everything from there is entropy-coded scan data and is
//! copied through untouched.
//!
//! Fabrication builds a fresh APP1 segment from scratch: `Exif\0\0`
//! identifier, little-endian TIFF header, IFD0 with the descriptive tags,
//! and optionally a GPS sub-IFD. Every variable-length value lands in a
//! data area after the IFD and its offset is derived from the actual entry
//! list, relative to the TIFF header start. Built segments are re-parsed
//! by [`validate_segment`] before they are ever spliced into a file.

use crate::binary::{push_rational_le, push_u16_be, push_u16_le, push_u32_le, try_read_u16_be};
use crate::record::MetadataRecord;
use crate::{ScrambleError, ScrambleResult};

/// JPEG marker bytes.
mod markers {
    pub const PREFIX: u8 = 0xFF;

    pub const SOI: u8 = 0xD8; // Start of image.
    pub const EOI: u8 = 0xD9; // End of image.
    pub const SOS: u8 = 0xDA; // Start of scan.
    pub const TEM: u8 = 0x01;

    pub const RST0: u8 = 0xD0;
    pub const RST7: u8 = 0xD7;

    pub const APP1: u8 = 0xE1; // EXIF, XMP.
    pub const COM: u8 = 0xFE; // Comment.
}

/// TIFF field types.
mod tiff {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
}

// IFD0 tag IDs.
const TAG_MODEL: u16 = 0x0110;
const TAG_ORIENTATION: u16 = 0x0112;
const TAG_X_RESOLUTION: u16 = 0x011A;
const TAG_SOFTWARE: u16 = 0x0131;
const TAG_DATETIME: u16 = 0x0132;
const TAG_ARTIST: u16 = 0x013B;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_DATETIME_ORIGINAL: u16 = 0x9003;

// GPS sub-IFD tag IDs.
const TAG_GPS_VERSION: u16 = 0x0000;
const TAG_GPS_LAT_REF: u16 = 0x0001;
const TAG_GPS_LAT: u16 = 0x0002;
const TAG_GPS_LON_REF: u16 = 0x0003;
const TAG_GPS_LON: u16 = 0x0004;
const TAG_GPS_ALT_REF: u16 = 0x0005;
const TAG_GPS_ALT: u16 = 0x0006;
const TAG_GPS_TIMESTAMP: u16 = 0x0007;
const TAG_GPS_SATELLITES: u16 = 0x0008;
const TAG_GPS_STATUS: u16 = 0x0009;
const TAG_GPS_DATE_STAMP: u16 = 0x001D;

const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";

/// Remove every APP1 (EXIF/XMP) segment.
pub fn strip_app1(data: &[u8]) -> ScrambleResult<Vec<u8>> {
    strip_targets(data, &[markers::APP1])
}

/// Remove every COM comment segment.
pub fn strip_comments(data: &[u8]) -> ScrambleResult<Vec<u8>> {
    strip_targets(data, &[markers::COM])
}

/// Remove APP1 and COM segments in a single pass.
pub fn strip_metadata(data: &[u8]) -> ScrambleResult<Vec<u8>> {
    strip_targets(data, &[markers::APP1, markers::COM])
}

/// Structural well-formedness check: SOI present and the marker chain
/// walks cleanly to SOS/EOI with every length field in bounds.
pub fn validate(data: &[u8]) -> ScrambleResult<()> {
    strip_targets(data, &[]).map(|_| ())
}

/// Walk the marker chain, dropping segments whose marker byte is in
/// `targets` and copying everything else verbatim.
///
/// A marker byte followed by `0x00` is a stuffed `FF 00` inside entropy
/// data; it terminates the walk and the remainder is copied unmodified,
/// as does reaching SOS. Fill bytes (runs of `0xFF`) belong to the marker
/// that follows them.
fn strip_targets(data: &[u8], targets: &[u8]) -> ScrambleResult<Vec<u8>> {
    if data.len() < 2 || data[0] != markers::PREFIX || data[1] != markers::SOI {
        return Err(ScrambleError::MalformedInput(
            "missing JPEG SOI marker".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[0..2]);
    let mut pos = 2;

    while pos < data.len() {
        if data[pos] != markers::PREFIX {
            // Entropy-coded or trailing data.
            out.extend_from_slice(&data[pos..]);
            break;
        }

        // Skip fill bytes; the marker is the first non-FF byte.
        let mut marker_pos = pos + 1;
        while marker_pos < data.len() && data[marker_pos] == markers::PREFIX {
            marker_pos += 1;
        }
        if marker_pos >= data.len() {
            out.extend_from_slice(&data[pos..]);
            break;
        }

        let marker = data[marker_pos];
        match marker {
            0x00 => {
                // Stuffed FF 00 — we are inside scan data.
                out.extend_from_slice(&data[pos..]);
                break;
            }
            markers::EOI => {
                out.extend_from_slice(&[markers::PREFIX, markers::EOI]);
                break;
            }
            markers::TEM | markers::RST0..=markers::RST7 => {
                out.extend_from_slice(&[markers::PREFIX, marker]);
                pos = marker_pos + 1;
            }
            markers::SOS => {
                // Scan data runs to the end of the file.
                out.extend_from_slice(&data[pos..]);
                break;
            }
            _ => {
                let length = try_read_u16_be(data, marker_pos + 1).ok_or_else(|| {
                    ScrambleError::MalformedInput("truncated segment length".to_string())
                })? as usize;
                if length < 2 {
                    return Err(ScrambleError::MalformedInput(
                        "segment length smaller than its own field".to_string(),
                    ));
                }
                let seg_end = marker_pos + 1 + length;
                if seg_end > data.len() {
                    return Err(ScrambleError::MalformedInput(
                        "segment extends beyond end of file".to_string(),
                    ));
                }
                if !targets.contains(&marker) {
                    out.extend_from_slice(&data[pos..seg_end]);
                }
                pos = seg_end;
            }
        }
    }

    Ok(out)
}

/// A single 12-byte IFD entry plus its out-of-line value, if any.
struct IfdEntry {
    tag: u16,
    format: u16,
    count: u32,
    inline: [u8; 4],
    data: Option<Vec<u8>>,
}

fn ascii_entry(tag: u16, text: &str) -> IfdEntry {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    let count = bytes.len() as u32;
    if bytes.len() <= 4 {
        let mut inline = [0u8; 4];
        inline[..bytes.len()].copy_from_slice(&bytes);
        IfdEntry { tag, format: tiff::ASCII, count, inline, data: None }
    } else {
        IfdEntry { tag, format: tiff::ASCII, count, inline: [0; 4], data: Some(bytes) }
    }
}

fn short_entry(tag: u16, value: u16) -> IfdEntry {
    let mut inline = [0u8; 4];
    inline[..2].copy_from_slice(&value.to_le_bytes());
    IfdEntry { tag, format: tiff::SHORT, count: 1, inline, data: None }
}

fn long_entry(tag: u16, value: u32) -> IfdEntry {
    IfdEntry { tag, format: tiff::LONG, count: 1, inline: value.to_le_bytes(), data: None }
}

fn byte_entry(tag: u16, bytes: &[u8]) -> IfdEntry {
    let count = bytes.len() as u32;
    if bytes.len() <= 4 {
        let mut inline = [0u8; 4];
        inline[..bytes.len()].copy_from_slice(bytes);
        IfdEntry { tag, format: tiff::BYTE, count, inline, data: None }
    } else {
        IfdEntry { tag, format: tiff::BYTE, count, inline: [0; 4], data: Some(bytes.to_vec()) }
    }
}

fn rational_entry(tag: u16, pairs: &[(u32, u32)]) -> IfdEntry {
    let mut data = Vec::with_capacity(pairs.len() * 8);
    for &(num, den) in pairs {
        push_rational_le(&mut data, num, den);
    }
    IfdEntry {
        tag,
        format: tiff::RATIONAL,
        count: pairs.len() as u32,
        inline: [0; 4],
        data: Some(data),
    }
}

/// Bytes a serialized IFD occupies: count field, entries, next-IFD
/// pointer, and the data area for out-of-line values.
fn ifd_size(entries: &[IfdEntry]) -> u32 {
    let data: usize = entries.iter().map(|e| e.data.as_ref().map_or(0, Vec::len)).sum();
    (2 + entries.len() * 12 + 4 + data) as u32
}

/// Serialize one IFD at `ifd_offset` (relative to the TIFF header start).
///
/// Entries are written in ascending tag order and every out-of-line value
/// offset is derived from a running cursor into the data area that starts
/// right after the next-IFD pointer — never from a hard-coded entry count.
fn write_ifd(mut entries: Vec<IfdEntry>, ifd_offset: u32, next_ifd: u32) -> Vec<u8> {
    entries.sort_by_key(|e| e.tag);

    let data_start = ifd_offset + 2 + entries.len() as u32 * 12 + 4;
    let mut out = Vec::new();
    let mut data_area = Vec::new();

    push_u16_le(&mut out, entries.len() as u16);
    for entry in &entries {
        push_u16_le(&mut out, entry.tag);
        push_u16_le(&mut out, entry.format);
        push_u32_le(&mut out, entry.count);
        match &entry.data {
            Some(bytes) => {
                push_u32_le(&mut out, data_start + data_area.len() as u32);
                data_area.extend_from_slice(bytes);
            }
            None => out.extend_from_slice(&entry.inline),
        }
    }
    push_u32_le(&mut out, next_ifd);
    out.extend_from_slice(&data_area);
    out
}

/// Absolute coordinate as TIFF rationals: degrees, minutes, and
/// ten-thousandths of a second.
fn dms_rationals(coord: f64) -> [(u32, u32); 3] {
    let abs = coord.abs();
    let degrees = abs.floor() as u32;
    let minutes = ((abs - degrees as f64) * 60.0).floor() as u32;
    let seconds =
        ((abs - degrees as f64 - minutes as f64 / 60.0) * 3600.0 * 10_000.0).round() as u32;
    [(degrees, 1), (minutes, 1), (seconds, 10_000)]
}

fn gps_entries(record: &MetadataRecord) -> Vec<IfdEntry> {
    vec![
        byte_entry(TAG_GPS_VERSION, &[2, 3, 0, 0]),
        ascii_entry(TAG_GPS_LAT_REF, &record.lat_ref().to_string()),
        rational_entry(TAG_GPS_LAT, &dms_rationals(record.latitude)),
        ascii_entry(TAG_GPS_LON_REF, &record.lon_ref().to_string()),
        rational_entry(TAG_GPS_LON, &dms_rationals(record.longitude)),
        byte_entry(TAG_GPS_ALT_REF, &[0]),
        rational_entry(TAG_GPS_ALT, &[(0, 1)]),
        rational_entry(
            TAG_GPS_TIMESTAMP,
            &{
                use chrono::Timelike;
                let t = record.timestamp;
                [(t.hour(), 1), (t.minute(), 1), (t.second(), 1)]
            },
        ),
        ascii_entry(TAG_GPS_SATELLITES, "08"),
        ascii_entry(TAG_GPS_STATUS, "A"),
        ascii_entry(TAG_GPS_DATE_STAMP, &record.exif_date()),
    ]
}

/// Build the APP1 payload: `Exif\0\0` + little-endian TIFF header + IFD0
/// (+ GPS sub-IFD when requested). Offsets are relative to the TIFF
/// header start, byte 0 being the `I` of `II`.
pub fn build_exif_payload(record: &MetadataRecord, include_gps: bool) -> Vec<u8> {
    let mut ifd0 = vec![
        ascii_entry(TAG_MODEL, &record.camera),
        short_entry(TAG_ORIENTATION, 1),
        rational_entry(TAG_X_RESOLUTION, &[(72, 1)]),
        ascii_entry(TAG_SOFTWARE, &record.software),
        ascii_entry(TAG_DATETIME, &record.exif_datetime()),
        ascii_entry(TAG_ARTIST, &record.author),
        ascii_entry(TAG_DATETIME_ORIGINAL, &record.exif_datetime()),
    ];

    let gps = include_gps.then(|| gps_entries(record));
    if gps.is_some() {
        // Pointer value is the IFD0 size itself plus the 8-byte TIFF
        // header; IFD0 grows by this entry, so account for it first.
        ifd0.push(long_entry(TAG_GPS_IFD, 0));
        let gps_offset = 8 + ifd_size(&ifd0);
        if let Some(pointer) = ifd0.iter_mut().find(|e| e.tag == TAG_GPS_IFD) {
            pointer.inline = gps_offset.to_le_bytes();
        }
    }

    let mut payload = Vec::new();
    payload.extend_from_slice(EXIF_IDENTIFIER);
    payload.extend_from_slice(b"II");
    push_u16_le(&mut payload, 42);
    push_u32_le(&mut payload, 8);

    let gps_offset = 8 + ifd_size(&ifd0);
    payload.extend_from_slice(&write_ifd(ifd0, 8, 0));
    if let Some(entries) = gps {
        payload.extend_from_slice(&write_ifd(entries, gps_offset, 0));
    }
    payload
}

/// Build the complete APP1 segment: `FF E1` marker, 2-byte length, payload.
pub fn build_segment(record: &MetadataRecord, include_gps: bool) -> Vec<u8> {
    let payload = build_exif_payload(record, include_gps);
    let mut segment = Vec::with_capacity(payload.len() + 4);
    segment.extend_from_slice(&[markers::PREFIX, markers::APP1]);
    push_u16_be(&mut segment, (payload.len() + 2) as u16);
    segment.extend_from_slice(&payload);
    segment
}

/// Remove any existing APP1 segments, then insert `segment` immediately
/// after SOI — APP1 first keeps the widest reader compatibility.
pub fn splice(data: &[u8], segment: &[u8]) -> ScrambleResult<Vec<u8>> {
    let stripped = strip_app1(data)?;
    let mut out = Vec::with_capacity(stripped.len() + segment.len());
    out.extend_from_slice(&stripped[0..2]);
    out.extend_from_slice(segment);
    out.extend_from_slice(&stripped[2..]);
    Ok(out)
}

/// Re-parse a freshly built segment and check its structure.
///
/// Asserts the APP1 marker, a declared length that covers the payload,
/// the `Exif\0\0` identifier, a TIFF byte-order token of `II`/`MM` with
/// magic 42, and — when a GPS-IFD pointer is present — that its target
/// lies inside the segment with a plausible tag count (≥ 5). Any failure
/// aborts the write.
pub fn validate_segment(segment: &[u8]) -> ScrambleResult<()> {
    if segment.len() < 4 + EXIF_IDENTIFIER.len() + 8 {
        return Err(ScrambleError::BuildValidation("segment too short".to_string()));
    }
    if segment[0] != markers::PREFIX || segment[1] != markers::APP1 {
        return Err(ScrambleError::BuildValidation("missing APP1 marker".to_string()));
    }
    let declared = try_read_u16_be(segment, 2)
        .ok_or_else(|| ScrambleError::BuildValidation("missing length field".to_string()))?
        as usize;
    if declared < segment.len() - 2 {
        return Err(ScrambleError::BuildValidation(
            "declared length shorter than payload".to_string(),
        ));
    }
    if &segment[4..4 + EXIF_IDENTIFIER.len()] != EXIF_IDENTIFIER {
        return Err(ScrambleError::BuildValidation("missing Exif identifier".to_string()));
    }

    let tiff = &segment[4 + EXIF_IDENTIFIER.len()..];
    let big_endian = match &tiff[0..2] {
        b"II" => false,
        b"MM" => true,
        _ => {
            return Err(ScrambleError::BuildValidation(
                "invalid TIFF byte-order token".to_string(),
            ));
        }
    };
    if read_u16_endian(tiff, 2, big_endian) != Some(42) {
        return Err(ScrambleError::BuildValidation("bad TIFF magic".to_string()));
    }

    // Walk IFD0 looking for a GPS-IFD pointer.
    let ifd0_offset = read_u32_endian(tiff, 4, big_endian)
        .ok_or_else(|| ScrambleError::BuildValidation("truncated IFD0 offset".to_string()))?
        as usize;
    let count = read_u16_endian(tiff, ifd0_offset, big_endian)
        .ok_or_else(|| ScrambleError::BuildValidation("IFD0 offset out of bounds".to_string()))?
        as usize;
    for i in 0..count {
        let entry = ifd0_offset + 2 + i * 12;
        let tag = read_u16_endian(tiff, entry, big_endian).ok_or_else(|| {
            ScrambleError::BuildValidation("IFD0 entry out of bounds".to_string())
        })?;
        if tag == TAG_GPS_IFD {
            let gps_offset = read_u32_endian(tiff, entry + 8, big_endian).ok_or_else(|| {
                ScrambleError::BuildValidation("truncated GPS pointer".to_string())
            })? as usize;
            let gps_count = read_u16_endian(tiff, gps_offset, big_endian).ok_or_else(|| {
                ScrambleError::BuildValidation("GPS IFD offset outside segment".to_string())
            })?;
            if gps_count < 5 {
                return Err(ScrambleError::BuildValidation(
                    format!("GPS IFD tag count {gps_count} implausibly small"),
                ));
            }
        }
    }
    Ok(())
}

fn read_u16_endian(bytes: &[u8], offset: usize, big_endian: bool) -> Option<u16> {
    let b = bytes.get(offset..offset + 2)?;
    Some(if big_endian {
        u16::from_be_bytes([b[0], b[1]])
    } else {
        u16::from_le_bytes([b[0], b[1]])
    })
}

fn read_u32_endian(bytes: &[u8], offset: usize, big_endian: bool) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(if big_endian {
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    } else {
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    })
}
