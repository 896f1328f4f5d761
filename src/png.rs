//! PNG chunk codec: textual-chunk stripping and tEXt/iTXt fabrication.
//!
//! PNG is an 8-byte signature followed by chunks of
//! `{length: u32 BE, type: 4 bytes, data, crc32}` where the CRC covers
//! type + data. Descriptive metadata travels in `tEXt`/`zTXt`/`iTXt`
//! chunks and the `tIME` timestamp chunk; everything else is copied
//! through byte-for-byte with its original CRC, since untouched content
//! never needs a recomputed checksum.

use crate::binary::{crc32, push_u32_be, try_read_u32_be};
use crate::record::MetadataRecord;
use crate::{ScrambleError, ScrambleResult};

/// Fixed 8-byte PNG signature.
pub const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Chunk types that carry descriptive metadata.
const STRIP_TYPES: [&[u8; 4]; 4] = [b"tEXt", b"zTXt", b"iTXt", b"tIME"];

/// Drop every metadata chunk, copying all other chunks verbatim.
pub fn strip(data: &[u8]) -> ScrambleResult<Vec<u8>> {
    walk(data, true)
}

/// Structural check: signature plus a clean chunk walk ending in `IEND`.
pub fn validate(data: &[u8]) -> ScrambleResult<()> {
    walk(data, false).map(|_| ())
}

/// Walk all chunks, dropping the metadata types when `drop_text` is set
/// and copying everything else. Returns `MalformedInput` on a bad
/// signature, a truncated chunk header, or a missing `IEND`.
fn walk(data: &[u8], drop_text: bool) -> ScrambleResult<Vec<u8>> {
    if data.len() < 8 || data[0..8] != SIGNATURE {
        return Err(ScrambleError::MalformedInput("invalid PNG signature".to_string()));
    }

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&SIGNATURE);
    let mut pos = 8;
    let mut saw_iend = false;

    while pos < data.len() {
        let length = try_read_u32_be(data, pos).ok_or_else(|| {
            ScrambleError::MalformedInput("truncated chunk length".to_string())
        })? as usize;
        let chunk_type: [u8; 4] = match data.get(pos + 4..pos + 8) {
            Some(t) => [t[0], t[1], t[2], t[3]],
            None => {
                return Err(ScrambleError::MalformedInput(
                    "truncated chunk type".to_string(),
                ));
            }
        };
        let chunk_end = pos + 8 + length + 4;
        if chunk_end > data.len() {
            return Err(ScrambleError::MalformedInput(
                "chunk data extends beyond file".to_string(),
            ));
        }

        if !(drop_text && STRIP_TYPES.contains(&&chunk_type)) {
            out.extend_from_slice(&data[pos..chunk_end]);
        }
        pos = chunk_end;

        if &chunk_type == b"IEND" {
            saw_iend = true;
            break;
        }
    }

    if !saw_iend {
        return Err(ScrambleError::MalformedInput("missing IEND chunk".to_string()));
    }
    Ok(out)
}

/// Serialize one chunk: length, type, data, CRC32 over type + data.
fn chunk(chunk_type: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + data.len());
    push_u32_be(&mut out, data.len() as u32);
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);

    let mut crc_input = Vec::with_capacity(4 + data.len());
    crc_input.extend_from_slice(chunk_type);
    crc_input.extend_from_slice(data);
    push_u32_be(&mut out, crc32(&crc_input));
    out
}

/// One `tEXt` chunk: `keyword\0value`, both Latin-1-safe ASCII here.
fn text_chunk(keyword: &str, value: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(keyword.len() + 1 + value.len());
    payload.extend_from_slice(keyword.as_bytes());
    payload.push(0);
    payload.extend_from_slice(value.as_bytes());
    chunk(b"tEXt", &payload)
}

/// One uncompressed `iTXt` chunk with empty language/translated-keyword
/// fields.
fn itxt_chunk(keyword: &str, value: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(keyword.as_bytes());
    payload.push(0); // keyword terminator
    payload.push(0); // compression flag: uncompressed
    payload.push(0); // compression method
    payload.push(0); // empty language tag
    payload.push(0); // empty translated keyword
    payload.extend_from_slice(value.as_bytes());
    chunk(b"iTXt", &payload)
}

/// Build the fabricated metadata chunks: one `tEXt` per field and one
/// `iTXt` for the GPS string (appended only when requested).
pub fn build_text_chunks(record: &MetadataRecord, include_gps: bool) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&text_chunk("Author", &record.author));
    out.extend_from_slice(&text_chunk("Creation Time", &record.timestamp.to_rfc2822()));
    out.extend_from_slice(&text_chunk("Software", &record.software));
    out.extend_from_slice(&text_chunk("Camera", &record.camera));
    out.extend_from_slice(&text_chunk(
        "Description",
        &format!("Photograph by {}", record.author),
    ));
    if include_gps {
        out.extend_from_slice(&itxt_chunk("GPS", &record.gps_display()));
    }
    out
}

/// Insert `chunks` immediately before the `IEND` chunk, located by the
/// last occurrence of its type tag (backing up 4 bytes to the start of
/// its length field).
pub fn splice(data: &[u8], chunks: &[u8]) -> ScrambleResult<Vec<u8>> {
    let tag_pos = data
        .windows(4)
        .rposition(|w| w == b"IEND")
        .ok_or_else(|| ScrambleError::MalformedInput("missing IEND chunk".to_string()))?;
    if tag_pos < 4 {
        return Err(ScrambleError::MalformedInput("IEND chunk has no length field".to_string()));
    }
    let iend_start = tag_pos - 4;

    let mut out = Vec::with_capacity(data.len() + chunks.len());
    out.extend_from_slice(&data[..iend_start]);
    out.extend_from_slice(chunks);
    out.extend_from_slice(&data[iend_start..]);
    Ok(out)
}
