//! ID3 codec: v2 head and v1 tail tag stripping and rebuilding.
//!
//! An MP3 can carry metadata at both ends. ID3v2 sits at the head:
//! `"ID3"` + version/revision/flags + a 4-byte synchsafe size covering
//! the frame body (plus a 10-byte footer when flag bit 4 is set). ID3v1
//! is a fixed 128-byte block at the tail starting with `"TAG"`. The two
//! are independent; stripping removes both, fabrication rebuilds both
//! around the untouched audio frames.
//!
//! v2 tags are written as version 2.3, where frame sizes are plain
//! big-endian u32 — only the outer tag size is synchsafe.

use crate::binary::{push_fixed_ascii, push_u16_be, push_u32_be, synchsafe_decode, synchsafe_encode};
use crate::record::MetadataRecord;
use crate::{ScrambleError, ScrambleResult};

/// ID3v1 tag length.
pub const V1_LEN: usize = 128;

const V2_HEADER_LEN: usize = 10;
const FOOTER_FLAG: u8 = 0x10;

/// ID3v1 genre "Other".
const GENRE_OTHER: u8 = 12;

/// Total length of a leading ID3v2 tag (header + body + optional
/// footer), or `None` when the stream does not start with one.
pub fn v2_tag_len(data: &[u8]) -> ScrambleResult<Option<usize>> {
    if data.len() < V2_HEADER_LEN || &data[0..3] != b"ID3" {
        return Ok(None);
    }
    let flags = data[5];
    let size = synchsafe_decode(&[data[6], data[7], data[8], data[9]]) as usize;
    let mut total = V2_HEADER_LEN + size;
    if flags & FOOTER_FLAG != 0 {
        total += V2_HEADER_LEN;
    }
    if total > data.len() {
        return Err(ScrambleError::MalformedInput(
            "ID3v2 size exceeds file length".to_string(),
        ));
    }
    Ok(Some(total))
}

/// Remove a leading ID3v2 tag. Returns the number of bytes skipped and
/// the remaining stream; a stream without a v2 tag is returned as-is
/// with offset 0.
pub fn strip_v2(data: &[u8]) -> ScrambleResult<(usize, Vec<u8>)> {
    match v2_tag_len(data)? {
        Some(total) => Ok((total, data[total..].to_vec())),
        None => Ok((0, data.to_vec())),
    }
}

/// True when the stream ends with a 128-byte ID3v1 block.
pub fn has_v1(data: &[u8]) -> bool {
    data.len() >= V1_LEN && &data[data.len() - V1_LEN..data.len() - V1_LEN + 3] == b"TAG"
}

/// Remove a trailing ID3v1 block, exactly 128 bytes, if present.
pub fn strip_v1(data: &[u8]) -> Vec<u8> {
    if has_v1(data) {
        data[..data.len() - V1_LEN].to_vec()
    } else {
        data.to_vec()
    }
}

/// Build a fixed-layout ID3v1 tag:
/// `TAG`(3) + Title(30) + Artist(30) + Album(30) + Year(4) + Comment(30)
/// + Genre(1). Text fields are zero-padded/truncated to width.
pub fn build_v1(record: &MetadataRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(V1_LEN);
    out.extend_from_slice(b"TAG");
    push_fixed_ascii(&mut out, &format!("Recording {}", record.year()), 30);
    push_fixed_ascii(&mut out, &record.author, 30);
    push_fixed_ascii(&mut out, "Unknown Album", 30);
    push_fixed_ascii(&mut out, &record.year(), 4);
    push_fixed_ascii(&mut out, &record.software, 30);
    out.push(GENRE_OTHER);
    out
}

/// One v2.3 text frame: 4-byte id, plain big-endian size, zero flags,
/// then an ISO-8859-1 encoding byte and the text.
fn text_frame(id: &[u8; 4], text: &str) -> Vec<u8> {
    let body_len = 1 + text.len();
    let mut out = Vec::with_capacity(10 + body_len);
    out.extend_from_slice(id);
    push_u32_be(&mut out, body_len as u32);
    push_u16_be(&mut out, 0);
    out.push(0); // ISO-8859-1
    out.extend_from_slice(text.as_bytes());
    out
}

/// A `TXXX` user-defined frame: encoding byte, description, NUL, value.
fn txxx_frame(description: &str, value: &str) -> Vec<u8> {
    let body_len = 1 + description.len() + 1 + value.len();
    let mut out = Vec::with_capacity(10 + body_len);
    out.extend_from_slice(b"TXXX");
    push_u32_be(&mut out, body_len as u32);
    push_u16_be(&mut out, 0);
    out.push(0);
    out.extend_from_slice(description.as_bytes());
    out.push(0);
    out.extend_from_slice(value.as_bytes());
    out
}

/// Build an ID3v2.3 tag. The outer size field is the synchsafe encoding
/// of the summed frame length.
pub fn build_v2(record: &MetadataRecord, include_gps: bool) -> Vec<u8> {
    let mut frames = Vec::new();
    frames.extend_from_slice(&text_frame(b"TPE1", &record.author));
    frames.extend_from_slice(&text_frame(b"TDRC", &record.iso_8601()));
    frames.extend_from_slice(&text_frame(b"TSSE", &record.software));
    frames.extend_from_slice(&txxx_frame("Camera", &record.camera));
    if include_gps {
        frames.extend_from_slice(&txxx_frame("GPS", &record.gps_display()));
    }

    let mut out = Vec::with_capacity(V2_HEADER_LEN + frames.len());
    out.extend_from_slice(b"ID3");
    out.push(3); // version
    out.push(0); // revision
    out.push(0); // flags
    out.extend_from_slice(&synchsafe_encode(frames.len() as u32));
    out.extend_from_slice(&frames);
    out
}

/// Structural consistency check: whichever tags are present must frame
/// correctly (v2 size in bounds, v1 block exactly at the tail).
pub fn validate(data: &[u8]) -> ScrambleResult<()> {
    if data.is_empty() {
        return Err(ScrambleError::MalformedInput("empty audio stream".to_string()));
    }
    v2_tag_len(data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn record() -> MetadataRecord {
        let mut rng = StdRng::seed_from_u64(23);
        MetadataRecord::generate(&mut rng)
    }

    /// A couple of fake MPEG frame-sync bytes standing in for audio.
    fn audio() -> Vec<u8> {
        vec![0xFF, 0xFB, 0x90, 0x00, 0x11, 0x22, 0x33, 0x44]
    }

    // ── v1 ───────────────────────────────────────────────────────────

    #[test]
    fn v1_fixed_layout() {
        let tag = build_v1(&record());
        assert_eq!(tag.len(), V1_LEN);
        assert_eq!(&tag[0..3], b"TAG");
        assert_eq!(tag[127], GENRE_OTHER);
    }

    #[test]
    fn v1_artist_zero_padded() {
        let rec = record();
        let tag = build_v1(&rec);
        let artist = &tag[33..63];
        let name = rec.author.as_bytes();
        assert_eq!(&artist[..name.len()], name);
        assert!(artist[name.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn v1_year_field() {
        let rec = record();
        let tag = build_v1(&rec);
        assert_eq!(&tag[93..97], rec.year().as_bytes());
    }

    #[test]
    fn strip_v1_removes_exactly_128() {
        let mut data = audio();
        data.extend_from_slice(&build_v1(&record()));
        let out = strip_v1(&data);
        assert_eq!(out, audio());
    }

    #[test]
    fn strip_v1_without_tag_is_noop() {
        let data = audio();
        assert_eq!(strip_v1(&data), data);
    }

    // ── v2 ───────────────────────────────────────────────────────────

    #[test]
    fn v2_header_and_synchsafe_size() {
        let tag = build_v2(&record(), true);
        assert_eq!(&tag[0..3], b"ID3");
        assert_eq!(tag[3], 3);
        assert_eq!(tag[4], 0);
        let size = synchsafe_decode(&[tag[6], tag[7], tag[8], tag[9]]) as usize;
        assert_eq!(size, tag.len() - V2_HEADER_LEN);
        assert!(tag[6..10].iter().all(|b| b & 0x80 == 0));
    }

    #[test]
    fn v2_round_trips_through_strip() {
        let mut data = build_v2(&record(), true);
        let tag_len = data.len();
        data.extend_from_slice(&audio());

        let (offset, rest) = strip_v2(&data).unwrap();
        assert_eq!(offset, tag_len);
        assert_eq!(rest, audio());
    }

    #[test]
    fn v2_contains_expected_frames() {
        let tag = build_v2(&record(), true);
        for id in [&b"TPE1"[..], b"TDRC", b"TSSE", b"TXXX"] {
            assert!(tag.windows(4).any(|w| w == id), "missing frame {id:?}");
        }
        let txxx = tag.windows(4).filter(|w| *w == b"TXXX").count();
        assert_eq!(txxx, 2);
    }

    #[test]
    fn v2_gps_frame_gated() {
        let tag = build_v2(&record(), false);
        let txxx = tag.windows(4).filter(|w| *w == b"TXXX").count();
        assert_eq!(txxx, 1);
    }

    #[test]
    fn strip_v2_without_tag_is_noop() {
        let data = audio();
        let (offset, rest) = strip_v2(&data).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(rest, data);
    }

    #[test]
    fn v2_size_beyond_file_is_malformed() {
        let mut data = b"ID3\x03\x00\x00".to_vec();
        data.extend_from_slice(&synchsafe_encode(1024));
        data.extend_from_slice(&[0u8; 4]); // far less than 1024 bytes of body
        assert!(matches!(
            strip_v2(&data).unwrap_err(),
            ScrambleError::MalformedInput(_)
        ));
    }

    #[test]
    fn v2_footer_flag_included_in_length() {
        let mut data = b"ID3\x04\x00\x10".to_vec();
        data.extend_from_slice(&synchsafe_encode(4));
        data.extend_from_slice(&[0u8; 4]); // body
        data.extend_from_slice(b"3DI\x04\x00\x10\x00\x00\x00\x04"); // footer
        data.extend_from_slice(&audio());

        let (offset, rest) = strip_v2(&data).unwrap();
        assert_eq!(offset, 10 + 4 + 10);
        assert_eq!(rest, audio());
    }
}
