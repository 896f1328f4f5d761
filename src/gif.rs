//! GIF extension codec: comment/application-extension stripping and XMP
//! fabrication.
//!
//! GIF87a/89a is a 6-byte header, a 7-byte logical screen descriptor, an
//! optional global color table, then a sequence of blocks: extensions
//! (`0x21` + label + length-prefixed sub-blocks), image descriptors
//! (`0x2C` + local color table + LZW data sub-blocks), and the `0x3B`
//! trailer. The walk tracks sub-block extents structurally so raster data
//! bytes are never misread as block introducers.
//!
//! Comment (`0xFE`) and Application (`0xFF`) extensions are the metadata
//! channels and are dropped wholesale; graphic control and plain text
//! extensions are part of the image and copied through.

use crate::record::MetadataRecord;
use crate::{ScrambleError, ScrambleResult};

const GIF87A: &[u8; 6] = b"GIF87a";
const GIF89A: &[u8; 6] = b"GIF89a";

const EXTENSION: u8 = 0x21;
const IMAGE: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

const LABEL_COMMENT: u8 = 0xFE;
const LABEL_APPLICATION: u8 = 0xFF;

const XMP_APP_IDENTIFIER: &[u8; 11] = b"XMP DataXMP";

/// Drop Comment and Application extension blocks, copying everything
/// else byte-for-byte.
pub fn strip(data: &[u8]) -> ScrambleResult<Vec<u8>> {
    walk(data, true)
}

/// Structural check: header, block walk, and a trailer at the end.
pub fn validate(data: &[u8]) -> ScrambleResult<()> {
    let out = walk(data, false)?;
    if !out.ends_with(&[TRAILER]) {
        return Err(ScrambleError::MalformedInput("missing GIF trailer".to_string()));
    }
    Ok(())
}

fn truncated(what: &str) -> ScrambleError {
    ScrambleError::MalformedInput(format!("truncated {what}"))
}

/// Advance past a sub-block sequence (consecutive length-prefixed blocks
/// up to the zero-length terminator), returning the position after it.
fn skip_sub_blocks(data: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let size = *data.get(pos)? as usize;
        pos += 1;
        if size == 0 {
            return Some(pos);
        }
        pos += size;
        if pos > data.len() {
            return None;
        }
    }
}

fn color_table_len(packed: u8) -> usize {
    if packed & 0x80 != 0 {
        3 * (1 << ((packed & 0x07) + 1))
    } else {
        0
    }
}

fn walk(data: &[u8], drop_meta: bool) -> ScrambleResult<Vec<u8>> {
    if data.len() < 13 || (!data.starts_with(GIF87A) && !data.starts_with(GIF89A)) {
        return Err(ScrambleError::MalformedInput("invalid GIF header".to_string()));
    }

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[0..6]);
    let mut pos = 6;

    // Logical screen descriptor + global color table.
    out.extend_from_slice(&data[pos..pos + 7]);
    let gct_len = color_table_len(data[pos + 4]);
    pos += 7;
    if pos + gct_len > data.len() {
        return Err(truncated("global color table"));
    }
    out.extend_from_slice(&data[pos..pos + gct_len]);
    pos += gct_len;

    while pos < data.len() {
        match data[pos] {
            EXTENSION => {
                let label = *data.get(pos + 1).ok_or_else(|| truncated("extension block"))?;
                let end = skip_sub_blocks(data, pos + 2)
                    .ok_or_else(|| truncated("extension sub-blocks"))?;
                let is_meta = label == LABEL_COMMENT || label == LABEL_APPLICATION;
                if !(drop_meta && is_meta) {
                    out.extend_from_slice(&data[pos..end]);
                }
                pos = end;
            }
            IMAGE => {
                if pos + 10 > data.len() {
                    return Err(truncated("image descriptor"));
                }
                let lct_len = color_table_len(data[pos + 9]);
                let lzw_start = pos + 10 + lct_len;
                if lzw_start + 1 > data.len() {
                    return Err(truncated("local color table"));
                }
                // Descriptor, LCT, LZW minimum code size, then the data
                // sub-blocks.
                let end = skip_sub_blocks(data, lzw_start + 1)
                    .ok_or_else(|| truncated("image data"))?;
                out.extend_from_slice(&data[pos..end]);
                pos = end;
            }
            TRAILER => {
                out.push(TRAILER);
                break;
            }
            other => {
                return Err(ScrambleError::MalformedInput(format!(
                    "unexpected block introducer {other:#04x}"
                )));
            }
        }
    }

    if !out.ends_with(&[TRAILER]) {
        out.push(TRAILER);
    }
    Ok(out)
}

/// Build an application extension labeled `XMP DataXMP` carrying the
/// record's XMP packet, split into ≤255-byte length-prefixed sub-blocks
/// with a zero terminator.
pub fn build_xmp_extension(record: &MetadataRecord, include_gps: bool) -> Vec<u8> {
    let packet = record.xmp_packet(include_gps).into_bytes();

    let mut out = Vec::with_capacity(packet.len() + packet.len() / 255 + 16);
    out.push(EXTENSION);
    out.push(LABEL_APPLICATION);
    out.push(XMP_APP_IDENTIFIER.len() as u8);
    out.extend_from_slice(XMP_APP_IDENTIFIER);
    for sub in packet.chunks(255) {
        out.push(sub.len() as u8);
        out.extend_from_slice(sub);
    }
    out.push(0);
    out
}

/// Insert `block` immediately before the trailer byte, located by its
/// last occurrence in the stream.
pub fn splice(data: &[u8], block: &[u8]) -> ScrambleResult<Vec<u8>> {
    let trailer_pos = data
        .iter()
        .rposition(|&b| b == TRAILER)
        .ok_or_else(|| ScrambleError::MalformedInput("missing GIF trailer".to_string()))?;

    let mut out = Vec::with_capacity(data.len() + block.len());
    out.extend_from_slice(&data[..trailer_pos]);
    out.extend_from_slice(block);
    out.extend_from_slice(&data[trailer_pos..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn record() -> MetadataRecord {
        let mut rng = StdRng::seed_from_u64(17);
        MetadataRecord::generate(&mut rng)
    }

    fn minimal_gif() -> Vec<u8> {
        vec![
            b'G', b'I', b'F', b'8', b'9', b'a', // header
            0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, // logical screen descriptor, no GCT
            0x2C, // image separator
            0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, // descriptor, no LCT
            0x02, // LZW minimum code size
            0x02, 0x44, 0x01, // one data sub-block
            0x00, // sub-block terminator
            0x3B, // trailer
        ]
    }

    fn gif_with_metadata() -> Vec<u8> {
        let mut data = minimal_gif();
        let trailer = data.len() - 1;
        let mut blocks = Vec::new();
        // Comment extension.
        blocks.extend_from_slice(&[0x21, 0xFE, 0x05, b'h', b'e', b'l', b'l', b'o', 0x00]);
        // Application extension (NETSCAPE-style).
        blocks.extend_from_slice(&[0x21, 0xFF, 0x0B]);
        blocks.extend_from_slice(b"NETSCAPE2.0");
        blocks.extend_from_slice(&[0x03, 0x01, 0x00, 0x00, 0x00]);
        data.splice(trailer..trailer, blocks);
        data
    }

    #[test]
    fn strip_removes_comment_and_application() {
        let out = strip(&gif_with_metadata()).unwrap();
        assert!(!out.windows(2).any(|w| w == [0x21, 0xFE]));
        assert!(!out.windows(2).any(|w| w == [0x21, 0xFF]));
        assert!(out.contains(&0x2C));
        assert!(out.ends_with(&[0x3B]));
    }

    #[test]
    fn strip_without_metadata_is_noop() {
        let gif = minimal_gif();
        assert_eq!(strip(&gif).unwrap(), gif);
    }

    #[test]
    fn strip_is_idempotent() {
        let once = strip(&gif_with_metadata()).unwrap();
        let twice = strip(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn graphic_control_extension_survives() {
        let mut data = minimal_gif();
        // Graphic control before the image descriptor.
        data.splice(13..13, vec![0x21, 0xF9, 0x04, 0x00, 0x0A, 0x00, 0x00, 0x00]);
        let out = strip(&data).unwrap();
        assert!(out.windows(2).any(|w| w == [0x21, 0xF9]));
    }

    #[test]
    fn invalid_header_is_malformed() {
        let err = strip(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, ScrambleError::MalformedInput(_)));
    }

    #[test]
    fn truncated_extension_is_malformed() {
        let mut data = minimal_gif();
        let trailer = data.len() - 1;
        data.splice(trailer..trailer + 1, vec![0x21, 0xFE, 0x40]); // claims 64 bytes, has none
        assert!(matches!(
            strip(&data).unwrap_err(),
            ScrambleError::MalformedInput(_)
        ));
    }

    #[test]
    fn xmp_extension_framing() {
        let block = build_xmp_extension(&record(), true);
        assert_eq!(&block[0..2], &[0x21, 0xFF]);
        assert_eq!(block[2] as usize, XMP_APP_IDENTIFIER.len());
        assert_eq!(&block[3..14], XMP_APP_IDENTIFIER);
        assert_eq!(*block.last().unwrap(), 0x00);

        // Every sub-block length must be honored exactly.
        let mut pos = 14;
        loop {
            let size = block[pos] as usize;
            pos += 1;
            if size == 0 {
                break;
            }
            pos += size;
            assert!(pos < block.len());
        }
        assert_eq!(pos, block.len());
    }

    #[test]
    fn splice_inserts_before_trailer() {
        let block = build_xmp_extension(&record(), false);
        let out = splice(&minimal_gif(), &block).unwrap();
        assert!(out.ends_with(&[0x3B]));

        let app_pos = out.windows(2).position(|w| w == [0x21, 0xFF]).unwrap();
        assert!(app_pos < out.len() - 1);
        validate(&out).unwrap();
    }

    #[test]
    fn splice_without_trailer_is_malformed() {
        let mut data = minimal_gif();
        data.pop();
        assert!(splice(&data, &[0x21]).is_err());
    }
}
