//! Container detection and the per-file scramble entry point.
//!
//! Every supported container is a variant of the closed [`ContainerKind`]
//! enum; unknown inputs never fall through a default branch — they are
//! either undetected (`detect` returns `None`) or an explicitly
//! unsupported variant like legacy OLE `.doc`, which maps to
//! [`UnsupportedContainer`](crate::ScrambleError::UnsupportedContainer).
//!
//! The shared shape of every codec run: locate and remove the existing
//! metadata records, then — unless the policy is strip-only — build a
//! fresh record, validate it, and splice it back in. A validation failure
//! of a freshly built segment aborts the file; nothing is returned that
//! has not passed the same structural check used on input.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::record::MetadataRecord;
use crate::{ScrambleError, ScrambleResult, gif, id3, jpeg, ooxml, pdf, png};

/// OLE compound-file signature (legacy `.doc`).
const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// The closed set of container kinds this engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Jpeg,
    Png,
    Gif,
    Mp3,
    Pdf,
    /// Legacy OLE compound document — detected, but no codec exists.
    Doc,
    Docx,
}

impl ContainerKind {
    /// Detect the container from its leading signature bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8]) {
            return Some(Self::Jpeg);
        }
        if data.starts_with(&png::SIGNATURE) {
            return Some(Self::Png);
        }
        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        if data.starts_with(b"%PDF") {
            return Some(Self::Pdf);
        }
        if data.starts_with(b"ID3")
            || (data.len() >= 2 && data[0] == 0xFF && data[1] & 0xE0 == 0xE0)
        {
            return Some(Self::Mp3);
        }
        if data.starts_with(b"PK\x03\x04") {
            return Some(Self::Docx);
        }
        if data.starts_with(&OLE_SIGNATURE) {
            return Some(Self::Doc);
        }
        None
    }

    /// Determine the container kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "mp3" => Some(Self::Mp3),
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Mp3 => "mp3",
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
        }
    }
}

/// Controls what a scramble operation does to a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScramblePolicy {
    /// Only remove existing metadata; fabricate nothing.
    pub strip_only: bool,
    /// Include GPS sub-structures in fabricated records.
    pub add_fake_gps: bool,
    /// Re-encode raster pixels at this quality (0–100) before the
    /// metadata pass. Delegated to the image codec collaborator; `None`
    /// preserves the original encoding.
    pub recompress_quality: Option<u8>,
    /// Run the per-format structural check on the output before
    /// returning success.
    pub validate_output: bool,
}

impl Default for ScramblePolicy {
    fn default() -> Self {
        Self {
            strip_only: false,
            add_fake_gps: true,
            recompress_quality: None,
            validate_output: true,
        }
    }
}

/// Log-and-propagate wrapper so the dispatcher reports which stage of
/// which codec failed.
fn stage<T>(kind: ContainerKind, name: &str, result: ScrambleResult<T>) -> ScrambleResult<T> {
    if let Err(ref err) = result {
        log::warn!("{} {name} failed: {err}", kind.name());
    }
    result
}

/// Transform one file's bytes according to the policy.
///
/// Strips existing metadata records and, unless `strip_only` is set,
/// splices in records fabricated from `record`. The input is never
/// mutated; on any error no output bytes are produced.
pub fn scramble(
    data: &[u8],
    kind: ContainerKind,
    policy: &ScramblePolicy,
    record: &MetadataRecord,
) -> ScrambleResult<Vec<u8>> {
    let gps = policy.add_fake_gps;

    let out = match kind {
        ContainerKind::Jpeg => {
            let stripped = stage(kind, "strip", jpeg::strip_metadata(data))?;
            if policy.strip_only {
                stripped
            } else {
                let segment = jpeg::build_segment(record, gps);
                stage(kind, "segment validation", jpeg::validate_segment(&segment))?;
                stage(kind, "splice", jpeg::splice(&stripped, &segment))?
            }
        }
        ContainerKind::Png => {
            let stripped = stage(kind, "strip", png::strip(data))?;
            if policy.strip_only {
                stripped
            } else {
                let chunks = png::build_text_chunks(record, gps);
                stage(kind, "splice", png::splice(&stripped, &chunks))?
            }
        }
        ContainerKind::Gif => {
            let stripped = stage(kind, "strip", gif::strip(data))?;
            if policy.strip_only {
                stripped
            } else {
                let block = gif::build_xmp_extension(record, gps);
                stage(kind, "splice", gif::splice(&stripped, &block))?
            }
        }
        ContainerKind::Mp3 => {
            let (v2_len, rest) = stage(kind, "v2 strip", id3::strip_v2(data))?;
            let audio = id3::strip_v1(&rest);
            if policy.strip_only {
                audio
            } else {
                // Rebuild what the input carried: a v2 tag is only
                // fabricated when one was present, the v1 block always is.
                let mut out = Vec::with_capacity(audio.len() + id3::V1_LEN);
                if v2_len > 0 {
                    out.extend_from_slice(&id3::build_v2(record, gps));
                }
                out.extend_from_slice(&audio);
                out.extend_from_slice(&id3::build_v1(record));
                out
            }
        }
        ContainerKind::Pdf => {
            if policy.strip_only {
                stage(kind, "reference strip", pdf::strip_refs(data))?
            } else {
                let replaced = stage(kind, "info rewrite", pdf::replace_info(data, record, gps))?;
                stage(kind, "xmp append", pdf::append_xmp(&replaced, record, gps))?
            }
        }
        ContainerKind::Docx => {
            stage(kind, "rewrite", ooxml::rewrite(data, record, policy.strip_only, gps))?
        }
        ContainerKind::Doc => {
            log::debug!("legacy OLE document rejected");
            return Err(ScrambleError::UnsupportedContainer);
        }
    };

    if policy.validate_output {
        stage(kind, "output validation", validate(&out, kind))?;
    }
    Ok(out)
}

/// The per-format structural check: the same predicate the round-trip
/// property relies on for both input and output of a given kind.
pub fn validate(data: &[u8], kind: ContainerKind) -> ScrambleResult<()> {
    match kind {
        ContainerKind::Jpeg => jpeg::validate(data),
        ContainerKind::Png => png::validate(data),
        ContainerKind::Gif => gif::validate(data),
        ContainerKind::Mp3 => id3::validate(data),
        ContainerKind::Pdf => pdf::validate(data),
        ContainerKind::Docx => ooxml::validate(data),
        ContainerKind::Doc => Err(ScrambleError::UnsupportedContainer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn record() -> MetadataRecord {
        record_seeded(3)
    }

    fn record_seeded(seed: u64) -> MetadataRecord {
        let mut rng = StdRng::seed_from_u64(seed);
        MetadataRecord::generate(&mut rng)
    }

    // ── detection ────────────────────────────────────────────────────

    #[test]
    fn detect_by_signature() {
        assert_eq!(ContainerKind::detect(&[0xFF, 0xD8, 0xFF, 0xD9]), Some(ContainerKind::Jpeg));
        assert_eq!(ContainerKind::detect(&png::SIGNATURE), Some(ContainerKind::Png));
        assert_eq!(ContainerKind::detect(b"GIF89a rest"), Some(ContainerKind::Gif));
        assert_eq!(ContainerKind::detect(b"GIF87a rest"), Some(ContainerKind::Gif));
        assert_eq!(ContainerKind::detect(b"%PDF-1.7"), Some(ContainerKind::Pdf));
        assert_eq!(ContainerKind::detect(b"ID3\x03\x00"), Some(ContainerKind::Mp3));
        assert_eq!(ContainerKind::detect(&[0xFF, 0xFB, 0x90]), Some(ContainerKind::Mp3));
        assert_eq!(ContainerKind::detect(b"PK\x03\x04data"), Some(ContainerKind::Docx));
        assert_eq!(
            ContainerKind::detect(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]),
            Some(ContainerKind::Doc)
        );
        assert_eq!(ContainerKind::detect(b"plain text"), None);
        assert_eq!(ContainerKind::detect(&[]), None);
    }

    #[test]
    fn jpeg_wins_over_mpeg_frame_sync() {
        // FF D8 also matches the FF Ex frame-sync mask shape; SOI is
        // checked first.
        assert_eq!(ContainerKind::detect(&[0xFF, 0xD8]), Some(ContainerKind::Jpeg));
    }

    #[test]
    fn detect_from_extension() {
        assert_eq!(ContainerKind::from_path(Path::new("a.JPG")), Some(ContainerKind::Jpeg));
        assert_eq!(ContainerKind::from_path(Path::new("a.docx")), Some(ContainerKind::Docx));
        assert_eq!(ContainerKind::from_path(Path::new("a.doc")), Some(ContainerKind::Doc));
        assert_eq!(ContainerKind::from_path(Path::new("a.txt")), None);
        assert_eq!(ContainerKind::from_path(Path::new("noext")), None);
    }

    // ── scramble orchestration ───────────────────────────────────────

    #[test]
    fn minimal_jpeg_fabrication() {
        let input = [0xFF, 0xD8, 0xFF, 0xD9];
        let policy = ScramblePolicy::default();
        let out = scramble(&input, ContainerKind::Jpeg, &policy, &record()).unwrap();

        assert_eq!(&out[0..2], &[0xFF, 0xD8]);
        assert_eq!(&out[2..4], &[0xFF, 0xE1]);
        assert_eq!(&out[6..12], b"Exif\0\0");
        assert_eq!(&out[12..14], b"II");
        assert_eq!(&out[14..16], &42u16.to_le_bytes());
        assert_eq!(&out[16..20], &8u32.to_le_bytes());
        validate(&out, ContainerKind::Jpeg).unwrap();
    }

    #[test]
    fn strip_only_leaves_no_fabricated_records() {
        let input = [0xFF, 0xD8, 0xFF, 0xD9];
        let policy = ScramblePolicy { strip_only: true, ..Default::default() };
        let out = scramble(&input, ContainerKind::Jpeg, &policy, &record()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn mp3_v1_replaced_one_to_one() {
        let old = record_seeded(100);
        let mut input = vec![0xFF, 0xFB, 0x90, 0x00, 0x01, 0x02];
        input.extend_from_slice(&id3::build_v1(&old));

        let policy = ScramblePolicy::default();
        let fresh = record_seeded(200);
        assert_ne!(old.author, fresh.author);
        let out = scramble(&input, ContainerKind::Mp3, &policy, &fresh).unwrap();

        // No v2 tag existed, so none is added: length is preserved.
        assert_eq!(out.len(), input.len());
        assert_eq!(&out[out.len() - 128..out.len() - 125], b"TAG");
        let artist = &out[out.len() - 128 + 33..out.len() - 128 + 63];
        assert!(artist.starts_with(fresh.author.as_bytes()));
    }

    #[test]
    fn mp3_v2_rebuilt_when_present() {
        let rec = record();
        let mut input = id3::build_v2(&rec, false);
        input.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);

        let out = scramble(&input, ContainerKind::Mp3, &ScramblePolicy::default(), &rec).unwrap();
        assert_eq!(&out[0..3], b"ID3");
        assert_eq!(&out[out.len() - 128..out.len() - 125], b"TAG");
    }

    #[test]
    fn doc_is_unsupported() {
        let mut data = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        data.extend_from_slice(&[0u8; 64]);
        let err = scramble(&data, ContainerKind::Doc, &ScramblePolicy::default(), &record())
            .unwrap_err();
        assert!(matches!(err, ScrambleError::UnsupportedContainer));
    }

    #[test]
    fn malformed_jpeg_reports_no_output() {
        let err = scramble(b"not jpeg", ContainerKind::Jpeg, &ScramblePolicy::default(), &record())
            .unwrap_err();
        assert!(matches!(err, ScrambleError::MalformedInput(_)));
    }

    #[test]
    fn round_trip_validates_per_kind() {
        let policy = ScramblePolicy::default();
        let rec = record();

        let jpeg_in = [0xFF, 0xD8, 0xFF, 0xD9];
        let out = scramble(&jpeg_in, ContainerKind::Jpeg, &policy, &rec).unwrap();
        validate(&out, ContainerKind::Jpeg).unwrap();

        let pdf_in = b"%PDF-1.4\n1 0 obj\n<< /Title (x) >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n";
        let out = scramble(pdf_in, ContainerKind::Pdf, &policy, &rec).unwrap();
        validate(&out, ContainerKind::Pdf).unwrap();
    }
}
