//! PDF Info codec: Info dictionary replacement and XMP stream fabrication.
//!
//! This is deliberately not a PDF object-model implementation. The Info
//! dictionary is located by pattern search — the first `/Title` key, then
//! a nesting-aware scan for the enclosing `<< … >>` — and replaced
//! wholesale. Incrementally-updated PDFs with multiple xref generations
//! get their first matching dictionary rewritten, which may be a
//! superseded revision; that is the accepted scope of the heuristic.
//!
//! Strip mode removes `/Info N G R` and `/Metadata N G R` references
//! instead of rewriting dictionaries, which unlinks both metadata
//! channels from the trailer/catalog.

use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::record::MetadataRecord;
use crate::{ScrambleError, ScrambleResult};

static INFO_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Info\s+\d+\s+\d+\s+R").expect("valid regex"));
static METADATA_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Metadata\s+\d+\s+\d+\s+R").expect("valid regex"));
static OBJ_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+\d+\s+obj").expect("valid regex"));
static TRAILER_DICT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"trailer\s*<<").expect("valid regex"));

/// Header check plus the presence of an end-of-file marker.
pub fn validate(data: &[u8]) -> ScrambleResult<()> {
    if !data.starts_with(b"%PDF") {
        return Err(ScrambleError::MalformedInput("missing %PDF header".to_string()));
    }
    if !contains(data, b"%%EOF") {
        return Err(ScrambleError::MalformedInput("missing %%EOF marker".to_string()));
    }
    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Escape a string for a PDF literal string `( … )`.
fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)")
}

/// Build a complete Info dictionary body from the record.
fn build_info_dict(record: &MetadataRecord, include_gps: bool) -> String {
    let mut dict = String::from("<<");
    let mut push = |key: &str, value: &str| {
        dict.push_str(&format!(" /{key} ({})", escape_pdf_string(value)));
    };
    push("Title", "Untitled");
    push("Author", &record.author);
    push("Subject", "General");
    push("Creator", &record.software);
    push("Producer", &record.software);
    push("CreationDate", &record.pdf_date());
    push("ModDate", &record.pdf_date());
    if include_gps {
        push("Camera", &record.camera);
        push("GPSPosition", &record.gps_display());
    }
    dict.push_str(" >>");
    dict
}

/// Find the `<< … >>` range enclosing the first `/Title` key, honoring
/// nested dictionaries.
fn find_info_dict(data: &[u8]) -> Option<(usize, usize)> {
    let title = data.windows(6).position(|w| w == b"/Title")?;
    let start = data[..title].windows(2).rposition(|w| w == b"<<")?;

    let mut depth = 0usize;
    let mut pos = start;
    while pos + 1 < data.len() {
        if &data[pos..pos + 2] == b"<<" {
            depth += 1;
            pos += 2;
        } else if &data[pos..pos + 2] == b">>" {
            depth -= 1;
            pos += 2;
            if depth == 0 {
                return Some((start, pos));
            }
        } else {
            pos += 1;
        }
    }
    None
}

/// Highest indirect object number in the file (0 when none parse).
fn max_object_number(data: &[u8]) -> u32 {
    OBJ_HEADER
        .captures_iter(data)
        .filter_map(|c| {
            std::str::from_utf8(c.get(1)?.as_bytes())
                .ok()?
                .parse::<u32>()
                .ok()
        })
        .max()
        .unwrap_or(0)
}

/// Replace the located Info dictionary body with a freshly built one.
///
/// When no `/Title` dictionary exists, a new Info object is appended
/// before the final `%%EOF` and registered in the last trailer
/// dictionary if one is present (xref-stream PDFs keep the orphan
/// object; the heuristic does not rebuild cross-reference tables).
pub fn replace_info(
    data: &[u8],
    record: &MetadataRecord,
    include_gps: bool,
) -> ScrambleResult<Vec<u8>> {
    validate(data)?;
    let dict = build_info_dict(record, include_gps);

    if let Some((start, end)) = find_info_dict(data) {
        let mut out = Vec::with_capacity(data.len() + dict.len());
        out.extend_from_slice(&data[..start]);
        out.extend_from_slice(dict.as_bytes());
        out.extend_from_slice(&data[end..]);
        return Ok(out);
    }

    // No existing Info dictionary — append one.
    let object_number = max_object_number(data) + 1;
    let object = format!("{object_number} 0 obj\n{dict}\nendobj\n");
    let mut out = insert_before_eof(data, object.as_bytes())?;

    let insert_at = TRAILER_DICT.find_iter(&out).last().map(|m| m.end());
    match insert_at {
        Some(at) => {
            let reference = format!(" /Info {object_number} 0 R");
            out.splice(at..at, reference.into_bytes());
        }
        None => {
            log::debug!("no trailer dictionary found; appended Info object is unreferenced");
        }
    }
    Ok(out)
}

/// Strip mode: unlink the Info and Metadata objects by deleting their
/// references from the trailer/catalog rather than rewriting them.
pub fn strip_refs(data: &[u8]) -> ScrambleResult<Vec<u8>> {
    validate(data)?;
    let pass1 = INFO_REF.replace_all(data, &b""[..]);
    let pass2 = METADATA_REF.replace_all(&pass1, &b""[..]);
    Ok(pass2.into_owned())
}

/// Append an XMP metadata stream object immediately before the final
/// `%%EOF`.
pub fn append_xmp(
    data: &[u8],
    record: &MetadataRecord,
    include_gps: bool,
) -> ScrambleResult<Vec<u8>> {
    let xmp = record.xmp_packet(include_gps);
    let object_number = max_object_number(data) + 1;
    let object = format!(
        "{object_number} 0 obj\n<< /Type /Metadata /Subtype /XML /Length {} >>\nstream\n{xmp}\nendstream\nendobj\n",
        xmp.len(),
    );
    insert_before_eof(data, object.as_bytes())
}

/// Insert `payload` at the start of the line holding the final `%%EOF`.
fn insert_before_eof(data: &[u8], payload: &[u8]) -> ScrambleResult<Vec<u8>> {
    let eof = rfind(data, b"%%EOF")
        .ok_or_else(|| ScrambleError::MalformedInput("missing %%EOF marker".to_string()))?;

    let mut out = Vec::with_capacity(data.len() + payload.len());
    out.extend_from_slice(&data[..eof]);
    out.extend_from_slice(payload);
    out.extend_from_slice(&data[eof..]);
    Ok(out)
}
