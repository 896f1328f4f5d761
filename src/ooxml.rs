//! OOXML properties codec: rewrite the `docProps/*.xml` parts of a Word
//! archive.
//!
//! The zip container is rebuilt entry-by-entry into a fresh archive:
//! untouched entries are raw-copied, preserving their order and
//! compressed state, and only the three docProps parts are rewritten.
//! Element bodies are replaced by scoped regex matching — a deliberate
//! heuristic, not an XML parser; elements a document does not carry are
//! left absent. `docProps/custom.xml` is the exception: fabricate mode
//! regenerates the whole part, strip mode omits the entry entirely.

use std::io::{Cursor, Read};

use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::record::{MetadataRecord, xml_escape};
use crate::{ScrambleError, ScrambleResult};

const CORE_PART: &str = "docProps/core.xml";
const APP_PART: &str = "docProps/app.xml";
const CUSTOM_PART: &str = "docProps/custom.xml";

fn archive_error(err: zip::result::ZipError) -> ScrambleError {
    ScrambleError::MalformedInput(format!("zip archive: {err}"))
}

/// Check the local-file signature and that the archive opens.
pub fn validate(data: &[u8]) -> ScrambleResult<()> {
    if !data.starts_with(b"PK\x03\x04") {
        return Err(ScrambleError::MalformedInput(
            "missing zip local-file signature".to_string(),
        ));
    }
    ZipArchive::new(Cursor::new(data)).map_err(archive_error)?;
    Ok(())
}

/// Replace the text body of every `<tag …>…</tag>` occurrence, keeping
/// the opening tag's attributes. Self-closing or absent elements are
/// left untouched.
fn replace_element_body(xml: &str, tag: &str, value: &str) -> String {
    let pattern = format!(r"(<{0}(?:\s[^>]*)?>)[^<]*(</{0}>)", regex::escape(tag));
    match Regex::new(&pattern) {
        Ok(re) => {
            let escaped = xml_escape(value);
            re.replace_all(xml, |caps: &regex::Captures| {
                format!("{}{}{}", &caps[1], escaped, &caps[2])
            })
            .into_owned()
        }
        Err(_) => xml.to_string(),
    }
}

/// Rewrite `docProps/core.xml`: identity and date elements get record
/// values, or empty bodies in strip mode.
fn rewrite_core(xml: &str, record: &MetadataRecord, strip_only: bool) -> String {
    let (author, title, subject, description, created, modified) = if strip_only {
        (String::new(), String::new(), String::new(), String::new(), String::new(), String::new())
    } else {
        (
            record.author.clone(),
            "Document".to_string(),
            "General".to_string(),
            format!("Authored by {}", record.author),
            record.iso_8601(),
            record.iso_8601(),
        )
    };

    let mut out = xml.to_string();
    out = replace_element_body(&out, "dc:creator", &author);
    out = replace_element_body(&out, "cp:lastModifiedBy", &author);
    out = replace_element_body(&out, "dc:title", &title);
    out = replace_element_body(&out, "dc:subject", &subject);
    out = replace_element_body(&out, "dc:description", &description);
    out = replace_element_body(&out, "dcterms:created", &created);
    out = replace_element_body(&out, "dcterms:modified", &modified);
    out
}

/// Rewrite `docProps/app.xml`: application/company/manager strings.
fn rewrite_app(xml: &str, record: &MetadataRecord, strip_only: bool) -> String {
    let (application, company, manager) = if strip_only {
        (String::new(), String::new(), String::new())
    } else {
        (record.software.clone(), "Personal".to_string(), record.author.clone())
    };

    let mut out = xml.to_string();
    out = replace_element_body(&out, "Application", &application);
    out = replace_element_body(&out, "Company", &company);
    out = replace_element_body(&out, "Manager", &manager);
    out
}

/// Regenerate `docProps/custom.xml` entirely from the record.
fn build_custom(record: &MetadataRecord, include_gps: bool) -> String {
    const FMTID: &str = "{D5CDD505-2E9C-101B-9397-08002B2CF9AE}";
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n\
         <Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/custom-properties\" \
         xmlns:vt=\"http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes\">",
    );
    let mut pid = 2;
    let mut push = |name: &str, value: &str, pid: &mut i32| {
        xml.push_str(&format!(
            "<property fmtid=\"{FMTID}\" pid=\"{pid}\" name=\"{name}\"><vt:lpwstr>{}</vt:lpwstr></property>",
            xml_escape(value),
        ));
        *pid += 1;
    };
    push("Camera", &record.camera, &mut pid);
    push("Editor", &record.software, &mut pid);
    if include_gps {
        push("GPSPosition", &record.gps_display(), &mut pid);
    }
    xml.push_str("</Properties>");
    xml
}

/// Rebuild the archive with the docProps parts rewritten.
///
/// Entry order is preserved; untouched entries keep their compression
/// via raw copy. In strip mode `docProps/custom.xml` is omitted from the
/// output archive.
pub fn rewrite(
    data: &[u8],
    record: &MetadataRecord,
    strip_only: bool,
    include_gps: bool,
) -> ScrambleResult<Vec<u8>> {
    validate(data)?;

    let mut archive = ZipArchive::new(Cursor::new(data)).map_err(archive_error)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(archive_error)?;
        let name = file.name().to_string();
        let compression = file.compression();

        match name.as_str() {
            CORE_PART | APP_PART => {
                let mut xml = String::new();
                file.read_to_string(&mut xml)?;
                let rewritten = if name == CORE_PART {
                    rewrite_core(&xml, record, strip_only)
                } else {
                    rewrite_app(&xml, record, strip_only)
                };
                write_entry(&mut writer, &name, compression, rewritten.as_bytes())?;
            }
            CUSTOM_PART => {
                if strip_only {
                    log::debug!("omitting {name}");
                    continue;
                }
                write_entry(
                    &mut writer,
                    &name,
                    compression,
                    build_custom(record, include_gps).as_bytes(),
                )?;
            }
            _ => {
                writer.raw_copy_file(file).map_err(archive_error)?;
            }
        }
    }

    let cursor = writer.finish().map_err(archive_error)?;
    Ok(cursor.into_inner())
}

fn write_entry(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    compression: CompressionMethod,
    contents: &[u8],
) -> ScrambleResult<()> {
    use std::io::Write;
    let options = SimpleFileOptions::default().compression_method(compression);
    writer.start_file(name, options).map_err(archive_error)?;
    writer.write_all(contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn record() -> MetadataRecord {
        let mut rng = StdRng::seed_from_u64(43);
        MetadataRecord::generate(&mut rng)
    }

    const CORE_XML: &str = "<?xml version=\"1.0\"?>\
<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
xmlns:dc=\"http://purl.org/dc/elements/1.1/\" \
xmlns:dcterms=\"http://purl.org/dc/terms/\" \
xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
<dc:title>Quarterly Report</dc:title>\
<dc:creator>Jane Original</dc:creator>\
<cp:lastModifiedBy>Jane Original</cp:lastModifiedBy>\
<dcterms:created xsi:type=\"dcterms:W3CDTF\">2019-03-04T10:00:00Z</dcterms:created>\
<dcterms:modified xsi:type=\"dcterms:W3CDTF\">2019-03-05T11:00:00Z</dcterms:modified>\
</cp:coreProperties>";

    const APP_XML: &str = "<?xml version=\"1.0\"?>\
<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\">\
<Application>Microsoft Office Word</Application>\
<Company>Acme Corp</Company>\
</Properties>";

    fn sample_docx() -> Vec<u8> {
        use std::io::Write;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        writer.start_file("[Content_Types].xml", deflated).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer.start_file("word/document.xml", deflated).unwrap();
        writer.write_all(b"<w:document>body text</w:document>").unwrap();
        writer.start_file("docProps/core.xml", deflated).unwrap();
        writer.write_all(CORE_XML.as_bytes()).unwrap();
        writer.start_file("docProps/app.xml", stored).unwrap();
        writer.write_all(APP_XML.as_bytes()).unwrap();
        writer.start_file("docProps/custom.xml", deflated).unwrap();
        writer
            .write_all(b"<Properties><property name=\"Secret\"/></Properties>")
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn read_entry(data: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    fn entry_names(data: &[u8]) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn fabricate_rewrites_core_properties() {
        let rec = record();
        let out = rewrite(&sample_docx(), &rec, false, false).unwrap();
        let core = read_entry(&out, "docProps/core.xml");

        assert!(!core.contains("Jane Original"));
        assert!(!core.contains("Quarterly Report"));
        assert!(core.contains(&format!("<dc:creator>{}</dc:creator>", rec.author)));
        assert!(core.contains(&rec.iso_8601()));
        // Attributes on the date elements survive the rewrite.
        assert!(core.contains("xsi:type=\"dcterms:W3CDTF\""));
    }

    #[test]
    fn fabricate_rewrites_app_properties() {
        let rec = record();
        let out = rewrite(&sample_docx(), &rec, false, false).unwrap();
        let app = read_entry(&out, "docProps/app.xml");

        assert!(!app.contains("Acme Corp"));
        assert!(app.contains(&format!("<Application>{}</Application>", rec.software)));
    }

    #[test]
    fn fabricate_regenerates_custom_part() {
        let rec = record();
        let out = rewrite(&sample_docx(), &rec, false, true).unwrap();
        let custom = read_entry(&out, "docProps/custom.xml");

        assert!(!custom.contains("Secret"));
        assert!(custom.contains("name=\"Camera\""));
        assert!(custom.contains("name=\"GPSPosition\""));
    }

    #[test]
    fn strip_blanks_core_and_omits_custom() {
        let out = rewrite(&sample_docx(), &record(), true, false).unwrap();
        let core = read_entry(&out, "docProps/core.xml");

        assert!(core.contains("<dc:creator></dc:creator>"));
        assert!(core.contains("<dc:title></dc:title>"));
        assert!(!entry_names(&out).iter().any(|n| n == "docProps/custom.xml"));
    }

    #[test]
    fn untouched_entries_survive_in_order() {
        let out = rewrite(&sample_docx(), &record(), false, false).unwrap();
        let names = entry_names(&out);
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "word/document.xml",
                "docProps/core.xml",
                "docProps/app.xml",
                "docProps/custom.xml",
            ]
        );
        assert_eq!(
            read_entry(&out, "word/document.xml"),
            "<w:document>body text</w:document>"
        );
    }

    #[test]
    fn not_a_zip_is_malformed() {
        let err = rewrite(b"plain text", &record(), false, false).unwrap_err();
        assert!(matches!(err, ScrambleError::MalformedInput(_)));
    }

    #[test]
    fn replace_element_body_scoped_to_tag() {
        let xml = "<dc:creator>a</dc:creator><dc:creatorTool>b</dc:creatorTool>";
        let out = replace_element_body(xml, "dc:creator", "x");
        assert_eq!(out, "<dc:creator>x</dc:creator><dc:creatorTool>b</dc:creatorTool>");
    }
}
