//! Synthetic metadata record generation.
//!
//! A [`MetadataRecord`] is created once per scramble operation and is
//! immutable afterwards, so every field written into every segment of the
//! same output file is mutually consistent — the EXIF DateTime, the PDF
//! CreationDate, and the ID3 year all derive from the same fabricated
//! instant, and the GPS refs always agree with the coordinate signs.
//!
//! Randomness is injected: [`MetadataRecord::generate`] takes any
//! [`rand::Rng`], which keeps record construction deterministic under a
//! seeded generator in tests.

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::Serialize;

/// 2000-01-01T00:00:00Z — lower bound for fabricated timestamps.
const TIMESTAMP_EPOCH: i64 = 946_684_800;

const FIRST_NAMES: &[&str] = &[
    "Alex", "Jordan", "Morgan", "Casey", "Riley", "Quinn", "Avery", "Dana",
    "Elliot", "Harper", "Rowan", "Sage",
];

const LAST_NAMES: &[&str] = &[
    "Walker", "Hayes", "Reyes", "Lindqvist", "Okafor", "Tanaka", "Novak",
    "Fischer", "Moreau", "Silva", "Kovacs", "Byrne",
];

const CAMERAS: &[&str] = &[
    "Canon EOS 5D Mark IV",
    "NIKON D850",
    "SONY ILCE-7M3",
    "FUJIFILM X-T4",
    "OLYMPUS E-M10 Mark III",
    "Panasonic DC-GH5",
    "PENTAX K-1 Mark II",
    "Canon PowerShot G7 X Mark III",
];

const SOFTWARE: &[&str] = &[
    "Adobe Photoshop 24.1 (Windows)",
    "Adobe Photoshop Lightroom Classic 12.3",
    "GIMP 2.10.36",
    "darktable 4.6.1",
    "Capture One 23 (16.2.0)",
    "Affinity Photo 2.4.0",
];

/// The synthetic identity written into a scrambled file.
///
/// Generated atomically before any codec runs; owned by the operation and
/// never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataRecord {
    /// Fabricated author name, globally unique per record (random suffix).
    pub author: String,
    /// Fabricated capture/creation instant, uniformly sampled between
    /// 2000-01-01 and now.
    pub timestamp: DateTime<Utc>,
    /// Decimal degrees in `[-90, 90]`; sign selects the `N`/`S` reference.
    pub latitude: f64,
    /// Decimal degrees in `[-180, 180]`; sign selects the `E`/`W` reference.
    pub longitude: f64,
    /// Camera make+model string from a fixed list.
    pub camera: String,
    /// Producing-software string from a fixed list.
    pub software: String,
}

impl MetadataRecord {
    /// Generate a fresh record from the injected random source.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
        let suffix: u16 = rng.gen_range(0..=u16::MAX);

        let now = Utc::now().timestamp();
        let secs = rng.gen_range(TIMESTAMP_EPOCH..now.max(TIMESTAMP_EPOCH + 1));
        let timestamp = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            author: format!("{first} {last} {suffix:04x}"),
            timestamp,
            latitude: rng.gen_range(-90.0..90.0),
            longitude: rng.gen_range(-180.0..180.0),
            camera: CAMERAS[rng.gen_range(0..CAMERAS.len())].to_string(),
            software: SOFTWARE[rng.gen_range(0..SOFTWARE.len())].to_string(),
        }
    }

    /// EXIF DateTime grammar: `YYYY:MM:DD HH:MM:SS`.
    pub fn exif_datetime(&self) -> String {
        self.timestamp.format("%Y:%m:%d %H:%M:%S").to_string()
    }

    /// EXIF GPSDateStamp grammar: `YYYY:MM:DD`.
    pub fn exif_date(&self) -> String {
        self.timestamp.format("%Y:%m:%d").to_string()
    }

    /// PDF date grammar: `D:YYYYMMDDHHMMSSZ`.
    pub fn pdf_date(&self) -> String {
        self.timestamp.format("D:%Y%m%d%H%M%SZ").to_string()
    }

    /// ISO-8601 UTC grammar for XMP and OOXML `dcterms` elements.
    pub fn iso_8601(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Four-digit year for the ID3v1 fixed field.
    pub fn year(&self) -> String {
        self.timestamp.format("%Y").to_string()
    }

    /// Decimal `lat, lon` string for text-valued metadata channels.
    pub fn gps_display(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }

    /// Latitude hemisphere reference (`N`/`S`).
    pub fn lat_ref(&self) -> char {
        if self.latitude >= 0.0 { 'N' } else { 'S' }
    }

    /// Longitude hemisphere reference (`E`/`W`).
    pub fn lon_ref(&self) -> char {
        if self.longitude >= 0.0 { 'E' } else { 'W' }
    }

    /// Serialize the record as an XMP packet.
    ///
    /// Used verbatim by the GIF application extension and the PDF metadata
    /// stream object; GPS elements are only emitted when requested.
    pub fn xmp_packet(&self, include_gps: bool) -> String {
        let mut xmp = String::new();
        xmp.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
        xmp.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
        xmp.push_str("<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
        xmp.push_str("<rdf:Description rdf:about=\"\"\n");
        xmp.push_str("  xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n");
        xmp.push_str("  xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\"\n");
        xmp.push_str("  xmlns:tiff=\"http://ns.adobe.com/tiff/1.0/\"\n");
        xmp.push_str("  xmlns:exif=\"http://ns.adobe.com/exif/1.0/\">\n");
        xmp.push_str(&format!(
            "  <dc:creator><rdf:Seq><rdf:li>{}</rdf:li></rdf:Seq></dc:creator>\n",
            xml_escape(&self.author)
        ));
        xmp.push_str(&format!("  <xmp:CreateDate>{}</xmp:CreateDate>\n", self.iso_8601()));
        xmp.push_str(&format!("  <xmp:ModifyDate>{}</xmp:ModifyDate>\n", self.iso_8601()));
        xmp.push_str(&format!(
            "  <xmp:CreatorTool>{}</xmp:CreatorTool>\n",
            xml_escape(&self.software)
        ));
        xmp.push_str(&format!("  <tiff:Model>{}</tiff:Model>\n", xml_escape(&self.camera)));
        if include_gps {
            let (lat_deg, lat_min) = degrees_minutes(self.latitude);
            let (lon_deg, lon_min) = degrees_minutes(self.longitude);
            xmp.push_str(&format!(
                "  <exif:GPSLatitude>{},{:.4}{}</exif:GPSLatitude>\n",
                lat_deg,
                lat_min,
                self.lat_ref()
            ));
            xmp.push_str(&format!(
                "  <exif:GPSLongitude>{},{:.4}{}</exif:GPSLongitude>\n",
                lon_deg,
                lon_min,
                self.lon_ref()
            ));
        }
        xmp.push_str("</rdf:Description>\n");
        xmp.push_str("</rdf:RDF>\n");
        xmp.push_str("</x:xmpmeta>\n");
        xmp.push_str("<?xpacket end=\"w\"?>");
        xmp
    }
}

/// Split an absolute coordinate into whole degrees and decimal minutes
/// (the XMP GPS grammar).
fn degrees_minutes(coord: f64) -> (u32, f64) {
    let abs = coord.abs();
    let degrees = abs.floor() as u32;
    let minutes = (abs - degrees as f64) * 60.0;
    (degrees, minutes)
}

/// Escape special XML characters.
pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
