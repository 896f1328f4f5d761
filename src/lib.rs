//! # metascramble
//!
//! Rewrite the descriptive metadata embedded in common document and media
//! containers — either erasing it or replacing it with synthetic,
//! internally-consistent values — while leaving the visible payload
//! (pixels, audio samples, text) intact.
//!
//! The heavy lifting is per-format binary surgery: each container (JPEG/EXIF,
//! PNG, GIF, ID3-tagged MP3, PDF, OOXML Word) has its own segment framing,
//! offset arithmetic, and integrity fields (segment lengths, IFD entry
//! counts, CRC32 checksums, synchsafe sizes) that must be recomputed for the
//! rewritten file to stay valid.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metascramble::config::Config;
//! use metascramble::pipeline::{collect_files, process_file};
//! use rand::SeedableRng;
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let mut rng = rand::rngs::StdRng::from_entropy();
//!
//!     for path in collect_files(&[PathBuf::from("./documents")]) {
//!         let result = process_file(&path, &config, &mut rng);
//!         match result.error {
//!             Some(ref err) => eprintln!("{}: {err}", path.display()),
//!             None => println!("Scrambled: {}", path.display()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! Single files can be transformed entirely in memory through the
//! dispatcher:
//!
//! ```rust,no_run
//! use metascramble::dispatch::{scramble, ContainerKind, ScramblePolicy};
//! use metascramble::record::MetadataRecord;
//! use rand::SeedableRng;
//!
//! fn main() -> anyhow::Result<()> {
//!     let data = std::fs::read("photo.jpg")?;
//!     let kind = ContainerKind::detect(&data)
//!         .ok_or_else(|| anyhow::anyhow!("unrecognized container"))?;
//!
//!     let mut rng = rand::rngs::StdRng::from_entropy();
//!     let record = MetadataRecord::generate(&mut rng);
//!     let policy = ScramblePolicy::default();
//!
//!     let output = scramble(&data, kind, &policy, &record)?;
//!     std::fs::write("photo.clean.jpg", output)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Containers
//!
//! | Container | Strip | Fabricate |
//! |-----------|-------|-----------|
//! | JPEG | APP1 (EXIF/XMP) + COM segments | EXIF IFD0 + GPS sub-IFD |
//! | PNG | tEXt/zTXt/iTXt/tIME chunks | tEXt + iTXt chunks |
//! | GIF | Comment + Application extensions | XMP application extension |
//! | MP3 | ID3v2 head + ID3v1 tail | ID3v2.3 frames + ID3v1 block |
//! | PDF | Info/Metadata references | Info dictionary + XMP stream |
//! | DOCX | docProps part bodies | core/app/custom properties |
//!
//! Legacy OLE `.doc` files are detected but reported as unsupported.
//!
//! ## Modules
//!
//! - [`record`] — synthetic [`MetadataRecord`](record::MetadataRecord) generation
//! - [`dispatch`] — container detection, policy, and the [`scramble`](dispatch::scramble) entry point
//! - [`jpeg`], [`png`], [`gif`], [`id3`], [`pdf`], [`ooxml`] — per-format codecs
//! - [`raster`] — pixel re-encoding collaborator (the `image` crate)
//! - [`config`] — configuration types and loading/saving
//! - [`pipeline`] — batch processing, output writing, audit logging

pub mod binary;
pub mod config;
pub mod dispatch;
pub mod gif;
pub mod id3;
pub mod jpeg;
pub mod ooxml;
pub mod pdf;
pub mod pipeline;
pub mod png;
pub mod raster;
pub mod record;

pub use dispatch::{scramble, ContainerKind, ScramblePolicy};
pub use record::MetadataRecord;

/// Result type alias for codec operations.
pub type ScrambleResult<T> = Result<T, ScrambleError>;

/// Error type shared by every codec and the dispatcher.
///
/// The distinction between variants drives batch behavior: an
/// [`UnsupportedContainer`](ScrambleError::UnsupportedContainer) file is
/// skipped, a [`MalformedInput`](ScrambleError::MalformedInput) file fails
/// while the rest of the batch proceeds, and a
/// [`BuildValidation`](ScrambleError::BuildValidation) failure means a
/// freshly constructed segment failed its own structural re-check — an
/// encoder defect, never written to the output path.
#[derive(Debug, thiserror::Error)]
pub enum ScrambleError {
    #[error("unsupported container type")]
    UnsupportedContainer,

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("built segment failed validation: {0}")]
    BuildValidation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
