//! Pixel re-encoding collaborator.
//!
//! Decoding and re-encoding is delegated wholesale to the `image` crate;
//! this engine never inspects pixel data. A re-encode incidentally drops
//! ancillary metadata chunks, so the pipeline runs it *before* the
//! metadata codec — fabricated records must survive it.

use std::io::Cursor;

use image::ImageFormat;
use image::codecs::jpeg::JpegEncoder;

use crate::dispatch::ContainerKind;
use crate::{ScrambleError, ScrambleResult};

/// Decode the raster and re-encode it, JPEG at the given quality.
///
/// Only the raster container kinds are eligible; anything else is
/// `UnsupportedContainer` so callers cannot accidentally route documents
/// through the image codec.
pub fn recompress(data: &[u8], kind: ContainerKind, quality: u8) -> ScrambleResult<Vec<u8>> {
    let img = image::load_from_memory(data)
        .map_err(|e| ScrambleError::MalformedInput(format!("image decode: {e}")))?;

    let mut out = Cursor::new(Vec::new());
    match kind {
        ContainerKind::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            img.write_with_encoder(encoder)
                .map_err(|e| ScrambleError::Io(std::io::Error::other(e)))?;
        }
        ContainerKind::Png => {
            img.write_to(&mut out, ImageFormat::Png)
                .map_err(|e| ScrambleError::Io(std::io::Error::other(e)))?;
        }
        ContainerKind::Gif => {
            img.write_to(&mut out, ImageFormat::Gif)
                .map_err(|e| ScrambleError::Io(std::io::Error::other(e)))?;
        }
        _ => return Err(ScrambleError::UnsupportedContainer),
    }
    Ok(out.into_inner())
}
