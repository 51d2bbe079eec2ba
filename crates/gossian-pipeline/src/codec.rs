//! Image decoding and encoding.
//!
//! Accepts raw image bytes (JPEG, PNG, BMP, WebP) and produces an RGB
//! [`Raster`]. Encoding writes the raster back as JPEG at a requested
//! quality, or as PNG when an exact round trip is wanted.

use std::io::Cursor;

use image::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use serde::{Deserialize, Serialize};

use crate::raster::Raster;
use crate::types::PipelineError;

/// Encoded image format of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Lossy JPEG at the requested quality.
    #[default]
    Jpeg,
    /// Lossless PNG; quality is ignored.
    Png,
}

impl OutputFormat {
    /// Pick the output format matching the format of `bytes`.
    ///
    /// PNG input is answered with PNG; everything else with JPEG.
    #[must_use]
    pub fn matching(bytes: &[u8]) -> Self {
        match image::guess_format(bytes) {
            Ok(ImageFormat::Png) => Self::Png,
            _ => Self::Jpeg,
        }
    }

    /// Conventional file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }
}

/// Decode raw image bytes into an 8-bit RGB raster.
///
/// Higher bit depths are scaled down to `[0, 255]` and any alpha
/// channel is dropped.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognized
/// or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<Raster, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes).map_err(PipelineError::ImageDecode)?;
    Ok(img.to_rgb8())
}

/// Encode `raster` in `format`.
///
/// JPEG `quality` is clamped to `1..=100`; a quality of 0 encodes as 1.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if the encoder fails.
pub fn encode(raster: &Raster, format: OutputFormat, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            raster
                .write_with_encoder(encoder)
                .map_err(PipelineError::ImageEncode)?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new(&mut buf);
            raster
                .write_with_encoder(encoder)
                .map_err(PipelineError::ImageEncode)?;
        }
    }
    Ok(buf.into_inner())
}
