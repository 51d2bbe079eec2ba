//! gossian-pipeline: Pure Gaussian blur pipeline (sans-IO).
//!
//! Turns encoded image bytes into blurred, re-encoded image bytes
//! through:
//! decode -> kernel -> pooled convolution -> encode.
//!
//! This crate has **no network dependencies** -- it operates on
//! in-memory byte slices and returns structured data. All socket
//! handling lives in `gossian-server` and `gossian-client`.

pub mod codec;
pub mod diagnostics;
pub mod engine;
pub mod kernel;
pub mod raster;
pub mod types;

use std::sync::atomic::AtomicBool;
use std::time::Instant;

pub use codec::OutputFormat;
pub use diagnostics::{BlurDiagnostics, BlurSummary};
pub use kernel::Kernel;
pub use raster::{BorderedRaster, Raster};
pub use types::{BlurConfig, BlurParams, BoundaryPolicy, Dimensions, PipelineError};

/// Result of blurring one image.
#[derive(Debug, Clone)]
pub struct BlurOutput {
    /// The blurred image, encoded in `format`.
    pub bytes: Vec<u8>,
    /// Encoding of `bytes`.
    pub format: OutputFormat,
    /// Image dimensions (unchanged by the blur).
    pub dimensions: Dimensions,
    /// Per-stage timings.
    pub diagnostics: BlurDiagnostics,
}

/// Run the full blur pipeline on one encoded image.
///
/// # Pipeline steps
///
/// 1. Validate parameters against `config`
/// 2. Decode the image into an RGB raster
/// 3. Build the Gaussian kernel
/// 4. Convolve every pixel on the worker pool
/// 5. Encode the result in the input's format ([`OutputFormat::matching`])
///
/// Setting `cancel` from another thread stops step 4 early.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if `params` are out of
/// range; nothing is decoded in that case.
/// Returns [`PipelineError::EmptyInput`] or [`PipelineError::ImageDecode`]
/// if the image cannot be decoded.
/// Returns [`PipelineError::ImageEncode`] if the result cannot be encoded.
/// Returns [`PipelineError::Cancelled`] if `cancel` was set before the
/// convolution finished.
pub fn process(
    image_bytes: &[u8],
    params: &BlurParams,
    config: &BlurConfig,
    cancel: &AtomicBool,
) -> Result<BlurOutput, PipelineError> {
    let start = Instant::now();
    params.validate(config.max_radius)?;

    // 1. Decode.
    let t = Instant::now();
    let raster = codec::decode(image_bytes)?;
    let decode = t.elapsed();
    let dimensions = Dimensions {
        width: raster.width(),
        height: raster.height(),
    };

    // 2. Kernel.
    let t = Instant::now();
    let kernel = Kernel::gaussian(params.radius, params.sigma)?;
    let kernel_time = t.elapsed();

    // 3. Convolution.
    let t = Instant::now();
    let blurred = engine::blur(&raster, &kernel, config, cancel)?;
    let convolve = t.elapsed();

    // 4. Encode.
    let t = Instant::now();
    let format = OutputFormat::matching(image_bytes);
    let bytes = codec::encode(&blurred, format, params.quality)?;
    let encode = t.elapsed();

    let diagnostics = BlurDiagnostics {
        decode,
        kernel: kernel_time,
        convolve,
        encode,
        total: start.elapsed(),
        summary: BlurSummary {
            width: dimensions.width,
            height: dimensions.height,
            pixel_count: dimensions.pixel_count(),
            radius: params.radius,
            sigma: params.sigma,
            worker_count: config.worker_count.max(1),
            boundary: config.boundary,
            input_bytes: image_bytes.len(),
            output_bytes: bytes.len(),
        },
    };

    Ok(BlurOutput {
        bytes,
        format,
        dimensions,
        diagnostics,
    })
}
