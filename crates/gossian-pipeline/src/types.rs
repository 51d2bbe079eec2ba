//! Shared types for the gossian blur pipeline.

use serde::{Deserialize, Serialize};

/// Re-export the raster type so downstream crates can hold decoded
/// images without depending on `image` directly.
pub use crate::raster::Raster;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Per-request blur parameters.
///
/// Parsed once per request and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurParams {
    /// Kernel radius; the kernel is `2 * radius + 1` pixels on a side.
    pub radius: u32,
    /// Standard deviation of the Gaussian.
    pub sigma: f64,
    /// Output compression quality, 0 to 100.
    pub quality: u8,
}

impl BlurParams {
    /// Highest accepted quality value.
    pub const MAX_QUALITY: u8 = 100;

    /// Check the parameters against their documented ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] if `radius` exceeds
    /// `max_radius`, `sigma` is not finite and positive, or `quality` is
    /// above [`Self::MAX_QUALITY`].
    pub fn validate(&self, max_radius: u32) -> Result<(), PipelineError> {
        if self.radius > max_radius {
            return Err(PipelineError::InvalidParameter(format!(
                "radius {} exceeds the maximum of {max_radius}",
                self.radius
            )));
        }
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(PipelineError::InvalidParameter(format!(
                "sigma must be finite and positive, got {}",
                self.sigma
            )));
        }
        if self.quality > Self::MAX_QUALITY {
            return Err(PipelineError::InvalidParameter(format!(
                "quality must be between 0 and {}, got {}",
                Self::MAX_QUALITY,
                self.quality
            )));
        }
        Ok(())
    }
}

/// How the engine treats kernel offsets that fall outside the image.
///
/// The two policies produce different values near the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Skip out-of-bounds neighbours and divide by the weight of the
    /// neighbours actually used.
    #[default]
    Clamp,
    /// Pad the image once with a mirrored border and always use the
    /// full kernel.
    Mirror,
}

/// Engine configuration, fixed for the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlurConfig {
    /// Number of workers, and the capacity of both the work and the
    /// result queue. Values below 1 are treated as 1.
    pub worker_count: usize,
    /// Boundary handling.
    pub boundary: BoundaryPolicy,
    /// Largest kernel radius a request may ask for.
    pub max_radius: u32,
}

impl BlurConfig {
    /// Default size of the worker pool.
    pub const DEFAULT_WORKER_COUNT: usize = 100;

    /// Default upper bound on the kernel radius.
    pub const DEFAULT_MAX_RADIUS: u32 = 100;
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            worker_count: Self::DEFAULT_WORKER_COUNT,
            boundary: BoundaryPolicy::default(),
            max_radius: Self::DEFAULT_MAX_RADIUS,
        }
    }
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A blur parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),

    /// Failed to encode the output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(#[source] image::ImageError),

    /// The worker pool stopped before every pixel was computed.
    #[error("worker pool terminated before all pixels were processed")]
    WorkerPool,

    /// The request was abandoned before the blur finished.
    #[error("blur cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(radius: u32, sigma: f64, quality: u8) -> BlurParams {
        BlurParams {
            radius,
            sigma,
            quality,
        }
    }

    #[test]
    fn pixel_count_does_not_overflow() {
        let dims = Dimensions {
            width: u32::MAX,
            height: 2,
        };
        assert_eq!(dims.pixel_count(), u64::from(u32::MAX) * 2);
    }

    #[test]
    fn valid_params_pass() {
        assert!(params(3, 1.0, 80).validate(100).is_ok());
        assert!(params(0, 0.1, 0).validate(100).is_ok());
        assert!(params(100, 50.0, 100).validate(100).is_ok());
    }

    #[test]
    fn radius_above_max_is_rejected() {
        let result = params(101, 1.0, 80).validate(100);
        assert!(matches!(result, Err(PipelineError::InvalidParameter(_))));
    }

    #[test]
    fn bad_sigma_is_rejected() {
        for sigma in [0.0, -2.0, f64::NAN, f64::NEG_INFINITY] {
            let result = params(3, sigma, 80).validate(100);
            assert!(
                matches!(result, Err(PipelineError::InvalidParameter(_))),
                "sigma {sigma} should be rejected",
            );
        }
    }

    #[test]
    fn quality_above_100_is_rejected() {
        let result = params(3, 1.0, 101).validate(100);
        assert!(matches!(result, Err(PipelineError::InvalidParameter(_))));
    }

    #[test]
    fn default_config_uses_clamp_and_100_workers() {
        let config = BlurConfig::default();
        assert_eq!(config.worker_count, 100);
        assert_eq!(config.boundary, BoundaryPolicy::Clamp);
        assert_eq!(config.max_radius, 100);
    }

    #[test]
    fn boundary_policy_serializes_snake_case() {
        let json = serde_json::to_string(&BoundaryPolicy::Mirror).ok();
        assert_eq!(json.as_deref(), Some("\"mirror\""));
    }
}
