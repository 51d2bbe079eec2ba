//! Per-request diagnostics: timing and sizes for each processing stage.
//!
//! Every call to [`process`](crate::process) collects diagnostics
//! alongside the encoded reply. The server logs the stage timings with
//! every request and the full [`BlurDiagnostics::report`] at `debug`.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::BoundaryPolicy;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single blur request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlurDiagnostics {
    /// Image decoding.
    #[serde(with = "duration_serde")]
    pub decode: Duration,
    /// Kernel construction.
    #[serde(with = "duration_serde")]
    pub kernel: Duration,
    /// Border padding (mirror policy) plus the pooled convolution.
    #[serde(with = "duration_serde")]
    pub convolve: Duration,
    /// Image encoding.
    #[serde(with = "duration_serde")]
    pub encode: Duration,
    /// Wall-clock duration of the whole request.
    #[serde(with = "duration_serde")]
    pub total: Duration,
    /// Sizes and settings.
    pub summary: BlurSummary,
}

/// Sizes and settings of a single blur request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlurSummary {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Total pixel count, one work item each.
    pub pixel_count: u64,
    /// Kernel radius.
    pub radius: u32,
    /// Kernel standard deviation.
    pub sigma: f64,
    /// Size of the worker pool.
    pub worker_count: usize,
    /// Boundary policy used.
    pub boundary: BoundaryPolicy,
    /// Encoded input size.
    pub input_bytes: usize,
    /// Encoded output size.
    pub output_bytes: usize,
}

impl BlurDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let s = &self.summary;
        let total_ms = duration_ms(self.total);

        let mut lines = vec![
            format!("Blur Diagnostics Report\n{}", "=".repeat(48)),
            format!(
                "Image: {}x{} ({} pixels, {} bytes in, {} bytes out)",
                s.width, s.height, s.pixel_count, s.input_bytes, s.output_bytes,
            ),
            format!(
                "Kernel: radius {} sigma {} | {} workers | {:?} boundary",
                s.radius, s.sigma, s.worker_count, s.boundary,
            ),
            format!("Total duration: {total_ms:.3}ms"),
            String::new(),
            format!("{:<12} {:>10} {:>10}", "Stage", "Duration", "% Total"),
            "-".repeat(34),
        ];

        for (name, duration) in [
            ("Decode", self.decode),
            ("Kernel", self.kernel),
            ("Convolve", self.convolve),
            ("Encode", self.encode),
        ] {
            let ms = duration_ms(duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!("{name:<12} {ms:>8.3}ms {pct:>9.1}%"));
        }

        lines.join("\n")
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
