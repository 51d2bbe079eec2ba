//! Blur parameter record.
//!
//! The parameters travel as the text `radius:sigma:quality:` (the
//! trailing colon is optional on input). Two encodings carry that text:
//!
//! - [`ParameterEncoding::Record`]: a 4-byte little-endian length, then
//!   exactly that many bytes of UTF-8.
//! - [`ParameterEncoding::FixedBlock`]: a 256-byte block, the text
//!   followed by NUL padding. Text that does not fit is rejected rather
//!   than truncated.

use gossian_pipeline::BlurParams;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProtocolError;

/// Size of a [`ParameterEncoding::FixedBlock`].
pub const FIXED_BLOCK_LEN: usize = 256;

/// Largest accepted [`ParameterEncoding::Record`] body.
pub const MAX_RECORD_LEN: usize = 1024;

/// How the parameter text is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterEncoding {
    /// Length-prefixed text.
    #[default]
    Record,
    /// NUL-padded 256-byte block.
    FixedBlock,
}

/// Format `params` as `radius:sigma:quality:`.
#[must_use]
pub fn to_text(params: &BlurParams) -> String {
    format!("{}:{}:{}:", params.radius, params.sigma, params.quality)
}

/// Parse `radius:sigma:quality[:]`.
///
/// Fields may carry surrounding whitespace.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if a field is missing,
/// non-numeric, or followed by anything but an empty trailing field.
/// Returns [`ProtocolError::InvalidParameter`] for a negative radius,
/// a non-positive sigma, or a quality outside `0..=100`.
pub fn parse(text: &str) -> Result<BlurParams, ProtocolError> {
    let mut fields = text.split(':').map(str::trim);

    let mut next = |name: &str| {
        fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ProtocolError::Malformed(format!("missing {name} field")))
    };
    let radius = next("radius")?;
    let sigma = next("sigma")?;
    let quality = next("quality")?;

    let trailing: Vec<&str> = fields.collect();
    if !(trailing.is_empty() || trailing == [""]) {
        return Err(ProtocolError::Malformed(format!(
            "unexpected data after quality: {:?}",
            trailing.join(":")
        )));
    }

    let radius: i64 = radius
        .parse()
        .map_err(|e| ProtocolError::Malformed(format!("radius {radius:?}: {e}")))?;
    let sigma: f64 = sigma
        .parse()
        .map_err(|e| ProtocolError::Malformed(format!("sigma {sigma:?}: {e}")))?;
    let quality: i64 = quality
        .parse()
        .map_err(|e| ProtocolError::Malformed(format!("quality {quality:?}: {e}")))?;

    let radius = u32::try_from(radius).map_err(|_| {
        ProtocolError::InvalidParameter(format!("radius must be non-negative, got {radius}"))
    })?;
    let quality = u8::try_from(quality)
        .ok()
        .filter(|q| *q <= BlurParams::MAX_QUALITY)
        .ok_or_else(|| {
            ProtocolError::InvalidParameter(format!("quality must be 0 to 100, got {quality}"))
        })?;

    let params = BlurParams {
        radius,
        sigma,
        quality,
    };
    // Radius limits are deployment configuration, checked by the pipeline.
    params
        .validate(u32::MAX)
        .map_err(|e| ProtocolError::InvalidParameter(e.to_string()))?;
    Ok(params)
}

/// Wire bytes for `params` in `encoding`.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the text does not fit the
/// encoding.
pub fn encode(params: &BlurParams, encoding: ParameterEncoding) -> Result<Vec<u8>, ProtocolError> {
    let text = to_text(params);
    match encoding {
        ParameterEncoding::Record => {
            if text.len() > MAX_RECORD_LEN {
                return Err(ProtocolError::Malformed(format!(
                    "parameter record of {} bytes exceeds {MAX_RECORD_LEN}",
                    text.len()
                )));
            }
            let len = u32::try_from(text.len())
                .map_err(|_| ProtocolError::Malformed("parameter record too long".into()))?;
            let mut out = Vec::with_capacity(4 + text.len());
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(text.as_bytes());
            Ok(out)
        }
        ParameterEncoding::FixedBlock => {
            if text.len() > FIXED_BLOCK_LEN {
                return Err(ProtocolError::Malformed(format!(
                    "parameter text of {} bytes does not fit the {FIXED_BLOCK_LEN}-byte block",
                    text.len()
                )));
            }
            let mut block = vec![0_u8; FIXED_BLOCK_LEN];
            block[..text.len()].copy_from_slice(text.as_bytes());
            Ok(block)
        }
    }
}

/// Read and parse one parameter message.
///
/// # Errors
///
/// Returns [`ProtocolError::Io`] if the stream ends early, and the
/// errors of [`parse`] for bad content.
pub async fn read<R: AsyncRead + Unpin>(
    reader: &mut R,
    encoding: ParameterEncoding,
) -> Result<BlurParams, ProtocolError> {
    let body = match encoding {
        ParameterEncoding::Record => {
            let len = reader.read_i32_le().await?;
            let len = usize::try_from(len)
                .ok()
                .filter(|len| *len <= MAX_RECORD_LEN)
                .ok_or_else(|| {
                    ProtocolError::Malformed(format!("bad parameter record length {len}"))
                })?;
            let mut body = vec![0_u8; len];
            reader.read_exact(&mut body).await?;
            body
        }
        ParameterEncoding::FixedBlock => {
            let mut block = vec![0_u8; FIXED_BLOCK_LEN];
            reader.read_exact(&mut block).await?;
            let end = block.iter().position(|&b| b == 0).unwrap_or(block.len());
            block.truncate(end);
            block
        }
    };

    let text = std::str::from_utf8(&body)
        .map_err(|e| ProtocolError::Malformed(format!("parameters are not UTF-8: {e}")))?;
    parse(text)
}
