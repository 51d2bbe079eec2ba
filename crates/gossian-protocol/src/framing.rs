//! Image payload framing.
//!
//! The request image and the reply image use the same framing, chosen
//! once per deployment:
//!
//! - [`Framing::LengthPrefixed`]: a 4-byte little-endian signed length
//!   `L`, then exactly `L` raw bytes.
//! - [`Framing::Base64Line`]: the bytes in standard base64, terminated
//!   by a single `\n`. A `\r` before the newline is tolerated on read.
//!
//! Readers enforce a byte limit before allocating, so a hostile length
//! prefix or an endless line cannot exhaust memory.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::ProtocolError;

/// How image payloads are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// `int32` LE length followed by raw bytes.
    #[default]
    LengthPrefixed,
    /// Base64 text terminated by a newline.
    Base64Line,
}

/// Frame `bytes` for the wire.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if a length-prefixed
/// payload does not fit in an `int32`.
pub fn encode_payload(bytes: &[u8], framing: Framing) -> Result<Vec<u8>, ProtocolError> {
    match framing {
        Framing::LengthPrefixed => {
            let len = i32::try_from(bytes.len()).map_err(|_| ProtocolError::PayloadTooLarge {
                len: bytes.len() as u64,
                max: i32::MAX.unsigned_abs().into(),
            })?;
            let mut out = Vec::with_capacity(4 + bytes.len());
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(bytes);
            Ok(out)
        }
        Framing::Base64Line => {
            let mut out = STANDARD.encode(bytes).into_bytes();
            out.push(b'\n');
            Ok(out)
        }
    }
}

/// Read one framed payload of at most `max_len` decoded bytes.
///
/// # Errors
///
/// - [`ProtocolError::Io`] if the peer closes mid-frame.
/// - [`ProtocolError::Malformed`] for a negative length or invalid base64.
/// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds `max_len`.
pub async fn read_payload<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    framing: Framing,
    max_len: u64,
) -> Result<Vec<u8>, ProtocolError> {
    match framing {
        Framing::LengthPrefixed => {
            let len = reader.read_i32_le().await?;
            let len = u64::try_from(len)
                .map_err(|_| ProtocolError::Malformed(format!("negative payload length {len}")))?;
            if len > max_len {
                return Err(ProtocolError::PayloadTooLarge { len, max: max_len });
            }
            let len = usize::try_from(len).map_err(|_| ProtocolError::PayloadTooLarge {
                len,
                max: max_len,
            })?;
            let mut body = vec![0_u8; len];
            reader.read_exact(&mut body).await?;
            Ok(body)
        }
        Framing::Base64Line => {
            // Base64 grows by 4/3; allow the encoded form plus "\r\n".
            let line_limit = max_len.div_ceil(3).saturating_mul(4).saturating_add(2);
            let mut line = Vec::new();
            let n = (&mut *reader)
                .take(line_limit)
                .read_until(b'\n', &mut line)
                .await?;

            if line.last() != Some(&b'\n') {
                if n as u64 >= line_limit {
                    return Err(ProtocolError::PayloadTooLarge {
                        len: n as u64,
                        max: line_limit,
                    });
                }
                return Err(ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "payload line ended without a newline",
                )));
            }
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let bytes = STANDARD
                .decode(&line)
                .map_err(|e| ProtocolError::Malformed(format!("invalid base64 payload: {e}")))?;
            if bytes.len() as u64 > max_len {
                return Err(ProtocolError::PayloadTooLarge {
                    len: bytes.len() as u64,
                    max: max_len,
                });
            }
            Ok(bytes)
        }
    }
}
