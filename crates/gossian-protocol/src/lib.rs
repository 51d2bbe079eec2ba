//! gossian-protocol: Wire format for remote blur sessions.
//!
//! One TCP connection carries one session:
//!
//! 1. control (`int32` LE): `0` process, `1` shutdown
//! 2. parameters `radius:sigma:quality:` ([`ParameterEncoding`])
//! 3. image payload ([`Framing`])
//! 4. reply payload, framed like the request image
//!
//! Encoders are pure functions over byte slices. Readers are generic
//! over `tokio::io::AsyncRead`, so they work on sockets and on in-memory
//! buffers alike. Both ends of a deployment must agree on the
//! [`WireFormat`]; nothing on the wire identifies it.

pub mod control;
pub mod error;
pub mod framing;
pub mod params;

use std::future::Future;
use std::time::Duration;

use gossian_pipeline::BlurParams;
use serde::{Deserialize, Serialize};

pub use control::Control;
pub use error::{ErrorKind, ProtocolError};
pub use framing::{Framing, encode_payload, read_payload};
pub use params::ParameterEncoding;

/// Default limit on a single image payload (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// The encodings a deployment has agreed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireFormat {
    /// How the parameter text is delimited.
    pub parameters: ParameterEncoding,
    /// How the request and reply images are delimited.
    pub framing: Framing,
}

/// Everything a client writes for a process request, in wire order.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the parameters do not fit the
/// parameter encoding, or [`ProtocolError::PayloadTooLarge`] if the
/// image cannot be framed.
pub fn encode_request(
    params: &BlurParams,
    image: &[u8],
    wire: WireFormat,
) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Control::Process.encode().to_vec();
    out.extend(params::encode(params, wire.parameters)?);
    out.extend(encode_payload(image, wire.framing)?);
    Ok(out)
}

/// Await `fut`, giving up after `limit`.
///
/// # Errors
///
/// Returns [`ProtocolError::Timeout`] if the deadline passes first,
/// otherwise whatever `fut` returns.
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, ProtocolError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ProtocolError::Timeout(limit))?
}
