//! Leading control message.
//!
//! Every session opens with a 4-byte little-endian signed integer:
//! `0` asks for an image to be processed, `1` asks the server to shut
//! down. Anything else is malformed.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProtocolError;

/// What the client wants from this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Parameters and an image follow; a reply is expected.
    Process,
    /// Stop the server. Nothing follows and nothing is replied.
    Shutdown,
}

impl Control {
    /// Encoded size in bytes.
    pub const LEN: usize = 4;

    /// Wire value.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Process => 0,
            Self::Shutdown => 1,
        }
    }

    /// Interpret a wire value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] for any value other than 0 or 1.
    pub fn from_code(code: i32) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Process),
            1 => Ok(Self::Shutdown),
            other => Err(ProtocolError::Malformed(format!(
                "unknown control value {other}"
            ))),
        }
    }

    /// Wire bytes.
    #[must_use]
    pub const fn encode(self) -> [u8; Self::LEN] {
        self.code().to_le_bytes()
    }

    /// Read and interpret one control message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the stream ends early and
    /// [`ProtocolError::Malformed`] for an unknown value.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, ProtocolError> {
        let code = reader.read_i32_le().await?;
        Self::from_code(code)
    }
}
