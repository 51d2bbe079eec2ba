//! gossian-client: Send images to a gossian blur server.
//!
//! Each call opens its own connection. [`request_blur`] writes the
//! control message, the parameters and the image, then waits for the
//! framed reply. [`request_shutdown`] writes only the shutdown control
//! message and returns without waiting for anything.
//!
//! The server never sends an error reply: it closes the connection. A
//! reply that ends early is therefore reported as a
//! [`ErrorKind::ConnectionError`], never as a short image.

use std::time::Duration;

use gossian_pipeline::BlurParams;
use gossian_protocol::{
    Control, DEFAULT_MAX_PAYLOAD_BYTES, ErrorKind, ProtocolError, WireFormat, encode_request,
    read_payload, with_deadline,
};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Where and how to talk to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address, `host:port`.
    pub addr: String,
    /// Must match the server's.
    pub wire: WireFormat,
    /// Deadline for connecting and for sending the request.
    pub io_timeout: Duration,
    /// Deadline for the reply, which includes the server's processing time.
    pub reply_timeout: Duration,
    /// Largest accepted reply in bytes.
    pub max_payload_bytes: u64,
}

impl ClientConfig {
    /// Default server address.
    pub const DEFAULT_ADDR: &'static str = "localhost:8000";

    /// Default connect and send deadline.
    pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default reply deadline.
    pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(300);
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: Self::DEFAULT_ADDR.to_owned(),
            wire: WireFormat::default(),
            io_timeout: Self::DEFAULT_IO_TIMEOUT,
            reply_timeout: Self::DEFAULT_REPLY_TIMEOUT,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Errors a client request can end with.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The parameters were rejected before connecting.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Connecting to the server failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialled.
        addr: String,
        /// Underlying error.
        #[source]
        source: ProtocolError,
    },

    /// Sending the request or receiving the reply failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::Connect { .. } => ErrorKind::ConnectionError,
            Self::Protocol(e) => e.kind(),
        }
    }
}

async fn connect(config: &ClientConfig) -> Result<TcpStream, ClientError> {
    let connecting = async { Ok::<_, ProtocolError>(TcpStream::connect(&config.addr).await?) };
    let stream = with_deadline(config.io_timeout, connecting)
        .await
        .map_err(|source| ClientError::Connect {
            addr: config.addr.clone(),
            source,
        })?;
    debug!(addr = %config.addr, "connected");
    Ok(stream)
}

/// Send `image` to be blurred with `params` and return the encoded reply.
///
/// The reply is in the same image format as `image` (PNG stays PNG,
/// anything else comes back as JPEG).
///
/// # Errors
///
/// - [`ClientError::InvalidParameter`] if `params` are out of range;
///   nothing is sent.
/// - [`ClientError::Connect`] if the server cannot be reached.
/// - [`ClientError::Protocol`] if sending fails, the reply is malformed,
///   or the server closes the connection without a complete reply.
pub async fn request_blur(
    config: &ClientConfig,
    image: &[u8],
    params: &BlurParams,
) -> Result<Vec<u8>, ClientError> {
    params
        .validate(u32::MAX)
        .map_err(|e| ClientError::InvalidParameter(e.to_string()))?;
    let request = encode_request(params, image, config.wire)?;

    let mut stream = BufReader::new(connect(config).await?);
    with_deadline(config.io_timeout, async {
        stream.write_all(&request).await?;
        stream.flush().await?;
        Ok::<(), ProtocolError>(())
    })
    .await?;
    debug!(
        bytes = request.len(),
        radius = params.radius,
        sigma = params.sigma,
        quality = params.quality,
        "request sent",
    );

    let reply = with_deadline(
        config.reply_timeout,
        read_payload(&mut stream, config.wire.framing, config.max_payload_bytes),
    )
    .await?;
    info!(bytes = reply.len(), "reply received");
    Ok(reply)
}

/// Ask the server to stop. Does not wait for a reply; none is sent.
///
/// # Errors
///
/// Returns [`ClientError::Connect`] if the server cannot be reached and
/// [`ClientError::Protocol`] if the control message cannot be sent.
pub async fn request_shutdown(config: &ClientConfig) -> Result<(), ClientError> {
    let mut stream = connect(config).await?;
    with_deadline(config.io_timeout, async {
        stream.write_all(&Control::Shutdown.encode()).await?;
        stream.flush().await?;
        stream.shutdown().await?;
        Ok::<(), ProtocolError>(())
    })
    .await?;
    info!(addr = %config.addr, "shutdown requested");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    async fn listener() -> (TcpListener, ClientConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            addr: listener.local_addr().unwrap().to_string(),
            io_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        };
        (listener, config)
    }

    #[tokio::test]
    async fn invalid_params_fail_before_connecting() {
        // 192.0.2.0/24 is reserved for documentation; connecting would
        // hang until the deadline.
        let config = ClientConfig {
            addr: "192.0.2.1:9".into(),
            ..ClientConfig::default()
        };
        let params = BlurParams {
            radius: 3,
            sigma: -1.0,
            quality: 80,
        };
        let err = request_blur(&config, b"img", &params).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[tokio::test]
    async fn shutdown_writes_only_the_control_message() {
        let (listener, config) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });
        request_shutdown(&config).await.unwrap();
        assert_eq!(server.await.unwrap(), [1, 0, 0, 0]);
    }

    #[tokio::test]
    async fn early_close_is_a_connection_error() {
        let (listener, config) = listener().await;
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });
        let params = BlurParams {
            radius: 1,
            sigma: 1.0,
            quality: 80,
        };
        let err = request_blur(&config, b"img", &params).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }

    #[tokio::test]
    async fn truncated_reply_is_not_an_image() {
        let (listener, config) = listener().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Announce 100 bytes, send 3, hang up.
            socket.write_all(&100_i32.to_le_bytes()).await.unwrap();
            socket.write_all(b"abc").await.unwrap();
        });
        let params = BlurParams {
            radius: 1,
            sigma: 1.0,
            quality: 80,
        };
        let err = request_blur(&config, b"img", &params).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }
}
