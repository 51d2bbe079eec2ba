//! One connection, one request.
//!
//! A session reads the control message, the parameters and the image
//! in that order, each under the configured deadline, runs the blur on
//! a blocking thread, optionally saves the result, and writes the framed
//! reply. Any error ends the session without a reply; the caller logs it.
//!
//! The blur stops as soon as the session does: when the peer hangs up
//! mid-blur, or when the session task is dropped or aborted.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use gossian_pipeline::{BlurOutput, PipelineError};
use gossian_protocol::{
    Control, ErrorKind, ProtocolError, encode_payload, params, read_payload, with_deadline,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

/// How a session ended, when it ended well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The blurred image was sent back.
    Replied {
        /// Encoded image size, before framing.
        bytes: usize,
    },
    /// The peer asked the server to stop. Nothing was sent.
    Shutdown,
}

/// Errors that end a session early.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading or writing the wire format failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The blur itself failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The blocking blur task was cancelled or panicked.
    #[error("blur task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The server stopped handing out blur slots.
    #[error("server is shutting down")]
    ShuttingDown,
}

impl SessionError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(e) => e.kind(),
            Self::Pipeline(e) => ErrorKind::from(e),
            Self::Task(_) => ErrorKind::CodecError,
            Self::ShuttingDown => ErrorKind::ConnectionError,
        }
    }
}

/// Sets the blur's cancel flag when dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Resolves once the peer closes its half of the connection or the
/// socket fails. Stray bytes are discarded.
async fn peer_gone<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut scratch = [0_u8; 64];
    while matches!(reader.read(&mut scratch).await, Ok(n) if n > 0) {}
}

/// Serve one session on `stream`.
///
/// Parameters are checked against `config.blur.max_radius` before the
/// image is read, so an invalid request never reaches the engine. The
/// blur itself waits for a permit from `blur_slots`.
///
/// The peer must keep the connection open until the reply arrives. A
/// peer that closes it while the blur runs cancels the blur.
///
/// # Errors
///
/// Returns [`SessionError`] for any protocol, deadline, decode or encode
/// failure. The stream is dropped, and so closed, without a reply.
pub async fn handle_connection<S>(
    stream: S,
    config: &ServerConfig,
    blur_slots: &Semaphore,
    peer: SocketAddr,
) -> Result<SessionOutcome, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    let deadline = config.io_timeout();
    let start = Instant::now();

    if with_deadline(deadline, Control::read(&mut stream)).await? == Control::Shutdown {
        info!(%peer, "shutdown requested");
        return Ok(SessionOutcome::Shutdown);
    }

    let params = with_deadline(deadline, params::read(&mut stream, config.wire.parameters)).await?;
    params.validate(config.blur.max_radius)?;
    debug!(
        %peer,
        radius = params.radius,
        sigma = params.sigma,
        quality = params.quality,
        "parameters received",
    );

    let image = with_deadline(
        deadline,
        read_payload(&mut stream, config.wire.framing, config.max_payload_bytes),
    )
    .await?;
    let receive = start.elapsed();
    debug!(%peer, bytes = image.len(), ?receive, "image received");

    let slot = tokio::select! {
        acquired = blur_slots.acquire() => acquired.map_err(|_| SessionError::ShuttingDown)?,
        () = peer_gone(&mut stream) => return Err(peer_hung_up()),
    };

    let cancel = CancelOnDrop(Arc::new(AtomicBool::new(false)));
    let flag = Arc::clone(&cancel.0);
    let blur = config.blur;
    let mut task = tokio::task::spawn_blocking(move || {
        gossian_pipeline::process(&image, &params, &blur, &flag)
    });
    let output = tokio::select! {
        joined = &mut task => joined??,
        () = peer_gone(&mut stream) => {
            debug!(%peer, "peer hung up mid-blur");
            return Err(peer_hung_up());
        }
    };
    drop(slot);

    if let Some(dir) = &config.output_dir {
        persist(dir, peer, &output).await;
    }

    let send_start = Instant::now();
    let reply = encode_payload(&output.bytes, config.wire.framing)?;
    with_deadline(deadline, async {
        stream.write_all(&reply).await?;
        stream.flush().await?;
        stream.shutdown().await?;
        Ok::<(), ProtocolError>(())
    })
    .await?;
    let send = send_start.elapsed();

    let d = &output.diagnostics;
    info!(
        %peer,
        width = output.dimensions.width,
        height = output.dimensions.height,
        radius = params.radius,
        sigma = params.sigma,
        workers = d.summary.worker_count,
        ?receive,
        decode = ?d.decode,
        kernel = ?d.kernel,
        convolve = ?d.convolve,
        encode = ?d.encode,
        ?send,
        "request served",
    );
    debug!(%peer, "\n{}", d.report());

    Ok(SessionOutcome::Replied {
        bytes: output.bytes.len(),
    })
}

fn peer_hung_up() -> SessionError {
    ProtocolError::Io(io::Error::from(io::ErrorKind::ConnectionAborted)).into()
}

/// File name for a saved reply: `<unix-millis>_<peer>.<ext>`, with the
/// `:` of the peer address replaced so it is valid on every platform.
#[must_use]
pub fn reply_file_name(at: SystemTime, peer: SocketAddr, extension: &str) -> String {
    let millis = at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    let peer = peer.to_string().replace(':', "_");
    format!("{millis}_{peer}.{extension}")
}

async fn persist(dir: &Path, peer: SocketAddr, output: &BlurOutput) {
    let path: PathBuf = dir.join(reply_file_name(
        SystemTime::now(),
        peer,
        output.format.extension(),
    ));
    match tokio::fs::write(&path, &output.bytes).await {
        Ok(()) => debug!(%peer, path = %path.display(), "reply saved"),
        Err(e) => warn!(%peer, path = %path.display(), error = %e, "failed to save reply"),
    }
}
