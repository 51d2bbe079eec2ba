//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use gossian_pipeline::BlurConfig;
use gossian_protocol::{DEFAULT_MAX_PAYLOAD_BYTES, WireFormat};
use serde::{Deserialize, Serialize};

/// Everything a server needs to know before it binds.
///
/// Serializable so the binary can take the whole thing as one JSON
/// document (`--config-json`). Missing fields take their defaults.
///
/// Every running blur occupies one blocking thread plus
/// `blur.worker_count` scoped worker threads, so the peak thread count
/// is about `max_concurrent_blurs * (blur.worker_count + 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on, `host:port`.
    pub addr: String,
    /// Worker pool and boundary policy.
    pub blur: BlurConfig,
    /// Parameter encoding and payload framing.
    pub wire: WireFormat,
    /// Deadline for each read and each write on a connection, in seconds.
    pub io_timeout_secs: u64,
    /// Largest accepted image payload in bytes.
    pub max_payload_bytes: u64,
    /// How many blurs may run at once. Values below 1 are treated as 1.
    pub max_concurrent_blurs: usize,
    /// If set, every reply is also written to this directory.
    pub output_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Default listen address.
    pub const DEFAULT_ADDR: &'static str = "localhost:8000";

    /// Default per-operation I/O deadline in seconds.
    pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 30;

    /// Default number of blurs allowed to run at once.
    pub const DEFAULT_MAX_CONCURRENT_BLURS: usize = 4;

    /// Per-operation I/O deadline.
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: Self::DEFAULT_ADDR.to_owned(),
            blur: BlurConfig::default(),
            wire: WireFormat::default(),
            io_timeout_secs: Self::DEFAULT_IO_TIMEOUT_SECS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_concurrent_blurs: Self::DEFAULT_MAX_CONCURRENT_BLURS,
            output_dir: None,
        }
    }
}
