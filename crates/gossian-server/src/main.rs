//! gossian-server: accept blur requests over TCP.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin gossian-server -- [OPTIONS]
//! ```
//!
//! Logging is controlled through `RUST_LOG` (default `info`).

#![allow(clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use gossian_pipeline::{BlurConfig, BoundaryPolicy};
use gossian_protocol::{DEFAULT_MAX_PAYLOAD_BYTES, Framing, ParameterEncoding, WireFormat};
use gossian_server::ServerConfig;
use tracing_subscriber::EnvFilter;

/// Remote Gaussian blur server.
///
/// Listens for blur requests, runs each on a fixed-size worker pool and
/// replies with the blurred image. A client sending the shutdown control
/// message stops the server.
#[derive(Parser)]
#[command(name = "gossian-server", version)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = ServerConfig::DEFAULT_ADDR)]
    addr: String,

    /// Worker pool size (also the capacity of both queues).
    #[arg(long, default_value_t = BlurConfig::DEFAULT_WORKER_COUNT, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    workers: usize,

    /// Treatment of kernel offsets outside the image.
    #[arg(long, value_enum, default_value_t = Boundary::Clamp)]
    boundary: Boundary,

    /// Largest radius a request may ask for.
    #[arg(long, default_value_t = BlurConfig::DEFAULT_MAX_RADIUS)]
    max_radius: u32,

    /// Image payload framing; clients must use the same.
    #[arg(long, value_enum, default_value_t = PayloadFraming::LengthPrefixed)]
    framing: PayloadFraming,

    /// Parameter encoding; clients must use the same.
    #[arg(long, value_enum, default_value_t = Params::Record)]
    params: Params,

    /// Per read/write deadline in seconds.
    #[arg(long, default_value_t = ServerConfig::DEFAULT_IO_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Largest accepted image payload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
    max_payload: u64,

    /// Blurs allowed to run at once; each holds `--workers` threads.
    #[arg(long, default_value_t = ServerConfig::DEFAULT_MAX_CONCURRENT_BLURS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_concurrent_blurs: usize,

    /// Also save every reply into this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Full server config as a JSON string.
    ///
    /// When provided, all other flags are ignored. Missing fields take
    /// their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Boundary policy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Boundary {
    /// Skip outside neighbours and renormalize.
    Clamp,
    /// Mirror-pad the image once per request.
    Mirror,
}

/// Payload framing selection.
#[derive(Clone, Copy, ValueEnum)]
enum PayloadFraming {
    /// `int32` LE length, then raw bytes.
    LengthPrefixed,
    /// Base64 text ending in a newline.
    Base64,
}

/// Parameter encoding selection.
#[derive(Clone, Copy, ValueEnum)]
enum Params {
    /// Length-prefixed text.
    Record,
    /// 256-byte NUL-padded block.
    Block,
}

fn config_from_cli(cli: &Cli) -> Result<ServerConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(ServerConfig {
        addr: cli.addr.clone(),
        blur: BlurConfig {
            worker_count: cli.workers,
            boundary: match cli.boundary {
                Boundary::Clamp => BoundaryPolicy::Clamp,
                Boundary::Mirror => BoundaryPolicy::Mirror,
            },
            max_radius: cli.max_radius,
        },
        wire: WireFormat {
            parameters: match cli.params {
                Params::Record => ParameterEncoding::Record,
                Params::Block => ParameterEncoding::FixedBlock,
            },
            framing: match cli.framing {
                PayloadFraming::LengthPrefixed => Framing::LengthPrefixed,
                PayloadFraming::Base64 => Framing::Base64Line,
            },
        },
        io_timeout_secs: cli.timeout_secs,
        max_payload_bytes: cli.max_payload,
        max_concurrent_blurs: cli.max_concurrent_blurs,
        output_dir: cli.output_dir.clone(),
    })
}

/// How long blocking blur threads may keep the process alive after the
/// server has stopped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run(config));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}

async fn run(config: ServerConfig) -> ExitCode {
    if let Some(dir) = &config.output_dir
        && let Err(e) = tokio::fs::create_dir_all(dir).await
    {
        eprintln!("Error creating {}: {e}", dir.display());
        return ExitCode::FAILURE;
    }

    let listener = match gossian_server::bind(&config).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error binding {}: {e}", config.addr);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        () = gossian_server::serve(listener, config) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    ExitCode::SUCCESS
}
