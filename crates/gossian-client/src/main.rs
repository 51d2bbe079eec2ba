//! gossian-client: send an image to a gossian server and save the blurred
//! result, or tell the server to shut down.
//!
//! # Usage
//!
//! ```text
//! gossian-client blur photo.jpg --radius 3 --sigma 1.0 --quality 80
//! gossian-client shutdown
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueEnum};
use gossian_client::{ClientConfig, request_blur, request_shutdown};
use gossian_pipeline::{BlurParams, OutputFormat};
use gossian_protocol::{DEFAULT_MAX_PAYLOAD_BYTES, Framing, ParameterEncoding, WireFormat};
use tracing_subscriber::EnvFilter;

/// Client for the gossian remote blur server.
#[derive(Parser)]
#[command(name = "gossian-client", version)]
struct Cli {
    /// Server address.
    #[arg(long, global = true, default_value = ClientConfig::DEFAULT_ADDR)]
    addr: String,

    /// Image payload framing; must match the server.
    #[arg(long, global = true, value_enum, default_value_t = PayloadFraming::LengthPrefixed)]
    framing: PayloadFraming,

    /// Parameter encoding; must match the server.
    #[arg(long, global = true, value_enum, default_value_t = Params::Record)]
    params: Params,

    /// Connect and send deadline in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    /// Reply deadline in seconds, including server processing.
    #[arg(long, global = true, default_value_t = 300)]
    reply_timeout_secs: u64,

    /// Largest accepted reply in bytes.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
    max_payload: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Blur an image on the server and save the result.
    Blur {
        /// Image to send (PNG, JPEG, BMP, WebP).
        image_path: PathBuf,

        /// Kernel radius; the kernel is `2r+1` pixels wide.
        #[arg(long)]
        radius: u32,

        /// Gaussian standard deviation.
        #[arg(long)]
        sigma: f64,

        /// Output quality, 0 to 100 (JPEG only).
        #[arg(long, default_value_t = 80)]
        quality: u8,

        /// Where to write the result. Defaults to `<unix-millis>.<ext>`
        /// in the working directory.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Ask the server to stop.
    Shutdown,
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

fn config_from_cli(cli: &Cli) -> ClientConfig {
    ClientConfig {
        addr: cli.addr.clone(),
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
        io_timeout: Duration::from_secs(cli.timeout_secs),
        reply_timeout: Duration::from_secs(cli.reply_timeout_secs),
        max_payload_bytes: cli.max_payload,
    }
}

/// `<unix-millis>.<ext>`, with the extension taken from the reply bytes.
fn default_output_path(reply: &[u8]) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let ext = OutputFormat::matching(reply).extension();
    PathBuf::from(format!("{millis}.{ext}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config_from_cli(&cli);

    match cli.command {
        Command::Shutdown => match request_shutdown(&config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Shutdown failed: {e}");
                ExitCode::FAILURE
            }
        },
        Command::Blur {
            image_path,
            radius,
            sigma,
            quality,
            output,
        } => {
            let image = match std::fs::read(&image_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    eprintln!("Error reading {}: {e}", image_path.display());
                    return ExitCode::FAILURE;
                }
            };
            let params = BlurParams {
                radius,
                sigma,
                quality,
            };

            let reply = match request_blur(&config, &image, &params).await {
                Ok(reply) => reply,
                Err(e) => {
                    eprintln!("Blur failed ({:?}): {e}", e.kind());
                    return ExitCode::FAILURE;
                }
            };

            let path = output.unwrap_or_else(|| default_output_path(&reply));
            if let Err(e) = std::fs::write(&path, &reply) {
                eprintln!("Error writing {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
    }
}
