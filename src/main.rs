//! dash-packager command line
//!
//! Packages MP4 files into a DASH on-demand presentation: one fragmented MP4
//! per representation plus a `Manifest.mpd`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dash_packager::config::LoggingConfig;
use dash_packager::{run_with_config, PackagerConfig};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "dash-packager";

#[derive(Debug, Parser)]
#[command(name = APP_NAME, version = VERSION, about = "Package MP4 files for DASH on-demand streaming")]
struct Args {
    /// Input MP4 files, processed in order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory (created when missing)
    #[arg(short = 'o', long = "outputdir", default_value = ".")]
    output_dir: PathBuf,

    /// Key id for the encrypted video layer (UUID or 32 hex digits)
    #[arg(long = "video-key-id", requires = "video_key")]
    video_key_id: Option<String>,

    /// AES-128 key for the encrypted video layer (32 hex digits)
    #[arg(long = "video-key", requires = "video_key_id")]
    video_key: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (pretty, json); overrides the configuration
    #[arg(long = "log-format")]
    log_format: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match PackagerConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}: {}", APP_NAME, e);
                return exit_code(e.exit_code());
            }
        },
        None => PackagerConfig::default(),
    };

    let mut logging = config.logging.clone();
    if let Some(format) = &args.log_format {
        logging.format = format.clone();
    }
    init_logging(&logging);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    let status = run_with_config(
        config,
        &args.inputs,
        &args.output_dir,
        args.video_key_id.as_deref(),
        args.video_key.as_deref(),
    );
    exit_code(status)
}

fn exit_code(status: i32) -> ExitCode {
    ExitCode::from(u8::try_from(status).unwrap_or(1))
}

/// Initialize logging with tracing
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dash_packager={}", logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_key_without_key_id_is_usage_error() {
        let result = Args::try_parse_from([
            APP_NAME,
            "--video-key",
            "3a2a1b68dd2bd9b2eeb25e84c4776668",
            "in.mp4",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            APP_NAME,
            "-o",
            "/tmp/out",
            "--video-key-id",
            "10000000-1000-1000-1000-100000000001",
            "--video-key",
            "3a2a1b68dd2bd9b2eeb25e84c4776668",
            "a.mp4",
            "b.mp4",
        ])
        .unwrap();
        assert_eq!(args.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(args.inputs.len(), 2);
        assert!(args.video_key.is_some());
    }
}
