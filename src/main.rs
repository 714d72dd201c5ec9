//! ProPlay - Main Application Entrypoint
//!
//! This file is responsible for parsing command-line arguments, initializing
//! the application environment (logging, Ctrl-C handling), and dispatching
//! the core processing logic.

use clap::Parser;
use log::{error, info, warn};
use proplay::chat::{ApiKey, ImageDetail};
use proplay::{run, Config, Outcome};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Samples frames from a sports video and asks a vision model for coaching feedback.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input video file (mp4, avi or mov)
    #[arg(short, long)]
    input: PathBuf,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat model used for both analysis and summary
    #[arg(long, default_value_t = String::from(proplay::chat::DEFAULT_MODEL))]
    model: String,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, default_value_t = String::from(proplay::chat::DEFAULT_BASE_URL))]
    base_url: String,

    /// Per-request timeout in seconds (no timeout when omitted)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Keep every Nth decoded frame
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    stride: u64,

    /// Number of extracted frames to send for analysis, taken in decode
    /// order (frame_2 comes before frame_10)
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    max_frames: u64,

    /// JPEG quality for extracted frames (1 to 100)
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Image detail requested from the model
    #[arg(long, value_enum, default_value_t = Detail::Low)]
    detail: Detail,

    /// Keep extracted frames in this directory instead of discarding them
    #[arg(long)]
    keep_frames: Option<PathBuf>,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum Detail {
    Low,
    High,
    Auto,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Info,
    Debug,
}

fn main() -> ExitCode {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = Args::parse();

    // 1. Initialize Logger
    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting ProPlay...");

    // 2. Stop between steps on the first Ctrl-C so scratch files get removed;
    // a second press exits at once and skips that cleanup
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || {
        if interrupt(&flag) {
            std::process::exit(130);
        }
        warn!("Stopping after the current step. Press Ctrl-C again to quit immediately.");
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    // 3. Create a configuration object from arguments
    let mut config = Config::new(args.input);
    config.api_key = args.api_key.and_then(ApiKey::new);
    config.model = args.model;
    config.base_url = args.base_url;
    config.request_timeout = args.timeout_secs.map(Duration::from_secs);
    config.stride = args.stride;
    config.max_analyzed_frames = frame_limit(args.max_frames);
    config.jpeg_quality = args.jpeg_quality;
    config.image_detail = match args.detail {
        Detail::Low => ImageDetail::Low,
        Detail::High => ImageDetail::High,
        Detail::Auto => ImageDetail::Auto,
    };
    config.keep_frames = args.keep_frames;
    config.report_path = args.report;
    config.cancel = cancel;

    // 4. Run the main application logic
    let result = run(config);
    match &result {
        Ok(Outcome::Completed(report)) => {
            print!("{}", report.render());
            info!("Processing completed successfully.");
        }
        Ok(Outcome::MissingApiKey) => {}
        Err(e) => error!("Application failed: {:#}", e),
    }
    ExitCode::from(exit_code(&result))
}

/// Records a Ctrl-C. Returns `true` when one was already pending.
fn interrupt(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::SeqCst)
}

/// Counts that do not fit in `usize` mean "every frame".
fn frame_limit(requested: u64) -> usize {
    usize::try_from(requested).unwrap_or(usize::MAX)
}

fn exit_code(result: &anyhow::Result<Outcome>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_with_missing_input_only_warns() {
        let result = run(Config::new("no/such/clip.mp4"));
        assert!(matches!(result, Ok(Outcome::MissingApiKey)));
        assert_eq!(exit_code(&result), 0);
    }

    #[test]
    fn missing_input_with_a_key_is_a_run_failure() {
        let mut config = Config::new("no/such/clip.mp4");
        config.api_key = ApiKey::new("sk-test");
        let result = run(config);
        assert!(result.is_err());
        assert_eq!(exit_code(&result), 2);
    }

    #[test]
    fn second_interrupt_asks_for_immediate_exit() {
        let flag = AtomicBool::new(false);
        assert!(!interrupt(&flag));
        assert!(flag.load(Ordering::SeqCst));
        assert!(interrupt(&flag));
    }

    #[test]
    fn frame_limit_keeps_representable_counts() {
        assert_eq!(frame_limit(1), 1);
        assert_eq!(frame_limit(42), 42);
        assert_eq!(frame_limit(u64::MAX), usize::MAX);
    }

    #[test]
    fn cli_rejects_zero_frame_limit() {
        assert!(Args::try_parse_from(["proplay", "-i", "a.mp4", "-n", "0"]).is_err());
        let args = Args::try_parse_from(["proplay", "-i", "a.mp4", "-n", "3"]).unwrap();
        assert_eq!(frame_limit(args.max_frames), 3);
    }
}
