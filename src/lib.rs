//! ProPlay - Core Library
//!
//! This file contains the primary logic for the application, orchestrating
//! ingestion, frame sampling, coaching analysis and reporting.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

pub mod chat;
pub mod coach;
pub mod frame_encoder;
pub mod frame_sampler;
pub mod ingest;
pub mod report;
pub mod video_processor;

use chat::{ApiKey, ChatModel, ImageDetail, LlmConfig};
use coach::{CoachingAnalyzer, Summarizer};
use frame_sampler::FrameSampler;
use report::AnalysisReport;

/// Application configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_file: PathBuf,
    pub api_key: Option<ApiKey>,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Option<Duration>,
    /// Keep every `stride`-th decoded frame.
    pub stride: u64,
    /// How many of the extracted frames are sent to the model.
    pub max_analyzed_frames: usize,
    pub jpeg_quality: u8,
    pub image_detail: ImageDetail,
    /// Write frames here and leave them behind instead of using scratch space.
    pub keep_frames: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    /// Parent of the per-run scratch directory; the system temp dir when `None`.
    pub scratch_root: Option<PathBuf>,
    /// Set from outside (Ctrl-C) to stop between stages, frames and requests.
    pub cancel: Arc<AtomicBool>,
}

impl Config {
    pub fn new(input_file: impl Into<PathBuf>) -> Self {
        Config {
            input_file: input_file.into(),
            api_key: None,
            model: chat::DEFAULT_MODEL.to_string(),
            base_url: chat::DEFAULT_BASE_URL.to_string(),
            request_timeout: None,
            stride: 1,
            max_analyzed_frames: 1,
            jpeg_quality: frame_sampler::DEFAULT_JPEG_QUALITY,
            image_detail: ImageDetail::Low,
            keep_frames: None,
            report_path: None,
            scratch_root: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn llm_config(&self, api_key: ApiKey) -> LlmConfig {
        LlmConfig {
            api_key,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            timeout: self.request_timeout,
        }
    }
}

/// Steps a run goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    AwaitingApiKey,
    AwaitingUpload,
    VideoLoaded,
    Extracting,
    Analyzing,
    Done,
}

impl Stage {
    fn describe(self) -> &'static str {
        match self {
            Stage::Idle => "Starting ProPlay analysis",
            Stage::AwaitingApiKey => "Checking API key",
            Stage::AwaitingUpload => "Loading video",
            Stage::VideoLoaded => "Video loaded",
            Stage::Extracting => "Extracting frames from the video",
            Stage::Analyzing => "Analyzing frames",
            Stage::Done => "Analysis completed",
        }
    }
}

fn enter(stage: Stage) {
    info!("[{:?}] {}", stage, stage.describe());
}

/// How a run ended without error.
#[derive(Debug)]
pub enum Outcome {
    /// No usable API key; nothing was read, written or sent.
    MissingApiKey,
    Completed(AnalysisReport),
}

/// Entry point used by the binary: checks the credential, builds the
/// provider clients and runs the pipeline.
pub fn run(config: Config) -> Result<Outcome> {
    enter(Stage::Idle);
    info!("Initializing processing with config: {:?}", config);

    enter(Stage::AwaitingApiKey);
    let Some(api_key) = config.api_key.clone() else {
        warn!("Please provide an OpenAI API key (--api-key or OPENAI_API_KEY) to proceed.");
        return Ok(Outcome::MissingApiKey);
    };

    let llm = config.llm_config(api_key);
    let analyzer = CoachingAnalyzer::from_config(llm.clone())?.with_detail(config.image_detail);
    let summarizer = Summarizer::from_config(llm)?;

    run_with(&config, &analyzer, &summarizer).map(Outcome::Completed)
}

/// Runs ingestion, extraction and analysis against the given model clients.
///
/// The staged video and, unless `keep_frames` is set, the extracted frames
/// live in a scratch directory that is removed when this returns, whether
/// it succeeds, fails or is cancelled.
pub fn run_with<M: ChatModel>(
    config: &Config,
    analyzer: &CoachingAnalyzer<M>,
    summarizer: &Summarizer<M>,
) -> Result<AnalysisReport> {
    if config.max_analyzed_frames == 0 {
        bail!("The number of frames to analyze must be at least 1");
    }

    // 1. Ingest
    enter(Stage::AwaitingUpload);
    let mut builder = tempfile::Builder::new();
    builder.prefix("proplay-");
    let scratch = match &config.scratch_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .context("Failed to create scratch directory")?;
    let staged = ingest::stage_video(&config.input_file, scratch.path())?;
    coach::check_cancelled(&config.cancel)?;

    enter(Stage::VideoLoaded);
    let video_info = match video_processor::probe_video(&staged) {
        Ok(info) => {
            info!(
                "{}x{} video, {} fps, {} s, ~{} frames",
                info.width,
                info.height,
                display_opt(info.fps.map(|fps| format!("{:.2}", fps))),
                display_opt(info.duration_secs.map(|secs| format!("{:.1}", secs))),
                display_opt(info.frame_count),
            );
            Some(info)
        }
        Err(e) => {
            warn!("Could not read video metadata: {:#}", e);
            None
        }
    };

    // 2. Extract
    coach::check_cancelled(&config.cancel)?;
    enter(Stage::Extracting);
    let frames_dir = config
        .keep_frames
        .clone()
        .unwrap_or_else(|| scratch.path().join("frames"));
    let mut sampler = FrameSampler::new(config.stride, &frames_dir, config.jpeg_quality)?;

    let pb = progress_bar(video_info.and_then(|info| info.frame_count))?;
    let cancel = &config.cancel;
    video_processor::process_frames_stream(&staged, |index, frame| {
        coach::check_cancelled(cancel)?;
        sampler.accept(index, &frame)?;
        pb.inc(1);
        Ok(())
    })
    .context("Frame extraction failed")?;
    pb.finish_with_message(format!("Decoded {} frames", pb.position()));

    let sampled = sampler.finish();
    if sampled.frames.is_empty() {
        bail!("No frames were extracted from {:?}", config.input_file);
    }
    coach::check_cancelled(cancel)?;

    // 3. Analyze
    enter(Stage::Analyzing);
    let analysis_bar = ProgressBar::new(config.max_analyzed_frames.min(sampled.frames.len()) as u64);
    analysis_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Asking the coach [{bar:40.cyan/blue}] {pos}/{len} [{elapsed_precise}]")?
            .progress_chars("##-"),
    );
    analysis_bar.enable_steady_tick(Duration::from_millis(100));
    let feedback = coach::analyze_frames(
        &sampled.frames,
        analyzer,
        summarizer,
        config.max_analyzed_frames,
        cancel,
        |entry| {
            analysis_bar.inc(1);
            info!("Received feedback for {}", entry.frame);
        },
    )?;
    analysis_bar.finish_and_clear();

    let report = AnalysisReport {
        video: config
            .input_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        stride: config.stride,
        decoded_frames: sampled.decoded,
        extracted_frames: sampled.frames.len(),
        feedback,
    };

    if let Some(path) = &config.report_path {
        report.write_json(path)?;
    }

    enter(Stage::Done);
    if let Some(dir) = &config.keep_frames {
        info!("Extracted frames kept in {:?}", dir);
    }
    Ok(report)
}

fn progress_bar(total: Option<u64>) -> Result<ProgressBar> {
    let bar = match total {
        Some(count) if count > 0 => {
            let bar = ProgressBar::new(count);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} Extracting frames [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) [{elapsed_precise}<{eta}]")?
                    .progress_chars("##-"),
            );
            bar
        }
        _ => {
            warn!("Could not determine total frame count. Using spinner as fallback.");
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} Extracting frames... [{elapsed_precise}] {pos} frames decoded")?,
            );
            bar
        }
    };
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
}
