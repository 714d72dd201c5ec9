//! Coaching Module
//!
//! Sends sampled frames to the vision model for feedback and condenses each
//! suggestion into a short summary. Both requests are independent: nothing
//! from the first conversation is carried into the second.

use crate::chat::{ChatMessage, ChatModel, ContentPart, ImageDetail, ImageUrl, LlmConfig, OpenAiChat};
use crate::frame_encoder;
use crate::frame_sampler::SampledFrame;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

pub const COACH_PERSONA: &str =
    "You are a sports coach. Analyze the frame from a sports video provided in the description below.";
pub const COACH_INSTRUCTION: &str =
    "Provide actionable suggestions for the player to improve their game:";
pub const SUMMARY_INSTRUCTION: &str = "summarize in 5 points ";

/// Feedback gathered for one analyzed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameFeedback {
    pub frame: String,
    pub index: u64,
    pub suggestion: String,
    pub summary: String,
}

/// Asks the model for coaching suggestions on a single frame.
pub struct CoachingAnalyzer<M> {
    model: M,
    detail: ImageDetail,
}

impl<M: ChatModel> CoachingAnalyzer<M> {
    pub fn new(model: M) -> Self {
        CoachingAnalyzer {
            model,
            detail: ImageDetail::default(),
        }
    }

    pub fn with_detail(mut self, detail: ImageDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Builds the two-message request for a base64-encoded JPEG.
    pub fn build_messages(&self, image_base64: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(COACH_PERSONA),
            ChatMessage::user_parts(vec![
                ContentPart::Text {
                    text: COACH_INSTRUCTION.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: frame_encoder::jpeg_data_uri(image_base64),
                        detail: self.detail,
                    },
                },
            ]),
        ]
    }

    pub fn analyze(&self, image_base64: &str) -> Result<String> {
        self.model
            .complete(&self.build_messages(image_base64))
            .context("Coaching analysis request failed")
    }
}

impl CoachingAnalyzer<OpenAiChat> {
    pub fn from_config(config: LlmConfig) -> Result<Self> {
        Ok(Self::new(OpenAiChat::new(config)?))
    }
}

/// Condenses a suggestion into a 5-point summary.
pub struct Summarizer<M> {
    model: M,
}

impl<M: ChatModel> Summarizer<M> {
    pub fn new(model: M) -> Self {
        Summarizer { model }
    }

    /// The prompt sent for `suggestion`, labelled with the frame it came from.
    pub fn prompt(label: &str, suggestion: &str) -> String {
        format!("{}Frame {}: {}", SUMMARY_INSTRUCTION, label, suggestion)
    }

    pub fn summarize(&self, label: &str, suggestion: &str) -> Result<String> {
        let messages = [ChatMessage::user(Self::prompt(label, suggestion))];
        self.model
            .complete(&messages)
            .with_context(|| format!("Summary request for {} failed", label))
    }
}

impl Summarizer<OpenAiChat> {
    pub fn from_config(config: LlmConfig) -> Result<Self> {
        Ok(Self::new(OpenAiChat::new(config)?))
    }
}

/// Runs analysis then summarization for the first `limit` frames, in order.
///
/// `cancel` is checked before every request; once set the loop stops with an
/// error and no further requests are sent.
pub fn analyze_frames<M: ChatModel>(
    frames: &[SampledFrame],
    analyzer: &CoachingAnalyzer<M>,
    summarizer: &Summarizer<M>,
    limit: usize,
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(&FrameFeedback),
) -> Result<Vec<FrameFeedback>> {
    if limit == 0 {
        bail!("At least one frame must be selected for analysis");
    }

    let selected = &frames[..frames.len().min(limit)];
    info!("Analyzing {} of {} extracted frames.", selected.len(), frames.len());

    let mut feedback = Vec::with_capacity(selected.len());
    for frame in selected {
        let label = frame.file_name();

        check_cancelled(cancel)?;
        let encoded = frame_encoder::encode_file(&frame.path)?;
        debug!("Encoded {} ({} base64 chars)", label, encoded.len());
        let suggestion = analyzer.analyze(&encoded)
            .with_context(|| format!("Failed to analyze {}", label))?;

        check_cancelled(cancel)?;
        let summary = summarizer.summarize(&label, &suggestion)?;

        let entry = FrameFeedback {
            frame: label,
            index: frame.index,
            suggestion,
            summary,
        };
        on_progress(&entry);
        feedback.push(entry);
    }

    Ok(feedback)
}

/// Fails once `cancel` has been set.
pub fn check_cancelled(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        bail!("Run cancelled");
    }
    Ok(())
}
