//! Report Module
//!
//! Formats the coaching summaries for the terminal and optionally writes
//! the full results as JSON.

use crate::coach::FrameFeedback;
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub video: String,
    pub stride: u64,
    pub decoded_frames: u64,
    pub extracted_frames: usize,
    pub feedback: Vec<FrameFeedback>,
}

impl AnalysisReport {
    /// Text shown to the user: one block per analyzed frame.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Analysis Completed!\n");
        out.push_str("Suggestions for improvement:\n");
        for entry in &self.feedback {
            // Writing into a String cannot fail.
            let _ = write!(out, "\n--- {} ---\n{}\n", entry.frame, entry.summary.trim_end());
        }
        out
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent_dir) = path.parent() {
            if !parent_dir.as_os_str().is_empty() {
                fs::create_dir_all(parent_dir).context("Failed to create report directory")?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        info!("Wrote analysis report to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> AnalysisReport {
        AnalysisReport {
            video: "serve.mp4".into(),
            stride: 30,
            decoded_frames: 90,
            extracted_frames: 3,
            feedback: vec![FrameFeedback {
                frame: "frame_0.jpg".into(),
                index: 0,
                suggestion: "Toss higher.".into(),
                summary: "1. Toss higher\n2. Bend knees\n".into(),
            }],
        }
    }

    #[test]
    fn render_lists_each_summary_under_its_frame() {
        let text = report().render();
        assert!(text.starts_with("Analysis Completed!\nSuggestions for improvement:\n"));
        assert!(text.contains("--- frame_0.jpg ---\n1. Toss higher\n2. Bend knees\n"));
        assert_eq!(text.matches("--- ").count(), 1);
    }

    #[test]
    fn json_report_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        report().write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["extracted_frames"], 3);
        assert_eq!(value["feedback"][0]["frame"], "frame_0.jpg");
        assert_eq!(value["feedback"][0]["suggestion"], "Toss higher.");
    }
}
