//! Video Ingestion
//!
//! Validates the input video and stages a private copy for the run.

use anyhow::{bail, Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

/// Accepts `mp4`, `avi` and `mov`, in any letter case.
pub fn check_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => bail!(
            "Unsupported video file {:?}; expected one of: {}",
            path,
            SUPPORTED_EXTENSIONS.join(", ")
        ),
    }
}

/// Copies `source` into `scratch_dir` as `temp_<file name>` and returns the new path.
pub fn stage_video(source: &Path, scratch_dir: &Path) -> Result<PathBuf> {
    check_extension(source)?;
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Input path {:?} has no usable file name", source))?;

    let staged = scratch_dir.join(format!("temp_{}", file_name));
    let bytes = fs::copy(source, &staged)
        .with_context(|| format!("Failed to stage {:?} into {:?}", source, scratch_dir))?;
    info!("Staged {} bytes of video at {:?}", bytes, staged);
    Ok(staged)
}
