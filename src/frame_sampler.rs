//! Frame Sampling Module
//!
//! Receives decoded frames in order and materializes every `stride`-th one
//! as a JPEG file named after its decode index.

use crate::video_processor::RgbFrame;
use anyhow::{bail, Context, Result};
use image::ImageOutputFormat;
use log::{debug, info};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// A frame that was written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledFrame {
    /// Position of the frame in decode order.
    pub index: u64,
    pub path: PathBuf,
}

impl SampledFrame {
    pub fn file_name(&self) -> String {
        frame_file_name(self.index)
    }
}

/// What the sampler saw once the decoder is done.
#[derive(Debug)]
pub struct SampleSummary {
    pub decoded: u64,
    pub frames: Vec<SampledFrame>,
}

/// File name used for the frame decoded at `index`.
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{}.jpg", index)
}

pub fn is_sampled(index: u64, stride: u64) -> bool {
    stride != 0 && index % stride == 0
}

/// Number of files a stream of `total` frames produces: `ceil(total / stride)`.
pub fn expected_count(total: u64, stride: u64) -> u64 {
    if stride == 0 {
        return 0;
    }
    total.div_ceil(stride)
}

/// Writes every `stride`-th frame it is given to `output_dir`.
pub struct FrameSampler {
    stride: u64,
    output_dir: PathBuf,
    jpeg_quality: u8,
    last_index: Option<u64>,
    decoded: u64,
    frames: Vec<SampledFrame>,
}

impl FrameSampler {
    /// Creates the sampler and its output directory.
    pub fn new(stride: u64, output_dir: &Path, jpeg_quality: u8) -> Result<Self> {
        if stride == 0 {
            bail!("Frame stride must be at least 1");
        }
        if !(1..=100).contains(&jpeg_quality) {
            bail!("JPEG quality must be between 1 and 100, got {}", jpeg_quality);
        }
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create frames directory {:?}", output_dir))?;

        Ok(FrameSampler {
            stride,
            output_dir: output_dir.to_path_buf(),
            jpeg_quality,
            last_index: None,
            decoded: 0,
            frames: Vec::new(),
        })
    }

    /// Offers one decoded frame. Returns the written frame when `index` falls
    /// on the stride, `None` otherwise.
    ///
    /// Indices must be strictly increasing.
    pub fn accept(&mut self, index: u64, frame: &RgbFrame) -> Result<Option<&SampledFrame>> {
        if let Some(last) = self.last_index {
            if index <= last {
                bail!("Frame index {} arrived after {}; decode order must increase", index, last);
            }
        }
        self.last_index = Some(index);
        self.decoded += 1;

        if !is_sampled(index, self.stride) {
            return Ok(None);
        }

        let path = self.output_dir.join(frame_file_name(index));
        write_jpeg(frame, &path, self.jpeg_quality)?;
        debug!("Wrote frame {} to {:?}", index, path);

        self.frames.push(SampledFrame { index, path });
        Ok(self.frames.last())
    }

    pub fn finish(self) -> SampleSummary {
        info!(
            "Frame sampling complete. Decoded {}, kept {} (stride {}).",
            self.decoded,
            self.frames.len(),
            self.stride
        );
        SampleSummary {
            decoded: self.decoded,
            frames: self.frames,
        }
    }
}

fn write_jpeg(frame: &RgbFrame, path: &Path, quality: u8) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create frame file {:?}", path))?;
    let mut writer = BufWriter::new(file);
    frame
        .write_to(&mut writer, ImageOutputFormat::Jpeg(quality))
        .with_context(|| format!("Failed to encode frame to {:?}", path))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write frame to {:?}", path))?;
    Ok(())
}
