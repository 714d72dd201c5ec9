//! Video Processing Module
//!
//! Handles probing and decoding of video files using the ffmpeg-next crate.
//! Frames are handed out one at a time together with their decode index.

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as ScalingContext, flag::Flags};
use ffmpeg::util::error::EAGAIN;
use ffmpeg::util::frame::video::Video;
use image::{ImageBuffer, Rgb};
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use log::{info, warn};

/// A decoded frame in packed RGB24.
pub type RgbFrame = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Metadata read from the container without decoding the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
    pub duration_secs: Option<f64>,
    /// Exact when the container stores it, otherwise estimated from
    /// duration and average frame rate.
    pub frame_count: Option<u64>,
}

/// Reads stream metadata for the best video stream of `path`.
pub fn probe_video(path: &Path) -> Result<VideoInfo> {
    ffmpeg::init().context("Failed to initialize FFmpeg")?;
    let ictx = input(path).context("Failed to open input file for probing")?;
    let stream = ictx
        .streams()
        .best(Type::Video)
        .ok_or_else(|| anyhow!("Could not find video stream in file"))?;

    let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .context("Failed to create decoder context")?
        .decoder()
        .video()
        .context("Failed to create video decoder")?;

    let frame_rate = stream.avg_frame_rate();
    let fps = if frame_rate.0 > 0 && frame_rate.1 > 0 {
        Some(frame_rate.0 as f64 / frame_rate.1 as f64)
    } else {
        None
    };

    // Duration is in AV_TIME_BASE units (microseconds)
    let duration = ictx.duration();
    let duration_secs = (duration > 0).then(|| duration as f64 / 1_000_000.0);

    let frame_count = match stream.frames() {
        n if n > 0 => Some(n as u64),
        _ => match (duration_secs, fps) {
            (Some(secs), Some(fps)) => Some((secs * fps).round() as u64),
            _ => None,
        },
    };

    Ok(VideoInfo {
        width: decoder.width(),
        height: decoder.height(),
        fps,
        duration_secs,
        frame_count,
    })
}

/// Decodes the video one frame at a time, passing `(index, frame)` to `on_frame`.
///
/// Indices start at zero and follow decode order. Decoding ends at end of
/// stream or at the first decode failure: a packet the decoder rejects is
/// followed by a flush so frames it already buffered are still delivered,
/// while a failed `receive_frame` ends decoding on the spot. Either way the
/// function returns `Ok` with what was delivered. An error from `on_frame`
/// stops decoding and is returned as is.
///
/// Returns the number of frames decoded.
pub fn process_frames_stream<F>(path: &Path, mut on_frame: F) -> Result<u64>
where
    F: FnMut(u64, RgbFrame) -> Result<()>,
{
    ffmpeg::init().context("Failed to initialize FFmpeg")?;

    let mut ictx = input(path).context("Failed to open input file")?;
    let input = ictx
        .streams()
        .best(Type::Video)
        .context("Could not find video stream")?;
    let video_stream_index = input.index();

    let context_decoder = ffmpeg::codec::context::Context::from_parameters(input.parameters())
        .context("Failed to create decoder context")?;
    let mut decoder = context_decoder.decoder().video()
        .context("Failed to create video decoder")?;

    let mut scaler = ScalingContext::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        Flags::BILINEAR,
    ).context("Failed to create scaler")?;

    let mut next_index: u64 = 0;
    // Ok(false) means the decoder failed and nothing more should be read.
    let mut receive_and_process_decoded_frames =
        |decoder: &mut ffmpeg::decoder::Video, next_index: &mut u64| -> Result<bool> {
            let mut decoded = Video::empty();
            loop {
                match decoder.receive_frame(&mut decoded) {
                    Ok(()) => {
                        let mut rgb_frame = Video::empty();
                        scaler.run(&decoded, &mut rgb_frame).context("Scaler failed")?;
                        let img = to_rgb_image(&rgb_frame)?;

                        on_frame(*next_index, img)?;
                        *next_index += 1;
                    }
                    Err(ffmpeg::Error::Eof) => return Ok(true),
                    Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => return Ok(true),
                    Err(e) => {
                        warn!("Decoder failed after {} frames ({}). Stopping.", *next_index, e);
                        return Ok(false);
                    }
                }
            }
        };

    let mut rejected = false;
    for (stream, packet) in ictx.packets() {
        if stream.index() != video_stream_index {
            continue;
        }
        if let Err(e) = decoder.send_packet(&packet) {
            warn!("Decoder rejected a packet after {} frames ({}). Stopping.", next_index, e);
            rejected = true;
            break;
        }
        if !receive_and_process_decoded_frames(&mut decoder, &mut next_index)? {
            return Ok(next_index);
        }
    }

    match decoder.send_eof() {
        Ok(()) => {
            receive_and_process_decoded_frames(&mut decoder, &mut next_index)?;
        }
        Err(e) if rejected => warn!("Could not flush decoder after rejected packet ({}).", e),
        Err(e) => return Err(e).context("Failed to flush decoder"),
    }

    info!("Finished decoding {} frames from video stream.", next_index);
    Ok(next_index)
}

/// Copies a scaled RGB24 frame into a tightly packed image buffer,
/// dropping the per-row padding FFmpeg may add.
fn to_rgb_image(rgb_frame: &Video) -> Result<RgbFrame> {
    let frame_data = rgb_frame.data(0);
    let width = rgb_frame.width() as usize;
    let height = rgb_frame.height() as usize;
    let stride = rgb_frame.stride(0) as usize;

    if stride == 0 {
        return Err(anyhow!("Invalid frame stride"));
    }

    let mut packed = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let start_index = y * stride;
        let end_index = start_index + (width * 3);
        if end_index > frame_data.len() {
            return Err(anyhow!("Frame data is smaller than expected"));
        }
        packed.extend_from_slice(&frame_data[start_index..end_index]);
    }

    ImageBuffer::from_vec(width as u32, height as u32, packed)
        .context("Failed to create image buffer from frame data")
}
