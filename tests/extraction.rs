//! Runs real clips through the FFmpeg decoder and the full `run_with`
//! pipeline. Clips are written as uncompressed YUV4MPEG2, which FFmpeg
//! recognises by content whatever the file extension.

use anyhow::{bail, Result};
use proplay::chat::{ChatMessage, ChatModel};
use proplay::coach::{CoachingAnalyzer, Summarizer};
use proplay::video_processor;
use proplay::{run_with, Config};
use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;

const WIDTH: usize = 32;
const HEIGHT: usize = 18;

/// Writes `frames` grey frames at 30 fps, optionally followed by a cut-off one.
fn write_clip(path: &Path, frames: u64, cut_off_tail: bool) {
    let mut bytes = format!("YUV4MPEG2 W{} H{} F30:1 Ip A1:1 C420mpeg2\n", WIDTH, HEIGHT).into_bytes();
    for index in 0..frames {
        bytes.extend_from_slice(b"FRAME\n");
        bytes.extend(std::iter::repeat((index * 2) as u8).take(WIDTH * HEIGHT));
        bytes.extend(std::iter::repeat(128u8).take(WIDTH * HEIGHT / 2));
    }
    if cut_off_tail {
        bytes.extend_from_slice(b"FRAME\n");
        bytes.extend(std::iter::repeat(0u8).take(WIDTH));
    }
    fs::write(path, bytes).unwrap();
}

struct CoachStub {
    calls: Cell<usize>,
}

impl CoachStub {
    fn new() -> Self {
        CoachStub { calls: Cell::new(0) }
    }
}

impl ChatModel for CoachStub {
    fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        Ok(format!("1. point from call {}", self.calls.get()))
    }
}

struct Unreachable;

impl ChatModel for Unreachable {
    fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("no request expected")
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().next().is_none()
}

fn sorted_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn decoder_hands_out_frames_in_index_order() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("drill.mov");
    write_clip(&clip, 12, false);

    let mut seen = Vec::new();
    let decoded = video_processor::process_frames_stream(&clip, |index, frame| {
        assert_eq!(frame.dimensions(), (WIDTH as u32, HEIGHT as u32));
        seen.push(index);
        Ok(())
    })
    .unwrap();

    assert_eq!(decoded, 12);
    assert_eq!(seen, (0..12).collect::<Vec<u64>>());
}

#[test]
fn cut_off_final_frame_ends_decoding_with_earlier_frames_intact() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("drill.avi");
    write_clip(&clip, 10, true);

    let decoded = video_processor::process_frames_stream(&clip, |_, _| Ok(())).unwrap();
    assert_eq!(decoded, 10);
}

#[test]
fn callback_error_stops_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("drill.mp4");
    write_clip(&clip, 20, false);

    let mut calls = 0;
    let result = video_processor::process_frames_stream(&clip, |index, _| {
        calls += 1;
        if index == 5 {
            bail!("stop here");
        }
        Ok(())
    });

    assert!(result.is_err());
    assert_eq!(calls, 6);
}

#[test]
fn probe_reads_clip_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("drill.mp4");
    write_clip(&clip, 30, false);

    let info = video_processor::probe_video(&clip).unwrap();
    assert_eq!((info.width, info.height), (WIDTH as u32, HEIGHT as u32));
    let fps = info.fps.unwrap();
    assert!((fps - 30.0).abs() < 0.01, "fps {}", fps);
}

#[test]
fn three_second_clip_at_stride_thirty_yields_three_frames_and_one_summary() {
    let inputs = tempfile::tempdir().unwrap();
    let scratch_root = tempfile::tempdir().unwrap();
    let kept = inputs.path().join("kept");
    let clip = inputs.path().join("rally.mp4");
    write_clip(&clip, 90, false);

    let mut config = Config::new(&clip);
    config.stride = 30;
    config.keep_frames = Some(kept.clone());
    config.scratch_root = Some(scratch_root.path().to_path_buf());

    let model = CoachStub::new();
    let report = run_with(&config, &CoachingAnalyzer::new(&model), &Summarizer::new(&model)).unwrap();

    assert_eq!(report.decoded_frames, 90);
    assert_eq!(report.extracted_frames, 3);
    assert_eq!(sorted_names(&kept), vec!["frame_0.jpg", "frame_30.jpg", "frame_60.jpg"]);
    assert_eq!(report.feedback.len(), 1);
    assert_eq!(report.feedback[0].frame, "frame_0.jpg");
    assert_eq!(model.calls.get(), 2);
    assert_eq!(report.render().matches("--- ").count(), 1);
    assert!(is_empty_dir(scratch_root.path()));
}

#[test]
fn scratch_frames_are_removed_after_a_successful_run() {
    let inputs = tempfile::tempdir().unwrap();
    let scratch_root = tempfile::tempdir().unwrap();
    let clip = inputs.path().join("rally.mov");
    write_clip(&clip, 15, false);

    let mut config = Config::new(&clip);
    config.scratch_root = Some(scratch_root.path().to_path_buf());

    let model = CoachStub::new();
    let report = run_with(&config, &CoachingAnalyzer::new(&model), &Summarizer::new(&model)).unwrap();

    assert_eq!(report.extracted_frames, 15);
    assert!(is_empty_dir(scratch_root.path()));
    assert!(clip.exists());
}

#[test]
fn scratch_is_removed_when_the_video_cannot_be_decoded() {
    let inputs = tempfile::tempdir().unwrap();
    let scratch_root = tempfile::tempdir().unwrap();
    let clip = inputs.path().join("broken.mp4");
    fs::write(&clip, b"definitely not a video").unwrap();

    let mut config = Config::new(&clip);
    config.scratch_root = Some(scratch_root.path().to_path_buf());

    let result = run_with(&config, &CoachingAnalyzer::new(Unreachable), &Summarizer::new(Unreachable));

    assert!(result.is_err());
    assert!(is_empty_dir(scratch_root.path()));
}

#[test]
fn scratch_is_removed_when_the_run_is_cancelled() {
    let inputs = tempfile::tempdir().unwrap();
    let scratch_root = tempfile::tempdir().unwrap();
    let clip = inputs.path().join("rally.mp4");
    write_clip(&clip, 30, false);

    let mut config = Config::new(&clip);
    config.scratch_root = Some(scratch_root.path().to_path_buf());
    config.cancel.store(true, Ordering::SeqCst);

    let model = CoachStub::new();
    let err = run_with(&config, &CoachingAnalyzer::new(&model), &Summarizer::new(&model)).unwrap_err();

    assert!(format!("{:#}", err).contains("cancelled"));
    assert_eq!(model.calls.get(), 0);
    assert!(is_empty_dir(scratch_root.path()));
}
