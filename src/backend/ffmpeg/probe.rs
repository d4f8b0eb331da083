//! FFprobe-based stream property extraction.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use super::discovery::get_ffprobe_path;
use crate::backend::{BackendError, SourceInfo};
use crate::geometry::FrameSize;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 2 {
        return None;
    }
    let num: f64 = parts[0].trim().parse().ok()?;
    let den: f64 = parts[1].trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Parse ffprobe JSON output into SourceInfo. Missing properties come back as
/// zero; the conversion task rejects those before any decode starts.
pub fn parse_probe_json(json: &str) -> Result<SourceInfo, BackendError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| BackendError(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let video_stream = output.streams.as_ref().and_then(|streams| {
        streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    });
    let width = video_stream.and_then(|s| s.width).unwrap_or(0);
    let height = video_stream.and_then(|s| s.height).unwrap_or(0);
    let fps = video_stream
        .and_then(|s| s.r_frame_rate.as_deref())
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    // Containers that track a frame count report nb_frames; otherwise derive
    // it from the format duration.
    let total_frames = video_stream
        .and_then(|s| s.nb_frames.as_ref())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or_else(|| {
            let duration = output
                .format
                .as_ref()
                .and_then(|f| f.duration.as_ref())
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0);
            (duration * fps).round() as u64
        });

    Ok(SourceInfo {
        fps,
        size: FrameSize::new(width, height),
        total_frames,
    })
}

/// Run ffprobe on a video file and return its stream properties.
pub fn probe_source(path: &Path) -> Result<SourceInfo, BackendError> {
    let ffprobe = get_ffprobe_path()?;
    let path_str = path.to_string_lossy();

    log::debug!(
        target: "vid_preview::ffmpeg::probe",
        "probe_source: path={}",
        path_str
    );

    let output = Command::new(&ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            &path_str,
        ])
        .output()
        .map_err(|e| BackendError(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BackendError(format!("ffprobe failed: {}", stderr.trim())));
    }

    let json = String::from_utf8(output.stdout)
        .map_err(|_| BackendError("ffprobe output was not valid UTF-8".to_string()))?;

    parse_probe_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_probe_json_extracts_stream_properties() {
        let json = r#"{
            "format": { "duration": "30.5" },
            "streams": [
                {
                    "codec_type": "video",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "30/1",
                    "nb_frames": "915"
                }
            ]
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.size, FrameSize::new(1920, 1080));
        assert!((info.fps - 30.0).abs() < 0.01);
        assert_eq!(info.total_frames, 915);
        assert!(info.is_valid());
    }

    #[test]
    fn parse_probe_json_derives_frame_count_from_duration() {
        let json = r#"{
            "format": { "duration": "10.0" },
            "streams": [
                {
                    "codec_type": "video",
                    "width": 640,
                    "height": 480,
                    "r_frame_rate": "24/1"
                }
            ]
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.total_frames, 240);
    }

    #[test]
    fn parse_frame_rate_rational() {
        let fps = parse_frame_rate("24000/1001").unwrap();
        assert!((fps - 23.976).abs() < 0.001);
    }

    #[test]
    fn parse_frame_rate_rejects_zero_denominator() {
        assert_eq!(parse_frame_rate("30/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn parse_probe_json_handles_missing_video_stream() {
        let json = r#"{
            "format": { "duration": "10.0" },
            "streams": [{"codec_type": "audio"}]
        }"#;
        let info = parse_probe_json(json).unwrap();
        assert_eq!(info.size, FrameSize::new(0, 0));
        assert_eq!(info.fps, 0.0);
        assert!(!info.is_valid());
    }

    #[test]
    fn parse_probe_json_handles_empty_output() {
        let info = parse_probe_json(r#"{"format": {}, "streams": []}"#).unwrap();
        assert_eq!(info.total_frames, 0);
        assert!(!info.is_valid());
    }
}
