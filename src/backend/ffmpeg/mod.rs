//! Media backend driving ffmpeg/ffprobe as child processes.
//!
//! The reader decodes the source to packed rgb24 frames on stdout; the writer
//! feeds rgb24 frames into a second ffmpeg process that encodes the preview.
//! Both children are owned exclusively by their handle and reaped on drop.

pub mod discovery;
pub mod probe;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use self::discovery::get_ffmpeg_path;
use self::probe::probe_source;

use crate::backend::{
    BackendError, FourCc, Frame, FrameSink, FrameSource, MediaBackend, SourceInfo,
};
use crate::geometry::FrameSize;

fn ffmpeg_command() -> Result<Command, BackendError> {
    let path = get_ffmpeg_path()?;
    let mut cmd = Command::new(path);
    cmd.arg("-v").arg("error");
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    Ok(cmd)
}

/// FFmpeg encoder name for a preview codec identifier.
fn encoder_for(codec: FourCc) -> Result<&'static str, BackendError> {
    if codec == FourCc::MJPG {
        Ok("mjpeg")
    } else {
        Err(BackendError(format!("Unsupported output codec: {}", codec)))
    }
}

pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, BackendError> {
        if !path.exists() {
            return Err(BackendError(format!(
                "source does not exist: {}",
                path.display()
            )));
        }
        let info = probe_source(path)?;
        log::debug!(
            target: "vid_preview::ffmpeg",
            "open_source: path={}, size={}, fps={}, total_frames={}",
            path.display(),
            info.size,
            info.fps,
            info.total_frames
        );
        Ok(Box::new(RawFrameSource {
            path: path.to_path_buf(),
            info,
            decoder: None,
            position: 0,
            finished: false,
        }))
    }

    fn open_sink(
        &self,
        path: &Path,
        codec: FourCc,
        fps: f64,
        size: FrameSize,
    ) -> Result<Box<dyn FrameSink>, BackendError> {
        let encoder = encoder_for(codec)?;
        if size.width == 0 || size.height == 0 || fps <= 0.0 {
            return Err(BackendError(format!(
                "invalid sink parameters: size={}, fps={}",
                size, fps
            )));
        }

        let mut cmd = ffmpeg_command()?;
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &size.to_string()])
            .args(["-r", &fps.to_string()])
            .args(["-i", "pipe:0"])
            .args(["-c:v", encoder]);
        // MJPEG without a recognized extension needs an explicit container.
        if path.extension().is_none() {
            cmd.args(["-f", "avi"]);
        }
        cmd.arg("-y")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError(format!("Failed to spawn FFmpeg encoder: {}", e)))?;
        let stdin = child.stdin.take().ok_or_else(|| {
            let _ = child.kill();
            let _ = child.wait();
            BackendError("Failed to capture encoder stdin".to_string())
        })?;

        log::debug!(
            target: "vid_preview::ffmpeg",
            "open_sink: path={}, codec={}, fps={}, size={}",
            path.display(),
            codec,
            fps,
            size
        );
        Ok(Box::new(RawFrameSink {
            path: path.to_path_buf(),
            child,
            stdin: Some(stdin),
            frame_len: size.rgb24_len(),
            failed: false,
        }))
    }
}

struct DecodeStream {
    child: Child,
    stdout: ChildStdout,
}

/// Sequential rgb24 decoder. The ffmpeg child is spawned lazily on the first
/// read so sources rejected for invalid metadata never start a decode.
struct RawFrameSource {
    path: PathBuf,
    info: SourceInfo,
    decoder: Option<DecodeStream>,
    position: u64,
    finished: bool,
}

impl RawFrameSource {
    fn spawn_decoder(&mut self) -> Result<DecodeStream, BackendError> {
        let mut cmd = ffmpeg_command()?;
        cmd.arg("-i")
            .arg(&self.path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError(format!("Failed to spawn FFmpeg decoder: {}", e)))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            let _ = child.kill();
            let _ = child.wait();
            BackendError("Failed to capture decoder stdout".to_string())
        })?;
        Ok(DecodeStream { child, stdout })
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(mut decoder) = self.decoder.take() {
            let _ = decoder.child.kill();
            let _ = decoder.child.wait();
        }
    }
}

impl FrameSource for RawFrameSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }
        if self.decoder.is_none() {
            match self.spawn_decoder() {
                Ok(decoder) => self.decoder = Some(decoder),
                Err(e) => {
                    log::error!(
                        target: "vid_preview::ffmpeg",
                        "read_frame: decoder spawn failed for {}: {}",
                        self.path.display(),
                        e
                    );
                    self.finished = true;
                    return None;
                }
            }
        }

        let mut data = vec![0u8; self.info.size.rgb24_len()];
        let decoder = self.decoder.as_mut().expect("decoder spawned above");
        match decoder.stdout.read_exact(&mut data) {
            Ok(()) => {
                self.position += 1;
                Some(Frame::new(self.info.size, data))
            }
            Err(_) => {
                // EOF or a truncated trailing frame; either way the stream ends.
                self.finish();
                None
            }
        }
    }

    fn position(&self) -> u64 {
        self.position
    }
}

impl Drop for RawFrameSource {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Sequential rgb24 encoder. Dropping the sink closes the pipe and waits for
/// the encoder to flush, so frames written so far stay in the output file.
struct RawFrameSink {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    frame_len: usize,
    failed: bool,
}

impl FrameSink for RawFrameSink {
    fn write_frame(&mut self, frame: &Frame) {
        if self.failed {
            return;
        }
        if frame.data.len() != self.frame_len {
            log::error!(
                target: "vid_preview::ffmpeg",
                "write_frame: frame is {} bytes, sink expects {}",
                frame.data.len(),
                self.frame_len
            );
            self.failed = true;
            return;
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return;
        };
        if let Err(e) = stdin.write_all(&frame.data) {
            log::error!(
                target: "vid_preview::ffmpeg",
                "write_frame: encoder pipe for {} failed: {}",
                self.path.display(),
                e
            );
            self.failed = true;
        }
    }
}

impl Drop for RawFrameSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.wait();
    }
}
