//! One-shot video conversion task: decode, resize, re-encode, with progress
//! events and cooperative cancellation.
//!
//! A task runs exactly once. Create a new instance for each conversion.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use parking_lot::Mutex;

use crate::backend::{FourCc, MediaBackend};
use crate::error::ConvertError;
use crate::geometry::FrameSize;

/// Immutable description of one conversion job. Consumed by the task.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub source: PathBuf,
    pub dest: PathBuf,
    /// Maximum output dimensions; the preview is scaled to fit inside while
    /// preserving the source aspect ratio.
    pub bounds: FrameSize,
}

impl ConvertRequest {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>, bounds: FrameSize) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            bounds,
        }
    }
}

/// Event emitted by a running task. Exactly one `Finished` per task, always
/// strictly after the last `Progress`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskEvent {
    /// Completion percentage in 0..=100, derived from the source position.
    Progress(u8),
    Finished(Result<(), ConvertError>),
}

#[derive(Debug, Default)]
struct TaskState {
    /// Written by abort() from any thread, read by the decode loop once per
    /// frame. The loop observes a set flag on its next iteration boundary.
    aborted: Mutex<bool>,
    finished: AtomicBool,
}

/// Cancellation handle for a task. Cloneable and callable from any thread;
/// abort() returns immediately without waiting for the task to stop.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    state: Arc<TaskState>,
}

impl AbortHandle {
    pub fn abort(&self) {
        *self.state.aborted.lock() = true;
    }

    /// True once the task has produced its terminal event. Aborting after
    /// that has no effect.
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::Acquire)
    }
}

pub struct ConvertTask {
    request: ConvertRequest,
    state: Arc<TaskState>,
    events: Sender<TaskEvent>,
}

impl ConvertTask {
    pub fn new(request: ConvertRequest, events: Sender<TaskEvent>) -> Self {
        Self {
            request,
            state: Arc::new(TaskState::default()),
            events,
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Performs the conversion, emitting progress events and exactly one
    /// terminal event. Runs synchronously on the calling thread; the
    /// supervisor schedules this onto its worker thread.
    ///
    /// On abort or mid-stream failure the destination file is left on disk
    /// with the frames written so far; nothing cleans up partial output.
    pub fn run(self, backend: &dyn MediaBackend) {
        let result = self.convert(backend);
        match &result {
            Ok(()) => log::info!(
                target: "vid_preview::task",
                "conversion complete: {}",
                self.request.dest.display()
            ),
            Err(e) => log::warn!(
                target: "vid_preview::task",
                "conversion stopped: {}",
                e
            ),
        }
        self.state.finished.store(true, Ordering::Release);
        let _ = self.events.send(TaskEvent::Finished(result));
    }

    fn convert(&self, backend: &dyn MediaBackend) -> Result<(), ConvertError> {
        let source_str = self.request.source.to_string_lossy().to_string();
        let dest_str = self.request.dest.to_string_lossy().to_string();
        log::info!(
            target: "vid_preview::task",
            "convert: source={}, dest={}, bounds={}",
            source_str,
            dest_str,
            self.request.bounds
        );

        let mut source = backend
            .open_source(&self.request.source)
            .map_err(|e| ConvertError::source_unreadable(&source_str, e.to_string()))?;

        let info = source.info();
        if !info.is_valid() {
            return Err(ConvertError::InvalidMetadata { path: source_str });
        }

        let target = info.size.scaled_to_fit(self.request.bounds);
        log::debug!(
            target: "vid_preview::task",
            "convert: source_size={}, target_size={}, fps={}, total_frames={}",
            info.size,
            target,
            info.fps,
            info.total_frames
        );

        let mut sink = backend
            .open_sink(&self.request.dest, FourCc::MJPG, info.fps, target)
            .map_err(|e| ConvertError::destination_unopenable(&dest_str, e.to_string()))?;

        while let Some(frame) = source.read_frame() {
            let resized = backend.resize(&frame, target);
            sink.write_frame(&resized);

            let percent = progress_percent(source.position(), info.total_frames);
            let _ = self.events.send(TaskEvent::Progress(percent));

            // On abort the destination keeps the frames written so far; no
            // partial-output cleanup is performed.
            if *self.state.aborted.lock() {
                return Err(ConvertError::Aborted);
            }
        }

        Ok(())
    }
}

/// Percentage of frames consumed, rounded toward zero and clamped to 100.
/// The backend position is otherwise taken as-is; a position past the
/// reported frame count (estimated counts can undershoot) reads as 100.
fn progress_percent(position: u64, total_frames: u64) -> u8 {
    (position as f64 / total_frames as f64 * 100.0).min(100.0) as u8
}
