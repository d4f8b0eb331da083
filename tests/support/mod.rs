#![allow(dead_code)]
//! Scripted in-memory media backend shared by integration test targets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use vid_preview::backend::{
    BackendError, FourCc, Frame, FrameSink, FrameSource, MediaBackend, SourceInfo,
};
use vid_preview::geometry::FrameSize;

/// Hands out per-frame decode permits so a test controls exactly when the
/// conversion loop advances.
pub struct StepGate {
    permits: Mutex<u64>,
    cond: Condvar,
}

impl StepGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            permits: Mutex::new(0),
            cond: Condvar::new(),
        })
    }

    pub fn allow(&self, n: u64) {
        let mut permits = self.permits.lock();
        *permits = permits.saturating_add(n);
        self.cond.notify_all();
    }

    pub fn allow_all(&self) {
        let mut permits = self.permits.lock();
        *permits = u64::MAX;
        self.cond.notify_all();
    }

    fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.cond.wait(&mut permits);
        }
        if *permits != u64::MAX {
            *permits -= 1;
        }
    }
}

/// Everything the backend observed: sinks opened and frames written.
#[derive(Default)]
pub struct BackendLog {
    pub sinks_opened: Vec<(PathBuf, FourCc, f64, FrameSize)>,
    pub frames_written: Vec<FrameSize>,
}

pub struct ScriptedBackend {
    source: Option<SourceInfo>,
    fail_sink: bool,
    gate: Option<Arc<StepGate>>,
    log: Arc<Mutex<BackendLog>>,
}

impl ScriptedBackend {
    pub fn with_source(width: u32, height: u32, fps: f64, total_frames: u64) -> Self {
        Self {
            source: Some(SourceInfo {
                fps,
                size: FrameSize::new(width, height),
                total_frames,
            }),
            fail_sink: false,
            gate: None,
            log: Arc::new(Mutex::new(BackendLog::default())),
        }
    }

    pub fn unreadable() -> Self {
        Self {
            source: None,
            fail_sink: false,
            gate: None,
            log: Arc::new(Mutex::new(BackendLog::default())),
        }
    }

    pub fn failing_sink(mut self) -> Self {
        self.fail_sink = true;
        self
    }

    pub fn gated(mut self, gate: Arc<StepGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Clone of the observation log; valid after the backend moves into a
    /// converter.
    pub fn log(&self) -> Arc<Mutex<BackendLog>> {
        Arc::clone(&self.log)
    }
}

impl MediaBackend for ScriptedBackend {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, BackendError> {
        let Some(info) = self.source else {
            return Err(BackendError(format!(
                "scripted source refuses to open: {}",
                path.display()
            )));
        };
        Ok(Box::new(ScriptedSource {
            info,
            position: 0,
            gate: self.gate.clone(),
        }))
    }

    fn open_sink(
        &self,
        path: &Path,
        codec: FourCc,
        fps: f64,
        size: FrameSize,
    ) -> Result<Box<dyn FrameSink>, BackendError> {
        if self.fail_sink {
            return Err(BackendError(format!(
                "scripted sink refuses to open: {}",
                path.display()
            )));
        }
        self.log
            .lock()
            .sinks_opened
            .push((path.to_path_buf(), codec, fps, size));
        Ok(Box::new(ScriptedSink {
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedSource {
    info: SourceInfo,
    position: u64,
    gate: Option<Arc<StepGate>>,
}

impl FrameSource for ScriptedSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if self.position >= self.info.total_frames {
            return None;
        }
        if let Some(gate) = self.gate.as_ref() {
            gate.acquire();
        }
        self.position += 1;
        Some(Frame::new(
            self.info.size,
            vec![7u8; self.info.size.rgb24_len()],
        ))
    }

    fn position(&self) -> u64 {
        self.position
    }
}

struct ScriptedSink {
    log: Arc<Mutex<BackendLog>>,
}

impl FrameSink for ScriptedSink {
    fn write_frame(&mut self, frame: &Frame) {
        self.log.lock().frames_written.push(frame.size);
    }
}
