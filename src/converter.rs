//! Conversion supervisor. Owns a long-lived worker thread, schedules one
//! conversion task onto it at a time, and relays cancellation into the
//! running task.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::backend::MediaBackend;
use crate::error::ConvertError;
use crate::task::{AbortHandle, ConvertRequest, ConvertTask, TaskEvent};

/// Caller-side view of a running conversion: the event stream plus the
/// cancellation trigger. Dropping the handle does not cancel the task.
pub struct ConversionHandle {
    events: Receiver<TaskEvent>,
    abort: AbortHandle,
}

impl ConversionHandle {
    /// Requests cancellation. Forwarded straight to the running task,
    /// bypassing the worker queue, so a busy decode loop still observes it
    /// on its next frame boundary. No effect after the terminal event.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// Event stream for this conversion. Progress events arrive in
    /// non-decreasing order, followed by exactly one `Finished`.
    pub fn events(&self) -> &Receiver<TaskEvent> {
        &self.events
    }

    /// Drains events until the terminal result arrives and returns it.
    pub fn wait(self) -> Result<(), ConvertError> {
        for event in self.events.iter() {
            if let TaskEvent::Finished(result) = event {
                return result;
            }
        }
        // The worker vanished without a terminal event (it panicked or the
        // task was never scheduled); surface that as an aborted conversion.
        Err(ConvertError::Aborted)
    }
}

/// Owns the worker thread. One converter runs at most one task at a time;
/// the thread is reused across sequential conversions and joined on drop.
pub struct Converter {
    jobs: Option<Sender<ConvertTask>>,
    worker: Option<JoinHandle<()>>,
    active: Mutex<Option<AbortHandle>>,
}

impl Converter {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        let (jobs, jobs_rx) = mpsc::channel::<ConvertTask>();
        let worker = std::thread::spawn(move || {
            for task in jobs_rx {
                task.run(backend.as_ref());
            }
            log::debug!(target: "vid_preview::converter", "worker thread exiting");
        });
        Self {
            jobs: Some(jobs),
            worker: Some(worker),
            active: Mutex::new(None),
        }
    }

    /// Schedules a conversion on the worker thread and returns immediately.
    /// Rejected with `ConvertError::Busy` while a previous task has not yet
    /// produced its terminal event.
    pub fn start_conversion(
        &self,
        request: ConvertRequest,
    ) -> Result<ConversionHandle, ConvertError> {
        let mut active = self.active.lock();
        if self.worker_died() {
            // A panicking backend unwound the worker; its task can never
            // report a terminal event and must not keep the slot occupied.
            log::warn!(
                target: "vid_preview::converter",
                "start_conversion: worker thread died, retiring its task"
            );
            *active = None;
        }
        if let Some(handle) = active.as_ref() {
            if !handle.is_finished() {
                return Err(ConvertError::Busy);
            }
        }

        log::info!(
            target: "vid_preview::converter",
            "start_conversion: source={}",
            request.source.display()
        );
        let (events_tx, events) = mpsc::channel();
        let task = ConvertTask::new(request, events_tx);
        let abort = task.abort_handle();
        *active = Some(abort.clone());

        if let Some(jobs) = self.jobs.as_ref() {
            if jobs.send(task).is_err() {
                // Worker gone; the dropped task disconnects the event channel
                // and the handle reports an aborted conversion. The task never
                // stores `finished`, so release the slot here.
                log::error!(
                    target: "vid_preview::converter",
                    "start_conversion: worker thread is not running"
                );
                *active = None;
            }
        }
        Ok(ConversionHandle { events, abort })
    }

    /// True while a task is scheduled or running and has not yet produced
    /// its terminal event.
    pub fn is_converting(&self) -> bool {
        !self.worker_died()
            && self
                .active
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    fn worker_died(&self) -> bool {
        self.worker.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

impl Drop for Converter {
    fn drop(&mut self) {
        if let Some(handle) = self.active.lock().take() {
            if !handle.is_finished() {
                log::info!(
                    target: "vid_preview::converter",
                    "drop: aborting live conversion"
                );
                handle.abort();
            }
        }
        // Closing the queue lets the worker exit once the current task ends.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, FourCc, FrameSink, FrameSource};
    use crate::geometry::FrameSize;
    use std::path::Path;

    /// Backend whose sources never open. Enough to exercise scheduling and
    /// lifecycle; full conversion behavior is covered by integration tests.
    struct UnreadableBackend;

    impl MediaBackend for UnreadableBackend {
        fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, BackendError> {
            Err(BackendError(format!("no decoder for {}", path.display())))
        }

        fn open_sink(
            &self,
            _path: &Path,
            _codec: FourCc,
            _fps: f64,
            _size: FrameSize,
        ) -> Result<Box<dyn FrameSink>, BackendError> {
            Err(BackendError("unused".into()))
        }
    }

    fn request() -> ConvertRequest {
        ConvertRequest::new("in.mp4", "out.avi", FrameSize::new(720, 480))
    }

    #[test]
    fn failed_open_surfaces_source_unreadable() {
        let converter = Converter::new(Arc::new(UnreadableBackend));
        let handle = converter.start_conversion(request()).expect("start");
        match handle.wait() {
            Err(ConvertError::SourceUnreadable { path, .. }) => assert_eq!(path, "in.mp4"),
            other => panic!("expected SourceUnreadable, got {:?}", other),
        }
    }

    #[test]
    fn worker_thread_is_reused_for_sequential_conversions() {
        let converter = Converter::new(Arc::new(UnreadableBackend));
        for _ in 0..3 {
            let handle = converter.start_conversion(request()).expect("start");
            assert!(handle.wait().is_err());
        }
    }

    #[test]
    fn is_converting_clears_after_terminal_event() {
        let converter = Converter::new(Arc::new(UnreadableBackend));
        let handle = converter.start_conversion(request()).expect("start");
        handle.wait().unwrap_err();
        assert!(!converter.is_converting());
    }

    /// Backend that takes the worker thread down with it.
    struct PanickingBackend;

    impl MediaBackend for PanickingBackend {
        fn open_source(&self, _path: &Path) -> Result<Box<dyn FrameSource>, BackendError> {
            panic!("decoder crashed");
        }

        fn open_sink(
            &self,
            _path: &Path,
            _codec: FourCc,
            _fps: f64,
            _size: FrameSize,
        ) -> Result<Box<dyn FrameSink>, BackendError> {
            Err(BackendError("unused".into()))
        }
    }

    #[test]
    fn worker_panic_does_not_leave_the_converter_busy() {
        let converter = Converter::new(Arc::new(PanickingBackend));
        let handle = converter.start_conversion(request()).expect("start");
        assert_eq!(handle.wait(), Err(ConvertError::Aborted));

        // The worker may still be unwinding when wait() returns; once it is
        // gone, starts must be accepted again rather than rejected as Busy.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            match converter.start_conversion(request()) {
                Ok(handle) => {
                    assert_eq!(handle.wait(), Err(ConvertError::Aborted));
                    break;
                }
                Err(ConvertError::Busy) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(other) => panic!("expected the converter to recover, got {:?}", other),
            }
        }
        assert!(!converter.is_converting());
    }
}
