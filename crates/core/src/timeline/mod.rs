//! Frame scheduling capabilities the render loop is driven by.

use std::time::{Duration, Instant};

/// Identifies one requested display refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

/// Periodic callback synced to display refresh. The host invokes
/// `VisualizationEngine::on_frame` with each handle once it is due.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;

    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Scheduler for hosts that own their own refresh callback: the host takes
/// the pending handle whenever its callback fires.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    pending: Option<FrameHandle>,
    cancelled: u64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending
    }

    /// Removes and returns the pending handle.
    pub fn take_pending(&mut self) -> Option<FrameHandle> {
        self.pending.take()
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        self.next_id += 1;
        let handle = FrameHandle(self.next_id);
        self.pending = Some(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
            self.cancelled += 1;
        }
    }
}

/// Fixed-rate pacing for hosts without a vsync source.
#[derive(Debug)]
pub struct PacedScheduler {
    interval: Duration,
    next_id: u64,
    pending: Option<(FrameHandle, Instant)>,
    last_due: Option<Instant>,
}

impl PacedScheduler {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            next_id: 0,
            pending: None,
            last_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending.map(|(handle, _)| handle)
    }

    /// Returns the pending handle if its deadline has passed by `now`.
    pub fn poll_due(&mut self, now: Instant) -> Option<FrameHandle> {
        match self.pending {
            Some((handle, due)) if due <= now => {
                self.pending = None;
                self.last_due = Some(due);
                Some(handle)
            }
            _ => None,
        }
    }

    /// Sleeps until the pending frame is due. Returns `None` straight away
    /// when nothing is pending.
    pub fn wait_due(&mut self) -> Option<FrameHandle> {
        let (_, due) = self.pending?;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
        self.poll_due(Instant::now())
    }
}

impl FrameScheduler for PacedScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        self.next_id += 1;
        let handle = FrameHandle(self.next_id);
        let now = Instant::now();
        let due = self
            .last_due
            .map(|last| (last + self.interval).max(now))
            .unwrap_or(now);
        self.pending = Some((handle, due));
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending.map(|(pending, _)| pending) == Some(handle) {
            self.pending = None;
        }
    }
}
