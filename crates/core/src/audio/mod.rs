//! Audio sources the analyzer can be bound to.
//!
//! Capture and playback run on threads the render loop does not control, so
//! every source hands out samples through a non-blocking snapshot read.

#[cfg(feature = "capture")]
mod capture;

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, TryLockError,
    },
    time::{Duration, Instant},
};

use ringbuf::{traits::*, HeapRb};

#[cfg(feature = "capture")]
pub use capture::CaptureSource;

/// Live capture or decoded playback stream that can feed the analyzer.
pub trait AudioSource {
    /// Sample rate of the (mono) stream in Hz.
    fn sample_rate(&self) -> u32;

    /// Copies the newest samples into the tail of `window`, zero filling the
    /// head when fewer samples exist. Returns how many samples were copied,
    /// or 0 when nothing new arrived since the previous read.
    fn read_latest(&mut self, window: &mut [f32]) -> usize;

    /// Stops the stream and frees the device or buffer behind it. Calling it
    /// again is a no-op.
    fn release(&mut self);
}

/// Owned handle to the single bound source.
pub type AudioSourceHandle = Box<dyn AudioSource>;

/// Mono samples produced by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Shared circular buffer written by an audio thread and read by the
/// analyzer.
#[derive(Clone)]
pub struct SampleTap {
    ring: Arc<Mutex<HeapRb<f32>>>,
    written: Arc<AtomicU64>,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(HeapRb::<f32>::new(capacity.max(1)))),
            written: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Appends samples, overwriting the oldest ones once the buffer is full.
    pub fn push(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let mut ring = self.lock();
        for &sample in samples {
            if ring.is_full() {
                let _ = ring.try_pop();
            }
            let _ = ring.try_push(sample);
        }
        self.written
            .fetch_add(samples.len() as u64, Ordering::Release);
    }

    /// Total number of samples pushed since creation.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Snapshot of the newest samples into the tail of `window`.
    ///
    /// Returns `None` instead of waiting when the writer holds the buffer.
    pub fn copy_latest(&self, window: &mut [f32]) -> Option<usize> {
        let ring = match self.ring.try_lock() {
            Ok(ring) => ring,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        let available = ring.occupied_len();
        let count = available.min(window.len());
        let head = window.len() - count;

        window[..head].fill(0.0);
        for (slot, sample) in window[head..]
            .iter_mut()
            .zip(ring.iter().skip(available - count))
        {
            *slot = *sample;
        }

        Some(count)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Ignores poisoning; a ring left by a panicked writer is still valid.
    fn lock(&self) -> MutexGuard<'_, HeapRb<f32>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SampleTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleTap")
            .field("written", &self.written())
            .finish()
    }
}

/// [`AudioSource`] reading from a [`SampleTap`] that some other party fills.
#[derive(Debug)]
pub struct TapSource {
    tap: SampleTap,
    sample_rate: u32,
    last_seen: u64,
    released: bool,
}

impl TapSource {
    pub fn new(tap: SampleTap, sample_rate: u32) -> Self {
        Self {
            tap,
            sample_rate,
            last_seen: 0,
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl AudioSource for TapSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_latest(&mut self, window: &mut [f32]) -> usize {
        if self.released {
            return 0;
        }

        let written = self.tap.written();
        if written == self.last_seen {
            return 0;
        }

        match self.tap.copy_latest(window) {
            Some(count) => {
                self.last_seen = written;
                count
            }
            None => 0,
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.tap.clear();
        }
    }
}

/// Real-time playback of a decoded buffer. The read position follows the
/// wall clock from the moment the source was created.
#[derive(Debug)]
pub struct PlaybackSource {
    audio: Option<DecodedAudio>,
    sample_rate: u32,
    origin: Instant,
    last_position: usize,
}

impl PlaybackSource {
    pub fn new(audio: DecodedAudio) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            audio: Some(audio),
            origin: Instant::now(),
            last_position: 0,
        }
    }

    /// Moves the playhead to `seconds` from the start of the buffer.
    pub fn seek(&mut self, seconds: f32) {
        let offset = Duration::from_secs_f32(seconds.max(0.0));
        let now = Instant::now();
        self.origin = now.checked_sub(offset).unwrap_or(now);
        self.last_position = 0;
    }

    /// Current playhead in samples, clamped to the buffer length.
    pub fn position(&self) -> usize {
        let Some(audio) = &self.audio else {
            return 0;
        };
        let elapsed = self.origin.elapsed().as_secs_f64();
        ((elapsed * self.sample_rate as f64) as usize).min(audio.samples.len())
    }

    pub fn is_finished(&self) -> bool {
        match &self.audio {
            Some(audio) => self.position() >= audio.samples.len(),
            None => true,
        }
    }
}

impl AudioSource for PlaybackSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_latest(&mut self, window: &mut [f32]) -> usize {
        let position = self.position();
        let Some(audio) = &self.audio else {
            return 0;
        };
        if position == 0 || position == self.last_position {
            return 0;
        }
        self.last_position = position;

        let count = position.min(window.len());
        let head = window.len() - count;
        window[..head].fill(0.0);
        window[head..].copy_from_slice(&audio.samples[position - count..position]);
        count
    }

    fn release(&mut self) {
        if self.audio.take().is_some() {
            tracing::debug!("playback buffer released");
        }
    }
}
