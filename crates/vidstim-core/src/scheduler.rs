//! Playback clock and frame scheduling.
//!
//! The scheduler owns the wall-clock playback position and decides, per
//! decoded frame, whether the frame is presentable now or already late. Late
//! frames are dropped and counted, never retried; decoding continues so the
//! next frame can catch up. A slow machine shows fewer frames rather than
//! falling behind schedule.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::video::VideoFrame;

/// Tolerance before a frame counts as late.
///
/// A frame whose presentation timestamp lags the playback clock by more than
/// this is dropped instead of presented. The exact value is a tunable: large
/// enough to absorb tick jitter at common frame rates, small enough that a
/// stale frame is never shown.
pub const LATE_THRESHOLD: Duration = Duration::from_millis(45);

/// What to do with a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Forward the frame to the presentation backend
    Present,
    /// The frame is late; discard it and wait for the next one
    Drop,
}

/// Decides whether a frame at `pts` is presentable against the clock at
/// `position`.
///
/// Frames ahead of the clock are presented as-is: the decode pipeline paces
/// delivery, so an early frame is at most one frame interval ahead.
pub fn disposition(position: Duration, pts: Duration) -> FrameDisposition {
    if position > pts + LATE_THRESHOLD {
        FrameDisposition::Drop
    } else {
        FrameDisposition::Present
    }
}

/// Playback frame counters.
///
/// Thread-safe, lock-free counters shared between the session and callers
/// that want live statistics. The achieved frame rate is derived at snapshot
/// time: `frames_presented / frames_decoded * nominal_fps`.
#[derive(Clone)]
pub struct PlaybackStats {
    inner: Arc<StatsInner>,
}

struct StatsInner {
    /// Frames produced by the decoder and offered to the scheduler
    frames_decoded: AtomicU64,
    /// Frames forwarded to the presentation backend
    frames_presented: AtomicU64,
    /// Frames discarded as late
    frames_dropped: AtomicU64,
}

impl PlaybackStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatsInner {
                frames_decoded: AtomicU64::new(0),
                frames_presented: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Records a frame leaving the decoder.
    pub fn record_decoded(&self) {
        self.inner.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a frame forwarded to the presentation backend.
    pub fn record_presented(&self) {
        self.inner.frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a late frame being discarded.
    pub fn record_dropped(&self) {
        self.inner.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self, nominal_fps: f32) -> StatsSnapshot {
        let decoded = self.inner.frames_decoded.load(Ordering::Relaxed);
        let presented = self.inner.frames_presented.load(Ordering::Relaxed);
        let dropped = self.inner.frames_dropped.load(Ordering::Relaxed);
        let achieved_fps = if decoded > 0 {
            presented as f32 / decoded as f32 * nominal_fps
        } else {
            0.0
        };
        StatsSnapshot {
            frames_decoded: decoded,
            frames_presented: presented,
            frames_dropped: dropped,
            achieved_fps,
        }
    }
}

impl Default for PlaybackStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of playback statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub frames_decoded: u64,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    /// Actual achieved frame rate relative to the nominal rate
    pub achieved_fps: f32,
}

/// Wall-clock playback position with pause accounting.
///
/// The position only advances while playing; pause freezes it and resume
/// continues from the frozen value. Loop restarts rewind to zero.
pub struct FrameScheduler {
    /// Wall-clock instant of the last start/resume, None while paused/idle
    started_at: Option<Instant>,
    /// Position accumulated before the last start/resume
    base_position: Duration,
    /// Frame counters, shared with the session
    stats: PlaybackStats,
}

impl FrameScheduler {
    /// Creates an idle scheduler at position zero.
    pub fn new() -> Self {
        Self {
            started_at: None,
            base_position: Duration::ZERO,
            stats: PlaybackStats::new(),
        }
    }

    /// Returns the shared frame counters.
    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    /// Starts (or resumes) the playback clock.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Freezes the playback clock. Idempotent.
    pub fn pause(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.base_position += started.elapsed();
        }
    }

    /// Resumes the playback clock after a pause. Idempotent.
    pub fn resume(&mut self) {
        self.start();
    }

    /// Rewinds the clock to zero for a loop restart, keeping it running.
    pub fn rewind(&mut self) {
        self.base_position = Duration::ZERO;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Returns the current playback position.
    pub fn position(&self) -> Duration {
        match self.started_at {
            Some(started) => self.base_position + started.elapsed(),
            None => self.base_position,
        }
    }

    /// Returns true while the clock is advancing.
    pub fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    /// Decides the disposition for a decoded frame and updates the counters.
    pub fn schedule(&self, frame: &VideoFrame) -> FrameDisposition {
        self.stats.record_decoded();
        let verdict = disposition(self.position(), frame.pts);
        match verdict {
            FrameDisposition::Present => self.stats.record_presented(),
            FrameDisposition::Drop => {
                self.stats.record_dropped();
                tracing::trace!(
                    "Dropping late frame seq={} pts={:?} clock={:?}",
                    frame.sequence,
                    frame.pts,
                    self.position()
                );
            }
        }
        verdict
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}
