//! Presentation backends.
//!
//! A presentation backend receives presentable frames from the session loop
//! and puts them on screen. Two families exist: immediate backends draw
//! inside [`handle_frame`](PresentationBackend::handle_frame) (blit straight
//! into the output surface), retained backends cache the most recent frame
//! (e.g. as a GPU texture) and redraw it on every
//! [`draw_buffer`](PresentationBackend::draw_buffer) tick. The session calls
//! the full capability set either way, so backends of both families are
//! interchangeable.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::input::InputEvent;
use crate::layout::ViewportLayout;
use crate::video::{PlaybackError, VideoFrame};

/// Capability interface for presentation backends.
pub trait PresentationBackend {
    /// Acquires backend rendering state for a playback run.
    ///
    /// Paired with [`playback_finished`](PresentationBackend::playback_finished),
    /// which the session guarantees to call on every exit path.
    fn prepare_for_playback(&mut self, layout: &ViewportLayout) -> Result<(), PlaybackError>;

    /// Accepts a presentable frame.
    ///
    /// The buffer must be copied (or uploaded) before returning; it is not
    /// retained by the caller beyond this call.
    fn handle_frame(&mut self, frame: &VideoFrame);

    /// Presents the most recent frame.
    ///
    /// Called once per tick. Immediate backends that already drew in
    /// `handle_frame` treat this as a no-op.
    fn draw_buffer(&mut self);

    /// Flushes the windowing backend's event machinery so the host window
    /// stays responsive. No-op for backends without a windowing loop.
    fn pump_events(&mut self) {}

    /// Drains the input events collected since the last tick, in order.
    fn poll_input(&mut self) -> Vec<InputEvent>;

    /// Releases whatever [`prepare_for_playback`](PresentationBackend::prepare_for_playback)
    /// acquired.
    fn playback_finished(&mut self);
}

/// Handle for feeding input events into a [`SurfaceBackend`].
///
/// Cloneable; the host's event source pushes events and the backend drains
/// them on its next tick.
#[derive(Clone, Default)]
pub struct InputQueue {
    events: Arc<Mutex<VecDeque<InputEvent>>>,
}

impl InputQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: InputEvent) {
        self.events.lock().push_back(event);
    }

    /// Drains all pending events in arrival order.
    pub fn drain(&self) -> Vec<InputEvent> {
        self.events.lock().drain(..).collect()
    }
}

/// Immediate-mode presentation backend.
///
/// Owns a screen-sized RGB framebuffer and blits each presentable frame into
/// the layout's destination rectangle as it arrives, so `draw_buffer` has
/// nothing left to do. The host presents [`framebuffer`](SurfaceBackend::framebuffer)
/// however it likes and injects input through the [`InputQueue`].
pub struct SurfaceBackend {
    /// Output surface size
    screen: (u32, u32),
    /// Packed RGB24 output pixels, row-major, screen sized
    framebuffer: Vec<u8>,
    /// Destination geometry, set by `prepare_for_playback`
    layout: Option<ViewportLayout>,
    /// Host-fed input events
    input: InputQueue,
}

impl SurfaceBackend {
    /// Creates a backend for the given output surface size.
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        Self {
            screen: (screen_width, screen_height),
            framebuffer: vec![0; screen_width as usize * screen_height as usize * 3],
            layout: None,
            input: InputQueue::new(),
        }
    }

    /// Returns a handle for injecting input events.
    pub fn input_queue(&self) -> InputQueue {
        self.input.clone()
    }

    /// Returns the output pixels (packed RGB24, row-major).
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Returns the output surface size.
    pub fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    fn clear(&mut self) {
        self.framebuffer.fill(0);
    }

    /// Scales the frame into the destination rectangle, centered.
    ///
    /// Nearest-neighbor sampling; destination pixels outside the screen
    /// (negative offsets in native mode) are clipped.
    fn blit_scaled(&mut self, frame: &VideoFrame, layout: &ViewportLayout) {
        let (dest_w, dest_h) = layout.dest;
        let (src_w, src_h) = frame.dimensions();
        if dest_w == 0 || dest_h == 0 || src_w == 0 || src_h == 0 {
            return;
        }

        let (screen_w, screen_h) = self.screen;
        for dy in 0..dest_h {
            let screen_y = layout.offset.1 + dy as i32;
            if screen_y < 0 || screen_y >= screen_h as i32 {
                continue;
            }
            let src_y = (dy as u64 * src_h as u64 / dest_h as u64) as u32;
            for dx in 0..dest_w {
                let screen_x = layout.offset.0 + dx as i32;
                if screen_x < 0 || screen_x >= screen_w as i32 {
                    continue;
                }
                let src_x = (dx as u64 * src_w as u64 / dest_w as u64) as u32;
                let rgb = frame.buffer.rgb_at(src_x, src_y);
                let offset = (screen_y as usize * screen_w as usize + screen_x as usize) * 3;
                self.framebuffer[offset..offset + 3].copy_from_slice(&rgb);
            }
        }
    }
}

impl PresentationBackend for SurfaceBackend {
    fn prepare_for_playback(&mut self, layout: &ViewportLayout) -> Result<(), PlaybackError> {
        self.clear();
        self.layout = Some(*layout);
        Ok(())
    }

    fn handle_frame(&mut self, frame: &VideoFrame) {
        if let Some(layout) = self.layout {
            self.blit_scaled(frame, &layout);
        }
    }

    fn draw_buffer(&mut self) {
        // Immediate mode: the frame was drawn in handle_frame
    }

    fn poll_input(&mut self) -> Vec<InputEvent> {
        self.input.drain()
    }

    fn playback_finished(&mut self) {
        self.layout = None;
        self.clear();
    }
}
