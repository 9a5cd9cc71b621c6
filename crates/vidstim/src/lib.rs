//! vidstim: egui integration layer for frame-synchronized video playback.
//!
//! This crate adds the retained-texture presentation backend on top of
//! `vidstim-core`: the most recent decoded frame is uploaded to a GPU
//! texture and the textured quad is repainted every tick, scaled and
//! centered per the precomputed viewport layout. Input events from the egui
//! window (key presses, mouse buttons) are mapped to the core's input
//! events, so the same session loop drives both this backend and the
//! core's immediate surface backend.

pub mod events;
pub mod texture;

// Re-export the core types consumers need alongside the backend
pub use vidstim_core::backend::{InputQueue, PresentationBackend, SurfaceBackend};
pub use vidstim_core::input::{DurationLimit, InputEvent, Response};
pub use vidstim_core::layout::ViewportLayout;
pub use vidstim_core::scheduler::StatsSnapshot;
pub use vidstim_core::script::{EventHandler, HandlerTrigger, ScriptContext};
pub use vidstim_core::session::{PlaybackReport, PlaybackSession, SessionConfig};
pub use vidstim_core::tracker::FrameLogSink;
pub use vidstim_core::video::{
    MediaSource, PixelBuffer, PixelFormat, PlaybackError, SessionState, VideoFrame,
};

pub use texture::TextureBackend;
