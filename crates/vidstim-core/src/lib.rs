//! vidstim-core: frame-synchronized video stimulus playback.
//!
//! This crate provides the GUI-free core of a video playback component for
//! experiment software: it opens a compressed container, decodes frames on a
//! background thread, schedules each frame against a wall-clock playback
//! position (dropping late frames rather than falling behind), routes user
//! input collected between frames, and tears down deterministically however
//! playback ends. It contains:
//!
//! - Core types: [`video`], [`layout`]
//! - Decode engine adapter: [`gst`] (GStreamer, feature `backend-gstreamer`)
//! - Threading: [`frame_queue`] (single-slot handoff + decode thread)
//! - Timing: [`scheduler`] (playback clock, drop policy, frame counters)
//! - Interaction: [`input`], [`script`], [`tracker`]
//! - Presentation seam: [`backend`] (capability trait + immediate backend)
//! - Orchestration: [`session`]
//!
//! This crate has **zero GUI dependency**. Retained-texture presentation
//! lives in the `vidstim` crate, which implements the same
//! [`backend::PresentationBackend`] trait over an egui texture.

pub mod backend;
pub mod frame_queue;
pub mod input;
pub mod layout;
pub mod scheduler;
pub mod script;
pub mod session;
pub mod tracker;
pub mod video;

#[cfg(feature = "backend-gstreamer")]
pub mod gst;
