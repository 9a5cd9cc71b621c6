//! GStreamer-based decoder backend.
//!
//! Wraps a GStreamer pipeline behind [`DecoderBackend`]:
//!
//! - Video: `uridecodebin ! videoconvert ! video/x-raw,format=RGB ! appsink`
//! - Audio: `uridecodebin ! audioconvert ! audioresample ! volume ! autoaudiosink`
//!
//! The appsink is capped at one buffer with dropping enabled, so the
//! pipeline itself never queues more than a single undelivered frame -
//! matching the single-slot handoff on the Rust side. Opening forces a
//! preroll (Paused) so dimensions and frame rate are negotiated before
//! playback starts; the preroll sample is cached and returned by the first
//! `decode_next` call. Mute is driven through the volume element and never
//! affects decode scheduling.

use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use crate::video::{
    DecoderBackend, MediaSource, PixelBuffer, PixelFormat, PlaybackError, VideoFrame,
};

/// How long preroll may take before open() gives up.
const PREROLL_TIMEOUT: gst::ClockTime = gst::ClockTime::from_seconds(10);

/// How long a loop-restart seek may take to confirm.
const SEEK_TIMEOUT: gst::ClockTime = gst::ClockTime::from_seconds(5);

/// How long one decode_next() call waits for a sample.
const PULL_TIMEOUT: gst::ClockTime = gst::ClockTime::from_mseconds(100);

/// GStreamer decoder backend.
pub struct GstDecoder {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    /// Volume element, used for muting
    volume: gst::Element,
    media: MediaSource,
    /// Presentation timestamp of the last delivered frame
    position: Duration,
    /// Monotonic frame counter, continuous across loop restarts
    sequence: u64,
    eof: bool,
    /// Cached preroll sample, returned by the first decode_next() call
    preroll_sample: Option<gst::Sample>,
}

impl GstDecoder {
    /// Builds and prerolls a pipeline for the given URI.
    pub fn new(uri: &str) -> Result<Self, PlaybackError> {
        gst::init()
            .map_err(|e| PlaybackError::Unopenable(format!("GStreamer init failed: {e}")))?;

        let pipeline = gst::Pipeline::new();

        // Source element - handles file://, http://, https://
        let source = gst::ElementFactory::make("uridecodebin")
            .property("uri", uri)
            .build()
            .map_err(|e| PlaybackError::Unopenable(format!("Failed to create uridecodebin: {e}")))?;

        // === Video elements ===
        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| PlaybackError::Unopenable(format!("Failed to create videoconvert: {e}")))?;

        // Packed RGB out, one buffer deep, dropping: the sink never holds
        // more than the frame currently being handed off.
        let appsink = gst_app::AppSink::builder()
            .caps(
                &gst_video::VideoCapsBuilder::new()
                    .format(gst_video::VideoFormat::Rgb)
                    .build(),
            )
            .max_buffers(1)
            .drop(true)
            .build();

        // === Audio elements ===
        let audioconvert = gst::ElementFactory::make("audioconvert")
            .build()
            .map_err(|e| PlaybackError::Unopenable(format!("Failed to create audioconvert: {e}")))?;

        let audioresample = gst::ElementFactory::make("audioresample")
            .build()
            .map_err(|e| {
                PlaybackError::Unopenable(format!("Failed to create audioresample: {e}"))
            })?;

        let volume = gst::ElementFactory::make("volume")
            .property("volume", 1.0f64)
            .build()
            .map_err(|e| PlaybackError::Unopenable(format!("Failed to create volume: {e}")))?;

        let audiosink = gst::ElementFactory::make("autoaudiosink")
            .build()
            .map_err(|e| PlaybackError::Unopenable(format!("Failed to create autoaudiosink: {e}")))?;

        pipeline
            .add_many([
                &source,
                &videoconvert,
                appsink.upcast_ref(),
                &audioconvert,
                &audioresample,
                &volume,
                &audiosink,
            ])
            .map_err(|e| PlaybackError::Unopenable(format!("Failed to add elements: {e}")))?;

        videoconvert
            .link(&appsink)
            .map_err(|e| PlaybackError::Unopenable(format!("Failed to link video elements: {e}")))?;

        gst::Element::link_many([&audioconvert, &audioresample, &volume, &audiosink])
            .map_err(|e| PlaybackError::Unopenable(format!("Failed to link audio elements: {e}")))?;

        // Link uridecodebin's dynamic pads as streams appear
        let videoconvert_weak = videoconvert.downgrade();
        let audioconvert_weak = audioconvert.downgrade();
        source.connect_pad_added(move |_src, src_pad| {
            let caps = src_pad
                .current_caps()
                .unwrap_or_else(|| src_pad.query_caps(None));
            let Some(structure) = caps.structure(0) else {
                return;
            };
            let name = structure.name();

            let target = if name.starts_with("video/") {
                videoconvert_weak.upgrade()
            } else if name.starts_with("audio/") {
                audioconvert_weak.upgrade()
            } else {
                None
            };
            let Some(target) = target else {
                return;
            };
            let Some(sink_pad) = target.static_pad("sink") else {
                tracing::warn!("Converter element has no sink pad");
                return;
            };
            if !sink_pad.is_linked() {
                if let Err(e) = src_pad.link(&sink_pad) {
                    tracing::warn!("Failed to link {} pad: {:?}", name, e);
                } else {
                    tracing::debug!("Linked {} pad", name);
                }
            }
        });

        // Preroll: Paused makes metadata available without starting playback
        pipeline.set_state(gst::State::Paused).map_err(|e| {
            PlaybackError::Unopenable(format!("Failed to preroll pipeline: {e:?}"))
        })?;

        let Some(bus) = pipeline.bus() else {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(PlaybackError::Unopenable("Pipeline has no bus".to_string()));
        };

        let mut duration = None;
        for msg in bus.iter_timed(PREROLL_TIMEOUT) {
            match msg.view() {
                gst::MessageView::AsyncDone(_) => {
                    if let Some(dur) = pipeline.query_duration::<gst::ClockTime>() {
                        duration = Some(Duration::from_nanos(dur.nseconds()));
                    }
                    break;
                }
                gst::MessageView::Error(err) => {
                    let _ = pipeline.set_state(gst::State::Null);
                    let _ = pipeline.state(gst::ClockTime::from_seconds(2));
                    return Err(PlaybackError::Unopenable(format!(
                        "Pipeline error: {} ({:?})",
                        err.error(),
                        err.debug()
                    )));
                }
                _ => {}
            }
        }

        // Negotiated caps from the appsink pad; fall back to the preroll
        // sample's caps for sources that negotiate late
        let mut width = 0u32;
        let mut height = 0u32;
        let mut frame_rate = 0.0f32;
        if let Some(caps) = appsink.sink_pads().first().and_then(|p| p.current_caps()) {
            read_video_caps(&caps, &mut width, &mut height, &mut frame_rate);
        }

        let preroll_sample = appsink.try_pull_preroll(PREROLL_TIMEOUT);
        if width == 0 || height == 0 || frame_rate == 0.0 {
            if let Some(caps) = preroll_sample.as_ref().and_then(|s| s.caps()) {
                read_video_caps(caps, &mut width, &mut height, &mut frame_rate);
            }
        }

        if width == 0 || height == 0 {
            let _ = pipeline.set_state(gst::State::Null);
            let _ = pipeline.state(gst::ClockTime::from_seconds(2));
            return Err(PlaybackError::Unopenable(
                "Could not determine video dimensions".to_string(),
            ));
        }
        if frame_rate <= 0.0 {
            frame_rate = 30.0; // Default fallback
        }

        tracing::info!(
            "GStreamer pipeline prerolled: {}x{} @ {:.2}fps, duration: {:?}",
            width,
            height,
            frame_rate,
            duration
        );

        let media = MediaSource {
            uri: uri.to_string(),
            width,
            height,
            frame_rate,
            duration,
            format: PixelFormat::Rgb24,
        };

        Ok(Self {
            pipeline,
            appsink,
            volume,
            media,
            position: Duration::ZERO,
            sequence: 0,
            eof: false,
            preroll_sample,
        })
    }

    /// Converts a GStreamer sample into a [`VideoFrame`].
    fn sample_to_frame(&mut self, sample: gst::Sample) -> Result<VideoFrame, PlaybackError> {
        let caps = sample
            .caps()
            .ok_or_else(|| PlaybackError::Runtime("Sample without caps".to_string()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| PlaybackError::Runtime(format!("Bad sample caps: {e}")))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| PlaybackError::Runtime("Sample without buffer".to_string()))?;

        let pts = buffer
            .pts()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or(self.position);

        let map = buffer
            .map_readable()
            .map_err(|e| PlaybackError::Runtime(format!("Failed to map buffer: {e}")))?;

        let pixels = PixelBuffer::new(
            PixelFormat::Rgb24,
            info.width(),
            info.height(),
            info.stride()[0] as usize,
            map.as_slice().to_vec(),
        );

        self.position = pts;
        self.sequence += 1;
        Ok(VideoFrame::new(pts, self.sequence, pixels))
    }

    /// Processes a bus message during decode_next.
    /// Returns Some(result) if decode_next should return early.
    fn process_bus_message(
        &mut self,
        msg: &gst::Message,
    ) -> Option<Result<Option<VideoFrame>, PlaybackError>> {
        match msg.view() {
            gst::MessageView::Error(err) => Some(Err(PlaybackError::Runtime(format!(
                "Pipeline error: {} ({:?})",
                err.error(),
                err.debug()
            )))),
            gst::MessageView::Eos(_) => {
                self.eof = true;
                Some(Ok(None))
            }
            _ => None,
        }
    }
}

impl Drop for GstDecoder {
    fn drop(&mut self) {
        // GStreamer finishes the teardown asynchronously
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

// GstDecoder moves onto the decode thread; verify the GStreamer handles it
// carries are Send (they are reference-counted, thread-safe GObjects).
const _: () = {
    const fn assert_send<T: Send>() {}
    assert_send::<gst::Pipeline>();
    assert_send::<gst::Element>();
    assert_send::<gst_app::AppSink>();
    assert_send::<gst::Sample>();
};

impl DecoderBackend for GstDecoder {
    fn open(uri: &str) -> Result<Self, PlaybackError>
    where
        Self: Sized,
    {
        Self::new(uri)
    }

    fn source(&self) -> &MediaSource {
        &self.media
    }

    fn decode_next(&mut self) -> Result<Option<VideoFrame>, PlaybackError> {
        if self.eof {
            return Ok(None);
        }

        // First call delivers the sample consumed during preroll
        if let Some(sample) = self.preroll_sample.take() {
            let frame = self.sample_to_frame(sample)?;
            tracing::debug!("Returning cached preroll frame at {:?}", frame.pts);
            return Ok(Some(frame));
        }

        if let Some(bus) = self.pipeline.bus() {
            while let Some(msg) = bus.pop() {
                if let Some(result) = self.process_bus_message(&msg) {
                    return result;
                }
            }
        }

        let Some(sample) = self.appsink.try_pull_sample(PULL_TIMEOUT) else {
            if self.appsink.is_eos() {
                self.eof = true;
            }
            return Ok(None);
        };

        self.sample_to_frame(sample).map(Some)
    }

    fn seek_to_start(&mut self) -> Result<(), PlaybackError> {
        self.pipeline
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                gst::ClockTime::ZERO,
            )
            .map_err(|e| PlaybackError::Runtime(format!("Loop restart seek failed: {e}")))?;

        // Only consume AsyncDone or Error here so decode_next still sees
        // everything else
        if let Some(bus) = self.pipeline.bus() {
            let msg = bus.timed_pop_filtered(
                SEEK_TIMEOUT,
                &[gst::MessageType::AsyncDone, gst::MessageType::Error],
            );
            match msg.as_ref().map(|m| m.view()) {
                Some(gst::MessageView::AsyncDone(_)) => {
                    tracing::debug!("Loop restart seek completed");
                }
                Some(gst::MessageView::Error(err)) => {
                    return Err(PlaybackError::Runtime(format!(
                        "Seek error: {} ({:?})",
                        err.error(),
                        err.debug()
                    )));
                }
                _ => {
                    return Err(PlaybackError::Runtime("Seek timed out".to_string()));
                }
            }
        }

        self.position = Duration::ZERO;
        self.eof = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        self.pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| PlaybackError::Runtime(format!("Pause failed: {e:?}")))?;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| PlaybackError::Runtime(format!("Resume failed: {e:?}")))?;
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), PlaybackError> {
        self.volume.set_property("mute", muted);
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

/// Reads width/height/framerate out of video caps, leaving zeroes untouched
/// on missing fields.
fn read_video_caps(caps: &gst::CapsRef, width: &mut u32, height: &mut u32, frame_rate: &mut f32) {
    let Some(s) = caps.structure(0) else {
        return;
    };
    if *width == 0 {
        *width = s.get::<i32>("width").unwrap_or(0).max(0) as u32;
    }
    if *height == 0 {
        *height = s.get::<i32>("height").unwrap_or(0).max(0) as u32;
    }
    if *frame_rate == 0.0 {
        if let Ok(fps) = s.get::<gst::Fraction>("framerate") {
            if fps.denom() != 0 {
                *frame_rate = fps.numer() as f32 / fps.denom() as f32;
            }
        }
    }
}
