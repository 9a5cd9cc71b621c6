//! Core playback types and the decoder backend trait.
//!
//! This module provides the foundational types for frame-synchronized video
//! playback: pixel buffers, decoded frames, stream metadata, the playback
//! error taxonomy, and the [`DecoderBackend`] trait that decode engines
//! implement.

use std::time::Duration;

/// Pixel format for decoded video frames.
///
/// The decode pipeline negotiates packed RGB output so presentation backends
/// can blit without a color-space conversion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// RGB 24-bit packed
    Rgb24,
    /// RGBA 32-bit
    Rgba,
    /// BGRA 32-bit (common output of some converters)
    Bgra,
}

impl PixelFormat {
    /// Returns the number of bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
        }
    }
}

/// An owned, single-use buffer of decoded pixel data.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    /// Pixel format of the buffer
    pub format: PixelFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row (may include padding)
    pub stride: usize,
    /// Raw pixel data
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a new pixel buffer.
    pub fn new(format: PixelFormat, width: u32, height: u32, stride: usize, data: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            stride,
            data,
        }
    }

    /// Creates a tightly-packed buffer (stride = width * bytes_per_pixel).
    pub fn packed(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self::new(format, width, height, stride, data)
    }

    /// Returns the pixel at (x, y) as RGB, ignoring any alpha channel.
    ///
    /// Out-of-bounds coordinates return black rather than panicking; the
    /// blit path clips before sampling, so this is a belt for short rows.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride + x as usize * bpp;
        let Some(px) = self.data.get(offset..offset + bpp) else {
            return [0, 0, 0];
        };
        match self.format {
            PixelFormat::Rgb24 | PixelFormat::Rgba => [px[0], px[1], px[2]],
            PixelFormat::Bgra => [px[2], px[1], px[0]],
        }
    }
}

/// A decoded video frame with presentation timestamp and sequence number.
///
/// Produced by a [`DecoderBackend`], handed to the main loop through the
/// frame slot, and consumed exactly once by the scheduler.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Presentation timestamp (when this frame should be displayed)
    pub pts: Duration,
    /// Monotonic frame sequence number, continuous across loop restarts
    pub sequence: u64,
    /// The decoded pixel data
    pub buffer: PixelBuffer,
}

impl VideoFrame {
    /// Creates a new video frame.
    pub fn new(pts: Duration, sequence: u64, buffer: PixelBuffer) -> Self {
        Self {
            pts,
            sequence,
            buffer,
        }
    }

    /// Returns the frame dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.buffer.width, self.buffer.height)
    }
}

/// Metadata for an opened media source.
///
/// Populated by preroll negotiation and immutable afterwards. Exactly one
/// exists per playback session.
#[derive(Debug, Clone)]
pub struct MediaSource {
    /// The URI the pipeline was opened with
    pub uri: String,
    /// Intrinsic width in pixels
    pub width: u32,
    /// Intrinsic height in pixels
    pub height: u32,
    /// Nominal frame rate (frames per second)
    pub frame_rate: f32,
    /// Stream duration, if the container reports one
    pub duration: Option<Duration>,
    /// Negotiated pixel format
    pub format: PixelFormat,
}

impl MediaSource {
    /// Returns the intrinsic size as a tuple.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the nominal duration of one frame.
    pub fn frame_duration(&self) -> Duration {
        if self.frame_rate <= 0.0 || !self.frame_rate.is_finite() {
            return Duration::from_millis(33); // Default to ~30fps
        }
        Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }
}

/// State of a playback session.
///
/// ```text
/// Idle → Prerolled → Playing ⇄ Paused → Stopping → Closed
/// ```
///
/// Any state can transition to `Stopping` (end of stream, error, abort,
/// duration exceeded, router stop); `Stopping → Closed` always runs the
/// full teardown, regardless of which path triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No source opened yet
    Idle,
    /// Source opened and prerolled, decode context not yet started
    Prerolled,
    /// Actively playing
    Playing,
    /// Paused by the host or a custom handler
    Paused,
    /// Teardown in progress
    Stopping,
    /// Fully torn down
    Closed,
}

impl SessionState {
    /// Returns true while the main loop should keep ticking.
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Playing | SessionState::Paused)
    }
}

/// Errors that can occur during playback.
///
/// Every variant is terminal for the session: the state machine transitions
/// straight to `Stopping`/`Closed` and propagates the error to the caller
/// after teardown. Late frame drops are the only recoverable condition and
/// are counted, not reported here.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// The source path does not exist or is not readable
    FileNotFound(String),
    /// The pipeline could not negotiate caps (missing codec/plugin, bad file)
    Unopenable(String),
    /// The decode context failed to report running within the startup window
    StartupTimeout,
    /// A decoder bus error during playback
    Runtime(String),
    /// The caller-supplied event handler raised or panicked
    ScriptFailure(String),
    /// The escape key was pressed
    UserAbort,
}

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackError::FileNotFound(path) => write!(f, "Video file not found: {path}"),
            PlaybackError::Unopenable(msg) => write!(f, "Failed to open video: {msg}"),
            PlaybackError::StartupTimeout => write!(f, "Decode context failed to start"),
            PlaybackError::Runtime(msg) => write!(f, "Playback error: {msg}"),
            PlaybackError::ScriptFailure(msg) => write!(f, "Event handler failed: {msg}"),
            PlaybackError::UserAbort => write!(f, "Playback aborted by the user"),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Trait for decode engine backends.
///
/// Abstracts the streaming decode engine so the session and frame plumbing
/// work identically against GStreamer and against synthetic decoders in
/// tests. Implementations are pull-based: the decode thread calls
/// [`decode_next`](DecoderBackend::decode_next) in a loop and forwards
/// frames through the frame slot.
pub trait DecoderBackend: Send {
    /// Opens a source, forcing a preroll so metadata is negotiated before
    /// the call returns.
    fn open(uri: &str) -> Result<Self, PlaybackError>
    where
        Self: Sized;

    /// Returns the negotiated source metadata.
    fn source(&self) -> &MediaSource;

    /// Decodes and returns the next frame, or `None` if nothing is ready.
    ///
    /// Pending bus messages are processed first: a pipeline error surfaces
    /// as `PlaybackError::Runtime`, end of stream flips
    /// [`is_eof`](DecoderBackend::is_eof).
    fn decode_next(&mut self) -> Result<Option<VideoFrame>, PlaybackError>;

    /// Flush-seeks back to the start of the stream (loop restart).
    fn seek_to_start(&mut self) -> Result<(), PlaybackError>;

    /// Requests the Paused pipeline state.
    fn pause(&mut self) -> Result<(), PlaybackError> {
        Ok(())
    }

    /// Requests the Playing pipeline state.
    fn resume(&mut self) -> Result<(), PlaybackError> {
        Ok(())
    }

    /// Toggles audio output. Has no effect on decode scheduling.
    fn set_muted(&mut self, _muted: bool) -> Result<(), PlaybackError> {
        Ok(())
    }

    /// Returns true once the decoder has reached end of stream.
    fn is_eof(&self) -> bool {
        false
    }
}

/// Implementation for boxed trait objects so the decode thread can be spawned
/// with a type-erased decoder.
impl DecoderBackend for Box<dyn DecoderBackend + Send> {
    fn open(_uri: &str) -> Result<Self, PlaybackError>
    where
        Self: Sized,
    {
        // Not supported on boxed trait objects - use concrete types for open
        Err(PlaybackError::Unopenable(
            "Cannot call open() on boxed trait object".to_string(),
        ))
    }

    fn source(&self) -> &MediaSource {
        (**self).source()
    }

    fn decode_next(&mut self) -> Result<Option<VideoFrame>, PlaybackError> {
        (**self).decode_next()
    }

    fn seek_to_start(&mut self) -> Result<(), PlaybackError> {
        (**self).seek_to_start()
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        (**self).pause()
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        (**self).resume()
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), PlaybackError> {
        (**self).set_muted(muted)
    }

    fn is_eof(&self) -> bool {
        (**self).is_eof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer_rgb_at() {
        let data = vec![
            10, 20, 30, 255, // (0,0)
            40, 50, 60, 255, // (1,0)
        ];
        let buf = PixelBuffer::packed(PixelFormat::Rgba, 2, 1, data.clone());
        assert_eq!(buf.rgb_at(0, 0), [10, 20, 30]);
        assert_eq!(buf.rgb_at(1, 0), [40, 50, 60]);

        let bgra = PixelBuffer::packed(PixelFormat::Bgra, 2, 1, data);
        assert_eq!(bgra.rgb_at(0, 0), [30, 20, 10]);
    }

    #[test]
    fn test_pixel_buffer_out_of_bounds_is_black() {
        let buf = PixelBuffer::packed(PixelFormat::Rgb24, 1, 1, vec![1, 2, 3]);
        assert_eq!(buf.rgb_at(5, 5), [0, 0, 0]);
    }

    #[test]
    fn test_media_source_frame_duration() {
        let source = MediaSource {
            uri: "file:///clip.mp4".into(),
            width: 640,
            height: 480,
            frame_rate: 25.0,
            duration: Some(Duration::from_secs(10)),
            format: PixelFormat::Rgb24,
        };
        assert_eq!(source.frame_duration(), Duration::from_millis(40));

        let broken = MediaSource {
            frame_rate: 0.0,
            ..source
        };
        assert_eq!(broken.frame_duration(), Duration::from_millis(33));
    }

    #[test]
    fn test_session_state_is_running() {
        assert!(SessionState::Playing.is_running());
        assert!(SessionState::Paused.is_running());
        assert!(!SessionState::Prerolled.is_running());
        assert!(!SessionState::Closed.is_running());
    }
}
