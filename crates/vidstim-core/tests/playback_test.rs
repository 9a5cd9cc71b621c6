//! Playback session integration tests.
//!
//! These drive the full session state machine - decode thread, single-slot
//! handoff, scheduler, input routing, teardown - against a synthetic
//! in-memory decoder, so no media files or GStreamer runtime are needed.
//! Timings are scaled down (20ms frames, sub-second durations) to keep the
//! suite fast while still exercising the real clock paths.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use vidstim_core::backend::{InputQueue, PresentationBackend};
use vidstim_core::input::{DurationLimit, InputEvent};
use vidstim_core::layout::ViewportLayout;
use vidstim_core::script::{HandlerError, HandlerTrigger, ScriptContext};
use vidstim_core::session::{PlaybackSession, SessionConfig};
use vidstim_core::tracker::FrameLogSink;
use vidstim_core::video::{
    DecoderBackend, MediaSource, PixelBuffer, PixelFormat, PlaybackError, SessionState, VideoFrame,
};

/// Frame interval of the synthetic source (50 fps).
const FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// Observable side effects of the synthetic decoder, shared with the test
/// after the decoder moves onto the decode thread.
#[derive(Default)]
struct DecoderProbes {
    seeks: AtomicU64,
    drops: AtomicU64,
    mute_calls: AtomicU64,
}

/// A decoder producing solid frames at a fixed rate, paced to wall clock.
struct SyntheticDecoder {
    media: MediaSource,
    total_frames: u64,
    emitted: u64,
    sequence: u64,
    epoch: Option<Instant>,
    eof: bool,
    probes: Arc<DecoderProbes>,
}

impl SyntheticDecoder {
    fn new(total_frames: u64, probes: Arc<DecoderProbes>) -> Self {
        let media = MediaSource {
            uri: "synthetic://clip".to_string(),
            width: 64,
            height: 48,
            frame_rate: 50.0,
            duration: Some(FRAME_INTERVAL * total_frames as u32),
            format: PixelFormat::Rgb24,
        };
        Self {
            media,
            total_frames,
            emitted: 0,
            sequence: 0,
            epoch: None,
            eof: false,
            probes,
        }
    }
}

impl DecoderBackend for SyntheticDecoder {
    fn open(_uri: &str) -> Result<Self, PlaybackError> {
        unimplemented!("tests construct the decoder directly")
    }

    fn source(&self) -> &MediaSource {
        &self.media
    }

    fn decode_next(&mut self) -> Result<Option<VideoFrame>, PlaybackError> {
        if self.emitted >= self.total_frames {
            self.eof = true;
            return Ok(None);
        }

        let epoch = *self.epoch.get_or_insert_with(Instant::now);
        let pts = FRAME_INTERVAL * self.emitted as u32;
        if pts > epoch.elapsed() {
            let remaining = pts.saturating_sub(epoch.elapsed());
            thread::sleep(remaining.min(Duration::from_millis(2)));
            if pts > epoch.elapsed() {
                return Ok(None);
            }
        }

        self.emitted += 1;
        self.sequence += 1;
        let buffer = PixelBuffer::packed(PixelFormat::Rgb24, 8, 8, vec![60; 8 * 8 * 3]);
        Ok(Some(VideoFrame::new(pts, self.sequence, buffer)))
    }

    fn seek_to_start(&mut self) -> Result<(), PlaybackError> {
        self.probes.seeks.fetch_add(1, Ordering::Relaxed);
        self.emitted = 0;
        self.epoch = Some(Instant::now());
        self.eof = false;
        Ok(())
    }

    fn set_muted(&mut self, _muted: bool) -> Result<(), PlaybackError> {
        self.probes.mute_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

impl Drop for SyntheticDecoder {
    fn drop(&mut self) {
        self.probes.drops.fetch_add(1, Ordering::Relaxed);
    }
}

/// A backend that records what the session does to it.
struct RecordingBackend {
    prepared: u32,
    finished: u32,
    presented: Vec<u64>,
    input: InputQueue,
}

impl RecordingBackend {
    fn new() -> Self {
        Self {
            prepared: 0,
            finished: 0,
            presented: Vec::new(),
            input: InputQueue::new(),
        }
    }

    fn input_queue(&self) -> InputQueue {
        self.input.clone()
    }
}

impl PresentationBackend for RecordingBackend {
    fn prepare_for_playback(&mut self, _layout: &ViewportLayout) -> Result<(), PlaybackError> {
        self.prepared += 1;
        Ok(())
    }

    fn handle_frame(&mut self, frame: &VideoFrame) {
        self.presented.push(frame.sequence);
    }

    fn draw_buffer(&mut self) {}

    fn poll_input(&mut self) -> Vec<InputEvent> {
        self.input.drain()
    }

    fn playback_finished(&mut self) {
        self.finished += 1;
    }
}

fn make_session(
    total_frames: u64,
    duration: DurationLimit,
    loop_playback: bool,
) -> (PlaybackSession, Arc<DecoderProbes>) {
    let probes = Arc::new(DecoderProbes::default());
    let decoder = SyntheticDecoder::new(total_frames, Arc::clone(&probes));
    let config = SessionConfig::new("/tmp/synthetic.mp4", (320, 240))
        .with_duration(duration)
        .with_loop(loop_playback);
    let session = PlaybackSession::prepare_with_decoder(config, Box::new(decoder)).unwrap();
    (session, probes)
}

#[test]
fn test_duration_limit_stops_with_no_input() {
    let (mut session, _) = make_session(100, DurationLimit::Seconds(0.25), false);
    let mut backend = RecordingBackend::new();

    let started = Instant::now();
    let report = session.run(&mut backend, None, None).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(report.response.is_none());
    assert!(report.frames_presented > 0);
    assert!(report.frames_presented <= report.frames_decoded);
    assert_eq!(backend.prepared, 1);
    assert_eq!(backend.finished, 1);
}

#[test]
fn test_eos_without_loop_closes_once() {
    let (mut session, probes) = make_session(5, DurationLimit::Seconds(10.0), false);
    let mut backend = RecordingBackend::new();

    let report = session.run(&mut backend, None, None).unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(report.frames_decoded, 5);
    assert_eq!(probes.drops.load(Ordering::Relaxed), 1);
    assert_eq!(backend.finished, 1);

    // Closing again must not tear anything down a second time
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(probes.drops.load(Ordering::Relaxed), 1);
}

#[test]
fn test_eos_with_loop_restarts_playback() {
    let (mut session, probes) = make_session(5, DurationLimit::Seconds(0.4), true);
    let mut backend = RecordingBackend::new();

    let report = session.run(&mut backend, None, None).unwrap();

    // The 100ms clip must have wrapped at least once within 400ms without
    // the session passing through Closed
    assert!(probes.seeks.load(Ordering::Relaxed) >= 1);
    assert!(report.frames_decoded > 5);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(backend.finished, 1);
}

#[test]
fn test_escape_aborts_with_teardown() {
    let (mut session, probes) = make_session(100, DurationLimit::Seconds(10.0), false);
    let mut backend = RecordingBackend::new();
    let queue = backend.input_queue();

    let pusher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(60));
        queue.push(InputEvent::Key("Escape".into()));
    });

    let err = session.run(&mut backend, None, None).unwrap_err();
    pusher.join().unwrap();

    assert_eq!(err, PlaybackError::UserAbort);
    // Teardown completed before the error reached us
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(probes.drops.load(Ordering::Relaxed), 1);
    assert_eq!(backend.finished, 1);
}

#[test]
fn test_keypress_ends_playback_and_records_response() {
    let (mut session, _) = make_session(100, DurationLimit::KeyPress, false);
    let mut backend = RecordingBackend::new();
    let queue = backend.input_queue();

    let pusher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(80));
        queue.push(InputEvent::Key("space".into()));
    });

    let report = session.run(&mut backend, None, None).unwrap();
    pusher.join().unwrap();

    let response = report.response.expect("keypress should be recorded");
    assert_eq!(response.event, InputEvent::Key("space".into()));
    assert!(response.timestamp > Duration::ZERO);
}

#[test]
fn test_mouseclick_ends_playback() {
    let (mut session, _) = make_session(100, DurationLimit::MouseClick, false);
    let mut backend = RecordingBackend::new();
    let queue = backend.input_queue();

    // A key press must NOT stop a mouseclick-limited session
    queue.push(InputEvent::Key("space".into()));
    let late_queue = backend.input_queue();
    let pusher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(80));
        late_queue.push(InputEvent::MouseButton(1));
    });

    let report = session.run(&mut backend, None, None).unwrap();
    pusher.join().unwrap();

    let response = report.response.expect("click should be recorded");
    assert_eq!(response.event, InputEvent::MouseButton(1));
}

#[test]
fn test_mute_flag_reaches_decoder() {
    let probes = Arc::new(DecoderProbes::default());
    let decoder = SyntheticDecoder::new(3, Arc::clone(&probes));
    let config = SessionConfig::new("/tmp/synthetic.mp4", (320, 240))
        .with_duration(DurationLimit::Seconds(10.0))
        .with_audio(false);
    let mut session = PlaybackSession::prepare_with_decoder(config, Box::new(decoder)).unwrap();
    let mut backend = RecordingBackend::new();

    session.run(&mut backend, None, None).unwrap();
    assert_eq!(probes.mute_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn test_handler_failure_terminates_playback() {
    let (mut session, probes) = make_session(100, DurationLimit::Seconds(10.0), false);
    let mut backend = RecordingBackend::new();

    let mut handler = |_: &mut ScriptContext<'_>| -> Result<bool, HandlerError> {
        Err("deliberate failure".into())
    };
    let config_err = session
        .run(&mut backend, Some(&mut handler), None)
        .unwrap_err();

    match config_err {
        PlaybackError::ScriptFailure(msg) => assert!(msg.contains("deliberate failure")),
        other => panic!("Expected ScriptFailure, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(probes.drops.load(Ordering::Relaxed), 1);
    assert_eq!(backend.finished, 1);
}

#[test]
fn test_handler_panic_terminates_playback() {
    let (mut session, _) = make_session(100, DurationLimit::Seconds(10.0), false);
    let mut backend = RecordingBackend::new();

    let mut handler =
        |_: &mut ScriptContext<'_>| -> Result<bool, HandlerError> { panic!("handler exploded") };
    let err = session
        .run(&mut backend, Some(&mut handler), None)
        .unwrap_err();

    assert!(matches!(err, PlaybackError::ScriptFailure(_)));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_handler_continuation_flag_stops_cleanly() {
    let probes = Arc::new(DecoderProbes::default());
    let decoder = SyntheticDecoder::new(100, Arc::clone(&probes));
    let config = SessionConfig::new("/tmp/synthetic.mp4", (320, 240))
        .with_duration(DurationLimit::Seconds(10.0))
        .with_handler_trigger(HandlerTrigger::AfterEveryFrame);
    let mut session = PlaybackSession::prepare_with_decoder(config, Box::new(decoder)).unwrap();
    let mut backend = RecordingBackend::new();

    let mut ticks = 0u32;
    let mut handler = |_: &mut ScriptContext<'_>| -> Result<bool, HandlerError> {
        ticks += 1;
        Ok(ticks < 10)
    };

    let report = session.run(&mut backend, Some(&mut handler), None).unwrap();
    assert!(report.response.is_none());
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(ticks, 10);
}

#[test]
fn test_handler_pause_and_unpause() {
    let probes = Arc::new(DecoderProbes::default());
    let decoder = SyntheticDecoder::new(200, Arc::clone(&probes));
    let config = SessionConfig::new("/tmp/synthetic.mp4", (320, 240))
        .with_duration(DurationLimit::Seconds(10.0))
        .with_handler_trigger(HandlerTrigger::AfterEveryFrame);
    let mut session = PlaybackSession::prepare_with_decoder(config, Box::new(decoder)).unwrap();
    let mut backend = RecordingBackend::new();

    let mut ticks = 0u32;
    let mut handler = |ctx: &mut ScriptContext<'_>| -> Result<bool, HandlerError> {
        ticks += 1;
        match ticks {
            3 => ctx.pause(),
            12 => ctx.unpause(),
            _ => {}
        }
        Ok(ticks < 30)
    };

    let report = session.run(&mut backend, Some(&mut handler), None).unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    // Playback resumed and kept presenting after the pause window
    assert!(report.frames_presented > 0);
}

#[test]
fn test_handler_on_keypress_trigger_runs_once_per_event_tick() {
    let probes = Arc::new(DecoderProbes::default());
    let decoder = SyntheticDecoder::new(100, Arc::clone(&probes));
    let config = SessionConfig::new("/tmp/synthetic.mp4", (320, 240))
        .with_duration(DurationLimit::Seconds(0.2))
        .with_handler_trigger(HandlerTrigger::OnKeypress);
    let mut session = PlaybackSession::prepare_with_decoder(config, Box::new(decoder)).unwrap();
    let mut backend = RecordingBackend::new();
    let queue = backend.input_queue();

    let pusher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        queue.push(InputEvent::Key("space".into()));
    });

    let mut invocations = 0u32;
    let mut events_seen = 0usize;
    let mut handler = |ctx: &mut ScriptContext<'_>| -> Result<bool, HandlerError> {
        invocations += 1;
        events_seen += ctx.events.len();
        Ok(true)
    };

    let report = session.run(&mut backend, Some(&mut handler), None).unwrap();
    pusher.join().unwrap();

    // Only the tick that collected the key press invoked the handler, and
    // the handler (not the default router) consumed the event
    assert_eq!(invocations, 1);
    assert_eq!(events_seen, 1);
    assert!(report.response.is_none());
}

#[test]
fn test_frame_log_sink_receives_presented_frames() {
    #[derive(Default)]
    struct MemorySink {
        lines: Vec<String>,
        statuses: Vec<String>,
    }

    impl FrameLogSink for MemorySink {
        fn log(&mut self, message: &str) {
            self.lines.push(message.to_string());
        }

        fn status_msg(&mut self, message: &str) {
            self.statuses.push(message.to_string());
        }
    }

    let probes = Arc::new(DecoderProbes::default());
    let decoder = SyntheticDecoder::new(8, Arc::clone(&probes));
    let config = SessionConfig::new("/tmp/synthetic.mp4", (320, 240))
        .with_duration(DurationLimit::Seconds(10.0))
        .with_frame_log(true);
    let mut session = PlaybackSession::prepare_with_decoder(config, Box::new(decoder)).unwrap();
    let mut backend = RecordingBackend::new();
    let mut sink = MemorySink::default();

    let report = session.run(&mut backend, None, Some(&mut sink)).unwrap();

    assert_eq!(sink.lines.len(), report.frames_presented as usize);
    assert_eq!(sink.lines.len(), sink.statuses.len());
    for line in &sink.lines {
        assert!(line.starts_with("videoframe "), "unexpected line {line:?}");
    }
}

/// A decoder whose frames are all stamped at t=0, so everything after the
/// late threshold must be dropped.
struct StaleDecoder {
    media: MediaSource,
    remaining: u64,
    sequence: u64,
}

impl DecoderBackend for StaleDecoder {
    fn open(_uri: &str) -> Result<Self, PlaybackError> {
        unimplemented!()
    }

    fn source(&self) -> &MediaSource {
        &self.media
    }

    fn decode_next(&mut self) -> Result<Option<VideoFrame>, PlaybackError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        // Slow producer: keeps frames arriving well past the late threshold
        thread::sleep(Duration::from_millis(2));
        self.remaining -= 1;
        self.sequence += 1;
        let buffer = PixelBuffer::packed(PixelFormat::Rgb24, 8, 8, vec![0; 8 * 8 * 3]);
        Ok(Some(VideoFrame::new(Duration::ZERO, self.sequence, buffer)))
    }

    fn seek_to_start(&mut self) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.remaining == 0
    }
}

#[test]
fn test_late_frames_are_dropped_not_presented() {
    let decoder = StaleDecoder {
        media: MediaSource {
            uri: "synthetic://stale".to_string(),
            width: 8,
            height: 8,
            frame_rate: 50.0,
            duration: None,
            format: PixelFormat::Rgb24,
        },
        remaining: 1000,
        sequence: 0,
    };
    let config = SessionConfig::new("/tmp/synthetic.mp4", (320, 240))
        .with_duration(DurationLimit::Seconds(0.2));
    let mut session = PlaybackSession::prepare_with_decoder(config, Box::new(decoder)).unwrap();
    let mut backend = RecordingBackend::new();

    let report = session.run(&mut backend, None, None).unwrap();

    // Frames stamped at t=0 stop being presentable once the clock passes
    // the late threshold; from then on every frame is dropped
    assert!(report.frames_dropped > 0);
    assert!(report.frames_presented < report.frames_decoded);
    assert_eq!(
        backend.presented.len(),
        report.frames_presented as usize
    );
    assert!(report.achieved_fps < 50.0);
}

#[test]
fn test_run_twice_is_rejected() {
    let (mut session, _) = make_session(5, DurationLimit::Seconds(10.0), false);
    let mut backend = RecordingBackend::new();

    session.run(&mut backend, None, None).unwrap();
    let err = session.run(&mut backend, None, None).unwrap_err();
    assert!(matches!(err, PlaybackError::Runtime(_)));
}
