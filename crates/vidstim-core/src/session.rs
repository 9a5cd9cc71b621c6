//! Playback session orchestration.
//!
//! [`PlaybackSession`] ties the pieces together: it opens and prerolls the
//! source, spawns the decode context on entry to Playing, ticks the
//! presentation/input loop once per rendered frame, and guarantees teardown
//! on every exit path - natural end of stream, duration limit, input stop,
//! escape abort, handler failure, or pipeline error.
//!
//! # State machine
//!
//! ```text
//! prepare()            → Prerolled
//! run()                → Playing ⇄ Paused
//! any stop condition   → Stopping → Closed (idempotent teardown)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::backend::PresentationBackend;
use crate::frame_queue::{DecodeThread, FrameSlot, PipelineEvent};
use crate::input::{contains_escape, DurationLimit, InputRouter, Response, RouteOutcome};
use crate::layout::ViewportLayout;
use crate::scheduler::{FrameDisposition, FrameScheduler, StatsSnapshot};
use crate::script::{run_handler, EventHandler, HandlerTrigger, ScriptContext};
use crate::tracker::FrameLogSink;
use crate::video::{DecoderBackend, MediaSource, PlaybackError, SessionState};

/// How many times the startup gate polls for the decode context.
const STARTUP_RETRIES: u32 = 10;

/// Delay between startup gate polls.
const STARTUP_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// How long one loop tick waits for a frame before carrying on with input
/// handling. Keeps input latency bounded while avoiding a busy spin.
const TICK_TIMEOUT: Duration = Duration::from_millis(5);

/// Host-supplied playback configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Path to the video file (already resolved by the host's file pool)
    pub source: PathBuf,
    /// Scale the video to fill the screen (aspect-preserving) or play at
    /// native size
    pub fit_to_screen: bool,
    /// Play the audio track, or mute it
    pub play_audio: bool,
    /// Restart from the beginning at end of stream
    pub loop_playback: bool,
    /// When playback ends, absent a custom handler
    pub duration: DurationLimit,
    /// When the custom handler runs, if one is installed
    pub handler_trigger: HandlerTrigger,
    /// Forward presented frame numbers to the frame-log sink
    pub log_frames: bool,
    /// Output surface size in pixels
    pub screen_size: (u32, u32),
}

impl SessionConfig {
    /// Creates a configuration with the host's usual defaults: fit to
    /// screen, audio on, no looping, play until a key is pressed.
    pub fn new(source: impl Into<PathBuf>, screen_size: (u32, u32)) -> Self {
        Self {
            source: source.into(),
            fit_to_screen: true,
            play_audio: true,
            loop_playback: false,
            duration: DurationLimit::KeyPress,
            handler_trigger: HandlerTrigger::OnKeypress,
            log_frames: false,
            screen_size,
        }
    }

    /// Sets the duration limit.
    pub fn with_duration(mut self, duration: DurationLimit) -> Self {
        self.duration = duration;
        self
    }

    /// Enables or disables looping.
    pub fn with_loop(mut self, loop_playback: bool) -> Self {
        self.loop_playback = loop_playback;
        self
    }

    /// Enables or disables the audio track.
    pub fn with_audio(mut self, play_audio: bool) -> Self {
        self.play_audio = play_audio;
        self
    }

    /// Selects fit-to-screen or native-size presentation.
    pub fn with_fit_to_screen(mut self, fit: bool) -> Self {
        self.fit_to_screen = fit;
        self
    }

    /// Sets when the custom handler runs.
    pub fn with_handler_trigger(mut self, trigger: HandlerTrigger) -> Self {
        self.handler_trigger = trigger;
        self
    }

    /// Enables per-frame forwarding to the frame-log sink.
    pub fn with_frame_log(mut self, log_frames: bool) -> Self {
        self.log_frames = log_frames;
        self
    }
}

/// What the session reports back to the host on successful completion.
#[derive(Debug, Clone)]
pub struct PlaybackReport {
    /// The input event that ended playback, if one did
    pub response: Option<Response>,
    /// Frames produced by the decoder
    pub frames_decoded: u64,
    /// Frames actually shown
    pub frames_presented: u64,
    /// Late frames discarded by the scheduler
    pub frames_dropped: u64,
    /// Achieved frame rate: presented/decoded × nominal fps
    pub achieved_fps: f32,
}

/// Resolves a host-supplied path to a `file://` URI.
///
/// Fails with [`PlaybackError::FileNotFound`] for empty or missing paths -
/// before any pipeline is built or decode context spawned.
pub fn resolve_source(path: &Path) -> Result<String, PlaybackError> {
    if path.as_os_str().is_empty() {
        return Err(PlaybackError::FileNotFound(
            "no video file was specified".to_string(),
        ));
    }
    let absolute = path
        .canonicalize()
        .map_err(|_| PlaybackError::FileNotFound(path.display().to_string()))?;
    Ok(format!("file://{}", absolute.display()))
}

/// A single playback run: one media source, one decode context, one report.
pub struct PlaybackSession {
    config: SessionConfig,
    media: MediaSource,
    layout: ViewportLayout,
    state: SessionState,
    /// Single-slot frame handoff shared with the decode thread
    slot: Arc<FrameSlot>,
    /// The prerolled decoder, consumed when the decode thread spawns
    decoder: Option<Box<dyn DecoderBackend + Send>>,
    decode_thread: Option<DecodeThread>,
    scheduler: FrameScheduler,
    response: Option<Response>,
    /// Sequence number of the most recently presented frame
    frame_no: u64,
}

impl PlaybackSession {
    /// Opens and prerolls the configured source with the GStreamer backend.
    #[cfg(feature = "backend-gstreamer")]
    pub fn prepare(config: SessionConfig) -> Result<Self, PlaybackError> {
        let uri = resolve_source(&config.source)?;
        tracing::debug!("Preparing playback of {}", uri);
        let decoder = crate::gst::GstDecoder::open(&uri)?;
        Self::prepare_with_decoder(config, Box::new(decoder))
    }

    /// Builds a session around an already-prerolled decoder.
    ///
    /// Used for alternative decode engines and by tests.
    pub fn prepare_with_decoder(
        config: SessionConfig,
        decoder: Box<dyn DecoderBackend + Send>,
    ) -> Result<Self, PlaybackError> {
        let media = decoder.source().clone();
        let layout = ViewportLayout::compute(config.screen_size, media.size(), config.fit_to_screen);
        tracing::info!(
            "Prepared {}x{} @ {:.2}fps, dest {:?} at {:?}",
            media.width,
            media.height,
            media.frame_rate,
            layout.dest,
            layout.offset
        );
        Ok(Self {
            config,
            media,
            layout,
            state: SessionState::Prerolled,
            slot: Arc::new(FrameSlot::new()),
            decoder: Some(decoder),
            decode_thread: None,
            scheduler: FrameScheduler::new(),
            response: None,
            frame_no: 0,
        })
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the opened source metadata.
    pub fn media(&self) -> &MediaSource {
        &self.media
    }

    /// Returns the computed presentation geometry.
    pub fn layout(&self) -> &ViewportLayout {
        &self.layout
    }

    /// Returns the current playback position.
    pub fn position(&self) -> Duration {
        self.scheduler.position()
    }

    /// Returns a snapshot of the frame counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.scheduler.stats().snapshot(self.media.frame_rate)
    }

    /// Pauses playback. No-op unless currently Playing.
    pub fn pause(&mut self) {
        if self.state != SessionState::Playing {
            return;
        }
        if let Some(thread) = &self.decode_thread {
            thread.pause();
        }
        self.scheduler.pause();
        self.state = SessionState::Paused;
        tracing::debug!("Playback paused at {:?}", self.scheduler.position());
    }

    /// Resumes playback. No-op unless currently Paused.
    pub fn unpause(&mut self) {
        if self.state != SessionState::Paused {
            return;
        }
        if let Some(thread) = &self.decode_thread {
            thread.play();
        }
        self.scheduler.resume();
        self.state = SessionState::Playing;
        tracing::debug!("Playback resumed at {:?}", self.scheduler.position());
    }

    /// Runs playback to completion.
    ///
    /// Ticks once per rendered frame until a stop condition fires, then
    /// tears down. Teardown - decode thread join, pipeline release, backend
    /// release - runs on every exit path, so an error return means the
    /// session is already [`SessionState::Closed`].
    pub fn run(
        &mut self,
        backend: &mut dyn PresentationBackend,
        mut handler: Option<&mut (dyn EventHandler + '_)>,
        mut frame_log: Option<&mut (dyn FrameLogSink + '_)>,
    ) -> Result<PlaybackReport, PlaybackError> {
        if self.state != SessionState::Prerolled {
            return Err(PlaybackError::Runtime(format!(
                "run() called in state {:?}",
                self.state
            )));
        }

        if let Err(e) = backend.prepare_for_playback(&self.layout) {
            self.close();
            return Err(e);
        }
        let outcome = self.run_loop(backend, handler.as_deref_mut(), frame_log.as_deref_mut());
        backend.playback_finished();
        self.close();

        outcome?;
        Ok(self.report())
    }

    /// The main presentation/input loop.
    fn run_loop(
        &mut self,
        backend: &mut dyn PresentationBackend,
        mut handler: Option<&mut (dyn EventHandler + '_)>,
        mut frame_log: Option<&mut (dyn FrameLogSink + '_)>,
    ) -> Result<(), PlaybackError> {
        let decoder = self
            .decoder
            .take()
            .ok_or_else(|| PlaybackError::Runtime("decoder already consumed".to_string()))?;
        let thread = DecodeThread::spawn(decoder, Arc::clone(&self.slot));

        // Startup gate: the decode context must report running before
        // playback begins.
        let mut attempts = 0u32;
        while !thread.is_running() {
            if attempts >= STARTUP_RETRIES {
                tracing::error!("Decode context failed to start");
                self.decode_thread = Some(thread);
                return Err(PlaybackError::StartupTimeout);
            }
            thread::sleep(STARTUP_RETRY_INTERVAL);
            attempts += 1;
        }

        thread.set_muted(!self.config.play_audio);
        thread.play();
        self.decode_thread = Some(thread);
        self.scheduler.start();
        self.state = SessionState::Playing;
        tracing::info!("Starting video playback: {}", self.media.uri);

        let router = InputRouter::new(self.config.duration);

        while self.state.is_running() {
            self.process_pipeline_events()?;
            if !self.state.is_running() {
                break;
            }

            // Frame delivery: at most one frame is in flight, so a single
            // take per tick keeps pace with the decoder.
            let mut presented = None;
            if let Some(frame) = self.slot.take_timeout(TICK_TIMEOUT) {
                match self.scheduler.schedule(&frame) {
                    FrameDisposition::Present => {
                        self.frame_no = frame.sequence;
                        backend.handle_frame(&frame);
                        presented = Some(frame.sequence);
                    }
                    FrameDisposition::Drop => {}
                }
            }
            backend.draw_buffer();
            backend.pump_events();

            // Natural end: the decoder finished and the last frame has been
            // consumed. Loop mode restarts from the EOS event instead.
            if !self.config.loop_playback && self.slot.is_eos() && self.slot.is_empty() {
                tracing::debug!("End of stream: stopping");
                self.state = SessionState::Stopping;
                continue;
            }

            if self.config.log_frames && self.state == SessionState::Playing {
                if let (Some(sequence), Some(sink)) = (presented, frame_log.as_deref_mut()) {
                    if sink.connected() {
                        let message = format!("videoframe {sequence}");
                        sink.log(&message);
                        sink.status_msg(&message);
                    }
                }
            }

            let events = backend.poll_input();
            if contains_escape(&events) {
                tracing::info!("Escape pressed: aborting playback");
                return Err(PlaybackError::UserAbort);
            }

            if let Some(h) = handler.as_deref_mut() {
                let run_now = match self.config.handler_trigger {
                    HandlerTrigger::AfterEveryFrame => true,
                    HandlerTrigger::OnKeypress => !events.is_empty(),
                };
                if run_now {
                    let mut ctx =
                        ScriptContext::new(self.frame_no, self.config.screen_size, &events);
                    let continue_playback = run_handler(h, &mut ctx)?;
                    match ctx.pause_request() {
                        Some(true) => self.pause(),
                        Some(false) => self.unpause(),
                        None => {}
                    }
                    if !continue_playback {
                        tracing::debug!("Event handler ended playback");
                        self.state = SessionState::Stopping;
                        continue;
                    }
                }
            } else if let RouteOutcome::Stop(response) =
                router.route(&events, self.scheduler.position())
            {
                tracing::debug!("Input ended playback: {:?}", response.event);
                self.response = Some(response);
                self.state = SessionState::Stopping;
                continue;
            }

            // The duration limit is suspended while paused
            if self.state == SessionState::Playing
                && self.config.duration.expired(self.scheduler.position())
            {
                tracing::debug!("Duration limit reached at {:?}", self.scheduler.position());
                self.state = SessionState::Stopping;
            }
        }

        Ok(())
    }

    /// Applies queued bus events: EOS (loop or stop) and pipeline errors.
    fn process_pipeline_events(&mut self) -> Result<(), PlaybackError> {
        while let Some(event) = self.decode_thread.as_ref().and_then(|t| t.poll_event()) {
            match event {
                PipelineEvent::EndOfStream => {
                    if self.config.loop_playback {
                        tracing::debug!("End of stream: looping back to start");
                        if let Some(thread) = &self.decode_thread {
                            thread.seek_to_start();
                            thread.play();
                        }
                        self.scheduler.rewind();
                    }
                    // Without looping, the main loop stops once the slot has
                    // drained; acting here could lose the final frame.
                }
                PipelineEvent::Error(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Tears the session down. Idempotent: the second and later calls are
    /// no-ops.
    ///
    /// Stops and joins the decode thread, releases the pipeline (dropping
    /// the decoder sets it to Null), and freezes the clock. Runs on every
    /// exit path, including all error paths.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Stopping;
        self.slot.stop();
        if let Some(thread) = self.decode_thread.take() {
            thread.stop();
            drop(thread); // joins
        }
        // Release a pipeline that was prerolled but never started
        self.decoder = None;
        self.scheduler.pause();
        self.state = SessionState::Closed;
        tracing::debug!("Playback session closed");
    }

    fn report(&self) -> PlaybackReport {
        let snapshot = self.stats();
        PlaybackReport {
            response: self.response.clone(),
            frames_decoded: snapshot.frames_decoded,
            frames_presented: snapshot.frames_presented,
            frames_dropped: snapshot.frames_dropped,
            achieved_fps: snapshot.achieved_fps,
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_source_missing_file() {
        let err = resolve_source(Path::new("/nonexistent/clip.mp4")).unwrap_err();
        assert!(matches!(err, PlaybackError::FileNotFound(_)));
    }

    #[test]
    fn test_resolve_source_empty_path() {
        let err = resolve_source(Path::new("")).unwrap_err();
        assert!(matches!(err, PlaybackError::FileNotFound(_)));
    }

    #[test]
    fn test_resolve_source_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let uri = resolve_source(file.path()).unwrap();
        assert!(uri.starts_with("file:///"));
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::new("/tmp/clip.mp4", (800, 600));
        assert!(config.fit_to_screen);
        assert!(config.play_audio);
        assert!(!config.loop_playback);
        assert_eq!(config.duration, DurationLimit::KeyPress);
        assert_eq!(config.handler_trigger, HandlerTrigger::OnKeypress);
        assert!(!config.log_frames);

        let config = config
            .with_duration(DurationLimit::Seconds(3.0))
            .with_loop(true)
            .with_audio(false)
            .with_frame_log(true);
        assert_eq!(config.duration, DurationLimit::Seconds(3.0));
        assert!(config.loop_playback);
        assert!(!config.play_audio);
        assert!(config.log_frames);
    }
}
