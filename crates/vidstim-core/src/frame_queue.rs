//! Frame handoff between the decode thread and the presentation loop.
//!
//! A single-slot mailbox carries decoded frames from the decode thread to
//! the main loop, and an ordered event channel carries bus-level messages
//! (end of stream, pipeline errors). At most one undelivered frame exists at
//! any time: the scheduler consumes every frame it is offered (presenting or
//! dropping it), so the slot never queues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::video::{DecoderBackend, PlaybackError, VideoFrame};

/// How long the decode thread waits for a command while paused.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Commands sent to the decode thread.
#[derive(Debug, Clone)]
pub enum DecodeCommand {
    /// Start or resume decoding
    Play,
    /// Pause decoding
    Pause,
    /// Flush-seek back to the start of the stream (loop restart)
    SeekToStart,
    /// Stop the decode thread
    Stop,
    /// Toggle audio output
    SetMuted(bool),
}

/// Messages delivered from the decode context to the session, in order.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The decoder reached end of stream
    EndOfStream,
    /// The pipeline reported a fatal error; playback must stop
    Error(PlaybackError),
}

/// A single-slot mailbox for decoded frames.
///
/// The producer (decode thread) blocks in [`put`](FrameSlot::put) while the
/// slot is occupied; the consumer (presentation loop) takes frames with
/// [`take`](FrameSlot::take) or [`take_timeout`](FrameSlot::take_timeout).
/// [`stop`](FrameSlot::stop) wakes both sides so shutdown never deadlocks.
pub struct FrameSlot {
    /// The frame waiting to be consumed, if any
    frame: Mutex<Option<VideoFrame>>,
    /// Signals the consumer that a frame arrived
    frame_available: Condvar,
    /// Signals the producer that the slot emptied
    space_available: Condvar,
    /// Set while the slot is being flushed (loop restart)
    flushing: AtomicBool,
    /// Set when the decoder reached end of stream
    eos: AtomicBool,
    /// Set on shutdown
    stopped: AtomicBool,
}

impl FrameSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self {
            frame: Mutex::new(None),
            frame_available: Condvar::new(),
            space_available: Condvar::new(),
            flushing: AtomicBool::new(false),
            eos: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Hands a frame to the consumer, blocking while the slot is occupied.
    ///
    /// Returns false if the slot is flushing or stopped; the frame is
    /// discarded in that case.
    pub fn put(&self, frame: VideoFrame) -> bool {
        let mut slot = self.frame.lock();

        while slot.is_some() {
            if self.flushing.load(Ordering::Acquire) || self.stopped.load(Ordering::Acquire) {
                return false;
            }
            self.space_available.wait(&mut slot);
        }

        // Check again after waiting
        if self.flushing.load(Ordering::Acquire) || self.stopped.load(Ordering::Acquire) {
            return false;
        }

        *slot = Some(frame);
        self.frame_available.notify_one();
        true
    }

    /// Takes the pending frame without blocking.
    pub fn take(&self) -> Option<VideoFrame> {
        let mut slot = self.frame.lock();
        let frame = slot.take();
        if frame.is_some() {
            self.space_available.notify_one();
        }
        frame
    }

    /// Takes the pending frame, waiting up to `timeout` for one to arrive.
    pub fn take_timeout(&self, timeout: Duration) -> Option<VideoFrame> {
        let mut slot = self.frame.lock();

        if slot.is_none() {
            if self.eos.load(Ordering::Acquire) || self.stopped.load(Ordering::Acquire) {
                return None;
            }
            let result = self.frame_available.wait_for(&mut slot, timeout);
            if result.timed_out() && slot.is_none() {
                return None;
            }
        }

        let frame = slot.take();
        if frame.is_some() {
            self.space_available.notify_one();
        }
        frame
    }

    /// Returns true if no frame is pending.
    pub fn is_empty(&self) -> bool {
        self.frame.lock().is_none()
    }

    /// Discards any pending frame and resets the end-of-stream flag.
    ///
    /// Used on loop restart: flushing is raised first so a blocked producer
    /// bails out instead of refilling the slot mid-flush.
    pub fn flush(&self) {
        self.flushing.store(true, Ordering::Release);
        self.space_available.notify_all();

        let dropped = self.frame.lock().take().is_some();
        if dropped {
            tracing::debug!("FrameSlot::flush: discarded pending frame");
        }

        self.eos.store(false, Ordering::Release);
        self.flushing.store(false, Ordering::Release);
    }

    /// Marks that end of stream has been reached.
    pub fn set_eos(&self) {
        self.eos.store(true, Ordering::Release);
        self.frame_available.notify_all();
    }

    /// Returns true if end of stream has been reached.
    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::Acquire)
    }

    /// Stops the slot, waking any blocked producer or consumer.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.space_available.notify_all();
        self.frame_available.notify_all();
    }

    /// Returns true once the slot has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// The decode/bus-processing execution context.
///
/// Exactly one is spawned per session, when the session enters Playing. It
/// pulls frames from the decoder, hands them through the [`FrameSlot`], and
/// forwards bus-level events on an ordered channel. Its lifetime is bounded
/// by the session: [`stop`](DecodeThread::stop) plus drop joins the thread.
pub struct DecodeThread {
    /// Handle to the decode thread
    handle: Option<JoinHandle<()>>,
    /// Channel to send commands to the decode thread
    command_tx: crossbeam_channel::Sender<DecodeCommand>,
    /// Ordered bus events (EOS, errors) from the decode thread
    event_rx: crossbeam_channel::Receiver<PipelineEvent>,
    /// The slot being filled
    slot: Arc<FrameSlot>,
    /// Flag to signal the thread should stop
    stop_flag: Arc<AtomicBool>,
    /// Set by the thread once its loop is running (startup gate)
    running: Arc<AtomicBool>,
}

impl DecodeThread {
    /// Spawns the decode thread for a prerolled decoder.
    ///
    /// The thread starts paused; send [`play`](DecodeThread::play) to begin
    /// decoding.
    pub fn spawn<D: DecoderBackend + Send + 'static>(decoder: D, slot: Arc<FrameSlot>) -> Self {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(false));

        let thread_slot = Arc::clone(&slot);
        let thread_stop = Arc::clone(&stop_flag);
        let thread_running = Arc::clone(&running);

        let handle = thread::spawn(move || {
            decode_loop(
                decoder,
                thread_slot,
                command_rx,
                event_tx,
                thread_stop,
                thread_running,
            );
        });

        Self {
            handle: Some(handle),
            command_tx,
            event_rx,
            slot,
            stop_flag,
            running,
        }
    }

    /// Returns true once the decode loop has started running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts or resumes decoding.
    pub fn play(&self) {
        let _ = self.command_tx.send(DecodeCommand::Play);
    }

    /// Pauses decoding.
    pub fn pause(&self) {
        let _ = self.command_tx.send(DecodeCommand::Pause);
    }

    /// Flush-seeks to the start of the stream for a loop restart.
    pub fn seek_to_start(&self) {
        let _ = self.command_tx.send(DecodeCommand::SeekToStart);
    }

    /// Toggles audio output.
    pub fn set_muted(&self, muted: bool) {
        let _ = self.command_tx.send(DecodeCommand::SetMuted(muted));
    }

    /// Takes the next pending pipeline event, if any.
    pub fn poll_event(&self) -> Option<PipelineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Stops the decode thread.
    ///
    /// The slot is stopped first so a producer blocked in `put()` wakes up
    /// and observes the stop, preventing a shutdown deadlock.
    pub fn stop(&self) {
        self.slot.stop();
        self.stop_flag.store(true, Ordering::Release);
        let _ = self.command_tx.send(DecodeCommand::Stop);
    }
}

impl Drop for DecodeThread {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Result of processing a decode command.
enum CommandResult {
    /// Continue processing, optionally updating the playing state
    Continue(Option<bool>),
    /// Stop the decode loop
    Stop,
}

/// Processes a single decode command.
fn process_command<D: DecoderBackend>(
    cmd: DecodeCommand,
    decoder: &mut D,
    slot: &FrameSlot,
    event_tx: &crossbeam_channel::Sender<PipelineEvent>,
) -> CommandResult {
    match cmd {
        DecodeCommand::Stop => return CommandResult::Stop,
        DecodeCommand::Play => {
            if let Err(e) = decoder.resume() {
                tracing::error!("Failed to resume decoder: {}", e);
            }
            return CommandResult::Continue(Some(true));
        }
        DecodeCommand::Pause => {
            if let Err(e) = decoder.pause() {
                tracing::error!("Failed to pause decoder: {}", e);
            }
            return CommandResult::Continue(Some(false));
        }
        DecodeCommand::SeekToStart => {
            slot.flush();
            if let Err(e) = decoder.seek_to_start() {
                // A failed restart is as terminal as any pipeline error
                tracing::error!("Loop restart seek failed: {}", e);
                let _ = event_tx.send(PipelineEvent::Error(e));
            }
        }
        DecodeCommand::SetMuted(muted) => {
            if let Err(e) = decoder.set_muted(muted) {
                tracing::error!("Failed to set muted: {}", e);
            }
        }
    }
    CommandResult::Continue(None)
}

/// The main decode loop running on the decode thread.
fn decode_loop<D: DecoderBackend>(
    mut decoder: D,
    slot: Arc<FrameSlot>,
    command_rx: crossbeam_channel::Receiver<DecodeCommand>,
    event_tx: crossbeam_channel::Sender<PipelineEvent>,
    stop_flag: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) {
    let mut playing = false;
    running.store(true, Ordering::Release);
    tracing::debug!("Decode loop started");

    loop {
        if stop_flag.load(Ordering::Acquire) {
            break;
        }

        // Process commands (non-blocking)
        while let Ok(cmd) = command_rx.try_recv() {
            match process_command(cmd, &mut decoder, &slot, &event_tx) {
                CommandResult::Stop => return,
                CommandResult::Continue(Some(new_playing)) => playing = new_playing,
                CommandResult::Continue(None) => {}
            }
        }

        // When paused, wait for commands instead of spinning
        if !playing {
            let cmd = match command_rx.recv_timeout(IDLE_POLL_INTERVAL) {
                Ok(cmd) => cmd,
                Err(_) => continue,
            };
            match process_command(cmd, &mut decoder, &slot, &event_tx) {
                CommandResult::Stop => return,
                CommandResult::Continue(Some(new_playing)) => playing = new_playing,
                CommandResult::Continue(None) => {}
            }
            continue;
        }

        match decoder.decode_next() {
            Ok(Some(frame)) => {
                if !slot.put(frame) {
                    tracing::debug!("Frame rejected by slot (flushing or stopped)");
                }
            }
            Ok(None) if decoder.is_eof() => {
                slot.set_eos();
                let _ = event_tx.send(PipelineEvent::EndOfStream);
                playing = false;
                tracing::debug!("End of stream reported by decoder");
            }
            Ok(None) => {
                // Nothing ready yet; give the pipeline room to breathe
                thread::sleep(Duration::from_millis(2));
            }
            Err(e) => {
                tracing::error!("Decode error: {}", e);
                let _ = event_tx.send(PipelineEvent::Error(e));
                return;
            }
        }
    }
}
