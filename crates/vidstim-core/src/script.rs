//! Caller-supplied event handling between frames.
//!
//! Hosts can install a custom handler that runs once per tick (or once per
//! collected event). The handler sees a narrow capability surface - current
//! frame number, screen size, the events collected since the last tick, and
//! pause/unpause - and returns a continuation flag. Handler errors and
//! panics become [`PlaybackError::ScriptFailure`] and terminate playback;
//! they are never silently swallowed.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;

use crate::input::InputEvent;
use crate::video::PlaybackError;

/// When the custom handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerTrigger {
    /// Only on ticks that collected at least one input event
    OnKeypress,
    /// On every tick
    AfterEveryFrame,
}

impl FromStr for HandlerTrigger {
    type Err = PlaybackError;

    /// Parses the host's trigger field: "on keypress" or "after every frame".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on keypress" => Ok(HandlerTrigger::OnKeypress),
            "after every frame" => Ok(HandlerTrigger::AfterEveryFrame),
            other => Err(PlaybackError::Runtime(format!(
                "Invalid event handler trigger '{other}'"
            ))),
        }
    }
}

/// The capability surface exposed to a custom handler.
///
/// Pause requests are deferred: the session applies the last one after the
/// handler returns, so a handler can never observe a half-transitioned
/// state.
pub struct ScriptContext<'a> {
    /// Sequence number of the most recently presented frame
    pub frame_no: u64,
    /// Output surface width in pixels
    pub screen_width: u32,
    /// Output surface height in pixels
    pub screen_height: u32,
    /// Events collected since the last tick, in arrival order
    pub events: &'a [InputEvent],
    pause_request: Option<bool>,
}

impl<'a> ScriptContext<'a> {
    /// Creates a context for one handler invocation.
    pub fn new(
        frame_no: u64,
        screen: (u32, u32),
        events: &'a [InputEvent],
    ) -> Self {
        Self {
            frame_no,
            screen_width: screen.0,
            screen_height: screen.1,
            events,
            pause_request: None,
        }
    }

    /// Requests that playback pause after this handler returns.
    pub fn pause(&mut self) {
        self.pause_request = Some(true);
    }

    /// Requests that playback resume after this handler returns.
    pub fn unpause(&mut self) {
        self.pause_request = Some(false);
    }

    /// Returns the pending pause request, if the handler made one.
    pub fn pause_request(&self) -> Option<bool> {
        self.pause_request
    }
}

/// Error type a handler can return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A caller-supplied event handler.
///
/// Returning `Ok(true)` continues playback, anything else stops it: a
/// `false` is a clean stop, an error terminates the session with
/// [`PlaybackError::ScriptFailure`].
pub trait EventHandler {
    fn handle(&mut self, ctx: &mut ScriptContext<'_>) -> Result<bool, HandlerError>;
}

impl<F> EventHandler for F
where
    F: FnMut(&mut ScriptContext<'_>) -> Result<bool, HandlerError>,
{
    fn handle(&mut self, ctx: &mut ScriptContext<'_>) -> Result<bool, HandlerError> {
        self(ctx)
    }
}

/// Runs a handler, converting errors and panics into `ScriptFailure`.
///
/// `AssertUnwindSafe` is sound here: on unwind the handler's state is
/// discarded along with the session, never reused.
pub(crate) fn run_handler(
    handler: &mut dyn EventHandler,
    ctx: &mut ScriptContext<'_>,
) -> Result<bool, PlaybackError> {
    match catch_unwind(AssertUnwindSafe(|| handler.handle(ctx))) {
        Ok(Ok(continue_playback)) => Ok(continue_playback),
        Ok(Err(e)) => Err(PlaybackError::ScriptFailure(e.to_string())),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "event handler panicked".to_string());
            tracing::error!("Caught panic in event handler: {}", message);
            Err(PlaybackError::ScriptFailure(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_parsing() {
        assert_eq!(
            "on keypress".parse::<HandlerTrigger>().unwrap(),
            HandlerTrigger::OnKeypress
        );
        assert_eq!(
            "After Every Frame".parse::<HandlerTrigger>().unwrap(),
            HandlerTrigger::AfterEveryFrame
        );
        assert!("sometimes".parse::<HandlerTrigger>().is_err());
    }

    #[test]
    fn test_handler_continuation_flag() {
        let mut handler =
            |ctx: &mut ScriptContext<'_>| -> Result<bool, HandlerError> { Ok(ctx.frame_no < 10) };

        let mut ctx = ScriptContext::new(5, (800, 600), &[]);
        assert_eq!(run_handler(&mut handler, &mut ctx), Ok(true));

        let mut ctx = ScriptContext::new(10, (800, 600), &[]);
        assert_eq!(run_handler(&mut handler, &mut ctx), Ok(false));
    }

    #[test]
    fn test_handler_error_becomes_script_failure() {
        let mut handler =
            |_: &mut ScriptContext<'_>| -> Result<bool, HandlerError> { Err("bad state".into()) };
        let mut ctx = ScriptContext::new(0, (800, 600), &[]);
        match run_handler(&mut handler, &mut ctx) {
            Err(PlaybackError::ScriptFailure(msg)) => assert!(msg.contains("bad state")),
            other => panic!("Expected ScriptFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_handler_panic_becomes_script_failure() {
        let mut handler =
            |_: &mut ScriptContext<'_>| -> Result<bool, HandlerError> { panic!("boom") };
        let mut ctx = ScriptContext::new(0, (800, 600), &[]);
        match run_handler(&mut handler, &mut ctx) {
            Err(PlaybackError::ScriptFailure(msg)) => assert!(msg.contains("boom")),
            other => panic!("Expected ScriptFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_pause_request_round_trip() {
        let mut ctx = ScriptContext::new(0, (800, 600), &[]);
        assert_eq!(ctx.pause_request(), None);

        ctx.pause();
        assert_eq!(ctx.pause_request(), Some(true));

        ctx.unpause();
        assert_eq!(ctx.pause_request(), Some(false));
    }

    #[test]
    fn test_context_exposes_events() {
        let events = vec![InputEvent::Key("space".into()), InputEvent::MouseButton(1)];
        let mut seen = 0;
        let mut handler = |ctx: &mut ScriptContext<'_>| -> Result<bool, HandlerError> {
            seen = ctx.events.len();
            Ok(true)
        };
        let mut ctx = ScriptContext::new(0, (800, 600), &events);
        run_handler(&mut handler, &mut ctx).unwrap();
        assert_eq!(seen, 2);
    }
}
