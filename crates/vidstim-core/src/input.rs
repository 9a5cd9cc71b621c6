//! Input events, duration limits, and default response routing.
//!
//! Each tick of the presentation loop drains the backend's input queue and
//! routes the collected events. In default mode a key press or mouse click
//! can end playback (depending on the configured duration limit); escape
//! always aborts, in any mode.

use std::str::FromStr;
use std::time::Duration;

use crate::video::PlaybackError;

/// A single user input event collected between frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A key press, identified by its backend-reported name
    Key(String),
    /// A mouse button press, numbered 1 (left), 2 (middle), 3 (right), …
    MouseButton(u8),
}

impl InputEvent {
    /// Returns true for the escape key, which always aborts playback.
    pub fn is_escape(&self) -> bool {
        matches!(self, InputEvent::Key(name) if name.eq_ignore_ascii_case("escape"))
    }
}

/// Returns true if any collected event is an escape press.
pub fn contains_escape(events: &[InputEvent]) -> bool {
    events.iter().any(InputEvent::is_escape)
}

/// When playback should end, absent a custom event handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationLimit {
    /// Stop after this many seconds of playback
    Seconds(f64),
    /// Stop at the first key press
    KeyPress,
    /// Stop at the first mouse click
    MouseClick,
}

impl DurationLimit {
    /// Returns true once the playback clock has exceeded a seconds limit.
    ///
    /// Key/mouse limits never expire on the clock.
    pub fn expired(&self, position: Duration) -> bool {
        match self {
            DurationLimit::Seconds(secs) => position.as_secs_f64() >= *secs,
            DurationLimit::KeyPress | DurationLimit::MouseClick => false,
        }
    }
}

impl FromStr for DurationLimit {
    type Err = PlaybackError;

    /// Parses the host's duration field: a number of seconds, "keypress",
    /// or "mouseclick".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keypress" => Ok(DurationLimit::KeyPress),
            "mouseclick" => Ok(DurationLimit::MouseClick),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|secs| *secs >= 0.0 && secs.is_finite())
                .map(DurationLimit::Seconds)
                .ok_or_else(|| {
                    PlaybackError::Runtime(format!(
                        "Invalid duration '{s}': expected seconds, 'keypress' or 'mouseclick'"
                    ))
                }),
        }
    }
}

/// The response recorded when an input event ends playback.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The event that ended playback
    pub event: InputEvent,
    /// Playback position when the event was routed
    pub timestamp: Duration,
}

/// Outcome of routing one tick's worth of input.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Keep playing
    Continue,
    /// Stop playback, recording the triggering event as the response
    Stop(Response),
}

/// Default-mode input router.
///
/// Inspects collected events against the duration limit: the first matching
/// event stops playback and becomes the session's response. Escape handling
/// lives outside the router ([`contains_escape`]) because it applies in
/// custom-handler mode too.
#[derive(Debug, Clone, Copy)]
pub struct InputRouter {
    limit: DurationLimit,
}

impl InputRouter {
    /// Creates a router for the configured duration limit.
    pub fn new(limit: DurationLimit) -> Self {
        Self { limit }
    }

    /// Routes the events collected this tick.
    pub fn route(&self, events: &[InputEvent], position: Duration) -> RouteOutcome {
        for event in events {
            let stops = match (&self.limit, event) {
                (DurationLimit::KeyPress, InputEvent::Key(_)) => true,
                (DurationLimit::MouseClick, InputEvent::MouseButton(_)) => true,
                _ => false,
            };
            if stops {
                return RouteOutcome::Stop(Response {
                    event: event.clone(),
                    timestamp: position,
                });
            }
        }
        RouteOutcome::Continue
    }
}
