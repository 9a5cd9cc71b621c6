//! Per-frame forwarding to an external gaze/event logger.
//!
//! Experiment rigs often record which video frame was on screen when a gaze
//! sample was taken. When a sink is configured and connected, the session
//! sends `videoframe {n}` as both a log line and a status message once per
//! presented frame while playback is not paused.

/// An external logger that receives per-frame notifications.
pub trait FrameLogSink {
    /// Returns true if the logger is connected and should receive messages.
    fn connected(&self) -> bool {
        true
    }

    /// Records a log line.
    fn log(&mut self, message: &str);

    /// Updates the logger's live status display.
    fn status_msg(&mut self, message: &str);
}

/// A sink that forwards frame notifications to the tracing subscriber.
///
/// Useful as a stand-in when no hardware logger is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFrameLog;

impl FrameLogSink for TracingFrameLog {
    fn log(&mut self, message: &str) {
        tracing::debug!(target: "vidstim::framelog", "{}", message);
    }

    fn status_msg(&mut self, message: &str) {
        tracing::trace!(target: "vidstim::framelog", status = true, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_sink_receives_both_channels() {
        let mut sink = MemorySink::default();
        sink.log("videoframe 3");
        sink.status_msg("videoframe 3");
        assert_eq!(sink.lines, vec!["videoframe 3"]);
        assert_eq!(sink.statuses, vec!["videoframe 3"]);
        assert!(sink.connected());
    }
}
