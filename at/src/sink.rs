//! Collaborators notified by the modem reader.
//!
//! All of them are called from the reader thread, so implementations should
//! hand long work (playing a tone) off to their own thread.

use std::time::Duration;
use tracing::debug;

/// Audible alert for incoming calls.
pub trait AlertSink: Send {
    /// Plays a tone of `frequency_hz` for `duration`.
    fn ring(&mut self, duration: Duration, frequency_hz: f64);
}

/// Receives sanitized modem traffic.
pub trait LogSink: Send {
    /// Records a chunk of traffic. Chunks do not align with lines.
    fn log(&mut self, text: &str);
}

/// Brings the user interface to the front.
pub trait UiSink: Send {
    /// Called on every incoming ring.
    fn show(&mut self);
}

/// Everything the reader talks to besides the modem.
pub struct Collaborators {
    /// Incoming call tone.
    pub alert: Box<dyn AlertSink>,
    /// Traffic log.
    pub log: Box<dyn LogSink>,
    /// User interface.
    pub ui: Box<dyn UiSink>,
}

impl Collaborators {
    /// Boxes the three collaborators.
    pub fn new(
        alert: impl AlertSink + 'static,
        log: impl LogSink + 'static,
        ui: impl UiSink + 'static,
    ) -> Self {
        Self {
            alert: Box::new(alert),
            log: Box::new(log),
            ui: Box::new(ui),
        }
    }
}

/// Emits modem traffic as `tracing` events under the `modem` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&mut self, text: &str) {
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            debug!(target: "modem", "{}", line.trim_end_matches('\r'));
        }
    }
}
