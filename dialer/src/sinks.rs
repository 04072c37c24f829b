//! Terminal implementations of the reader collaborators.

use rhizo_at::{AlertSink, UiSink};
use std::{
    io::{self, Write as _},
    time::Duration,
};
use tracing::{info, warn};

/// Rings the terminal bell.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl AlertSink for TerminalBell {
    fn ring(&mut self, duration: Duration, frequency_hz: f64) {
        info!(?duration, frequency_hz, "ringing");
        let mut stderr = io::stderr().lock();
        if let Err(err) = stderr.write_all(b"\x07").and_then(|()| stderr.flush()) {
            warn!("couldn't ring terminal bell: {err}");
        }
    }
}

/// Announces incoming calls on stdout.
#[derive(Debug, Default)]
pub struct Banner {
    rings: u32,
}

impl UiSink for Banner {
    fn show(&mut self) {
        self.rings += 1;
        println!("*** incoming call (ring {}) ***", self.rings);
    }
}
