use std::{io, path::PathBuf};
use thiserror::Error;

/// Serial transport error.
#[derive(Error, Debug)]
pub enum Error {
    /// The device node could not be opened.
    #[error("failed to open serial device `{}`", .path.display())]
    Open {
        /// Device path.
        path: PathBuf,
        /// OS error.
        source: io::Error,
    },
    /// Another process holds the device, or the kernel refused `TIOCEXCL`.
    #[error("failed to claim exclusive access to `{}`", .path.display())]
    Exclusive {
        /// Device path.
        path: PathBuf,
        /// OS error.
        source: io::Error,
    },
    /// The name is not in the baud table.
    #[error("baud rate `{0}` is not known")]
    UnknownBaudRate(String),
    /// The OS rejected the requested line settings.
    #[error("failed to apply line settings for baud rate `{baud}`")]
    Configure {
        /// Baud rate name.
        baud: &'static str,
        /// OS error.
        source: io::Error,
    },
}
