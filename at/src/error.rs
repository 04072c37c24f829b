use crate::{FinalResult, FrameError};
use std::{io, time::Duration};
use thiserror::Error;

/// AT engine error.
///
/// [`Error::Rejected`] is the only variant reported by the modem itself; the
/// others mean the line is unusable or the exchange went wrong.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading or writing the line failed.
    #[error("modem i/o failed")]
    Io(#[from] io::Error),

    /// The line reached end of stream.
    #[error("modem closed the line")]
    Eof,

    /// The byte stream could not be framed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// No final result arrived in time.
    #[error("no reply from modem within {0:?}")]
    Timeout(Duration),

    /// The reader ended; no reply will arrive.
    #[error("modem link lost")]
    LinkLost,

    /// The modem answered with a non-`OK` final result.
    #[error("modem answered {result}: {}", .text.trim_end())]
    Rejected {
        /// Final result of the reply.
        result: FinalResult,
        /// Whole reply text.
        text: String,
    },

    /// The dial string contains characters outside the dial pad.
    #[error("invalid phone number `{0}`")]
    InvalidNumber(String),

    /// The reader thread or its wake-up descriptor could not be created.
    #[error("failed to start modem reader")]
    Spawn(#[source] io::Error),
}
