//! AT command engine for serial modems.
//!
//! The modem line has exactly one reader: the thread started by
//! [`Channel::spawn`]. It frames responses, pulls unsolicited `RING`s out of
//! the stream and hands each completed reply to the [`Modem`] call waiting for
//! it.

#![warn(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod channel;
pub mod command;
mod error;
pub mod framer;
mod modem;
pub mod result;
pub mod sanitize;
pub mod sink;

pub use self::{
    channel::{Channel, Notification},
    command::{Command, PhoneActivity, PhoneNumber},
    error::Error,
    framer::{FrameError, Framer, Response},
    modem::{Modem, ModemConfig},
    result::{classify, FinalResult},
    sink::{AlertSink, Collaborators, LogSink, TracingLog, UiSink},
};

use libc::{c_int, c_uint, nfds_t, pollfd};
use std::io;

unsafe fn eventfd(init: c_uint, flags: c_int) -> io::Result<c_int> {
    let fd = unsafe { libc::eventfd(init, flags) };
    if fd == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

unsafe fn poll(fds: *mut pollfd, nfds: nfds_t, timeout: c_int) -> io::Result<c_int> {
    let result = unsafe { libc::poll(fds, nfds, timeout) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(result)
    }
}
