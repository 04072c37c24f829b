//! UART transport for AT modems.
//!
//! [`Device::open`] claims the tty exclusively, [`Device::configure`] programs
//! the line speed from the [`baud`] table and puts the line into raw mode.

#![warn(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod baud;
mod device;
mod error;

pub use self::baud::{BaudRateEntry, LineSpeed};
pub use self::device::Device;
pub use self::error::Error;

use libc::{c_int, c_ulong, c_void, speed_t, termios};
use std::io;

unsafe fn fcntl(fd: c_int, cmd: c_int, arg: c_int) -> io::Result<c_int> {
    let result = unsafe { libc::fcntl(fd, cmd, arg) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(result)
    }
}

unsafe fn tcgetattr(fd: c_int, termios: *mut termios) -> io::Result<()> {
    let result = unsafe { libc::tcgetattr(fd, termios) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

unsafe fn tcsetattr(
    fd: c_int,
    optional_actions: c_int,
    termios: *const termios,
) -> io::Result<()> {
    let result = unsafe { libc::tcsetattr(fd, optional_actions, termios) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

unsafe fn cfsetspeed(termios: *mut termios, speed: speed_t) -> io::Result<()> {
    let result = unsafe { libc::cfsetispeed(termios, speed) };
    if result == -1 {
        return Err(io::Error::last_os_error());
    }
    let result = unsafe { libc::cfsetospeed(termios, speed) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

unsafe fn ioctl(fd: c_int, request: c_ulong, argp: *mut c_void) -> io::Result<()> {
    let result = unsafe { libc::ioctl(fd, request, argp) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

unsafe fn tcflush(fd: c_int, action: c_int) -> io::Result<()> {
    let result = unsafe { libc::tcflush(fd, action) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

unsafe fn tcdrain(fd: c_int) -> io::Result<()> {
    let result = unsafe { libc::tcdrain(fd) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
