use super::{cfsetspeed, fcntl, ioctl, tcdrain, tcflush, tcgetattr, tcsetattr};
use crate::{
    Error,
    baud::{self, BaudRateEntry, LineSpeed},
};
use libc::{
    CLOCAL, CREAD, CRTSCTS, CSTOPB, F_GETFL, F_SETFL, INPCK, IXANY, IXOFF, O_NOCTTY, O_NONBLOCK,
    TCIFLUSH, TCSANOW, TIOCEXCL, TIOCM_DTR, TIOCM_RTS, TIOCMBIS, VMIN, VTIME, c_int, termios,
};
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    mem,
    os::{
        fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd},
        unix::fs::OpenOptionsExt,
    },
    path::Path,
    ptr,
};
use tracing::debug;

/// Bi-directional modem line.
///
/// Every clone has its own descriptor for the same open line.
#[derive(Debug)]
pub struct Device {
    file: File,
}

impl Device {
    /// Opens a serial device for exclusive use.
    ///
    /// The device is opened non-blocking so that a missing carrier does not
    /// hang the call, then marked with `TIOCEXCL` so no other process can open
    /// it while we hold it.
    pub fn open<T: AsRef<Path>>(path: T) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(O_NOCTTY | O_NONBLOCK)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.to_owned(),
                source,
            })?;
        unsafe { ioctl(file.as_raw_fd(), TIOCEXCL, ptr::null_mut()) }.map_err(|source| {
            Error::Exclusive {
                path: path.to_owned(),
                source,
            }
        })?;
        debug!(path = %path.display(), "opened modem device");

        Ok(Self { file })
    }

    /// Programs the line speed named `baud_name` and switches the line to raw
    /// 8N1 with `VMIN=1`, `VTIME=0`.
    ///
    /// Afterwards the descriptor is in blocking mode: a read returns as soon as
    /// one byte is available.
    pub fn configure(&mut self, baud_name: &str) -> Result<&'static BaudRateEntry, Error> {
        let entry = baud::find(baud_name)?;
        self.apply(entry).map_err(|source| Error::Configure {
            baud: entry.name(),
            source,
        })?;
        debug!(baud = entry.name(), custom = entry.is_custom(), "configured modem line");
        Ok(entry)
    }

    fn apply(&mut self, entry: &BaudRateEntry) -> io::Result<()> {
        let fd = self.file.as_raw_fd();
        let mut termios: termios = unsafe { mem::zeroed() };
        unsafe { tcgetattr(fd, &mut termios)? };
        make_raw(&mut termios);
        let standard = match entry.speed {
            LineSpeed::Standard(speed) => speed,
            // Placeholder until the custom rate is applied below.
            LineSpeed::Custom(_) => libc::B38400,
        };
        unsafe { cfsetspeed(&mut termios, standard)? };
        unsafe { tcsetattr(fd, TCSANOW, &termios)? };

        if let LineSpeed::Custom(rate) = entry.speed {
            set_custom_speed(fd, rate)?;
        }

        let mut bits: c_int = TIOCM_DTR | TIOCM_RTS;
        unsafe { ioctl(fd, TIOCMBIS, ptr::addr_of_mut!(bits).cast())? };
        unsafe { tcflush(fd, TCIFLUSH)? };

        let flags = unsafe { fcntl(fd, F_GETFL, 0)? };
        unsafe { fcntl(fd, F_SETFL, flags & !O_NONBLOCK)? };
        Ok(())
    }

    /// Duplicates the descriptor. Both handles refer to the same open line.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
        })
    }
}

/// Raw 8N1 without flow control; reads return after one byte.
fn make_raw(termios: &mut termios) {
    unsafe { libc::cfmakeraw(termios) };
    termios.c_cflag &= !(CSTOPB | CRTSCTS);
    #[cfg(target_os = "linux")]
    {
        termios.c_cflag &= !libc::CMSPAR;
    }
    termios.c_cflag |= CLOCAL | CREAD;
    termios.c_iflag &= !(INPCK | IXOFF | IXANY);
    termios.c_cc[VMIN] = 1;
    termios.c_cc[VTIME] = 0;
}

#[cfg(target_os = "linux")]
fn set_custom_speed(fd: c_int, rate: u32) -> io::Result<()> {
    let mut termios: libc::termios2 = unsafe { mem::zeroed() };
    unsafe { ioctl(fd, libc::TCGETS2 as _, ptr::addr_of_mut!(termios).cast())? };
    termios.c_cflag &= !libc::CBAUD;
    termios.c_cflag |= libc::BOTHER;
    termios.c_ispeed = rate;
    termios.c_ospeed = rate;
    unsafe { ioctl(fd, libc::TCSETS2 as _, ptr::addr_of_mut!(termios).cast()) }
}

#[cfg(not(target_os = "linux"))]
fn set_custom_speed(_fd: c_int, rate: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("non-standard rate {rate} needs termios2"),
    ))
}

impl From<OwnedFd> for Device {
    fn from(fd: OwnedFd) -> Self {
        Self {
            file: File::from(fd),
        }
    }
}

impl AsFd for Device {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for Device {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Read for Device {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for Device {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    /// Waits until everything written has been transmitted.
    fn flush(&mut self) -> io::Result<()> {
        unsafe { tcdrain(self.file.as_raw_fd()) }
    }
}
