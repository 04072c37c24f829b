//! The single reader of the modem line.
//!
//! [`Channel::spawn`] starts the `modem-rx` thread. It blocks in `poll(2)` on
//! the modem and a wake-up eventfd, splits the byte stream into lines and
//! routes what it finds:
//! - `RING` lines go to the collaborators and the notification stream,
//! - completed replies go to the [`Modem`] call waiting for one,
//! - replies nobody waits for are published as [`Notification::Unsolicited`].

use crate::{
    Collaborators, Error, FinalResult, FrameError, Response, classify, eventfd,
    framer::{Accumulator, LineSplitter, READ_CHUNK},
    modem::{Modem, ModemConfig},
    poll,
    sanitize::sanitize,
};
use libc::{pollfd, EFD_CLOEXEC, POLLERR, POLLHUP, POLLIN, POLLNVAL};
use std::{
    fs::File,
    io::{self, Read, Write as _},
    mem,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, trace, warn};

/// Length of the alert tone played on an incoming call.
pub const RING_DURATION: Duration = Duration::from_secs(1);
/// Frequency of the alert tone.
pub const RING_FREQUENCY_HZ: f64 = 440.0;

/// Modem initiated event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// Incoming call.
    Ring,
    /// A complete reply that no command was waiting for, e.g. `NO CARRIER`
    /// after the remote side hung up.
    Unsolicited(Response),
    /// The line failed or was closed; no more traffic will be received.
    LinkLost,
}

pub(crate) type Reply = Result<Response, Error>;

/// What the reader found, before routing.
#[derive(Debug)]
enum Event {
    Ring,
    CommandReply(Reply),
    FatalError,
}

/// Reply hand-off slot shared by the reader and the dispatcher.
#[derive(Debug)]
pub(crate) enum Pending {
    /// Nobody waits; complete replies are unsolicited.
    Idle,
    /// A command waits for its reply.
    Waiting(oneshot::Sender<Reply>),
    /// The waiter gave up; the next reply is stale and gets discarded.
    Abandoned,
    /// The reader is gone.
    Closed,
}

#[derive(Debug)]
pub(crate) struct Shared {
    pending: Mutex<Pending>,
    /// Bumped every time a command takes the slot.
    exchanges: AtomicU64,
    /// Signalled when the reader drops a stale reply.
    pub(crate) resynced: Notify,
}

impl Shared {
    fn new() -> Self {
        Self {
            pending: Mutex::new(Pending::Idle),
            exchanges: AtomicU64::new(0),
            resynced: Notify::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs `next` for a new exchange. Lines framed before this call
    /// never become part of its reply.
    pub(crate) fn begin_exchange(&self, pending: &mut Pending, next: Pending) {
        *pending = next;
        self.exchanges.fetch_add(1, Ordering::SeqCst);
    }

    fn exchange(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Hands a reply to the waiting command. Returns it back if nobody was
    /// waiting.
    fn deliver(&self, reply: Reply) -> Option<Reply> {
        let mut pending = self.lock();
        match mem::replace(&mut *pending, Pending::Idle) {
            Pending::Waiting(tx) => {
                if tx.send(reply).is_err() {
                    debug!("command waiter went away, reply dropped");
                }
                None
            }
            Pending::Abandoned => {
                debug!(?reply, "discarding late reply");
                self.resynced.notify_one();
                None
            }
            Pending::Idle => Some(reply),
            Pending::Closed => {
                *pending = Pending::Closed;
                None
            }
        }
    }

    /// Fails the waiting command, then discards up to the next final result.
    fn fail_and_resync(&self, err: FrameError) {
        let mut pending = self.lock();
        match mem::replace(&mut *pending, Pending::Abandoned) {
            Pending::Waiting(tx) => {
                tx.send(Err(Error::Frame(err))).ok();
            }
            Pending::Closed => *pending = Pending::Closed,
            Pending::Idle | Pending::Abandoned => {}
        }
    }

    fn close(&self) {
        let mut pending = self.lock();
        if let Pending::Waiting(tx) = mem::replace(&mut *pending, Pending::Closed) {
            tx.send(Err(Error::LinkLost)).ok();
        }
        self.resynced.notify_one();
    }
}

#[derive(Debug)]
struct Waker {
    eventfd: File,
}

impl Waker {
    fn new() -> io::Result<Self> {
        let fd = unsafe { OwnedFd::from_raw_fd(eventfd(0, EFD_CLOEXEC)?) };
        Ok(Self {
            eventfd: File::from(fd),
        })
    }

    fn wake(&self) {
        if let Err(err) = (&self.eventfd).write_all(&1_u64.to_ne_bytes()) {
            error!("couldn't wake modem reader: {err}");
        }
    }
}

/// Handle to the running reader thread.
///
/// Dropping it stops the thread.
#[derive(Debug)]
pub struct Channel {
    shared: Arc<Shared>,
    waker: Arc<Waker>,
    thread: Option<JoinHandle<Result<(), Error>>>,
}

impl Channel {
    /// Starts reading from `reader`.
    ///
    /// `reader` must be the only reader of the line for as long as the channel
    /// runs. Returns the channel and the stream of modem notifications.
    pub fn spawn<R>(
        reader: R,
        collaborators: Collaborators,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>), Error>
    where
        R: Read + AsRawFd + Send + 'static,
    {
        let shared = Arc::new(Shared::new());
        let waker = Arc::new(Waker::new().map_err(Error::Spawn)?);
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        let receiver = Receiver {
            reader,
            waker: Arc::clone(&waker),
            shared: Arc::clone(&shared),
            sinks: collaborators,
            notifications: notifications_tx,
            lines: LineSplitter::new(),
            frame: Accumulator::new(),
            frame_exchange: 0,
            state: State::Idle,
        };
        let thread = thread::Builder::new()
            .name("modem-rx".to_owned())
            .spawn(move || receiver.run())
            .map_err(Error::Spawn)?;

        Ok((
            Self {
                shared,
                waker,
                thread: Some(thread),
            },
            notifications_rx,
        ))
    }

    /// Creates the command dispatcher writing to `writer`.
    pub fn modem<W>(&self, writer: W, config: ModemConfig) -> Modem<W>
    where
        W: io::Write + Send + 'static,
    {
        Modem::new(writer, Arc::clone(&self.shared), config)
    }

    /// Returns `true` once the reader thread has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stops the reader and returns how it ended.
    pub fn shutdown(mut self) -> Result<(), Error> {
        self.waker.wake();
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_panic)) => Err(Error::LinkLost),
            None => Ok(()),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.waker.wake();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// No partial reply.
    Idle,
    /// A reply is being accumulated.
    Framing,
    /// A reply was completed and handed over.
    Dispatched,
}

enum Readiness {
    Readable,
    Woken,
}

struct Receiver<R> {
    reader: R,
    waker: Arc<Waker>,
    shared: Arc<Shared>,
    sinks: Collaborators,
    notifications: mpsc::UnboundedSender<Notification>,
    lines: LineSplitter,
    frame: Accumulator,
    /// Exchange that was current when the partial frame started.
    frame_exchange: u64,
    state: State,
}

impl<R: Read + AsRawFd> Receiver<R> {
    fn run(mut self) -> Result<(), Error> {
        let result = self.receive();
        match &result {
            Ok(()) => {
                debug!("modem reader stopped");
                self.shared.close();
            }
            Err(err) => {
                error!("modem link lost: {err}");
                self.route(Event::FatalError);
            }
        }
        result
    }

    fn receive(&mut self) -> Result<(), Error> {
        let mut buf = [0; READ_CHUNK];
        loop {
            match wait(self.reader.as_raw_fd(), self.waker.eventfd.as_raw_fd())? {
                Readiness::Woken => return Ok(()),
                Readiness::Readable => {}
            }
            let n = match self.reader.read(&mut buf) {
                Ok(0) => return Err(Error::Eof),
                Ok(n) => n,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) =>
                {
                    continue;
                }
                Err(err) => return Err(Error::Io(err)),
            };
            let chunk = &buf[..n];
            self.sinks.log.log(&sanitize(chunk));
            self.lines.feed(chunk);
            while let Some(line) = self.lines.next_line() {
                self.handle_line(line);
            }
        }
    }

    fn handle_line(&mut self, line: Result<String, FrameError>) {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("{err}, dropping partial reply");
                self.frame.reset();
                self.set_state(State::Idle);
                self.shared.fail_and_resync(err);
                return;
            }
        };
        if classify(&line) == FinalResult::Ring {
            self.route(Event::Ring);
            return;
        }
        let exchange = self.shared.exchange();
        if exchange != self.frame_exchange {
            if !self.frame.is_empty() {
                debug!("dropping partial frame received before the current command");
                self.frame.reset();
            }
            self.frame_exchange = exchange;
        }
        match self.frame.push(&line) {
            Some(response) => {
                self.set_state(State::Dispatched);
                self.route(Event::CommandReply(Ok(response)));
                self.set_state(State::Idle);
            }
            None if !self.frame.is_empty() => self.set_state(State::Framing),
            None => {}
        }
    }

    fn route(&mut self, event: Event) {
        match event {
            Event::Ring => {
                info!("incoming call");
                self.sinks.alert.ring(RING_DURATION, RING_FREQUENCY_HZ);
                self.sinks.ui.show();
                self.notify(Notification::Ring);
            }
            Event::CommandReply(reply) => {
                if let Some(reply) = self.shared.deliver(reply) {
                    match reply {
                        Ok(response) => {
                            info!(result = %response.result(), "unsolicited reply");
                            self.notify(Notification::Unsolicited(response));
                        }
                        Err(err) => debug!("no command waiting for error: {err}"),
                    }
                }
            }
            Event::FatalError => {
                self.shared.close();
                self.notify(Notification::LinkLost);
            }
        }
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            trace!("notification receiver dropped");
        }
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            trace!(from = ?self.state, to = ?state, "modem reader state");
            self.state = state;
        }
    }
}

/// Blocks until the modem is readable or the waker fired.
///
/// Hang-up is reported as readable so that buffered bytes are consumed before
/// the read returns end of stream.
fn wait(modem: RawFd, waker: RawFd) -> Result<Readiness, Error> {
    let mut fds = [
        pollfd {
            fd: modem,
            events: POLLIN,
            revents: 0,
        },
        pollfd {
            fd: waker,
            events: POLLIN,
            revents: 0,
        },
    ];
    loop {
        match unsafe { poll(fds.as_mut_ptr(), 2, -1) } {
            Ok(_) => break,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(Error::Io(err)),
        }
    }
    if fds[1].revents & POLLIN != 0 {
        return Ok(Readiness::Woken);
    }
    let revents = fds[0].revents;
    if revents & (POLLIN | POLLHUP) != 0 {
        Ok(Readiness::Readable)
    } else if revents & (POLLERR | POLLNVAL) != 0 {
        Err(Error::Io(io::Error::other(format!(
            "poll reported {revents:#x} on modem descriptor"
        ))))
    } else {
        Ok(Readiness::Readable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_reply_is_discarded_once() {
        let shared = Shared::new();
        *shared.lock() = Pending::Abandoned;
        let late = Response::new("OK\n", FinalResult::Ok);
        assert!(shared.deliver(Ok(late.clone())).is_none());
        assert!(matches!(*shared.lock(), Pending::Idle));
        assert!(matches!(shared.deliver(Ok(late)), Some(Ok(_))));
    }

    #[test]
    fn framing_error_fails_waiter_and_resyncs() {
        let shared = Shared::new();
        let (tx, mut rx) = oneshot::channel();
        *shared.lock() = Pending::Waiting(tx);
        shared.fail_and_resync(FrameError::LineTooLong { limit: 4096 });
        assert!(matches!(rx.try_recv(), Ok(Err(Error::Frame(_)))));
        assert!(matches!(*shared.lock(), Pending::Abandoned));
    }

    #[test]
    fn close_fails_waiter_and_stays_closed() {
        let shared = Shared::new();
        let (tx, mut rx) = oneshot::channel();
        *shared.lock() = Pending::Waiting(tx);
        shared.close();
        assert!(matches!(rx.try_recv(), Ok(Err(Error::LinkLost))));
        let reply = Ok(Response::new("OK\n", FinalResult::Ok));
        assert!(shared.deliver(reply).is_none());
        assert!(matches!(*shared.lock(), Pending::Closed));
    }
}
