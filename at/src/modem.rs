use crate::{
    channel::{Pending, Reply, Shared},
    Command, Error, Response,
};
use std::{
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{
    sync::{self, oneshot},
    time::timeout,
};
use tracing::{debug, warn};

/// Timing of command exchanges.
#[derive(Clone, Copy, Debug)]
pub struct ModemConfig {
    /// How long a command waits for its final result.
    pub command_timeout: Duration,
    /// How long a command waits for the stale reply of a timed out command
    /// before it assumes that reply was lost.
    pub resync_timeout: Duration,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            resync_timeout: Duration::from_secs(2),
        }
    }
}

/// Command dispatcher.
///
/// Writes go straight to the line; replies come from the
/// [`Channel`](crate::Channel) that created this handle. At most one command
/// is outstanding: concurrent callers queue in the order they called.
#[derive(Debug)]
pub struct Modem<W> {
    writer: Arc<Mutex<W>>,
    exchange: sync::Mutex<()>,
    shared: Arc<Shared>,
    config: ModemConfig,
}

impl<W: Write + Send + 'static> Modem<W> {
    pub(crate) fn new(writer: W, shared: Arc<Shared>, config: ModemConfig) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            exchange: sync::Mutex::new(()),
            shared,
            config,
        }
    }

    /// Timing this dispatcher was created with.
    #[must_use]
    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    /// Sends `command` and waits for its final result.
    ///
    /// A modem-reported failure (`ERROR`, `BUSY`, ...) is still `Ok`; see
    /// [`Response::into_result`].
    pub async fn command(&self, command: &Command) -> Result<Response, Error> {
        let _exchange = self.exchange.lock().await;
        let (tx, mut rx) = oneshot::channel();
        self.claim(Pending::Waiting(tx)).await?;
        if let Err(err) = self.write(command).await {
            self.release();
            return Err(err);
        }

        let outcome = timeout(self.config.command_timeout, &mut rx).await;
        match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(Error::LinkLost),
            Err(_) => self.abandon(command, rx),
        }
    }

    /// Sends `command` without waiting. Its reply is discarded when it
    /// arrives.
    pub async fn send(&self, command: &Command) -> Result<(), Error> {
        let _exchange = self.exchange.lock().await;
        self.claim(Pending::Abandoned).await?;
        self.write(command).await
    }

    /// Installs `next` in the reply slot, first waiting for a stale reply to
    /// be drained.
    async fn claim(&self, next: Pending) -> Result<(), Error> {
        let mut next = Some(next);
        loop {
            let resynced = self.shared.resynced.notified();
            {
                let mut pending = self.shared.lock();
                // A waiter whose call was cancelled left its slot behind.
                if matches!(&*pending, Pending::Waiting(tx) if tx.is_closed()) {
                    *pending = Pending::Abandoned;
                }
                match *pending {
                    Pending::Idle => {
                        let next = next.take().unwrap_or(Pending::Idle);
                        self.shared.begin_exchange(&mut pending, next);
                        return Ok(());
                    }
                    Pending::Closed => return Err(Error::LinkLost),
                    Pending::Waiting(_) | Pending::Abandoned => {}
                }
            }
            if timeout(self.config.resync_timeout, resynced).await.is_err() {
                let mut pending = self.shared.lock();
                if matches!(*pending, Pending::Abandoned) {
                    warn!("stale reply never arrived, resuming");
                    *pending = Pending::Idle;
                }
            }
        }
    }

    fn release(&self) {
        let mut pending = self.shared.lock();
        if matches!(*pending, Pending::Waiting(_)) {
            *pending = Pending::Idle;
        }
    }

    fn abandon(&self, command: &Command, mut rx: oneshot::Receiver<Reply>) -> Reply {
        {
            let mut pending = self.shared.lock();
            if matches!(*pending, Pending::Waiting(_)) {
                *pending = Pending::Abandoned;
                warn!(%command, "command timed out");
                return Err(Error::Timeout(self.config.command_timeout));
            }
        }
        // The reader got the slot first; the reply is already in the channel.
        rx.try_recv().unwrap_or(Err(Error::LinkLost))
    }

    async fn write(&self, command: &Command) -> Result<(), Error> {
        debug!(%command, "sending AT command");
        let wire = command.to_wire();
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || {
            let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
            writer.write_all(wire.as_bytes())
        })
        .await
        .map_err(io::Error::other)??;
        Ok(())
    }
}
