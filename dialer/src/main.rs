#![forbid(unsafe_code)]

use clap::Parser;
use color_eyre::eyre::{Context, Result, bail};
use rhizo_at::{
    Channel, Collaborators, Command, Framer, Modem, ModemConfig, Notification, PhoneActivity,
    PhoneNumber, Response, TracingLog,
};
use rhizo_uart::{Device, baud};
use std::{io::Write as _, path::PathBuf, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

mod logging;
mod sinks;

/// Utility args
#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "AT modem dialer",
    long_about = "Dial, answer and monitor voice calls on an AT serial modem"
)]
struct Args {
    #[clap(flatten)]
    line: LineOpts,
    #[clap(subcommand)]
    subcmd: SubCommand,
}

/// Modem line options
#[derive(Parser, Debug)]
struct LineOpts {
    /// Path to the modem serial device
    #[clap(short, long, env = "RHIZO_MODEM")]
    modem: Option<PathBuf>,
    /// Line speed, one of the names listed by `bauds`
    #[clap(short, long, env = "RHIZO_BAUD", default_value = "115200")]
    baud: String,
    /// How long to wait for the final result of a command
    #[clap(long, env = "RHIZO_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    timeout: Duration,
    /// How long to wait for the late reply of a timed out command
    #[clap(long, default_value = "2s", value_parser = humantime::parse_duration)]
    resync: Duration,
    /// Don't reset the modem with ATZ first
    #[clap(long, default_value = "false")]
    no_reset: bool,
}

#[derive(Parser, Debug)]
enum SubCommand {
    /// Start a voice call
    #[clap(action)]
    Dial {
        /// Number to dial: digits, `*`, `#` and `+`
        number: PhoneNumber,
    },
    /// Answer an incoming call
    #[clap(action)]
    Answer,
    /// Hang up the current call
    #[clap(action)]
    Hangup,
    /// Print the phone activity status
    #[clap(action)]
    Status,
    /// Send a command line and print the reply, without starting the reader
    #[clap(action)]
    Raw {
        /// Command line, e.g. `AT+CSQ`
        command: String,
    },
    /// Report incoming calls and unsolicited results until interrupted
    #[clap(action)]
    Listen {
        /// Answer incoming calls
        #[clap(long, default_value = "false")]
        answer: bool,
    },
    /// List the supported line speeds
    #[clap(action)]
    Bauds,
}

fn open_device(line: &LineOpts) -> Result<Device> {
    let Some(path) = &line.modem else {
        bail!("no modem device given, use --modem or RHIZO_MODEM");
    };
    let mut device = Device::open(path)
        .wrap_err_with(|| format!("failed to open modem {}", path.display()))?;
    let entry = device
        .configure(&line.baud)
        .wrap_err("failed to configure modem line")?;
    info!(
        modem = %path.display(),
        baud = entry.name(),
        custom = entry.is_custom(),
        "modem line ready"
    );
    Ok(device)
}

/// A running reader and its dispatcher.
struct Session {
    channel: Channel,
    modem: Modem<Device>,
    notifications: mpsc::UnboundedReceiver<Notification>,
}

impl Session {
    async fn start(line: &LineOpts) -> Result<Self> {
        let device = open_device(line)?;
        let reader = device
            .try_clone()
            .wrap_err("failed to clone modem descriptor")?;
        let collaborators =
            Collaborators::new(sinks::TerminalBell, TracingLog, sinks::Banner::default());
        let (channel, notifications) =
            Channel::spawn(reader, collaborators).wrap_err("failed to start modem reader")?;
        let modem = channel.modem(
            device,
            ModemConfig {
                command_timeout: line.timeout,
                resync_timeout: line.resync,
            },
        );
        if !line.no_reset {
            modem
                .command(&Command::Reset)
                .await
                .and_then(Response::into_result)
                .wrap_err("modem reset failed")?;
        }
        Ok(Self {
            channel,
            modem,
            notifications,
        })
    }

    fn stop(self) -> Result<()> {
        drop(self.modem);
        self.channel.shutdown()?;
        Ok(())
    }
}

/// Prints the information lines of `response`, failing on a non-success
/// result.
fn report(response: Response) -> Result<Response> {
    let response = response.into_result()?;
    for line in response.information() {
        println!("{}", line.trim_end());
    }
    Ok(response)
}

fn list_bauds() {
    for entry in baud::entries() {
        let kind = if entry.is_custom() { "custom" } else { "standard" };
        println!("{:>7} {kind}", entry.name());
    }
}

/// One-shot exchange on the blocking framer.
async fn raw(line: &LineOpts, command: String) -> Result<()> {
    let mut device = open_device(line)?;
    let command = Command::Raw(command);
    debug!(%command, "sending AT command");
    device
        .write_all(command.to_wire().as_bytes())
        .wrap_err("failed to write command")?;
    let mut framer = Framer::new(device);
    let exchange = tokio::task::spawn_blocking(move || framer.read_response());
    let response = tokio::time::timeout(line.timeout, exchange)
        .await
        .wrap_err_with(|| format!("no reply from modem within {:?}", line.timeout))?
        .wrap_err("modem reader panicked")??;
    println!("{}", response.text().trim_end());
    response.into_result()?;
    Ok(())
}

async fn listen(session: &mut Session, answer: bool) -> Result<()> {
    info!("listening for calls, press ctrl-c to stop");
    loop {
        tokio::select! {
            notification = session.notifications.recv() => match notification {
                Some(Notification::Ring) if answer => {
                    match session.modem.command(&Command::Answer).await.and_then(Response::into_result) {
                        Ok(_) => info!("call answered"),
                        Err(err) => warn!("couldn't answer call: {err}"),
                    }
                }
                Some(Notification::Ring) => {}
                Some(Notification::Unsolicited(response)) => {
                    println!("{}", response.text().trim_end());
                }
                Some(Notification::LinkLost) | None => bail!("modem link lost"),
            },
            result = tokio::signal::ctrl_c() => {
                result.wrap_err("failed to listen for ctrl-c")?;
                info!("interrupted, stopping");
                return Ok(());
            }
        }
    }
}

async fn execute(args: Args) -> Result<()> {
    let line = &args.line;
    match args.subcmd {
        SubCommand::Bauds => {
            list_bauds();
            Ok(())
        }
        SubCommand::Raw { command } => raw(line, command).await,
        SubCommand::Dial { number } => {
            let session = Session::start(line).await?;
            report(session.modem.command(&Command::Dial(number)).await?)?;
            session.stop()
        }
        SubCommand::Answer => {
            let session = Session::start(line).await?;
            report(session.modem.command(&Command::Answer).await?)?;
            session.stop()
        }
        SubCommand::Hangup => {
            let session = Session::start(line).await?;
            report(session.modem.command(&Command::Hangup).await?)?;
            session.stop()
        }
        SubCommand::Status => {
            let session = Session::start(line).await?;
            let response = session.modem.command(&Command::Status).await?;
            let response = response.into_result()?;
            let Some(activity) = PhoneActivity::from_response(&response) else {
                bail!("unexpected status reply: {}", response.text().trim_end());
            };
            println!("{activity}");
            session.stop()
        }
        SubCommand::Listen { answer } => {
            let mut session = Session::start(line).await?;
            listen(&mut session, answer).await?;
            session.stop()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::init()?;

    let args = Args::parse();

    if cfg!(debug_assertions) {
        debug!("{:?}", args);
    }

    if let Err(e) = execute(args).await {
        error!("{e:?}");
        std::process::exit(1);
    } else {
        std::process::exit(0);
    }
}
