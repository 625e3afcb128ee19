//! netexec command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use log::warn;
use secrecy::SecretString;

use netexec::batch::{BatchOrchestrator, RunSpec};
use netexec::input;
use netexec::profile::{Mode, registry};
use netexec::session::{Credentials, SessionOptions};
use netexec::transport::PtyConnector;

/// Push a command set to one or many network devices over an interactive
/// transport, without manual typing.
#[derive(Debug, Parser)]
#[command(name = "netexec", version, about)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["device", "device_list", "list_types"]),
))]
struct Cli {
    /// Answer "yes" to the transport's host-key check (not recommended)
    #[arg(short = 'y')]
    yes: bool,

    /// Username for the connection
    #[arg(short = 'u', long = "user")]
    user: Option<String>,

    /// Prompt for a password (never pass secrets as arguments)
    #[arg(short = 'p', long = "password")]
    password: bool,

    /// Command used to connect
    #[arg(short = 'c', long = "command", default_value = "ssh")]
    command: String,

    /// Enter lines in exec mode instead of config mode
    #[arg(short = 'x', long = "exec-mode", conflicts_with = "commit")]
    exec_mode: bool,

    /// Commit the config and exit (no interactive mode)
    #[arg(long)]
    commit: bool,

    /// Device type (see --list-types)
    #[arg(short = 'd', long = "device-type", default_value = "junos")]
    device_type: String,

    /// Input file with one command per line
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Timeout in seconds for every prompt wait
    #[arg(short = 't', long = "timeout", default_value_t = 45)]
    timeout: u64,

    /// Worker-pool size; above 1 the run must not be interactive
    /// (exec mode then closes each session instead of handing off)
    #[arg(long = "parallel", default_value_t = 1)]
    parallel: usize,

    /// List available device types
    #[arg(long = "list-types")]
    list_types: bool,

    /// File with one device per line
    #[arg(short = 'l', long = "device-list")]
    device_list: Option<PathBuf>,

    /// Device to connect to
    #[arg(value_name = "DEVICE")]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list_types {
        println!("==== Available device types: ====\n");
        for entry in registry::catalog() {
            println!("{:<16}: {}", entry.key, entry.description);
        }
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("netexec: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> netexec::error::Result<()> {
    let profile = registry::lookup(&cli.device_type)?;

    let password = if cli.password {
        let entered = rpassword::prompt_password("Password:")
            .map_err(netexec::error::TransportError::Io)?;
        Some(SecretString::from(entered))
    } else {
        None
    };

    let devices = match (&cli.device_list, &cli.device) {
        (Some(path), _) => input::read_device_list(path)?,
        (None, Some(device)) => vec![device.clone()],
        (None, None) => {
            return Err(netexec::Error::InvalidRun {
                message: "a device or --device-list is required".to_string(),
            });
        }
    };

    let commands = match &cli.input {
        Some(path) => input::read_command_file(path)?,
        None => vec![],
    };

    let mode = if cli.exec_mode { Mode::Exec } else { Mode::Config };

    let spec = RunSpec {
        devices,
        profile,
        credentials: Credentials {
            username: cli.user.clone(),
            password,
        },
        mode,
        commands,
        commit: cli.commit,
        // a parallel exec run cannot hand sessions to the operator, so
        // each worker closes its session after the last command
        auto_close: cli.exec_mode && cli.parallel > 1,
        options: SessionOptions {
            timeout: Duration::from_secs(cli.timeout),
            host_key_auto_accept: cli.yes,
            ..Default::default()
        },
        parallelism: cli.parallel,
    };

    let orchestrator = BatchOrchestrator::new(PtyConnector::new(&cli.command));

    // Ctrl-C moves the active device to interactive mode instead of
    // killing the run; once the operator is interactive, keystrokes go to
    // the device and no further interrupts are raised here.
    let interrupts = orchestrator.interrupts();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("interrupt handler unavailable");
                break;
            }
            interrupts.trigger();
        }
    });

    orchestrator.run(spec).await.map(|_| ())
}
