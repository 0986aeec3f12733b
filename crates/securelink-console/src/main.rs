//! SecureLink console
//!
//! Reads commands from stdin, one per line, and drives a single secure
//! connection. Console output goes to stdout; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! securelink --target 192.168.0.1:11111 --ca-file ca.pem
//! ```

use std::{
    io::Write,
    path::PathBuf,
    process::ExitCode,
    time::Duration,
};

use clap::Parser;
use securelink_console::{
    Command, ConsoleError, HostStack, Runtime, TlsTransport, commands, tls,
};
use securelink_core::{AddressFamily, ConnectionState, Environment, MachineConfig, SystemEnv};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    time::MissedTickBehavior,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Interactive secure TCP client console
#[derive(Debug, Parser)]
#[command(name = "securelink", version, about)]
struct Args {
    /// Connect to this target (`host:port`) once the stack is ready
    #[arg(long)]
    target: Option<String>,

    /// Address family for targets: any, 4 or 6
    #[arg(long, default_value = "4")]
    ipmode: AddressFamily,

    /// TCP connect timeout in milliseconds (0 waits forever)
    #[arg(long, default_value_t = 30_000)]
    connect_timeout_ms: u64,

    /// TLS negotiation timeout in milliseconds (0 waits forever)
    #[arg(long, default_value_t = 30_000)]
    negotiation_timeout_ms: u64,

    /// Scheduler tick in milliseconds
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,

    /// Extra PEM trust anchors (repeatable)
    #[arg(long = "ca-file")]
    ca_files: Vec<PathBuf>,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn machine_config(&self) -> MachineConfig {
        let timeout = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        MachineConfig {
            family: self.ipmode,
            connect_timeout: timeout(self.connect_timeout_ms),
            negotiation_timeout: timeout(self.negotiation_timeout_ms),
            ..MachineConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "securelink failed");
            ExitCode::FAILURE
        },
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<(), ConsoleError> {
    let config = tls::client_config(&args.ca_files)?;
    let transport = TlsTransport::new(config, tokio::runtime::Handle::current());
    let mut runtime = Runtime::new(args.machine_config(), HostStack::discover(), transport);

    let env = SystemEnv;
    let mut pending_target = args.target.clone();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(family = %args.ipmode, "console started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                emit(&runtime.tick(env.now()));
                if runtime.state() == ConnectionState::WaitingForCommand {
                    if let Some(target) = pending_target.take() {
                        emit(&runtime.execute(Command::ConnectTls { target }, env.now()));
                    }
                }
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => emit(&runtime.execute(commands::parse(&line), env.now())),
                Ok(None) => {
                    stdin_open = false;
                    emit(&runtime.input_closed(env.now()));
                },
                Err(err) => {
                    warn!(%err, "stdin read failed");
                    stdin_open = false;
                    emit(&runtime.input_closed(env.now()));
                },
            },
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            },
        }

        if runtime.should_quit() {
            break;
        }
    }

    runtime.shutdown();
    Ok(())
}

/// Write console lines to stdout; a closed stdout is not an error.
fn emit(lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let mut out = std::io::stdout().lock();
    for line in lines {
        let _ = writeln!(out, "{line}");
    }
    let _ = out.flush();
}
