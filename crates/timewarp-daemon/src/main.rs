use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use timewarp_core::Configuration;
use timewarp_daemon::{init_logging, Daemon, Host};

#[derive(Parser, Debug)]
#[command(name = "timewarpd")]
#[command(about = "Boot environments for snapper snapshots", long_about = None, version)]
struct Cli {
    /// Configuration file; defaults to $TIMEWARP_CONFIG or the XDG location.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log filter used when neither TIMEWARP_LOG nor RUST_LOG is set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn start(cli: &Cli) -> Result<Daemon> {
    let configuration = Configuration::load(cli.config.as_deref())?;
    let host = Host::system(&configuration);
    Ok(Daemon::start(configuration, host)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match start(&cli) {
        Ok(daemon) => {
            daemon.run();
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Failed to start timewarpd: {err}.");
            ExitCode::FAILURE
        }
    }
}
