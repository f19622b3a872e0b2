use std::io;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use timewarp_core::{describe_fault, Configuration, SnapshotKind};

mod completion;
mod render;
mod request;

use completion::{write_completions_script, CliCompletionShell};
use render::{print_error, print_failure};
use request::{build_request, exchange, read_pending_stdin};

/// Set to any value to turn `timewarp create` into a no-op.
const DISABLE_ENV: &str = "DISABLE_TIMEWARP";

#[derive(Parser, Debug)]
#[command(name = "timewarp")]
#[command(about = "Create snapper snapshots with bootable boot environments", long_about = None, version)]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask timewarpd to create a snapshot; package names on stdin mark it
    /// important when one of them is configured as important.
    Create {
        #[arg(short = 't', long = "type", value_enum)]
        kind: SnapshotType,
    },
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum SnapshotType {
    Pre,
    Post,
    Single,
}

impl From<SnapshotType> for SnapshotKind {
    fn from(value: SnapshotType) -> Self {
        match value {
            SnapshotType::Pre => SnapshotKind::Pre,
            SnapshotType::Post => SnapshotKind::Post,
            SnapshotType::Single => SnapshotKind::Single,
        }
    }
}

fn create(config: Option<&Path>, kind: SnapshotKind) -> Result<ExitCode> {
    if std::env::var_os(DISABLE_ENV).is_some() {
        return Ok(ExitCode::SUCCESS);
    }

    let configuration = Configuration::load(config).context("Failed to start timewarp")?;
    let request = build_request(kind, &configuration.package.important, read_pending_stdin)
        .context("failed reading package names from stdin")?;

    let stream = match UnixStream::connect(&configuration.service.socket) {
        Ok(stream) => stream,
        Err(err) => {
            print_error(&format!(
                "Failed to start timewarp: {}.",
                describe_fault(err.kind())
            ));
            return Ok(ExitCode::FAILURE);
        }
    };

    match exchange(stream, request) {
        Ok(Some(number)) if number != timewarp_core::ipc::FAILED_NUMBER => Ok(ExitCode::SUCCESS),
        Ok(_) => {
            print_failure();
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            print_error(&format!(
                "{} call failed: {}.",
                request.method(),
                describe_fault(err.kind())
            ));
            print_failure();
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Create { kind } => create(cli.config.as_deref(), kind.into()),
        Commands::Completions { shell } => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            write_completions_script(shell, &mut writer)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            print_error(&format!("{err:#}."));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
