use std::io;
use std::process::{Command, Output};

use timewarp_core::{Error, Result, Snapshot, SnapshotKind, SnapperConfig, Userdata};
use tracing::debug;

use crate::listing::{parse_config_names, parse_snapshot_listing};
use crate::SnapshotService;

#[derive(Debug, Clone)]
pub struct SnapperCli {
    program: String,
    config_name: String,
    cleanup_algorithm: String,
}

impl SnapperCli {
    pub fn new(config: &SnapperConfig) -> Self {
        Self::with_program("snapper", config)
    }

    pub fn with_program(program: impl Into<String>, config: &SnapperConfig) -> Self {
        Self {
            program: program.into(),
            config_name: config.name.clone(),
            cleanup_algorithm: config.cleanup_algorithm.clone(),
        }
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("-c").arg(&self.config_name);
        command
    }

    pub(crate) fn create_command(
        &self,
        kind: SnapshotKind,
        pre_number: Option<u32>,
        description: &str,
        userdata: &Userdata,
    ) -> Command {
        let mut command = self.base_command();
        command
            .arg("create")
            .arg("--type")
            .arg(kind.as_str())
            .arg("--print-number")
            .arg("--cleanup-algorithm")
            .arg(&self.cleanup_algorithm)
            .arg("--description")
            .arg(description);
        if let Some(pre_number) = pre_number {
            command.arg("--pre-number").arg(pre_number.to_string());
        }
        if !userdata.is_empty() {
            let pairs: Vec<String> = userdata
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            command.arg("--userdata").arg(pairs.join(","));
        }
        command
    }

    fn run(&self, mut command: Command, action: &str) -> Result<String> {
        debug!(?command, "running snapper");
        let output: Output = match command.output() {
            Ok(output) => output,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::initialization(format!(
                    "{}: command not found",
                    self.program
                )));
            }
            Err(err) => {
                return Err(Error::SnapshotService(format!(
                    "failed launching {} {action}: {err}",
                    self.program
                )));
            }
        };
        if !output.status.success() {
            return Err(Error::SnapshotService(format!(
                "{} {action} failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn create(
        &self,
        kind: SnapshotKind,
        pre_number: Option<u32>,
        description: &str,
        userdata: &Userdata,
    ) -> Result<u32> {
        let command = self.create_command(kind, pre_number, description, userdata);
        let stdout = self.run(command, "create")?;
        let number = stdout.trim().parse::<u32>().map_err(|_| {
            Error::SnapshotService(format!(
                "snapper printed an invalid snapshot number '{}'",
                stdout.trim()
            ))
        })?;
        debug!(number, kind = kind.as_str(), "created snapshot");
        Ok(number)
    }
}

impl SnapshotService for SnapperCli {
    fn ping(&self) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.arg("--jsonout").arg("list-configs");
        let stdout = self.run(command, "list-configs").map_err(|err| match err {
            Error::Initialization(_) => err,
            other => Error::initialization(format!("snapper is not available: {other}")),
        })?;
        let names = parse_config_names(&stdout)
            .map_err(|err| Error::initialization(err.to_string()))?;
        if !names.iter().any(|name| *name == self.config_name) {
            return Err(Error::initialization(format!(
                "snapper configuration {} does not exist",
                self.config_name
            )));
        }
        Ok(())
    }

    fn create_pre(&self, description: &str, userdata: &Userdata) -> Result<u32> {
        self.create(SnapshotKind::Pre, None, description, userdata)
    }

    fn create_post(&self, pre_number: u32, description: &str, userdata: &Userdata) -> Result<u32> {
        self.create(SnapshotKind::Post, Some(pre_number), description, userdata)
    }

    fn create_single(&self, description: &str, userdata: &Userdata) -> Result<u32> {
        self.create(SnapshotKind::Single, None, description, userdata)
    }

    fn snapshot(&self, number: u32) -> Result<Snapshot> {
        let mut command = self.base_command();
        command
            .arg("--jsonout")
            .arg("list")
            .arg("--disable-used-space");
        let stdout = self.run(command, "list")?;
        parse_snapshot_listing(&stdout, &self.config_name, number)
    }
}
