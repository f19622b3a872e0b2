use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use timewarp_block::{BlockInspector, SystemInspector};
use timewarp_core::{Architecture, Configuration, Error, Result};
use timewarp_snapper::{SnapperCli, SnapshotService};
use tracing::debug;

pub trait Subvolumes: fmt::Debug {
    fn snapshot(&self, source: &Path, destination: &Path) -> Result<()>;

    fn delete(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct BtrfsSubvolumes;

impl BtrfsSubvolumes {
    fn run(&self, args: &[&OsStr], failure: String) -> Result<()> {
        let mut command = Command::new("btrfs");
        command.arg("subvolume").args(args);
        debug!(?command, "running btrfs");
        let output = command
            .output()
            .map_err(|err| Error::Subvolume(format!("{failure}: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                return Err(Error::Subvolume(failure));
            }
            return Err(Error::Subvolume(format!("{failure}: {stderr}")));
        }
        Ok(())
    }
}

impl Subvolumes for BtrfsSubvolumes {
    fn snapshot(&self, source: &Path, destination: &Path) -> Result<()> {
        self.run(
            &[OsStr::new("snapshot"), source.as_os_str(), destination.as_os_str()],
            format!("Failed to create boot environment {}", destination.display()),
        )
    }

    fn delete(&self, path: &Path) -> Result<()> {
        self.run(
            &[OsStr::new("delete"), path.as_os_str()],
            format!("Failed to delete boot environment {}", path.display()),
        )
    }
}

#[derive(Debug)]
pub struct Host {
    pub root: PathBuf,
    pub architecture: Option<Architecture>,
    pub snapshot_service: Box<dyn SnapshotService>,
    pub subvolumes: Box<dyn Subvolumes>,
    pub inspector: Box<dyn BlockInspector>,
}

impl Host {
    pub fn system(configuration: &Configuration) -> Self {
        Self {
            root: PathBuf::from("/"),
            architecture: Architecture::current(),
            snapshot_service: Box::new(SnapperCli::new(&configuration.snapper)),
            subvolumes: Box::new(BtrfsSubvolumes),
            inspector: Box::new(SystemInspector),
        }
    }
}
