use std::io;
use std::path::Path;
use std::process::{Command, Output};

use timewarp_core::{Error, Result};
use tracing::debug;

use crate::tree::{parse_findmnt, parse_lsblk};
use crate::{BlockDevice, BlockInspector, FileSystem};

#[derive(Debug, Clone, Default)]
pub struct SystemInspector;

impl BlockInspector for SystemInspector {
    fn filesystem(&self, mount_point: &Path) -> Result<FileSystem> {
        let mut command = Command::new("findmnt");
        command
            .arg(mount_point)
            .arg("-J")
            .arg("-o")
            .arg("TARGET,FSTYPE,UUID,OPTIONS");
        let output = run_tool(&mut command, "findmnt")?;
        if !output.status.success() {
            return Err(Error::initialization(format!(
                "invalid mount point {}",
                mount_point.display()
            )));
        }
        parse_findmnt(&String::from_utf8_lossy(&output.stdout), mount_point)
    }

    fn block_devices(&self) -> Result<Vec<BlockDevice>> {
        let mut command = Command::new("lsblk");
        command.arg("-J").arg("-o").arg("NAME,PATH,UUID,PTTYPE,TYPE");
        let output = run_tool(&mut command, "lsblk")?;
        if !output.status.success() {
            return Err(Error::initialization(format!(
                "lsblk failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_lsblk(&String::from_utf8_lossy(&output.stdout))
    }
}

fn run_tool(command: &mut Command, tool: &str) -> Result<Output> {
    debug!(?command, "querying block devices");
    match command.output() {
        Ok(output) => Ok(output),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::initialization(
            format!("{tool}: command not found"),
        )),
        Err(err) => Err(Error::io(format!("failed to run {tool}"), err)),
    }
}
