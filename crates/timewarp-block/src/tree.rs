use std::path::{Path, PathBuf};

use serde::Deserialize;
use timewarp_core::{Error, Result};

use crate::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockDevice {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub pttype: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub children: Vec<BlockDevice>,
}

impl BlockDevice {
    fn is_partition(&self) -> bool {
        self.kind.as_deref() == Some("part")
    }
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<BlockDevice>,
}

#[derive(Debug, Deserialize)]
struct FindmntOutput {
    #[serde(default)]
    filesystems: Vec<FindmntFileSystem>,
}

#[derive(Debug, Deserialize)]
struct FindmntFileSystem {
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    options: Option<String>,
}

pub fn parse_lsblk(raw: &str) -> Result<Vec<BlockDevice>> {
    let output: LsblkOutput = serde_json::from_str(raw)
        .map_err(|err| Error::initialization(format!("lsblk: unexpected output: {err}")))?;
    Ok(output.blockdevices)
}

pub fn parse_findmnt(raw: &str, mount_point: &Path) -> Result<FileSystem> {
    let output: FindmntOutput = serde_json::from_str(raw)
        .map_err(|err| Error::initialization(format!("findmnt: unexpected output: {err}")))?;
    let Some(first) = output.filesystems.into_iter().next() else {
        return Err(Error::initialization(format!(
            "invalid mount point {}",
            mount_point.display()
        )));
    };

    let subvol = first.options.as_deref().and_then(|options| {
        options
            .split(',')
            .find_map(|option| option.strip_prefix("subvol="))
            .map(PathBuf::from)
    });

    Ok(FileSystem {
        uuid: first.uuid.filter(|uuid| !uuid.is_empty()),
        subvol,
        fstype: first.fstype.unwrap_or_default(),
    })
}

/// Depth-first search for the node carrying `uuid`; returns the innermost
/// partition on the path to it (the node itself when it is a partition, an
/// enclosing partition for stacked devices such as LUKS).
pub fn find_partition<'a>(devices: &'a [BlockDevice], uuid: &str) -> Option<&'a BlockDevice> {
    devices
        .iter()
        .find_map(|device| search(device, uuid, None))
}

fn search<'a>(
    device: &'a BlockDevice,
    uuid: &str,
    enclosing: Option<&'a BlockDevice>,
) -> Option<&'a BlockDevice> {
    let partition = if device.is_partition() {
        Some(device)
    } else {
        enclosing
    };

    if device.uuid.as_deref() == Some(uuid) {
        return partition;
    }

    device
        .children
        .iter()
        .find_map(|child| search(child, uuid, partition))
}
