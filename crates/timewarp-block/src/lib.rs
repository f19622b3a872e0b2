use std::fmt;
use std::path::{Path, PathBuf};

use timewarp_core::Result;

mod system;
mod tree;

pub use system::SystemInspector;
pub use tree::{find_partition, parse_findmnt, parse_lsblk, BlockDevice};

/// Mounted filesystem. `subvol` is only set when the mount uses subvolume
/// semantics (a `subvol=` mount option).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystem {
    pub uuid: Option<String>,
    pub subvol: Option<PathBuf>,
    pub fstype: String,
}

/// Partition backing a mount point. Every field is `None` when the partition
/// could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub path: Option<String>,
    pub uuid: Option<String>,
    pub partition_table_type: Option<String>,
}

impl Partition {
    pub fn is_resolved(&self) -> bool {
        self.path.is_some()
    }

    fn from_device(device: &BlockDevice) -> Self {
        Self {
            path: device.path.clone(),
            uuid: device.uuid.clone(),
            partition_table_type: device.pttype.clone(),
        }
    }
}

pub trait BlockInspector: fmt::Debug {
    fn filesystem(&self, mount_point: &Path) -> Result<FileSystem>;

    fn block_devices(&self) -> Result<Vec<BlockDevice>>;

    /// Resolves the partition through the filesystem UUID; subvolume mounts
    /// keep the block device listing from naming the right mount point.
    fn partition(&self, mount_point: &Path) -> Result<Partition> {
        let filesystem = self.filesystem(mount_point)?;
        let Some(uuid) = filesystem.uuid.as_deref() else {
            return Ok(Partition::default());
        };
        let devices = self.block_devices()?;
        Ok(find_partition(&devices, uuid)
            .map(Partition::from_device)
            .unwrap_or_default())
    }
}
