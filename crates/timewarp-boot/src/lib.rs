use std::fmt;
use std::path::Path;

use timewarp_block::BlockInspector;
use timewarp_core::{Entry, Error, Result};

mod grub;
mod systemd_boot;

pub use grub::{GrubLoader, FRAGMENT_FILE_NAME};
pub use systemd_boot::{entry_sort_key, SystemdBootLoader};

/// Writes boot loader entries keyed by snapshot number. Implementations only
/// ever touch the entry for the number they are given.
pub trait Loader: fmt::Debug {
    fn name(&self) -> &'static str;

    fn add_entry(&self, number: u32, entry: &Entry) -> Result<()>;

    /// Removing an entry that does not exist succeeds.
    fn remove_entry(&self, number: u32) -> Result<()>;
}

pub type LoaderOpener = fn(&Path, bool, &dyn BlockInspector) -> Result<Box<dyn Loader>>;

pub const LOADERS: &[(&str, LoaderOpener)] = &[("grub", open_grub), ("systemd-boot", open_systemd_boot)];

fn open_grub(
    mount_point: &Path,
    boot_on_root: bool,
    inspector: &dyn BlockInspector,
) -> Result<Box<dyn Loader>> {
    Ok(Box::new(GrubLoader::open(mount_point, boot_on_root, inspector)?))
}

fn open_systemd_boot(
    mount_point: &Path,
    _boot_on_root: bool,
    _inspector: &dyn BlockInspector,
) -> Result<Box<dyn Loader>> {
    Ok(Box::new(SystemdBootLoader::open(mount_point)?))
}

pub fn loader_opener(name: &str) -> Result<LoaderOpener> {
    LOADERS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, opener)| *opener)
        .ok_or_else(|| Error::initialization(format!("unknown boot loader '{name}'")))
}

fn require_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::initialization(format!(
            "Directory {} does not exist",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests;
