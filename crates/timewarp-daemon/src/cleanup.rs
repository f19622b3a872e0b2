use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use timewarp_core::{Error, Package, Result, Snapshot};
use tracing::{debug, error, info, warn};

use crate::service::Service;

impl Service {
    /// Garbage-collects the boot environment of snapshot `number`: its loader
    /// entry, its subvolume and, once no remaining boot environment can still
    /// reference them, its kernel and initrd images. Returns `false` when a
    /// step failed; nothing is deleted after the first failure.
    pub fn cleanup(&mut self, number: u32, quiet: bool) -> bool {
        let bootenv = self.configuration.bootenv_path(number);
        match self.try_cleanup(number, &bootenv, quiet) {
            Ok(()) => true,
            Err(err) => {
                if !(quiet && err.is_expected_cleanup_failure()) {
                    self.log_cleanup_failure(&bootenv, &err);
                }
                false
            }
        }
    }

    fn try_cleanup(&mut self, number: u32, bootenv: &Path, quiet: bool) -> Result<()> {
        self.loader.remove_entry(number)?;

        if !bootenv.exists() {
            debug!(number, path = %bootenv.display(), "boot environment already removed");
            return Ok(());
        }

        let kernel = &self.configuration.package.linux;
        let database = (self.open_database)(bootenv)?;
        let linux = database.installed_package(kernel)?;

        if self.is_live_root(bootenv) {
            if !quiet {
                warn!(
                    "Failed to delete boot environment {}: Boot environment in use",
                    bootenv.display()
                );
            }
        } else {
            self.subvolumes.delete(bootenv)?;
            info!(number, path = %bootenv.display(), "deleted boot environment");
        }

        if !self.images_unreferenced(&linux, quiet)? {
            return Ok(());
        }
        self.remove_images(number, &linux, quiet)
    }

    /// Whether `bootenv` is the subvolume mounted on the live root. The root
    /// subvolume path is relative to the btrfs top level while `bootenv` is
    /// relative to the mounted root, so a component-wise suffix match in
    /// either direction counts.
    pub(crate) fn is_live_root(&self, bootenv: &Path) -> bool {
        let Some(subvolume) = self.root_subvolume.as_deref() else {
            return false;
        };
        let subvolume = strip_root(subvolume);
        let bootenv = strip_root(bootenv);
        if subvolume.as_os_str().is_empty() || bootenv.as_os_str().is_empty() {
            return false;
        }
        subvolume.ends_with(&bootenv) || bootenv.ends_with(&subvolume)
    }

    /// Only a complete, successful scan of the remaining boot environments
    /// that finds no other user of `linux` allows deleting its images.
    fn images_unreferenced(&self, linux: &Package, quiet: bool) -> Result<bool> {
        let kernel = &self.configuration.package.linux;
        let bootenv_root = &self.configuration.bootenv;
        let entries = fs::read_dir(bootenv_root)
            .map_err(|err| Error::io_at("read directory", bootenv_root, err))?;
        // Every entry counts, whatever its name: one that cannot be queried
        // keeps the images.
        for entry in entries {
            let remaining = entry
                .map_err(|err| Error::io_at("read directory", bootenv_root, err))?
                .path();
            let database = match (self.open_database)(&remaining) {
                Ok(database) => database,
                Err(err) => {
                    if !quiet {
                        warn!(
                            "Failed to initialize package database of boot environment {}: {err}; not removing kernel or initrd images",
                            remaining.display()
                        );
                    }
                    return Ok(false);
                }
            };
            let package = match database.installed_package(kernel) {
                Ok(package) => package,
                Err(err) => {
                    if !quiet {
                        warn!(
                            "Failed to query package database of boot environment {}: {err}; not removing kernel or initrd images",
                            remaining.display()
                        );
                    }
                    return Ok(false);
                }
            };
            if package.version == linux.version {
                debug!(
                    version = %linux.version,
                    path = %remaining.display(),
                    "kernel still referenced by another boot environment"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn remove_images(&self, number: u32, linux: &Package, quiet: bool) -> Result<()> {
        let fields = self
            .default_fields
            .clone()
            .with_package("linux", linux)
            .with_snapshot(&Snapshot {
                number,
                ..Snapshot::placeholder()
            });
        let images = self
            .configuration
            .image_files(&fields, self.root_subvolume.as_deref())?;

        let mut parents = BTreeSet::new();
        for destination in images.values() {
            match fs::remove_file(destination) {
                Ok(()) => {
                    debug!(path = %destination.display(), "removed boot image");
                    if let Some(parent) = destination.parent() {
                        parents.insert(parent.to_path_buf());
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    if !quiet {
                        warn!("Failed to delete {}: File not found", destination.display());
                    }
                }
                Err(err) => {
                    warn!("Failed to delete {}: {err}", destination.display());
                }
            }
        }

        for parent in parents {
            prune_empty_dirs(&self.configuration.boot.mount_point, &parent);
        }
        Ok(())
    }

    fn log_cleanup_failure(&self, bootenv: &Path, err: &Error) {
        let kernel = &self.configuration.package.linux;
        let bootenv = bootenv.display();
        match err {
            Error::Initialization(message) => error!(
                "Failed to initialize package database of boot environment {bootenv}: {message}"
            ),
            Error::InvalidPackageInformation { .. } => error!(
                "Failed to query package database of boot environment {bootenv}: Package information for kernel package {kernel} is invalid"
            ),
            Error::PackageNotFound { .. } => error!(
                "Failed to query package database of boot environment {bootenv}: Kernel package {kernel} not found"
            ),
            Error::Subvolume(message) => error!("{message}"),
            other => error!("Unexpected error: {other}"),
        }
    }
}

/// Removes `start` and its ancestors while they are empty, stopping at
/// `mount_point` or the first directory that still has entries.
pub(crate) fn prune_empty_dirs(mount_point: &Path, start: &Path) {
    let mut current = Some(start.to_path_buf());
    while let Some(dir) = current {
        if !dir.starts_with(mount_point) || dir == mount_point {
            break;
        }

        let mut entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                current = dir.parent().map(PathBuf::from);
                continue;
            }
            Err(err) => {
                warn!("Failed to read {}: {err}", dir.display());
                break;
            }
        };
        if entries.next().is_some() {
            break;
        }

        if let Err(err) = fs::remove_dir(&dir) {
            warn!("Failed to delete {}: {err}", dir.display());
            break;
        }
        debug!(path = %dir.display(), "removed empty image directory");
        current = dir.parent().map(PathBuf::from);
    }
}

fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::RootDir | Component::Prefix(_)))
        .collect()
}
