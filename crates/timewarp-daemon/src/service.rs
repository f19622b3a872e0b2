use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use timewarp_block::BlockInspector;
use timewarp_boot::{loader_opener, Loader};
use timewarp_core::ipc::FAILED_NUMBER;
use timewarp_core::{
    snapshot_userdata, Configuration, Error, Fields, Result, Snapshot, SnapshotKind, Userdata,
};
use timewarp_package::{database_opener, Database, DatabaseOpener};
use timewarp_snapper::SnapshotManager;
use tracing::{debug, error, info, warn};

use crate::host::{Host, Subvolumes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Ready,
    ShuttingDown,
}

#[derive(Debug)]
pub struct Service {
    pub(crate) configuration: Configuration,
    pub(crate) state: ServiceState,
    pub(crate) loader: Box<dyn Loader>,
    pub(crate) open_database: DatabaseOpener,
    pub(crate) root_database: Box<dyn Database>,
    pub(crate) snapshots: SnapshotManager,
    pub(crate) subvolumes: Box<dyn Subvolumes>,
    pub(crate) default_fields: Fields,
    /// Subvolume mounted on the live root; fixed until the next reboot.
    pub(crate) root_subvolume: Option<PathBuf>,
}

impl Service {
    pub fn initialize(configuration: Configuration, host: Host) -> Result<Self> {
        let Host {
            root,
            architecture,
            snapshot_service,
            subvolumes,
            inspector,
        } = host;

        snapshot_service.ping()?;

        let open_database = database_opener(&configuration.package.database)?;
        let open_loader = loader_opener(&configuration.boot.loader)?;

        let mount_point = &configuration.boot.mount_point;
        if !mount_point.is_dir() {
            return Err(Error::initialization(format!(
                "Boot partition mount point {} does not exist",
                mount_point.display()
            )));
        }
        let mounted = fs::read_dir(mount_point)
            .map_err(|err| Error::io_at("read boot partition mount point", mount_point, err))?
            .next()
            .is_some();
        if !mounted {
            return Err(Error::initialization("Boot partition is not mounted"));
        }

        let loader = open_loader(mount_point, configuration.boot.boot_on_root, inspector.as_ref())?;

        let root_database = open_database(&root)?;
        let kernel = &configuration.package.linux;
        let linux = root_database
            .installed_package(kernel)
            .map_err(|err| match err {
                Error::PackageNotFound { .. } => {
                    Error::initialization(format!("Kernel package {kernel} not found"))
                }
                Error::InvalidPackageInformation { .. } => Error::initialization(
                    "Failed to query database package: Invalid package information",
                ),
                other => other,
            })?;

        for (label, dir) in [
            ("Boot environment", &configuration.bootenv),
            ("Snapshot", &configuration.snapshots),
        ] {
            if !dir.is_dir() {
                return Err(Error::initialization(format!(
                    "{label} directory {} does not exist",
                    dir.display()
                )));
            }
        }

        let machine_id = read_machine_id(&configuration.machine_id)?;
        let architecture = architecture.ok_or_else(|| {
            Error::initialization(format!(
                "Unsupported architecture {}",
                std::env::consts::ARCH
            ))
        })?;

        let root_file_system = inspector.filesystem(&root)?;
        let root_partition = inspector.partition(&root)?;

        let mut default_fields = Fields::new();
        default_fields.insert("architecture", architecture.efi_id());
        default_fields.insert("machine_id", machine_id);
        default_fields.insert_optional("root_file_system.uuid", root_file_system.uuid.as_deref());
        default_fields.insert_path("root_file_system.subvol", root_file_system.subvol.as_deref());
        default_fields.insert("root_file_system.fstype", root_file_system.fstype.as_str());
        default_fields.insert_optional("root_partition.path", root_partition.path.as_deref());
        default_fields.insert_optional("root_partition.uuid", root_partition.uuid.as_deref());
        default_fields.insert_optional(
            "root_partition.partition_table_type",
            root_partition.partition_table_type.as_deref(),
        );

        // Catch bad replacement fields before any request arrives.
        let dry_run = default_fields
            .clone()
            .with_package("linux", &linux)
            .with_snapshot(&Snapshot::placeholder());
        configuration
            .boot
            .entry
            .render(&dry_run)
            .and_then(|_| configuration.image_files(&dry_run, root_file_system.subvol.as_deref()))
            .map_err(|err| {
                Error::initialization(format!(
                    "Invalid replacement field in boot entry configuration: {err}"
                ))
            })?;

        info!(
            loader = loader.name(),
            database = configuration.package.database.as_str(),
            kernel = %linux.version,
            "initialized boot environment service"
        );

        Ok(Self {
            configuration,
            state: ServiceState::Uninitialized,
            loader,
            open_database,
            root_database,
            snapshots: SnapshotManager::new(snapshot_service),
            subvolumes,
            default_fields,
            root_subvolume: root_file_system.subvol,
        })
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn mark_ready(&mut self) {
        self.state = ServiceState::Ready;
    }

    pub fn shutdown(&mut self) {
        self.state = ServiceState::ShuttingDown;
    }

    /// Creates a snapshot and its boot environment. Returns the snapshot
    /// number, or `0` when any step failed; nothing done before the failing
    /// step is rolled back.
    pub fn create_snapshot(&mut self, kind: SnapshotKind, important: bool) -> u32 {
        if self.state != ServiceState::Ready {
            warn!(kind = kind.as_str(), state = ?self.state, "rejecting snapshot request");
            return FAILED_NUMBER;
        }
        match self.try_create_snapshot(kind, important) {
            Ok(number) => {
                info!(number, kind = kind.as_str(), important, "created boot environment");
                number
            }
            Err(err) => {
                self.log_create_failure(kind, &err);
                FAILED_NUMBER
            }
        }
    }

    fn try_create_snapshot(&mut self, kind: SnapshotKind, important: bool) -> Result<u32> {
        let userdata = match kind {
            SnapshotKind::Post => Userdata::new(),
            SnapshotKind::Pre | SnapshotKind::Single => snapshot_userdata(important),
        };
        let description = &self.configuration.snapper.description;
        let snapshot = match kind {
            SnapshotKind::Pre => self.snapshots.create_pre_snapshot(description, &userdata)?,
            SnapshotKind::Post => self.snapshots.create_post_snapshot(&userdata)?,
            SnapshotKind::Single => self.snapshots.create_single_snapshot(description, &userdata)?,
        };

        let linux = self
            .root_database
            .installed_package(&self.configuration.package.linux)?;
        let fields = self
            .default_fields
            .clone()
            .with_package("linux", &linux)
            .with_snapshot(&snapshot);

        self.copy_images(&fields)?;

        let number = snapshot.number;
        let bootenv = self.configuration.bootenv_path(number);
        if bootenv.exists() {
            debug!(number, path = %bootenv.display(), "boot environment already exists");
        } else {
            self.subvolumes
                .snapshot(&self.configuration.snapshot_data_path(number), &bootenv)?;
        }

        let entry = self.configuration.boot.entry.render(&fields)?;
        self.loader.add_entry(number, &entry)?;
        Ok(number)
    }

    /// Copies kernel and initrd images that vary per snapshot or kernel
    /// version and are not in place yet. Copy failures are logged only.
    fn copy_images(&self, fields: &Fields) -> Result<()> {
        let images = self
            .configuration
            .image_files(fields, self.root_subvolume.as_deref())?;
        for (source, destination) in images {
            if destination.exists() {
                continue;
            }
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| Error::io_at("create image directory", parent, err))?;
            }
            match fs::copy(&source, &destination) {
                Ok(_) => debug!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "copied boot image"
                ),
                Err(err) => warn!(
                    "Failed to copy kernel or initrd image {}: {err}",
                    source.display()
                ),
            }
        }
        Ok(())
    }

    fn log_create_failure(&self, kind: SnapshotKind, err: &Error) {
        let kernel = &self.configuration.package.linux;
        match err {
            Error::InvalidPackageInformation { .. } => error!(
                "Failed to query root package database: Package information for kernel package {kernel} is invalid"
            ),
            Error::PackageNotFound { .. } => error!(
                "Failed to query root package database: Kernel package {kernel} not found"
            ),
            Error::NoPreSnapshot => error!("Failed to create post-snapshot: {err}"),
            Error::Subvolume(message) => error!("{message}"),
            other => error!(kind = kind.as_str(), "Unexpected error: {other}"),
        }
    }

    pub fn handle_snapshot_removed(&mut self, name: &OsStr) -> bool {
        let Some(number) = name.to_str().and_then(|name| name.parse::<u32>().ok()) else {
            debug!(name = ?name, "ignoring non-snapshot entry");
            return false;
        };
        if !self.configuration.bootenv_path(number).exists() {
            return false;
        }
        self.cleanup(number, false)
    }

    /// Cleans up boot environments left behind by snapshots deleted while the
    /// daemon was not running. Failures stay out of the log.
    pub fn sweep_orphans(&mut self) -> Result<Vec<u32>> {
        let bootenvs = entry_names(&self.configuration.bootenv)?;
        let snapshots = entry_names(&self.configuration.snapshots)?;
        let mut orphans: Vec<u32> = bootenvs
            .iter()
            .filter(|name| !snapshots.contains(name))
            .filter_map(|name| name.parse().ok())
            .collect();
        orphans.sort_unstable();

        for number in &orphans {
            debug!(number, "cleaning up orphaned boot environment");
            self.cleanup(*number, true);
        }
        Ok(orphans)
    }
}

fn read_machine_id(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(raw.trim().to_string()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::initialization(format!(
            "Local machine ID configuration file {} not found",
            path.display()
        ))),
        Err(err) => Err(Error::io_at("read machine ID", path, err)),
    }
}

pub(crate) fn entry_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| Error::io_at("read directory", dir, err))? {
        let entry = entry.map_err(|err| Error::io_at("read directory", dir, err))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
