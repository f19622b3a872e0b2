mod architecture;
mod config;
mod entry;
mod error;
pub mod ipc;
mod package;
mod snapshot;
pub mod template;

pub use architecture::Architecture;
pub use config::{
    default_config_path, BootConfig, Configuration, PackageConfig, ServiceConfig, SnapperConfig,
    CONFIG_ENV, CONSTANT_FIELDS,
};
pub use entry::{Entry, EntryOption};
pub use error::{describe_fault, Error, Result};
pub use package::Package;
pub use snapshot::{snapshot_userdata, Snapshot, SnapshotKind, Userdata, IMPORTANT_USERDATA_KEY};
pub use template::Fields;
