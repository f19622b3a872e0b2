use std::fmt;

use timewarp_core::{Result, Snapshot, Userdata};

mod listing;
mod manager;
mod snapper_ops;

pub use listing::{parse_config_names, parse_snapshot_listing};
pub use manager::SnapshotManager;
pub use snapper_ops::SnapperCli;

pub trait SnapshotService: fmt::Debug {
    /// Fails with an initialization error when the service or its configuration
    /// is unavailable.
    fn ping(&self) -> Result<()>;

    fn create_pre(&self, description: &str, userdata: &Userdata) -> Result<u32>;

    fn create_post(&self, pre_number: u32, description: &str, userdata: &Userdata) -> Result<u32>;

    fn create_single(&self, description: &str, userdata: &Userdata) -> Result<u32>;

    fn snapshot(&self, number: u32) -> Result<Snapshot>;
}
