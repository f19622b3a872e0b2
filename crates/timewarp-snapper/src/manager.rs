use timewarp_core::{Error, Result, Snapshot, Userdata};
use tracing::debug;

use crate::SnapshotService;

#[derive(Debug)]
pub struct SnapshotManager {
    service: Box<dyn SnapshotService>,
    pending_pre: Option<u32>,
}

impl SnapshotManager {
    pub fn new(service: Box<dyn SnapshotService>) -> Self {
        Self {
            service,
            pending_pre: None,
        }
    }

    pub fn pending_pre(&self) -> Option<u32> {
        self.pending_pre
    }

    /// Returns the pending pre-snapshot when one exists instead of creating
    /// another.
    pub fn create_pre_snapshot(&mut self, description: &str, userdata: &Userdata) -> Result<Snapshot> {
        let number = match self.pending_pre {
            Some(number) => {
                debug!(number, "reusing pending pre-snapshot");
                number
            }
            None => {
                let number = self.service.create_pre(description, userdata)?;
                self.pending_pre = Some(number);
                number
            }
        };
        self.fetch(number)
    }

    pub fn create_post_snapshot(&mut self, userdata: &Userdata) -> Result<Snapshot> {
        let Some(pre_number) = self.pending_pre else {
            return Err(Error::NoPreSnapshot);
        };
        let number = self.service.create_post(pre_number, "", userdata)?;
        self.pending_pre = None;
        self.fetch(number)
    }

    pub fn create_single_snapshot(&mut self, description: &str, userdata: &Userdata) -> Result<Snapshot> {
        let number = self.service.create_single(description, userdata)?;
        self.fetch(number)
    }

    pub fn fetch(&self, number: u32) -> Result<Snapshot> {
        self.service.snapshot(number)
    }
}
