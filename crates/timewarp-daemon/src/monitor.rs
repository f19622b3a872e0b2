use std::path::Path;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use timewarp_core::{Error, Result};
use tracing::debug;

use crate::Event;

/// Watches the snapshot directory for entries deleted or moved away. The
/// watch is registered before this returns, so nothing removed afterwards is
/// missed.
pub fn spawn_snapshot_monitor(snapshots: &Path, events: Sender<Event>) -> Result<JoinHandle<()>> {
    let watch_failed = |err: nix::Error| {
        Error::initialization(format!(
            "Failed to monitor snapshot directory {}: {err}",
            snapshots.display()
        ))
    };
    let inotify = Inotify::init(InitFlags::IN_CLOEXEC).map_err(watch_failed)?;
    inotify
        .add_watch(
            snapshots,
            AddWatchFlags::IN_DELETE | AddWatchFlags::IN_MOVED_FROM,
        )
        .map_err(watch_failed)?;
    debug!(path = %snapshots.display(), "watching snapshot directory");

    Ok(thread::spawn(move || loop {
        let batch = match inotify.read_events() {
            Ok(batch) => batch,
            Err(nix::Error::EINTR) => continue,
            Err(err) => {
                let _ = events.send(Event::MonitorFailed(format!("inotify read failed: {err}")));
                return;
            }
        };

        for event in batch {
            if event.mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
                let _ = events.send(Event::MonitorFailed(
                    "inotify queue overflow (deletions may be lost)".to_string(),
                ));
                continue;
            }
            if !event
                .mask
                .intersects(AddWatchFlags::IN_DELETE | AddWatchFlags::IN_MOVED_FROM)
            {
                continue;
            }
            let Some(name) = event.name else {
                continue;
            };
            if events.send(Event::SnapshotRemoved(name)).is_err() {
                return;
            }
        }
    }))
}
