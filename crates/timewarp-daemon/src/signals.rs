use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use nix::sys::signal::{SigSet, Signal};
use timewarp_core::{Error, Result};
use tracing::warn;

use crate::Event;

/// Blocks SIGINT and SIGTERM on the calling thread. Threads spawned
/// afterwards inherit the mask, leaving delivery to the signal thread.
pub fn block_shutdown_signals() -> Result<SigSet> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set.thread_block()
        .map_err(|err| Error::initialization(format!("Failed to block shutdown signals: {err}")))?;
    Ok(set)
}

pub fn spawn_signal_thread(set: SigSet, events: Sender<Event>) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match set.wait() {
            Ok(signal) => {
                let _ = events.send(Event::Shutdown(signal));
                return;
            }
            Err(nix::Error::EINTR) => continue,
            Err(err) => {
                warn!("Failed to wait for shutdown signals: {err}");
                return;
            }
        }
    })
}
