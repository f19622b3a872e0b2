use std::ffi::OsString;
use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, Sender};

use nix::sys::signal::Signal;
use timewarp_core::ipc::{Request, SERVICE_NAME};
use timewarp_core::{Configuration, Result};
use tracing::{error, info};

use crate::host::Host;
use crate::monitor::spawn_snapshot_monitor;
use crate::server::{self, spawn_acceptor, SocketGuard};
use crate::service::Service;
use crate::signals::{block_shutdown_signals, spawn_signal_thread};

/// Everything the event loop reacts to. Producers run on their own threads;
/// only the loop touches the service.
#[derive(Debug)]
pub enum Event {
    Call { request: Request, reply: Sender<u32> },
    SnapshotRemoved(OsString),
    Shutdown(Signal),
    MonitorFailed(String),
}

pub fn dispatch(service: &mut Service, event: Event) -> ControlFlow<()> {
    match event {
        Event::Call { request, reply } => {
            let number = service.create_snapshot(request.kind(), request.important());
            // The client may have hung up; the snapshot exists either way.
            let _ = reply.send(number);
            ControlFlow::Continue(())
        }
        Event::SnapshotRemoved(name) => {
            service.handle_snapshot_removed(&name);
            ControlFlow::Continue(())
        }
        Event::Shutdown(signal) => {
            info!(signal = signal.as_str(), "shutting down");
            service.shutdown();
            ControlFlow::Break(())
        }
        Event::MonitorFailed(reason) => {
            error!("Snapshot monitor stopped: {reason}; orphaned boot environments are cleaned up on the next start");
            ControlFlow::Continue(())
        }
    }
}

#[derive(Debug)]
pub struct Daemon {
    service: Service,
    events: Receiver<Event>,
    socket: SocketGuard,
}

impl Daemon {
    /// Claims the socket, initializes the service, starts watching snapshots,
    /// sweeps orphaned boot environments and finally starts accepting
    /// requests.
    pub fn start(configuration: Configuration, host: Host) -> Result<Self> {
        let signals = block_shutdown_signals()?;
        let (listener, socket) = server::bind(&configuration.service.socket)?;

        let mut service = Service::initialize(configuration, host)?;
        let (sender, events) = mpsc::channel();
        spawn_snapshot_monitor(&service.configuration().snapshots, sender.clone())?;

        let orphans = service.sweep_orphans()?;
        if !orphans.is_empty() {
            info!(count = orphans.len(), "swept orphaned boot environments");
        }

        spawn_signal_thread(signals, sender.clone());
        spawn_acceptor(listener, sender);
        service.mark_ready();
        info!(service = SERVICE_NAME, socket = %socket.path().display(), "timewarpd ready");

        Ok(Self {
            service,
            events,
            socket,
        })
    }

    pub fn run(mut self) {
        while let Ok(event) = self.events.recv() {
            if dispatch(&mut self.service, event).is_break() {
                break;
            }
        }
        info!(socket = %self.socket.path().display(), "timewarpd stopped");
    }
}
