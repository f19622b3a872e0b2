mod cleanup;
mod daemon;
mod host;
mod logging;
mod monitor;
mod server;
mod service;
mod signals;

pub use daemon::{dispatch, Daemon, Event};
pub use host::{BtrfsSubvolumes, Host, Subvolumes};
pub use logging::{init_logging, LOG_ENV};
pub use monitor::spawn_snapshot_monitor;
pub use server::{bind, spawn_acceptor, SocketGuard};
pub use service::{Service, ServiceState};
pub use signals::{block_shutdown_signals, spawn_signal_thread};
