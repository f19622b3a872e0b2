use std::fs;
use std::io::{self, BufReader};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use timewarp_core::ipc::{read_message, write_message, Request, Response, SERVICE_NAME};
use timewarp_core::{describe_fault, Error, Result};
use tracing::{debug, warn};

use crate::Event;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct SocketGuard {
    path: PathBuf,
}

impl SocketGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove socket {}: {err}", self.path.display());
            }
        }
    }
}

/// Claims the service socket. Fails when another daemon answers on it; a
/// socket file nobody listens on is replaced.
pub fn bind(path: &Path) -> Result<(UnixListener, SocketGuard)> {
    if UnixStream::connect(path).is_ok() {
        return Err(Error::initialization("timewarpd is already running"));
    }
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale socket"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(Error::io_at("remove stale socket", path, err)),
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::io_at("create socket directory", parent, err))?;
    }

    let listener = UnixListener::bind(path).map_err(|err| {
        Error::initialization(format!(
            "Failed to publish {SERVICE_NAME} on {}: {}",
            path.display(),
            describe_fault(err.kind())
        ))
    })?;
    Ok((
        listener,
        SocketGuard {
            path: path.to_path_buf(),
        },
    ))
}

pub fn spawn_acceptor(listener: UnixListener, events: Sender<Event>) -> JoinHandle<()> {
    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("Failed to accept connection: {}", describe_fault(err.kind()));
                    continue;
                }
            };
            if let Err(closed) = handle_connection(stream, &events) {
                debug!("{closed}");
                return;
            }
        }
    })
}

/// Errors only when the event loop is gone.
fn handle_connection(mut stream: UnixStream, events: &Sender<Event>) -> std::result::Result<(), &'static str> {
    if let Err(err) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        warn!("Failed to configure connection: {}", describe_fault(err.kind()));
        return Ok(());
    }
    let reader = match stream.try_clone() {
        Ok(reader) => reader,
        Err(err) => {
            warn!("Failed to read request: {}", describe_fault(err.kind()));
            return Ok(());
        }
    };

    let request: Request = match read_message(&mut BufReader::new(reader)) {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(err) => {
            warn!("Failed to read request: {}", describe_fault(err.kind()));
            return Ok(());
        }
    };
    debug!(method = request.method(), "received request");

    let (reply, answer) = mpsc::channel();
    if events.send(Event::Call { request, reply }).is_err() {
        return Err("event loop stopped; no longer accepting requests");
    }
    // A dropped reply means the loop shut down before handling the request.
    let Ok(number) = answer.recv() else {
        return Err("event loop stopped before answering");
    };

    if let Err(err) = write_message(&mut stream, &Response { number }) {
        warn!(
            method = request.method(),
            "Failed to send reply: {}",
            describe_fault(err.kind())
        );
    }
    Ok(())
}
