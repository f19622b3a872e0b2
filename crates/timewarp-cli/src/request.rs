use std::collections::BTreeSet;
use std::io::{self, BufReader, Read};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use timewarp_core::ipc::{read_message, write_message, Request, Response};
use timewarp_core::SnapshotKind;

/// Reads whatever the package manager piped in, without waiting when
/// nothing is there.
pub(crate) fn read_pending_stdin() -> io::Result<String> {
    let stdin = io::stdin();
    let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];
    let ready = poll(&mut fds, PollTimeout::ZERO).map_err(io::Error::from)?;
    let readable = ready > 0
        && fds[0]
            .revents()
            .is_some_and(|events| events.contains(PollFlags::POLLIN));
    if !readable {
        return Ok(String::new());
    }

    let mut input = String::new();
    stdin.lock().read_to_string(&mut input)?;
    Ok(input)
}

pub(crate) fn contains_important_package(input: &str, important: &[String]) -> bool {
    let important: BTreeSet<&str> = important.iter().map(String::as_str).collect();
    input
        .split_whitespace()
        .any(|name| important.contains(name))
}

/// Post snapshots never look at stdin; the pre snapshot already did.
pub(crate) fn build_request<F>(
    kind: SnapshotKind,
    important: &[String],
    read_input: F,
) -> io::Result<Request>
where
    F: FnOnce() -> io::Result<String>,
{
    let important = match kind {
        SnapshotKind::Post => false,
        SnapshotKind::Pre | SnapshotKind::Single => {
            contains_important_package(&read_input()?, important)
        }
    };
    Ok(Request::create(kind, important))
}

/// Sends one request and waits for the snapshot number. `None` means the
/// daemon hung up without answering.
pub(crate) fn exchange(mut stream: UnixStream, request: Request) -> io::Result<Option<u32>> {
    write_message(&mut stream, &request)?;
    let response: Option<Response> = read_message(&mut BufReader::new(stream))?;
    Ok(response.map(|response| response.number))
}
