use std::io;
use std::path::Path;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Initialization(String),

    #[error("package {name} not found")]
    PackageNotFound { name: String },

    #[error("package information for {name} is invalid")]
    InvalidPackageInformation { name: String },

    #[error("attempting to create post-snapshot without pre-snapshot")]
    NoPreSnapshot,

    #[error("{0}")]
    Subvolume(String),

    #[error("unknown replacement field '{field}' in '{template}'")]
    UnknownField { field: String, template: String },

    #[error("invalid format string '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("snapshot service: {0}")]
    SnapshotService(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }

    pub fn package_not_found(name: &str) -> Self {
        Self::PackageNotFound {
            name: name.to_string(),
        }
    }

    pub fn invalid_package(name: &str) -> Self {
        Self::InvalidPackageInformation {
            name: name.to_string(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Self::io(format!("failed to {action} {}", path.display()), source)
    }

    /// Errors a cleanup run expects when a boot environment is damaged or
    /// half-deleted; the startup sweep keeps these out of the log.
    pub fn is_expected_cleanup_failure(&self) -> bool {
        matches!(
            self,
            Self::Initialization(_)
                | Self::PackageNotFound { .. }
                | Self::InvalidPackageInformation { .. }
                | Self::Subvolume(_)
        )
    }
}

/// Human-readable description of a transport fault, for log and console
/// messages only.
pub fn describe_fault(kind: io::ErrorKind) -> &'static str {
    match kind {
        io::ErrorKind::NotFound => "No server",
        io::ErrorKind::ConnectionRefused => "Service unknown",
        io::ErrorKind::PermissionDenied => "Access denied",
        io::ErrorKind::AddrInUse => "Address in use",
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => "Disconnected",
        io::ErrorKind::ConnectionAborted => "No reply",
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => "Timed out",
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => "Invalid arguments",
        io::ErrorKind::UnexpectedEof => "No reply",
        io::ErrorKind::OutOfMemory => "No memory",
        io::ErrorKind::Unsupported => "Not supported",
        _ => "Failed",
    }
}
