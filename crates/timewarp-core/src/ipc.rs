use std::io::{self, BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::SnapshotKind;

pub const SERVICE_NAME: &str = "com.branchonequal.TimeWarp";

pub const FAILED_NUMBER: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum Request {
    CreatePreSnapshot { important: bool },
    CreatePostSnapshot,
    CreateSingleSnapshot { important: bool },
}

impl Request {
    pub fn create(kind: SnapshotKind, important: bool) -> Self {
        match kind {
            SnapshotKind::Pre => Self::CreatePreSnapshot { important },
            SnapshotKind::Post => Self::CreatePostSnapshot,
            SnapshotKind::Single => Self::CreateSingleSnapshot { important },
        }
    }

    pub fn kind(self) -> SnapshotKind {
        match self {
            Self::CreatePreSnapshot { .. } => SnapshotKind::Pre,
            Self::CreatePostSnapshot => SnapshotKind::Post,
            Self::CreateSingleSnapshot { .. } => SnapshotKind::Single,
        }
    }

    pub fn important(self) -> bool {
        match self {
            Self::CreatePreSnapshot { important } | Self::CreateSingleSnapshot { important } => {
                important
            }
            Self::CreatePostSnapshot => false,
        }
    }

    pub fn method(self) -> &'static str {
        match self {
            Self::CreatePreSnapshot { .. } => "CreatePreSnapshot",
            Self::CreatePostSnapshot => "CreatePostSnapshot",
            Self::CreateSingleSnapshot { .. } => "CreateSingleSnapshot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub number: u32,
}

impl Response {
    pub fn succeeded(self) -> bool {
        self.number != FAILED_NUMBER
    }
}

pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let mut line = serde_json::to_vec(message).map_err(io::Error::from)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()
}

/// Reads one JSON line; `None` when the peer closed the stream first.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> io::Result<Option<T>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let message = serde_json::from_str(line.trim_end()).map_err(io::Error::from)?;
    Ok(Some(message))
}
