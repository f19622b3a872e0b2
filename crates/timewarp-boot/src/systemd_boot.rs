use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use timewarp_core::{Entry, Error, Result};
use tracing::debug;

use crate::{require_dir, Loader};

const KEY_WIDTH: usize = "architecture".len();

#[derive(Debug, Clone)]
pub struct SystemdBootLoader {
    entries: PathBuf,
}

/// `zz-` followed by the complement of `number`: generated entries sort below
/// hand-written ones, newest first.
pub fn entry_sort_key(number: u32) -> String {
    format!("zz-{:08x}", u32::MAX - number)
}

impl SystemdBootLoader {
    pub fn open(mount_point: &Path) -> Result<Self> {
        let entries = mount_point.join("loader").join("entries");
        require_dir(&entries)?;
        Ok(Self { entries })
    }

    pub fn entry_path(&self, number: u32, entry: &Entry) -> PathBuf {
        let mut file_name = entry_sort_key(number);
        for component in [&entry.machine_id, &entry.version] {
            if let Some(value) = component.as_deref().filter(|value| !value.is_empty()) {
                file_name.push('-');
                file_name.push_str(value);
            }
        }
        if let Some(architecture) = entry.architecture.as_deref().filter(|value| !value.is_empty()) {
            file_name.push('-');
            file_name.push_str(&architecture.to_lowercase());
        }
        file_name.push_str(".conf");
        self.entries.join(file_name)
    }
}

fn render_entry(entry: &Entry) -> String {
    let mut lines = Vec::new();
    let mut push = |key: &str, value: &str| {
        if !value.is_empty() {
            lines.push(format!("{key:<KEY_WIDTH$} {value}"));
        }
    };

    push("title", entry.title.as_deref().unwrap_or_default());
    push("version", entry.version.as_deref().unwrap_or_default());
    push("machine-id", entry.machine_id.as_deref().unwrap_or_default());
    push("linux", &entry.linux);
    for initrd in &entry.initrd {
        push("initrd", initrd);
    }
    push("options", &entry.option_tokens().join(" "));
    push(
        "architecture",
        &entry.architecture.as_deref().unwrap_or_default().to_lowercase(),
    );

    let mut content = lines.join("\n");
    content.push('\n');
    content
}

impl Loader for SystemdBootLoader {
    fn name(&self) -> &'static str {
        "systemd-boot"
    }

    fn add_entry(&self, number: u32, entry: &Entry) -> Result<()> {
        let path = self.entry_path(number, entry);
        fs::write(&path, render_entry(entry))
            .map_err(|err| Error::io_at("write boot loader entry", &path, err))?;
        debug!(number, path = %path.display(), "wrote boot loader entry");
        Ok(())
    }

    fn remove_entry(&self, number: u32) -> Result<()> {
        let key = entry_sort_key(number);
        let exact = format!("{key}.conf");
        let prefix = format!("{key}-");

        let read_dir = match fs::read_dir(&self.entries) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(Error::io_at("read boot loader entries", &self.entries, err)),
        };
        for dir_entry in read_dir {
            let dir_entry =
                dir_entry.map_err(|err| Error::io_at("read boot loader entries", &self.entries, err))?;
            let file_name = dir_entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let owned = file_name == exact
                || (file_name.starts_with(&prefix) && file_name.ends_with(".conf"));
            if !owned {
                continue;
            }

            let path = dir_entry.path();
            match fs::remove_file(&path) {
                Ok(()) => debug!(number, path = %path.display(), "removed boot loader entry"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(Error::io_at("remove boot loader entry", &path, err)),
            }
        }
        Ok(())
    }
}
