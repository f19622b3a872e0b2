use std::fs;
use std::path::{Path, PathBuf};

use timewarp_core::{Error, Package, Result};
use tracing::debug;

use crate::Database;

/// The local pacman database: one `<name>-<version>/desc` file per package.
#[derive(Debug, Clone)]
pub struct AlpmDatabase {
    root: PathBuf,
    local: PathBuf,
}

impl AlpmDatabase {
    pub fn open(root: &Path) -> Result<Self> {
        let local = root.join("var").join("lib").join("pacman").join("local");
        if !local.is_dir() {
            return Err(Error::initialization(format!(
                "Local ALPM package database {} does not exist",
                local.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            local,
        })
    }

    fn candidate_dirs(&self, name: &str) -> Result<Vec<PathBuf>> {
        let prefix = format!("{name}-");
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.local)
            .map_err(|err| Error::io_at("read package database", &self.local, err))?
        {
            let entry = entry.map_err(|err| Error::io_at("read package database", &self.local, err))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with(&prefix) {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

impl Database for AlpmDatabase {
    fn root(&self) -> &Path {
        &self.root
    }

    fn packages_by_name(&self, name: &str) -> Result<Vec<Package>> {
        let mut packages = Vec::new();

        for dir in self.candidate_dirs(name)? {
            let desc = dir.join("desc");
            let raw = match fs::read_to_string(&desc) {
                Ok(raw) => raw,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(Error::io_at("read package description", &desc, err)),
            };

            if field(&raw, "NAME") != Some(name) {
                continue;
            }
            let Some(version) = field(&raw, "VERSION") else {
                return Err(Error::invalid_package(name));
            };
            debug!(package = name, version, path = %desc.display(), "found package record");
            packages.push(Package::new(name, version));
        }

        if packages.is_empty() {
            return Err(Error::package_not_found(name));
        }
        Ok(packages)
    }
}

fn field<'a>(raw: &'a str, tag: &str) -> Option<&'a str> {
    let header = format!("%{tag}%");
    let mut lines = raw.lines();
    while let Some(line) = lines.next() {
        if line.trim() == header {
            return lines
                .next()
                .map(str::trim)
                .filter(|value| !value.is_empty() && !value.starts_with('%'));
        }
    }
    None
}
