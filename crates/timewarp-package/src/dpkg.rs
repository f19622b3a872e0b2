use std::fs;
use std::path::{Path, PathBuf};

use timewarp_core::{Error, Package, Result};
use tracing::debug;

use crate::Database;

#[derive(Debug, Clone)]
pub struct DpkgDatabase {
    root: PathBuf,
    status: PathBuf,
}

#[derive(Debug, Default)]
struct Stanza<'a> {
    package: Option<&'a str>,
    status: Option<&'a str>,
    version: Option<&'a str>,
}

impl DpkgDatabase {
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join("var").join("lib").join("dpkg");
        if !dir.is_dir() {
            return Err(Error::initialization(format!(
                "Local dpkg package database {} does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            status: dir.join("status"),
        })
    }
}

impl Database for DpkgDatabase {
    fn root(&self) -> &Path {
        &self.root
    }

    fn packages_by_name(&self, name: &str) -> Result<Vec<Package>> {
        let raw = fs::read_to_string(&self.status)
            .map_err(|err| Error::io_at("read package status", &self.status, err))?;

        let mut packages = Vec::new();
        for stanza in stanzas(&raw) {
            let Some(package) = stanza.package else {
                continue;
            };
            if !matches_name(package, name) {
                continue;
            }
            let installed = stanza
                .status
                .is_some_and(|status| status.split_whitespace().any(|token| token == "installed"));
            if !installed {
                continue;
            }
            let Some(version) = stanza.version else {
                return Err(Error::invalid_package(package));
            };
            debug!(package, version, "found package record");
            packages.push(Package::new(package, version));
        }

        if packages.is_empty() {
            return Err(Error::package_not_found(name));
        }
        Ok(packages)
    }
}

/// Debian kernels ship as versioned packages (`linux-image-5.10.0-8-amd64`),
/// so `name` also matches `name-<digit>...`.
fn matches_name(package: &str, name: &str) -> bool {
    if package == name {
        return true;
    }
    let Some(suffix) = package
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };
    let mut chars = suffix.chars();
    chars.next().is_some_and(|first| first.is_ascii_digit())
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '+' | '~'))
}

fn stanzas(raw: &str) -> Vec<Stanza<'_>> {
    let mut result = Vec::new();
    let mut current = Stanza::default();
    let mut empty = true;

    for line in raw.lines() {
        if line.trim().is_empty() {
            if !empty {
                result.push(std::mem::take(&mut current));
                empty = true;
            }
            continue;
        }
        // Continuation lines belong to multi-line fields we never read.
        if line.starts_with([' ', '\t']) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        empty = false;
        let value = value.trim();
        match key {
            "Package" => current.package = Some(value),
            "Status" => current.status = Some(value),
            "Version" => current.version = Some(value),
            _ => {}
        }
    }
    if !empty {
        result.push(current);
    }
    result
}
