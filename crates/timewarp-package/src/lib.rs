use std::fmt;
use std::path::Path;

use timewarp_core::{Error, Package, Result};

mod alpm;
mod dpkg;

pub use alpm::AlpmDatabase;
pub use dpkg::DpkgDatabase;

pub trait Database: fmt::Debug {
    fn root(&self) -> &Path;

    /// Every record matching `name`. Never empty on success; ordering is
    /// backend-defined and does not follow version order.
    fn packages_by_name(&self, name: &str) -> Result<Vec<Package>>;

    /// The last record returned by `packages_by_name`. Systems with several
    /// versioned kernel packages installed side by side get whichever one the
    /// backend lists last.
    fn installed_package(&self, name: &str) -> Result<Package> {
        self.packages_by_name(name)?
            .pop()
            .ok_or_else(|| Error::package_not_found(name))
    }
}

pub type DatabaseOpener = fn(&Path) -> Result<Box<dyn Database>>;

pub const DATABASES: &[(&str, DatabaseOpener)] = &[("alpm", open_alpm), ("dpkg", open_dpkg)];

fn open_alpm(root: &Path) -> Result<Box<dyn Database>> {
    Ok(Box::new(AlpmDatabase::open(root)?))
}

fn open_dpkg(root: &Path) -> Result<Box<dyn Database>> {
    Ok(Box::new(DpkgDatabase::open(root)?))
}

pub fn database_opener(name: &str) -> Result<DatabaseOpener> {
    DATABASES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, opener)| *opener)
        .ok_or_else(|| Error::initialization(format!("unknown package database '{name}'")))
}

#[cfg(test)]
mod tests;
