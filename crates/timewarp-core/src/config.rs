use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::template::{placeholders, render, Fields};
use crate::{Entry, Error, Result};

pub const CONFIG_ENV: &str = "TIMEWARP_CONFIG";

/// Fields that resolve to the same value for every snapshot; images whose
/// paths only use these are never copied or removed.
pub const CONSTANT_FIELDS: &[&str] = &["architecture", "machine_id"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    pub bootenv: PathBuf,
    pub snapshots: PathBuf,
    #[serde(default = "default_machine_id_path")]
    pub machine_id: PathBuf,
    pub boot: BootConfig,
    pub package: PackageConfig,
    pub snapper: SnapperConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootConfig {
    pub loader: String,
    pub mount_point: PathBuf,
    #[serde(default)]
    pub boot_on_root: bool,
    pub entry: Entry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    pub database: String,
    pub linux: String,
    #[serde(default)]
    pub important: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapperConfig {
    pub name: String,
    pub description: String,
    pub cleanup_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_socket_path")]
    pub socket: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket: default_socket_path(),
        }
    }
}

fn default_machine_id_path() -> PathBuf {
    PathBuf::from("/etc/machine-id")
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/timewarp/timewarpd.sock")
}

impl Configuration {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let configuration: Self = toml::from_str(input)
            .map_err(|err| Error::initialization(format!("invalid configuration: {err}")))?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path(),
        };
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::initialization(format!(
                    "configuration file {} not found",
                    path.display()
                )));
            }
            Err(err) => return Err(Error::io_at("read configuration file", &path, err)),
        };
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("bootenv", &self.bootenv),
            ("snapshots", &self.snapshots),
            ("machine_id", &self.machine_id),
            ("boot.mount_point", &self.boot.mount_point),
            ("service.socket", &self.service.socket),
        ] {
            if !path.is_absolute() {
                return Err(Error::initialization(format!(
                    "invalid configuration: {name} must be an absolute path"
                )));
            }
        }
        for (name, value) in [
            ("boot.loader", &self.boot.loader),
            ("package.database", &self.package.database),
            ("package.linux", &self.package.linux),
            ("snapper.name", &self.snapper.name),
        ] {
            if value.trim().is_empty() {
                return Err(Error::initialization(format!(
                    "invalid configuration: {name} must not be empty"
                )));
            }
        }
        self.boot.entry.validate()
    }

    pub fn bootenv_path(&self, number: u32) -> PathBuf {
        self.bootenv.join(number.to_string())
    }

    pub fn snapshot_data_path(&self, number: u32) -> PathBuf {
        self.snapshots.join(number.to_string()).join("snapshot")
    }

    /// Source to destination mapping for every kernel and initrd image of the
    /// boot entry whose path has at least one non-constant replacement field.
    pub fn image_files(
        &self,
        fields: &Fields,
        root_subvolume: Option<&Path>,
    ) -> Result<BTreeMap<PathBuf, PathBuf>> {
        let mount_point = &self.boot.mount_point;
        let mut files = BTreeMap::new();

        for template in self.boot.entry.image_templates() {
            let varying = placeholders(template)?
                .iter()
                .any(|name| !CONSTANT_FIELDS.contains(&name.as_str()));
            if !varying {
                continue;
            }

            let rendered = PathBuf::from(render(template, fields)?);
            let mut relative = strip_root(&rendered);
            if self.boot.boot_on_root {
                // The loader may address images through the root subvolume
                // and the /boot directory; the copy only targets the mount point.
                if let Some(subvolume) = root_subvolume.map(strip_root) {
                    if !subvolume.as_os_str().is_empty() {
                        if let Ok(stripped) = relative.strip_prefix(&subvolume) {
                            relative = stripped.to_path_buf();
                        }
                    }
                }
                let mount_relative = strip_root(mount_point);
                if !mount_relative.as_os_str().is_empty() {
                    if let Ok(stripped) = relative.strip_prefix(&mount_relative) {
                        relative = stripped.to_path_buf();
                    }
                }
            }

            if relative
                .components()
                .any(|component| matches!(component, Component::ParentDir))
            {
                return Err(Error::InvalidTemplate {
                    template: template.to_string(),
                    reason: "image path must not contain '..'".to_string(),
                });
            }
            let Some(file_name) = relative.file_name() else {
                return Err(Error::InvalidTemplate {
                    template: template.to_string(),
                    reason: "image path has no file name".to_string(),
                });
            };
            files.insert(mount_point.join(file_name), mount_point.join(&relative));
        }

        Ok(files)
    }
}

fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::RootDir | Component::Prefix(_)))
        .collect()
}

pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(path);
    }

    let config_dir = std::env::var("XDG_CONFIG_DIRS")
        .ok()
        .and_then(|dirs| {
            dirs.split(':')
                .next()
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from("/etc/xdg"));
    config_dir.join("timewarp").join("timewarp.toml")
}
