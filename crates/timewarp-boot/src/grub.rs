use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use timewarp_block::{BlockInspector, Partition};
use timewarp_core::{Entry, Error, Result};
use tracing::debug;

use crate::{require_dir, Loader};

pub const FRAGMENT_FILE_NAME: &str = "grub-timewarp.cfg";

const BEGIN_PREFIX: &str = "### BEGIN Boot loader entry for snapshot ";
const END_PREFIX: &str = "### END Boot loader entry for snapshot ";
const MARKER_SUFFIX: &str = " ###";
const SUBMENU_HEADER: &str = "submenu 'Snapshots' {\n";
const SUBMENU_FOOTER: &str = "\n}\n";

/// Keeps every snapshot entry inside one generated fragment,
/// `<mount_point>/grub/grub-timewarp.cfg`, as a submenu of marker-delimited
/// blocks. Sourcing the fragment from `grub.cfg` is left to the system.
#[derive(Debug, Clone)]
pub struct GrubLoader {
    fragment: PathBuf,
    device: GrubDevice,
    modules: Vec<&'static str>,
    root_uuid: String,
    boot_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GrubDevice {
    /// `hd0,gpt1`
    pub(crate) root: String,
    /// `ahci0,gpt1`
    pub(crate) baremetal_root: String,
    pub(crate) gpt: bool,
}

impl GrubLoader {
    pub fn open(
        mount_point: &Path,
        boot_on_root: bool,
        inspector: &dyn BlockInspector,
    ) -> Result<Self> {
        let grub_dir = mount_point.join("grub");
        require_dir(&grub_dir)?;

        let partition_mount = if boot_on_root {
            Path::new("/")
        } else {
            mount_point
        };
        let partition = inspector.partition(partition_mount)?;
        let device = GrubDevice::resolve(&partition)?;

        let root_file_system = inspector.filesystem(Path::new("/"))?;
        let boot_file_system = if boot_on_root {
            root_file_system.clone()
        } else {
            inspector.filesystem(mount_point)?
        };
        let Some(boot_uuid) = boot_file_system.uuid.clone() else {
            return Err(Error::initialization(format!(
                "Unable to determine file system UUID of {}",
                partition_mount.display()
            )));
        };

        let mut modules = vec!["gzio"];
        if device.gpt {
            modules.push("part_gpt");
        }
        match boot_file_system.fstype.as_str() {
            "btrfs" => modules.push("btrfs"),
            "vfat" => modules.push("fat"),
            _ => {}
        }

        debug!(root = %device.root, baremetal = %device.baremetal_root, "resolved grub boot device");
        Ok(Self {
            fragment: grub_dir.join(FRAGMENT_FILE_NAME),
            device,
            modules,
            root_uuid: root_file_system.uuid.unwrap_or_default(),
            boot_uuid,
        })
    }

    pub fn fragment_path(&self) -> &Path {
        &self.fragment
    }

    fn render_block(&self, number: u32, entry: &Entry) -> String {
        let title = entry
            .title
            .clone()
            .unwrap_or_else(|| format!("Snapshot {number}"))
            .replace('\'', "'\\''");
        let root = &self.device.root;
        let baremetal = &self.device.baremetal_root;
        let boot_uuid = &self.boot_uuid;

        let mut lines = vec![
            format!("    {BEGIN_PREFIX}{number}{MARKER_SUFFIX}"),
            format!(
                "    menuentry '{title}' --class snapshots --class gnu-linux --class gnu --class os \
                 $menuentry_id_option 'gnulinux-snapshots-{}-{number}' {{",
                self.root_uuid
            ),
            "        load_video".to_string(),
            "        set gfxpayload=keep".to_string(),
        ];
        lines.extend(self.modules.iter().map(|module| format!("        insmod {module}")));
        lines.push(format!("        set root='{root}'"));
        lines.push("        if [ x$feature_platform_search_hint = xy ]; then".to_string());
        lines.push(format!(
            "          search --no-floppy --fs-uuid --set=root --hint-bios={root} \
             --hint-efi={root} --hint-baremetal={baremetal} {boot_uuid}"
        ));
        lines.push("        else".to_string());
        lines.push(format!("          search --no-floppy --fs-uuid --set=root {boot_uuid}"));
        lines.push("        fi".to_string());

        let label = entry.version.as_deref().unwrap_or("linux");
        lines.push(format!("        echo 'Loading Linux {label} ...'"));
        let options = entry.option_tokens();
        if options.is_empty() {
            lines.push(format!("        linux {}", entry.linux));
        } else {
            lines.push(format!("        linux {} {}", entry.linux, options.join(" ")));
        }
        if !entry.initrd.is_empty() {
            lines.push("        echo 'Loading initial ramdisk ...'".to_string());
            lines.push(format!("        initrd {}", entry.initrd.join(" ")));
        }
        lines.push("    }".to_string());
        lines.push(format!("    {END_PREFIX}{number}{MARKER_SUFFIX}"));
        lines.join("\n")
    }

    fn read_entries(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.fragment) {
            Ok(raw) => Ok(Some(entries_region(&raw).to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io_at("read grub fragment", &self.fragment, err)),
        }
    }

    fn write_entries(&self, entries: &str) -> Result<()> {
        let content = format!("{SUBMENU_HEADER}{entries}{SUBMENU_FOOTER}");
        fs::write(&self.fragment, content)
            .map_err(|err| Error::io_at("write grub fragment", &self.fragment, err))
    }
}

impl GrubDevice {
    pub(crate) fn resolve(partition: &Partition) -> Result<Self> {
        let Some(path) = partition.path.as_deref() else {
            return Err(Error::initialization(
                "Unable to determine boot partition device",
            ));
        };
        let name = path.rsplit('/').next().unwrap_or(path);
        let (controller, drive, partition_number) = parse_device_name(name)?.ok_or_else(|| {
            Error::initialization(format!("Unable to determine type of device {path}"))
        })?;

        let (table, gpt) = match partition.partition_table_type.as_deref() {
            Some("gpt") => ("gpt", true),
            Some("dos") => ("msdos", false),
            other => {
                return Err(Error::initialization(format!(
                    "Unrecognized partition table type {}",
                    other.unwrap_or("none")
                )));
            }
        };

        Ok(Self {
            root: format!("hd{drive},{table}{partition_number}"),
            baremetal_root: format!("{controller}{drive},{table}{partition_number}"),
            gpt,
        })
    }
}

/// Maps a kernel block device name to (firmware controller, drive index,
/// partition number).
fn parse_device_name(name: &str) -> Result<Option<(&'static str, u32, u32)>> {
    let disk = compile(r"^(?P<controller>[hs])d(?P<drive>[a-z])(?P<partition>\d+)$")?;
    if let Some(captures) = disk.captures(name) {
        let controller = if &captures["controller"] == "h" {
            "ata"
        } else {
            "ahci"
        };
        let drive = captures["drive"]
            .bytes()
            .next()
            .map(|letter| u32::from(letter - b'a'))
            .unwrap_or_default();
        return Ok(parse_number(&captures["partition"]).map(|partition| (controller, drive, partition)));
    }

    let nvme = compile(r"^nvme\d+n(?P<drive>\d+)p(?P<partition>\d+)$")?;
    if let Some(captures) = nvme.captures(name) {
        let drive = parse_number(&captures["drive"]).and_then(|drive| drive.checked_sub(1));
        let partition = parse_number(&captures["partition"]);
        return Ok(drive.zip(partition).map(|(drive, partition)| ("ahci", drive, partition)));
    }

    Ok(None)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|err| Error::initialization(format!("invalid device pattern {pattern}: {err}")))
}

fn parse_number(raw: &str) -> Option<u32> {
    raw.parse().ok()
}

/// The text between the start of the first BEGIN marker line and the end of
/// the last END marker. Empty when the fragment holds no blocks.
fn entries_region(raw: &str) -> &str {
    let Some(begin) = raw.find(BEGIN_PREFIX) else {
        return "";
    };
    let start = line_start(raw, begin);
    let Some(last_end) = raw.rfind(END_PREFIX) else {
        return "";
    };
    let Some(close) = raw[last_end + END_PREFIX.len()..].find(MARKER_SUFFIX) else {
        return "";
    };
    let end = last_end + END_PREFIX.len() + close + MARKER_SUFFIX.len();
    if end <= start {
        return "";
    }
    &raw[start..end]
}

fn line_start(raw: &str, index: usize) -> usize {
    raw[..index].rfind('\n').map_or(0, |newline| newline + 1)
}

/// Removes the block for `number` together with one blank separator line.
/// Returns `None` when no block for `number` exists.
pub(crate) fn remove_block(entries: &str, number: u32) -> Option<String> {
    let begin_marker = format!("{BEGIN_PREFIX}{number}{MARKER_SUFFIX}");
    let end_marker = format!("{END_PREFIX}{number}{MARKER_SUFFIX}");

    let begin = entries.find(&begin_marker)?;
    let end = begin + entries[begin..].find(&end_marker)? + end_marker.len();
    let mut start = line_start(entries, begin);
    let mut end = end;

    if entries[end..].starts_with("\n\n") {
        end += 2;
    } else if entries[..start].ends_with("\n\n") {
        start -= 2;
    }

    let mut remaining = String::with_capacity(entries.len());
    remaining.push_str(&entries[..start]);
    remaining.push_str(&entries[end..]);
    Some(remaining)
}

impl Loader for GrubLoader {
    fn name(&self) -> &'static str {
        "grub"
    }

    fn add_entry(&self, number: u32, entry: &Entry) -> Result<()> {
        let existing = self.read_entries()?.unwrap_or_default();
        let existing = remove_block(&existing, number).unwrap_or(existing);

        let mut entries = self.render_block(number, entry);
        if !existing.is_empty() {
            entries.push_str("\n\n");
            entries.push_str(&existing);
        }
        self.write_entries(&entries)?;
        debug!(number, path = %self.fragment.display(), "wrote grub entry");
        Ok(())
    }

    fn remove_entry(&self, number: u32) -> Result<()> {
        let Some(existing) = self.read_entries()? else {
            return Ok(());
        };
        let Some(remaining) = remove_block(&existing, number) else {
            return Ok(());
        };

        if remaining.contains(BEGIN_PREFIX) {
            self.write_entries(&remaining)?;
        } else {
            match fs::remove_file(&self.fragment) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(Error::io_at("remove grub fragment", &self.fragment, err)),
            }
        }
        debug!(number, path = %self.fragment.display(), "removed grub entry");
        Ok(())
    }
}
