use super::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use timewarp_block::{parse_lsblk, BlockDevice, FileSystem, Partition};
use timewarp_core::EntryOption;

use crate::grub::{remove_block, GrubDevice};

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "timewarp-boot-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

#[derive(Debug)]
struct FakeInspector {
    boot_fstype: &'static str,
}

impl BlockInspector for FakeInspector {
    fn filesystem(&self, mount_point: &Path) -> timewarp_core::Result<FileSystem> {
        if mount_point == Path::new("/") {
            Ok(FileSystem {
                uuid: Some("f00d".to_string()),
                subvol: Some(PathBuf::from("/@")),
                fstype: "btrfs".to_string(),
            })
        } else {
            Ok(FileSystem {
                uuid: Some("B00B-1E5".to_string()),
                subvol: None,
                fstype: self.boot_fstype.to_string(),
            })
        }
    }

    fn block_devices(&self) -> timewarp_core::Result<Vec<BlockDevice>> {
        parse_lsblk(
            r#"{"blockdevices": [{"name":"sda", "path":"/dev/sda", "uuid":null, "pttype":"gpt", "type":"disk",
                "children": [
                    {"name":"sda1", "path":"/dev/sda1", "uuid":"B00B-1E5", "pttype":"gpt", "type":"part"},
                    {"name":"sda2", "path":"/dev/sda2", "uuid":"f00d", "pttype":"gpt", "type":"part"}
                ]}]}"#,
        )
    }
}

fn sample_entry(number: u32) -> Entry {
    let mut pairs = BTreeMap::new();
    pairs.insert("root".to_string(), "UUID=f00d".to_string());
    Entry {
        title: Some(format!("Arch Linux (snapshot {number})")),
        version: Some("5.10.1-arch1-1".to_string()),
        machine_id: Some("0123456789abcdef".to_string()),
        linux: "/vmlinuz-linux".to_string(),
        initrd: vec![
            "/intel-ucode.img".to_string(),
            "/initramfs-linux.img".to_string(),
        ],
        options: vec![
            EntryOption::Flag("rw".to_string()),
            EntryOption::Pairs(pairs),
        ],
        architecture: Some("X64".to_string()),
    }
}

fn boot_with_dir(dir: &str) -> PathBuf {
    let root = test_root();
    fs::create_dir_all(root.join(dir)).expect("must create loader dir");
    root
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("must read dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

#[test]
fn sort_key_places_newer_snapshots_first() {
    assert_eq!(entry_sort_key(1), "zz-fffffffe");
    assert_eq!(entry_sort_key(2), "zz-fffffffd");
    assert!(entry_sort_key(2) < entry_sort_key(1));
    assert!("arch.conf" < entry_sort_key(u32::MAX).as_str());
}

#[test]
fn systemd_boot_open_requires_entries_directory() {
    let root = test_root();
    let err = SystemdBootLoader::open(&root).expect_err("must fail without entries dir");
    assert!(matches!(err, Error::Initialization(_)));
    assert!(err.to_string().ends_with("loader/entries does not exist"));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn systemd_boot_writes_aligned_entry_file() {
    let root = boot_with_dir("loader/entries");
    let loader = SystemdBootLoader::open(&root).expect("must open");
    loader.add_entry(2, &sample_entry(2)).expect("must add entry");

    let path = root.join("loader/entries/zz-fffffffd-0123456789abcdef-5.10.1-arch1-1-x64.conf");
    let content = fs::read_to_string(&path).expect("entry file must exist");
    assert_eq!(
        content,
        "title        Arch Linux (snapshot 2)\n\
         version      5.10.1-arch1-1\n\
         machine-id   0123456789abcdef\n\
         linux        /vmlinuz-linux\n\
         initrd       /intel-ucode.img\n\
         initrd       /initramfs-linux.img\n\
         options      rw root=UUID=f00d\n\
         architecture x64\n"
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn systemd_boot_omits_absent_filename_components() {
    let root = boot_with_dir("loader/entries");
    let loader = SystemdBootLoader::open(&root).expect("must open");
    let entry = Entry {
        linux: "/vmlinuz-linux".to_string(),
        ..Entry::default()
    };
    assert_eq!(
        loader.entry_path(1, &entry),
        root.join("loader/entries/zz-fffffffe.conf")
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn systemd_boot_removes_only_matching_entries() {
    let root = boot_with_dir("loader/entries");
    let entries = root.join("loader/entries");
    let loader = SystemdBootLoader::open(&root).expect("must open");
    loader.add_entry(1, &sample_entry(1)).expect("must add 1");
    loader.add_entry(17, &sample_entry(17)).expect("must add 17");
    fs::write(entries.join("arch.conf"), "title Arch Linux\n").expect("must write manual entry");
    fs::write(entries.join("zz-fffffffex.conf"), "title other\n").expect("must write lookalike");

    loader.remove_entry(1).expect("must remove 1");
    assert_eq!(
        file_names(&entries),
        vec![
            "arch.conf".to_string(),
            "zz-ffffffee-0123456789abcdef-5.10.1-arch1-1-x64.conf".to_string(),
            "zz-fffffffex.conf".to_string(),
        ]
    );

    loader.remove_entry(1).expect("removing twice must succeed");
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn grub_device_maps_kernel_names_to_firmware_names() {
    let sata = GrubDevice::resolve(&Partition {
        path: Some("/dev/sda2".to_string()),
        uuid: None,
        partition_table_type: Some("gpt".to_string()),
    })
    .expect("sata must resolve");
    assert_eq!(sata.root, "hd0,gpt2");
    assert_eq!(sata.baremetal_root, "ahci0,gpt2");

    let ata = GrubDevice::resolve(&Partition {
        path: Some("/dev/hdb1".to_string()),
        uuid: None,
        partition_table_type: Some("dos".to_string()),
    })
    .expect("ata must resolve");
    assert_eq!(ata.root, "hd1,msdos1");
    assert_eq!(ata.baremetal_root, "ata1,msdos1");

    let nvme = GrubDevice::resolve(&Partition {
        path: Some("/dev/nvme0n2p3".to_string()),
        uuid: None,
        partition_table_type: Some("gpt".to_string()),
    })
    .expect("nvme must resolve");
    assert_eq!(nvme.root, "hd1,gpt3");
    assert_eq!(nvme.baremetal_root, "ahci1,gpt3");
}

#[test]
fn grub_device_rejects_unknown_devices_and_tables() {
    let err = GrubDevice::resolve(&Partition {
        path: Some("/dev/mmcblk0p1".to_string()),
        uuid: None,
        partition_table_type: Some("gpt".to_string()),
    })
    .expect_err("mmc must be rejected");
    assert_eq!(err.to_string(), "Unable to determine type of device /dev/mmcblk0p1");

    let err = GrubDevice::resolve(&Partition {
        path: Some("/dev/sda1".to_string()),
        uuid: None,
        partition_table_type: Some("atari".to_string()),
    })
    .expect_err("atari must be rejected");
    assert_eq!(err.to_string(), "Unrecognized partition table type atari");

    assert!(GrubDevice::resolve(&Partition::default()).is_err());
}

#[test]
fn grub_open_requires_grub_directory() {
    let root = test_root();
    let inspector = FakeInspector { boot_fstype: "vfat" };
    let err = GrubLoader::open(&root, false, &inspector).expect_err("must fail without grub dir");
    assert!(err.to_string().ends_with("grub does not exist"));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn grub_entry_block_references_boot_device() {
    let root = boot_with_dir("grub");
    let inspector = FakeInspector { boot_fstype: "vfat" };
    let loader = GrubLoader::open(&root, false, &inspector).expect("must open");
    loader.add_entry(7, &sample_entry(7)).expect("must add entry");

    let content = fs::read_to_string(loader.fragment_path()).expect("fragment must exist");
    assert!(content.starts_with("submenu 'Snapshots' {\n    ### BEGIN Boot loader entry for snapshot 7 ###\n"));
    assert!(content.ends_with("    ### END Boot loader entry for snapshot 7 ###\n}\n"));
    assert!(content.contains("$menuentry_id_option 'gnulinux-snapshots-f00d-7' {"));
    assert!(content.contains("        insmod gzio\n        insmod part_gpt\n        insmod fat\n"));
    assert!(content.contains("        set root='hd0,gpt1'\n"));
    assert!(content.contains(
        "--hint-bios=hd0,gpt1 --hint-efi=hd0,gpt1 --hint-baremetal=ahci0,gpt1 B00B-1E5\n"
    ));
    assert!(content.contains("        linux /vmlinuz-linux rw root=UUID=f00d\n"));
    assert!(content.contains("        initrd /intel-ucode.img /initramfs-linux.img\n"));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn grub_add_then_remove_restores_fragment_bytes() {
    let root = boot_with_dir("grub");
    let inspector = FakeInspector { boot_fstype: "vfat" };
    let loader = GrubLoader::open(&root, false, &inspector).expect("must open");

    loader.add_entry(5, &sample_entry(5)).expect("must add 5");
    loader.add_entry(70, &sample_entry(70)).expect("must add 70");
    let before = fs::read(loader.fragment_path()).expect("must read fragment");

    loader.add_entry(7, &sample_entry(7)).expect("must add 7");
    let with_seven = fs::read_to_string(loader.fragment_path()).expect("must read fragment");
    assert!(with_seven.contains("snapshot 7 ###"));
    assert!(with_seven.find("snapshot 7 ###") < with_seven.find("snapshot 70 ###"));

    loader.remove_entry(7).expect("must remove 7");
    let after = fs::read(loader.fragment_path()).expect("must read fragment");
    assert_eq!(before, after);

    loader.remove_entry(7).expect("removing twice must succeed");
    assert_eq!(fs::read(loader.fragment_path()).expect("must read fragment"), before);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn grub_removing_last_entry_deletes_fragment() {
    let root = boot_with_dir("grub");
    let inspector = FakeInspector { boot_fstype: "btrfs" };
    let loader = GrubLoader::open(&root, true, &inspector).expect("must open");

    loader.add_entry(3, &sample_entry(3)).expect("must add 3");
    assert!(loader.fragment_path().exists());
    loader.remove_entry(3).expect("must remove 3");
    assert!(!loader.fragment_path().exists());

    loader.remove_entry(3).expect("missing fragment is not an error");
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn grub_re_adding_entry_replaces_block() {
    let root = boot_with_dir("grub");
    let inspector = FakeInspector { boot_fstype: "vfat" };
    let loader = GrubLoader::open(&root, false, &inspector).expect("must open");

    loader.add_entry(4, &sample_entry(4)).expect("must add 4");
    loader.add_entry(4, &sample_entry(4)).expect("must re-add 4");
    let content = fs::read_to_string(loader.fragment_path()).expect("must read fragment");
    assert_eq!(content.matches("### BEGIN Boot loader entry for snapshot 4 ###").count(), 1);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn remove_block_matches_exact_number() {
    let entries = "    ### BEGIN Boot loader entry for snapshot 70 ###\n    body 70\n    ### END Boot loader entry for snapshot 70 ###\n\n    ### BEGIN Boot loader entry for snapshot 7 ###\n    body 7\n    ### END Boot loader entry for snapshot 7 ###";
    let remaining = remove_block(entries, 7).expect("block 7 exists");
    assert_eq!(
        remaining,
        "    ### BEGIN Boot loader entry for snapshot 70 ###\n    body 70\n    ### END Boot loader entry for snapshot 70 ###"
    );
    assert!(remove_block(entries, 8).is_none());
}

#[test]
fn registry_selects_loader_by_name() {
    let root = boot_with_dir("loader/entries");
    let inspector = FakeInspector { boot_fstype: "vfat" };
    let open = loader_opener("systemd-boot").expect("systemd-boot must be registered");
    let loader = open(&root, false, &inspector).expect("must open");
    assert_eq!(loader.name(), "systemd-boot");

    assert!(loader_opener("grub").is_ok());
    let err = loader_opener("lilo").expect_err("lilo is not registered");
    assert_eq!(err.to_string(), "unknown boot loader 'lilo'");
    let _ = fs::remove_dir_all(&root);
}
