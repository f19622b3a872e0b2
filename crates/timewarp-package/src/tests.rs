use super::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "timewarp-package-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

fn write_alpm_desc(root: &Path, dir_name: &str, desc: &str) {
    let dir = root.join("var/lib/pacman/local").join(dir_name);
    fs::create_dir_all(&dir).expect("must create package dir");
    fs::write(dir.join("desc"), desc).expect("must write desc");
}

fn write_dpkg_status(root: &Path, status: &str) {
    let dir = root.join("var/lib/dpkg");
    fs::create_dir_all(&dir).expect("must create dpkg dir");
    fs::write(dir.join("status"), status).expect("must write status");
}

const DPKG_STATUS: &str = "\
Package: linux-image-5.10.0-7-amd64
Status: deinstall ok config-files
Priority: optional
Version: 5.10.40-1

Package: linux-image-5.10.0-8-amd64
Status: install ok installed
Priority: optional
Description: Linux 5.10 for 64-bit PCs
 The Linux kernel 5.10 and modules for use on PCs with AMD64, Intel 64 or
 VIA Nano processors.
Version: 5.10.46-4

Package: linux-image-amd64
Status: install ok installed
Version: 5.10.46-4

Package: linux-image-cloud-amd64
Status: install ok installed
Version: 5.10.46-4
";

#[test]
fn alpm_open_requires_local_database() {
    let root = test_root();
    let err = AlpmDatabase::open(&root).expect_err("must fail without database");
    assert!(matches!(err, timewarp_core::Error::Initialization(_)));
    assert!(err
        .to_string()
        .starts_with("Local ALPM package database"));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn alpm_reads_version_for_exact_name_only() {
    let root = test_root();
    write_alpm_desc(
        &root,
        "linux-5.10.1.arch1-1",
        "%NAME%\nlinux\n\n%VERSION%\n5.10.1.arch1-1\n\n%BASE%\nlinux\n",
    );
    write_alpm_desc(
        &root,
        "linux-firmware-20210511.7685cf4-1",
        "%NAME%\nlinux-firmware\n\n%VERSION%\n20210511.7685cf4-1\n",
    );

    let database = AlpmDatabase::open(&root).expect("must open");
    let packages = database.packages_by_name("linux").expect("must find linux");
    assert_eq!(packages, vec![Package::new("linux", "5.10.1.arch1-1")]);
    assert_eq!(database.root(), root.as_path());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn alpm_reports_missing_and_malformed_packages() {
    let root = test_root();
    write_alpm_desc(&root, "linux-lts-5.4.1-1", "%NAME%\nlinux-lts\n\n%DESC%\nLTS kernel\n");
    let database = AlpmDatabase::open(&root).expect("must open");

    assert!(matches!(
        database.packages_by_name("linux"),
        Err(timewarp_core::Error::PackageNotFound { .. })
    ));
    assert!(matches!(
        database.packages_by_name("linux-lts"),
        Err(timewarp_core::Error::InvalidPackageInformation { .. })
    ));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn installed_package_takes_last_listed_record() {
    let root = test_root();
    write_alpm_desc(&root, "linux-5.9.1-1", "%NAME%\nlinux\n\n%VERSION%\n5.9.1-1\n");
    write_alpm_desc(&root, "linux-5.10.1-1", "%NAME%\nlinux\n\n%VERSION%\n5.10.1-1\n");

    let database = AlpmDatabase::open(&root).expect("must open");
    let installed = database.installed_package("linux").expect("must resolve");
    // Directory names sort "linux-5.10.1-1" before "linux-5.9.1-1".
    assert_eq!(installed.version, "5.9.1-1");
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn dpkg_open_requires_database_directory() {
    let root = test_root();
    let err = DpkgDatabase::open(&root).expect_err("must fail without database");
    assert!(err
        .to_string()
        .starts_with("Local dpkg package database"));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn dpkg_matches_versioned_names_with_installed_status() {
    let root = test_root();
    write_dpkg_status(&root, DPKG_STATUS);
    let database = DpkgDatabase::open(&root).expect("must open");

    let packages = database
        .packages_by_name("linux-image")
        .expect("must find kernels");
    assert_eq!(
        packages,
        vec![Package::new("linux-image-5.10.0-8-amd64", "5.10.46-4")]
    );

    let exact = database
        .installed_package("linux-image-amd64")
        .expect("must find meta package");
    assert_eq!(exact.version, "5.10.46-4");
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn dpkg_reports_missing_package() {
    let root = test_root();
    write_dpkg_status(&root, DPKG_STATUS);
    let database = DpkgDatabase::open(&root).expect("must open");
    assert!(matches!(
        database.packages_by_name("systemd"),
        Err(timewarp_core::Error::PackageNotFound { .. })
    ));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn dpkg_rejects_installed_stanza_without_version() {
    let root = test_root();
    write_dpkg_status(&root, "Package: systemd\nStatus: install ok installed\n");
    let database = DpkgDatabase::open(&root).expect("must open");
    assert!(matches!(
        database.packages_by_name("systemd"),
        Err(timewarp_core::Error::InvalidPackageInformation { .. })
    ));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn registry_selects_backend_by_name() {
    let root = test_root();
    write_dpkg_status(&root, DPKG_STATUS);

    let open = database_opener("dpkg").expect("dpkg must be registered");
    let database = open(&root).expect("must open");
    assert!(database.installed_package("linux-image-amd64").is_ok());

    assert!(database_opener("alpm").is_ok());
    let err = database_opener("rpm").expect_err("rpm is not registered");
    assert_eq!(err.to_string(), "unknown package database 'rpm'");
    let _ = fs::remove_dir_all(&root);
}
