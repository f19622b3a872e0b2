use super::*;
use std::io::{BufRead, BufReader, Write};
use std::thread;

use clap::error::ErrorKind;
use timewarp_core::ipc::{Request, Response};

use crate::completion::{write_completions_script, CliCompletionShell};
use crate::render::{render_error_line, OutputStyle, FAILURE_MESSAGE};
use crate::request::{build_request, contains_important_package, exchange};

fn important() -> Vec<String> {
    vec!["linux".to_string(), "systemd".to_string()]
}

#[test]
fn create_requires_known_type() {
    let cli = Cli::try_parse_from(["timewarp", "create", "--type", "pre"]).expect("must parse");
    assert!(matches!(
        cli.command,
        Commands::Create {
            kind: SnapshotType::Pre
        }
    ));

    let err = Cli::try_parse_from(["timewarp", "create", "--type", "weekly"])
        .expect_err("unknown type must be rejected");
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let err = Cli::try_parse_from(["timewarp", "create"]).expect_err("type is required");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn config_flag_is_global_to_create() {
    let cli = Cli::try_parse_from([
        "timewarp",
        "--config",
        "/etc/timewarp.toml",
        "create",
        "--type",
        "single",
    ])
    .expect("must parse");
    assert_eq!(cli.config, Some(PathBuf::from("/etc/timewarp.toml")));
}

#[test]
fn important_packages_are_matched_by_whole_name() {
    assert!(contains_important_package("vim\nlinux\n", &important()));
    assert!(contains_important_package("  systemd\tbash ", &important()));
    assert!(!contains_important_package("linux-firmware linux-headers", &important()));
    assert!(!contains_important_package("", &important()));
    assert!(!contains_important_package("linux", &[]));
}

#[test]
fn pre_and_single_requests_carry_importance() {
    let request = build_request(SnapshotKind::Pre, &important(), || Ok("linux".to_string()))
        .expect("must build");
    assert_eq!(request, Request::CreatePreSnapshot { important: true });

    let request = build_request(SnapshotKind::Single, &important(), || Ok("vim".to_string()))
        .expect("must build");
    assert_eq!(request, Request::CreateSingleSnapshot { important: false });
}

#[test]
fn post_request_ignores_stdin() {
    let request = build_request(SnapshotKind::Post, &important(), || {
        panic!("post snapshots must not read stdin")
    })
    .expect("must build");
    assert_eq!(request, Request::CreatePostSnapshot);
}

#[test]
fn exchange_returns_reply_number() {
    let (client, server) = UnixStream::pair().expect("socket pair");
    let daemon = thread::spawn(move || {
        let mut reader = BufReader::new(server.try_clone().expect("clone"));
        let mut line = String::new();
        reader.read_line(&mut line).expect("must read request");
        let mut server = server;
        writeln!(server, "{{\"number\":42}}").expect("must reply");
        line
    });

    let number = exchange(client, Request::CreateSingleSnapshot { important: true })
        .expect("exchange must succeed");
    assert_eq!(number, Some(42));
    assert_eq!(
        daemon.join().expect("daemon thread").trim_end(),
        r#"{"method":"CreateSingleSnapshot","important":true}"#
    );
}

#[test]
fn exchange_reports_missing_reply() {
    let (client, server) = UnixStream::pair().expect("socket pair");
    let daemon = thread::spawn(move || {
        let mut line = String::new();
        BufReader::new(&server)
            .read_line(&mut line)
            .expect("must read request");
    });

    let number = exchange(client, Request::CreatePostSnapshot).expect("exchange must succeed");
    daemon.join().expect("daemon thread");
    assert_eq!(number, None);
}

#[test]
fn failed_reply_is_zero() {
    assert!(!Response { number: 0 }.succeeded());
    assert!(Response { number: 3 }.succeeded());
}

#[test]
fn error_lines_are_styled_only_when_rich() {
    assert_eq!(
        render_error_line(OutputStyle::Plain, FAILURE_MESSAGE),
        "Operation failed. Check the system log for details."
    );
    let rich = render_error_line(OutputStyle::Rich, FAILURE_MESSAGE);
    assert!(rich.starts_with("\u{1b}["));
    assert!(rich.contains(FAILURE_MESSAGE));
}

#[test]
fn completions_cover_create_command() {
    let mut script = Vec::new();
    write_completions_script(CliCompletionShell::Bash, &mut script).expect("must generate");
    let script = String::from_utf8(script).expect("utf-8 script");
    assert!(script.contains("timewarp"));
    assert!(script.contains("create"));
    assert!(script.contains("--type"));
}
