use std::collections::BTreeMap;

use serde::Deserialize;
use timewarp_core::{Error, Result, Snapshot, SnapshotKind, Userdata};

#[derive(Debug, Deserialize)]
struct ListedSnapshot {
    number: u32,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "pre-number", default)]
    pre_number: Option<u32>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    cleanup: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    userdata: Option<Userdata>,
}

#[derive(Debug, Deserialize)]
struct ConfigListing {
    #[serde(default)]
    configs: Vec<ListedConfig>,
}

#[derive(Debug, Deserialize)]
struct ListedConfig {
    config: String,
}

pub fn parse_snapshot_listing(raw: &str, config: &str, number: u32) -> Result<Snapshot> {
    let mut listing: BTreeMap<String, Vec<ListedSnapshot>> = serde_json::from_str(raw)
        .map_err(|err| Error::SnapshotService(format!("unexpected snapper output: {err}")))?;
    let snapshots = listing
        .remove(config)
        .ok_or_else(|| Error::SnapshotService(format!("configuration {config} not listed")))?;
    let listed = snapshots
        .into_iter()
        .find(|snapshot| snapshot.number == number)
        .ok_or_else(|| Error::SnapshotService(format!("snapshot {number} not found")))?;

    let kind = SnapshotKind::parse(&listed.kind).ok_or_else(|| {
        Error::SnapshotService(format!(
            "snapshot {number} has unknown type {}",
            listed.kind
        ))
    })?;
    Ok(Snapshot {
        number: listed.number,
        kind,
        pre_number: listed.pre_number.unwrap_or_default(),
        timestamp: listed.date.unwrap_or_default(),
        user: listed.user.unwrap_or_default(),
        description: listed.description.unwrap_or_default(),
        cleanup_algorithm: listed.cleanup.unwrap_or_default(),
        userdata: listed.userdata.unwrap_or_default(),
    })
}

pub fn parse_config_names(raw: &str) -> Result<Vec<String>> {
    let listing: ConfigListing = serde_json::from_str(raw)
        .map_err(|err| Error::SnapshotService(format!("unexpected snapper output: {err}")))?;
    Ok(listing
        .configs
        .into_iter()
        .map(|config| config.config)
        .collect())
}
