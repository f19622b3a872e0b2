use std::collections::BTreeMap;

pub type Userdata = BTreeMap<String, String>;

pub const IMPORTANT_USERDATA_KEY: &str = "important";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Single,
    Pre,
    Post,
}

impl SnapshotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "pre" => Some(Self::Pre),
            "post" => Some(Self::Post),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub number: u32,
    pub kind: SnapshotKind,
    /// Number of the paired pre-snapshot, `0` unless `kind` is `Post`.
    pub pre_number: u32,
    pub timestamp: String,
    pub user: String,
    pub description: String,
    pub cleanup_algorithm: String,
    pub userdata: Userdata,
}

impl Snapshot {
    /// Stand-in used to dry-run boot entry templates before any real snapshot
    /// exists.
    pub fn placeholder() -> Self {
        Self {
            number: 0,
            kind: SnapshotKind::Single,
            pre_number: 0,
            timestamp: String::new(),
            user: String::new(),
            description: String::new(),
            cleanup_algorithm: String::new(),
            userdata: Userdata::new(),
        }
    }

    pub fn is_important(&self) -> bool {
        self.userdata
            .get(IMPORTANT_USERDATA_KEY)
            .is_some_and(|value| value == "yes")
    }
}

pub fn snapshot_userdata(important: bool) -> Userdata {
    let mut userdata = Userdata::new();
    if important {
        userdata.insert(IMPORTANT_USERDATA_KEY.to_string(), "yes".to_string());
    }
    userdata
}
