use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::template::{render_value, validate_value, Fields};
use crate::{Error, Result};

/// Kernel command-line option: a bare token (`rw`) or name/value pairs
/// (`{ root = "UUID=..." }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryOption {
    Flag(String),
    Pairs(BTreeMap<String, String>),
}

impl EntryOption {
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Self::Flag(token) => vec![token.clone()],
            Self::Pairs(pairs) => pairs
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    pub title: Option<String>,
    pub version: Option<String>,
    pub machine_id: Option<String>,
    pub linux: String,
    #[serde(default)]
    pub initrd: Vec<String>,
    #[serde(default)]
    pub options: Vec<EntryOption>,
    pub architecture: Option<String>,
}

impl Entry {
    pub fn render(&self, fields: &Fields) -> Result<Self> {
        let rendered = render_value(&self.to_value()?, fields)?;
        serde_json::from_value(rendered).map_err(|err| Error::InvalidTemplate {
            template: self.linux.clone(),
            reason: format!("rendered boot entry is malformed: {err}"),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.linux.trim().is_empty() {
            return Err(Error::initialization(
                "boot entry kernel image path must not be empty",
            ));
        }
        validate_value(&self.to_value()?)
    }

    /// Kernel image first, then initrd images.
    pub fn image_templates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.linux.as_str()).chain(self.initrd.iter().map(String::as_str))
    }

    pub fn option_tokens(&self) -> Vec<String> {
        self.options.iter().flat_map(EntryOption::tokens).collect()
    }

    fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|err| Error::InvalidTemplate {
            template: self.linux.clone(),
            reason: err.to_string(),
        })
    }
}
