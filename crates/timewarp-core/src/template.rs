use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::{Error, Package, Result, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    values: BTreeMap<String, String>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn insert_optional(&mut self, name: impl Into<String>, value: Option<&str>) {
        self.insert(name, value.unwrap_or_default());
    }

    pub fn insert_path(&mut self, name: impl Into<String>, value: Option<&Path>) {
        let rendered = value.map(|path| path.display().to_string());
        self.insert_optional(name, rendered.as_deref());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn extend(&mut self, other: &Fields) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn with_package(mut self, prefix: &str, package: &Package) -> Self {
        self.insert(format!("{prefix}.name"), package.name.as_str());
        self.insert(format!("{prefix}.version"), package.version.as_str());
        self
    }

    pub fn with_snapshot(mut self, snapshot: &Snapshot) -> Self {
        self.insert("snapshot.number", snapshot.number.to_string());
        self.insert("snapshot.type", snapshot.kind.as_str());
        self.insert("snapshot.pre_number", snapshot.pre_number.to_string());
        self.insert("snapshot.date", snapshot.timestamp.as_str());
        self.insert("snapshot.user", snapshot.user.as_str());
        self.insert("snapshot.description", snapshot.description.as_str());
        self.insert(
            "snapshot.cleanup_algorithm",
            snapshot.cleanup_algorithm.as_str(),
        );
        for (key, value) in &snapshot.userdata {
            self.insert(format!("snapshot.userdata.{key}"), value.as_str());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Field(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>> {
    let invalid = |reason: &str| Error::InvalidTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut index = 0;
    let bytes = template.as_bytes();
    while index < bytes.len() {
        match bytes[index] {
            b'{' if bytes.get(index + 1) == Some(&b'{') => {
                segments.push(Segment::Literal(&template[literal_start..index + 1]));
                index += 2;
                literal_start = index;
            }
            b'}' if bytes.get(index + 1) == Some(&b'}') => {
                segments.push(Segment::Literal(&template[literal_start..index + 1]));
                index += 2;
                literal_start = index;
            }
            b'{' => {
                let Some(length) = template[index + 1..].find('}') else {
                    return Err(invalid("unterminated replacement field"));
                };
                let name = &template[index + 1..index + 1 + length];
                if name.is_empty() {
                    return Err(invalid("empty replacement field"));
                }
                if !name
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
                {
                    return Err(invalid(&format!("invalid replacement field '{name}'")));
                }
                segments.push(Segment::Literal(&template[literal_start..index]));
                segments.push(Segment::Field(name));
                index += length + 2;
                literal_start = index;
            }
            b'}' => return Err(invalid("single '}' encountered")),
            _ => index += 1,
        }
    }
    segments.push(Segment::Literal(&template[literal_start..]));
    segments.retain(|segment| *segment != Segment::Literal(""));
    Ok(segments)
}

pub fn placeholders(template: &str) -> Result<Vec<String>> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Field(name) => Some(name.to_string()),
            Segment::Literal(_) => None,
        })
        .collect())
}

pub fn render(template: &str, fields: &Fields) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => rendered.push_str(text),
            Segment::Field(name) => {
                let value = fields.get(name).ok_or_else(|| Error::UnknownField {
                    field: name.to_string(),
                    template: template.to_string(),
                })?;
                rendered.push_str(value);
            }
        }
    }
    Ok(rendered)
}

/// Substitutes every string nested anywhere in `value`. Non-string scalars
/// are copied unchanged.
pub fn render_value(value: &Value, fields: &Fields) -> Result<Value> {
    Ok(match value {
        Value::String(template) => Value::String(render(template, fields)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_value(item, fields))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(members) => {
            let mut rendered = serde_json::Map::with_capacity(members.len());
            for (name, member) in members {
                rendered.insert(name.clone(), render_value(member, fields)?);
            }
            Value::Object(rendered)
        }
        other => other.clone(),
    })
}

pub fn validate_value(value: &Value) -> Result<()> {
    match value {
        Value::String(template) => parse(template).map(|_| ()),
        Value::Array(items) => items.iter().try_for_each(validate_value),
        Value::Object(members) => members.values().try_for_each(validate_value),
        _ => Ok(()),
    }
}
