//! Metadata records produced for leaf secrets.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

use super::path::SecretPath;

/// Metadata of one leaf secret, as of its current version.
///
/// Secret values are never read; only the store's metadata endpoint is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMetadata {
    pub path: SecretPath,
    pub created_time: DateTime<Utc>,
    /// Set when the current version has been soft-deleted
    pub deletion_time: Option<DateTime<Utc>>,
    pub destroyed: bool,
    pub version: u64,
}

impl SecretMetadata {
    /// Build a record for `path` from the store's metadata document.
    pub fn from_raw(path: SecretPath, raw: RawMetadata) -> Self {
        let created_time = parse_time(&raw.created_time).unwrap_or_else(|| {
            tracing::debug!(path = %path, created_time = %raw.created_time, "Unparseable created_time");
            DateTime::<Utc>::default()
        });

        let current = raw.versions.get(&raw.current_version.to_string());
        let deletion_time = current.and_then(|v| parse_time(&v.deletion_time));
        let destroyed = current.map(|v| v.destroyed).unwrap_or(false);

        Self { path, created_time, deletion_time, destroyed, version: raw.current_version }
    }

    pub fn mount(&self) -> &str {
        &self.path.mount
    }

    pub fn key(&self) -> String {
        self.path.key()
    }
}

impl Serialize for SecretMetadata {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut record = serializer.serialize_struct("SecretMetadata", 8)?;
        record.serialize_field("mount", &self.path.mount)?;
        record.serialize_field("path", &self.path.path)?;
        record.serialize_field("name", &self.path.name)?;
        record.serialize_field("key", &self.path.key())?;
        record.serialize_field("created_time", &self.created_time)?;
        record.serialize_field("deletion_time", &self.deletion_time)?;
        record.serialize_field("destroyed", &self.destroyed)?;
        record.serialize_field("version", &self.version)?;
        record.end()
    }
}

/// Metadata document for one key as returned by the KV v2 metadata endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMetadata {
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub current_version: u64,
    #[serde(default)]
    pub versions: HashMap<String, RawVersion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVersion {
    #[serde(default)]
    pub deletion_time: String,
    #[serde(default)]
    pub destroyed: bool,
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.with_timezone(&Utc))
}
