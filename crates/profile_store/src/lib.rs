use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Keys of a persisted connection profile.
pub mod keys {
    pub const BAUD: &str = "bps";
    pub const BED_TEMP_MAX: &str = "bedTemp";
    pub const EXTRUDER_TEMP_MAX: &str = "extruderTemp";
    pub const FIRMWARE: &str = "firmware";
    pub const POST_PAUSE: &str = "postPause";
}

/// Profile fields exactly as persisted. Values are kept as text so that
/// malformed entries can fall back to defaults at connect time instead of
/// failing to load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredProfile {
    pub baud: Option<String>,
    pub bed_temp_max: Option<String>,
    pub extruder_temp_max: Option<String>,
    pub firmware: Option<String>,
    pub post_pause: Option<String>,
}

impl StoredProfile {
    fn from_fields(mut fields: BTreeMap<String, toml::Value>) -> Self {
        let mut take = |key: &str| fields.remove(key).map(value_text);
        Self {
            baud: take(keys::BAUD),
            bed_temp_max: take(keys::BED_TEMP_MAX),
            extruder_temp_max: take(keys::EXTRUDER_TEMP_MAX),
            firmware: take(keys::FIRMWARE),
            post_pause: take(keys::POST_PAUSE),
        }
    }
}

fn value_text(value: toml::Value) -> String {
    match value {
        toml::Value::String(text) => text,
        other => other.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ProfileStoreError {
    #[error("failed to read profiles from '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse profiles in '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Read-only source of named connection profiles.
pub trait ProfileStore: Send + Sync {
    /// Profile names in a stable, sorted order.
    fn list_profile_names(&self) -> Vec<String>;
    fn get_profile(&self, name: &str) -> Option<StoredProfile>;
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    profiles: BTreeMap<String, BTreeMap<String, toml::Value>>,
}

/// Profiles persisted as `[profiles.<name>]` tables in a TOML file.
#[derive(Debug, Clone)]
pub struct TomlProfileStore {
    path: PathBuf,
    profiles: BTreeMap<String, StoredProfile>,
}

impl TomlProfileStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileStoreError> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read_to_string(&path).map_err(|source| ProfileStoreError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(path, &raw)
    }

    /// Like [`TomlProfileStore::load`], but a missing file yields an empty
    /// store.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Result<Self, ProfileStoreError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "profile file not found; no profiles available");
            return Ok(Self {
                path: path.to_path_buf(),
                profiles: BTreeMap::new(),
            });
        }
        Self::load(path)
    }

    fn parse(path: PathBuf, raw: &str) -> Result<Self, ProfileStoreError> {
        let file: ProfileFile = toml::from_str(raw).map_err(|source| ProfileStoreError::Parse {
            path: path.clone(),
            source,
        })?;
        let profiles: BTreeMap<_, _> = file
            .profiles
            .into_iter()
            .map(|(name, fields)| (name, StoredProfile::from_fields(fields)))
            .collect();
        info!(path = %path.display(), count = profiles.len(), "loaded printer profiles");
        Ok(Self { path, profiles })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProfileStore for TomlProfileStore {
    fn list_profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    fn get_profile(&self, name: &str) -> Option<StoredProfile> {
        self.profiles.get(name).cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    profiles: BTreeMap<String, StoredProfile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, name: impl Into<String>, profile: StoredProfile) -> Self {
        self.insert(name, profile);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, profile: StoredProfile) {
        self.profiles.insert(name.into(), profile);
    }
}

impl ProfileStore for MemoryProfileStore {
    fn list_profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    fn get_profile(&self, name: &str) -> Option<StoredProfile> {
        self.profiles.get(name).cloned()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
