use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Errors that can occur while loading the device mapping.
///
/// All of these are fatal at load time; the gateway cannot serve
/// meaningfully without a device mapping. A mapping with zero devices is
/// valid and does not error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read device mapping {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse device mapping: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two devices claim the same cloud device id; the id maps must stay
    /// inverse of each other, so this is rejected instead of letting the
    /// last entry win.
    #[error("device id {device_id} is mapped by more than one device ({first} and {second})")]
    DuplicateDeviceId {
        device_id: String,
        first: String,
        second: String,
    },
}

/// One logical device from the mapping file.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Registry key, normalized to lowercase. Filled in at load.
    #[serde(skip)]
    pub name: String,

    pub thing_id: String,

    #[serde(default)]
    pub device_id: String,

    #[serde(default)]
    pub up_property_id: Option<String>,

    #[serde(default)]
    pub down_property_id: Option<String>,

    #[serde(default)]
    pub log_property_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Mapping {
    #[serde(default)]
    devices: HashMap<String, Device>,
}

#[derive(Debug, Default)]
struct Snapshot {
    devices: HashMap<String, Device>,
    name_to_id: HashMap<String, String>,
    id_to_name: HashMap<String, String>,
}

impl Snapshot {
    fn build(mapping: Mapping) -> Result<Self, ConfigError> {
        let mut devices = HashMap::new();
        let mut name_to_id = HashMap::new();
        let mut id_to_name: HashMap<String, String> = HashMap::new();

        for (name, mut device) in mapping.devices {
            let name = name.to_lowercase();
            device.name = name.clone();

            let device_id = device.device_id.trim().to_string();
            if !device_id.is_empty() {
                if let Some(first) = id_to_name.get(&device_id) {
                    return Err(ConfigError::DuplicateDeviceId {
                        device_id,
                        first: first.clone(),
                        second: name,
                    });
                }
                id_to_name.insert(device_id.clone(), name.clone());
                name_to_id.insert(name.clone(), device_id);
            }

            devices.insert(name, device);
        }

        Ok(Self {
            devices,
            name_to_id,
            id_to_name,
        })
    }
}

/// Registry of logical devices built from the mapping file.
///
/// Lookups are case-insensitive (names are normalized to lowercase at load
/// and at query time). A reload builds a complete new snapshot and swaps
/// it in as one assignment, so a concurrent reader always sees the device
/// table and both id maps from the same load.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the mapping file at `path`, replacing any previous snapshot.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        self.load_str(&raw).await
    }

    /// Parses a mapping document and swaps it in as the new snapshot.
    pub async fn load_str(&self, raw: &str) -> Result<(), ConfigError> {
        let mapping: Mapping = serde_json::from_str(raw)?;
        let snapshot = Snapshot::build(mapping)?;

        info!(
            devices = snapshot.devices.len(),
            device_ids = snapshot.id_to_name.len(),
            "device mapping loaded"
        );

        *self.snapshot.write().await = Arc::new(snapshot);
        Ok(())
    }

    /// Looks up a device by its logical name.
    pub async fn device(&self, name: &str) -> Option<Device> {
        let snapshot = self.snapshot.read().await.clone();
        snapshot.devices.get(&name.to_lowercase()).cloned()
    }

    /// Resolves a cloud device id to its logical name.
    pub async fn id_to_name(&self, device_id: &str) -> Option<String> {
        let snapshot = self.snapshot.read().await.clone();
        snapshot.id_to_name.get(device_id.trim()).cloned()
    }

    /// Resolves a logical name to its cloud device id, if the device has
    /// one configured.
    pub async fn name_to_id(&self, name: &str) -> Option<String> {
        let snapshot = self.snapshot.read().await.clone();
        snapshot.name_to_id.get(&name.to_lowercase()).cloned()
    }

    /// All configured device names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let snapshot = self.snapshot.read().await.clone();
        let mut names: Vec<String> = snapshot.devices.keys().cloned().collect();
        names.sort();
        names
    }
}
