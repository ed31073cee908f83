use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::cloud::{format_device_log, CloudProxy, PublishError, ReadError};
use crate::registry::{Device, DeviceRegistry};
use crate::store::{LogFileInfo, LogStore, StoreError};

/// Trigger direction, mapping to a device's up/down property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Error)]
#[error("direction must be 'up' or 'down'")]
pub struct InvalidDirection;

impl FromStr for Direction {
    type Err = InvalidDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            _ => Err(InvalidDirection),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// The device exists but has no property configured for the requested
    /// direction. Raised before any cloud call.
    #[error("device {device} has no {direction} property configured")]
    MissingProperty { device: String, direction: Direction },

    #[error(transparent)]
    Publish(#[from] PublishError),
}

#[derive(Debug, Error)]
pub enum DeviceLogError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("device {0} has no log property configured")]
    MissingLogProperty(String),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

#[derive(Debug, Error)]
pub enum LocalLogError {
    #[error("unknown device name: {0}")]
    UnknownName(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The gateway's operation surface, composing the device registry, the
/// cloud proxy and the local log store. The HTTP layer only parses
/// requests and calls these verbs.
pub struct Gateway {
    registry: Arc<DeviceRegistry>,
    cloud: CloudProxy,
    store: LogStore,
}

impl Gateway {
    pub fn new(registry: Arc<DeviceRegistry>, cloud: CloudProxy, store: LogStore) -> Self {
        Self {
            registry,
            cloud,
            store,
        }
    }

    /// All configured device names.
    pub async fn list_devices(&self) -> Vec<String> {
        self.registry.names().await
    }

    /// Pulses the device's up or down trigger property.
    pub async fn trigger(&self, name: &str, direction: Direction) -> Result<String, TriggerError> {
        let device = self
            .registry
            .device(name)
            .await
            .ok_or_else(|| TriggerError::UnknownDevice(name.to_string()))?;

        let property_id = match direction {
            Direction::Up => device.up_property_id.as_deref(),
            Direction::Down => device.down_property_id.as_deref(),
        }
        .ok_or_else(|| TriggerError::MissingProperty {
            device: device.name.clone(),
            direction,
        })?;

        let response = self
            .cloud
            .publish_true(&device.thing_id, property_id, &device.device_id)
            .await?;
        info!(device = %device.name, %direction, "trigger published");
        Ok(response)
    }

    /// Reads the device's remote debug log and reflows it for display,
    /// with an update-time footer when the platform reports one.
    pub async fn read_device_log(&self, name: &str) -> Result<String, DeviceLogError> {
        let (device, log_property) = self.device_log_property(name).await?;

        let snapshot = self
            .cloud
            .read_property(&device.thing_id, &log_property)
            .await?;
        let mut pretty = format_device_log(&snapshot.value_text());
        if let Some(updated_at) = snapshot.updated_at {
            pretty.push_str(&format!("\n\n(updated {updated_at})"));
        }
        Ok(pretty)
    }

    /// Clears the device's remote debug log by publishing an empty string
    /// to the log property.
    pub async fn clear_device_log(&self, name: &str) -> Result<String, DeviceLogError> {
        let (device, log_property) = self.device_log_property(name).await?;

        let response = self
            .cloud
            .publish_value(
                &device.thing_id,
                &log_property,
                &device.device_id,
                Value::String(String::new()),
            )
            .await?;
        info!(device = %device.name, "remote debug log cleared");
        Ok(response)
    }

    pub async fn append_local_log(&self, name: &str, lines: &[String]) -> Result<(), LocalLogError> {
        self.require_known(name).await?;
        Ok(self.store.append(name, lines).await?)
    }

    pub async fn append_local_log_by_device_id(
        &self,
        device_id: &str,
        lines: &[String],
    ) -> Result<(), LocalLogError> {
        Ok(self.store.append_by_device_id(device_id, lines).await?)
    }

    pub async fn tail_local_log(
        &self,
        name: &str,
        max_lines: usize,
    ) -> Result<String, LocalLogError> {
        self.require_known(name).await?;
        Ok(self.store.tail(name, max_lines).await?)
    }

    pub async fn clear_local_log(&self, name: &str) -> Result<(), LocalLogError> {
        self.require_known(name).await?;
        Ok(self.store.clear(name).await?)
    }

    pub async fn list_local_logs(&self) -> Result<Vec<LogFileInfo>, LocalLogError> {
        Ok(self.store.list().await?)
    }

    async fn device_log_property(&self, name: &str) -> Result<(Device, String), DeviceLogError> {
        let device = self
            .registry
            .device(name)
            .await
            .ok_or_else(|| DeviceLogError::UnknownDevice(name.to_string()))?;
        let log_property = device
            .log_property_id
            .clone()
            .ok_or_else(|| DeviceLogError::MissingLogProperty(device.name.clone()))?;
        Ok((device, log_property))
    }

    async fn require_known(&self, name: &str) -> Result<(), LocalLogError> {
        if self.registry.device(name).await.is_none() {
            return Err(LocalLogError::UnknownName(name.to_string()));
        }
        Ok(())
    }
}
