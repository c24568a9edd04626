//! Declarative driver configuration.
//!
//! A [`DriverConfig`] describes a whole object tree: the plugin, its
//! devices and their streams and controls. It can be written by hand or
//! loaded from TOML or JSON:
//!
//! ```toml
//! [plugin]
//! manufacturer = "Halite"
//!
//! [[devices]]
//! name = "Loopback"
//! device_uid = "halite-loopback"
//! available_sample_rates = [44100.0, 48000.0]
//!
//! [[devices.streams]]
//! direction = "input"
//!
//! [[devices.volume_controls]]
//! scope = "output"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceParameters};
use crate::mute::MuteParameters;
use crate::plugin::{Plugin, PluginParameters};
use crate::stream::StreamParameters;
use crate::types::ObjectId;
use crate::volume::VolumeParameters;

/// Errors loading or validating a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// Invalid TOML.
    Toml(toml::de::Error),
    /// Invalid JSON.
    Json(serde_json::Error),
    /// The file extension is neither `.toml` nor `.json`.
    UnknownFormat(String),
    /// A device entry failed validation.
    InvalidDevice { index: usize, message: String },
    /// Two devices share a UID.
    DuplicateUid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Toml(err) => write!(f, "invalid TOML config: {err}"),
            Self::Json(err) => write!(f, "invalid JSON config: {err}"),
            Self::UnknownFormat(ext) => write!(f, "unknown config format {ext:?}"),
            Self::InvalidDevice { index, message } => write!(f, "device #{index}: {message}"),
            Self::DuplicateUid(uid) => write!(f, "device uid {uid:?} is used more than once"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Toml(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

/// One device and its children.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    #[serde(flatten)]
    pub parameters: DeviceParameters,
    pub streams: Vec<StreamParameters>,
    pub volume_controls: Vec<VolumeParameters>,
    pub mute_controls: Vec<MuteParameters>,
}

/// Description of a whole driver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub plugin: PluginParameters,
    pub devices: Vec<DeviceConfig>,
}

impl DriverConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(ConfigError::Toml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            other => Err(ConfigError::UnknownFormat(other.unwrap_or_default().to_string())),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut uids = std::collections::HashSet::new();
        for (index, device) in self.devices.iter().enumerate() {
            let invalid = |err: crate::Error| ConfigError::InvalidDevice {
                index,
                message: err.to_string(),
            };
            device.parameters.validate().map_err(invalid)?;
            for stream in &device.streams {
                stream.validate().map_err(invalid)?;
            }
            for volume in &device.volume_controls {
                volume.validate().map_err(invalid)?;
            }
            let uid = &device.parameters.device_uid;
            if !uid.is_empty() && !uids.insert(uid.as_str()) {
                return Err(ConfigError::DuplicateUid(uid.clone()));
            }
        }
        Ok(())
    }

    /// Build the configured devices under `plugin`.
    ///
    /// Returns the new device ids in configuration order.
    pub fn apply(&self, plugin: &Plugin) -> crate::Result<Vec<ObjectId>> {
        let mut ids = Vec::with_capacity(self.devices.len());
        for config in &self.devices {
            let id = plugin.add_device(config.parameters.clone())?;
            let pin = plugin.device(id)?;
            if let Some(device) = pin.downcast_ref::<Device>() {
                for stream in &config.streams {
                    device.add_stream(stream.clone())?;
                }
                for volume in &config.volume_controls {
                    device.add_volume_control(volume.clone())?;
                }
                for mute in &config.mute_controls {
                    device.add_mute_control(mute.clone())?;
                }
            }
            ids.push(id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::types::{ControlScope, Direction};
    use std::sync::Arc;

    const TOML: &str = r#"
[plugin]
manufacturer = "Halite"

[[devices]]
name = "Loopback"
device_uid = "halite-loopback"
sample_rate = 44100.0
available_sample_rates = [44100.0, 48000.0]

[[devices.streams]]
direction = "input"

[[devices.streams]]
direction = "output"

[[devices.volume_controls]]
scope = "output"
min_db = -64.0
max_db = 0.0

[[devices.mute_controls]]
scope = "output"
"#;

    #[test]
    fn test_parse_toml() {
        let config = DriverConfig::from_toml_str(TOML).unwrap();
        assert_eq!(config.plugin.manufacturer, "Halite");
        let device = &config.devices[0];
        assert_eq!(device.parameters.name, "Loopback");
        assert_eq!(device.parameters.sample_rate, 44_100.0);
        assert_eq!(device.streams[0].direction, Direction::Input);
        assert_eq!(device.volume_controls[0].scope, ControlScope::Output);
        assert_eq!(device.volume_controls[0].min_db, -64.0);
    }

    #[test]
    fn test_parse_json() {
        let config = DriverConfig::from_json_str(
            r#"{"devices": [{"name": "A", "streams": [{"direction": "output"}]}]}"#,
        )
        .unwrap();
        assert_eq!(config.devices[0].parameters.sample_rate, 48_000.0);
        assert_eq!(config.devices[0].streams.len(), 1);
    }

    #[test]
    fn test_invalid_sample_rate() {
        let err = DriverConfig::from_toml_str(
            "[[devices]]\nsample_rate = 96000.0\navailable_sample_rates = [48000.0]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDevice { index: 0, .. }));
    }

    #[test]
    fn test_duplicate_uid() {
        let err = DriverConfig::from_toml_str(
            "[[devices]]\ndevice_uid = \"x\"\n[[devices]]\ndevice_uid = \"x\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateUid(uid) if uid == "x"));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            DriverConfig::from_toml_str("[[devices"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_apply_builds_tree() {
        let config = DriverConfig::from_toml_str(TOML).unwrap();
        let context = Arc::new(Context::new());
        let pin = Plugin::install(&context, config.plugin.clone()).unwrap();
        let plugin = pin.downcast_ref::<Plugin>().unwrap();

        let ids = config.apply(plugin).unwrap();
        assert_eq!(ids.len(), 1);
        let device = plugin.device(ids[0]).unwrap();
        let device = device.downcast_ref::<Device>().unwrap();
        assert_eq!(device.uid(), "halite-loopback");
        assert_eq!(device.streams(None).len(), 2);
        assert_eq!(device.controls().len(), 2);
        // Plugin, device, two streams, two controls.
        assert_eq!(context.registry().len(), 6);
    }
}
