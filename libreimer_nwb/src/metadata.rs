use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;

use super::error::MetadataError;

/// Load the default metadata for windows
#[cfg(target_family = "windows")]
fn load_default_metadata() -> &'static str {
    include_str!("data\\default_metadata.yml")
}

/// Load the default metadata for macos and linux
#[cfg(target_family = "unix")]
fn load_default_metadata() -> &'static str {
    include_str!("data/default_metadata.yml")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NwbFileMetadata {
    pub session_description: String,
    #[serde(default)]
    pub experiment_description: String,
    #[serde(default)]
    pub lab: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub experimenter: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectMetadata {
    pub species: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub manufacturer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticalChannelMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub emission_lambda: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingPlaneMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub device: String,
    pub excitation_lambda: f64,
    /// Overridden by the scan frame rate when the raw imaging provides one
    #[serde(default)]
    pub imaging_rate: f64,
    pub indicator: String,
    pub location: String,
    pub optical_channel: OpticalChannelMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoPhotonSeriesMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub imaging_plane: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OphysMetadata {
    #[serde(rename = "Device")]
    pub devices: Vec<DeviceMetadata>,
    #[serde(rename = "ImagingPlane")]
    pub imaging_planes: Vec<ImagingPlaneMetadata>,
    #[serde(rename = "TwoPhotonSeries")]
    pub two_photon_series: Vec<TwoPhotonSeriesMetadata>,
}

/// Descriptive metadata that the pipeline tables do not carry.
///
/// Uses the same layout as the neuroconv metadata files the lab already maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "NWBFile")]
    pub nwbfile: NwbFileMetadata,
    #[serde(rename = "Subject")]
    pub subject: SubjectMetadata,
    #[serde(rename = "Ophys")]
    pub ophys: OphysMetadata,
}

impl Metadata {
    /// The metadata bundled with the converter
    pub fn bundled() -> Result<Self, MetadataError> {
        Ok(serde_yaml::from_str::<Self>(load_default_metadata())?)
    }

    /// The bundled metadata, updated with the contents of an editable YAML file if one is given
    pub fn load(editable_path: Option<&Path>) -> Result<Self, MetadataError> {
        let mut base = serde_yaml::from_str::<Value>(load_default_metadata())?;
        if let Some(path) = editable_path {
            if !path.exists() {
                return Err(MetadataError::BadFilePath(path.to_path_buf()));
            }
            let yaml_str = std::fs::read_to_string(path)?;
            let update = serde_yaml::from_str::<Value>(&yaml_str)?;
            deep_update(&mut base, update);
            spdlog::info!("Applied metadata overrides from {}", path.display());
        }
        Ok(serde_yaml::from_value::<Self>(base)?)
    }

    /// Two-photon series description for a (1-based) field
    pub fn photon_series(&self, field: u32) -> Result<&TwoPhotonSeriesMetadata, MetadataError> {
        field
            .checked_sub(1)
            .and_then(|idx| self.ophys.two_photon_series.get(idx as usize))
            .ok_or(MetadataError::MissingPhotonSeries(field))
    }

    pub fn imaging_plane(&self, name: &str) -> Result<&ImagingPlaneMetadata, MetadataError> {
        self.ophys
            .imaging_planes
            .iter()
            .find(|plane| plane.name == name)
            .ok_or_else(|| MetadataError::MissingImagingPlane(name.to_string()))
    }

    pub fn device(&self, name: &str) -> Result<&DeviceMetadata, MetadataError> {
        self.ophys
            .devices
            .iter()
            .find(|device| device.name == name)
            .ok_or_else(|| MetadataError::MissingDevice(name.to_string()))
    }
}

/// Recursively merge `update` into `base`: mappings merge key by key, every other value
/// (including sequences) replaces what was there.
pub fn deep_update(base: &mut Value, update: Value) {
    match (base, update) {
        (Value::Mapping(base_map), Value::Mapping(update_map)) => {
            for (key, value) in update_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_update(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, update) => *base = update,
    }
}
