use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::UtcOffset;

use super::error::ConfigError;
use super::keys::SessionKey;

const STUB_DIRECTORY: &str = "nwb_stub";

/// Structure representing the application configuration. Contains pathing and conversion options.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory of per-session pipeline exports
    pub export_path: PathBuf,
    /// Root of the raw imaging data, one `{animal}_{session}_{scan}` folder per session
    pub data_path: PathBuf,
    pub output_path: PathBuf,
    /// Editable metadata YAML applied over the bundled defaults
    pub metadata_path: Option<PathBuf>,
    pub stub_test: bool,
    pub stub_frames: usize,
    pub number_of_fields: usize,
    /// Explicit [start, stop) frame rows of each field. An even split is used when absent.
    pub fov_boundaries: Option<Vec<[usize; 2]>>,
    /// `{animal_id}` and `{session}` are substituted per session
    pub file_pattern: String,
    pub respiration_recording_idx: u32,
    /// Deflate level for written datasets
    pub compression: Option<u8>,
    pub timezone_offset_hours: i8,
}

impl Default for Config {
    /// Generate a new Config object. All paths will be empty/invalid
    fn default() -> Self {
        Self {
            export_path: PathBuf::from("None"),
            data_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            metadata_path: None,
            stub_test: false,
            stub_frames: 100,
            number_of_fields: 3,
            fov_boundaries: None,
            file_pattern: String::from("{animal_id}_{session}_*.tif"),
            respiration_recording_idx: 1,
            compression: Some(4),
            timezone_offset_hours: 0,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        std::fs::write(config_path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Get the folder holding the raw imaging files of a session
    pub fn get_session_folder(&self, key: &SessionKey) -> PathBuf {
        self.data_path.join(format!(
            "{}_{}_{}",
            key.animal_id,
            key.session,
            key.scan_idx.unwrap_or(1)
        ))
    }

    /// Get the file pattern of a session's raw imaging files
    pub fn get_file_pattern(&self, key: &SessionKey) -> String {
        self.file_pattern
            .replace("{animal_id}", &key.animal_id.to_string())
            .replace("{session}", &key.session.to_string())
    }

    /// Get the directory NWB files are written to, creating it if needed
    pub fn get_output_directory(&self) -> Result<PathBuf, ConfigError> {
        let output_dir = if self.stub_test {
            self.output_path.join(STUB_DIRECTORY)
        } else {
            self.output_path.clone()
        };
        std::fs::create_dir_all(&output_dir)?;
        Ok(output_dir)
    }

    /// Get the path to the output NWB file of a session
    pub fn get_nwb_file_name(&self, key: &SessionKey) -> Result<PathBuf, ConfigError> {
        Ok(self.get_output_directory()?.join(format!(
            "sub-{}_ses-{}.nwb",
            key.animal_id, key.session
        )))
    }

    /// Maximum number of frames to read per field, if the conversion is a stub
    pub fn max_frames(&self) -> Option<usize> {
        if self.stub_test {
            Some(self.stub_frames)
        } else {
            None
        }
    }

    pub fn is_compression_valid(&self) -> bool {
        self.compression.map(|level| level <= 9).unwrap_or(true)
    }

    /// Offset of the lab clock from UTC
    pub fn utc_offset(&self) -> Result<UtcOffset, ConfigError> {
        UtcOffset::from_hms(self.timezone_offset_hours, 0, 0)
            .map_err(|_| ConfigError::BadTimezone(self.timezone_offset_hours))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            "export_path: /data/exports\noutput_path: /data/nwb\nstub_test: true\n",
        )
        .unwrap();
        let config = Config::read_config_file(&path).unwrap();
        assert_eq!(config.export_path, PathBuf::from("/data/exports"));
        assert!(config.stub_test);
        assert_eq!(config.stub_frames, 100);
        assert_eq!(config.max_frames(), Some(100));
        assert_eq!(config.number_of_fields, 3);

        assert!(matches!(
            Config::read_config_file(&dir.path().join("nope.yml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.yml");
        let config = Config::default();
        config.write_config_file(&path).unwrap();
        assert_eq!(Config::read_config_file(&path).unwrap(), config);
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_path: PathBuf::from("/raw"),
            output_path: dir.path().to_path_buf(),
            stub_test: true,
            ..Default::default()
        };
        let key = SessionKey::new(124, 3).with_scan(2);
        assert_eq!(config.get_session_folder(&key), PathBuf::from("/raw/124_3_2"));
        assert_eq!(config.get_file_pattern(&key), "124_3_*.tif");
        let nwb_path = config.get_nwb_file_name(&key).unwrap();
        assert_eq!(nwb_path, dir.path().join("nwb_stub").join("sub-124_ses-3.nwb"));
        assert!(dir.path().join("nwb_stub").exists());
    }

    #[test]
    fn test_utc_offset() {
        let config = Config {
            timezone_offset_hours: -5,
            ..Default::default()
        };
        assert_eq!(config.utc_offset().unwrap().whole_hours(), -5);
        let config = Config {
            timezone_offset_hours: 30,
            ..Default::default()
        };
        assert!(matches!(config.utc_offset(), Err(ConfigError::BadTimezone(30))));
    }
}
