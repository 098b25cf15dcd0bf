use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::KeyError;

/// Identifies one recording session in the pipeline.
///
/// `scan_idx` and `pipeline_version` are optional because the behavior tables are keyed by
/// animal and session only, while the imaging tables additionally need the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub animal_id: u32,
    pub session: u32,
    #[serde(default)]
    pub scan_idx: Option<u32>,
    #[serde(default)]
    pub pipeline_version: Option<u32>,
}

impl SessionKey {
    pub fn new(animal_id: u32, session: u32) -> Self {
        Self {
            animal_id,
            session,
            scan_idx: None,
            pipeline_version: None,
        }
    }

    pub fn with_scan(mut self, scan_idx: u32) -> Self {
        self.scan_idx = Some(scan_idx);
        self
    }

    pub fn with_pipeline_version(mut self, pipeline_version: u32) -> Self {
        self.pipeline_version = Some(pipeline_version);
        self
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "animal {} session {}", self.animal_id, self.session)?;
        if let Some(scan) = self.scan_idx {
            write!(f, " scan {scan}")?;
        }
        if let Some(version) = self.pipeline_version {
            write!(f, " pipeline v{version}")?;
        }
        Ok(())
    }
}

/// Identifies one (field, channel, segmentation method) combination within a session.
///
/// Fields, channels and methods are numbered from 1 as in the imaging pipeline, which is
/// checked on construction (and on deserialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawFieldKey")]
pub struct FieldKey {
    session: SessionKey,
    field: u32,
    channel: u32,
    segmentation_method: u32,
}

#[derive(Deserialize)]
struct RawFieldKey {
    session: SessionKey,
    field: u32,
    channel: u32,
    segmentation_method: u32,
}

impl TryFrom<RawFieldKey> for FieldKey {
    type Error = KeyError;
    fn try_from(raw: RawFieldKey) -> Result<Self, Self::Error> {
        FieldKey::new(raw.session, raw.field, raw.channel, raw.segmentation_method)
    }
}

impl FieldKey {
    pub fn new(
        session: SessionKey,
        field: u32,
        channel: u32,
        segmentation_method: u32,
    ) -> Result<Self, KeyError> {
        if field == 0 {
            return Err(KeyError::InvalidField(field));
        }
        if channel == 0 {
            return Err(KeyError::InvalidChannel(channel));
        }
        if segmentation_method == 0 {
            return Err(KeyError::InvalidSegmentationMethod(segmentation_method));
        }
        Ok(Self {
            session,
            field,
            channel,
            segmentation_method,
        })
    }

    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    pub fn field(&self) -> u32 {
        self.field
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn segmentation_method(&self) -> u32 {
        self.segmentation_method
    }

    /// Zero-based position of the field within a scan
    pub fn field_index(&self) -> usize {
        (self.field - 1) as usize
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} field {} channel {} method {}",
            self.session, self.field, self.channel, self.segmentation_method
        )
    }
}
