use fxhash::FxHashMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::QueryError;
use super::keys::{FieldKey, SessionKey};
use super::query::PipelineQuery;
use super::records::{
    MaskRow, RespirationRecord, SessionInfo, SubjectRecord, SummaryImageRow, TraceRow,
    TreadmillRecord, TrialRow,
};

const EXPORT_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Everything the converter reads from the pipeline for one session, as dumped to a
/// single YAML file by the export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub key: SessionKey,
    pub info: SessionInfo,
    pub subject: SubjectRecord,
    #[serde(default)]
    pub odor_frame_times: Option<Array1<f64>>,
    #[serde(default)]
    pub behavior_frame_times: Option<Array1<f64>>,
    #[serde(default)]
    pub treadmill: Option<TreadmillRecord>,
    #[serde(default)]
    pub trials: Vec<TrialRow>,
    #[serde(default)]
    pub respiration: Vec<RespirationRecord>,
    #[serde(default)]
    pub average_images: Vec<SummaryImageRow>,
    #[serde(default)]
    pub correlation_images: Vec<SummaryImageRow>,
    #[serde(default)]
    pub fields: Vec<FieldExport>,
}

/// Segmentation results of one (field, channel, method) combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExport {
    pub field: u32,
    pub channel: u32,
    pub segmentation_method: u32,
    #[serde(default)]
    pub masks: Vec<MaskRow>,
    #[serde(default)]
    pub traces: Vec<TraceRow>,
}

#[derive(Debug, Clone)]
struct SessionTables {
    export: SessionExport,
    field_keys: Vec<FieldKey>,
}

/// In-memory pipeline tables.
///
/// Sessions keep the order in which they were inserted (file name order when opened from
/// an export directory).
#[derive(Debug, Clone, Default)]
pub struct PipelineTables {
    sessions: Vec<SessionTables>,
    session_index: FxHashMap<SessionKey, usize>,
    subjects: FxHashMap<u32, SubjectRecord>,
}

impl PipelineTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every session export (`*.yml`/`*.yaml`) found in a directory
    pub fn open(export_path: &Path) -> Result<Self, QueryError> {
        if !export_path.exists() {
            return Err(QueryError::BadFilePath(export_path.to_path_buf()));
        }
        let mut paths: Vec<PathBuf> = Vec::new();
        for item in export_path.read_dir()? {
            let item_path = item?.path();
            let is_export = item_path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXPORT_EXTENSIONS.contains(&ext))
                .unwrap_or(false);
            if item_path.is_file() && is_export {
                paths.push(item_path);
            }
        }
        if paths.is_empty() {
            return Err(QueryError::NoExports(export_path.to_path_buf()));
        }
        paths.sort();

        let mut tables = Self::new();
        for path in paths.iter() {
            let yaml_str = std::fs::read_to_string(path)?;
            let export = serde_yaml::from_str::<SessionExport>(&yaml_str)?;
            spdlog::info!("Loaded pipeline export {}", path.display());
            tables.insert_session(export)?;
        }
        Ok(tables)
    }

    /// Add (or replace) a session. The subject row is shared by all sessions of an animal.
    pub fn insert_session(&mut self, export: SessionExport) -> Result<(), QueryError> {
        let mut field_keys = Vec::with_capacity(export.fields.len());
        for field in export.fields.iter() {
            field_keys.push(FieldKey::new(
                export.key,
                field.field,
                field.channel,
                field.segmentation_method,
            )?);
        }
        self.subjects
            .insert(export.subject.animal_id, export.subject.clone());
        let key = export.key;
        let tables = SessionTables { export, field_keys };
        match self.session_index.get(&key) {
            Some(idx) => self.sessions[*idx] = tables,
            None => {
                self.session_index.insert(key, self.sessions.len());
                self.sessions.push(tables);
            }
        }
        Ok(())
    }

    fn session(&self, table: &'static str, key: &SessionKey) -> Result<&SessionExport, QueryError> {
        match self.session_index.get(key) {
            Some(idx) => Ok(&self.sessions[*idx].export),
            None => Err(QueryError::MissingRow {
                table,
                key: key.to_string(),
            }),
        }
    }

    fn field(&self, table: &'static str, key: &FieldKey) -> Result<Option<&FieldExport>, QueryError> {
        let session = self.session(table, key.session())?;
        Ok(session.fields.iter().find(|f| {
            f.field == key.field()
                && f.channel == key.channel()
                && f.segmentation_method == key.segmentation_method()
        }))
    }
}

impl PipelineQuery for PipelineTables {
    fn session_keys(&self) -> Result<Vec<SessionKey>, QueryError> {
        Ok(self.sessions.iter().map(|s| s.export.key).collect())
    }

    fn field_keys(&self, key: &SessionKey) -> Result<Vec<FieldKey>, QueryError> {
        match self.session_index.get(key) {
            Some(idx) => Ok(self.sessions[*idx].field_keys.clone()),
            None => Err(QueryError::MissingRow {
                table: "meso.ScanSet",
                key: key.to_string(),
            }),
        }
    }

    fn session_info(&self, key: &SessionKey) -> Result<SessionInfo, QueryError> {
        Ok(self.session("experiment.Session", key)?.info.clone())
    }

    fn subject(&self, animal_id: u32) -> Result<SubjectRecord, QueryError> {
        self.subjects
            .get(&animal_id)
            .cloned()
            .ok_or_else(|| QueryError::MissingRow {
                table: "mice.Mice",
                key: format!("animal {animal_id}"),
            })
    }

    fn odor_frame_times(&self, key: &SessionKey) -> Result<Array1<f64>, QueryError> {
        const TABLE: &str = "odor.OdorSync";
        self.session(TABLE, key)?
            .odor_frame_times
            .clone()
            .ok_or_else(|| QueryError::MissingRow {
                table: TABLE,
                key: key.to_string(),
            })
    }

    fn behavior_frame_times(&self, key: &SessionKey) -> Result<Array1<f64>, QueryError> {
        const TABLE: &str = "stimulus.BehaviorSync";
        self.session(TABLE, key)?
            .behavior_frame_times
            .clone()
            .ok_or_else(|| QueryError::MissingRow {
                table: TABLE,
                key: key.to_string(),
            })
    }

    fn treadmill(&self, key: &SessionKey) -> Result<TreadmillRecord, QueryError> {
        const TABLE: &str = "treadmill.Treadmill";
        self.session(TABLE, key)?
            .treadmill
            .clone()
            .ok_or_else(|| QueryError::MissingRow {
                table: TABLE,
                key: key.to_string(),
            })
    }

    fn odor_trials(&self, key: &SessionKey) -> Result<Vec<TrialRow>, QueryError> {
        Ok(self.session("odor.OdorTrials", key)?.trials.clone())
    }

    fn respiration(
        &self,
        key: &SessionKey,
        recording_idx: u32,
    ) -> Result<Option<RespirationRecord>, QueryError> {
        Ok(self
            .session("odor.Respiration", key)?
            .respiration
            .iter()
            .find(|r| r.recording_idx == recording_idx)
            .cloned())
    }

    fn average_images(&self, key: &SessionKey) -> Result<Vec<SummaryImageRow>, QueryError> {
        Ok(self
            .session("meso.SummaryImages.Average", key)?
            .average_images
            .clone())
    }

    fn correlation_images(&self, key: &SessionKey) -> Result<Vec<SummaryImageRow>, QueryError> {
        Ok(self
            .session("meso.SummaryImages.Correlation", key)?
            .correlation_images
            .clone())
    }

    fn masks(&self, key: &FieldKey) -> Result<Vec<MaskRow>, QueryError> {
        Ok(self
            .field("meso.Segmentation.Mask", key)?
            .map(|f| f.masks.clone())
            .unwrap_or_default())
    }

    fn traces(&self, key: &FieldKey) -> Result<Vec<TraceRow>, QueryError> {
        Ok(self
            .field("meso.Fluorescence.Trace", key)?
            .map(|f| f.traces.clone())
            .unwrap_or_default())
    }
}
