use ndarray::Array1;

use super::error::QueryError;
use super::keys::{FieldKey, SessionKey};
use super::records::{
    MaskRow, RespirationRecord, SessionInfo, SubjectRecord, SummaryImageRow, TraceRow,
    TreadmillRecord, TrialRow,
};

/// Read-only access to the experiment pipeline.
///
/// Every fetch is an exact match on a structured key. Fetches of required rows fail with
/// [`QueryError::MissingRow`]; optional data (respiration, summary images, masks, traces)
/// comes back empty instead.
pub trait PipelineQuery {
    /// All sessions available for conversion, in the pipeline's natural order
    fn session_keys(&self) -> Result<Vec<SessionKey>, QueryError>;
    /// All (field, channel, segmentation method) combinations recorded for a session
    fn field_keys(&self, key: &SessionKey) -> Result<Vec<FieldKey>, QueryError>;
    fn session_info(&self, key: &SessionKey) -> Result<SessionInfo, QueryError>;
    fn subject(&self, animal_id: u32) -> Result<SubjectRecord, QueryError>;
    /// Scan frame times on the odor clock
    fn odor_frame_times(&self, key: &SessionKey) -> Result<Array1<f64>, QueryError>;
    /// Scan frame times on the behavior clock
    fn behavior_frame_times(&self, key: &SessionKey) -> Result<Array1<f64>, QueryError>;
    fn treadmill(&self, key: &SessionKey) -> Result<TreadmillRecord, QueryError>;
    fn odor_trials(&self, key: &SessionKey) -> Result<Vec<TrialRow>, QueryError>;
    fn respiration(
        &self,
        key: &SessionKey,
        recording_idx: u32,
    ) -> Result<Option<RespirationRecord>, QueryError>;
    fn average_images(&self, key: &SessionKey) -> Result<Vec<SummaryImageRow>, QueryError>;
    fn correlation_images(&self, key: &SessionKey) -> Result<Vec<SummaryImageRow>, QueryError>;
    fn masks(&self, key: &FieldKey) -> Result<Vec<MaskRow>, QueryError>;
    fn traces(&self, key: &FieldKey) -> Result<Vec<TraceRow>, QueryError>;

    /// Release the connection. Called once after the last session.
    fn close(&mut self) -> Result<(), QueryError> {
        Ok(())
    }
}

/// Enumerates what there is to convert.
pub struct SessionKeyResolver<'q> {
    query: &'q dyn PipelineQuery,
}

impl<'q> SessionKeyResolver<'q> {
    pub fn new(query: &'q dyn PipelineQuery) -> Self {
        Self { query }
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionKey>, QueryError> {
        let keys = self.query.session_keys()?;
        spdlog::info!("Found {} sessions to convert", keys.len());
        Ok(keys)
    }

    pub fn list_imaging_fields(&self, session: &SessionKey) -> Result<Vec<FieldKey>, QueryError> {
        let keys = self.query.field_keys(session)?;
        spdlog::info!("Found {} imaging fields for {}", keys.len(), session);
        Ok(keys)
    }
}
