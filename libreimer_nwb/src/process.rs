use std::fmt;
use std::sync::mpsc::Sender;
use time::{OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use super::config::Config;
use super::error::{AssemblyError, MissingDataWarning, ProcessorError, SchemaError, SessionError};
use super::fluorescence::attach_fluorescence;
use super::hdf_writer::write_nwb_file;
use super::imaging::{ImagingProvider, ImagingSource, ScanImageProvider};
use super::imaging_plane::attach_imaging_plane;
use super::keys::{FieldKey, SessionKey};
use super::metadata::Metadata;
use super::nwb::{GeneralMetadata, NwbFile};
use super::query::{PipelineQuery, SessionKeyResolver};
use super::records::SessionInfo;
use super::segmentation::{attach_plane_segmentation, PlaneSegmentationHandle};
use super::signals::{attach_respiration, attach_treadmill};
use super::subject::{attach_subject, attach_trials};
use super::summary_images::attach_summary_images;
use super::tables::PipelineTables;
use super::worker_status::WorkerStatus;

/// Where a session's document is in its assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Init,
    SubjectAttached,
    BehaviorAttached,
    TrialsAttached,
    SummaryImagesAttached,
    PlaneAttached,
    SegmentationAttached,
    FluorescenceAttached,
    ReadyToPersist,
}

impl SessionStage {
    /// The per-field stages repeat once per field key; a session without fields goes straight
    /// from the summary images to persistence.
    pub fn can_advance_to(&self, next: SessionStage) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::SubjectAttached)
                | (Self::SubjectAttached, Self::BehaviorAttached)
                | (Self::BehaviorAttached, Self::TrialsAttached)
                | (Self::TrialsAttached, Self::SummaryImagesAttached)
                | (Self::SummaryImagesAttached, Self::PlaneAttached)
                | (Self::SummaryImagesAttached, Self::ReadyToPersist)
                | (Self::PlaneAttached, Self::SegmentationAttached)
                | (Self::SegmentationAttached, Self::FluorescenceAttached)
                | (Self::FluorescenceAttached, Self::PlaneAttached)
                | (Self::FluorescenceAttached, Self::ReadyToPersist)
        )
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::SubjectAttached => write!(f, "SubjectAttached"),
            Self::BehaviorAttached => write!(f, "BehaviorAttached"),
            Self::TrialsAttached => write!(f, "TrialsAttached"),
            Self::SummaryImagesAttached => write!(f, "SummaryImagesAttached"),
            Self::PlaneAttached => write!(f, "PlaneAttached"),
            Self::SegmentationAttached => write!(f, "SegmentationAttached"),
            Self::FluorescenceAttached => write!(f, "FluorescenceAttached"),
            Self::ReadyToPersist => write!(f, "ReadyToPersist"),
        }
    }
}

/// What happened while assembling one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub key: SessionKey,
    /// Optional data that was absent, in the order it was noticed
    pub warnings: Vec<MissingDataWarning>,
    /// Number of (field, channel, method) combinations attached
    pub n_fields: usize,
}

/// Owns the document of one session and walks it through the [`SessionStage`]s.
///
/// Every step checks that it follows the previous one; a step called out of order fails with
/// [`SchemaError::StageOrder`] before touching the document.
pub struct SessionConverter<'q> {
    nwbfile: NwbFile,
    stage: SessionStage,
    key: SessionKey,
    query: &'q dyn PipelineQuery,
    warnings: Vec<MissingDataWarning>,
    current_field: Option<(FieldKey, String)>,
    current_segmentation: Option<PlaneSegmentationHandle>,
    n_fields: usize,
}

impl<'q> SessionConverter<'q> {
    pub fn new(nwbfile: NwbFile, query: &'q dyn PipelineQuery, key: SessionKey) -> Self {
        Self {
            nwbfile,
            stage: SessionStage::Init,
            key,
            query,
            warnings: Vec::new(),
            current_field: None,
            current_segmentation: None,
            n_fields: 0,
        }
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    pub fn nwbfile(&self) -> &NwbFile {
        &self.nwbfile
    }

    fn check_stage(&self, next: SessionStage) -> Result<(), SchemaError> {
        if self.stage.can_advance_to(next) {
            Ok(())
        } else {
            Err(SchemaError::StageOrder {
                from: self.stage,
                to: next,
            })
        }
    }

    fn note(&mut self, warning: Option<MissingDataWarning>) {
        if let Some(warning) = warning {
            spdlog::warn!("{}", warning);
            self.warnings.push(warning);
        }
    }

    pub fn attach_subject(&mut self, species: &str, offset: UtcOffset) -> Result<(), AssemblyError> {
        self.check_stage(SessionStage::SubjectAttached)?;
        let record = self.query.subject(self.key.animal_id)?;
        attach_subject(&mut self.nwbfile, &record, species, offset)?;
        self.stage = SessionStage::SubjectAttached;
        Ok(())
    }

    /// Treadmill is required, respiration is optional
    pub fn attach_behavior(&mut self, respiration_recording_idx: u32) -> Result<(), AssemblyError> {
        self.check_stage(SessionStage::BehaviorAttached)?;
        attach_treadmill(&mut self.nwbfile, self.query, &self.key)?;
        let warning = attach_respiration(
            &mut self.nwbfile,
            self.query,
            &self.key,
            respiration_recording_idx,
        )?;
        self.note(warning);
        self.stage = SessionStage::BehaviorAttached;
        Ok(())
    }

    pub fn attach_trials(&mut self) -> Result<(), AssemblyError> {
        self.check_stage(SessionStage::TrialsAttached)?;
        let rows = self.query.odor_trials(&self.key)?;
        attach_trials(&mut self.nwbfile, &rows)?;
        self.stage = SessionStage::TrialsAttached;
        Ok(())
    }

    pub fn attach_summary_images(&mut self) -> Result<(), AssemblyError> {
        self.check_stage(SessionStage::SummaryImagesAttached)?;
        let warning = attach_summary_images(&mut self.nwbfile, self.query, &self.key)?;
        self.note(warning);
        self.stage = SessionStage::SummaryImagesAttached;
        Ok(())
    }

    /// Start a field: imaging plane (and raw imaging when `source` is given)
    pub fn attach_plane(
        &mut self,
        metadata: &Metadata,
        key: &FieldKey,
        source: Option<&dyn ImagingSource>,
        max_frames: Option<usize>,
    ) -> Result<(), AssemblyError> {
        self.check_stage(SessionStage::PlaneAttached)?;
        let frame_times = self.query.odor_frame_times(key.session())?;
        let (plane, warning) = attach_imaging_plane(
            &mut self.nwbfile,
            metadata,
            key,
            source,
            frame_times.view(),
            max_frames,
        )?;
        self.note(warning);
        self.current_field = Some((*key, plane));
        self.stage = SessionStage::PlaneAttached;
        Ok(())
    }

    pub fn attach_segmentation(&mut self) -> Result<(), AssemblyError> {
        self.check_stage(SessionStage::SegmentationAttached)?;
        let (key, plane) = self
            .current_field
            .as_ref()
            .ok_or_else(|| SchemaError::MissingObject {
                kind: "imaging plane",
                name: self.key.to_string(),
            })?;
        let handle = attach_plane_segmentation(&mut self.nwbfile, plane, self.query, key)?;
        self.current_segmentation = Some(handle);
        self.stage = SessionStage::SegmentationAttached;
        Ok(())
    }

    pub fn attach_fluorescence(&mut self) -> Result<(), AssemblyError> {
        self.check_stage(SessionStage::FluorescenceAttached)?;
        let (key, _) = self
            .current_field
            .take()
            .ok_or_else(|| SchemaError::MissingObject {
                kind: "imaging plane",
                name: self.key.to_string(),
            })?;
        let handle = self
            .current_segmentation
            .take()
            .ok_or_else(|| SchemaError::MissingObject {
                kind: "plane segmentation",
                name: key.to_string(),
            })?;
        let warning = attach_fluorescence(&mut self.nwbfile, &handle, self.query, &key)?;
        self.note(warning);
        self.n_fields += 1;
        self.stage = SessionStage::FluorescenceAttached;
        Ok(())
    }

    /// Hand over the finished document
    pub fn finish(mut self) -> Result<(NwbFile, SessionReport), SchemaError> {
        self.check_stage(SessionStage::ReadyToPersist)?;
        self.stage = SessionStage::ReadyToPersist;
        let report = SessionReport {
            key: self.key,
            warnings: self.warnings,
            n_fields: self.n_fields,
        };
        Ok((self.nwbfile, report))
    }
}

/// The collaborators shared by every session of a run
#[derive(Clone, Copy)]
pub struct ConversionContext<'a> {
    pub query: &'a dyn PipelineQuery,
    pub provider: &'a dyn ImagingProvider,
    pub metadata: &'a Metadata,
    pub config: &'a Config,
}

/// `{animal}_{session}_{scan}`
pub fn session_identifier(key: &SessionKey) -> String {
    format!(
        "{}_{}_{}",
        key.animal_id,
        key.session,
        key.scan_idx.unwrap_or(1)
    )
}

/// Start of the first imaging file that knows it, else midnight of the session date
fn session_start_time(
    info: &SessionInfo,
    sources: &[Option<Box<dyn ImagingSource>>],
    offset: UtcOffset,
) -> OffsetDateTime {
    match sources.iter().flatten().find_map(|s| s.session_start_time()) {
        Some(start) => start.assume_offset(offset),
        None => {
            spdlog::info!("No imaging start time found, using the session date");
            PrimitiveDateTime::new(info.session_date, Time::MIDNIGHT).assume_offset(offset)
        }
    }
}

/// Build the complete document of one session
pub fn assemble_session(
    ctx: &ConversionContext,
    key: &SessionKey,
) -> Result<(NwbFile, SessionReport), AssemblyError> {
    let resolver = SessionKeyResolver::new(ctx.query);
    let field_keys = resolver.list_imaging_fields(key)?;
    let info = ctx.query.session_info(key)?;
    let offset = ctx.config.utc_offset()?;

    let mut sources: Vec<Option<Box<dyn ImagingSource>>> = Vec::with_capacity(field_keys.len());
    for field_key in field_keys.iter() {
        sources.push(ctx.provider.open_field(field_key)?);
    }

    let mut nwbfile = NwbFile::new(
        &session_identifier(key),
        &ctx.metadata.nwbfile.session_description,
        session_start_time(&info, &sources, offset),
    );
    nwbfile.general = GeneralMetadata {
        experimenter: ctx.metadata.nwbfile.experimenter.clone(),
        lab: ctx.metadata.nwbfile.lab.clone(),
        institution: ctx.metadata.nwbfile.institution.clone(),
        experiment_description: ctx.metadata.nwbfile.experiment_description.clone(),
        keywords: ctx.metadata.nwbfile.keywords.clone(),
        session_id: session_identifier(key),
    };

    let mut converter = SessionConverter::new(nwbfile, ctx.query, *key);
    converter.attach_subject(&ctx.metadata.subject.species, offset)?;
    converter.attach_behavior(ctx.config.respiration_recording_idx)?;
    converter.attach_trials()?;
    converter.attach_summary_images()?;
    for (field_key, source) in field_keys.iter().zip(sources.iter()) {
        converter.attach_plane(
            ctx.metadata,
            field_key,
            source.as_deref(),
            ctx.config.max_frames(),
        )?;
        converter.attach_segmentation()?;
        converter.attach_fluorescence()?;
    }
    Ok(converter.finish()?)
}

/// Assemble one session and write it to its NWB file
pub fn convert_session(
    ctx: &ConversionContext,
    key: &SessionKey,
    tx: &Sender<WorkerStatus>,
    session_number: usize,
    total_sessions: usize,
) -> Result<SessionReport, SessionError> {
    let label = session_identifier(key);
    tx.send(WorkerStatus::new(0.0, session_number, total_sessions, &label))?;

    let nwb_path = ctx.config.get_nwb_file_name(key)?;
    let (nwbfile, report) = assemble_session(ctx, key)?;
    tx.send(WorkerStatus::new(0.5, session_number, total_sessions, &label))?;

    write_nwb_file(&nwb_path, &nwbfile, ctx.config.compression)?;
    tx.send(WorkerStatus::new(1.0, session_number, total_sessions, &label))?;
    Ok(report)
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct ConversionSummary {
    pub converted: Vec<SessionReport>,
    /// Sessions that failed, with the reason
    pub failed: Vec<(SessionKey, String)>,
}

fn convert_all(
    ctx: &ConversionContext,
    tx: &Sender<WorkerStatus>,
) -> Result<ConversionSummary, ProcessorError> {
    let keys = SessionKeyResolver::new(ctx.query).list_sessions()?;
    let total_sessions = keys.len();
    let mut summary = ConversionSummary::default();
    for (idx, key) in keys.iter().enumerate() {
        spdlog::info!("Converting {}...", key);
        match convert_session(ctx, key, tx, idx, total_sessions) {
            Ok(report) => {
                spdlog::info!(
                    "Finished {} with {} fields and {} skipped items.",
                    key,
                    report.n_fields,
                    report.warnings.len()
                );
                summary.converted.push(report);
            }
            // Nobody is listening anymore
            Err(SessionError::SendError(e)) => return Err(ProcessorError::SendError(e)),
            Err(e) => {
                spdlog::error!("Conversion of {} failed: {}", key, e);
                summary.failed.push((*key, e.to_string()));
            }
        }
    }
    Ok(summary)
}

/// Convert every session the query knows about, one at a time.
///
/// A failing session is logged and counted, the run continues with the next one. The query
/// is closed once all sessions are done.
pub fn process_sessions(
    query: &mut dyn PipelineQuery,
    provider: &dyn ImagingProvider,
    metadata: &Metadata,
    config: &Config,
    tx: &Sender<WorkerStatus>,
) -> Result<ConversionSummary, ProcessorError> {
    let ctx = ConversionContext {
        query: &*query,
        provider,
        metadata,
        config,
    };
    let summary = convert_all(&ctx, tx);
    query.close()?;
    let summary = summary?;
    spdlog::info!(
        "Converted {} sessions, {} failed.",
        summary.converted.len(),
        summary.failed.len()
    );
    Ok(summary)
}

/// The function to be called by a separate thread (typically the CLI).
///
/// Loads the metadata and the pipeline exports named in the config, then converts every session.
pub fn process(config: Config, tx: Sender<WorkerStatus>) -> Result<ConversionSummary, ProcessorError> {
    let metadata = Metadata::load(config.metadata_path.as_deref())?;
    let mut tables = PipelineTables::open(&config.export_path)?;
    let provider = ScanImageProvider::new(&config);
    process_sessions(&mut tables, &provider, &metadata, &config, &tx)
}
