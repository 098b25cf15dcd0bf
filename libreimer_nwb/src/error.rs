use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::process::SessionStage;
use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid field {0}; fields are numbered from 1")]
    InvalidField(u32),
    #[error("Invalid channel {0}; channels are numbered from 1")]
    InvalidChannel(u32),
    #[error("Invalid segmentation method {0}; methods are numbered from 1")]
    InvalidSegmentationMethod(u32),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AlignmentError {
    #[error("Clock alignment needs at least 2 samples, but the {clock} clock has {len}")]
    TooFewSamples { clock: &'static str, len: usize },
    #[error("Clock alignment found a non-finite value at sample {index} of the {clock} clock")]
    NonFinite { clock: &'static str, index: usize },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("An object named {name} already exists in {container}")]
    DuplicateName { container: String, name: String },
    #[error("Trial column {0} was declared twice")]
    DuplicateTrialColumn(String),
    #[error("Trial was given a value for undeclared column {0}")]
    UndeclaredTrialColumn(String),
    #[error("Trial is missing a value for declared column {0}")]
    MissingTrialColumn(String),
    #[error("Trial stops at {stop} before it starts at {start}")]
    TrialStopBeforeStart { start: f64, stop: f64 },
    #[error("Pixel index {index} of mask {mask_id} is outside of a {rows}x{cols} image")]
    PixelOutOfBounds {
        mask_id: u32,
        index: u64,
        rows: usize,
        cols: usize,
    },
    #[error("Mask {mask_id} has {pixels} pixels but {weights} weights")]
    MaskWeightMismatch {
        mask_id: u32,
        pixels: usize,
        weights: usize,
    },
    #[error("Plane segmentation {plane} has {rois} ROIs but {traces} traces were fetched")]
    RoiCountMismatch {
        plane: String,
        rois: usize,
        traces: usize,
    },
    #[error("ROI {position} of {plane} is mask {mask_id} but the trace at that position belongs to mask {trace_id}")]
    RoiOrderMismatch {
        plane: String,
        position: usize,
        mask_id: u32,
        trace_id: u32,
    },
    #[error("Trace of mask {mask_id} has {len} samples, expected {expected}")]
    RaggedTraces {
        mask_id: u32,
        len: usize,
        expected: usize,
    },
    #[error("Session cannot move from stage {from} to stage {to}")]
    StageOrder { from: SessionStage, to: SessionStage },
    #[error("No {kind} named {name} exists in the file")]
    MissingObject { kind: &'static str, name: String },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query found no row in {table} for key {key}")]
    MissingRow { table: &'static str, key: String },
    #[error("Query found no exported sessions in {0:?}")]
    NoExports(PathBuf),
    #[error("Could not open pipeline export because path {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Query failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Query failed to parse YAML export: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Query found an invalid key in an export: {0}")]
    KeyError(#[from] KeyError),
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to load metadata as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Metadata failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Metadata failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Metadata has no TwoPhotonSeries entry for field {0}")]
    MissingPhotonSeries(u32),
    #[error("Metadata has no ImagingPlane named {0}")]
    MissingImagingPlane(String),
    #[error("Metadata has no Device named {0}")]
    MissingDevice(String),
}

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("No files matching {pattern} were found in {folder:?}")]
    NoMatchingFiles { folder: PathBuf, pattern: String },
    #[error("Imaging file pattern is invalid: {0}")]
    BadPattern(#[from] glob::PatternError),
    #[error("Imaging file discovery failed: {0}")]
    GlobError(#[from] glob::GlobError),
    #[error("Imaging failed to decode TIFF data: {0}")]
    TiffError(#[from] tiff::TiffError),
    #[error("Imaging failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Imaging found unsupported sample type {0}; expected 8 or 16 bit integers")]
    UnsupportedSampleType(String),
    #[error("Imaging could not parse ScanImage epoch {0:?}")]
    BadEpoch(String),
    #[error("Field {field} is not valid for a scan with {number_of_fields} fields")]
    InvalidField { field: u32, number_of_fields: usize },
    #[error("Field rows {start}..{stop} do not fit in a frame with {rows} rows")]
    BadFovBoundaries {
        start: usize,
        stop: usize,
        rows: usize,
    },
    #[error("Imaging frames could not be stacked: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("Frame {frame} has shape {found:?}, expected {expected:?}")]
    FrameSizeMismatch {
        frame: usize,
        found: (u32, u32),
        expected: (u32, u32),
    },
    #[error("Frame {frame} has a different sample type than the frames before it")]
    MixedSampleTypes { frame: usize },
    #[error("Imaging could not parse ScanImage channel list {0:?}")]
    BadChannelList(String),
    #[error("Channel {channel} was not saved; the recording holds channels {saved:?}")]
    ChannelNotSaved { channel: u32, saved: Vec<u32> },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Timezone offset of {0} hours is out of range")]
    BadTimezone(i8),
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Assembly failed due to query error: {0}")]
    QueryError(#[from] QueryError),
    #[error("Assembly failed due to clock alignment error: {0}")]
    AlignmentError(#[from] AlignmentError),
    #[error("Assembly failed due to schema error: {0}")]
    SchemaError(#[from] SchemaError),
    #[error("Assembly failed due to metadata error: {0}")]
    MetadataError(#[from] MetadataError),
    #[error("Assembly failed due to imaging error: {0}")]
    ImagingError(#[from] ImagingError),
    #[error("Assembly failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("No average image exists for field {field} channel {channel}, so mask shapes are unknown")]
    MissingReferenceImage { field: u32, channel: u32 },
}

#[derive(Debug, Error)]
pub enum NwbWriterError {
    #[error("NwbWriter failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("NwbWriter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("NwbWriter could not encode a string: {0}")]
    StringError(#[from] hdf5::types::StringError),
    #[error("NwbWriter could not format a date: {0}")]
    DateError(#[from] time::error::Format),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session failed due to assembly error: {0}")]
    AssemblyError(#[from] AssemblyError),
    #[error("Session failed due to NwbWriter error: {0}")]
    WriterError(#[from] NwbWriterError),
    #[error("Session failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Session failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to query error: {0}")]
    QueryError(#[from] QueryError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to metadata error: {0}")]
    MetadataError(#[from] MetadataError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}

/// Optional upstream data that was absent, so the step that needed it was skipped.
///
/// Not an error: the session still converts, the skip is logged and reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDataWarning {
    pub what: &'static str,
    pub key: String,
}

impl MissingDataWarning {
    pub fn new(what: &'static str, key: impl fmt::Display) -> Self {
        Self {
            what,
            key: key.to_string(),
        }
    }
}

impl fmt::Display for MissingDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no {} found for {}; skipped", self.what, self.key)
    }
}
