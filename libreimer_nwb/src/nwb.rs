//! In-memory model of the output file.
//!
//! Mirrors the subset of the NWB 2.x schema this converter produces. Assemblers mutate an
//! [`NwbFile`]; the [`crate::hdf_writer::NwbWriter`] persists it.
use ndarray::{s, Array1, Array2, Array3};
use time::OffsetDateTime;

use super::error::SchemaError;
use super::registry::ContainerRegistry;

pub const BEHAVIOR_MODULE: &str = "behavior";
pub const OPHYS_MODULE: &str = "ophys";

/// Sex of the subject as NWB understands it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    /// Only exact "M"/"F" are accepted, anything else is unknown
    pub fn normalize(value: &str) -> Self {
        match value {
            "M" => Self::Male,
            "F" => Self::Female,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Unknown => "U",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub subject_id: String,
    pub date_of_birth: Option<OffsetDateTime>,
    pub sex: Sex,
    pub species: String,
    pub description: String,
}

/// How the samples of a series are placed in time
#[derive(Debug, Clone, PartialEq)]
pub enum Timing {
    Timestamps(Array1<f64>),
    /// Shares the timestamps dataset of another series, addressed by its path in the file
    Linked { path: String, len: usize },
}

impl Timing {
    /// Number of timestamps
    pub fn len(&self) -> usize {
        match self {
            Self::Timestamps(ts) => ts.len(),
            Self::Linked { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw imaging samples in the type the microscope stored them
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    I16(Array3<i16>),
    U16(Array3<u16>),
}

impl FrameData {
    /// frames x rows x columns
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::I16(frames) => frames.shape(),
            Self::U16(frames) => frames.shape(),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.shape()[0]
    }

    /// The first `n_frames` frames
    pub fn head(&self, n_frames: usize) -> Self {
        let n_frames = n_frames.min(self.num_frames());
        match self {
            Self::I16(frames) => Self::I16(frames.slice(s![..n_frames, .., ..]).to_owned()),
            Self::U16(frames) => Self::U16(frames.slice(s![..n_frames, .., ..]).to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesKind {
    Plain,
    Spatial { reference_frame: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub data: Array1<f64>,
    pub timing: Timing,
    pub kind: SeriesKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TwoPhotonSeries {
    pub name: String,
    pub description: String,
    pub imaging_plane: String,
    pub data: FrameData,
    pub timing: Timing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Series(TimeSeries),
    TwoPhoton(TwoPhotonSeries),
}

impl Acquisition {
    pub fn name(&self) -> &str {
        match self {
            Self::Series(series) => &series.name,
            Self::TwoPhoton(series) => &series.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub name: String,
    pub description: String,
    pub manufacturer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpticalChannel {
    pub name: String,
    pub description: String,
    pub emission_lambda: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagingPlane {
    pub name: String,
    pub description: String,
    pub device: String,
    pub excitation_lambda: f64,
    pub imaging_rate: f64,
    pub indicator: String,
    pub location: String,
    pub optical_channel: OpticalChannel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrayscaleImage {
    pub name: String,
    pub description: String,
    pub data: Array2<f32>,
}

#[derive(Debug, Clone)]
pub struct ImageSet {
    pub name: String,
    pub description: String,
    pub images: ContainerRegistry<GrayscaleImage>,
}

impl ImageSet {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            images: ContainerRegistry::new(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelMaskEntry {
    pub row: u32,
    pub column: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    pub id: u32,
    pub pixel_mask: Vec<PixelMaskEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaneSegmentation {
    pub name: String,
    pub description: String,
    pub imaging_plane: String,
    pub rois: Vec<Roi>,
}

#[derive(Debug, Clone)]
pub struct ImageSegmentation {
    pub name: String,
    pub planes: ContainerRegistry<PlaneSegmentation>,
}

impl ImageSegmentation {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            planes: ContainerRegistry::new(name),
        }
    }
}

/// Rows of a plane segmentation referenced by a response series
#[derive(Debug, Clone, PartialEq)]
pub struct RoiTableRegion {
    pub plane_segmentation: String,
    pub indices: Vec<usize>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoiResponseSeries {
    pub name: String,
    pub description: String,
    pub unit: String,
    /// time x ROI
    pub data: Array2<f32>,
    pub timestamps: Array1<f64>,
    pub rois: RoiTableRegion,
}

#[derive(Debug, Clone)]
pub struct Fluorescence {
    pub name: String,
    pub series: ContainerRegistry<RoiResponseSeries>,
}

impl Fluorescence {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            series: ContainerRegistry::new(name),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DataInterface {
    Series(TimeSeries),
    Images(ImageSet),
    Segmentation(ImageSegmentation),
    Fluorescence(Fluorescence),
}

impl DataInterface {
    pub fn name(&self) -> &str {
        match self {
            Self::Series(series) => &series.name,
            Self::Images(images) => &images.name,
            Self::Segmentation(segmentation) => &segmentation.name,
            Self::Fluorescence(fluorescence) => &fluorescence.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingModule {
    pub name: String,
    pub description: String,
    pub interfaces: ContainerRegistry<DataInterface>,
}

impl ProcessingModule {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            interfaces: ContainerRegistry::new(name),
        }
    }

    pub fn add(&mut self, interface: DataInterface) -> Result<&mut DataInterface, SchemaError> {
        let name = interface.name().to_string();
        self.interfaces.insert(&name, interface)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialColumn {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CovariateValue {
    Text(String),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub start_time: f64,
    pub stop_time: f64,
    /// One value per declared column, in column order
    pub covariates: Vec<CovariateValue>,
}

/// Trials table with custom covariate columns. Columns must be declared before trials are added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialTable {
    pub columns: Vec<TrialColumn>,
    pub trials: Vec<Trial>,
}

impl TrialTable {
    pub fn add_column(&mut self, name: &str, description: &str) -> Result<(), SchemaError> {
        if self.columns.iter().any(|c| c.name == name) {
            return Err(SchemaError::DuplicateTrialColumn(name.to_string()));
        }
        self.columns.push(TrialColumn {
            name: name.to_string(),
            description: description.to_string(),
        });
        Ok(())
    }

    pub fn add_trial(
        &mut self,
        start_time: f64,
        stop_time: f64,
        values: Vec<(&str, CovariateValue)>,
    ) -> Result<(), SchemaError> {
        if stop_time < start_time {
            return Err(SchemaError::TrialStopBeforeStart {
                start: start_time,
                stop: stop_time,
            });
        }
        if let Some((name, _)) = values
            .iter()
            .find(|(name, _)| !self.columns.iter().any(|c| c.name == *name))
        {
            return Err(SchemaError::UndeclaredTrialColumn(name.to_string()));
        }
        let mut covariates = Vec::with_capacity(self.columns.len());
        for column in self.columns.iter() {
            match values.iter().find(|(name, _)| *name == column.name) {
                Some((_, value)) => covariates.push(value.clone()),
                None => return Err(SchemaError::MissingTrialColumn(column.name.clone())),
            }
        }
        self.trials.push(Trial {
            start_time,
            stop_time,
            covariates,
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.trials.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneralMetadata {
    pub experimenter: Vec<String>,
    pub lab: String,
    pub institution: String,
    pub experiment_description: String,
    pub keywords: Vec<String>,
    pub session_id: String,
}

/// The document assembled for one session
#[derive(Debug, Clone)]
pub struct NwbFile {
    pub identifier: String,
    pub session_description: String,
    pub session_start_time: OffsetDateTime,
    pub file_create_date: OffsetDateTime,
    pub general: GeneralMetadata,
    pub subject: Option<Subject>,
    pub acquisition: ContainerRegistry<Acquisition>,
    pub processing: ContainerRegistry<ProcessingModule>,
    pub devices: ContainerRegistry<Device>,
    pub imaging_planes: ContainerRegistry<ImagingPlane>,
    pub trials: TrialTable,
}

impl NwbFile {
    pub fn new(
        identifier: &str,
        session_description: &str,
        session_start_time: OffsetDateTime,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            session_description: session_description.to_string(),
            session_start_time,
            file_create_date: OffsetDateTime::now_utc(),
            general: GeneralMetadata::default(),
            subject: None,
            acquisition: ContainerRegistry::new("acquisition"),
            processing: ContainerRegistry::new("processing"),
            devices: ContainerRegistry::new("devices"),
            imaging_planes: ContainerRegistry::new("imaging_planes"),
            trials: TrialTable::default(),
        }
    }

    pub fn add_acquisition(&mut self, item: Acquisition) -> Result<(), SchemaError> {
        let name = item.name().to_string();
        self.acquisition.insert(&name, item)?;
        Ok(())
    }

    /// The processing module called `name`, created on first use
    pub fn processing_module(&mut self, name: &str, description: &str) -> &mut ProcessingModule {
        self.processing
            .get_or_create(name, || ProcessingModule::new(name, description))
    }

    pub fn add_trial_column(&mut self, name: &str, description: &str) -> Result<(), SchemaError> {
        self.trials.add_column(name, description)
    }

    pub fn add_trial(
        &mut self,
        start_time: f64,
        stop_time: f64,
        values: Vec<(&str, CovariateValue)>,
    ) -> Result<(), SchemaError> {
        self.trials.add_trial(start_time, stop_time, values)
    }

    /// Look up a data interface inside a processing module
    pub fn interface(&self, module: &str, name: &str) -> Option<&DataInterface> {
        self.processing
            .get(module)
            .and_then(|m| m.interfaces.get(name))
    }
}
