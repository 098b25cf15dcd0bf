//! Rows returned by the pipeline query collaborator.
//!
//! Arrays use ndarray's serde representation (`{v: 1, dim: [...], data: [...]}`) so that
//! exported tables can be read back without any conversion step.
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use time::Date;

/// Row from the mouse colony table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub animal_id: u32,
    #[serde(default)]
    pub dob: Option<Date>,
    pub sex: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Session level metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub animal_id: u32,
    pub session_date: Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreadmillRecord {
    /// Sample times on the behavior clock
    pub treadmill_time: Array1<f64>,
    pub treadmill_vel: Array1<f64>,
    pub treadmill_raw: Array1<f64>,
}

/// One odor delivery, already joined with the odor configuration it used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRow {
    pub trial_start_time: f64,
    pub trial_end_time: f64,
    pub odorant: String,
    pub concentration: f64,
    pub solution_date: Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespirationRecord {
    pub recording_idx: u32,
    pub trace: Array1<f64>,
    pub times: Array1<f64>,
}

/// Average or correlation image of one field/channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryImageRow {
    pub field: u32,
    pub channel: u32,
    pub image: Array2<f32>,
}

/// Segmentation mask as stored by the pipeline: pixel indices into the flattened
/// (column-major) field image, one weight per pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskRow {
    pub mask_id: u32,
    pub pixels: Array1<u64>,
    pub weights: Array1<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    pub mask_id: u32,
    pub trace: Array1<f32>,
}
