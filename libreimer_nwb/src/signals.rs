use super::clock::ClockAligner;
use super::error::{AssemblyError, MissingDataWarning};
use super::keys::SessionKey;
use super::nwb::{
    Acquisition, DataInterface, NwbFile, SeriesKind, TimeSeries, Timing, BEHAVIOR_MODULE,
};
use super::query::PipelineQuery;

pub const TREADMILL_POSITION: &str = "treadmill_position";
pub const TREADMILL_VELOCITY: &str = "treadmill_velocity";
pub const RESPIRATION: &str = "respiration";

const BEHAVIOR_DESCRIPTION: &str = "behavioral data processing";
const UNKNOWN_UNIT: &str = "unknown";

/// Add the treadmill position (acquisition) and velocity (behavior module).
///
/// Treadmill samples are timed on the behavior computer. Both computers record the scan
/// frame times, which gives the behavior -> odor clock map used for the treadmill times.
pub fn attach_treadmill(
    nwbfile: &mut NwbFile,
    query: &dyn PipelineQuery,
    key: &SessionKey,
) -> Result<(), AssemblyError> {
    let odor_frame_times = query.odor_frame_times(key)?;
    let behavior_frame_times = query.behavior_frame_times(key)?;
    let treadmill = query.treadmill(key)?;

    let aligner = ClockAligner::new(behavior_frame_times.view(), odor_frame_times.view())?;
    let timestamps = aligner.align(treadmill.treadmill_time.view());
    let n_samples = timestamps.len();

    nwbfile.add_acquisition(Acquisition::Series(TimeSeries {
        name: String::from(TREADMILL_POSITION),
        description: String::from("treadmill position from Treadmill table"),
        unit: String::from(UNKNOWN_UNIT),
        data: treadmill.treadmill_raw,
        timing: Timing::Timestamps(timestamps),
        kind: SeriesKind::Spatial {
            reference_frame: String::from("unknown"),
        },
    }))?;

    nwbfile
        .processing_module(BEHAVIOR_MODULE, BEHAVIOR_DESCRIPTION)
        .add(DataInterface::Series(TimeSeries {
            name: String::from(TREADMILL_VELOCITY),
            description: String::from("treadmill velocity from Treadmill table"),
            unit: String::from(UNKNOWN_UNIT),
            data: treadmill.treadmill_vel,
            timing: Timing::Linked {
                path: format!("/acquisition/{TREADMILL_POSITION}/timestamps"),
                len: n_samples,
            },
            kind: SeriesKind::Plain,
        }))?;

    spdlog::info!(
        "Added {} treadmill samples aligned on {} clock readings",
        n_samples,
        aligner.len()
    );
    Ok(())
}

/// Add the respiration trace of one recording, if the session has one
pub fn attach_respiration(
    nwbfile: &mut NwbFile,
    query: &dyn PipelineQuery,
    key: &SessionKey,
    recording_idx: u32,
) -> Result<Option<MissingDataWarning>, AssemblyError> {
    let record = match query.respiration(key, recording_idx)? {
        Some(record) => record,
        None => {
            return Ok(Some(MissingDataWarning::new(
                "respiration",
                format!("{key} recording {recording_idx}"),
            )))
        }
    };

    nwbfile.add_acquisition(Acquisition::Series(TimeSeries {
        name: String::from(RESPIRATION),
        description: String::from("respiration rate from Respiration table"),
        unit: String::from(UNKNOWN_UNIT),
        data: record.trace,
        timing: Timing::Timestamps(record.times),
        kind: SeriesKind::Plain,
    }))?;
    Ok(None)
}
