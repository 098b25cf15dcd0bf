use ndarray::{s, Array2};

use super::error::{AssemblyError, MissingDataWarning, SchemaError};
use super::keys::FieldKey;
use super::nwb::{
    DataInterface, Fluorescence, NwbFile, RoiResponseSeries, RoiTableRegion, OPHYS_MODULE,
};
use super::query::PipelineQuery;
use super::records::TraceRow;
use super::segmentation::PlaneSegmentationHandle;
use super::summary_images::OPHYS_DESCRIPTION;

pub fn fluorescence_container_name(segmentation_method: u32) -> String {
    format!("FluorescenceMethod{segmentation_method}")
}

pub fn response_series_name(field: u32, channel: u32) -> String {
    format!("RoiResponseSeriesFOV{field}Channel{channel}")
}

/// Traces must come in the same order as the ROIs of the plane segmentation
fn check_roi_order(handle: &PlaneSegmentationHandle, traces: &[TraceRow]) -> Result<(), SchemaError> {
    if handle.roi_ids.len() != traces.len() {
        return Err(SchemaError::RoiCountMismatch {
            plane: handle.plane.clone(),
            rois: handle.roi_ids.len(),
            traces: traces.len(),
        });
    }
    for (position, (mask_id, trace)) in handle.roi_ids.iter().zip(traces.iter()).enumerate() {
        if *mask_id != trace.mask_id {
            return Err(SchemaError::RoiOrderMismatch {
                plane: handle.plane.clone(),
                position,
                mask_id: *mask_id,
                trace_id: trace.mask_id,
            });
        }
    }
    Ok(())
}

/// Stack per-ROI traces into a time x ROI matrix of `n_samples` rows
fn stack_traces(traces: &[TraceRow], n_samples: usize) -> Array2<f32> {
    let mut data = Array2::<f32>::zeros((n_samples, traces.len()));
    for (idx, trace) in traces.iter().enumerate() {
        data.column_mut(idx)
            .assign(&trace.trace.slice(s![..n_samples]));
    }
    data
}

/// Add the fluorescence traces of the ROIs in `handle`, timed on the odor clock.
///
/// The frame times and the traces are paired by truncating both to the shorter length.
pub fn attach_fluorescence(
    nwbfile: &mut NwbFile,
    handle: &PlaneSegmentationHandle,
    query: &dyn PipelineQuery,
    key: &FieldKey,
) -> Result<Option<MissingDataWarning>, AssemblyError> {
    let traces = query.traces(key)?;
    if handle.roi_ids.is_empty() && traces.is_empty() {
        return Ok(Some(MissingDataWarning::new("fluorescence traces", key)));
    }
    check_roi_order(handle, &traces)?;

    let trace_len = traces[0].trace.len();
    if let Some(ragged) = traces.iter().find(|t| t.trace.len() != trace_len) {
        return Err(SchemaError::RaggedTraces {
            mask_id: ragged.mask_id,
            len: ragged.trace.len(),
            expected: trace_len,
        }
        .into());
    }

    let frame_times = query.odor_frame_times(key.session())?;
    let n_samples = trace_len.min(frame_times.len());
    if trace_len > frame_times.len() {
        spdlog::warn!(
            "Traces of {} have {} samples but only {} frame times exist; dropping the last {} samples",
            key,
            trace_len,
            frame_times.len(),
            trace_len - frame_times.len()
        );
    } else if frame_times.len() > trace_len {
        spdlog::debug!(
            "Truncating {} frame times to the {} trace samples of {}",
            frame_times.len(),
            trace_len,
            key
        );
    }
    let timestamps = frame_times.slice(s![..n_samples]).to_owned();
    let data = stack_traces(&traces, n_samples);

    let container = fluorescence_container_name(key.segmentation_method());
    let name = response_series_name(key.field(), key.channel());
    let fluorescence = match nwbfile
        .processing_module(OPHYS_MODULE, OPHYS_DESCRIPTION)
        .interfaces
        .get_or_create(&container, || DataInterface::Fluorescence(Fluorescence::new(&container)))
    {
        DataInterface::Fluorescence(fluorescence) => fluorescence,
        _ => {
            return Err(SchemaError::DuplicateName {
                container: String::from(OPHYS_MODULE),
                name: container,
            }
            .into())
        }
    };
    fluorescence.series.insert(
        &name,
        RoiResponseSeries {
            name: name.clone(),
            description: format!(
                "fluorescence traces for field {} channel {}",
                key.field(),
                key.channel()
            ),
            unit: String::from("n.a."),
            data,
            timestamps,
            rois: RoiTableRegion {
                plane_segmentation: handle.path.clone(),
                indices: (0..handle.roi_ids.len()).collect(),
                description: format!("all ROIs of {}", handle.plane),
            },
        },
    )?;

    spdlog::info!(
        "Added {} traces of {} samples to {}/{}",
        handle.roi_ids.len(),
        n_samples,
        container,
        name
    );
    Ok(None)
}
