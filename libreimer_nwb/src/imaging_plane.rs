use ndarray::{s, ArrayView1};

use super::error::{AssemblyError, MissingDataWarning};
use super::imaging::ImagingSource;
use super::keys::FieldKey;
use super::metadata::Metadata;
use super::nwb::{
    Acquisition, Device, ImagingPlane, NwbFile, OpticalChannel, Timing, TwoPhotonSeries,
};

/// Name of the two-photon series of a field channel. Channel 1 uses the name from the
/// metadata, other channels append `Channel{n}`.
pub fn two_photon_series_name(metadata_name: &str, channel: u32) -> String {
    if channel == 1 {
        metadata_name.to_string()
    } else {
        format!("{metadata_name}Channel{channel}")
    }
}

/// Register the device and imaging plane of a field and, when raw imaging exists, the
/// two-photon series of the field channel. Returns the imaging plane name.
///
/// Planes and devices are shared by every channel of a field, so they are created on first
/// use. The two-photon series is timed with the odor-clock frame times, truncated to
/// whichever of frames or times is shorter.
pub fn attach_imaging_plane(
    nwbfile: &mut NwbFile,
    metadata: &Metadata,
    key: &FieldKey,
    source: Option<&dyn ImagingSource>,
    frame_times: ArrayView1<'_, f64>,
    max_frames: Option<usize>,
) -> Result<(String, Option<MissingDataWarning>), AssemblyError> {
    let series_meta = metadata.photon_series(key.field())?;
    let plane_meta = metadata.imaging_plane(&series_meta.imaging_plane)?;
    let device_meta = metadata.device(&plane_meta.device)?;

    nwbfile.devices.get_or_create(&device_meta.name, || Device {
        name: device_meta.name.clone(),
        description: device_meta.description.clone(),
        manufacturer: device_meta.manufacturer.clone(),
    });

    let imaging_rate = source
        .and_then(|s| s.sampling_frequency())
        .unwrap_or(plane_meta.imaging_rate);
    nwbfile
        .imaging_planes
        .get_or_create(&plane_meta.name, || ImagingPlane {
            name: plane_meta.name.clone(),
            description: plane_meta.description.clone(),
            device: device_meta.name.clone(),
            excitation_lambda: plane_meta.excitation_lambda,
            imaging_rate,
            indicator: plane_meta.indicator.clone(),
            location: plane_meta.location.clone(),
            optical_channel: OpticalChannel {
                name: plane_meta.optical_channel.name.clone(),
                description: plane_meta.optical_channel.description.clone(),
                emission_lambda: plane_meta.optical_channel.emission_lambda,
            },
        });

    let source = match source {
        Some(source) => source,
        None => {
            return Ok((
                plane_meta.name.clone(),
                Some(MissingDataWarning::new("raw imaging", key)),
            ))
        }
    };
    let series_name = two_photon_series_name(&series_meta.name, key.channel());
    if nwbfile.acquisition.contains(&series_name) {
        spdlog::debug!(
            "{} already holds the raw imaging of field {} channel {}",
            series_name,
            key.field(),
            key.channel()
        );
        return Ok((plane_meta.name.clone(), None));
    }

    let frames = source.read_frames(max_frames)?;
    let n_frames = frames.num_frames();
    if frame_times.len() < n_frames {
        spdlog::warn!(
            "Field {} has {} frames but only {} frame times; dropping the last {} frames",
            key.field(),
            n_frames,
            frame_times.len(),
            n_frames - frame_times.len()
        );
    }
    let n_samples = n_frames.min(frame_times.len());
    let data = frames.head(n_samples);
    let timestamps = frame_times.slice(s![..n_samples]).to_owned();

    nwbfile.add_acquisition(Acquisition::TwoPhoton(TwoPhotonSeries {
        name: series_name.clone(),
        description: series_meta.description.clone(),
        imaging_plane: plane_meta.name.clone(),
        data,
        timing: Timing::Timestamps(timestamps),
    }))?;
    spdlog::info!(
        "Added {} frames of {}x{} to {}",
        n_samples,
        source.image_size().0,
        source.image_size().1,
        series_name
    );
    Ok((plane_meta.name.clone(), None))
}
