use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group, Location};
use ndarray::{arr0, ArrayView, ArrayView1, Dimension};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;

use super::error::NwbWriterError;
use super::nwb::{
    Acquisition, CovariateValue, DataInterface, Device, Fluorescence, FrameData, ImageSegmentation,
    ImageSet, ImagingPlane, NwbFile, PlaneSegmentation, ProcessingModule, RoiResponseSeries,
    SeriesKind, Subject, TimeSeries, Timing, TrialTable, TwoPhotonSeries,
};

const NWB_VERSION: &str = "2.7.0";
const NAMESPACE: &str = "core";

const ACQUISITION_NAME: &str = "acquisition";
const ANALYSIS_NAME: &str = "analysis";
const PROCESSING_NAME: &str = "processing";
const STIMULUS_NAME: &str = "stimulus";
const GENERAL_NAME: &str = "general";
const INTERVALS_NAME: &str = "intervals";
const TRIALS_NAME: &str = "trials";
const DEVICES_NAME: &str = "devices";
const OPTOPHYSIOLOGY_NAME: &str = "optophysiology";

/// Pixel mask row as stored in a PlaneSegmentation (x is the column, y the row)
#[derive(hdf5::H5Type, Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct PixelMaskRecord {
    pub x: u32,
    pub y: u32,
    pub weight: f32,
}

// Structure
// / - nwb_version, namespace, neurodata_type
// |---- identifier, session_description, session_start_time, timestamps_reference_time, file_create_date
// |---- general - lab, institution, ...
// |    |---- subject
// |    |---- devices/<device>
// |    |---- optophysiology/<imaging plane>/<optical channel>
// |---- acquisition/<series> - data, timestamps (or link)
// |---- processing/<module>/<interface>
// |---- intervals/trials - id, start_time, stop_time, <covariates>
// |---- analysis, stimulus/presentation, stimulus/templates (empty)

/// `<path>.part`, where a file lives until it is completely written
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Write `nwbfile` to `path`, returning the file size. Nothing is left at `path` on failure.
pub fn write_nwb_file(
    path: &Path,
    nwbfile: &NwbFile,
    compression: Option<u8>,
) -> Result<u64, NwbWriterError> {
    let mut writer = NwbWriter::new(path, compression)?;
    if let Err(e) = writer.write(nwbfile) {
        writer.discard()?;
        return Err(e);
    }
    writer.close()
}

/// Writes an [`NwbFile`] as an NWB 2.x HDF5 file.
///
/// The document is written to a `.part` sibling of the output path, which
/// [`NwbWriter::close`] moves into place. An unfinished file never sits at the output path.
#[derive(Debug)]
pub struct NwbWriter {
    file_handle: File,
    path: PathBuf,
    partial: PathBuf,
    compression: Option<u8>,
}

impl NwbWriter {
    /// Start writing the file for `path`. `compression` is the deflate level of array datasets.
    pub fn new(path: &Path, compression: Option<u8>) -> Result<Self, NwbWriterError> {
        let partial = partial_path(path);
        let file_handle = File::create(&partial)?;
        spdlog::info!("Created NWB file {}", partial.display());
        Ok(Self {
            file_handle,
            path: path.to_path_buf(),
            partial,
            compression,
        })
    }

    /// Write the whole document
    pub fn write(&mut self, nwbfile: &NwbFile) -> Result<(), NwbWriterError> {
        let root: &Group = &self.file_handle;
        set_attr_str(root, "nwb_version", NWB_VERSION)?;
        set_neurodata_type(root, "NWBFile")?;

        write_string(root, "identifier", &nwbfile.identifier)?;
        write_string(root, "session_description", &nwbfile.session_description)?;
        let start_time = nwbfile.session_start_time.format(&Rfc3339)?;
        write_string(root, "session_start_time", &start_time)?;
        write_string(root, "timestamps_reference_time", &start_time)?;
        write_strings(
            root,
            "file_create_date",
            &[nwbfile.file_create_date.format(&Rfc3339)?],
        )?;

        self.write_general(root, nwbfile)?;

        let acquisition = root.create_group(ACQUISITION_NAME)?;
        for (_, item) in nwbfile.acquisition.iter() {
            match item {
                Acquisition::Series(series) => self.write_time_series(&acquisition, series)?,
                Acquisition::TwoPhoton(series) => self.write_two_photon(&acquisition, series)?,
            }
        }

        let processing = root.create_group(PROCESSING_NAME)?;
        for (_, module) in nwbfile.processing.iter() {
            self.write_processing_module(&processing, module)?;
        }

        let intervals = root.create_group(INTERVALS_NAME)?;
        if !nwbfile.trials.trials.is_empty() {
            self.write_trials(&intervals, &nwbfile.trials)?;
        }

        root.create_group(ANALYSIS_NAME)?;
        let stimulus = root.create_group(STIMULUS_NAME)?;
        stimulus.create_group("presentation")?;
        stimulus.create_group("templates")?;
        Ok(())
    }

    /// Flush and close the file, move it to the output path and return its size in bytes
    pub fn close(self) -> Result<u64, NwbWriterError> {
        self.file_handle.close()?;
        if let Err(e) = std::fs::rename(&self.partial, &self.path) {
            std::fs::remove_file(&self.partial)?;
            return Err(e.into());
        }
        let size = std::fs::metadata(&self.path)?.len();
        spdlog::info!(
            "Wrote {} ({})",
            self.path.display(),
            human_bytes::human_bytes(size as f64)
        );
        Ok(size)
    }

    /// Close and delete an unfinished file
    pub fn discard(self) -> Result<(), NwbWriterError> {
        drop(self.file_handle);
        if self.partial.exists() {
            std::fs::remove_file(&self.partial)?;
        }
        spdlog::warn!("Discarded unfinished NWB file {}", self.partial.display());
        Ok(())
    }

    /// Array dataset, chunked and deflated when compression is on
    fn write_array<T: H5Type, D: Dimension>(
        &self,
        group: &Group,
        name: &str,
        data: ArrayView<'_, T, D>,
    ) -> Result<Dataset, NwbWriterError> {
        let shape = data.shape().to_vec();
        let mut builder = group.new_dataset::<T>().shape(shape.clone());
        // HDF5 refuses chunks with a zero extent
        if let Some(level) = self.compression {
            if !data.is_empty() {
                builder = builder.chunk(shape).deflate(level);
            }
        }
        let dataset = builder.create(name)?;
        if !data.is_empty() {
            dataset.write(data)?;
        }
        Ok(dataset)
    }

    fn write_general(&self, root: &Group, nwbfile: &NwbFile) -> Result<(), NwbWriterError> {
        let general = root.create_group(GENERAL_NAME)?;
        let meta = &nwbfile.general;
        write_string(&general, "session_id", &meta.session_id)?;
        write_string(&general, "lab", &meta.lab)?;
        write_string(&general, "institution", &meta.institution)?;
        write_string(&general, "experiment_description", &meta.experiment_description)?;
        if !meta.experimenter.is_empty() {
            write_strings(&general, "experimenter", &meta.experimenter)?;
        }
        if !meta.keywords.is_empty() {
            write_strings(&general, "keywords", &meta.keywords)?;
        }

        if let Some(subject) = &nwbfile.subject {
            write_subject(&general, subject)?;
        }

        let devices = general.create_group(DEVICES_NAME)?;
        for (_, device) in nwbfile.devices.iter() {
            write_device(&devices, device)?;
        }

        let optophysiology = general.create_group(OPTOPHYSIOLOGY_NAME)?;
        for (_, plane) in nwbfile.imaging_planes.iter() {
            write_imaging_plane(&optophysiology, plane)?;
        }
        Ok(())
    }

    fn write_timing(&self, group: &Group, timing: &Timing) -> Result<(), NwbWriterError> {
        match timing {
            Timing::Timestamps(timestamps) => {
                let dataset = self.write_array(group, "timestamps", timestamps.view())?;
                dataset
                    .new_attr::<i32>()
                    .create("interval")?
                    .write_scalar(&1)?;
                set_attr_str(&dataset, "unit", "seconds")?;
            }
            Timing::Linked { path, .. } => {
                group.link_hard(path, "timestamps")?;
            }
        }
        Ok(())
    }

    fn write_time_series(&self, parent: &Group, series: &TimeSeries) -> Result<(), NwbWriterError> {
        let group = parent.create_group(&series.name)?;
        match &series.kind {
            SeriesKind::Plain => set_neurodata_type(&group, "TimeSeries")?,
            SeriesKind::Spatial { reference_frame } => {
                set_neurodata_type(&group, "SpatialSeries")?;
                write_string(&group, "reference_frame", reference_frame)?;
            }
        }
        set_attr_str(&group, "description", &series.description)?;
        set_attr_str(&group, "comments", "no comments")?;
        let data = self.write_array(&group, "data", series.data.view())?;
        set_data_attrs(&data, &series.unit)?;
        self.write_timing(&group, &series.timing)
    }

    fn write_two_photon(&self, parent: &Group, series: &TwoPhotonSeries) -> Result<(), NwbWriterError> {
        let group = parent.create_group(&series.name)?;
        set_neurodata_type(&group, "TwoPhotonSeries")?;
        set_attr_str(&group, "description", &series.description)?;
        set_attr_str(&group, "comments", "no comments")?;
        let data = match &series.data {
            FrameData::I16(frames) => self.write_array(&group, "data", frames.view())?,
            FrameData::U16(frames) => self.write_array(&group, "data", frames.view())?,
        };
        set_data_attrs(&data, "n.a.")?;
        self.write_timing(&group, &series.timing)?;
        group.link_hard(&imaging_plane_path(&series.imaging_plane), "imaging_plane")?;
        Ok(())
    }

    fn write_processing_module(
        &self,
        parent: &Group,
        module: &ProcessingModule,
    ) -> Result<(), NwbWriterError> {
        let group = parent.create_group(&module.name)?;
        set_neurodata_type(&group, "ProcessingModule")?;
        set_attr_str(&group, "description", &module.description)?;
        for (_, interface) in module.interfaces.iter() {
            match interface {
                DataInterface::Series(series) => self.write_time_series(&group, series)?,
                DataInterface::Images(images) => self.write_images(&group, images)?,
                DataInterface::Segmentation(segmentation) => {
                    self.write_segmentation(&group, segmentation)?
                }
                DataInterface::Fluorescence(fluorescence) => {
                    self.write_fluorescence(&group, fluorescence)?
                }
            }
        }
        Ok(())
    }

    fn write_images(&self, parent: &Group, images: &ImageSet) -> Result<(), NwbWriterError> {
        let group = parent.create_group(&images.name)?;
        set_neurodata_type(&group, "Images")?;
        set_attr_str(&group, "description", &images.description)?;
        for (name, image) in images.images.iter() {
            let dataset = self.write_array(&group, name, image.data.view())?;
            set_neurodata_type(&dataset, "GrayscaleImage")?;
            set_attr_str(&dataset, "description", &image.description)?;
        }
        Ok(())
    }

    fn write_segmentation(
        &self,
        parent: &Group,
        segmentation: &ImageSegmentation,
    ) -> Result<(), NwbWriterError> {
        let group = parent.create_group(&segmentation.name)?;
        set_neurodata_type(&group, "ImageSegmentation")?;
        for (_, plane) in segmentation.planes.iter() {
            self.write_plane_segmentation(&group, plane)?;
        }
        Ok(())
    }

    fn write_plane_segmentation(
        &self,
        parent: &Group,
        plane: &PlaneSegmentation,
    ) -> Result<(), NwbWriterError> {
        let group = parent.create_group(&plane.name)?;
        set_neurodata_type(&group, "PlaneSegmentation")?;
        set_attr_str(&group, "description", &plane.description)?;
        set_attr_strs(&group, "colnames", &[String::from("pixel_mask")])?;

        let ids: Vec<u32> = plane.rois.iter().map(|roi| roi.id).collect();
        let id_dataset = self.write_array(&group, "id", ArrayView1::from(ids.as_slice()))?;
        set_neurodata_type(&id_dataset, "ElementIdentifiers")?;

        let mut records: Vec<PixelMaskRecord> = Vec::new();
        let mut index: Vec<u64> = Vec::with_capacity(plane.rois.len());
        for roi in plane.rois.iter() {
            records.extend(roi.pixel_mask.iter().map(|p| PixelMaskRecord {
                x: p.column,
                y: p.row,
                weight: p.weight,
            }));
            index.push(records.len() as u64);
        }
        let mask_dataset =
            self.write_array(&group, "pixel_mask", ArrayView1::from(records.as_slice()))?;
        set_neurodata_type(&mask_dataset, "VectorData")?;
        set_attr_str(&mask_dataset, "description", "Image masks for each ROI")?;
        let index_dataset =
            self.write_array(&group, "pixel_mask_index", ArrayView1::from(index.as_slice()))?;
        set_neurodata_type(&index_dataset, "VectorIndex")?;

        group.link_hard(&imaging_plane_path(&plane.imaging_plane), "imaging_plane")?;
        Ok(())
    }

    fn write_fluorescence(
        &self,
        parent: &Group,
        fluorescence: &Fluorescence,
    ) -> Result<(), NwbWriterError> {
        let group = parent.create_group(&fluorescence.name)?;
        set_neurodata_type(&group, "Fluorescence")?;
        for (_, series) in fluorescence.series.iter() {
            self.write_response_series(&group, series)?;
        }
        Ok(())
    }

    fn write_response_series(
        &self,
        parent: &Group,
        series: &RoiResponseSeries,
    ) -> Result<(), NwbWriterError> {
        let group = parent.create_group(&series.name)?;
        set_neurodata_type(&group, "RoiResponseSeries")?;
        set_attr_str(&group, "description", &series.description)?;
        set_attr_str(&group, "comments", "no comments")?;
        let data = self.write_array(&group, "data", series.data.view())?;
        set_data_attrs(&data, &series.unit)?;
        self.write_array(&group, "timestamps", series.timestamps.view())?;

        let indices: Vec<u64> = series.rois.indices.iter().map(|i| *i as u64).collect();
        let rois = self.write_array(&group, "rois", ArrayView1::from(indices.as_slice()))?;
        set_neurodata_type(&rois, "DynamicTableRegion")?;
        set_attr_str(&rois, "description", &series.rois.description)?;
        set_attr_str(&rois, "table", &series.rois.plane_segmentation)?;
        Ok(())
    }

    fn write_trials(&self, parent: &Group, trials: &TrialTable) -> Result<(), NwbWriterError> {
        let group = parent.create_group(TRIALS_NAME)?;
        set_neurodata_type(&group, "TimeIntervals")?;
        set_attr_str(&group, "description", "experimental trials")?;
        let mut colnames = vec![String::from("start_time"), String::from("stop_time")];
        colnames.extend(trials.columns.iter().map(|c| c.name.clone()));
        set_attr_strs(&group, "colnames", &colnames)?;

        let ids: Vec<i64> = (0..trials.trials.len() as i64).collect();
        let id_dataset = self.write_array(&group, "id", ArrayView1::from(ids.as_slice()))?;
        set_neurodata_type(&id_dataset, "ElementIdentifiers")?;

        let starts: Vec<f64> = trials.trials.iter().map(|t| t.start_time).collect();
        let stops: Vec<f64> = trials.trials.iter().map(|t| t.stop_time).collect();
        for (name, description, values) in [
            ("start_time", "Start time of epoch, in seconds", starts),
            ("stop_time", "Stop time of epoch, in seconds", stops),
        ] {
            let dataset = self.write_array(&group, name, ArrayView1::from(values.as_slice()))?;
            set_neurodata_type(&dataset, "VectorData")?;
            set_attr_str(&dataset, "description", description)?;
        }

        for (col, column) in trials.columns.iter().enumerate() {
            let values: Vec<&CovariateValue> =
                trials.trials.iter().map(|t| &t.covariates[col]).collect();
            let all_float = values.iter().all(|v| matches!(v, CovariateValue::Float(_)));
            let dataset = if all_float {
                let floats: Vec<f64> = values
                    .iter()
                    .map(|v| match v {
                        CovariateValue::Float(f) => *f,
                        CovariateValue::Text(_) => f64::NAN,
                    })
                    .collect();
                self.write_array(&group, &column.name, ArrayView1::from(floats.as_slice()))?
            } else {
                let texts: Vec<String> = values
                    .iter()
                    .map(|v| match v {
                        CovariateValue::Text(s) => s.clone(),
                        CovariateValue::Float(f) => f.to_string(),
                    })
                    .collect();
                write_strings(&group, &column.name, &texts)?
            };
            set_neurodata_type(&dataset, "VectorData")?;
            set_attr_str(&dataset, "description", &column.description)?;
        }
        Ok(())
    }
}

fn imaging_plane_path(name: &str) -> String {
    format!("/{GENERAL_NAME}/{OPTOPHYSIOLOGY_NAME}/{name}")
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode, NwbWriterError> {
    Ok(VarLenUnicode::from_str(value)?)
}

fn set_attr_str(location: &Location, name: &str, value: &str) -> Result<(), NwbWriterError> {
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&to_var_len_unicode(value)?)?;
    Ok(())
}

fn set_attr_strs(location: &Location, name: &str, values: &[String]) -> Result<(), NwbWriterError> {
    let values = values
        .iter()
        .map(|v| to_var_len_unicode(v))
        .collect::<Result<Vec<_>, _>>()?;
    location
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create(name)?
        .write(ArrayView1::from(values.as_slice()))?;
    Ok(())
}

fn set_neurodata_type(location: &Location, neurodata_type: &str) -> Result<(), NwbWriterError> {
    set_attr_str(location, "namespace", NAMESPACE)?;
    set_attr_str(location, "neurodata_type", neurodata_type)
}

fn set_data_attrs(dataset: &Dataset, unit: &str) -> Result<(), NwbWriterError> {
    set_attr_str(dataset, "unit", unit)?;
    dataset
        .new_attr::<f32>()
        .create("conversion")?
        .write_scalar(&1.0_f32)?;
    dataset
        .new_attr::<f32>()
        .create("offset")?
        .write_scalar(&0.0_f32)?;
    dataset
        .new_attr::<f32>()
        .create("resolution")?
        .write_scalar(&-1.0_f32)?;
    Ok(())
}

fn write_string(group: &Group, name: &str, value: &str) -> Result<Dataset, NwbWriterError> {
    Ok(group
        .new_dataset_builder()
        .with_data(&arr0(to_var_len_unicode(value)?))
        .create(name)?)
}

fn write_strings(group: &Group, name: &str, values: &[String]) -> Result<Dataset, NwbWriterError> {
    let values = values
        .iter()
        .map(|v| to_var_len_unicode(v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(group
        .new_dataset_builder()
        .with_data(ArrayView1::from(values.as_slice()))
        .create(name)?)
}

fn write_f64(group: &Group, name: &str, value: f64) -> Result<Dataset, NwbWriterError> {
    Ok(group
        .new_dataset_builder()
        .with_data(&arr0(value))
        .create(name)?)
}

fn write_subject(general: &Group, subject: &Subject) -> Result<(), NwbWriterError> {
    let group = general.create_group("subject")?;
    set_neurodata_type(&group, "Subject")?;
    write_string(&group, "subject_id", &subject.subject_id)?;
    write_string(&group, "sex", subject.sex.as_str())?;
    write_string(&group, "species", &subject.species)?;
    write_string(&group, "description", &subject.description)?;
    if let Some(dob) = subject.date_of_birth {
        write_string(&group, "date_of_birth", &dob.format(&Rfc3339)?)?;
    }
    Ok(())
}

fn write_device(devices: &Group, device: &Device) -> Result<(), NwbWriterError> {
    let group = devices.create_group(&device.name)?;
    set_neurodata_type(&group, "Device")?;
    set_attr_str(&group, "description", &device.description)?;
    set_attr_str(&group, "manufacturer", &device.manufacturer)?;
    Ok(())
}

fn write_imaging_plane(optophysiology: &Group, plane: &ImagingPlane) -> Result<(), NwbWriterError> {
    let group = optophysiology.create_group(&plane.name)?;
    set_neurodata_type(&group, "ImagingPlane")?;
    write_string(&group, "description", &plane.description)?;
    write_f64(&group, "excitation_lambda", plane.excitation_lambda)?;
    write_f64(&group, "imaging_rate", plane.imaging_rate)?;
    write_string(&group, "indicator", &plane.indicator)?;
    write_string(&group, "location", &plane.location)?;
    group.link_hard(&format!("/{GENERAL_NAME}/{DEVICES_NAME}/{}", plane.device), "device")?;

    let channel = group.create_group(&plane.optical_channel.name)?;
    set_neurodata_type(&channel, "OpticalChannel")?;
    write_string(&channel, "description", &plane.optical_channel.description)?;
    write_f64(&channel, "emission_lambda", plane.optical_channel.emission_lambda)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nwb::{
        GrayscaleImage, OpticalChannel, PixelMaskEntry, Roi, RoiTableRegion, Sex, BEHAVIOR_MODULE,
        OPHYS_MODULE,
    };
    use ndarray::{array, Array2, Array3};
    use time::OffsetDateTime;

    fn small_file() -> NwbFile {
        let mut nwbfile = NwbFile::new("124_3_1", "odor session", OffsetDateTime::UNIX_EPOCH);
        nwbfile.general.lab = String::from("Reimer");
        nwbfile.subject = Some(Subject {
            subject_id: String::from("124"),
            date_of_birth: None,
            sex: Sex::Female,
            species: String::from("Mus musculus"),
            description: String::from("no notes"),
        });
        nwbfile
            .devices
            .insert(
                "Mesoscope",
                Device {
                    name: String::from("Mesoscope"),
                    description: String::new(),
                    manufacturer: String::from("Thorlabs"),
                },
            )
            .unwrap();
        nwbfile
            .imaging_planes
            .insert(
                "ImagingPlaneFOV1",
                ImagingPlane {
                    name: String::from("ImagingPlaneFOV1"),
                    description: String::new(),
                    device: String::from("Mesoscope"),
                    excitation_lambda: 920.0,
                    imaging_rate: 9.5,
                    indicator: String::from("GCaMP6s"),
                    location: String::from("olfactory bulb"),
                    optical_channel: OpticalChannel {
                        name: String::from("Green"),
                        description: String::new(),
                        emission_lambda: 513.0,
                    },
                },
            )
            .unwrap();
        nwbfile
            .add_acquisition(Acquisition::Series(TimeSeries {
                name: String::from("treadmill_position"),
                description: String::from("position"),
                unit: String::from("unknown"),
                data: array![1.0, 2.0, 3.0],
                timing: Timing::Timestamps(array![0.0, 0.5, 1.0]),
                kind: SeriesKind::Spatial {
                    reference_frame: String::from("unknown"),
                },
            }))
            .unwrap();
        nwbfile
            .add_acquisition(Acquisition::TwoPhoton(TwoPhotonSeries {
                name: String::from("TwoPhotonSeriesFOV1"),
                description: String::new(),
                imaging_plane: String::from("ImagingPlaneFOV1"),
                data: FrameData::U16(Array3::from_elem((2, 3, 4), 40000)),
                timing: Timing::Timestamps(array![0.0, 0.1]),
            }))
            .unwrap();
        nwbfile
            .processing_module(BEHAVIOR_MODULE, "behavioral data processing")
            .add(DataInterface::Series(TimeSeries {
                name: String::from("treadmill_velocity"),
                description: String::from("velocity"),
                unit: String::from("unknown"),
                data: array![0.1, 0.2, 0.3],
                timing: Timing::Linked {
                    path: String::from("/acquisition/treadmill_position/timestamps"),
                    len: 3,
                },
                kind: SeriesKind::Plain,
            }))
            .unwrap();

        let mut images = ImageSet::new("average_images", "averages");
        images
            .images
            .insert(
                "average_image_FOV1_channel1",
                GrayscaleImage {
                    name: String::from("average_image_FOV1_channel1"),
                    description: String::new(),
                    data: Array2::from_elem((3, 4), 0.5),
                },
            )
            .unwrap();
        let mut segmentation = ImageSegmentation::new("ImageSegmentationMethod6");
        segmentation
            .planes
            .insert(
                "PlaneSegmentationFOV1Channel1",
                PlaneSegmentation {
                    name: String::from("PlaneSegmentationFOV1Channel1"),
                    description: String::new(),
                    imaging_plane: String::from("ImagingPlaneFOV1"),
                    rois: vec![
                        Roi {
                            id: 11,
                            pixel_mask: vec![
                                PixelMaskEntry { row: 0, column: 1, weight: 0.5 },
                                PixelMaskEntry { row: 2, column: 3, weight: 0.25 },
                            ],
                        },
                        Roi {
                            id: 12,
                            pixel_mask: vec![PixelMaskEntry { row: 1, column: 1, weight: 1.0 }],
                        },
                    ],
                },
            )
            .unwrap();
        let mut fluorescence = Fluorescence::new("FluorescenceMethod6");
        fluorescence
            .series
            .insert(
                "RoiResponseSeriesFOV1Channel1",
                RoiResponseSeries {
                    name: String::from("RoiResponseSeriesFOV1Channel1"),
                    description: String::new(),
                    unit: String::from("n.a."),
                    data: Array2::zeros((2, 2)),
                    timestamps: array![0.0, 0.1],
                    rois: RoiTableRegion {
                        plane_segmentation: String::from(
                            "/processing/ophys/ImageSegmentationMethod6/PlaneSegmentationFOV1Channel1",
                        ),
                        indices: vec![0, 1],
                        description: String::from("all ROIs"),
                    },
                },
            )
            .unwrap();
        let module = nwbfile.processing_module(OPHYS_MODULE, "ophys data processing");
        module.add(DataInterface::Images(images)).unwrap();
        module.add(DataInterface::Segmentation(segmentation)).unwrap();
        module.add(DataInterface::Fluorescence(fluorescence)).unwrap();

        nwbfile.add_trial_column("odorant", "the name of the odorant").unwrap();
        nwbfile.add_trial_column("concentration", "the concentration").unwrap();
        nwbfile
            .add_trial(
                0.0,
                1.0,
                vec![
                    ("odorant", CovariateValue::Text(String::from("hexanal"))),
                    ("concentration", CovariateValue::Float(0.1)),
                ],
            )
            .unwrap();
        nwbfile
    }

    fn read_attr(location: &Location, name: &str) -> String {
        location
            .attr(name)
            .unwrap()
            .read_scalar::<VarLenUnicode>()
            .unwrap()
            .as_str()
            .to_string()
    }

    #[test]
    fn test_write_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub-124_ses-3.nwb");
        let mut writer = NwbWriter::new(&path, Some(4)).unwrap();
        writer.write(&small_file()).unwrap();
        assert!(!path.exists());
        let size = writer.close().unwrap();
        assert!(size > 0);
        assert!(!partial_path(&path).exists());

        let file = File::open(&path).unwrap();
        assert_eq!(read_attr(&file, "neurodata_type"), "NWBFile");
        assert_eq!(read_attr(&file, "nwb_version"), NWB_VERSION);
        let identifier = file
            .dataset("identifier")
            .unwrap()
            .read_scalar::<VarLenUnicode>()
            .unwrap();
        assert_eq!(identifier.as_str(), "124_3_1");

        let position = file.group("acquisition/treadmill_position").unwrap();
        assert_eq!(read_attr(&position, "neurodata_type"), "SpatialSeries");
        let velocity_ts = file
            .dataset("processing/behavior/treadmill_velocity/timestamps")
            .unwrap()
            .read_raw::<f64>()
            .unwrap();
        assert_eq!(velocity_ts, vec![0.0, 0.5, 1.0]);

        let frames = file
            .dataset("acquisition/TwoPhotonSeriesFOV1/data")
            .unwrap();
        assert_eq!(frames.shape(), vec![2, 3, 4]);
        // unsigned samples keep their full range
        assert!(frames.read_raw::<u16>().unwrap().iter().all(|v| *v == 40000));
        assert!(file
            .group("acquisition/TwoPhotonSeriesFOV1/imaging_plane/Green")
            .is_ok());

        let plane = "processing/ophys/ImageSegmentationMethod6/PlaneSegmentationFOV1Channel1";
        let masks = file
            .dataset(&format!("{plane}/pixel_mask"))
            .unwrap()
            .read_raw::<PixelMaskRecord>()
            .unwrap();
        assert_eq!(
            masks[1],
            PixelMaskRecord {
                x: 3,
                y: 2,
                weight: 0.25
            }
        );
        let index = file
            .dataset(&format!("{plane}/pixel_mask_index"))
            .unwrap()
            .read_raw::<u64>()
            .unwrap();
        assert_eq!(index, vec![2, 3]);
        let ids = file
            .dataset(&format!("{plane}/id"))
            .unwrap()
            .read_raw::<u32>()
            .unwrap();
        assert_eq!(ids, vec![11, 12]);

        let odorants = file
            .dataset("intervals/trials/odorant")
            .unwrap()
            .read_raw::<VarLenUnicode>()
            .unwrap();
        assert_eq!(odorants[0].as_str(), "hexanal");
        let concentrations = file
            .dataset("intervals/trials/concentration")
            .unwrap()
            .read_raw::<f64>()
            .unwrap();
        assert_eq!(concentrations, vec![0.1]);
        assert!(file.group("general/subject").is_ok());
    }

    #[test]
    fn test_write_without_compression_or_trials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.nwb");
        let nwbfile = NwbFile::new("id", "desc", OffsetDateTime::UNIX_EPOCH);
        let mut writer = NwbWriter::new(&path, None).unwrap();
        writer.write(&nwbfile).unwrap();
        writer.close().unwrap();

        let file = File::open(&path).unwrap();
        assert!(file.group("intervals").is_ok());
        assert!(file.group("intervals/trials").is_err());
        assert!(file.group("general/subject").is_err());
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub-124_ses-3.nwb");
        let mut nwbfile = NwbFile::new("id", "desc", OffsetDateTime::UNIX_EPOCH);
        nwbfile
            .add_acquisition(Acquisition::Series(TimeSeries {
                name: String::from("treadmill_velocity"),
                description: String::from("velocity"),
                unit: String::from("unknown"),
                data: array![0.1, 0.2],
                timing: Timing::Linked {
                    path: String::from("/acquisition/missing/timestamps"),
                    len: 2,
                },
                kind: SeriesKind::Plain,
            }))
            .unwrap();

        assert!(matches!(
            write_nwb_file(&path, &nwbfile, None),
            Err(NwbWriterError::HDF5Error(_))
        ));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());

        let size = write_nwb_file(&path, &small_file(), Some(1)).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
    }
}
