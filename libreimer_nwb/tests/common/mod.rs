#![allow(dead_code)]

use libreimer_nwb::keys::SessionKey;
use libreimer_nwb::records::{
    MaskRow, RespirationRecord, SessionInfo, SubjectRecord, SummaryImageRow, TraceRow,
    TreadmillRecord, TrialRow,
};
use libreimer_nwb::tables::{FieldExport, PipelineTables, SessionExport};
use ndarray::{array, Array1, Array2};
use std::fs::File;
use std::path::Path;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use time::macros::date;

/// Rows x columns of the summary images
pub const IMAGE_SHAPE: (usize, usize) = (4, 5);
pub const TRACE_LEN: usize = 6;
pub const CLOCK_LEN: usize = 8;

pub const SCANIMAGE_DESCRIPTION: &str = "frameNumbers = 1\nepoch = [2023  5 24 13 47 12.5]\n";
pub const SCANIMAGE_SOFTWARE: &str = "SI.VERSION_MAJOR = 2020\nSI.hRoiManager.scanFrameRate = 9.38\n";

pub fn session_key() -> SessionKey {
    SessionKey::new(124, 3).with_scan(1)
}

pub fn mask_ids(field: u32) -> Vec<u32> {
    vec![field * 10 + 1, field * 10 + 2]
}

fn summary_image(field: u32, value: f32) -> SummaryImageRow {
    SummaryImageRow {
        field,
        channel: 1,
        image: Array2::from_elem(IMAGE_SHAPE, value),
    }
}

/// Two ROIs per field. The first covers (0, 0), (1, 0) and (0, 1), the second (3, 4).
pub fn field_export(field: u32, segmentation_method: u32) -> FieldExport {
    let ids = mask_ids(field);
    FieldExport {
        field,
        channel: 1,
        segmentation_method,
        masks: vec![
            MaskRow {
                mask_id: ids[0],
                pixels: array![0, 1, 4],
                weights: array![0.5, 0.25, 0.125],
            },
            MaskRow {
                mask_id: ids[1],
                pixels: array![19],
                weights: array![1.0],
            },
        ],
        traces: ids
            .iter()
            .map(|id| TraceRow {
                mask_id: *id,
                trace: Array1::from_iter((0..TRACE_LEN).map(|t| (*id * 100 + t as u32) as f32)),
            })
            .collect(),
    }
}

/// A complete session with one channel per field, all fields sharing `segmentation_method`
pub fn session_export(n_fields: u32, segmentation_method: u32) -> SessionExport {
    let odor_times = Array1::from_iter((0..CLOCK_LEN).map(|i| 100.0 + i as f64 * 0.1));
    let behavior_times = Array1::from_iter((0..CLOCK_LEN).map(|i| i as f64 * 0.1));
    SessionExport {
        key: session_key(),
        info: SessionInfo {
            animal_id: 124,
            session_date: date!(2023 - 05 - 24),
        },
        subject: SubjectRecord {
            animal_id: 124,
            dob: Some(date!(2023 - 01 - 10)),
            sex: String::from("F"),
            notes: Some(String::from("window implanted")),
        },
        odor_frame_times: Some(odor_times),
        behavior_frame_times: Some(behavior_times),
        treadmill: Some(TreadmillRecord {
            treadmill_time: array![0.05, 0.15, 0.25, 0.35],
            treadmill_vel: array![0.0, 1.0, 2.0, 1.0],
            treadmill_raw: array![10.0, 11.0, 13.0, 16.0],
        }),
        trials: vec![
            TrialRow {
                trial_start_time: 100.1,
                trial_end_time: 100.3,
                odorant: String::from("hexanal"),
                concentration: 0.01,
                solution_date: date!(2023 - 05 - 20),
            },
            TrialRow {
                trial_start_time: 100.4,
                trial_end_time: 100.6,
                odorant: String::from("amyl acetate"),
                concentration: 0.1,
                solution_date: date!(2023 - 05 - 21),
            },
        ],
        respiration: vec![RespirationRecord {
            recording_idx: 1,
            trace: array![0.1, 0.3, 0.2],
            times: array![100.0, 100.2, 100.4],
        }],
        average_images: (1..=n_fields).map(|f| summary_image(f, 1.0)).collect(),
        correlation_images: (1..=n_fields).map(|f| summary_image(f, 0.5)).collect(),
        fields: (1..=n_fields)
            .map(|f| field_export(f, segmentation_method))
            .collect(),
    }
}

pub fn tables(export: SessionExport) -> PipelineTables {
    let mut tables = PipelineTables::new();
    tables.insert_session(export).unwrap();
    tables
}

/// Write `n_frames` ScanImage pages of a width x height ramp starting at `first_value`
pub fn write_scan(path: &Path, n_frames: usize, width: u32, height: u32, first_value: u16) {
    let mut file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(&mut file).unwrap();
    for frame in 0..n_frames {
        let data: Vec<u16> = (0..(width * height) as u16)
            .map(|v| v + first_value + frame as u16 * 1000)
            .collect();
        let mut image = encoder
            .new_image::<colortype::Gray16>(width, height)
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::ImageDescription, SCANIMAGE_DESCRIPTION)
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::Software, SCANIMAGE_SOFTWARE)
            .unwrap();
        image.write_data(&data).unwrap();
    }
}
