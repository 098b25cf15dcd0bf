mod common;

use hdf5::types::VarLenUnicode;
use libreimer_nwb::config::Config;
use libreimer_nwb::process::process;
use std::path::Path;
use std::sync::mpsc::channel;

const WIDTH: u32 = 5;
/// Three fields of 4 rows each
const HEIGHT: u32 = 12;

fn write_export(dir: &Path, n_fields: u32) {
    let export = common::session_export(n_fields, 1);
    std::fs::write(
        dir.join("124_3_1.yml"),
        serde_yaml::to_string(&export).unwrap(),
    )
    .unwrap();
}

fn read_string(file: &hdf5::File, path: &str) -> String {
    file.dataset(path)
        .unwrap()
        .read_scalar::<VarLenUnicode>()
        .unwrap()
        .as_str()
        .to_string()
}

#[test]
fn converts_exports_and_raw_imaging() {
    let root = tempfile::tempdir().unwrap();
    let export_path = root.path().join("exports");
    let data_path = root.path().join("raw");
    let output_path = root.path().join("nwb");
    std::fs::create_dir_all(&export_path).unwrap();
    std::fs::create_dir_all(data_path.join("124_3_1")).unwrap();
    write_export(&export_path, 3);
    common::write_scan(&data_path.join("124_3_1").join("124_3_00001.tif"), 3, WIDTH, HEIGHT, 100);
    common::write_scan(&data_path.join("124_3_1").join("124_3_00002.tif"), 3, WIDTH, HEIGHT, 200);

    let config = Config {
        export_path,
        data_path,
        output_path: output_path.clone(),
        stub_test: true,
        stub_frames: 4,
        ..Default::default()
    };
    let (tx, rx) = channel();
    let summary = process(config, tx).unwrap();
    assert_eq!(summary.converted.len(), 1);
    assert!(summary.failed.is_empty());
    assert!(summary.converted[0].warnings.is_empty());
    assert!(rx.try_iter().any(|status| status.progress == 1.0));

    let nwb_path = output_path.join("nwb_stub").join("sub-124_ses-3.nwb");
    let file = hdf5::File::open(&nwb_path).unwrap();
    assert_eq!(read_string(&file, "identifier"), "124_3_1");
    assert!(read_string(&file, "session_start_time").starts_with("2023-05-24T13:47:12"));

    for field in 1..=3 {
        let data = file
            .dataset(&format!("acquisition/TwoPhotonSeriesFOV{field}/data"))
            .unwrap();
        assert_eq!(data.shape(), vec![4, 4, 5]);
        let first_pixel = data.read_raw::<u16>().unwrap()[0];
        // first frame of the first file, first row of the field
        assert_eq!(first_pixel as u32, 100 + (field - 1) * 4 * WIDTH);
    }
    let rate = file
        .dataset("general/optophysiology/ImagingPlaneFOV1/imaging_rate")
        .unwrap()
        .read_scalar::<f64>()
        .unwrap();
    assert_eq!(rate, 9.38);

    let traces = file
        .dataset("processing/ophys/FluorescenceMethod1/RoiResponseSeriesFOV2Channel1/data")
        .unwrap();
    assert_eq!(traces.shape(), vec![common::TRACE_LEN, 2]);
    let trials = file
        .dataset("intervals/trials/start_time")
        .unwrap()
        .read_raw::<f64>()
        .unwrap();
    assert_eq!(trials, vec![100.1, 100.4]);
}

#[test]
fn converts_without_raw_imaging() {
    let root = tempfile::tempdir().unwrap();
    let export_path = root.path().join("exports");
    std::fs::create_dir_all(&export_path).unwrap();
    write_export(&export_path, 1);

    let config = Config {
        export_path,
        data_path: root.path().join("missing"),
        output_path: root.path().to_path_buf(),
        compression: None,
        ..Default::default()
    };
    let (tx, _rx) = channel();
    let summary = process(config, tx).unwrap();
    assert_eq!(summary.converted.len(), 1);
    let skipped: Vec<&str> = summary.converted[0]
        .warnings
        .iter()
        .map(|w| w.what)
        .collect();
    assert_eq!(skipped, vec!["raw imaging"]);

    let file = hdf5::File::open(root.path().join("sub-124_ses-3.nwb")).unwrap();
    assert!(file.group("acquisition/TwoPhotonSeriesFOV1").is_err());
    assert!(file
        .group("general/optophysiology/ImagingPlaneFOV1")
        .is_ok());
    // session date at midnight when no imaging tells the start time
    assert!(read_string(&file, "session_start_time").starts_with("2023-05-24T00:00:00"));
}
