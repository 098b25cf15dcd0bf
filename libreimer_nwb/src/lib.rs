//! # reimer_nwb
//!
//! reimer_nwb converts the two-photon imaging and olfaction behavior experiments of the
//! Reimer lab to [NWB](https://www.nwb.org/). It takes the tables of the lab's experiment
//! pipeline (exported per session) together with the raw ScanImage TIFF recordings, puts
//! every stream on the odor-delivery clock, and writes one NWB (HDF5) file per session.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### HDF5
//!
//! Before building and running reimer_nwb, HDF5 must be installed. Typically this will
//! be installed using a package manager (homebrew, apt, etc), and the Rust libraries will
//! auto detect the location of the HDF install. If HDF5 lives in a custom location, write
//! the following snippet into the file `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./reimer_nwb_cli` from the top
//! level of the repository. See the `reimer_nwb_cli` README for its usage.
//!
//! ## Configuration
//!
//! A configuration is a YAML file. `reimer_nwb_cli new -p config.yml` writes a template:
//!
//! ```yml
//! export_path: None
//! data_path: None
//! output_path: None
//! metadata_path: null
//! stub_test: false
//! stub_frames: 100
//! number_of_fields: 3
//! fov_boundaries: null
//! file_pattern: '{animal_id}_{session}_*.tif'
//! respiration_recording_idx: 1
//! compression: 4
//! timezone_offset_hours: 0
//! ```
//!
//! - `export_path`: directory of pipeline exports, one YAML file per session
//! - `data_path`: root of the raw imaging, with one `{animal}_{session}_{scan}` folder per
//! session. Sessions without a folder are converted without raw imaging.
//! - `output_path`: where NWB files are written. Stub conversions go to `nwb_stub` inside it.
//! - `metadata_path`: optional YAML merged over the bundled metadata (lab, devices,
//! imaging planes, ...)
//! - `stub_test`/`stub_frames`: only read the first `stub_frames` frames of each field
//! - `number_of_fields`/`fov_boundaries`: how the rows of a mesoscope frame are split into
//! fields. Without explicit boundaries the rows are split evenly.
//!
//! ## Pipeline exports
//!
//! Each export file holds the rows of one session ([`tables::SessionExport`]): the session
//! key, subject, the scan frame times on the odor and behavior clocks, treadmill, odor
//! trials, respiration recordings, summary images and per (field, channel, segmentation
//! method) masks and traces. Arrays use the ndarray serde layout.
//!
//! ## Output
//!
//! One `sub-{animal}_ses-{session}.nwb` file per session and a log file (`reimer_nwb.log`).
//! If a session fails, the run continues with the next one and the reason is in the log.
//!
//! ```text
//! sub-124_ses-3.nwb
//! / - nwb_version, namespace, neurodata_type
//! |---- general - lab, institution, session_id, ...
//! |    |---- subject
//! |    |---- devices/Mesoscope
//! |    |---- optophysiology/ImagingPlaneFOV#
//! |---- acquisition
//! |    |---- treadmill_position
//! |    |---- respiration
//! |    |---- TwoPhotonSeriesFOV# (TwoPhotonSeriesFOV#Channel# beyond channel 1)
//! |---- processing
//! |    |---- behavior/treadmill_velocity
//! |    |---- ophys
//! |    |    |---- average_images, correlation_images
//! |    |    |---- ImageSegmentationMethod#/PlaneSegmentationFOV#Channel#
//! |    |    |---- FluorescenceMethod#/RoiResponseSeriesFOV#Channel#
//! |---- intervals/trials - odorant, concentration, solution_date
//! ```
pub mod clock;
pub mod config;
pub mod error;
pub mod fluorescence;
pub mod hdf_writer;
pub mod imaging;
pub mod imaging_plane;
pub mod keys;
pub mod metadata;
pub mod nwb;
pub mod process;
pub mod query;
pub mod records;
pub mod registry;
pub mod segmentation;
pub mod signals;
pub mod subject;
pub mod summary_images;
pub mod tables;
pub mod worker_status;
