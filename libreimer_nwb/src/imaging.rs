use ndarray::Array3;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::iter::Peekable;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::Chars;
use time::{Date, Month, PrimitiveDateTime, Time};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::config::Config;
use super::error::ImagingError;
use super::keys::FieldKey;
use super::nwb::FrameData;

const EPOCH_KEY: &str = "epoch";
const FRAME_RATE_KEY: &str = "SI.hRoiManager.scanFrameRate";
const SAVED_CHANNELS_KEY: &str = "SI.hChannels.channelSave";

/// Raw frames of one imaging field
pub trait ImagingSource {
    /// Acquisition start as recorded by the microscope, in local time
    fn session_start_time(&self) -> Option<PrimitiveDateTime>;
    /// Frames per second, if the microscope recorded it
    fn sampling_frequency(&self) -> Option<f64>;
    /// (rows, columns) of a single field frame
    fn image_size(&self) -> (usize, usize);
    fn num_frames(&self) -> usize;
    /// Read frames (frames x rows x columns), at most `max_frames` of them
    fn read_frames(&self, max_frames: Option<usize>) -> Result<FrameData, ImagingError>;
}

/// Finds the raw imaging of a field
pub trait ImagingProvider {
    /// `None` if no raw imaging was kept for the session
    fn open_field(&self, key: &FieldKey) -> Result<Option<Box<dyn ImagingSource>>, ImagingError>;
}

/// Provider for conversions without raw imaging
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImaging;

impl ImagingProvider for NoImaging {
    fn open_field(&self, _key: &FieldKey) -> Result<Option<Box<dyn ImagingSource>>, ImagingError> {
        Ok(None)
    }
}

/// Rows of the full scan frame that belong to a (1-based) field.
///
/// Mesoscope scans stack their fields vertically in one frame. Without explicit boundaries
/// the rows are split evenly and the last field takes the remainder.
pub fn fov_rows(
    total_rows: usize,
    number_of_fields: usize,
    field: u32,
    explicit: Option<&[[usize; 2]]>,
) -> Result<Range<usize>, ImagingError> {
    let n_fields = explicit.map(|b| b.len()).unwrap_or(number_of_fields);
    let idx = field as usize;
    if idx == 0 || idx > n_fields {
        return Err(ImagingError::InvalidField {
            field,
            number_of_fields: n_fields,
        });
    }

    let (start, stop) = match explicit {
        Some(boundaries) => (boundaries[idx - 1][0], boundaries[idx - 1][1]),
        None => {
            let height = total_rows / n_fields;
            let start = (idx - 1) * height;
            if idx == n_fields {
                (start, total_rows)
            } else {
                (start, start + height)
            }
        }
    };
    if start >= stop || stop > total_rows {
        return Err(ImagingError::BadFovBoundaries {
            start,
            stop,
            rows: total_rows,
        });
    }
    Ok(start..stop)
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        run.push(c);
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Order strings so that embedded numbers compare by value (`file_2` before `file_10`)
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();
    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let a_run = take_digits(&mut a_chars);
                let b_run = take_digits(&mut b_chars);
                let ord = compare_digit_runs(&a_run, &b_run);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

/// All files in `folder` matching `pattern`, naturally sorted by file name
pub fn discover_files(folder: &Path, pattern: &str) -> Result<Vec<PathBuf>, ImagingError> {
    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&folder.to_string_lossy()),
        pattern
    );
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in glob::glob(&full_pattern)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(ImagingError::NoMatchingFiles {
            folder: folder.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }
    files.sort_by(|a, b| {
        let a_name = a.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let b_name = b.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        natural_cmp(&a_name, &b_name)
    });
    Ok(files)
}

/// Parse the `key = value` lines ScanImage writes into its TIFF tags
pub fn parse_scanimage_metadata(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Parse the list of saved channels, written as `1` or `[1;2]`
pub fn parse_saved_channels(text: &str) -> Result<Vec<u32>, ImagingError> {
    let bad_list = || ImagingError::BadChannelList(text.to_string());
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    let channels = inner
        .split(|c: char| c == ';' || c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().map_err(|_| bad_list()))
        .collect::<Result<Vec<u32>, ImagingError>>()?;
    if channels.is_empty() {
        return Err(bad_list());
    }
    Ok(channels)
}

/// Parse a ScanImage epoch, written as `[year month day hour minute seconds]`
pub fn parse_epoch(text: &str) -> Result<PrimitiveDateTime, ImagingError> {
    let bad_epoch = || ImagingError::BadEpoch(text.to_string());
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(bad_epoch)?;
    let parts: Vec<&str> = inner.split_whitespace().collect();
    if parts.len() != 6 {
        return Err(bad_epoch());
    }
    let integer = |s: &str| s.parse::<i32>().map_err(|_| bad_epoch());
    let year = integer(parts[0])?;
    let month = u8::try_from(integer(parts[1])?).map_err(|_| bad_epoch())?;
    let day = u8::try_from(integer(parts[2])?).map_err(|_| bad_epoch())?;
    let hour = u8::try_from(integer(parts[3])?).map_err(|_| bad_epoch())?;
    let minute = u8::try_from(integer(parts[4])?).map_err(|_| bad_epoch())?;
    let seconds = parts[5].parse::<f64>().map_err(|_| bad_epoch())?;
    if !(0.0..60.0).contains(&seconds) {
        return Err(bad_epoch());
    }
    let whole_seconds = seconds.trunc() as u8;
    let nanos = ((seconds - seconds.trunc()) * 1e9).round().min(999_999_999.0) as u32;

    let month = Month::try_from(month).map_err(|_| bad_epoch())?;
    let date = Date::from_calendar_date(year, month, day).map_err(|_| bad_epoch())?;
    let time = Time::from_hms_nano(hour, minute, whole_seconds, nanos).map_err(|_| bad_epoch())?;
    Ok(PrimitiveDateTime::new(date, time))
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, ImagingError> {
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited()))
}

fn find_ascii_tag(
    decoder: &mut Decoder<BufReader<File>>,
    tag: Tag,
) -> Result<Option<String>, ImagingError> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_string()?)),
        None => Ok(None),
    }
}

/// Samples of decoded pages, widened to 16 bits without changing signedness
#[derive(Debug)]
enum Samples {
    I16(Vec<i16>),
    U16(Vec<u16>),
}

impl Samples {
    fn from_page(page: DecodingResult) -> Result<Self, ImagingError> {
        match page {
            DecodingResult::I16(buf) => Ok(Self::I16(buf)),
            DecodingResult::U16(buf) => Ok(Self::U16(buf)),
            DecodingResult::I8(buf) => Ok(Self::I16(buf.into_iter().map(i16::from).collect())),
            DecodingResult::U8(buf) => Ok(Self::U16(buf.into_iter().map(u16::from).collect())),
            DecodingResult::U32(_) | DecodingResult::I32(_) => {
                Err(ImagingError::UnsupportedSampleType(String::from("32 bit integer")))
            }
            DecodingResult::U64(_) | DecodingResult::I64(_) => {
                Err(ImagingError::UnsupportedSampleType(String::from("64 bit integer")))
            }
            DecodingResult::F32(_) | DecodingResult::F64(_) => {
                Err(ImagingError::UnsupportedSampleType(String::from("floating point")))
            }
        }
    }

    fn with_capacity_of(page: &Samples, capacity: usize) -> Self {
        match page {
            Self::I16(_) => Self::I16(Vec::with_capacity(capacity)),
            Self::U16(_) => Self::U16(Vec::with_capacity(capacity)),
        }
    }

    /// Append `range` of `page`; every page of a recording must share one sample type
    fn extend(&mut self, page: Samples, range: Range<usize>, frame: usize) -> Result<(), ImagingError> {
        match (self, page) {
            (Self::I16(data), Self::I16(page)) => data.extend_from_slice(&page[range]),
            (Self::U16(data), Self::U16(page)) => data.extend_from_slice(&page[range]),
            _ => return Err(ImagingError::MixedSampleTypes { frame }),
        }
        Ok(())
    }

    fn into_frames(self, shape: (usize, usize, usize)) -> Result<FrameData, ImagingError> {
        Ok(match self {
            Self::I16(data) => FrameData::I16(Array3::from_shape_vec(shape, data)?),
            Self::U16(data) => FrameData::U16(Array3::from_shape_vec(shape, data)?),
        })
    }
}

/// One field and channel of a multi-file ScanImage TIFF recording.
///
/// ScanImage interleaves the saved channels page by page, so a frame of the `n`-th saved
/// channel is every `n`-th page of the recording.
#[derive(Debug, Clone)]
pub struct ScanImageSource {
    files: Vec<PathBuf>,
    rows: Range<usize>,
    /// (width, height) of a full scan frame
    frame_size: (u32, u32),
    /// Position of the selected channel among the saved ones
    channel_offset: usize,
    n_channels: usize,
    num_frames: usize,
    metadata: BTreeMap<String, String>,
}

impl ScanImageSource {
    /// Open the recording stored in `files` (in acquisition order) and select the rows of `field`
    /// in the pages of `channel`
    pub fn open(
        files: Vec<PathBuf>,
        number_of_fields: usize,
        field: u32,
        channel: u32,
        fov_boundaries: Option<&[[usize; 2]]>,
    ) -> Result<Self, ImagingError> {
        let first = files.first().ok_or_else(|| ImagingError::NoMatchingFiles {
            folder: PathBuf::new(),
            pattern: String::new(),
        })?;
        let mut decoder = open_decoder(first)?;
        let frame_size = decoder.dimensions()?;

        let mut metadata = BTreeMap::new();
        for tag in [Tag::Software, Tag::ImageDescription] {
            if let Some(text) = find_ascii_tag(&mut decoder, tag)? {
                metadata.extend(parse_scanimage_metadata(&text));
            }
        }

        let rows = fov_rows(frame_size.1 as usize, number_of_fields, field, fov_boundaries)?;

        let saved = match metadata.get(SAVED_CHANNELS_KEY) {
            Some(text) => parse_saved_channels(text)?,
            None => vec![1],
        };
        let channel_offset = saved
            .iter()
            .position(|c| *c == channel)
            .ok_or_else(|| ImagingError::ChannelNotSaved {
                channel,
                saved: saved.clone(),
            })?;
        let n_channels = saved.len();

        let mut num_pages = 0;
        for path in files.iter() {
            let mut decoder = open_decoder(path)?;
            num_pages += 1;
            while decoder.more_images() {
                decoder.next_image()?;
                num_pages += 1;
            }
        }
        let num_frames = if num_pages > channel_offset {
            (num_pages - channel_offset).div_ceil(n_channels)
        } else {
            0
        };
        spdlog::info!(
            "Opened {} ScanImage files with {} frames of {}x{} (field {} uses rows {}..{}, channel {} of {:?})",
            files.len(),
            num_frames,
            frame_size.0,
            frame_size.1,
            field,
            rows.start,
            rows.end,
            channel,
            saved
        );

        Ok(Self {
            files,
            rows,
            frame_size,
            channel_offset,
            n_channels,
            num_frames,
            metadata,
        })
    }

    /// Raw ScanImage metadata entry
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|v| v.as_str())
    }
}

impl ImagingSource for ScanImageSource {
    fn session_start_time(&self) -> Option<PrimitiveDateTime> {
        let epoch = self.metadata_value(EPOCH_KEY)?;
        match parse_epoch(epoch) {
            Ok(start) => Some(start),
            Err(e) => {
                spdlog::warn!("Ignoring ScanImage epoch: {e}");
                None
            }
        }
    }

    fn sampling_frequency(&self) -> Option<f64> {
        self.metadata_value(FRAME_RATE_KEY)
            .and_then(|rate| rate.parse::<f64>().ok())
            .filter(|rate| rate.is_finite() && *rate > 0.0)
    }

    fn image_size(&self) -> (usize, usize) {
        (self.rows.len(), self.frame_size.0 as usize)
    }

    fn num_frames(&self) -> usize {
        self.num_frames
    }

    fn read_frames(&self, max_frames: Option<usize>) -> Result<FrameData, ImagingError> {
        let limit = max_frames
            .unwrap_or(self.num_frames)
            .min(self.num_frames);
        let (n_rows, n_cols) = self.image_size();
        let slice = (self.rows.start * n_cols)..(self.rows.end * n_cols);
        let mut data: Option<Samples> = None;
        let mut n_read = 0;
        let mut page_idx = 0;

        'files: for path in self.files.iter() {
            if n_read >= limit {
                break;
            }
            let mut decoder = open_decoder(path)?;
            loop {
                if page_idx % self.n_channels == self.channel_offset {
                    let found = decoder.dimensions()?;
                    if found != self.frame_size {
                        return Err(ImagingError::FrameSizeMismatch {
                            frame: n_read,
                            found,
                            expected: self.frame_size,
                        });
                    }
                    let page = Samples::from_page(decoder.read_image()?)?;
                    let samples = data.get_or_insert_with(|| {
                        Samples::with_capacity_of(&page, limit * n_rows * n_cols)
                    });
                    samples.extend(page, slice.clone(), n_read)?;
                    n_read += 1;
                    if n_read >= limit {
                        break 'files;
                    }
                }
                page_idx += 1;
                if !decoder.more_images() {
                    break;
                }
                decoder.next_image()?;
            }
        }

        match data {
            Some(samples) => samples.into_frames((n_read, n_rows, n_cols)),
            None => Ok(FrameData::I16(Array3::zeros((0, n_rows, n_cols)))),
        }
    }
}

/// Finds ScanImage recordings under the configured data path
#[derive(Debug, Clone)]
pub struct ScanImageProvider {
    config: Config,
}

impl ScanImageProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl ImagingProvider for ScanImageProvider {
    fn open_field(&self, key: &FieldKey) -> Result<Option<Box<dyn ImagingSource>>, ImagingError> {
        let folder = self.config.get_session_folder(key.session());
        if !folder.exists() {
            spdlog::info!(
                "No raw imaging folder {} for {}",
                folder.display(),
                key.session()
            );
            return Ok(None);
        }
        let files = discover_files(&folder, &self.config.get_file_pattern(key.session()))?;
        let source = ScanImageSource::open(
            files,
            self.config.number_of_fields,
            key.field(),
            key.channel(),
            self.config.fov_boundaries.as_deref(),
        )?;
        Ok(Some(Box::new(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SessionKey;
    use time::macros::datetime;
    use tiff::encoder::{colortype, TiffEncoder};

    const DESCRIPTION: &str = "frameNumbers = 1\nepoch = [2023  5 24 13 47 12.5]\n";
    const SOFTWARE: &str = "SI.VERSION_MAJOR = 2020\nSI.hRoiManager.scanFrameRate = 9.38\n";

    /// Write `n_pages` pages of a width x height ramp, offset by `first_value` plus 1000 per page
    fn write_pages(
        path: &Path,
        software: &str,
        n_pages: usize,
        width: u32,
        height: u32,
        first_value: u16,
    ) {
        let mut file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(&mut file).unwrap();
        for page in 0..n_pages {
            let data: Vec<u16> = (0..(width * height) as u16)
                .map(|v| v + first_value + page as u16 * 1000)
                .collect();
            let mut image = encoder
                .new_image::<colortype::Gray16>(width, height)
                .unwrap();
            image
                .encoder()
                .write_tag(Tag::ImageDescription, DESCRIPTION)
                .unwrap();
            image.encoder().write_tag(Tag::Software, software).unwrap();
            image.write_data(&data).unwrap();
        }
    }

    fn write_scan(path: &Path, n_frames: usize, width: u32, height: u32, first_value: u16) {
        write_pages(path, SOFTWARE, n_frames, width, height, first_value);
    }

    fn u16_frames(frames: FrameData) -> Array3<u16> {
        match frames {
            FrameData::U16(frames) => frames,
            other => panic!("expected unsigned frames, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_epoch() {
        assert_eq!(
            parse_epoch("[2023  5 24 13 47 12.5]").unwrap(),
            datetime!(2023-05-24 13:47:12.5)
        );
        assert_eq!(
            parse_epoch("[2021 12 1 0 0 0]").unwrap(),
            datetime!(2021-12-01 0:00)
        );
        assert!(matches!(
            parse_epoch("2023 5 24 13 47 12"),
            Err(ImagingError::BadEpoch(_))
        ));
        assert!(parse_epoch("[2023 13 24 13 47 12]").is_err());
        assert!(parse_epoch("[2023 5 24 13 47]").is_err());
    }

    #[test]
    fn test_metadata_lines() {
        let metadata = parse_scanimage_metadata(SOFTWARE);
        assert_eq!(metadata.get(FRAME_RATE_KEY).map(|s| s.as_str()), Some("9.38"));
        assert_eq!(metadata.len(), 2);
        assert!(parse_scanimage_metadata("no pairs here\n= orphan").is_empty());
    }

    #[test]
    fn test_natural_order() {
        let mut names = vec!["scan_10.tif", "scan_2.tif", "scan_1.tif", "scan_02a.tif"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec!["scan_1.tif", "scan_2.tif", "scan_02a.tif", "scan_10.tif"]
        );
        assert_eq!(natural_cmp("a", "a"), Ordering::Equal);
        assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
    }

    #[test]
    fn test_fov_rows() {
        assert_eq!(fov_rows(100, 3, 1, None).unwrap(), 0..33);
        assert_eq!(fov_rows(100, 3, 2, None).unwrap(), 33..66);
        assert_eq!(fov_rows(100, 3, 3, None).unwrap(), 66..100);
        assert!(matches!(
            fov_rows(100, 3, 4, None),
            Err(ImagingError::InvalidField { field: 4, .. })
        ));
        assert!(fov_rows(100, 3, 0, None).is_err());

        let explicit = [[0, 40], [50, 100]];
        assert_eq!(fov_rows(100, 3, 2, Some(&explicit)).unwrap(), 50..100);
        assert!(fov_rows(100, 3, 3, Some(&explicit)).is_err());
        assert!(matches!(
            fov_rows(80, 3, 2, Some(&explicit)),
            Err(ImagingError::BadFovBoundaries { .. })
        ));
    }

    #[test]
    fn test_discover_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["124_3_00010.tif", "124_3_00002.tif", "124_3_9.tif", "other.tif"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = discover_files(dir.path(), "124_3_*.tif").unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["124_3_00002.tif", "124_3_9.tif", "124_3_00010.tif"]);

        assert!(matches!(
            discover_files(dir.path(), "125_*.tif"),
            Err(ImagingError::NoMatchingFiles { .. })
        ));
    }

    #[test]
    fn test_read_scanimage_field() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("124_3_00001.tif");
        let second = dir.path().join("124_3_00002.tif");
        write_scan(&first, 2, 4, 6, 0);
        write_scan(&second, 1, 4, 6, 40000);

        let source = ScanImageSource::open(vec![first, second], 2, 2, 1, None).unwrap();
        assert_eq!(source.num_frames(), 3);
        assert_eq!(source.image_size(), (3, 4));
        assert_eq!(
            source.session_start_time(),
            Some(datetime!(2023-05-24 13:47:12.5))
        );
        assert_eq!(source.sampling_frequency(), Some(9.38));

        let frames = u16_frames(source.read_frames(None).unwrap());
        assert_eq!(frames.shape(), &[3, 3, 4]);
        // field 2 starts at row 3 of the frame
        assert_eq!(frames[[0, 0, 0]], 12);
        assert_eq!(frames[[1, 2, 3]], 1023);
        // unsigned samples keep their full range
        assert_eq!(frames[[2, 0, 0]], 40012);
        assert_eq!(frames[[2, 2, 3]], 40023);

        let stub = source.read_frames(Some(2)).unwrap();
        assert_eq!(stub.shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_parse_saved_channels() {
        assert_eq!(parse_saved_channels("1").unwrap(), vec![1]);
        assert_eq!(parse_saved_channels("[1;2]").unwrap(), vec![1, 2]);
        assert_eq!(parse_saved_channels("[2 4]").unwrap(), vec![2, 4]);
        assert!(matches!(
            parse_saved_channels("[]"),
            Err(ImagingError::BadChannelList(_))
        ));
        assert!(parse_saved_channels("[1;x]").is_err());
    }

    #[test]
    fn test_read_interleaved_channels() {
        let dir = tempfile::tempdir().unwrap();
        let software = format!("{SOFTWARE}SI.hChannels.channelSave = [1;2]\n");
        let first = dir.path().join("124_3_00001.tif");
        let second = dir.path().join("124_3_00002.tif");
        // pages alternate channel 1 and channel 2; the second file holds one more pair
        write_pages(&first, &software, 4, 4, 2, 0);
        write_pages(&second, &software, 2, 4, 2, 10000);
        let files = vec![first, second];

        let green = ScanImageSource::open(files.clone(), 1, 1, 1, None).unwrap();
        let red = ScanImageSource::open(files.clone(), 1, 1, 2, None).unwrap();
        assert_eq!(green.num_frames(), 3);
        assert_eq!(red.num_frames(), 3);

        let green_frames = u16_frames(green.read_frames(None).unwrap());
        let red_frames = u16_frames(red.read_frames(None).unwrap());
        assert_eq!(green_frames.shape(), &[3, 2, 4]);
        let green_starts: Vec<u16> = (0..3).map(|f| green_frames[[f, 0, 0]]).collect();
        let red_starts: Vec<u16> = (0..3).map(|f| red_frames[[f, 0, 0]]).collect();
        assert_eq!(green_starts, vec![0, 2000, 10000]);
        assert_eq!(red_starts, vec![1000, 3000, 11000]);

        let stub = u16_frames(red.read_frames(Some(1)).unwrap());
        assert_eq!(stub[[0, 1, 3]], 1007);

        assert!(matches!(
            ScanImageSource::open(files, 1, 1, 3, None),
            Err(ImagingError::ChannelNotSaved { channel: 3, .. })
        ));
    }

    #[test]
    fn test_provider_without_folder() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let key = FieldKey::new(SessionKey::new(124, 3).with_scan(1), 1, 1, 6).unwrap();
        let provider = ScanImageProvider::new(&config);
        assert!(provider.open_field(&key).unwrap().is_none());

        std::fs::create_dir_all(dir.path().join("124_3_1")).unwrap();
        write_scan(&dir.path().join("124_3_1").join("124_3_00001.tif"), 1, 4, 6, 0);
        let source = provider.open_field(&key).unwrap().unwrap();
        assert_eq!(source.image_size(), (2, 4));
        assert!(NoImaging.open_field(&key).unwrap().is_none());
    }
}
