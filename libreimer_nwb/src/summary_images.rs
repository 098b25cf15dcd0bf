use super::error::{AssemblyError, MissingDataWarning};
use super::keys::SessionKey;
use super::nwb::{DataInterface, GrayscaleImage, ImageSet, NwbFile, OPHYS_MODULE};
use super::query::PipelineQuery;
use super::records::SummaryImageRow;

pub const AVERAGE_IMAGES: &str = "average_images";
pub const CORRELATION_IMAGES: &str = "correlation_images";

pub const OPHYS_DESCRIPTION: &str = "ophys data processing";

pub fn average_image_name(field: u32, channel: u32) -> String {
    format!("average_image_FOV{field}_channel{channel}")
}

pub fn correlation_image_name(field: u32, channel: u32) -> String {
    format!("correlation_image_FOV{field}_channel{channel}")
}

fn image_set(
    set_name: &str,
    description: &str,
    rows: Vec<SummaryImageRow>,
    naming: fn(u32, u32) -> String,
) -> Result<ImageSet, AssemblyError> {
    let mut set = ImageSet::new(set_name, description);
    for row in rows {
        let name = naming(row.field, row.channel);
        set.images.insert(
            &name,
            GrayscaleImage {
                name: name.clone(),
                description: format!("{description} for field {} channel {}", row.field, row.channel),
                data: row.image,
            },
        )?;
    }
    Ok(set)
}

/// Add the per-field average and correlation images of a session to the ophys module.
///
/// Both image sets are created even when empty. An empty session only produces a warning.
pub fn attach_summary_images(
    nwbfile: &mut NwbFile,
    query: &dyn PipelineQuery,
    key: &SessionKey,
) -> Result<Option<MissingDataWarning>, AssemblyError> {
    let averages = query.average_images(key)?;
    let correlations = query.correlation_images(key)?;
    let is_empty = averages.is_empty() && correlations.is_empty();
    spdlog::info!(
        "Found {} average and {} correlation images",
        averages.len(),
        correlations.len()
    );

    let average_set = image_set(
        AVERAGE_IMAGES,
        "average image from SummaryImages.Average table",
        averages,
        average_image_name,
    )?;
    let correlation_set = image_set(
        CORRELATION_IMAGES,
        "correlation image from SummaryImages.Correlation table",
        correlations,
        correlation_image_name,
    )?;

    let module = nwbfile.processing_module(OPHYS_MODULE, OPHYS_DESCRIPTION);
    module.add(DataInterface::Images(average_set))?;
    module.add(DataInterface::Images(correlation_set))?;

    if is_empty {
        Ok(Some(MissingDataWarning::new("summary images", key)))
    } else {
        Ok(None)
    }
}
