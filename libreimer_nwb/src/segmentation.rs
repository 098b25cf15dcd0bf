use ndarray::ArrayView1;

use super::error::{AssemblyError, SchemaError};
use super::keys::FieldKey;
use super::nwb::{
    DataInterface, ImageSegmentation, NwbFile, PixelMaskEntry, PlaneSegmentation, Roi,
    OPHYS_MODULE,
};
use super::query::PipelineQuery;
use super::records::MaskRow;
use super::summary_images::OPHYS_DESCRIPTION;

pub fn segmentation_container_name(segmentation_method: u32) -> String {
    format!("ImageSegmentationMethod{segmentation_method}")
}

pub fn plane_segmentation_name(field: u32, channel: u32) -> String {
    format!("PlaneSegmentationFOV{field}Channel{channel}")
}

/// Where a plane segmentation ended up, and which ROIs it holds (in registration order)
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneSegmentationHandle {
    pub container: String,
    pub plane: String,
    /// Path of the plane segmentation in the written file
    pub path: String,
    pub roi_ids: Vec<u32>,
}

/// Convert flat (column-major) pixel indices of an `rows x cols` image into a pixel mask
pub fn unravel_mask(
    mask_id: u32,
    pixels: ArrayView1<'_, u64>,
    weights: ArrayView1<'_, f32>,
    shape: (usize, usize),
) -> Result<Vec<PixelMaskEntry>, SchemaError> {
    let (rows, cols) = shape;
    if pixels.len() != weights.len() {
        return Err(SchemaError::MaskWeightMismatch {
            mask_id,
            pixels: pixels.len(),
            weights: weights.len(),
        });
    }
    let n_pixels = (rows * cols) as u64;
    pixels
        .iter()
        .zip(weights.iter())
        .map(|(&index, &weight)| {
            if index >= n_pixels {
                return Err(SchemaError::PixelOutOfBounds {
                    mask_id,
                    index,
                    rows,
                    cols,
                });
            }
            Ok(PixelMaskEntry {
                row: (index % rows as u64) as u32,
                column: (index / rows as u64) as u32,
                weight,
            })
        })
        .collect()
}

fn to_rois(masks: &[MaskRow], shape: (usize, usize)) -> Result<Vec<Roi>, SchemaError> {
    masks
        .iter()
        .map(|mask| {
            Ok(Roi {
                id: mask.mask_id,
                pixel_mask: unravel_mask(mask.mask_id, mask.pixels.view(), mask.weights.view(), shape)?,
            })
        })
        .collect()
}

/// Add the ROIs of one field/channel as a plane segmentation bound to `imaging_plane`.
///
/// Masks are stored as flat column-major indices into the field's average image, which is
/// therefore required for the shape. ROIs keep the order in which the masks were fetched.
pub fn attach_plane_segmentation(
    nwbfile: &mut NwbFile,
    imaging_plane: &str,
    query: &dyn PipelineQuery,
    key: &FieldKey,
) -> Result<PlaneSegmentationHandle, AssemblyError> {
    if !nwbfile.imaging_planes.contains(imaging_plane) {
        return Err(SchemaError::MissingObject {
            kind: "imaging plane",
            name: imaging_plane.to_string(),
        }
        .into());
    }

    let reference = query
        .average_images(key.session())?
        .into_iter()
        .find(|row| row.field == key.field() && row.channel == key.channel())
        .ok_or(AssemblyError::MissingReferenceImage {
            field: key.field(),
            channel: key.channel(),
        })?;
    let shape = reference.image.dim();

    let masks = query.masks(key)?;
    let rois = to_rois(&masks, shape)?;
    let roi_ids: Vec<u32> = rois.iter().map(|roi| roi.id).collect();
    if rois.is_empty() {
        spdlog::warn!("No masks found for {}; the plane segmentation will be empty", key);
    }

    let container = segmentation_container_name(key.segmentation_method());
    let plane = plane_segmentation_name(key.field(), key.channel());
    let segmentation = match nwbfile
        .processing_module(OPHYS_MODULE, OPHYS_DESCRIPTION)
        .interfaces
        .get_or_create(&container, || {
            DataInterface::Segmentation(ImageSegmentation::new(&container))
        }) {
        DataInterface::Segmentation(segmentation) => segmentation,
        _ => {
            return Err(SchemaError::DuplicateName {
                container: String::from(OPHYS_MODULE),
                name: container,
            }
            .into())
        }
    };
    segmentation.planes.insert(
        &plane,
        PlaneSegmentation {
            name: plane.clone(),
            description: format!(
                "segmented ROIs of field {} channel {} (segmentation method {})",
                key.field(),
                key.channel(),
                key.segmentation_method()
            ),
            imaging_plane: imaging_plane.to_string(),
            rois,
        },
    )?;

    spdlog::info!("Added {} ROIs to {}/{}", roi_ids.len(), container, plane);
    Ok(PlaneSegmentationHandle {
        path: format!("/processing/{OPHYS_MODULE}/{container}/{plane}"),
        container,
        plane,
        roi_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_unravel_column_major() {
        // 2 x 3 image, column-major flat index = row + col * 2
        let mask = unravel_mask(
            7,
            array![0_u64, 1, 2, 5].view(),
            array![0.1_f32, 0.2, 0.3, 0.4].view(),
            (2, 3),
        )
        .unwrap();
        let coords: Vec<(u32, u32)> = mask.iter().map(|p| (p.row, p.column)).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (0, 1), (1, 2)]);
        assert_eq!(mask[3].weight, 0.4);
    }

    #[test]
    fn test_unravel_round_trip() {
        let (rows, cols) = (5_usize, 7_usize);
        let mut pixels = Vec::new();
        let mut weights = Vec::new();
        for col in 0..cols {
            for row in 0..rows {
                pixels.push((row + col * rows) as u64);
                weights.push((row * 100 + col) as f32);
            }
        }
        let mask = unravel_mask(
            1,
            Array1::from(pixels).view(),
            Array1::from(weights).view(),
            (rows, cols),
        )
        .unwrap();
        assert_eq!(mask.len(), rows * cols);
        for entry in mask.iter() {
            assert_eq!(entry.weight, (entry.row * 100 + entry.column) as f32);
        }
    }

    #[test]
    fn test_unravel_rejects_bad_masks() {
        assert_eq!(
            unravel_mask(3, array![6_u64].view(), array![1.0_f32].view(), (2, 3)),
            Err(SchemaError::PixelOutOfBounds {
                mask_id: 3,
                index: 6,
                rows: 2,
                cols: 3
            })
        );
        assert_eq!(
            unravel_mask(3, array![0_u64, 1].view(), array![1.0_f32].view(), (2, 3)),
            Err(SchemaError::MaskWeightMismatch {
                mask_id: 3,
                pixels: 2,
                weights: 1
            })
        );
    }
}
