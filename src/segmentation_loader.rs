use std::collections::{BTreeMap, BTreeSet, HashMap};

use glam::Vec3;
use ndarray::{Array2, Zip};
use thiserror::Error;

use crate::color_lut::{Rgb, default_segment_color};
use crate::contour::ContourSet;
use crate::engine::RenderingEngine;
use crate::error::SegmentationError;
use crate::events::{EventPublisher, SegmentationEvent};
use crate::segmentation::{
    CachedStats, RepresentationData, Segment, SegmentationPatch, check_segment_index,
};
use crate::store::SegmentationStore;
use crate::volume::{LabelmapVolume, VolumeGeometry};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error("Inconsistent frame dimensions: expected {expected:?}, got {actual:?}")]
    InconsistentDimensions {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Frame references unknown image {0}")]
    UnknownReferencedImage(String),

    #[error("Frame references undeclared segment {0}")]
    UnknownSegment(u32),

    #[error("Segment {0} is declared more than once")]
    DuplicateSegment(u32),
}

/// Declared segment of a bulk segmentation object.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSegment {
    pub segment_index: u32,
    pub label: String,
    pub color: Option<Rgb>,
}

impl SourceSegment {
    pub fn new(segment_index: u32, label: impl Into<String>) -> Self {
        Self {
            segment_index,
            label: label.into(),
            color: None,
        }
    }
}

/// One decoded frame: a binary mask of one segment on one referenced image.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelmapFrame {
    pub referenced_image_id: String,
    pub segment_index: u32,
    /// (height, width); any non-zero pixel belongs to the segment.
    pub pixels: Array2<u8>,
}

/// Pre-parsed per-voxel segmentation object.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelmapSource {
    /// Generated when `None`.
    pub segmentation_id: Option<String>,
    pub label: String,
    pub reference_volume_id: String,
    pub segments: Vec<SourceSegment>,
    pub frames: Vec<LabelmapFrame>,
    pub is_loaded: bool,
}

/// One structure of a pre-parsed contour object.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourStructure {
    pub segment: SourceSegment,
    /// Closed polylines in world coordinates.
    pub contours: Vec<Vec<Vec3>>,
}

/// Pre-parsed per-structure contour object.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourSource {
    /// Generated when `None`.
    pub segmentation_id: Option<String>,
    pub label: String,
    pub reference_volume_id: String,
    pub structures: Vec<ContourStructure>,
    pub is_loaded: bool,
}

/// Running sums of one segment's voxels.
#[derive(Debug, Default)]
struct SegmentAccumulator {
    sum: [f64; 3],
    count: usize,
    overlapping: bool,
}

impl SegmentAccumulator {
    fn add(&mut self, x: usize, y: usize, z: usize) {
        self.sum[0] += x as f64;
        self.sum[1] += y as f64;
        self.sum[2] += z as f64;
        self.count += 1;
    }

    /// Mean (column, row, slice) index, if any voxel was seen.
    fn centroid(&self) -> Option<Vec3> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(Vec3::new(
            (self.sum[0] / n) as f32,
            (self.sum[1] / n) as f32,
            (self.sum[2] / n) as f32,
        ))
    }
}

/// Turns pre-parsed bulk segmentation objects into store records.
///
/// An import runs in three steps. `prepare_*` validates the object against
/// the store. `run` processes segments one at a time in increasing index
/// order, with a cooperative yield before each and a `SegmentLoadingComplete`
/// event after each. It does not touch the store, so other store operations
/// can run between segments. `commit` adds the finished segmentation.
/// Nothing reaches the store unless every segment succeeds.
pub struct SegmentationLoader;

impl SegmentationLoader {
    /// Import a labelmap object into a new segmentation
    ///
    /// Holds the store for the whole import; use [`Self::prepare_labelmap`]
    /// to keep it free between segments.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` before any work is scheduled if the reference
    /// volume is not cached, and a frame error if any frame cannot be placed
    /// in the volume.
    pub async fn load_labelmap<E: RenderingEngine>(
        store: &mut SegmentationStore<E>,
        source: &mut LabelmapSource,
    ) -> Result<String, ImportError> {
        let import = Self::prepare_labelmap(store, source)?;
        import.run().await?.commit(store)
    }

    /// Import a contour object into a new segmentation
    ///
    /// Each structure becomes its own contour set; overlap between structures
    /// is not tracked.
    pub async fn load_contours<E: RenderingEngine>(
        store: &mut SegmentationStore<E>,
        source: &mut ContourSource,
    ) -> Result<String, ImportError> {
        let import = Self::prepare_contours(store, source)?;
        import.run().await?.commit(store)
    }

    /// Validate a labelmap object and reserve its segmentation id.
    pub fn prepare_labelmap<'a, E: RenderingEngine>(
        store: &mut SegmentationStore<E>,
        source: &'a mut LabelmapSource,
    ) -> Result<LabelmapImport<'a>, ImportError> {
        let geometry = Self::reference_geometry(store, &source.reference_volume_id)?;
        let segments = Self::sorted_segments(source.segments.iter())?;
        Self::validate_frame_segments(&source.frames, &segments)?;
        let segmentation_id = Self::segmentation_id(store, source.segmentation_id.as_deref())?;

        Ok(LabelmapImport {
            source,
            segmentation_id,
            geometry,
            segments,
            publisher: store.event_publisher(),
        })
    }

    /// Validate a contour object and reserve its segmentation id.
    pub fn prepare_contours<'a, E: RenderingEngine>(
        store: &mut SegmentationStore<E>,
        source: &'a mut ContourSource,
    ) -> Result<ContourImport<'a>, ImportError> {
        Self::reference_geometry(store, &source.reference_volume_id)?;
        let segments = Self::sorted_segments(source.structures.iter().map(|s| &s.segment))?;
        let segmentation_id = Self::segmentation_id(store, source.segmentation_id.as_deref())?;

        Ok(ContourImport {
            source,
            segmentation_id,
            segments,
            publisher: store.event_publisher(),
        })
    }

    fn reference_geometry<E: RenderingEngine>(
        store: &SegmentationStore<E>,
        volume_id: &str,
    ) -> Result<VolumeGeometry, ImportError> {
        store
            .engine()
            .volume_geometry(volume_id)
            .ok_or_else(|| SegmentationError::volume_not_found(volume_id).into())
    }

    fn segmentation_id<E: RenderingEngine>(
        store: &mut SegmentationStore<E>,
        requested: Option<&str>,
    ) -> Result<String, ImportError> {
        match requested {
            Some(id) if store.segmentation(id).is_some() => Err(id_taken(id)),
            Some(id) => Ok(id.to_owned()),
            None => Ok(store.generate_id()),
        }
    }

    fn sorted_segments<'a>(
        segments: impl Iterator<Item = &'a SourceSegment>,
    ) -> Result<Vec<SourceSegment>, ImportError> {
        let mut sorted: Vec<SourceSegment> = segments.cloned().collect();
        sorted.sort_by_key(|segment| segment.segment_index);

        for segment in &sorted {
            check_segment_index(segment.segment_index)?;
        }
        if let Some(pair) = sorted
            .windows(2)
            .find(|pair| pair[0].segment_index == pair[1].segment_index)
        {
            return Err(ImportError::DuplicateSegment(pair[0].segment_index));
        }
        Ok(sorted)
    }

    fn validate_frame_segments(
        frames: &[LabelmapFrame],
        segments: &[SourceSegment],
    ) -> Result<(), ImportError> {
        let declared: BTreeSet<u32> = segments.iter().map(|s| s.segment_index).collect();
        match frames
            .iter()
            .find(|frame| !declared.contains(&frame.segment_index))
        {
            Some(frame) => Err(ImportError::UnknownSegment(frame.segment_index)),
            None => Ok(()),
        }
    }

    /// Write one segment's frames into the label volume.
    fn rasterize_segment<'a>(
        labelmap: &mut LabelmapVolume,
        slice_lookup: &HashMap<&str, usize>,
        segment_index: u32,
        frames: impl Iterator<Item = &'a LabelmapFrame>,
    ) -> Result<SegmentAccumulator, ImportError> {
        let label = u16::try_from(segment_index)
            .map_err(|_| SegmentationError::segment_index_out_of_range(segment_index))?;
        let expected = labelmap.geometry.slice_dim();
        let mut accumulator = SegmentAccumulator::default();

        for frame in frames {
            let slice_index = *slice_lookup
                .get(frame.referenced_image_id.as_str())
                .ok_or_else(|| ImportError::UnknownReferencedImage(frame.referenced_image_id.clone()))?;
            if frame.pixels.dim() != expected {
                return Err(ImportError::InconsistentDimensions {
                    expected,
                    actual: frame.pixels.dim(),
                });
            }
            let mut slice = labelmap.get_slice_mut(slice_index).ok_or_else(|| {
                ImportError::InconsistentDimensions {
                    expected,
                    actual: frame.pixels.dim(),
                }
            })?;

            Zip::indexed(&mut slice)
                .and(&frame.pixels)
                .for_each(|(row, column), voxel, &pixel| {
                    if pixel == 0 {
                        return;
                    }
                    if *voxel != 0 && *voxel != label {
                        accumulator.overlapping = true;
                    }
                    *voxel = label;
                    accumulator.add(column, row, slice_index);
                });
        }
        Ok(accumulator)
    }

    fn report_progress(
        publisher: &EventPublisher,
        segmentation_id: &str,
        segment_index: u32,
        done: usize,
        total: usize,
    ) {
        let percent_complete = (done * 100 / total.max(1)) as u8;
        publisher.emit(&SegmentationEvent::SegmentLoadingComplete {
            segmentation_id: segmentation_id.to_owned(),
            segment_index,
            percent_complete,
        });
    }
}

fn id_taken(segmentation_id: &str) -> ImportError {
    SegmentationError::InvalidArgument(format!("segmentation {segmentation_id} already exists"))
        .into()
}

/// Validated labelmap import that no longer needs the store.
pub struct LabelmapImport<'a> {
    source: &'a mut LabelmapSource,
    segmentation_id: String,
    geometry: VolumeGeometry,
    segments: Vec<SourceSegment>,
    publisher: EventPublisher,
}

impl<'a> LabelmapImport<'a> {
    pub fn segmentation_id(&self) -> &str {
        &self.segmentation_id
    }

    /// Rasterize every segment into a new label volume.
    pub async fn run(self) -> Result<PreparedImport<'a>, ImportError> {
        let LabelmapImport {
            source,
            segmentation_id,
            geometry,
            segments,
            publisher,
        } = self;

        let mut labelmap =
            LabelmapVolume::derived(format!("{segmentation_id}-labelmap"), &geometry);
        let mut stats = CachedStats::default();
        {
            let slice_lookup = geometry.slice_lookup();
            let total = segments.len();
            for (done, segment) in segments.iter().enumerate() {
                tokio::task::yield_now().await;

                let frames = source
                    .frames
                    .iter()
                    .filter(|frame| frame.segment_index == segment.segment_index);
                let accumulator = SegmentationLoader::rasterize_segment(
                    &mut labelmap,
                    &slice_lookup,
                    segment.segment_index,
                    frames,
                )?;

                stats.overlapping_segments |= accumulator.overlapping;
                if let Some(center) = accumulator.centroid() {
                    stats
                        .segment_center
                        .insert(segment.segment_index, geometry.index_to_world(center));
                }
                SegmentationLoader::report_progress(
                    &publisher,
                    &segmentation_id,
                    segment.segment_index,
                    done + 1,
                    total,
                );
            }
        }

        if stats.overlapping_segments {
            log::warn!("Segmentation {segmentation_id} has overlapping segments");
        }
        Ok(PreparedImport {
            label: source.label.clone(),
            segmentation_id,
            data: RepresentationData::Labelmap(labelmap),
            segments,
            stats,
            is_loaded: &mut source.is_loaded,
        })
    }
}

/// Validated contour import that no longer needs the store.
pub struct ContourImport<'a> {
    source: &'a mut ContourSource,
    segmentation_id: String,
    segments: Vec<SourceSegment>,
    publisher: EventPublisher,
}

impl<'a> ContourImport<'a> {
    pub fn segmentation_id(&self) -> &str {
        &self.segmentation_id
    }

    /// Build one contour set per structure.
    pub async fn run(self) -> Result<PreparedImport<'a>, ImportError> {
        let ContourImport {
            source,
            segmentation_id,
            segments,
            publisher,
        } = self;

        let mut sets = BTreeMap::new();
        let mut stats = CachedStats::default();
        {
            let structures: HashMap<u32, &ContourStructure> = source
                .structures
                .iter()
                .map(|structure| (structure.segment.segment_index, structure))
                .collect();
            let total = segments.len();
            for (done, segment) in segments.iter().enumerate() {
                tokio::task::yield_now().await;

                let index = segment.segment_index;
                let Some(structure) = structures.get(&index) else {
                    return Err(ImportError::UnknownSegment(index));
                };
                if structure.contours.iter().flatten().any(|point| !point.is_finite()) {
                    return Err(SegmentationError::InvalidArgument(format!(
                        "structure {index} has a non-finite contour point"
                    ))
                    .into());
                }
                let set = ContourSet::new(
                    format!("{segmentation_id}-contour-{index}"),
                    index,
                    structure.contours.clone(),
                );
                if let Some(center) = set.centroid() {
                    stats.segment_center.insert(index, center);
                }
                sets.insert(index, set);
                SegmentationLoader::report_progress(
                    &publisher,
                    &segmentation_id,
                    index,
                    done + 1,
                    total,
                );
            }
        }

        Ok(PreparedImport {
            label: source.label.clone(),
            segmentation_id,
            data: RepresentationData::Contour(sets),
            segments,
            stats,
            is_loaded: &mut source.is_loaded,
        })
    }
}

/// Fully built segmentation waiting to be added to the store.
pub struct PreparedImport<'a> {
    segmentation_id: String,
    label: String,
    data: RepresentationData,
    segments: Vec<SourceSegment>,
    stats: CachedStats,
    is_loaded: &'a mut bool,
}

impl PreparedImport<'_> {
    pub fn segmentation_id(&self) -> &str {
        &self.segmentation_id
    }

    /// Mark the source loaded and add the segmentation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a segmentation with the same id was
    /// added while the import ran.
    pub fn commit<E: RenderingEngine>(
        self,
        store: &mut SegmentationStore<E>,
    ) -> Result<String, ImportError> {
        if store.segmentation(&self.segmentation_id).is_some() {
            return Err(id_taken(&self.segmentation_id));
        }
        let records: Vec<Segment> = self
            .segments
            .iter()
            .map(|source| {
                Segment::new(source.segment_index)
                    .with_label(source.label.clone())
                    .with_color(
                        source
                            .color
                            .unwrap_or_else(|| default_segment_color(source.segment_index)),
                    )
            })
            .collect();
        let first_index = records.first().map(|segment| segment.segment_index);
        let segment_count = records.len();

        let mut patch = SegmentationPatch::new(&self.segmentation_id)
            .label(self.label)
            .segments(records)
            .active_segment_index(first_index)
            .cached_stats(self.stats)
            .hydrated(false);
        patch.representation_data = Some(self.data);

        *self.is_loaded = true;
        store.emit(SegmentationEvent::SegmentationLoadingComplete {
            segmentation_id: self.segmentation_id.clone(),
        });
        let id = store.add_or_update_segmentation(patch, false, true)?;
        log::info!("Imported segmentation {id} with {segment_count} segments");
        Ok(id)
    }
}
