//! In-memory model of segmentations and their segments.
//!
//! Records are only mutated through [`SegmentationStore`]; outside the crate
//! they are read through accessors so the counting and visibility invariants
//! cannot be broken by direct field writes.
//!
//! [`SegmentationStore`]: crate::store::SegmentationStore

use std::collections::BTreeMap;

use glam::Vec3;

use crate::color_lut::{Rgb, default_segment_color};
use crate::contour::ContourSet;
use crate::enums::RepresentationType;
use crate::error::SegmentationError;
use crate::volume::LabelmapVolume;

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub segment_index: u32,
    pub label: String,
    pub color: Rgb,
    /// Alpha in `[0, 1]`, independent of `color`.
    pub opacity: f32,
    pub is_visible: bool,
    pub is_locked: bool,
}

impl Segment {
    pub fn new(segment_index: u32) -> Self {
        Self {
            segment_index,
            label: format!("Segment {segment_index}"),
            color: default_segment_color(segment_index),
            opacity: 1.0,
            is_visible: true,
            is_locked: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }
}

/// Optional appearance overrides used when adding or updating a segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentProperties {
    pub label: Option<String>,
    pub color: Option<Rgb>,
    pub opacity: Option<f32>,
    pub is_visible: Option<bool>,
    pub is_locked: Option<bool>,
    /// Make the segment the active edit target.
    pub active: Option<bool>,
}

impl SegmentProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.is_visible = Some(visible);
        self
    }

    pub fn locked(mut self, locked: bool) -> Self {
        self.is_locked = Some(locked);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub(crate) fn apply_to(&self, segment: &mut Segment) {
        if let Some(label) = &self.label {
            segment.label.clone_from(label);
        }
        if let Some(color) = self.color {
            segment.color = color;
        }
        if let Some(opacity) = self.opacity {
            segment.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(visible) = self.is_visible {
            segment.is_visible = visible;
        }
        if let Some(locked) = self.is_locked {
            segment.is_locked = locked;
        }
    }
}

/// Geometry backing a segmentation.
#[derive(Debug, Clone, PartialEq)]
pub enum RepresentationData {
    Labelmap(LabelmapVolume),
    /// One contour set per segment index.
    Contour(BTreeMap<u32, ContourSet>),
}

impl RepresentationData {
    pub fn representation_type(&self) -> RepresentationType {
        match self {
            RepresentationData::Labelmap(_) => RepresentationType::Labelmap,
            RepresentationData::Contour(_) => RepresentationType::Contour,
        }
    }

    /// Remove every trace of `segment_index` from the geometry. Returns the
    /// axial slices of a label volume that changed; contour removal drops the
    /// segment's whole geometry and reports no slices.
    pub(crate) fn clear_segment(&mut self, segment_index: u32) -> Vec<usize> {
        match self {
            RepresentationData::Labelmap(volume) => match u16::try_from(segment_index) {
                Ok(label) => volume.clear_segment(label),
                Err(_) => Vec::new(),
            },
            RepresentationData::Contour(sets) => {
                sets.remove(&segment_index);
                Vec::new()
            }
        }
    }

    /// Identifiers the rendering engine caches this geometry under.
    pub fn geometry_ids(&self) -> Vec<String> {
        match self {
            RepresentationData::Labelmap(volume) => vec![volume.volume_id.clone()],
            RepresentationData::Contour(sets) => {
                sets.values().map(|set| set.geometry_id.clone()).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedStats {
    /// World-space centroid per segment index.
    pub segment_center: BTreeMap<u32, Vec3>,
    /// Set when a bulk import found a voxel claimed by more than one segment.
    pub overlapping_segments: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub(crate) id: String,
    pub(crate) label: String,
    pub(crate) representation_data: RepresentationData,
    pub(crate) segments: Vec<Option<Segment>>,
    pub(crate) active_segment_index: Option<u32>,
    pub(crate) segment_count: usize,
    pub(crate) cached_stats: CachedStats,
    pub(crate) color_lut_index: usize,
    pub(crate) is_active: bool,
    pub(crate) is_visible: bool,
    pub(crate) hydrated: bool,
}

impl Segmentation {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn representation_type(&self) -> RepresentationType {
        self.representation_data.representation_type()
    }

    pub fn representation_data(&self) -> &RepresentationData {
        &self.representation_data
    }

    pub fn labelmap(&self) -> Option<&LabelmapVolume> {
        match &self.representation_data {
            RepresentationData::Labelmap(volume) => Some(volume),
            RepresentationData::Contour(_) => None,
        }
    }

    pub fn contour_sets(&self) -> Option<&BTreeMap<u32, ContourSet>> {
        match &self.representation_data {
            RepresentationData::Contour(sets) => Some(sets),
            RepresentationData::Labelmap(_) => None,
        }
    }

    /// Sparse segment table; slot 0 is always `None`.
    pub fn segments(&self) -> &[Option<Segment>] {
        &self.segments
    }

    pub fn segment(&self, segment_index: u32) -> Option<&Segment> {
        self.segments
            .get(segment_index as usize)
            .and_then(Option::as_ref)
    }

    /// Non-null segments in index order.
    pub fn iter_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().flatten()
    }

    pub fn active_segment_index(&self) -> Option<u32> {
        self.active_segment_index
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn cached_stats(&self) -> &CachedStats {
        &self.cached_stats
    }

    pub fn color_lut_index(&self) -> usize {
        self.color_lut_index
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    pub fn hydrated(&self) -> bool {
        self.hydrated
    }

    pub(crate) fn segment_mut(&mut self, segment_index: u32) -> Option<&mut Segment> {
        self.segments
            .get_mut(segment_index as usize)
            .and_then(Option::as_mut)
    }

    pub(crate) fn insert_segment(&mut self, segment: Segment) {
        let index = segment.segment_index as usize;
        if index >= self.segments.len() {
            self.segments.resize(index + 1, None);
        }
        self.segments[index] = Some(segment);
        self.segment_count += 1;
    }

    pub(crate) fn take_segment(&mut self, segment_index: u32) -> Option<Segment> {
        let removed = self
            .segments
            .get_mut(segment_index as usize)
            .and_then(Option::take);
        if removed.is_some() {
            self.segment_count -= 1;
            while self.segments.len() > 1 && matches!(self.segments.last(), Some(None)) {
                self.segments.pop();
            }
        }
        removed
    }

    pub(crate) fn lowest_segment_index(&self) -> Option<u32> {
        self.iter_segments().map(|segment| segment.segment_index).next()
    }

    pub(crate) fn recompute_visibility(&mut self) {
        let visible = self.iter_segments().all(|segment| segment.is_visible);
        self.is_visible = visible;
    }
}

/// Partial segmentation used to create a record or merge into an existing
/// one. Unset fields are left untouched on merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationPatch {
    pub id: Option<String>,
    pub label: Option<String>,
    pub representation_data: Option<RepresentationData>,
    pub segments: Option<Vec<Segment>>,
    pub active_segment_index: Option<Option<u32>>,
    pub cached_stats: Option<CachedStats>,
    pub hydrated: Option<bool>,
}

impl SegmentationPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn labelmap(mut self, volume: LabelmapVolume) -> Self {
        self.representation_data = Some(RepresentationData::Labelmap(volume));
        self
    }

    pub fn contours(mut self, sets: BTreeMap<u32, ContourSet>) -> Self {
        self.representation_data = Some(RepresentationData::Contour(sets));
        self
    }

    pub fn segments(mut self, segments: impl IntoIterator<Item = Segment>) -> Self {
        self.segments = Some(segments.into_iter().collect());
        self
    }

    pub fn active_segment_index(mut self, segment_index: Option<u32>) -> Self {
        self.active_segment_index = Some(segment_index);
        self
    }

    pub fn cached_stats(mut self, stats: CachedStats) -> Self {
        self.cached_stats = Some(stats);
        self
    }

    pub fn hydrated(mut self, hydrated: bool) -> Self {
        self.hydrated = Some(hydrated);
        self
    }
}

/// Largest segment index of either representation; labelmaps store labels
/// as `u16`.
pub const MAX_SEGMENT_INDEX: u32 = u16::MAX as u32;

/// Reject the background index and anything past [`MAX_SEGMENT_INDEX`].
pub(crate) fn check_segment_index(segment_index: u32) -> Result<(), SegmentationError> {
    if segment_index == 0 {
        return Err(SegmentationError::background_index());
    }
    if segment_index > MAX_SEGMENT_INDEX {
        return Err(SegmentationError::segment_index_out_of_range(segment_index));
    }
    Ok(())
}

/// Lay out segments by index. Out of range indices are rejected, duplicates
/// conflict.
pub(crate) fn sparse_segments(
    segmentation_id: &str,
    segments: Vec<Segment>,
) -> Result<Vec<Option<Segment>>, SegmentationError> {
    let mut sparse: Vec<Option<Segment>> = vec![None];
    for segment in segments {
        let index = segment.segment_index;
        check_segment_index(index)?;
        let slot = index as usize;
        if slot >= sparse.len() {
            sparse.resize(slot + 1, None);
        }
        if sparse[slot].is_some() {
            return Err(SegmentationError::Conflict {
                segmentation_id: segmentation_id.to_owned(),
                segment_index: index,
            });
        }
        sparse[slot] = Some(segment);
    }
    Ok(sparse)
}
