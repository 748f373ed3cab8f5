//! Boundary to the rendering engine.
//!
//! The engine keeps its own mirror of every segmentation plus the per-surface
//! representations that draw them. The store pushes changes outward through
//! this trait; the engine reports its own edits back as [`EngineEvent`]s.

use std::collections::BTreeMap;

use crate::color_lut::Rgb;
use crate::config::RepresentationStyle;
use crate::enums::RepresentationType;
use crate::segmentation::Segmentation;
use crate::volume::VolumeGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepresentationId(pub u64);

/// One segmentation drawn on one surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub id: RepresentationId,
    pub segmentation_id: String,
    pub representation_type: RepresentationType,
    /// Edit target of its surface
    pub active: bool,
    pub color_lut_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSegment {
    pub segment_index: u32,
    pub label: String,
    pub locked: bool,
}

/// The engine's mirrored copy of a segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSegmentation {
    pub segmentation_id: String,
    pub label: String,
    pub representation_type: RepresentationType,
    pub geometry_ids: Vec<String>,
    pub segments: BTreeMap<u32, EngineSegment>,
    pub active_segment_index: Option<u32>,
}

impl EngineSegmentation {
    pub fn from_segmentation(segmentation: &Segmentation) -> Self {
        Self {
            segmentation_id: segmentation.id().to_owned(),
            label: segmentation.label().to_owned(),
            representation_type: segmentation.representation_type(),
            geometry_ids: segmentation.representation_data().geometry_ids(),
            segments: segmentation
                .iter_segments()
                .map(|segment| {
                    (
                        segment.segment_index,
                        EngineSegment {
                            segment_index: segment.segment_index,
                            label: segment.label.clone(),
                            locked: segment.is_locked,
                        },
                    )
                })
                .collect(),
            active_segment_index: segmentation.active_segment_index(),
        }
    }
}

/// Notifications the engine raises after changing its own state.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SegmentationModified {
        segmentation_id: String,
    },
    SegmentationDataModified {
        segmentation_id: String,
        touched_slices: Vec<usize>,
    },
}

/// Per-segment style that takes precedence over the global configuration
/// while set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SegmentStyleOverride {
    pub fill_alpha: Option<f32>,
    pub outline_opacity: Option<f32>,
}

pub trait RenderingEngine {
    /// Geometry of a cached image volume.
    fn volume_geometry(&self, volume_id: &str) -> Option<VolumeGeometry>;

    fn register_segmentation(&mut self, state: EngineSegmentation);
    fn update_segmentation(&mut self, state: EngineSegmentation);
    fn remove_segmentation(&mut self, segmentation_id: &str);
    fn segmentation(&self, segmentation_id: &str) -> Option<EngineSegmentation>;
    /// Geometry changed on the listed axial slices and needs re-upload.
    fn notify_data_modified(&mut self, segmentation_id: &str, touched_slices: &[usize]);

    fn add_representation(
        &mut self,
        surface_id: &str,
        segmentation_id: &str,
        representation_type: RepresentationType,
    ) -> RepresentationId;
    /// Remove the listed representations, or all of them when `None`.
    fn remove_representations(
        &mut self,
        surface_id: &str,
        representation_ids: Option<&[RepresentationId]>,
    ) -> Vec<Representation>;
    fn representations(&self, surface_id: &str) -> Vec<Representation>;
    fn surfaces_with_segmentation(&self, segmentation_id: &str) -> Vec<String>;
    fn set_active_representation(&mut self, surface_id: &str, representation_id: RepresentationId);
    fn set_color_lut(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        color_lut_index: usize,
    );

    fn set_segment_color(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
        color: Rgb,
    );
    fn set_segment_opacity(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
        opacity: f32,
    );
    fn set_segment_visibility(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
        visible: bool,
    );
    fn segment_color(
        &self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
    ) -> Option<Rgb>;
    fn segment_opacity(
        &self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
    ) -> Option<f32>;
    fn segment_visibility(
        &self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
    ) -> Option<bool>;
    fn set_segment_locked(&mut self, segmentation_id: &str, segment_index: u32, locked: bool);

    /// `None` clears the override so the global style applies again.
    fn set_segment_style_override(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
        style: Option<SegmentStyleOverride>,
    );
    fn apply_style(&mut self, representation_type: RepresentationType, style: &RepresentationStyle);
    fn request_render(&mut self, surface_ids: &[String]);

    /// Take every event raised since the last call.
    fn drain_events(&mut self) -> Vec<EngineEvent>;

    /// Every (surface, representation) pair drawing `segmentation_id`.
    fn representations_of(&self, segmentation_id: &str) -> Vec<(String, Representation)> {
        self.surfaces_with_segmentation(segmentation_id)
            .into_iter()
            .flat_map(|surface_id| {
                self.representations(&surface_id)
                    .into_iter()
                    .filter(|representation| representation.segmentation_id == segmentation_id)
                    .map(move |representation| (surface_id.clone(), representation))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
