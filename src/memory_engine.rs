//! In-process [`RenderingEngine`] that mirrors state in plain maps.
//!
//! It draws nothing. Hosts without a GPU backend, the demo binary and the
//! tests use it; it also records outbound traffic so callers can check what
//! was pushed.

use std::collections::{BTreeMap, HashMap};

use crate::color_lut::Rgb;
use crate::config::RepresentationStyle;
use crate::engine::{
    EngineEvent, EngineSegment, EngineSegmentation, RenderingEngine, Representation,
    RepresentationId, SegmentStyleOverride,
};
use crate::enums::RepresentationType;
use crate::volume::VolumeGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SegmentAppearance {
    pub color: Option<Rgb>,
    pub opacity: Option<f32>,
    pub visible: Option<bool>,
}

#[derive(Debug, Clone)]
struct SurfaceRepresentation {
    representation: Representation,
    appearance: BTreeMap<u32, SegmentAppearance>,
    overrides: BTreeMap<u32, SegmentStyleOverride>,
}

#[derive(Debug, Default)]
pub struct InMemoryEngine {
    volumes: HashMap<String, VolumeGeometry>,
    segmentations: BTreeMap<String, EngineSegmentation>,
    surfaces: BTreeMap<String, Vec<SurfaceRepresentation>>,
    styles: BTreeMap<RepresentationType, RepresentationStyle>,
    pending_events: Vec<EngineEvent>,
    next_representation_id: u64,
    outbound_updates: usize,
    render_requests: Vec<Vec<String>>,
    data_modifications: Vec<(String, Vec<usize>)>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a reference image volume.
    pub fn add_volume(&mut self, volume_id: impl Into<String>, geometry: VolumeGeometry) {
        self.volumes.insert(volume_id.into(), geometry);
    }

    /// Number of mirror updates pushed by the store since creation.
    pub fn outbound_update_count(&self) -> usize {
        self.outbound_updates
    }

    pub fn render_requests(&self) -> &[Vec<String>] {
        &self.render_requests
    }

    pub fn data_modifications(&self) -> &[(String, Vec<usize>)] {
        &self.data_modifications
    }

    pub fn style(&self, representation_type: RepresentationType) -> Option<&RepresentationStyle> {
        self.styles.get(&representation_type)
    }

    pub fn segment_appearance(
        &self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
    ) -> Option<SegmentAppearance> {
        self.find(surface_id, representation_id)
            .and_then(|entry| entry.appearance.get(&segment_index).copied())
    }

    pub fn segment_style_override(
        &self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
    ) -> Option<SegmentStyleOverride> {
        self.find(surface_id, representation_id)
            .and_then(|entry| entry.overrides.get(&segment_index).copied())
    }

    pub fn style_override_count(&self) -> usize {
        self.surfaces
            .values()
            .flatten()
            .map(|entry| entry.overrides.len())
            .sum()
    }

    /// Stand-in for an interactive edit made inside the engine (renaming or
    /// locking a segment from an in-viewport tool). Queues
    /// [`EngineEvent::SegmentationModified`].
    pub fn simulate_segment_edit(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        label: Option<&str>,
        locked: Option<bool>,
    ) -> bool {
        let Some(state) = self.segmentations.get_mut(segmentation_id) else {
            return false;
        };
        let segment = state
            .segments
            .entry(segment_index)
            .or_insert_with(|| EngineSegment {
                segment_index,
                label: format!("Segment {segment_index}"),
                locked: false,
            });
        if let Some(label) = label {
            segment.label = label.to_owned();
        }
        if let Some(locked) = locked {
            segment.locked = locked;
        }
        self.pending_events.push(EngineEvent::SegmentationModified {
            segmentation_id: segmentation_id.to_owned(),
        });
        true
    }

    /// Stand-in for a paint stroke touching `touched_slices`.
    pub fn simulate_paint(&mut self, segmentation_id: &str, touched_slices: Vec<usize>) {
        self.pending_events
            .push(EngineEvent::SegmentationDataModified {
                segmentation_id: segmentation_id.to_owned(),
                touched_slices,
            });
    }

    fn find(
        &self,
        surface_id: &str,
        representation_id: RepresentationId,
    ) -> Option<&SurfaceRepresentation> {
        self.surfaces
            .get(surface_id)?
            .iter()
            .find(|entry| entry.representation.id == representation_id)
    }

    fn find_mut(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
    ) -> Option<&mut SurfaceRepresentation> {
        self.surfaces
            .get_mut(surface_id)?
            .iter_mut()
            .find(|entry| entry.representation.id == representation_id)
    }

    fn appearance_mut(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
    ) -> Option<&mut SegmentAppearance> {
        let entry = self.find_mut(surface_id, representation_id);
        if entry.is_none() {
            log::warn!("No representation {representation_id:?} on surface {surface_id}");
        }
        entry.map(|entry| entry.appearance.entry(segment_index).or_default())
    }
}

impl RenderingEngine for InMemoryEngine {
    fn volume_geometry(&self, volume_id: &str) -> Option<VolumeGeometry> {
        self.volumes.get(volume_id).cloned()
    }

    fn register_segmentation(&mut self, state: EngineSegmentation) {
        self.segmentations
            .insert(state.segmentation_id.clone(), state);
    }

    fn update_segmentation(&mut self, state: EngineSegmentation) {
        self.outbound_updates += 1;
        self.segmentations
            .insert(state.segmentation_id.clone(), state);
    }

    fn remove_segmentation(&mut self, segmentation_id: &str) {
        self.segmentations.remove(segmentation_id);
    }

    fn segmentation(&self, segmentation_id: &str) -> Option<EngineSegmentation> {
        self.segmentations.get(segmentation_id).cloned()
    }

    fn notify_data_modified(&mut self, segmentation_id: &str, touched_slices: &[usize]) {
        self.data_modifications
            .push((segmentation_id.to_owned(), touched_slices.to_vec()));
    }

    fn add_representation(
        &mut self,
        surface_id: &str,
        segmentation_id: &str,
        representation_type: RepresentationType,
    ) -> RepresentationId {
        self.next_representation_id += 1;
        let id = RepresentationId(self.next_representation_id);
        self.surfaces
            .entry(surface_id.to_owned())
            .or_default()
            .push(SurfaceRepresentation {
                representation: Representation {
                    id,
                    segmentation_id: segmentation_id.to_owned(),
                    representation_type,
                    active: false,
                    color_lut_index: None,
                },
                appearance: BTreeMap::new(),
                overrides: BTreeMap::new(),
            });
        id
    }

    fn remove_representations(
        &mut self,
        surface_id: &str,
        representation_ids: Option<&[RepresentationId]>,
    ) -> Vec<Representation> {
        let Some(entries) = self.surfaces.get_mut(surface_id) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<_>, Vec<_>) =
            entries.drain(..).partition(|entry| match representation_ids {
                Some(ids) => ids.contains(&entry.representation.id),
                None => true,
            });
        if kept.is_empty() {
            self.surfaces.remove(surface_id);
        } else {
            *entries = kept;
        }
        removed
            .into_iter()
            .map(|entry| entry.representation)
            .collect()
    }

    fn representations(&self, surface_id: &str) -> Vec<Representation> {
        self.surfaces
            .get(surface_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| entry.representation.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn surfaces_with_segmentation(&self, segmentation_id: &str) -> Vec<String> {
        self.surfaces
            .iter()
            .filter(|(_, entries)| {
                entries
                    .iter()
                    .any(|entry| entry.representation.segmentation_id == segmentation_id)
            })
            .map(|(surface_id, _)| surface_id.clone())
            .collect()
    }

    fn set_active_representation(&mut self, surface_id: &str, representation_id: RepresentationId) {
        if let Some(entries) = self.surfaces.get_mut(surface_id) {
            for entry in entries {
                entry.representation.active = entry.representation.id == representation_id;
            }
        }
    }

    fn set_color_lut(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        color_lut_index: usize,
    ) {
        if let Some(entry) = self.find_mut(surface_id, representation_id) {
            entry.representation.color_lut_index = Some(color_lut_index);
        }
    }

    fn set_segment_color(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
        color: Rgb,
    ) {
        if let Some(appearance) = self.appearance_mut(surface_id, representation_id, segment_index) {
            appearance.color = Some(color);
        }
    }

    fn set_segment_opacity(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
        opacity: f32,
    ) {
        if let Some(appearance) = self.appearance_mut(surface_id, representation_id, segment_index) {
            appearance.opacity = Some(opacity);
        }
    }

    fn set_segment_visibility(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
        visible: bool,
    ) {
        if let Some(appearance) = self.appearance_mut(surface_id, representation_id, segment_index) {
            appearance.visible = Some(visible);
        }
    }

    fn segment_color(
        &self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
    ) -> Option<Rgb> {
        self.segment_appearance(surface_id, representation_id, segment_index)?
            .color
    }

    fn segment_opacity(
        &self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
    ) -> Option<f32> {
        self.segment_appearance(surface_id, representation_id, segment_index)?
            .opacity
    }

    fn segment_visibility(
        &self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
    ) -> Option<bool> {
        self.segment_appearance(surface_id, representation_id, segment_index)?
            .visible
    }

    fn set_segment_locked(&mut self, segmentation_id: &str, segment_index: u32, locked: bool) {
        if let Some(segment) = self
            .segmentations
            .get_mut(segmentation_id)
            .and_then(|state| state.segments.get_mut(&segment_index))
        {
            segment.locked = locked;
        }
    }

    fn set_segment_style_override(
        &mut self,
        surface_id: &str,
        representation_id: RepresentationId,
        segment_index: u32,
        style: Option<SegmentStyleOverride>,
    ) {
        if let Some(entry) = self.find_mut(surface_id, representation_id) {
            match style {
                Some(style) => {
                    entry.overrides.insert(segment_index, style);
                }
                None => {
                    entry.overrides.remove(&segment_index);
                }
            }
        }
    }

    fn apply_style(&mut self, representation_type: RepresentationType, style: &RepresentationStyle) {
        self.styles.insert(representation_type, *style);
    }

    fn request_render(&mut self, surface_ids: &[String]) {
        self.render_requests.push(surface_ids.to_vec());
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.pending_events)
    }
}
