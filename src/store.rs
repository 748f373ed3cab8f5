//! Authoritative segmentation state.
//!
//! Every mutation goes through [`SegmentationStore`] and publishes exactly one
//! [`SegmentationEvent`] (unless the caller suppresses it). Changes that
//! originate here are pushed to the rendering engine; changes that the engine
//! reported itself are absorbed without being pushed back, which is what the
//! `not_yet_updated_at_source` flag of
//! [`SegmentationStore::add_or_update_segmentation`] selects.

use std::collections::BTreeSet;

use futures::channel::mpsc::UnboundedReceiver;
use glam::Vec3;
use indexmap::IndexMap;

use crate::color_lut::{ColorLutAllocator, Rgb, Rgba, default_segment_color};
use crate::config::{ConfigurationManager, SegmentationConfig, StyleValue, normalize_fraction};
use crate::engine::{EngineSegmentation, RenderingEngine, Representation, RepresentationId};
use crate::enums::RepresentationType;
use crate::error::SegmentationError;
use crate::events::{EventBus, EventPublisher, SegmentationEvent};
use crate::segmentation::{
    Segment, SegmentProperties, Segmentation, SegmentationPatch, check_segment_index,
    sparse_segments,
};
use crate::volume::LabelmapVolume;

pub struct SegmentationStore<E: RenderingEngine> {
    segmentations: IndexMap<String, Segmentation>,
    color_luts: ColorLutAllocator,
    configuration: ConfigurationManager,
    events: EventBus,
    engine: E,
    next_generated_id: u64,
}

impl<E: RenderingEngine> SegmentationStore<E> {
    pub fn new(engine: E) -> Self {
        Self::with_configuration(engine, SegmentationConfig::default())
    }

    /// Create a store and push `config` to the engine.
    pub fn with_configuration(mut engine: E, config: SegmentationConfig) -> Self {
        for representation_type in RepresentationType::ALL {
            engine.apply_style(representation_type, config.style(representation_type));
        }
        Self {
            segmentations: IndexMap::new(),
            color_luts: ColorLutAllocator::new(),
            configuration: ConfigurationManager::new(config),
            events: EventBus::new(),
            engine,
            next_generated_id: 1,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<SegmentationEvent> {
        self.events.subscribe()
    }

    pub fn configuration(&self) -> &ConfigurationManager {
        &self.configuration
    }

    pub fn color_luts(&self) -> &ColorLutAllocator {
        &self.color_luts
    }

    pub fn segmentation(&self, segmentation_id: &str) -> Option<&Segmentation> {
        self.segmentations.get(segmentation_id)
    }

    /// All segmentations in insertion order.
    pub fn segmentations(&self) -> impl Iterator<Item = &Segmentation> {
        self.segmentations.values()
    }

    pub fn active_segmentation(&self) -> Option<&Segmentation> {
        self.segmentations.values().find(|s| s.is_active)
    }

    /// Cached world-space centre of a segment, for jumping the view to it.
    pub fn segment_center(&self, segmentation_id: &str, segment_index: u32) -> Option<Vec3> {
        self.segmentation(segmentation_id)?
            .cached_stats
            .segment_center
            .get(&segment_index)
            .copied()
    }

    /// Add an empty labelmap segmentation shaped like a cached image volume.
    pub fn create_empty_segmentation(
        &mut self,
        reference_volume_id: &str,
        label: &str,
    ) -> Result<String, SegmentationError> {
        let geometry = self
            .engine
            .volume_geometry(reference_volume_id)
            .ok_or_else(|| SegmentationError::volume_not_found(reference_volume_id))?;
        let segmentation_id = self.generate_id();
        let volume = LabelmapVolume::derived(format!("{segmentation_id}-labelmap"), &geometry);

        self.add_or_update_segmentation(
            SegmentationPatch::new(segmentation_id)
                .label(label)
                .labelmap(volume)
                .hydrated(true),
            false,
            true,
        )
    }

    /// Create a segmentation, or merge `patch` into the existing record with
    /// the same id.
    ///
    /// A merge overwrites only the fields set in `patch` and is pushed to the
    /// engine only when `not_yet_updated_at_source` is true; engine echoes
    /// pass `false`. New records always get a fresh color LUT and are
    /// registered with the engine.
    pub fn add_or_update_segmentation(
        &mut self,
        patch: SegmentationPatch,
        suppress_events: bool,
        not_yet_updated_at_source: bool,
    ) -> Result<String, SegmentationError> {
        let segmentation_id = match &patch.id {
            Some(id) => id.clone(),
            None => self.generate_id(),
        };

        if self.segmentations.contains_key(&segmentation_id) {
            self.merge_segmentation(
                &segmentation_id,
                patch,
                suppress_events,
                not_yet_updated_at_source,
            )?;
        } else {
            self.insert_segmentation(&segmentation_id, patch, suppress_events)?;
        }
        Ok(segmentation_id)
    }

    fn insert_segmentation(
        &mut self,
        segmentation_id: &str,
        patch: SegmentationPatch,
        suppress_events: bool,
    ) -> Result<(), SegmentationError> {
        let representation_data = patch.representation_data.ok_or_else(|| {
            SegmentationError::InvalidArgument(format!(
                "new segmentation {segmentation_id} has no geometry"
            ))
        })?;
        let segments = sparse_segments(segmentation_id, patch.segments.unwrap_or_default())?;
        let active_segment_index = patch.active_segment_index.flatten();
        if let Some(index) = active_segment_index {
            if !segments.get(index as usize).is_some_and(Option::is_some) {
                return Err(SegmentationError::segment_not_found(segmentation_id, index));
            }
        }

        let color_lut_index = self.color_luts.allocate();
        let mut segmentation = Segmentation {
            id: segmentation_id.to_owned(),
            label: patch.label.unwrap_or_else(|| segmentation_id.to_owned()),
            representation_data,
            segment_count: segments.iter().flatten().count(),
            segments,
            active_segment_index,
            cached_stats: patch.cached_stats.unwrap_or_default(),
            color_lut_index,
            is_active: false,
            is_visible: true,
            hydrated: patch.hydrated.unwrap_or(false),
        };
        segmentation.recompute_visibility();
        if let Some(lut) = self.color_luts.get_mut(color_lut_index) {
            for segment in segmentation.iter_segments() {
                lut.set_color(segment.segment_index, opaque(segment.color));
            }
        }

        self.engine
            .register_segmentation(EngineSegmentation::from_segmentation(&segmentation));
        log::debug!(
            "Added segmentation {segmentation_id} ({:?}, {} segments, LUT {color_lut_index})",
            segmentation.representation_type(),
            segmentation.segment_count
        );
        self.segmentations
            .insert(segmentation_id.to_owned(), segmentation);

        if !suppress_events {
            self.events.emit(SegmentationEvent::SegmentationAdded {
                segmentation_id: segmentation_id.to_owned(),
            });
        }
        Ok(())
    }

    fn merge_segmentation(
        &mut self,
        segmentation_id: &str,
        patch: SegmentationPatch,
        suppress_events: bool,
        not_yet_updated_at_source: bool,
    ) -> Result<(), SegmentationError> {
        let segmentation = self
            .segmentations
            .get_mut(segmentation_id)
            .ok_or_else(|| SegmentationError::segmentation_not_found(segmentation_id))?;

        // Validate everything before touching the record.
        if let Some(data) = &patch.representation_data {
            if data.representation_type() != segmentation.representation_type() {
                return Err(SegmentationError::InvalidArgument(format!(
                    "segmentation {segmentation_id} is a {:?}, cannot replace its geometry with {:?}",
                    segmentation.representation_type(),
                    data.representation_type()
                )));
            }
        }
        let segments = patch
            .segments
            .map(|segments| sparse_segments(segmentation_id, segments))
            .transpose()?;
        if let Some(Some(index)) = patch.active_segment_index {
            let exists = match &segments {
                Some(segments) => segments.get(index as usize).is_some_and(Option::is_some),
                None => segmentation.segment(index).is_some(),
            };
            if !exists {
                return Err(SegmentationError::segment_not_found(segmentation_id, index));
            }
        }

        if let Some(label) = patch.label {
            segmentation.label = label;
        }
        if let Some(data) = patch.representation_data {
            segmentation.representation_data = data;
        }
        if let Some(segments) = segments {
            segmentation.segment_count = segments.iter().flatten().count();
            segmentation.segments = segments;
            if let Some(lut) = self.color_luts.get_mut(segmentation.color_lut_index) {
                for segment in segmentation.segments.iter().flatten() {
                    lut.set_color(segment.segment_index, opaque(segment.color));
                }
            }
            if let Some(active) = segmentation.active_segment_index {
                if segmentation.segment(active).is_none() {
                    segmentation.active_segment_index = segmentation.lowest_segment_index();
                }
            }
        }
        if let Some(active) = patch.active_segment_index {
            segmentation.active_segment_index = active;
        }
        if let Some(stats) = patch.cached_stats {
            segmentation.cached_stats = stats;
        }
        if let Some(hydrated) = patch.hydrated {
            segmentation.hydrated = hydrated;
        }
        segmentation.recompute_visibility();

        if not_yet_updated_at_source {
            self.engine
                .update_segmentation(EngineSegmentation::from_segmentation(segmentation));
            for (surface_id, representation) in self.engine.representations_of(segmentation_id) {
                replay_segments(&mut self.engine, &surface_id, representation.id, segmentation);
            }
        }
        log::debug!(
            "Merged segmentation {segmentation_id} (pushed to engine: {not_yet_updated_at_source})"
        );

        if !suppress_events {
            self.emit_updated(segmentation_id);
        }
        Ok(())
    }

    /// Add a segment at `segment_index`. Appearance defaults come from the
    /// segmentation's color LUT unless `properties` overrides them.
    pub fn add_segment(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        surface_id: Option<&str>,
        properties: SegmentProperties,
    ) -> Result<(), SegmentationError> {
        check_segment_index(segment_index)?;
        let segmentation = self
            .segmentations
            .get(segmentation_id)
            .ok_or_else(|| SegmentationError::segmentation_not_found(segmentation_id))?;
        if segmentation.segment(segment_index).is_some() {
            return Err(SegmentationError::Conflict {
                segmentation_id: segmentation_id.to_owned(),
                segment_index,
            });
        }
        let targets = self.targets(segmentation_id, surface_id)?;
        let properties = normalized(properties)?;

        let color_lut_index = segmentation.color_lut_index;
        let mut segment = Segment::new(segment_index);
        if let Some([r, g, b, _]) = self
            .color_luts
            .get(color_lut_index)
            .and_then(|lut| lut.color(segment_index))
        {
            segment.color = [r, g, b];
        }
        properties.apply_to(&mut segment);
        if let Some(lut) = self.color_luts.get_mut(color_lut_index) {
            lut.set_color(segment_index, opaque(segment.color));
        }

        let Some(segmentation) = self.segmentations.get_mut(segmentation_id) else {
            return Err(SegmentationError::segmentation_not_found(segmentation_id));
        };
        if properties.active == Some(true) || segmentation.active_segment_index.is_none() {
            segmentation.active_segment_index = Some(segment_index);
        }
        segmentation.insert_segment(segment.clone());
        segmentation.recompute_visibility();

        self.engine
            .update_segmentation(EngineSegmentation::from_segmentation(segmentation));
        for (surface_id, representation) in &targets {
            push_appearance(&mut self.engine, surface_id, representation.id, &segment);
        }
        log::debug!("Added segment {segment_index} to {segmentation_id}");

        self.emit_updated(segmentation_id);
        Ok(())
    }

    /// Remove a segment and clear its voxels or contours. Removing a segment
    /// that does not exist is a no-op.
    pub fn remove_segment(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
    ) -> Result<(), SegmentationError> {
        if segment_index == 0 {
            return Err(SegmentationError::background_index());
        }
        let segmentation = self
            .segmentations
            .get_mut(segmentation_id)
            .ok_or_else(|| SegmentationError::segmentation_not_found(segmentation_id))?;
        if segmentation.take_segment(segment_index).is_none() {
            return Ok(());
        }

        let touched_slices = segmentation
            .representation_data
            .clear_segment(segment_index);
        segmentation
            .cached_stats
            .segment_center
            .remove(&segment_index);
        if segmentation.active_segment_index == Some(segment_index) {
            segmentation.active_segment_index =
                Some(segmentation.lowest_segment_index().unwrap_or(1));
        }
        segmentation.recompute_visibility();
        if let Some(lut) = self.color_luts.get_mut(segmentation.color_lut_index) {
            lut.set_color(segment_index, opaque(default_segment_color(segment_index)));
        }

        self.engine
            .notify_data_modified(segmentation_id, &touched_slices);
        self.engine
            .update_segmentation(EngineSegmentation::from_segmentation(segmentation));
        log::debug!(
            "Removed segment {segment_index} from {segmentation_id}, {} slices touched",
            touched_slices.len()
        );

        self.emit_updated(segmentation_id);
        Ok(())
    }

    pub fn set_segment_visibility(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        visible: bool,
        surface_id: Option<&str>,
    ) -> Result<(), SegmentationError> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().visible(visible),
            surface_id,
        )
    }

    pub fn toggle_segment_visibility(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        surface_id: Option<&str>,
    ) -> Result<bool, SegmentationError> {
        let visible = !self.existing_segment(segmentation_id, segment_index)?.is_visible;
        self.set_segment_visibility(segmentation_id, segment_index, visible, surface_id)?;
        Ok(visible)
    }

    pub fn set_segment_locked(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        locked: bool,
    ) -> Result<(), SegmentationError> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().locked(locked),
            None,
        )
    }

    pub fn toggle_segment_locked(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
    ) -> Result<bool, SegmentationError> {
        let locked = !self.existing_segment(segmentation_id, segment_index)?.is_locked;
        self.set_segment_locked(segmentation_id, segment_index, locked)?;
        Ok(locked)
    }

    pub fn set_segment_label(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        label: &str,
    ) -> Result<(), SegmentationError> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().label(label),
            None,
        )
    }

    pub fn set_segment_color(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        color: Rgb,
        surface_id: Option<&str>,
    ) -> Result<(), SegmentationError> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().color(color),
            surface_id,
        )
    }

    /// Opacity as a fraction or a percentage.
    pub fn set_segment_opacity(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        opacity: f32,
        surface_id: Option<&str>,
    ) -> Result<(), SegmentationError> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().opacity(opacity),
            surface_id,
        )
    }

    /// Color and opacity from one RGBA value, published as one update.
    pub fn set_segment_color_and_opacity(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        [r, g, b, a]: Rgba,
        surface_id: Option<&str>,
    ) -> Result<(), SegmentationError> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new()
                .color([r, g, b])
                .opacity(f32::from(a) / 255.0),
            surface_id,
        )
    }

    pub fn set_active_segment(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
    ) -> Result<(), SegmentationError> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().active(true),
            None,
        )
    }

    /// Apply several segment fields at once with a single update event.
    /// Appearance goes to `surface_id` only, or to every bound surface.
    pub fn update_segment(
        &mut self,
        segmentation_id: &str,
        segment_index: u32,
        properties: &SegmentProperties,
        surface_id: Option<&str>,
    ) -> Result<(), SegmentationError> {
        self.existing_segment(segmentation_id, segment_index)?;
        let targets = self.targets(segmentation_id, surface_id)?;
        let properties = normalized(properties.clone())?;

        let Some(segmentation) = self.segmentations.get_mut(segmentation_id) else {
            return Err(SegmentationError::segmentation_not_found(segmentation_id));
        };
        let Some(segment) = segmentation.segment_mut(segment_index) else {
            return Err(SegmentationError::segment_not_found(segmentation_id, segment_index));
        };
        properties.apply_to(segment);
        let segment = segment.clone();

        if properties.active == Some(true) {
            segmentation.active_segment_index = Some(segment_index);
        }
        if properties.is_visible.is_some() {
            segmentation.recompute_visibility();
        }
        if properties.color.is_some() {
            if let Some(lut) = self.color_luts.get_mut(segmentation.color_lut_index) {
                lut.set_color(segment_index, opaque(segment.color));
            }
        }

        for (surface_id, representation) in &targets {
            if let Some(color) = properties.color {
                self.engine
                    .set_segment_color(surface_id, representation.id, segment_index, color);
            }
            if properties.opacity.is_some() {
                self.engine.set_segment_opacity(
                    surface_id,
                    representation.id,
                    segment_index,
                    segment.opacity,
                );
            }
            if let Some(visible) = properties.is_visible {
                self.engine
                    .set_segment_visibility(surface_id, representation.id, segment_index, visible);
            }
        }
        if let Some(locked) = properties.is_locked {
            self.engine
                .set_segment_locked(segmentation_id, segment_index, locked);
        }
        if properties.label.is_some() || properties.is_locked.is_some() || properties.active.is_some() {
            self.engine
                .update_segmentation(EngineSegmentation::from_segmentation(segmentation));
        }

        self.emit_updated(segmentation_id);
        Ok(())
    }

    /// Promote an imported preview to a first-class segmentation.
    pub fn hydrate_segmentation(&mut self, segmentation_id: &str) -> Result<(), SegmentationError> {
        self.set_hydrated(segmentation_id, true)
    }

    pub(crate) fn set_hydrated(
        &mut self,
        segmentation_id: &str,
        hydrated: bool,
    ) -> Result<(), SegmentationError> {
        let segmentation = self
            .segmentations
            .get_mut(segmentation_id)
            .ok_or_else(|| SegmentationError::segmentation_not_found(segmentation_id))?;
        if segmentation.hydrated != hydrated {
            segmentation.hydrated = hydrated;
            self.emit_updated(segmentation_id);
        }
        Ok(())
    }

    /// Remove a segmentation with all its representations. Unknown ids are
    /// logged and ignored; returns whether anything was removed.
    pub fn remove(&mut self, segmentation_id: &str) -> bool {
        let Some(removed) = self.segmentations.shift_remove(segmentation_id) else {
            log::warn!("Cannot remove unknown segmentation {segmentation_id}");
            return false;
        };

        for (surface_id, representation) in self.engine.representations_of(segmentation_id) {
            self.engine
                .remove_representations(&surface_id, Some(&[representation.id]));
        }
        self.engine.remove_segmentation(segmentation_id);
        self.color_luts.release(removed.color_lut_index);

        if removed.is_active {
            if let Some((next_id, next)) = self.segmentations.first_mut() {
                next.is_active = true;
                let next_id = next_id.clone();
                for (surface_id, representation) in self.engine.representations_of(&next_id) {
                    self.engine
                        .set_active_representation(&surface_id, representation.id);
                }
                log::debug!("Promoted segmentation {next_id} to active");
            }
        }
        log::debug!("Removed segmentation {segmentation_id}");

        self.events.emit(SegmentationEvent::SegmentationRemoved {
            segmentation_id: segmentation_id.to_owned(),
        });
        true
    }

    /// Make `segmentation_id` the single active segmentation and its
    /// representation the edit target of `surface_id`.
    pub fn set_active_segmentation_for_surface(
        &mut self,
        segmentation_id: &str,
        surface_id: &str,
    ) -> Result<(), SegmentationError> {
        if !self.segmentations.contains_key(segmentation_id) {
            return Err(SegmentationError::segmentation_not_found(segmentation_id));
        }
        let representation = self
            .engine
            .representations(surface_id)
            .into_iter()
            .find(|representation| representation.segmentation_id == segmentation_id)
            .ok_or_else(|| {
                SegmentationError::PreconditionFailed(format!(
                    "segmentation {segmentation_id} is not bound to surface {surface_id}"
                ))
            })?;

        for (id, segmentation) in self.segmentations.iter_mut() {
            segmentation.is_active = id == segmentation_id;
        }
        self.engine
            .set_active_representation(surface_id, representation.id);

        self.emit_updated(segmentation_id);
        Ok(())
    }

    /// Flip whole-segmentation visibility on every bound surface. Returns the
    /// new visibility.
    pub fn toggle_segmentation_visibility(
        &mut self,
        segmentation_id: &str,
    ) -> Result<bool, SegmentationError> {
        let segmentation = self
            .segmentations
            .get_mut(segmentation_id)
            .ok_or_else(|| SegmentationError::segmentation_not_found(segmentation_id))?;
        let visible = !segmentation.is_visible;
        for segment in segmentation.segments.iter_mut().flatten() {
            segment.is_visible = visible;
        }
        segmentation.recompute_visibility();

        for (surface_id, representation) in self.engine.representations_of(segmentation_id) {
            for segment in segmentation.segments.iter().flatten() {
                self.engine.set_segment_visibility(
                    &surface_id,
                    representation.id,
                    segment.segment_index,
                    visible,
                );
            }
        }
        let visible = segmentation.is_visible;

        self.emit_updated(segmentation_id);
        Ok(visible)
    }

    /// Change one global style value and re-render every surface that shows
    /// that representation type.
    pub fn set_style(
        &mut self,
        representation_type: RepresentationType,
        value: StyleValue,
    ) -> Result<(), SegmentationError> {
        self.configuration.set(representation_type, value)?;
        self.publish_style(representation_type);
        Ok(())
    }

    pub fn set_configuration(&mut self, config: SegmentationConfig) {
        self.configuration.replace(config);
        for representation_type in RepresentationType::ALL {
            self.publish_style(representation_type);
        }
    }

    fn publish_style(&mut self, representation_type: RepresentationType) {
        let style = *self.configuration.style(representation_type);
        self.engine.apply_style(representation_type, &style);

        let surfaces: BTreeSet<String> = self
            .segmentations
            .keys()
            .flat_map(|id| self.engine.representations_of(id))
            .filter(|(_, representation)| representation.representation_type == representation_type)
            .map(|(surface_id, _)| surface_id)
            .collect();
        let surfaces: Vec<String> = surfaces.into_iter().collect();
        if !surfaces.is_empty() {
            self.engine.request_render(&surfaces);
        }

        self.events
            .emit(SegmentationEvent::SegmentationConfigurationChanged { representation_type });
    }

    /// Replay every segment of `segmentation_id` onto one representation.
    pub(crate) fn replay_onto(
        &mut self,
        segmentation_id: &str,
        surface_id: &str,
        representation_id: RepresentationId,
    ) -> Result<(), SegmentationError> {
        let segmentation = self
            .segmentations
            .get(segmentation_id)
            .ok_or_else(|| SegmentationError::segmentation_not_found(segmentation_id))?;
        replay_segments(&mut self.engine, surface_id, representation_id, segmentation);
        Ok(())
    }

    pub(crate) fn emit(&mut self, event: SegmentationEvent) {
        self.events.emit(event);
    }

    pub(crate) fn event_publisher(&self) -> EventPublisher {
        self.events.publisher()
    }

    fn emit_updated(&mut self, segmentation_id: &str) {
        self.events.emit(SegmentationEvent::SegmentationUpdated {
            segmentation_id: segmentation_id.to_owned(),
        });
    }

    fn existing_segment(
        &self,
        segmentation_id: &str,
        segment_index: u32,
    ) -> Result<&Segment, SegmentationError> {
        self.segmentation(segmentation_id)
            .ok_or_else(|| SegmentationError::segmentation_not_found(segmentation_id))?
            .segment(segment_index)
            .ok_or_else(|| SegmentationError::segment_not_found(segmentation_id, segment_index))
    }

    /// Representations an appearance change should reach. Naming a surface
    /// the segmentation is not drawn on is a precondition failure.
    fn targets(
        &self,
        segmentation_id: &str,
        surface_id: Option<&str>,
    ) -> Result<Vec<(String, Representation)>, SegmentationError> {
        let mut targets = self.engine.representations_of(segmentation_id);
        if let Some(surface_id) = surface_id {
            targets.retain(|(surface, _)| surface == surface_id);
            if targets.is_empty() {
                return Err(SegmentationError::PreconditionFailed(format!(
                    "segmentation {segmentation_id} is not bound to surface {surface_id}"
                )));
            }
        }
        Ok(targets)
    }

    pub(crate) fn generate_id(&mut self) -> String {
        loop {
            let candidate = format!("segmentation-{}", self.next_generated_id);
            self.next_generated_id += 1;
            if !self.segmentations.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// Copy every segment's appearance and lock state onto one representation.
pub(crate) fn replay_segments<E: RenderingEngine>(
    engine: &mut E,
    surface_id: &str,
    representation_id: RepresentationId,
    segmentation: &Segmentation,
) {
    for segment in segmentation.iter_segments() {
        push_appearance(engine, surface_id, representation_id, segment);
        engine.set_segment_locked(segmentation.id(), segment.segment_index, segment.is_locked);
    }
}

fn push_appearance<E: RenderingEngine>(
    engine: &mut E,
    surface_id: &str,
    representation_id: RepresentationId,
    segment: &Segment,
) {
    let index = segment.segment_index;
    engine.set_segment_color(surface_id, representation_id, index, segment.color);
    engine.set_segment_opacity(surface_id, representation_id, index, segment.opacity);
    engine.set_segment_visibility(surface_id, representation_id, index, segment.is_visible);
}

fn normalized(mut properties: SegmentProperties) -> Result<SegmentProperties, SegmentationError> {
    if let Some(opacity) = properties.opacity {
        properties.opacity = Some(normalize_fraction(opacity)?);
    }
    Ok(properties)
}

fn opaque([r, g, b]: Rgb) -> Rgba {
    [r, g, b, 255]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_engine::InMemoryEngine;
    use crate::volume::VolumeGeometry;

    fn store() -> SegmentationStore<InMemoryEngine> {
        let mut engine = InMemoryEngine::new();
        engine.add_volume(
            "ct",
            VolumeGeometry::new((2, 2, 2), (1.0, 1.0, 1.0), vec!["i0".into(), "i1".into()]),
        );
        SegmentationStore::new(engine)
    }

    #[test]
    fn generated_ids_skip_taken_ones() {
        let mut store = store();
        let volume = LabelmapVolume::derived(
            "v",
            &store.engine().volume_geometry("ct").unwrap(),
        );
        store
            .add_or_update_segmentation(
                SegmentationPatch::new("segmentation-1").labelmap(volume),
                false,
                true,
            )
            .unwrap();

        let id = store.create_empty_segmentation("ct", "Second").unwrap();

        assert_eq!(id, "segmentation-2");
    }

    #[test]
    fn new_segmentation_without_geometry_is_rejected() {
        let mut store = store();
        let result = store.add_or_update_segmentation(SegmentationPatch::new("s"), false, true);
        assert!(matches!(result, Err(SegmentationError::InvalidArgument(_))));
        assert_eq!(store.color_luts().live_count(), 0);
    }

    #[test]
    fn empty_segmentation_from_unknown_volume_is_not_found() {
        let mut store = store();
        let result = store.create_empty_segmentation("mr", "Missing");
        assert!(matches!(result, Err(SegmentationError::NotFound { kind: "Volume", .. })));
    }

    #[test]
    fn segment_color_defaults_come_from_the_lut() {
        let mut store = store();
        let id = store.create_empty_segmentation("ct", "Organs").unwrap();
        store
            .add_segment(&id, 2, None, SegmentProperties::new())
            .unwrap();

        let segment = store.segmentation(&id).unwrap().segment(2).unwrap();
        assert_eq!(segment.color, default_segment_color(2));
        assert_eq!(segment.label, "Segment 2");
    }

    #[test]
    fn segment_index_above_the_limit_is_rejected() {
        let mut store = store();
        let id = store.create_empty_segmentation("ct", "Organs").unwrap();
        let result = store.add_segment(&id, 70_000, None, SegmentProperties::new());
        assert!(matches!(result, Err(SegmentationError::InvalidArgument(_))));
    }
}
