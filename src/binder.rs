//! Binding segmentations to rendering surfaces, and absorbing the engine's
//! own edits back into the store.

use crate::engine::{EngineEvent, RenderingEngine, Representation, RepresentationId};
use crate::enums::RepresentationType;
use crate::error::SegmentationError;
use crate::events::SegmentationEvent;
use crate::segmentation::{Segment, SegmentationPatch};
use crate::store::SegmentationStore;

pub struct RepresentationBinder;

impl RepresentationBinder {
    /// Draw a segmentation on a surface and make it the surface's edit
    /// target.
    ///
    /// Every segment's color, opacity, visibility and lock state is replayed
    /// onto the new representation, so binding is safe even when the engine
    /// already applied defaults. `hydrate` optionally sets the segmentation's
    /// hydrated flag.
    pub fn bind<E: RenderingEngine>(
        store: &mut SegmentationStore<E>,
        surface_id: &str,
        segmentation_id: &str,
        representation_type: RepresentationType,
        hydrate: Option<bool>,
    ) -> Result<RepresentationId, SegmentationError> {
        let color_lut_index = store
            .segmentation(segmentation_id)
            .ok_or_else(|| SegmentationError::segmentation_not_found(segmentation_id))?
            .color_lut_index();

        let engine = store.engine_mut();
        let representation_id =
            engine.add_representation(surface_id, segmentation_id, representation_type);
        engine.set_color_lut(surface_id, representation_id, color_lut_index);
        engine.set_active_representation(surface_id, representation_id);
        store.replay_onto(segmentation_id, surface_id, representation_id)?;
        log::debug!(
            "Bound {segmentation_id} to {surface_id} as {representation_type:?} ({representation_id:?})"
        );

        if let Some(hydrated) = hydrate {
            store.set_hydrated(segmentation_id, hydrated)?;
        }
        Ok(representation_id)
    }

    /// Detach the listed representations from a surface, or all of them.
    pub fn unbind<E: RenderingEngine>(
        store: &mut SegmentationStore<E>,
        surface_id: &str,
        representation_ids: Option<&[RepresentationId]>,
    ) -> Vec<Representation> {
        let removed = store
            .engine_mut()
            .remove_representations(surface_id, representation_ids);
        if !removed.is_empty() {
            log::debug!("Unbound {} representations from {surface_id}", removed.len());
        }
        removed
    }

    /// Route every queued engine event to its inbound handler. Returns the
    /// number of events handled.
    pub fn dispatch_engine_events<E: RenderingEngine>(store: &mut SegmentationStore<E>) -> usize {
        let events = store.engine_mut().drain_events();
        let count = events.len();
        for event in events {
            match event {
                EngineEvent::SegmentationModified { segmentation_id } => {
                    Self::on_engine_modified(store, &segmentation_id);
                }
                EngineEvent::SegmentationDataModified {
                    segmentation_id,
                    touched_slices,
                } => {
                    Self::on_engine_data_modified(store, &segmentation_id, touched_slices);
                }
            }
        }
        count
    }

    /// Pull the engine's mirrored state for a segmentation into the store.
    /// The merge is not pushed back to the engine.
    pub fn on_engine_modified<E: RenderingEngine>(
        store: &mut SegmentationStore<E>,
        segmentation_id: &str,
    ) {
        let Some(state) = store.engine().segmentation(segmentation_id) else {
            log::warn!("Engine reported changes to {segmentation_id} but holds no state for it");
            return;
        };
        let Some(current) = store.segmentation(segmentation_id) else {
            log::warn!("Engine reported changes to unknown segmentation {segmentation_id}");
            return;
        };

        // Appearance is per surface; the first surface drawing the
        // segmentation stands in for the record.
        let primary = store
            .engine()
            .representations_of(segmentation_id)
            .into_iter()
            .next();

        let segments: Vec<Segment> = state
            .segments
            .values()
            .map(|engine_segment| {
                let index = engine_segment.segment_index;
                let mut segment = current
                    .segment(index)
                    .cloned()
                    .unwrap_or_else(|| Segment::new(index));
                segment.label.clone_from(&engine_segment.label);
                segment.is_locked = engine_segment.locked;

                if let Some((surface_id, representation)) = &primary {
                    let engine = store.engine();
                    if let Some(color) = engine.segment_color(surface_id, representation.id, index) {
                        segment.color = color;
                    }
                    if let Some(opacity) = engine.segment_opacity(surface_id, representation.id, index) {
                        segment.opacity = opacity;
                    }
                    if let Some(visible) =
                        engine.segment_visibility(surface_id, representation.id, index)
                    {
                        segment.is_visible = visible;
                    }
                }
                segment
            })
            .collect();

        let patch = SegmentationPatch::new(segmentation_id)
            .label(state.label)
            .segments(segments)
            .active_segment_index(state.active_segment_index);

        if let Err(err) = store.add_or_update_segmentation(patch, false, false) {
            log::warn!("Could not absorb engine changes to {segmentation_id}: {err}");
        }
    }

    /// Forward a voxel/contour data change made inside the engine.
    pub fn on_engine_data_modified<E: RenderingEngine>(
        store: &mut SegmentationStore<E>,
        segmentation_id: &str,
        touched_slices: Vec<usize>,
    ) {
        if store.segmentation(segmentation_id).is_none() {
            log::warn!("Engine modified data of unknown segmentation {segmentation_id}");
            return;
        }
        store.emit(SegmentationEvent::SegmentationDataModified {
            segmentation_id: segmentation_id.to_owned(),
            touched_slices,
        });
    }
}
