//! Temporary per-segment emphasis.
//!
//! The animator is driven by the host's frame loop: start a highlight, then
//! call [`HighlightAnimator::tick`] once per frame until it returns `false`.

use std::collections::BTreeSet;

use web_time::{Duration, Instant};

use crate::config::normalize_fraction;
use crate::engine::{RenderingEngine, RepresentationId, SegmentStyleOverride};
use crate::enums::RepresentationType;
use crate::error::SegmentationError;
use crate::interpolator::Interpolator;
use crate::store::SegmentationStore;

#[derive(Debug, Clone)]
struct Highlight {
    segmentation_id: String,
    segment_index: u32,
    alpha: f32,
    hide_others: bool,
    start: Instant,
    duration: Duration,
    representation_type: RepresentationType,
    /// Global style value the curve starts from and returns to
    baseline: f32,
    targets: Vec<(String, RepresentationId)>,
    other_segments: Vec<u32>,
}

impl Highlight {
    fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        now.saturating_duration_since(self.start).as_secs_f32() / self.duration.as_secs_f32()
    }

    fn style_at(&self, progress: f32) -> SegmentStyleOverride {
        match self.representation_type {
            RepresentationType::Labelmap => SegmentStyleOverride {
                fill_alpha: Some(Interpolator::bell(progress, self.baseline, self.alpha)),
                outline_opacity: None,
            },
            RepresentationType::Contour => SegmentStyleOverride {
                fill_alpha: None,
                outline_opacity: Some(Interpolator::reverse_bell(
                    progress,
                    self.baseline,
                    self.alpha,
                )),
            },
        }
    }

    fn surfaces(&self) -> Vec<String> {
        let surfaces: BTreeSet<&String> = self.targets.iter().map(|(surface, _)| surface).collect();
        surfaces.into_iter().cloned().collect()
    }
}

const HIDDEN: SegmentStyleOverride = SegmentStyleOverride {
    fill_alpha: Some(0.0),
    outline_opacity: Some(0.0),
};

/// Runs at most one highlight at a time.
#[derive(Debug, Default)]
pub struct HighlightAnimator {
    current: Option<Highlight>,
}

impl HighlightAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// The segment being highlighted, if any.
    pub fn target(&self) -> Option<(&str, u32)> {
        self.current
            .as_ref()
            .map(|h| (h.segmentation_id.as_str(), h.segment_index))
    }

    /// Start highlighting a segment now. See [`Self::highlight_at`].
    pub fn highlight<E: RenderingEngine>(
        &mut self,
        store: &mut SegmentationStore<E>,
        segmentation_id: &str,
        segment_index: u32,
        alpha: f32,
        duration_ms: u64,
        hide_others: bool,
    ) -> Result<(), SegmentationError> {
        self.highlight_at(
            store,
            segmentation_id,
            segment_index,
            alpha,
            duration_ms,
            hide_others,
            Instant::now(),
        )
    }

    /// Start highlighting a segment on every surface it is drawn on,
    /// cancelling the highlight in flight.
    ///
    /// Labelmaps raise the segment's fill alpha from the global value toward
    /// `alpha` and back; contours lower the outline opacity by a factor of
    /// `alpha` and back. With `hide_others` every other segment is drawn
    /// fully transparent for the duration.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown segment, `InvalidArgument` for an alpha
    /// outside 0..=100, and `PreconditionFailed` if the segmentation is not
    /// drawn anywhere. The previous highlight is cancelled even on error.
    #[allow(clippy::too_many_arguments)]
    pub fn highlight_at<E: RenderingEngine>(
        &mut self,
        store: &mut SegmentationStore<E>,
        segmentation_id: &str,
        segment_index: u32,
        alpha: f32,
        duration_ms: u64,
        hide_others: bool,
        start: Instant,
    ) -> Result<(), SegmentationError> {
        self.cancel(store);

        let segmentation = store
            .segmentation(segmentation_id)
            .ok_or_else(|| SegmentationError::segmentation_not_found(segmentation_id))?;
        if segmentation.segment(segment_index).is_none() {
            return Err(SegmentationError::segment_not_found(segmentation_id, segment_index));
        }
        let alpha = normalize_fraction(alpha)?;
        let representation_type = segmentation.representation_type();
        let other_segments: Vec<u32> = segmentation
            .iter_segments()
            .map(|segment| segment.segment_index)
            .filter(|&index| index != segment_index)
            .collect();

        let targets: Vec<(String, RepresentationId)> = store
            .engine()
            .representations_of(segmentation_id)
            .into_iter()
            .map(|(surface_id, representation)| (surface_id, representation.id))
            .collect();
        if targets.is_empty() {
            return Err(SegmentationError::PreconditionFailed(format!(
                "segmentation {segmentation_id} is not drawn on any surface"
            )));
        }

        let style = store.configuration().style(representation_type);
        let baseline = match representation_type {
            RepresentationType::Labelmap => style.fill_alpha,
            RepresentationType::Contour => style.outline_opacity,
        };

        log::debug!("Highlighting segment {segment_index} of {segmentation_id} for {duration_ms} ms");
        self.current = Some(Highlight {
            segmentation_id: segmentation_id.to_owned(),
            segment_index,
            alpha,
            hide_others,
            start,
            duration: Duration::from_millis(duration_ms),
            representation_type,
            baseline,
            targets,
            other_segments,
        });
        self.tick(store, start);
        Ok(())
    }

    /// Advance the animation to `now`. Returns whether it is still running;
    /// on the frame it finishes every override it set is cleared.
    pub fn tick<E: RenderingEngine>(&mut self, store: &mut SegmentationStore<E>, now: Instant) -> bool {
        let Some(highlight) = &self.current else {
            return false;
        };
        let progress = highlight.progress(now);
        if progress >= 1.0 {
            self.cancel(store);
            return false;
        }

        let style = highlight.style_at(progress);
        let engine = store.engine_mut();
        for (surface_id, representation_id) in &highlight.targets {
            engine.set_segment_style_override(
                surface_id,
                *representation_id,
                highlight.segment_index,
                Some(style),
            );
            if highlight.hide_others {
                for &index in &highlight.other_segments {
                    engine.set_segment_style_override(
                        surface_id,
                        *representation_id,
                        index,
                        Some(HIDDEN),
                    );
                }
            }
        }
        engine.request_render(&highlight.surfaces());
        true
    }

    /// Stop the running highlight and hand every segment back to the global
    /// style.
    pub fn cancel<E: RenderingEngine>(&mut self, store: &mut SegmentationStore<E>) {
        let Some(highlight) = self.current.take() else {
            return;
        };
        let engine = store.engine_mut();
        for (surface_id, representation_id) in &highlight.targets {
            for index in std::iter::once(highlight.segment_index).chain(highlight.other_segments.iter().copied()) {
                engine.set_segment_style_override(surface_id, *representation_id, index, None);
            }
        }
        engine.request_render(&highlight.surfaces());
        log::debug!(
            "Cleared highlight of segment {} of {}",
            highlight.segment_index,
            highlight.segmentation_id
        );
    }
}
