mod common;

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use common::{VOLUME_ID, store};
use glam::Vec3;
use segmentation_state::{
    ContourSet, HighlightAnimator, InMemoryEngine, RepresentationBinder, RepresentationId,
    RepresentationType, Segment, SegmentProperties, SegmentationError, SegmentationPatch,
    SegmentationStore,
};
use web_time::{Duration, Instant};

fn bound_labelmap() -> (SegmentationStore<InMemoryEngine>, String, RepresentationId) {
    let mut store = store();
    let id = store.create_empty_segmentation(VOLUME_ID, "S1").unwrap();
    for index in 1..=3 {
        store
            .add_segment(&id, index, None, SegmentProperties::new())
            .unwrap();
    }
    let representation =
        RepresentationBinder::bind(&mut store, "axial", &id, RepresentationType::Labelmap, None)
            .unwrap();
    (store, id, representation)
}

fn fill_alpha(
    store: &SegmentationStore<InMemoryEngine>,
    representation: RepresentationId,
    segment_index: u32,
) -> Option<f32> {
    store
        .engine()
        .segment_style_override("axial", representation, segment_index)
        .and_then(|style| style.fill_alpha)
}

#[test]
fn labelmap_fill_peaks_at_half_time_and_is_cleared_at_the_end() {
    let (mut store, id, representation) = bound_labelmap();
    let mut animator = HighlightAnimator::new();
    let start = Instant::now();

    animator
        .highlight_at(&mut store, &id, 1, 0.9, 800, false, start)
        .unwrap();
    assert_relative_eq!(fill_alpha(&store, representation, 1).unwrap(), 0.5);

    assert!(animator.tick(&mut store, start + Duration::from_millis(400)));
    assert_relative_eq!(
        fill_alpha(&store, representation, 1).unwrap(),
        0.9,
        epsilon = 1e-4
    );
    assert_eq!(fill_alpha(&store, representation, 2), None);

    assert!(!animator.tick(&mut store, start + Duration::from_millis(800)));
    assert!(!animator.is_running());
    assert_eq!(store.engine().style_override_count(), 0);
    assert!(!animator.tick(&mut store, start + Duration::from_millis(900)));
}

#[test]
fn new_highlight_cancels_the_previous_one() {
    let (mut store, id, representation) = bound_labelmap();
    let mut animator = HighlightAnimator::new();
    let start = Instant::now();

    animator
        .highlight_at(&mut store, &id, 1, 0.9, 750, true, start)
        .unwrap();
    animator.tick(&mut store, start + Duration::from_millis(100));
    let partial = fill_alpha(&store, representation, 1).unwrap();
    assert!(partial > 0.5 && partial < 0.9);
    assert_eq!(fill_alpha(&store, representation, 2), Some(0.0));

    let restart = start + Duration::from_millis(100);
    animator
        .highlight_at(&mut store, &id, 2, 0.9, 750, true, restart)
        .unwrap();

    assert_eq!(animator.target(), Some((id.as_str(), 2)));
    // Segment 1 is now merely hidden by the new highlight.
    assert_eq!(fill_alpha(&store, representation, 1), Some(0.0));

    animator.tick(&mut store, restart + Duration::from_millis(375));
    assert_relative_eq!(
        fill_alpha(&store, representation, 2).unwrap(),
        0.9,
        epsilon = 1e-4
    );

    assert!(!animator.tick(&mut store, restart + Duration::from_millis(750)));
    assert_eq!(store.engine().style_override_count(), 0);
}

#[test]
fn cancelling_without_hiding_leaves_no_overrides() {
    let (mut store, id, representation) = bound_labelmap();
    let mut animator = HighlightAnimator::new();

    animator.highlight(&mut store, &id, 3, 0.8, 10_000, false).unwrap();
    assert!(fill_alpha(&store, representation, 3).is_some());

    animator.cancel(&mut store);

    assert!(!animator.is_running());
    assert_eq!(store.engine().style_override_count(), 0);
}

#[test]
fn contour_highlight_dims_the_outline() {
    let mut store = store();
    let sets = BTreeMap::from([(
        1,
        ContourSet::new(
            "rt-1",
            1,
            vec![vec![Vec3::ZERO, Vec3::X, Vec3::Y]],
        ),
    )]);
    let id = store
        .add_or_update_segmentation(
            SegmentationPatch::new("rt")
                .contours(sets)
                .segments([Segment::new(1)]),
            false,
            true,
        )
        .unwrap();
    let representation =
        RepresentationBinder::bind(&mut store, "axial", &id, RepresentationType::Contour, None)
            .unwrap();
    let mut animator = HighlightAnimator::new();
    let start = Instant::now();

    animator
        .highlight_at(&mut store, &id, 1, 0.9, 1000, false, start)
        .unwrap();
    animator.tick(&mut store, start + Duration::from_millis(500));

    let style = store
        .engine()
        .segment_style_override("axial", representation, 1)
        .unwrap();
    assert_eq!(style.fill_alpha, None);
    assert_relative_eq!(style.outline_opacity.unwrap(), 0.1, epsilon = 1e-4);
}

#[test]
fn highlight_needs_a_drawn_existing_segment() {
    let mut store = store();
    let id = store.create_empty_segmentation(VOLUME_ID, "S1").unwrap();
    store
        .add_segment(&id, 1, None, SegmentProperties::new())
        .unwrap();
    let mut animator = HighlightAnimator::new();

    assert!(matches!(
        animator.highlight(&mut store, &id, 1, 0.9, 500, false),
        Err(SegmentationError::PreconditionFailed(_))
    ));
    assert!(matches!(
        animator.highlight(&mut store, &id, 4, 0.9, 500, false),
        Err(SegmentationError::NotFound { .. })
    ));
    assert!(!animator.is_running());
}

#[test]
fn each_surface_is_rendered_once_per_frame() {
    let (mut store, id, _) = bound_labelmap();
    RepresentationBinder::bind(&mut store, "coronal", &id, RepresentationType::Labelmap, None)
        .unwrap();
    let mut animator = HighlightAnimator::new();
    let start = Instant::now();

    animator
        .highlight_at(&mut store, &id, 2, 0.9, 500, false, start)
        .unwrap();

    assert_eq!(
        store.engine().render_requests().last(),
        Some(&vec!["axial".to_owned(), "coronal".to_owned()])
    );
}
