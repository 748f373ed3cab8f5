//! Bulk import of pre-parsed labelmap and contour objects.

mod common;

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use common::{VOLUME_ID, drain, store};
use glam::Vec3;
use ndarray::{Array2, s};
use segmentation_state::{
    ContourSource, ContourStructure, ImportError, LabelmapFrame, LabelmapSource,
    RepresentationType, SegmentProperties, SegmentationError, SegmentationEvent,
    SegmentationLoader, SegmentationPatch, SourceSegment,
};

/// Mask of the rows `rows` across the full width of a 4x4 slice.
fn rows_mask(rows: std::ops::Range<usize>) -> Array2<u8> {
    let mut pixels = Array2::<u8>::zeros((4, 4));
    pixels.slice_mut(s![rows, ..]).fill(1);
    pixels
}

fn frame(image: usize, segment_index: u32, pixels: Array2<u8>) -> LabelmapFrame {
    LabelmapFrame {
        referenced_image_id: format!("img-{image}"),
        segment_index,
        pixels,
    }
}

fn labelmap_source(frames: Vec<LabelmapFrame>) -> LabelmapSource {
    LabelmapSource {
        segmentation_id: Some("seg-object".to_owned()),
        label: "Imported".to_owned(),
        reference_volume_id: VOLUME_ID.to_owned(),
        segments: vec![
            SourceSegment::new(1, "Liver"),
            SourceSegment {
                segment_index: 2,
                label: "Spleen".to_owned(),
                color: Some([0, 128, 255]),
            },
        ],
        frames,
        is_loaded: false,
    }
}

fn square(z: f32, x: f32, y: f32) -> Vec<Vec3> {
    vec![
        Vec3::new(x, y, z),
        Vec3::new(x + 2.0, y, z),
        Vec3::new(x + 2.0, y + 2.0, z),
        Vec3::new(x, y + 2.0, z),
    ]
}

fn contour_source() -> ContourSource {
    ContourSource {
        segmentation_id: None,
        label: "RTSTRUCT".to_owned(),
        reference_volume_id: VOLUME_ID.to_owned(),
        structures: vec![
            ContourStructure {
                segment: SourceSegment::new(2, "PTV"),
                contours: vec![square(0.0, 10.0, 10.0)],
            },
            ContourStructure {
                segment: SourceSegment::new(1, "GTV"),
                contours: vec![square(0.0, 0.0, 0.0), square(1.0, 0.0, 0.0)],
            },
        ],
        is_loaded: false,
    }
}

#[tokio::test]
async fn disjoint_segments_do_not_overlap() {
    let mut store = store();
    let mut source = labelmap_source(vec![
        frame(0, 1, rows_mask(0..2)),
        frame(1, 2, rows_mask(2..4)),
    ]);

    let id = SegmentationLoader::load_labelmap(&mut store, &mut source)
        .await
        .unwrap();

    assert_eq!(id, "seg-object");
    assert!(source.is_loaded);
    let segmentation = store.segmentation(&id).unwrap();
    assert!(!segmentation.cached_stats().overlapping_segments);
    assert!(!segmentation.hydrated());
    assert_eq!(segmentation.segment_count(), 2);
    assert_eq!(segmentation.active_segment_index(), Some(1));
    assert_eq!(segmentation.segment(1).unwrap().label, "Liver");
    assert_eq!(segmentation.segment(2).unwrap().color, [0, 128, 255]);

    let labelmap = segmentation.labelmap().unwrap();
    assert_eq!(labelmap.voxel_count(1), 8);
    assert_eq!(labelmap.voxel_count(2), 8);
    assert_eq!(labelmap.data()[[0, 0, 0]], 1);
    assert_eq!(labelmap.data()[[1, 3, 3]], 2);
    assert_eq!(labelmap.data()[[2, 0, 0]], 0);
}

#[tokio::test]
async fn centroids_are_stored_in_world_space() {
    let mut store = store();
    let mut source = labelmap_source(vec![
        frame(0, 1, rows_mask(0..2)),
        frame(2, 2, rows_mask(3..4)),
    ]);

    let id = SegmentationLoader::load_labelmap(&mut store, &mut source)
        .await
        .unwrap();

    let first = store.segment_center(&id, 1).unwrap();
    assert_relative_eq!(first.x, 1.5);
    assert_relative_eq!(first.y, 0.5);
    assert_relative_eq!(first.z, 0.0);
    let second = store.segment_center(&id, 2).unwrap();
    assert_relative_eq!(second.x, 1.5);
    assert_relative_eq!(second.y, 3.0);
    assert_relative_eq!(second.z, 2.0);
}

#[tokio::test]
async fn overlapping_segments_are_flagged() {
    let mut store = store();
    let mut source = labelmap_source(vec![
        frame(0, 1, rows_mask(0..3)),
        frame(0, 2, rows_mask(2..4)),
    ]);

    let id = SegmentationLoader::load_labelmap(&mut store, &mut source)
        .await
        .unwrap();

    let segmentation = store.segmentation(&id).unwrap();
    assert!(segmentation.cached_stats().overlapping_segments);
    let labelmap = segmentation.labelmap().unwrap();
    // Higher segment indices are written last.
    assert_eq!(labelmap.data()[[0, 2, 0]], 2);
    assert_eq!(labelmap.voxel_count(1), 8);
}

#[tokio::test]
async fn contour_import_reports_monotonic_progress() {
    let mut store = store();
    let mut events = store.subscribe();
    let mut source = contour_source();

    let id = SegmentationLoader::load_contours(&mut store, &mut source)
        .await
        .unwrap();

    assert_eq!(
        drain(&mut events),
        vec![
            SegmentationEvent::SegmentLoadingComplete {
                segmentation_id: id.clone(),
                segment_index: 1,
                percent_complete: 50,
            },
            SegmentationEvent::SegmentLoadingComplete {
                segmentation_id: id.clone(),
                segment_index: 2,
                percent_complete: 100,
            },
            SegmentationEvent::SegmentationLoadingComplete {
                segmentation_id: id.clone(),
            },
            SegmentationEvent::SegmentationAdded {
                segmentation_id: id.clone(),
            },
        ]
    );
    assert!(source.is_loaded);
}

#[tokio::test]
async fn contour_import_builds_one_set_per_structure() {
    let mut store = store();
    let mut source = contour_source();

    let id = SegmentationLoader::load_contours(&mut store, &mut source)
        .await
        .unwrap();

    let segmentation = store.segmentation(&id).unwrap();
    assert_eq!(segmentation.representation_type(), RepresentationType::Contour);
    assert!(!segmentation.cached_stats().overlapping_segments);
    let sets = segmentation.contour_sets().unwrap();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[&1].contours.len(), 2);
    assert_eq!(sets[&2].geometry_id, format!("{id}-contour-2"));

    let center = store.segment_center(&id, 1).unwrap();
    assert_relative_eq!(center.x, 1.0);
    assert_relative_eq!(center.y, 1.0);
    assert_relative_eq!(center.z, 0.5);
}

#[tokio::test]
async fn missing_reference_volume_fails_before_any_work() {
    let mut store = store();
    let mut events = store.subscribe();
    let mut source = labelmap_source(vec![frame(0, 1, rows_mask(0..1))]);
    source.reference_volume_id = "mr".to_owned();

    let err = SegmentationLoader::load_labelmap(&mut store, &mut source)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ImportError::Segmentation(SegmentationError::NotFound { .. })
    ));
    assert!(drain(&mut events).is_empty());
    assert_eq!(store.segmentations().count(), 0);
    assert!(!source.is_loaded);
}

#[tokio::test]
async fn failing_segment_aborts_the_whole_import() {
    let mut store = store();
    let mut events = store.subscribe();
    let mut source = labelmap_source(vec![
        frame(0, 1, rows_mask(0..1)),
        LabelmapFrame {
            referenced_image_id: "not-in-volume".to_owned(),
            segment_index: 2,
            pixels: rows_mask(0..1),
        },
    ]);

    let err = SegmentationLoader::load_labelmap(&mut store, &mut source)
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::UnknownReferencedImage(ref id) if id == "not-in-volume"));
    assert_eq!(store.segmentations().count(), 0);
    assert_eq!(store.color_luts().live_count(), 0);
    assert!(!source.is_loaded);
    assert!(
        drain(&mut events)
            .iter()
            .all(|event| matches!(event, SegmentationEvent::SegmentLoadingComplete { .. }))
    );
}

#[tokio::test]
async fn frames_must_match_the_slice_shape() {
    let mut store = store();
    let mut source = labelmap_source(vec![frame(0, 1, Array2::ones((2, 4)))]);

    let err = SegmentationLoader::load_labelmap(&mut store, &mut source)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ImportError::InconsistentDimensions {
            expected: (4, 4),
            actual: (2, 4)
        }
    ));
    assert!(store.segmentation("seg-object").is_none());
}

#[tokio::test]
async fn invalid_declarations_are_rejected_up_front() {
    let mut store = store();
    let mut events = store.subscribe();

    let mut undeclared = labelmap_source(vec![frame(0, 7, rows_mask(0..1))]);
    assert!(matches!(
        SegmentationLoader::load_labelmap(&mut store, &mut undeclared).await,
        Err(ImportError::UnknownSegment(7))
    ));

    let mut background = labelmap_source(Vec::new());
    background.segments.push(SourceSegment::new(0, "Background"));
    assert!(matches!(
        SegmentationLoader::load_labelmap(&mut store, &mut background).await,
        Err(ImportError::Segmentation(SegmentationError::InvalidArgument(_)))
    ));

    let mut duplicated = contour_source();
    duplicated.structures[0].segment.segment_index = 1;
    assert!(matches!(
        SegmentationLoader::load_contours(&mut store, &mut duplicated).await,
        Err(ImportError::DuplicateSegment(1))
    ));

    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn importing_over_an_existing_id_is_rejected() {
    let mut store = store();
    let mut first = labelmap_source(vec![frame(0, 1, rows_mask(0..1))]);
    SegmentationLoader::load_labelmap(&mut store, &mut first)
        .await
        .unwrap();

    let mut second = labelmap_source(Vec::new());
    let err = SegmentationLoader::load_labelmap(&mut store, &mut second)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ImportError::Segmentation(SegmentationError::InvalidArgument(_))
    ));
    assert_eq!(store.segmentations().count(), 1);
}

#[tokio::test]
async fn import_yields_between_segments() {
    let mut store = store();
    let mut events = store.subscribe();
    let mut source = labelmap_source(vec![
        frame(0, 1, rows_mask(0..1)),
        frame(1, 2, rows_mask(1..2)),
        frame(2, 3, rows_mask(2..3)),
    ]);
    source.segments.push(SourceSegment::new(3, "Kidney"));

    let mut observed = Vec::new();
    let (result, ()) = tokio::join!(
        SegmentationLoader::load_labelmap(&mut store, &mut source),
        async {
            let mut progress = 0;
            for _ in 0..6 {
                progress += drain(&mut events)
                    .iter()
                    .filter(|event| matches!(event, SegmentationEvent::SegmentLoadingComplete { .. }))
                    .count();
                observed.push(progress);
                tokio::task::yield_now().await;
            }
        }
    );

    result.unwrap();
    assert!(observed.iter().any(|&seen| seen > 0 && seen < 3));
}

#[tokio::test]
async fn out_of_range_structure_index_is_rejected() {
    let mut store = store();
    let mut events = store.subscribe();
    let mut source = contour_source();
    source.structures[0].segment.segment_index = u32::MAX;

    let err = SegmentationLoader::load_contours(&mut store, &mut source)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ImportError::Segmentation(SegmentationError::InvalidArgument(_))
    ));
    assert_eq!(store.segmentations().count(), 0);
    assert_eq!(store.color_luts().live_count(), 0);
    assert!(drain(&mut events).is_empty());
    assert!(!source.is_loaded);
}

#[tokio::test]
async fn store_stays_usable_while_an_import_runs() {
    let mut store = store();
    let mut events = store.subscribe();
    let mut source = labelmap_source(vec![
        frame(0, 1, rows_mask(0..1)),
        frame(1, 2, rows_mask(1..2)),
        frame(2, 3, rows_mask(2..3)),
    ]);
    source.segments.push(SourceSegment::new(3, "Kidney"));

    let import = SegmentationLoader::prepare_labelmap(&mut store, &mut source).unwrap();
    let (prepared, progress_seen) = tokio::join!(import.run(), async {
        tokio::task::yield_now().await;
        let other = store.create_empty_segmentation(VOLUME_ID, "Manual").unwrap();
        store
            .add_segment(&other, 1, None, SegmentProperties::new())
            .unwrap();
        drain(&mut events)
            .iter()
            .filter(|event| matches!(event, SegmentationEvent::SegmentLoadingComplete { .. }))
            .count()
    });

    assert!(progress_seen < 3);
    let id = prepared.unwrap().commit(&mut store).unwrap();
    assert_eq!(id, "seg-object");
    assert_eq!(store.segmentations().count(), 2);
    assert!(source.is_loaded);
}

#[tokio::test]
async fn commit_fails_if_the_id_was_taken_meanwhile() {
    let mut store = store();
    let mut source = labelmap_source(vec![frame(0, 1, rows_mask(0..1))]);

    let import = SegmentationLoader::prepare_labelmap(&mut store, &mut source).unwrap();
    let prepared = import.run().await.unwrap();
    store
        .add_or_update_segmentation(
            SegmentationPatch::new("seg-object").contours(BTreeMap::new()),
            false,
            true,
        )
        .unwrap();

    let err = prepared.commit(&mut store).unwrap_err();

    assert!(matches!(
        err,
        ImportError::Segmentation(SegmentationError::InvalidArgument(_))
    ));
    assert_eq!(
        store.segmentation("seg-object").unwrap().representation_type(),
        RepresentationType::Contour
    );
    assert!(!source.is_loaded);
}
