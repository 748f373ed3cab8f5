use ndarray::Array2;
use segmentation_state::{
    HighlightAnimator, InMemoryEngine, LabelmapFrame, LabelmapSource, RepresentationBinder,
    RepresentationType, SegmentationLoader, SegmentationStore, SourceSegment, VolumeGeometry,
};
use web_time::{Duration, Instant};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let depth = 8;
    let image_ids: Vec<String> = (0..depth).map(|i| format!("ct-{i}")).collect();
    let mut engine = InMemoryEngine::new();
    engine.add_volume(
        "ct",
        VolumeGeometry::new((depth, 32, 32), (0.8, 0.8, 2.5), image_ids.clone()),
    );
    let mut store = SegmentationStore::new(engine);

    let frames = image_ids
        .iter()
        .enumerate()
        .flat_map(|(slice, image_id)| {
            let mut first = Array2::<u8>::zeros((32, 32));
            first.slice_mut(ndarray::s![4..12, 4..12]).fill(1);
            let mut second = Array2::<u8>::zeros((32, 32));
            second
                .slice_mut(ndarray::s![16..16 + slice + 1, 16..28])
                .fill(1);
            [
                LabelmapFrame {
                    referenced_image_id: image_id.clone(),
                    segment_index: 1,
                    pixels: first,
                },
                LabelmapFrame {
                    referenced_image_id: image_id.clone(),
                    segment_index: 2,
                    pixels: second,
                },
            ]
        })
        .collect();
    let mut source = LabelmapSource {
        segmentation_id: None,
        label: "Abdomen".to_owned(),
        reference_volume_id: "ct".to_owned(),
        segments: vec![
            SourceSegment::new(1, "Liver"),
            SourceSegment::new(2, "Spleen"),
        ],
        frames,
        is_loaded: false,
    };

    let id = SegmentationLoader::load_labelmap(&mut store, &mut source)
        .await
        .expect("should have imported the labelmap");
    RepresentationBinder::bind(&mut store, "axial", &id, RepresentationType::Labelmap, Some(true))
        .expect("should have bound the segmentation");
    store
        .set_active_segmentation_for_surface(&id, "axial")
        .expect("should have activated the segmentation");

    for segment in store
        .segmentation(&id)
        .expect("should have stored the segmentation")
        .iter_segments()
    {
        let center = store.segment_center(&id, segment.segment_index);
        println!("{} {}: center {center:?}", segment.segment_index, segment.label);
    }

    let mut animator = HighlightAnimator::new();
    let start = Instant::now();
    animator
        .highlight_at(&mut store, &id, 2, 0.9, 750, true, start)
        .expect("should have started the highlight");
    let mut frame = 0;
    while animator.tick(&mut store, start + Duration::from_millis(frame * 16)) {
        frame += 1;
    }
    println!(
        "Highlight finished after {frame} frames, {} overrides left",
        store.engine().style_override_count()
    );
}
