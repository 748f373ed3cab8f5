#![allow(dead_code)]

use segmentation_state::{InMemoryEngine, SegmentationEvent, SegmentationStore, VolumeGeometry};

pub const VOLUME_ID: &str = "ct";

/// `depth` slices of 4x4 voxels with unit spacing, images "img-0".."img-N".
pub fn geometry(depth: usize) -> VolumeGeometry {
    VolumeGeometry::new(
        (depth, 4, 4),
        (1.0, 1.0, 1.0),
        (0..depth).map(|i| format!("img-{i}")).collect(),
    )
}

pub fn store() -> SegmentationStore<InMemoryEngine> {
    let mut engine = InMemoryEngine::new();
    engine.add_volume(VOLUME_ID, geometry(3));
    SegmentationStore::new(engine)
}

pub fn drain(receiver: &mut futures::channel::mpsc::UnboundedReceiver<SegmentationEvent>) -> Vec<SegmentationEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = receiver.try_next() {
        events.push(event);
    }
    events
}
