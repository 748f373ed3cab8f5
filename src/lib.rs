//! # Segmentation state library
//!
//! This crate owns the authoritative model of every region-of-interest
//! segmentation overlaid on a medical image volume and keeps it in sync with
//! a rendering engine's own mirrored copy.
//!
//! Segmentations come in two representations:
//!  - Labelmap: a label volume with the reference image's geometry where
//!    every voxel holds the index of the segment it belongs to (0 is
//!    background)
//!  - Contour: closed polylines per segment in world coordinates
//!
//! All state lives in a [`SegmentationStore`]. Every mutation goes through
//! it, is pushed to the [`RenderingEngine`] and published as a
//! [`SegmentationEvent`] to subscribers. Edits made inside the engine (an
//! interactive paint stroke, a rename from an in-viewport tool) come back
//! through the [`RepresentationBinder`] and are absorbed without being
//! pushed back out again.
//!
//! Bulk segmentation objects that were already decoded into per-slice masks
//! or per-structure contours are imported with the [`SegmentationLoader`].
//! The import yields to the async runtime between segments so a
//! single-threaded host keeps servicing its own events, and it commits all
//! or nothing.
//!
//! The [`InMemoryEngine`] implements the engine boundary without drawing
//! anything and is handy for headless hosts and tests.
//!
//! # Examples
//!
//! ## Importing a labelmap and drawing it on a surface
//!
//! ```no_run
//! # use segmentation_state::{
//! #     InMemoryEngine, LabelmapFrame, LabelmapSource, RepresentationBinder,
//! #     RepresentationType, SegmentationLoader, SegmentationStore, SourceSegment,
//! #     VolumeGeometry,
//! # };
//! # use ndarray::Array2;
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = InMemoryEngine::new();
//! engine.add_volume(
//!     "ct",
//!     VolumeGeometry::new((2, 4, 4), (1.0, 1.0, 2.5), vec!["img-0".into(), "img-1".into()]),
//! );
//! let mut store = SegmentationStore::new(engine);
//!
//! let mut source = LabelmapSource {
//!     segmentation_id: None,
//!     label: "Liver".into(),
//!     reference_volume_id: "ct".into(),
//!     segments: vec![SourceSegment::new(1, "Liver")],
//!     frames: vec![LabelmapFrame {
//!         referenced_image_id: "img-0".into(),
//!         segment_index: 1,
//!         pixels: Array2::ones((4, 4)),
//!     }],
//!     is_loaded: false,
//! };
//! let id = SegmentationLoader::load_labelmap(&mut store, &mut source).await?;
//! RepresentationBinder::bind(&mut store, "axial", &id, RepresentationType::Labelmap, Some(true))?;
//! store.set_active_segmentation_for_surface(&id, "axial")?;
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod color_lut;
pub mod config;
pub mod contour;
pub mod engine;
pub mod enums;
pub mod error;
pub mod events;
pub mod highlight;
mod interpolator;
pub mod memory_engine;
pub mod segmentation;
pub mod segmentation_loader;
pub mod store;
pub mod volume;

pub use binder::RepresentationBinder;
pub use color_lut::{ColorLut, ColorLutAllocator, Rgb, Rgba};
pub use config::{ConfigError, ConfigurationManager, RepresentationStyle, SegmentationConfig, StyleValue};
pub use contour::ContourSet;
pub use engine::{RenderingEngine, Representation, RepresentationId, SegmentStyleOverride};
pub use enums::RepresentationType;
pub use error::SegmentationError;
pub use events::{EventPublisher, SegmentationEvent};
pub use highlight::HighlightAnimator;
pub use memory_engine::InMemoryEngine;
pub use segmentation::{
    CachedStats, MAX_SEGMENT_INDEX, Segment, SegmentProperties, Segmentation, SegmentationPatch,
};
pub use segmentation_loader::{
    ContourImport, ContourSource, ContourStructure, ImportError, LabelmapFrame, LabelmapImport,
    LabelmapSource, PreparedImport, SegmentationLoader, SourceSegment,
};
pub use store::SegmentationStore;
pub use volume::{LabelmapVolume, VolumeGeometry};
