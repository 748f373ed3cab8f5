use serde::{Deserialize, Serialize};

/// Geometry kind of a segmentation, and the kind of representation a surface
/// draws it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentationType {
    /// Per-voxel label volume.
    Labelmap,
    /// One set of closed planar contours per segment.
    Contour,
}

impl RepresentationType {
    pub const ALL: [RepresentationType; 2] =
        [RepresentationType::Labelmap, RepresentationType::Contour];
}
