use std::collections::HashMap;

use glam::{Mat3, Vec3};
use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis, s};
use rayon::prelude::*;

/// Geometry of a reference image volume, as reported by the rendering engine.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGeometry {
    /// (depth, height, width)
    pub dimensions: (usize, usize, usize),
    /// (x, y, z) voxel spacing
    pub spacing: (f32, f32, f32),
    /// World position of voxel (0, 0, 0)
    pub origin: Vec3,
    /// Columns are the row direction, column direction and slice normal.
    pub direction: Mat3,
    /// Identity of the source image of every axial slice, in slice order.
    pub image_ids: Vec<String>,
}

impl VolumeGeometry {
    pub fn new(
        dimensions: (usize, usize, usize),
        spacing: (f32, f32, f32),
        image_ids: Vec<String>,
    ) -> Self {
        Self {
            dimensions,
            spacing,
            origin: Vec3::ZERO,
            direction: Mat3::IDENTITY,
            image_ids,
        }
    }

    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_direction(mut self, direction: Mat3) -> Self {
        self.direction = direction;
        self
    }

    /// In-plane shape of one slice (height, width)
    pub fn slice_dim(&self) -> (usize, usize) {
        (self.dimensions.1, self.dimensions.2)
    }

    /// Convert a continuous (x, y, z) = (column, row, slice) index into world
    /// coordinates.
    pub fn index_to_world(&self, index: Vec3) -> Vec3 {
        let (x_spacing, y_spacing, z_spacing) = self.spacing;
        let scaled = index * Vec3::new(x_spacing, y_spacing, z_spacing);
        self.origin + self.direction * scaled
    }

    /// Map every referenced image to its slice position.
    pub fn slice_lookup(&self) -> HashMap<&str, usize> {
        self.image_ids
            .iter()
            .enumerate()
            .map(|(position, image_id)| (image_id.as_str(), position))
            .collect()
    }
}

/// Per-voxel label volume derived from a reference volume. A voxel value is
/// the segment index it belongs to, 0 meaning unlabeled.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelmapVolume {
    pub volume_id: String,
    pub data: Array3<u16>,
    pub geometry: VolumeGeometry,
}

impl LabelmapVolume {
    /// Allocate an empty label volume matching `geometry`.
    pub fn derived(volume_id: impl Into<String>, geometry: &VolumeGeometry) -> Self {
        Self {
            volume_id: volume_id.into(),
            data: Array3::zeros(geometry.dimensions),
            geometry: geometry.clone(),
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<u16> {
        &mut self.data
    }

    pub fn get_slice(&self, index: usize) -> Option<ArrayView2<'_, u16>> {
        self.is_valid_index(index)
            .then(|| self.data.slice(s![index, .., ..]))
    }

    pub fn get_slice_mut(&mut self, index: usize) -> Option<ArrayViewMut2<'_, u16>> {
        if !self.is_valid_index(index) {
            return None;
        }
        Some(self.data.slice_mut(s![index, .., ..]))
    }

    /// Zero every voxel labeled `segment_index` and return the axial slices
    /// that changed, in ascending order.
    pub fn clear_segment(&mut self, segment_index: u16) -> Vec<usize> {
        if segment_index == 0 {
            return Vec::new();
        }
        self.data
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .filter_map(|(slice_index, mut slice)| {
                let mut touched = false;
                slice.map_inplace(|voxel| {
                    if *voxel == segment_index {
                        *voxel = 0;
                        touched = true;
                    }
                });
                touched.then_some(slice_index)
            })
            .collect()
    }

    /// Number of voxels labeled `segment_index`.
    pub fn voxel_count(&self, segment_index: u16) -> usize {
        self.data
            .par_iter()
            .filter(|&&voxel| voxel == segment_index)
            .count()
    }

    fn is_valid_index(&self, index: usize) -> bool {
        index < self.data.dim().0
    }
}
