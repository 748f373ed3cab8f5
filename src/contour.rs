use glam::Vec3;

/// Closed planar polylines belonging to one segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContourSet {
    pub geometry_id: String,
    pub segment_index: u32,
    pub contours: Vec<Vec<Vec3>>,
}

impl ContourSet {
    pub fn new(geometry_id: impl Into<String>, segment_index: u32, contours: Vec<Vec<Vec3>>) -> Self {
        Self {
            geometry_id: geometry_id.into(),
            segment_index,
            contours,
        }
    }

    pub fn point_count(&self) -> usize {
        self.contours.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.point_count() == 0
    }

    /// Mean of all contour points, or `None` for an empty set.
    pub fn centroid(&self) -> Option<Vec3> {
        let count = self.point_count();
        if count == 0 {
            return None;
        }
        let sum = self
            .contours
            .iter()
            .flatten()
            .fold(Vec3::ZERO, |acc, point| acc + *point);
        Some(sum / count as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_averages_every_point() {
        let set = ContourSet::new(
            "g",
            1,
            vec![
                vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0)],
                vec![Vec3::new(2.0, 2.0, 4.0), Vec3::new(0.0, 2.0, 4.0)],
            ],
        );
        assert_eq!(set.centroid(), Some(Vec3::new(1.0, 1.0, 2.0)));
    }

    #[test]
    fn empty_set_has_no_centroid() {
        let set = ContourSet::new("g", 1, vec![vec![]]);
        assert!(set.is_empty());
        assert_eq!(set.centroid(), None);
    }
}
