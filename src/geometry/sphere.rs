use glam::{DMat4, DVec3};

use super::{CullingResult, Plane};

/// A sphere given by center and radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Build a sphere from the 4-number `sphere` array of a tileset document.
    pub fn from_array(values: &[f64; 4]) -> Self {
        Self {
            center: DVec3::new(values[0], values[1], values[2]),
            radius: values[3],
        }
    }

    pub fn intersect_plane(&self, plane: &Plane) -> CullingResult {
        let distance_to_plane = plane.signed_distance(self.center);

        if distance_to_plane < -self.radius {
            CullingResult::Outside
        } else if distance_to_plane < self.radius {
            CullingResult::Intersecting
        } else {
            CullingResult::Inside
        }
    }

    pub fn distance_squared_to(&self, position: DVec3) -> f64 {
        let distance = (position.distance(self.center) - self.radius).max(0.0);
        distance * distance
    }

    /// Transform the center; the radius grows by the largest axis scale so
    /// the result still encloses the transformed sphere.
    pub fn transform(&self, matrix: &DMat4) -> Self {
        let uniform_scale = matrix
            .x_axis
            .truncate()
            .length()
            .max(matrix.y_axis.truncate().length())
            .max(matrix.z_axis.truncate().length());

        Self {
            center: matrix.transform_point3(self.center),
            radius: self.radius * uniform_scale,
        }
    }
}
