//! Bounding volumes and the plane tests used for frustum culling.

pub mod bounding_volume;
pub mod ellipsoid;
pub mod oriented_box;
pub mod region;
pub mod sphere;

use glam::DVec3;

pub use bounding_volume::BoundingVolume;
pub use oriented_box::OrientedBoundingBox;
pub use region::BoundingRegion;
pub use sphere::BoundingSphere;

/// Which side of a plane (or culling volume) an object lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullingResult {
    /// Entirely on the side opposite the plane normal.
    Outside,
    /// Straddles the plane.
    Intersecting,
    /// Entirely on the side the plane normal points to.
    Inside,
}

/// A plane in Hessian normal form: `normal · p + distance = 0`.
///
/// Points with a positive signed distance are on the side the normal
/// points to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    /// Create a plane from a unit normal and a distance from the origin.
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Create the plane through `point` with the given unit normal.
    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Signed distance from `point` to the plane (positive = in front).
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}
