use glam::{DMat4, DVec3};

use super::{BoundingRegion, BoundingSphere, CullingResult, OrientedBoundingBox, Plane};

/// The spatial extent of a tile: one of the three 3D Tiles volume kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundingVolume {
    OrientedBox(OrientedBoundingBox),
    Region(BoundingRegion),
    Sphere(BoundingSphere),
}

impl BoundingVolume {
    pub fn intersect_plane(&self, plane: &Plane) -> CullingResult {
        match self {
            BoundingVolume::OrientedBox(obb) => obb.intersect_plane(plane),
            BoundingVolume::Region(region) => region.intersect_plane(plane),
            BoundingVolume::Sphere(sphere) => sphere.intersect_plane(plane),
        }
    }

    pub fn distance_squared_to(&self, position: DVec3) -> f64 {
        match self {
            BoundingVolume::OrientedBox(obb) => obb.distance_squared_to(position),
            BoundingVolume::Region(region) => region.distance_squared_to(position),
            BoundingVolume::Sphere(sphere) => sphere.distance_squared_to(position),
        }
    }

    /// Whether `position` lies inside (or on the boundary of) the volume.
    pub fn contains(&self, position: DVec3) -> bool {
        self.distance_squared_to(position) == 0.0
    }

    /// Apply an affine transform. Regions are geodetic and come back unchanged.
    pub fn transform(&self, matrix: &DMat4) -> BoundingVolume {
        match self {
            BoundingVolume::OrientedBox(obb) => BoundingVolume::OrientedBox(obb.transform(matrix)),
            BoundingVolume::Region(_) => *self,
            BoundingVolume::Sphere(sphere) => BoundingVolume::Sphere(sphere.transform(matrix)),
        }
    }

    /// Radius of a sphere around [`center`](Self::center) enclosing the volume.
    pub fn bounding_radius(&self) -> f64 {
        match self {
            BoundingVolume::OrientedBox(obb) => box_radius(obb),
            BoundingVolume::Region(region) => box_radius(region.bounding_box()),
            BoundingVolume::Sphere(sphere) => sphere.radius,
        }
    }

    pub fn center(&self) -> DVec3 {
        match self {
            BoundingVolume::OrientedBox(obb) => obb.center,
            BoundingVolume::Region(region) => region.bounding_box().center,
            BoundingVolume::Sphere(sphere) => sphere.center,
        }
    }
}

fn box_radius(obb: &OrientedBoundingBox) -> f64 {
    obb.corners()
        .iter()
        .map(|corner| corner.distance(obb.center))
        .fold(0.0, f64::max)
}

impl From<OrientedBoundingBox> for BoundingVolume {
    fn from(value: OrientedBoundingBox) -> Self {
        BoundingVolume::OrientedBox(value)
    }
}

impl From<BoundingRegion> for BoundingVolume {
    fn from(value: BoundingRegion) -> Self {
        BoundingVolume::Region(value)
    }
}

impl From<BoundingSphere> for BoundingVolume {
    fn from(value: BoundingSphere) -> Self {
        BoundingVolume::Sphere(value)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn region_is_invariant_under_transform() {
        let region = BoundingVolume::from(BoundingRegion::new(0.0, 0.0, 0.001, 0.001, 0.0, 10.0));
        let m = DMat4::from_translation(DVec3::new(1000.0, 0.0, 0.0));
        assert_eq!(region.transform(&m), region);
    }

    #[test]
    fn box_and_sphere_follow_transform() {
        let m = DMat4::from_translation(DVec3::new(0.0, 5.0, 0.0));
        let obb = BoundingVolume::from(OrientedBoundingBox::from_min_max(
            DVec3::splat(-1.0),
            DVec3::splat(1.0),
        ));
        let sphere = BoundingVolume::from(BoundingSphere::new(DVec3::ZERO, 1.0));
        assert_eq!(obb.transform(&m).center(), DVec3::new(0.0, 5.0, 0.0));
        assert_eq!(sphere.transform(&m).center(), DVec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn bounding_radius_encloses_box() {
        let obb = BoundingVolume::from(OrientedBoundingBox::from_min_max(
            DVec3::splat(-1.0),
            DVec3::splat(1.0),
        ));
        assert_relative_eq!(obb.bounding_radius(), 3f64.sqrt(), epsilon = 1e-12);
        let sphere = BoundingVolume::from(BoundingSphere::new(DVec3::ZERO, 4.0));
        assert_eq!(sphere.bounding_radius(), 4.0);
    }

    #[test]
    fn contains_point() {
        let sphere = BoundingVolume::from(BoundingSphere::new(DVec3::ZERO, 2.0));
        assert!(sphere.contains(DVec3::new(1.0, 1.0, 0.0)));
        assert!(!sphere.contains(DVec3::new(3.0, 0.0, 0.0)));
    }

    /// Small deterministic generator so the property checks need no extra crates.
    struct Lcg(u64);

    impl Lcg {
        fn next_f64(&mut self) -> f64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }

        fn range(&mut self, lo: f64, hi: f64) -> f64 {
            lo + (hi - lo) * self.next_f64()
        }

        fn unit_vector(&mut self) -> DVec3 {
            loop {
                let v = DVec3::new(
                    self.range(-1.0, 1.0),
                    self.range(-1.0, 1.0),
                    self.range(-1.0, 1.0),
                );
                let len = v.length();
                if len > 0.1 && len <= 1.0 {
                    return v / len;
                }
            }
        }
    }

    fn random_volumes(rng: &mut Lcg) -> Vec<(BoundingVolume, Vec<DVec3>)> {
        let center = DVec3::new(rng.range(-50.0, 50.0), rng.range(-50.0, 50.0), rng.range(-50.0, 50.0));
        let rotation = glam::DMat3::from_axis_angle(rng.unit_vector(), rng.range(0.0, 6.0));
        let extents = DVec3::new(rng.range(0.0, 5.0), rng.range(0.0, 5.0), rng.range(0.0, 5.0));
        let obb = OrientedBoundingBox::new(center, rotation * glam::DMat3::from_diagonal(extents));
        let radius = rng.range(0.0, 5.0);
        let sphere = BoundingSphere::new(center, radius);

        let mut sphere_points = Vec::new();
        for _ in 0..16 {
            sphere_points.push(center + rng.unit_vector() * radius);
        }

        vec![
            (BoundingVolume::from(obb), obb.corners().to_vec()),
            (BoundingVolume::from(sphere), sphere_points),
        ]
    }

    #[test]
    fn culling_never_contradicts_point_sides() {
        let mut rng = Lcg(0x5eed);
        for _ in 0..500 {
            for (volume, extreme_points) in random_volumes(&mut rng) {
                let normal = rng.unit_vector();
                let plane = Plane::new(normal, rng.range(-60.0, 60.0));
                let result = volume.intersect_plane(&plane);

                let all_positive = extreme_points
                    .iter()
                    .all(|p| plane.signed_distance(*p) > 1e-9);
                let all_negative = extreme_points
                    .iter()
                    .all(|p| plane.signed_distance(*p) < -1e-9);

                if result == CullingResult::Outside {
                    assert!(!extreme_points.iter().any(|p| plane.signed_distance(*p) > 1e-9));
                }
                if result == CullingResult::Inside {
                    assert!(!extreme_points.iter().any(|p| plane.signed_distance(*p) < -1e-9));
                }
                // Box corners are exact extremes, so the classification must match.
                if matches!(volume, BoundingVolume::OrientedBox(_)) {
                    if all_positive {
                        assert_ne!(result, CullingResult::Outside);
                    }
                    if all_negative {
                        assert_ne!(result, CullingResult::Inside);
                    }
                }
            }
        }
    }
}
