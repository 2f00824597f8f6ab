use glam::{DMat3, DMat4, DVec3};

use super::{CullingResult, Plane};

/// A box with arbitrary orientation, described by its center and three
/// half-axis vectors (the columns of `half_axes`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBoundingBox {
    pub center: DVec3,
    pub half_axes: DMat3,
}

impl OrientedBoundingBox {
    pub fn new(center: DVec3, half_axes: DMat3) -> Self {
        Self { center, half_axes }
    }

    /// Build a box from the 12-number `box` array of a tileset document:
    /// center followed by the x, y and z half-axis vectors.
    pub fn from_array(values: &[f64; 12]) -> Self {
        Self {
            center: DVec3::new(values[0], values[1], values[2]),
            half_axes: DMat3::from_cols(
                DVec3::new(values[3], values[4], values[5]),
                DVec3::new(values[6], values[7], values[8]),
                DVec3::new(values[9], values[10], values[11]),
            ),
        }
    }

    /// Axis-aligned box spanning `min..max`.
    pub fn from_min_max(min: DVec3, max: DVec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            half_axes: DMat3::from_diagonal((max - min) * 0.5),
        }
    }

    /// Classify the box against a plane.
    ///
    /// The half-axes are projected onto the plane normal to get the box's
    /// effective radius along that normal, which is compared with the
    /// signed distance of the center. A distance of exactly one radius
    /// counts as fully on that side, so a zero-sized box is never
    /// reported as intersecting.
    pub fn intersect_plane(&self, plane: &Plane) -> CullingResult {
        let normal = plane.normal;
        let rad_effective = self.half_axes.x_axis.dot(normal).abs()
            + self.half_axes.y_axis.dot(normal).abs()
            + self.half_axes.z_axis.dot(normal).abs();

        let distance_to_plane = plane.signed_distance(self.center);

        if distance_to_plane <= -rad_effective {
            CullingResult::Outside
        } else if distance_to_plane >= rad_effective {
            CullingResult::Inside
        } else {
            CullingResult::Intersecting
        }
    }

    /// Squared distance from `position` to the closest point of the box.
    /// Zero when the position is inside.
    pub fn distance_squared_to(&self, position: DVec3) -> f64 {
        let offset = position - self.center;
        let mut distance_squared = 0.0;

        for axis in [
            self.half_axes.x_axis,
            self.half_axes.y_axis,
            self.half_axes.z_axis,
        ] {
            let half_length = axis.length();
            // A collapsed axis has no direction to measure along.
            if half_length <= f64::EPSILON {
                continue;
            }
            let d = offset.dot(axis / half_length);
            if d < -half_length {
                let excess = d + half_length;
                distance_squared += excess * excess;
            } else if d > half_length {
                let excess = d - half_length;
                distance_squared += excess * excess;
            }
        }

        distance_squared
    }

    /// Apply an affine transform to the center and half-axes.
    pub fn transform(&self, matrix: &DMat4) -> Self {
        Self {
            center: matrix.transform_point3(self.center),
            half_axes: DMat3::from_mat4(*matrix) * self.half_axes,
        }
    }

    /// The eight corner points.
    pub fn corners(&self) -> [DVec3; 8] {
        let (x, y, z) = (
            self.half_axes.x_axis,
            self.half_axes.y_axis,
            self.half_axes.z_axis,
        );
        let c = self.center;
        [
            c - x - y - z,
            c + x - y - z,
            c - x + y - z,
            c + x + y - z,
            c - x - y + z,
            c + x - y + z,
            c - x + y + z,
            c + x + y + z,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Case {
        center: DVec3,
        axes: DMat3,
    }

    fn cases() -> Vec<Case> {
        let rotation = DMat3::from_axis_angle(DVec3::new(0.5, 1.5, -1.2).normalize(), 1.2);
        vec![
            // untransformed
            Case { center: DVec3::ZERO, axes: DMat3::IDENTITY },
            // off-center
            Case { center: DVec3::new(1.0, 0.0, 0.0), axes: DMat3::IDENTITY },
            Case { center: DVec3::new(0.7, -1.8, 12.0), axes: DMat3::IDENTITY },
            // rotated
            Case { center: DVec3::ZERO, axes: rotation },
            // scaled, including collapsed axes
            Case { center: DVec3::ZERO, axes: DMat3::from_diagonal(DVec3::new(1.5, 0.4, 20.6)) },
            Case { center: DVec3::ZERO, axes: DMat3::from_diagonal(DVec3::new(0.0, 0.4, 20.6)) },
            Case { center: DVec3::ZERO, axes: DMat3::from_diagonal(DVec3::new(1.5, 0.0, 20.6)) },
            Case { center: DVec3::ZERO, axes: DMat3::from_diagonal(DVec3::new(1.5, 0.4, 0.0)) },
            Case { center: DVec3::ZERO, axes: DMat3::ZERO },
            // arbitrary
            Case {
                center: DVec3::new(-5.1, 0.0, 0.1),
                axes: DMat3::from_diagonal(DVec3::new(1.5, 80.4, 2.6)) * rotation,
            },
        ]
    }

    /// Build the plane at `dist` from the center of the unit box in box-local
    /// space along `n`, then carry it through the case's axes. Returns `None`
    /// when the mapped plane is degenerate or passes through the origin.
    fn plane_in_box_space(case: &Case, n: DVec3, dist: f64) -> Option<Plane> {
        let arb = DVec3::new(357.0, 924.0, 258.0);
        let p0 = n.normalize() * -dist;
        let tangent = n.cross(arb).normalize();
        let binormal = n.cross(tangent).normalize();

        let p0 = case.axes * p0 + case.center;
        let tangent = case.axes * tangent;
        let binormal = case.axes * binormal;

        let normal = tangent.cross(binormal);
        if normal.length() == 0.0 {
            return None;
        }
        let normal = normal.normalize();
        let d = -p0.dot(normal);
        if d.abs() > 0.0001 && normal.dot(normal) > 0.0001 {
            Some(Plane::new(normal, d))
        } else {
            None
        }
    }

    fn check_directions(directions: &[DVec3], boundary: f64) {
        const EPS: f64 = 0.00001;
        let expectations = [
            (boundary + EPS, CullingResult::Inside),
            (boundary - EPS, CullingResult::Intersecting),
            (-boundary + EPS, CullingResult::Intersecting),
            (-boundary - EPS, CullingResult::Outside),
        ];

        for case in cases() {
            let obb = OrientedBoundingBox::new(case.center, case.axes * 0.5);
            for &n in directions {
                for (dist, expected) in expectations {
                    if let Some(plane) = plane_in_box_space(&case, n, dist) {
                        assert_eq!(
                            obb.intersect_plane(&plane),
                            expected,
                            "center {:?} axes {:?} normal {n:?} dist {dist}",
                            case.center,
                            case.axes
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn intersect_plane_faces() {
        let faces = [
            DVec3::X,
            DVec3::NEG_X,
            DVec3::Y,
            DVec3::NEG_Y,
            DVec3::Z,
            DVec3::NEG_Z,
        ];
        check_directions(&faces, 0.5);
    }

    #[test]
    fn intersect_plane_edges() {
        let mut edges = Vec::new();
        for a in [1.0, -1.0] {
            for b in [1.0, -1.0] {
                edges.push(DVec3::new(a, b, 0.0));
                edges.push(DVec3::new(a, 0.0, b));
                edges.push(DVec3::new(0.0, a, b));
            }
        }
        check_directions(&edges, 0.5_f64.sqrt());
    }

    #[test]
    fn intersect_plane_corners() {
        let mut corners = Vec::new();
        for x in [1.0, -1.0] {
            for y in [1.0, -1.0] {
                for z in [1.0, -1.0] {
                    corners.push(DVec3::new(x, y, z));
                }
            }
        }
        check_directions(&corners, 0.75_f64.sqrt());
    }

    #[test]
    fn degenerate_box_is_never_intersecting() {
        let obb = OrientedBoundingBox::new(DVec3::new(1.0, 2.0, 3.0), DMat3::ZERO);
        let front = Plane::from_point_normal(DVec3::ZERO, DVec3::X);
        let behind = Plane::from_point_normal(DVec3::new(5.0, 0.0, 0.0), DVec3::X);
        assert_eq!(obb.intersect_plane(&front), CullingResult::Inside);
        assert_eq!(obb.intersect_plane(&behind), CullingResult::Outside);
    }

    #[test]
    fn distance_squared_inside_is_zero() {
        let obb = OrientedBoundingBox::from_min_max(DVec3::splat(-1.0), DVec3::splat(1.0));
        assert_eq!(obb.distance_squared_to(DVec3::new(0.5, -0.5, 0.9)), 0.0);
    }

    #[test]
    fn distance_squared_outside() {
        let obb = OrientedBoundingBox::from_min_max(DVec3::splat(-1.0), DVec3::splat(1.0));
        // 3 units off one face
        assert!((obb.distance_squared_to(DVec3::new(4.0, 0.0, 0.0)) - 9.0).abs() < 1e-12);
        // off a corner: (1, 2, 2) beyond
        let d2 = obb.distance_squared_to(DVec3::new(2.0, 3.0, -3.0));
        assert!((d2 - 9.0).abs() < 1e-12);
    }

    #[test]
    fn distance_squared_rotated_box() {
        let rotation = DMat3::from_rotation_z(std::f64::consts::FRAC_PI_4);
        let obb = OrientedBoundingBox::new(DVec3::ZERO, rotation);
        // The x half-axis now points along (1, 1, 0)/sqrt(2) with length 1.
        let p = DVec3::new(1.0, 1.0, 0.0).normalize() * 3.0;
        assert!((obb.distance_squared_to(p) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn distance_squared_flat_box_does_not_produce_nan() {
        let obb = OrientedBoundingBox::new(
            DVec3::ZERO,
            DMat3::from_diagonal(DVec3::new(1.0, 1.0, 0.0)),
        );
        let d2 = obb.distance_squared_to(DVec3::new(3.0, 0.0, 10.0));
        assert!(d2.is_finite());
        assert!((d2 - 4.0).abs() < 1e-12);
    }

    #[test]
    fn from_array_layout() {
        let obb = OrientedBoundingBox::from_array(&[
            1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 6.0,
        ]);
        assert_eq!(obb.center, DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(obb.half_axes.x_axis, DVec3::new(4.0, 0.0, 0.0));
        assert_eq!(obb.half_axes.y_axis, DVec3::new(0.0, 5.0, 0.0));
        assert_eq!(obb.half_axes.z_axis, DVec3::new(0.0, 0.0, 6.0));
    }

    #[test]
    fn transform_translates_and_scales() {
        let obb = OrientedBoundingBox::from_min_max(DVec3::splat(-1.0), DVec3::splat(1.0));
        let m = DMat4::from_scale_rotation_translation(
            DVec3::splat(2.0),
            glam::DQuat::IDENTITY,
            DVec3::new(10.0, 0.0, 0.0),
        );
        let t = obb.transform(&m);
        assert_eq!(t.center, DVec3::new(10.0, 0.0, 0.0));
        assert_eq!(t.half_axes.x_axis, DVec3::new(2.0, 0.0, 0.0));
        assert_eq!(t.half_axes.z_axis, DVec3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn corners_are_at_half_axis_offsets() {
        let obb = OrientedBoundingBox::from_min_max(DVec3::ZERO, DVec3::splat(2.0));
        let corners = obb.corners();
        assert!(corners.contains(&DVec3::ZERO));
        assert!(corners.contains(&DVec3::splat(2.0)));
        assert!(corners.contains(&DVec3::new(2.0, 0.0, 2.0)));
    }
}
