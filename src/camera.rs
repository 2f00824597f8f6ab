//! Viewer description used by the traversal: frustum planes and
//! screen-space error.

use glam::{DVec2, DVec3};

use crate::geometry::{BoundingVolume, CullingResult, Plane};

/// Lower bound on the eye-to-volume distance used for screen-space error.
const MINIMUM_DISTANCE: f64 = 1e-7;

/// The four side planes of a view frustum, all passing through the eye,
/// with normals pointing into the frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingVolume {
    pub left: Plane,
    pub right: Plane,
    pub bottom: Plane,
    pub top: Plane,
}

impl CullingVolume {
    pub fn planes(&self) -> [Plane; 4] {
        [self.left, self.right, self.bottom, self.top]
    }

    /// A volume is visible unless it is entirely outside one of the planes.
    pub fn is_visible(&self, volume: &BoundingVolume) -> bool {
        self.planes()
            .iter()
            .all(|plane| volume.intersect_plane(plane) != CullingResult::Outside)
    }
}

/// A perspective camera expressed in the tileset's coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: DVec3,
    direction: DVec3,
    up: DVec3,
    viewport_size: DVec2,
    horizontal_fov: f64,
    vertical_fov: f64,
    culling_volume: CullingVolume,
    sse_denominator: f64,
}

impl Camera {
    /// Create a camera. Field-of-view angles are full angles in radians;
    /// `direction` and `up` are normalized here.
    pub fn new(
        position: DVec3,
        direction: DVec3,
        up: DVec3,
        viewport_size: DVec2,
        horizontal_fov: f64,
        vertical_fov: f64,
    ) -> Self {
        let direction = direction.normalize();
        // Re-orthogonalize so a slightly skewed up vector still yields a
        // symmetric frustum.
        let right = direction.cross(up).normalize();
        let up = right.cross(direction);

        let culling_volume =
            build_culling_volume(position, direction, up, right, horizontal_fov, vertical_fov);

        Self {
            position,
            direction,
            up,
            viewport_size,
            horizontal_fov,
            vertical_fov,
            culling_volume,
            sse_denominator: 2.0 * (0.5 * vertical_fov).tan(),
        }
    }

    /// Camera at `position` looking at `target`.
    pub fn look_at(
        position: DVec3,
        target: DVec3,
        up: DVec3,
        viewport_size: DVec2,
        horizontal_fov: f64,
    ) -> Self {
        let aspect = viewport_size.x / viewport_size.y;
        Self::new(
            position,
            target - position,
            up,
            viewport_size,
            horizontal_fov,
            Self::vertical_fov_from_horizontal(horizontal_fov, aspect),
        )
    }

    /// Vertical field of view matching a horizontal one at the given
    /// width / height aspect ratio.
    pub fn vertical_fov_from_horizontal(horizontal_fov: f64, aspect_ratio: f64) -> f64 {
        ((horizontal_fov * 0.5).tan() / aspect_ratio).atan() * 2.0
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn direction(&self) -> DVec3 {
        self.direction
    }

    pub fn up(&self) -> DVec3 {
        self.up
    }

    pub fn viewport_size(&self) -> DVec2 {
        self.viewport_size
    }

    pub fn horizontal_fov(&self) -> f64 {
        self.horizontal_fov
    }

    pub fn vertical_fov(&self) -> f64 {
        self.vertical_fov
    }

    pub fn culling_volume(&self) -> &CullingVolume {
        &self.culling_volume
    }

    pub fn is_bounding_volume_visible(&self, volume: &BoundingVolume) -> bool {
        self.culling_volume.is_visible(volume)
    }

    pub fn distance_squared_to(&self, volume: &BoundingVolume) -> f64 {
        volume.distance_squared_to(self.position)
    }

    /// Pixels of error when geometry with `geometric_error` is drawn at
    /// `distance` from the eye.
    pub fn screen_space_error(&self, geometric_error: f64, distance: f64) -> f64 {
        let distance = distance.max(MINIMUM_DISTANCE);
        (geometric_error * self.viewport_size.y) / (distance * self.sse_denominator)
    }
}

fn build_culling_volume(
    position: DVec3,
    direction: DVec3,
    up: DVec3,
    right: DVec3,
    horizontal_fov: f64,
    vertical_fov: f64,
) -> CullingVolume {
    let (sin_h, cos_h) = (0.5 * horizontal_fov).sin_cos();
    let (sin_v, cos_v) = (0.5 * vertical_fov).sin_cos();

    let plane = |normal: DVec3| Plane::from_point_normal(position, normal.normalize());

    CullingVolume {
        left: plane(direction * sin_h + right * cos_h),
        right: plane(direction * sin_h - right * cos_h),
        bottom: plane(direction * sin_v + up * cos_v),
        top: plane(direction * sin_v - up * cos_v),
    }
}
