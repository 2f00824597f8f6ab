use std::f64::consts::TAU;

use glam::{DMat3, DVec3};

use super::ellipsoid::{cartographic_to_cartesian, east_north_up_to_fixed_frame};
use super::{CullingResult, OrientedBoundingBox, Plane};

/// Samples per side of the lon/lat grid used to fit the box.
const FIT_SAMPLES: usize = 5;

/// A geodetic rectangle (radians) extruded between two heights (metres)
/// on the WGS84 ellipsoid.
///
/// Culling and distance queries go through an oriented box fitted in the
/// east-north-up frame at the rectangle centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingRegion {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub minimum_height: f64,
    pub maximum_height: f64,
    bounding_box: OrientedBoundingBox,
}

impl BoundingRegion {
    pub fn new(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        minimum_height: f64,
        maximum_height: f64,
    ) -> Self {
        let bounding_box = fit_box(west, south, east, north, minimum_height, maximum_height);
        Self {
            west,
            south,
            east,
            north,
            minimum_height,
            maximum_height,
            bounding_box,
        }
    }

    /// Build a region from the 6-number `region` array of a tileset document:
    /// west, south, east, north, minimum height, maximum height.
    pub fn from_array(values: &[f64; 6]) -> Self {
        Self::new(values[0], values[1], values[2], values[3], values[4], values[5])
    }

    pub fn bounding_box(&self) -> &OrientedBoundingBox {
        &self.bounding_box
    }

    pub fn intersect_plane(&self, plane: &Plane) -> CullingResult {
        self.bounding_box.intersect_plane(plane)
    }

    pub fn distance_squared_to(&self, position: DVec3) -> f64 {
        self.bounding_box.distance_squared_to(position)
    }
}

fn fit_box(
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    minimum_height: f64,
    maximum_height: f64,
) -> OrientedBoundingBox {
    // Rectangles crossing the antimeridian have east < west.
    let east = if east < west { east + TAU } else { east };
    let center_lon = (west + east) * 0.5;
    let center_lat = (south + north) * 0.5;

    let enu_to_fixed = east_north_up_to_fixed_frame(center_lon, center_lat, 0.0);
    let fixed_to_enu = enu_to_fixed.inverse();

    let mut min = DVec3::splat(f64::INFINITY);
    let mut max = DVec3::splat(f64::NEG_INFINITY);
    let steps = (FIT_SAMPLES - 1) as f64;

    for i in 0..FIT_SAMPLES {
        let lon = west + (east - west) * i as f64 / steps;
        for j in 0..FIT_SAMPLES {
            let lat = south + (north - south) * j as f64 / steps;
            for height in [minimum_height, maximum_height] {
                let local = fixed_to_enu
                    .transform_point3(cartographic_to_cartesian(lon, lat, height));
                min = min.min(local);
                max = max.max(local);
            }
        }
    }

    let local_center = (min + max) * 0.5;
    let rotation = DMat3::from_mat4(enu_to_fixed);

    OrientedBoundingBox::new(
        enu_to_fixed.transform_point3(local_center),
        rotation * DMat3::from_diagonal((max - min) * 0.5),
    )
}
