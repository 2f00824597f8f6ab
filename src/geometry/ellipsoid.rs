use glam::{DMat4, DVec3, DVec4};

/// WGS84 semi-major axis in metres.
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 first eccentricity squared: e² = 2f - f²
const WGS84_E2: f64 = 2.0 * WGS84_F - WGS84_F * WGS84_F;

/// Convert geodetic (longitude, latitude, height) to Earth-centred,
/// Earth-fixed cartesian coordinates.
///
/// Inputs are in **radians** and metres, matching the `region` bounding
/// volume of a tileset document. Returns metres.
pub fn cartographic_to_cartesian(longitude: f64, latitude: f64, height: f64) -> DVec3 {
    let sin_lat = latitude.sin();
    let cos_lat = latitude.cos();
    let sin_lon = longitude.sin();
    let cos_lon = longitude.cos();

    // Radius of curvature in the prime vertical
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    DVec3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + height) * sin_lat,
    )
}

/// Build the East-North-Up frame at a geodetic point as a local-to-ECEF
/// transform: columns are east, north, up and the ECEF origin.
pub fn east_north_up_to_fixed_frame(longitude: f64, latitude: f64, height: f64) -> DMat4 {
    let sin_lon = longitude.sin();
    let cos_lon = longitude.cos();
    let sin_lat = latitude.sin();
    let cos_lat = latitude.cos();

    let east = DVec3::new(-sin_lon, cos_lon, 0.0);
    let north = DVec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    let up = DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
    let origin = cartographic_to_cartesian(longitude, latitude, height);

    DMat4::from_cols(
        east.extend(0.0),
        north.extend(0.0),
        up.extend(0.0),
        DVec4::new(origin.x, origin.y, origin.z, 1.0),
    )
}
