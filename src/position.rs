//! Earth positions in ECEF and geodetic form
//!
//! [`Position`] always stores Earth-centered Earth-fixed (ECEF) coordinates.
//! Geodetic coordinates (WGS-84 latitude, longitude and ellipsoidal height) are
//! converted on demand.

use nalgebra::Vector3;

use crate::math::DEG_TO_RAD;

/// WGS-84 equatorial radius (m)
pub const EARTH_EQUATORIAL_RADIUS: f64 = 6_378_137.0;
/// WGS-84 first eccentricity
pub const EARTH_ECCENTRICITY: f64 = 0.081_819_190_842_5;

const POLAR_AXIS_TOLERANCE: f64 = 1e-9;

/// Geodetic coordinates on the WGS-84 ellipsoid
///
/// Angles are in radians and the height is in meters above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeodeticPosition {
    /// Latitude in radians, positive north
    pub latitude: f64,
    /// Longitude in radians, positive east
    pub longitude: f64,
    /// Height above the ellipsoid in meters
    pub height: f64,
}

impl GeodeticPosition {
    /// Create a geodetic position from angles in radians
    pub fn new(latitude: f64, longitude: f64, height: f64) -> Self {
        Self {
            latitude,
            longitude,
            height,
        }
    }

    /// Create a geodetic position from angles in degrees
    pub fn from_degrees(latitude: f64, longitude: f64, height: f64) -> Self {
        Self::new(latitude * DEG_TO_RAD, longitude * DEG_TO_RAD, height)
    }
}

/// Position of a body expressed in ECEF coordinates (m)
///
/// # Example
/// ```
/// use inertial_calibration::{GeodeticPosition, Position};
///
/// let geodetic = GeodeticPosition::from_degrees(41.3825, 2.1769, 120.0);
/// let position = Position::from_geodetic(geodetic);
/// let back = position.to_geodetic();
///
/// assert!((back.latitude - geodetic.latitude).abs() < 1e-9);
/// assert!((back.height - geodetic.height).abs() < 1e-4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    ecef: Vector3<f64>,
}

impl Position {
    /// Create a position from ECEF coordinates in meters
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self::from_ecef(Vector3::new(x, y, z))
    }

    /// Create a position from an ECEF vector in meters
    pub fn from_ecef(ecef: Vector3<f64>) -> Self {
        Self { ecef }
    }

    /// Convert geodetic coordinates to ECEF
    pub fn from_geodetic(geodetic: GeodeticPosition) -> Self {
        let (sin_lat, cos_lat) = geodetic.latitude.sin_cos();
        let (sin_lon, cos_lon) = geodetic.longitude.sin_cos();
        let e2 = EARTH_ECCENTRICITY * EARTH_ECCENTRICITY;

        // Transverse radius of curvature
        let r_e = EARTH_EQUATORIAL_RADIUS / (1.0 - e2 * sin_lat * sin_lat).sqrt();

        Self::new(
            (r_e + geodetic.height) * cos_lat * cos_lon,
            (r_e + geodetic.height) * cos_lat * sin_lon,
            ((1.0 - e2) * r_e + geodetic.height) * sin_lat,
        )
    }

    /// ECEF coordinates in meters
    pub fn ecef(&self) -> Vector3<f64> {
        self.ecef
    }

    pub fn x(&self) -> f64 {
        self.ecef.x
    }

    pub fn y(&self) -> f64 {
        self.ecef.y
    }

    pub fn z(&self) -> f64 {
        self.ecef.z
    }

    /// Convert to geodetic coordinates using the closed-form Heikkinen solution
    pub fn to_geodetic(&self) -> GeodeticPosition {
        let (x, y, z) = (self.ecef.x, self.ecef.y, self.ecef.z);
        let e2 = EARTH_ECCENTRICITY * EARTH_ECCENTRICITY;
        let sqrt_one_minus_e2 = (1.0 - e2).sqrt();
        let beta = x.hypot(y);
        let sign_z = z.signum();

        if beta < POLAR_AXIS_TOLERANCE {
            let polar_radius = EARTH_EQUATORIAL_RADIUS * sqrt_one_minus_e2;
            return GeodeticPosition::new(
                sign_z * core::f64::consts::FRAC_PI_2,
                0.0,
                z.abs() - polar_radius,
            );
        }

        let longitude = y.atan2(x);

        let k1 = sqrt_one_minus_e2 * z.abs();
        let k2 = e2 * EARTH_EQUATORIAL_RADIUS;
        let e = (k1 - k2) / beta;
        let f = (k1 + k2) / beta;

        let p = 4.0 / 3.0 * (e * f + 1.0);
        let q = 2.0 * (e * e - f * f);
        let d = p * p * p + q * q;
        let v = (d.sqrt() - q).cbrt() - (d.sqrt() + q).cbrt();
        let g = 0.5 * ((e * e + v).sqrt() + e);
        let t = (g * g + (f - v * g) / (2.0 * g - e)).sqrt() - g;

        let latitude = sign_z * ((1.0 - t * t) / (2.0 * t * sqrt_one_minus_e2)).atan();
        let height = (beta - EARTH_EQUATORIAL_RADIUS * t) * latitude.cos()
            + (z - sign_z * EARTH_EQUATORIAL_RADIUS * sqrt_one_minus_e2) * latitude.sin();

        GeodeticPosition::new(latitude, longitude, height)
    }
}

impl From<GeodeticPosition> for Position {
    fn from(geodetic: GeodeticPosition) -> Self {
        Self::from_geodetic(geodetic)
    }
}

impl From<Vector3<f64>> for Position {
    fn from(ecef: Vector3<f64>) -> Self {
        Self::from_ecef(ecef)
    }
}
