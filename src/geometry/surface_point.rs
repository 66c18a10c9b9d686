//! Surface points with rectangular/spherical duality and covariance propagation.
//!
//! A [`SurfacePoint`] is stored canonically as body-fixed rectangular
//! coordinates (meters) plus an optional 3x3 rectangular covariance (m²).
//! The spherical form (planetocentric latitude, positive-east longitude,
//! local radius) and its covariance are derived on demand by applying the
//! analytic Jacobian of the coordinate transform:
//!
//! ```text
//! C_sph  = J⁻¹ · C_rect · J⁻ᵀ      J = ∂(x, y, z) / ∂(lat, lon, r)
//! C_rect = J   · C_sph  · Jᵀ
//! ```
//!
//! Spherical covariances are in radians² for latitude/longitude and m² for
//! radius. Converting angular sigmas to distances needs the target radii,
//! see [`SurfacePoint::set_radii`].

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::target::Radii;

use super::angle::Angle;

/// Values below this magnitude are reported as zero.
pub const ROUND_OFF_THRESHOLD: f64 = 1e-12;

/// Map round-off noise to an exact zero for display and comparisons.
pub fn round_off(value: f64) -> f64 {
    if value.abs() < ROUND_OFF_THRESHOLD {
        0.0
    } else {
        value
    }
}

/// A 3D ground location with optional covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfacePoint {
    /// Body-fixed X, Y, Z in meters.
    position: Vector3<f64>,
    /// Rectangular covariance (m²), symmetric.
    covariance: Option<Matrix3<f64>>,
    radii: Option<Radii>,
}

impl Default for SurfacePoint {
    fn default() -> Self {
        Self::from_rectangular(0.0, 0.0, 0.0)
    }
}

impl SurfacePoint {
    pub fn from_rectangular(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            covariance: None,
            radii: None,
        }
    }

    /// Build from latitude, longitude and local radius (meters).
    pub fn from_spherical(lat: Angle, lon: Angle, radius: f64) -> Self {
        Self {
            position: spherical_to_rectangular(lat, lon, radius),
            covariance: None,
            radii: None,
        }
    }

    /// Build from a position and the upper triangle of its rectangular covariance.
    pub fn from_covariance_upper(x: f64, y: f64, z: f64, upper: &[f64; 6]) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            covariance: Some(upper_to_matrix(upper)),
            radii: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Setters
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the position. Any covariance is cleared.
    pub fn set_rectangular(&mut self, x: f64, y: f64, z: f64) {
        self.position = Vector3::new(x, y, z);
        self.covariance = None;
    }

    /// Replace the position with a diagonal covariance built from sigmas (meters).
    pub fn set_rectangular_with_sigmas(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        x_sigma: f64,
        y_sigma: f64,
        z_sigma: f64,
    ) {
        self.position = Vector3::new(x, y, z);
        self.set_rectangular_sigmas(x_sigma, y_sigma, z_sigma);
    }

    /// Replace the position and the full rectangular covariance.
    pub fn set_rectangular_with_matrix(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        covariance: Matrix3<f64>,
    ) {
        self.position = Vector3::new(x, y, z);
        self.set_rectangular_matrix(covariance);
    }

    pub fn set_rectangular_sigmas(&mut self, x_sigma: f64, y_sigma: f64, z_sigma: f64) {
        let diag = Vector3::new(x_sigma * x_sigma, y_sigma * y_sigma, z_sigma * z_sigma);
        self.covariance = Some(Matrix3::from_diagonal(&diag));
    }

    /// Set the rectangular covariance (m²). The stored matrix is symmetrized.
    pub fn set_rectangular_matrix(&mut self, covariance: Matrix3<f64>) {
        self.covariance = Some(symmetrize(&covariance));
    }

    /// Set the rectangular covariance from its upper triangle
    /// `[xx, xy, xz, yy, yz, zz]`.
    pub fn set_rectangular_matrix_upper(&mut self, upper: &[f64; 6]) {
        self.covariance = Some(upper_to_matrix(upper));
    }

    /// Replace the position from its spherical form. Any covariance is cleared.
    pub fn set_spherical(&mut self, lat: Angle, lon: Angle, radius: f64) {
        self.position = spherical_to_rectangular(lat, lon, radius);
        self.covariance = None;
    }

    /// Replace the position from its spherical form with angular and radius sigmas.
    pub fn set_spherical_with_sigmas(
        &mut self,
        lat: Angle,
        lon: Angle,
        radius: f64,
        lat_sigma: Angle,
        lon_sigma: Angle,
        radius_sigma: f64,
    ) {
        self.position = spherical_to_rectangular(lat, lon, radius);
        self.set_spherical_sigmas(lat_sigma, lon_sigma, radius_sigma);
    }

    /// Replace the position from its spherical form with a spherical covariance
    /// (rad², rad², m²).
    pub fn set_spherical_with_matrix(
        &mut self,
        lat: Angle,
        lon: Angle,
        radius: f64,
        covariance: Matrix3<f64>,
    ) {
        self.position = spherical_to_rectangular(lat, lon, radius);
        self.set_spherical_matrix(covariance);
    }

    /// Set the covariance from a spherical matrix (rad², rad², m²),
    /// propagated into rectangular space at the current position.
    pub fn set_spherical_matrix(&mut self, covariance: Matrix3<f64>) {
        let j = self.spherical_jacobian();
        let rect = j * symmetrize(&covariance) * j.transpose();
        self.covariance = Some(symmetrize(&rect));
    }

    pub fn set_spherical_sigmas(&mut self, lat_sigma: Angle, lon_sigma: Angle, radius_sigma: f64) {
        let lat = lat_sigma.radians();
        let lon = lon_sigma.radians();
        let diag = Vector3::new(lat * lat, lon * lon, radius_sigma * radius_sigma);
        self.set_spherical_matrix(Matrix3::from_diagonal(&diag));
    }

    /// Set spherical sigmas given as ground distances (meters).
    ///
    /// Fails with `InvalidState` when radii were never set or when the point
    /// sits on a pole, where a longitude distance has no angular equivalent.
    pub fn set_spherical_sigmas_distance(
        &mut self,
        lat_sigma: f64,
        lon_sigma: f64,
        radius_sigma: f64,
    ) -> Result<()> {
        let radii = self.require_radii()?;
        let cos_lat = self.latitude().radians().cos();
        if cos_lat.abs() < ROUND_OFF_THRESHOLD {
            return Err(CoreError::InvalidState(
                "Longitude sigma cannot be set in meters at a pole".to_string(),
            ));
        }
        let lat_angle = Angle::from_radians(lat_sigma / radii.equatorial_a);
        let lon_angle = Angle::from_radians(lon_sigma / (radii.equatorial_a * cos_lat));
        self.set_spherical_sigmas(lat_angle, lon_angle, radius_sigma);
        Ok(())
    }

    pub fn set_radii(&mut self, radii: Radii) -> Result<()> {
        radii.validate()?;
        self.radii = Some(radii);
        Ok(())
    }

    pub fn with_radii(mut self, radii: Radii) -> Result<Self> {
        self.set_radii(radii)?;
        Ok(self)
    }

    pub fn clear_covariance(&mut self) {
        self.covariance = None;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rectangular queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn x(&self) -> f64 {
        self.position.x
    }

    pub fn y(&self) -> f64 {
        self.position.y
    }

    pub fn z(&self) -> f64 {
        self.position.z
    }

    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn radii(&self) -> Option<Radii> {
        self.radii
    }

    pub fn has_covariance(&self) -> bool {
        self.covariance.is_some()
    }

    /// All coordinates finite.
    pub fn is_valid(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
    }

    /// Rectangular covariance (m²) with a non-negative diagonal.
    pub fn rectangular_matrix(&self) -> Option<Matrix3<f64>> {
        self.covariance.map(|c| clamp_diagonal(symmetrize(&c)))
    }

    /// Upper triangle `[xx, xy, xz, yy, yz, zz]` of the rectangular covariance.
    pub fn covariance_upper(&self) -> Option<[f64; 6]> {
        self.rectangular_matrix().map(|c| matrix_to_upper(&c))
    }

    pub fn x_sigma(&self) -> Option<f64> {
        self.rectangular_matrix().map(|c| c[(0, 0)].sqrt())
    }

    pub fn y_sigma(&self) -> Option<f64> {
        self.rectangular_matrix().map(|c| c[(1, 1)].sqrt())
    }

    pub fn z_sigma(&self) -> Option<f64> {
        self.rectangular_matrix().map(|c| c[(2, 2)].sqrt())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Spherical queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Planetocentric latitude.
    pub fn latitude(&self) -> Angle {
        let (x, y, z) = (self.position.x, self.position.y, self.position.z);
        if x == 0.0 && y == 0.0 && z == 0.0 {
            return Angle::ZERO;
        }
        Angle::from_radians(z.atan2((x * x + y * y).sqrt()))
    }

    /// Positive-east longitude in `[0, 360)`. Zero when X = Y = 0.
    pub fn longitude(&self) -> Angle {
        let (x, y) = (self.position.x, self.position.y);
        if x == 0.0 && y == 0.0 {
            return Angle::ZERO;
        }
        Angle::from_radians(y.atan2(x)).positive_east_360()
    }

    /// Distance from the body center in meters.
    pub fn local_radius(&self) -> f64 {
        self.position.norm()
    }

    /// Spherical covariance (rad², rad², m²) with a non-negative diagonal.
    pub fn spherical_matrix(&self) -> Option<Matrix3<f64>> {
        let rect = self.covariance?;
        let j_inv = self.spherical_jacobian_inverse();
        let sph = j_inv * symmetrize(&rect) * j_inv.transpose();
        Some(clamp_diagonal(symmetrize(&sph)))
    }

    pub fn lat_sigma(&self) -> Option<Angle> {
        self.spherical_matrix().map(|c| Angle::from_radians(c[(0, 0)].sqrt()))
    }

    pub fn lon_sigma(&self) -> Option<Angle> {
        self.spherical_matrix().map(|c| Angle::from_radians(c[(1, 1)].sqrt()))
    }

    /// Radius sigma in meters.
    pub fn local_radius_sigma(&self) -> Option<f64> {
        self.spherical_matrix().map(|c| c[(2, 2)].sqrt())
    }

    /// Latitude sigma as a ground distance (meters).
    pub fn lat_sigma_distance(&self) -> Result<f64> {
        let radii = self.require_radii()?;
        let sigma = self.lat_sigma().ok_or_else(no_covariance)?;
        Ok(sigma.radians() * radii.equatorial_a)
    }

    /// Longitude sigma as a ground distance (meters).
    pub fn lon_sigma_distance(&self) -> Result<f64> {
        let radii = self.require_radii()?;
        let sigma = self.lon_sigma().ok_or_else(no_covariance)?;
        Ok(sigma.radians() * self.latitude().radians().cos() * radii.equatorial_a)
    }

    /// Radius sigma (meters). Same as [`Self::local_radius_sigma`] but fails
    /// without a covariance, for symmetry with the other distance sigmas.
    pub fn local_radius_sigma_distance(&self) -> Result<f64> {
        self.local_radius_sigma().ok_or_else(no_covariance)
    }

    /// Great-circle distance to `other` on a sphere whose radius is the mean
    /// equatorial radius, or the local radius when no radii are set.
    pub fn distance_to(&self, other: &SurfacePoint) -> f64 {
        let sphere_radius = match self.radii {
            Some(radii) => 0.5 * (radii.equatorial_a + radii.equatorial_b),
            None => self.local_radius(),
        };
        let (lat1, lon1) = (self.latitude().radians(), self.longitude().radians());
        let (lat2, lon2) = (other.latitude().radians(), other.longitude().radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();
        sphere_radius * c
    }

    fn require_radii(&self) -> Result<Radii> {
        self.radii.ok_or_else(|| {
            CoreError::InvalidState(
                "In order to use sigmas in meter units, the equatorial radius must be set with a call to set_radii"
                    .to_string(),
            )
        })
    }

    /// ∂(x, y, z) / ∂(lat, lon, r) at the current position.
    fn spherical_jacobian(&self) -> Matrix3<f64> {
        let lat = self.latitude().radians();
        let lon = self.longitude().radians();
        let r = self.local_radius();
        spherical_jacobian(lat, lon, r)
    }

    /// ∂(lat, lon, r) / ∂(x, y, z) at the current position.
    ///
    /// Rows that are undefined at the origin or on the polar axis are zero.
    fn spherical_jacobian_inverse(&self) -> Matrix3<f64> {
        let (x, y, z) = (self.position.x, self.position.y, self.position.z);
        let rho2 = x * x + y * y;
        let r2 = rho2 + z * z;
        let mut j = Matrix3::zeros();
        if r2 == 0.0 {
            return j;
        }
        let r = r2.sqrt();
        let rho = rho2.sqrt();
        if rho > 0.0 {
            j[(0, 0)] = -x * z / (r2 * rho);
            j[(0, 1)] = -y * z / (r2 * rho);
            j[(0, 2)] = rho / r2;
            j[(1, 0)] = -y / rho2;
            j[(1, 1)] = x / rho2;
        }
        j[(2, 0)] = x / r;
        j[(2, 1)] = y / r;
        j[(2, 2)] = z / r;
        j
    }
}

fn no_covariance() -> CoreError {
    CoreError::InvalidState("Surface point has no covariance matrix".to_string())
}

fn spherical_to_rectangular(lat: Angle, lon: Angle, radius: f64) -> Vector3<f64> {
    let (lat, lon) = (lat.radians(), lon.radians());
    Vector3::new(
        radius * lat.cos() * lon.cos(),
        radius * lat.cos() * lon.sin(),
        radius * lat.sin(),
    )
}

/// Jacobian of the spherical-to-rectangular transform.
#[rustfmt::skip]
pub fn spherical_jacobian(lat: f64, lon: f64, r: f64) -> Matrix3<f64> {
    let (slat, clat) = lat.sin_cos();
    let (slon, clon) = lon.sin_cos();
    Matrix3::new(
        -r * slat * clon, -r * clat * slon, clat * clon,
        -r * slat * slon, r * clat * clon, clat * slon,
        r * clat, 0.0, slat,
    )
}

fn symmetrize(m: &Matrix3<f64>) -> Matrix3<f64> {
    (m + m.transpose()) * 0.5
}

fn clamp_diagonal(mut m: Matrix3<f64>) -> Matrix3<f64> {
    for i in 0..3 {
        if m[(i, i)] < 0.0 {
            m[(i, i)] = 0.0;
        }
    }
    m
}

/// Expand `[xx, xy, xz, yy, yz, zz]` into a symmetric matrix.
#[rustfmt::skip]
pub fn upper_to_matrix(u: &[f64; 6]) -> Matrix3<f64> {
    Matrix3::new(
        u[0], u[1], u[2],
        u[1], u[3], u[4],
        u[2], u[4], u[5],
    )
}

pub fn matrix_to_upper(m: &Matrix3<f64>) -> [f64; 6] {
    [m[(0, 0)], m[(0, 1)], m[(0, 2)], m[(1, 1)], m[(1, 2)], m[(2, 2)]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_radii() -> Radii {
        Radii::biaxial(1000.0, 1000.0).unwrap()
    }

    fn reference_point() -> SurfacePoint {
        let mut p = SurfacePoint::from_rectangular(-424.024048, 734.4311949, 529.919264);
        p.set_rectangular_matrix(Matrix3::from_diagonal(&Vector3::new(100.0, 2500.0, 400.0)));
        p.set_radii(test_radii()).unwrap();
        p
    }

    #[test]
    fn test_rectangular_to_spherical() {
        let p = reference_point();
        assert_relative_eq!(p.latitude().degrees(), 32.0, epsilon = 1e-6);
        assert_relative_eq!(p.longitude().degrees(), 120.0, epsilon = 1e-6);
        assert_relative_eq!(p.local_radius(), 1000.0, epsilon = 1e-5);
    }

    #[test]
    fn test_spherical_to_rectangular() {
        let p = SurfacePoint::from_spherical(
            Angle::from_degrees(32.0),
            Angle::from_degrees(120.0),
            1000.0,
        );
        assert_relative_eq!(p.x(), -424.024048, epsilon = 1e-5);
        assert_relative_eq!(p.y(), 734.4311949, epsilon = 1e-5);
        assert_relative_eq!(p.z(), 529.919264, epsilon = 1e-5);
    }

    #[test]
    fn test_negative_longitude_reads_back_positive_east() {
        let p = SurfacePoint::from_spherical(
            Angle::from_degrees(10.0),
            Angle::from_degrees(-45.0),
            1000.0,
        );
        assert_relative_eq!(p.longitude().degrees(), 315.0, epsilon = 1e-9);
    }

    #[test]
    fn test_longitude_on_polar_axis_is_zero() {
        let p = SurfacePoint::from_rectangular(0.0, 0.0, 1000.0);
        assert_eq!(p.longitude().degrees(), 0.0);
        assert_relative_eq!(p.latitude().degrees(), 90.0, epsilon = 1e-12);
    }

    #[test]
    fn test_covariance_round_trip() {
        let mut original = SurfacePoint::from_rectangular(-424.024048, 734.4311949, 529.919264);
        let rect = Matrix3::new(100.0, 12.0, -7.0, 12.0, 2500.0, 30.0, -7.0, 30.0, 400.0);
        original.set_rectangular_matrix(rect);

        let sph = original.spherical_matrix().unwrap();
        let mut rebuilt = SurfacePoint::default();
        let (lat, lon) = (original.latitude(), original.longitude());
        rebuilt.set_spherical_with_matrix(lat, lon, original.local_radius(), sph);

        let back = rebuilt.rectangular_matrix().unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(
                    back[(i, j)],
                    rect[(i, j)],
                    max_relative = 1e-9,
                    epsilon = 1e-9
                );
            }
        }
    }

    #[test]
    fn test_spherical_matrix_is_symmetric_with_nonnegative_diagonal() {
        let p = reference_point();
        let sph = p.spherical_matrix().unwrap();
        assert_relative_eq!(sph, sph.transpose(), epsilon = 1e-18);
        for i in 0..3 {
            assert!(sph[(i, i)] >= 0.0);
        }
    }

    #[test]
    fn test_distance_sigmas_round_trip() {
        let mut p = SurfacePoint::from_spherical(
            Angle::from_degrees(32.0),
            Angle::from_degrees(120.0),
            1000.0,
        );
        p.set_radii(test_radii()).unwrap();
        p.set_spherical_sigmas_distance(10.0, 20.0, 30.0).unwrap();
        assert_relative_eq!(p.lat_sigma_distance().unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(p.lon_sigma_distance().unwrap(), 20.0, epsilon = 1e-9);
        assert_relative_eq!(p.local_radius_sigma().unwrap(), 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_angular_sigmas() {
        let mut p = SurfacePoint::default();
        p.set_spherical_with_sigmas(
            Angle::from_degrees(32.0),
            Angle::from_degrees(120.0),
            1000.0,
            Angle::from_degrees(1.64192315),
            Angle::from_degrees(1.78752107),
            38.4548873,
        );
        assert_relative_eq!(p.lat_sigma().unwrap().degrees(), 1.64192315, epsilon = 1e-9);
        assert_relative_eq!(p.lon_sigma().unwrap().degrees(), 1.78752107, epsilon = 1e-9);
        assert_relative_eq!(p.local_radius_sigma().unwrap(), 38.4548873, epsilon = 1e-9);
    }

    #[test]
    fn test_distance_sigma_without_radii_is_invalid_state() {
        let mut p = SurfacePoint::from_rectangular(100.0, 200.0, 300.0);
        assert!(matches!(
            p.set_spherical_sigmas_distance(1.0, 1.0, 1.0),
            Err(CoreError::InvalidState(_))
        ));
        p.set_rectangular_sigmas(1.0, 1.0, 1.0);
        assert!(matches!(p.lat_sigma_distance(), Err(CoreError::InvalidState(_))));
    }

    #[test]
    fn test_set_rectangular_clears_covariance() {
        let mut p = reference_point();
        assert!(p.has_covariance());
        p.set_rectangular(1.0, 2.0, 3.0);
        assert!(!p.has_covariance());
        assert!(p.lat_sigma().is_none());
    }

    #[test]
    fn test_upper_triangle_round_trip() {
        let upper = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(matrix_to_upper(&upper_to_matrix(&upper)), upper);
    }

    #[test]
    fn test_great_circle_distance() {
        let a = SurfacePoint::from_spherical(Angle::ZERO, Angle::ZERO, 1000.0);
        let b = SurfacePoint::from_spherical(Angle::ZERO, Angle::from_degrees(90.0), 1000.0);
        let expected = 1000.0 * std::f64::consts::FRAC_PI_2;
        assert_relative_eq!(a.distance_to(&b), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_great_circle_distance_uses_equatorial_radius() {
        let radii = Radii::biaxial(2000.0, 2000.0).unwrap();
        let a = SurfacePoint::from_spherical(Angle::ZERO, Angle::ZERO, 1000.0)
            .with_radii(radii)
            .unwrap();
        let b = SurfacePoint::from_spherical(Angle::ZERO, Angle::from_degrees(90.0), 1000.0)
            .with_radii(radii)
            .unwrap();
        let expected = 2000.0 * std::f64::consts::FRAC_PI_2;
        assert_relative_eq!(a.distance_to(&b), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_round_off() {
        assert_eq!(round_off(1e-13), 0.0);
        assert_eq!(round_off(-2.0), -2.0);
    }
}
