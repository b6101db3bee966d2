// Screen geometry
// Conversions between visual angle (degrees) and on-screen size (pixels)

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Viewing distance must be positive, got {0} cm")]
    InvalidViewingDistance(f64),

    #[error("Screen size must be positive, got {0} x {1} cm")]
    InvalidScreenSize(f64, f64),

    #[error("Screen resolution must be positive, got {0} x {1} px")]
    InvalidResolution(u32, u32),
}

/// Convert a visual angle into an on-screen size in pixels
///
/// The size is measured from the line of sight to one side of the angle:
/// `tan(angle) * distance * pixels_per_cm`.
pub fn deg_to_pix(viewing_distance_cm: f64, angle_deg: f64, pixels_per_cm: f64) -> f64 {
    let size_cm = angle_deg.to_radians().tan() * viewing_distance_cm;
    size_cm * pixels_per_cm
}

/// Convert an on-screen size in pixels into a visual angle in degrees
///
/// Uses the symmetric half-angle form `2 * atan(size / (2 * distance))`.
/// This is not the exact algebraic inverse of [`deg_to_pix`]: the two agree
/// to within `angle^2 / 4` (relative) which is well below tracker accuracy
/// for the small angles used as detection thresholds.
pub fn pix_to_deg(viewing_distance_cm: f64, size_px: f64, pixels_per_cm: f64) -> f64 {
    let size_cm = size_px / pixels_per_cm;
    2.0 * (size_cm / (2.0 * viewing_distance_cm)).atan().to_degrees()
}

/// Physical description of the display and the participant's position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenGeometry {
    /// Display resolution in pixels (width, height)
    pub resolution_px: (u32, u32),

    /// Physical size of the visible display area in centimeters (width, height)
    pub size_cm: (f64, f64),

    /// Distance between the participant's eyes and the screen in centimeters
    pub viewing_distance_cm: f64,
}

impl ScreenGeometry {
    /// Create a validated geometry
    pub fn new(
        resolution_px: (u32, u32),
        size_cm: (f64, f64),
        viewing_distance_cm: f64,
    ) -> Result<Self, GeometryError> {
        let geometry = ScreenGeometry {
            resolution_px,
            size_cm,
            viewing_distance_cm,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Reject non-physical values
    pub fn validate(&self) -> Result<(), GeometryError> {
        if !(self.viewing_distance_cm.is_finite() && self.viewing_distance_cm > 0.0) {
            return Err(GeometryError::InvalidViewingDistance(self.viewing_distance_cm));
        }
        let (w_cm, h_cm) = self.size_cm;
        if !(w_cm.is_finite() && h_cm.is_finite() && w_cm > 0.0 && h_cm > 0.0) {
            return Err(GeometryError::InvalidScreenSize(w_cm, h_cm));
        }
        let (w_px, h_px) = self.resolution_px;
        if w_px == 0 || h_px == 0 {
            return Err(GeometryError::InvalidResolution(w_px, h_px));
        }
        Ok(())
    }

    /// Pixel density, averaged over both axes
    pub fn pixels_per_cm(&self) -> f64 {
        let (w_px, h_px) = self.resolution_px;
        let (w_cm, h_cm) = self.size_cm;
        (w_px as f64 / w_cm + h_px as f64 / h_cm) / 2.0
    }

    /// Screen center in pixels
    pub fn center(&self) -> (f64, f64) {
        (
            self.resolution_px.0 as f64 / 2.0,
            self.resolution_px.1 as f64 / 2.0,
        )
    }

    pub fn deg_to_pix(&self, angle_deg: f64) -> f64 {
        deg_to_pix(self.viewing_distance_cm, angle_deg, self.pixels_per_cm())
    }

    pub fn pix_to_deg(&self, size_px: f64) -> f64 {
        pix_to_deg(self.viewing_distance_cm, size_px, self.pixels_per_cm())
    }
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        // 1024x768 display, 39.9 x 29.9 cm, viewed from 57 cm
        ScreenGeometry {
            resolution_px: (1024, 768),
            size_cm: (39.9, 29.9),
            viewing_distance_cm: 57.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_deg_to_pix_known_value() {
        // 45 degrees at 10 cm is 10 cm on screen
        let px = deg_to_pix(10.0, 45.0, 20.0);
        assert!((px - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_angle() {
        assert_eq!(deg_to_pix(57.0, 0.0, 25.0), 0.0);
        assert_eq!(pix_to_deg(57.0, 0.0, 25.0), 0.0);
    }

    #[test]
    fn test_pixels_per_cm_averages_axes() {
        let geometry = ScreenGeometry::new((1000, 500), (50.0, 20.0), 60.0).unwrap();
        assert!((geometry.pixels_per_cm() - 22.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_physical_geometry() {
        assert_eq!(
            ScreenGeometry::new((1024, 768), (39.9, 29.9), 0.0),
            Err(GeometryError::InvalidViewingDistance(0.0))
        );
        assert!(ScreenGeometry::new((1024, 768), (39.9, 29.9), -5.0).is_err());
        assert!(ScreenGeometry::new((1024, 768), (0.0, 29.9), 57.0).is_err());
        assert!(ScreenGeometry::new((0, 768), (39.9, 29.9), 57.0).is_err());
        assert!(ScreenGeometry::new((1024, 768), (39.9, f64::NAN), 57.0).is_err());
    }

    #[test]
    fn test_default_geometry_is_valid() {
        let geometry = ScreenGeometry::default();
        assert!(geometry.validate().is_ok());
        assert_eq!(geometry.center(), (512.0, 384.0));
        // 1.5 degrees is roughly 38 px on the default setup
        let px = geometry.deg_to_pix(1.5);
        assert!(px > 37.0 && px < 40.0, "got {}", px);
    }

    proptest! {
        #[test]
        fn prop_degrees_round_trip(
            distance in 20.0f64..150.0,
            density in 10.0f64..80.0,
            angle in 0.01f64..3.0,
        ) {
            let px = deg_to_pix(distance, angle, density);
            let back = pix_to_deg(distance, px, density);
            let relative = (back - angle).abs() / angle;
            prop_assert!(relative < 1e-3, "angle {} came back as {}", angle, back);
        }

        #[test]
        fn prop_pixels_round_trip(
            distance in 20.0f64..150.0,
            density in 10.0f64..80.0,
            size in 0.5f64..100.0,
        ) {
            let deg = pix_to_deg(distance, size, density);
            prop_assume!(deg < 3.0);
            let back = deg_to_pix(distance, deg, density);
            let relative = (back - size).abs() / size;
            prop_assert!(relative < 1e-3, "size {} came back as {}", size, back);
        }
    }
}
