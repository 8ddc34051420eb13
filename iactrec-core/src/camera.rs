//! Camera geometry: pixel positions, sizes and shapes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pixel outline shape.
///
/// Matches the historical shape codes: 0 circular, 1 hexagonal (flat top),
/// 2 square, 3 hexagonal (pointy top). If a camera definition does not
/// carry an explicit shape it is inferred once from the angular
/// distribution of nearest-neighbor bearings and is immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PixelShape {
    /// Round pixels (e.g. bare PMT cathodes).
    Circular,
    /// Hexagonal, flat side up.
    HexFlat,
    /// Square pixels.
    Square,
    /// Hexagonal, corner up.
    HexPointy,
}

impl PixelShape {
    /// True for either hexagonal orientation.
    #[inline]
    pub fn is_hexagonal(self) -> bool {
        matches!(self, PixelShape::HexFlat | PixelShape::HexPointy)
    }
}

/// Effective and maximum camera radius in radians (unit focal length).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraRadius {
    /// 1.5 times the mean active-pixel distance from the camera center.
    pub effective: f64,
    /// Distance of the outermost active pixel.
    pub max: f64,
}

/// Per-telescope camera geometry, immutable after run start.
///
/// Pixel positions are in camera-plane units (meters in the focal plane;
/// dividing by `focal_length` converts to radians).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraGeometry {
    /// Telescope identifier (external ID, not the sequence index).
    pub tel_id: u16,
    /// Pixel center x positions.
    pub pixel_x: Vec<f64>,
    /// Pixel center y positions.
    pub pixel_y: Vec<f64>,
    /// Pixel flat-to-flat size (diameter for round pixels).
    pub size: Vec<f64>,
    /// Pixel active area.
    pub area: Vec<f64>,
    /// Focal length the positions are scaled to.
    pub focal_length: f64,
    /// Camera rotation angle [rad].
    pub cam_rot: f64,
    /// Pixel shape, if known from the configuration.
    pub shape: Option<PixelShape>,
}

impl CameraGeometry {
    /// Number of pixels in the camera.
    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.pixel_x.len()
    }

    /// Radial distance of a pixel center from the camera center.
    #[inline]
    pub fn pixel_r(&self, ipix: usize) -> f64 {
        self.pixel_x[ipix].hypot(self.pixel_y[ipix])
    }

    /// Determine the camera size in radians, ignoring disabled pixels.
    ///
    /// The effective radius (1.5 times the mean pixel distance) is what the
    /// shower geometry stage compares image centroids against; the maximum
    /// radius is the outermost active pixel.
    pub fn radius(&self, disabled: &[bool]) -> Result<CameraRadius> {
        let npix = self.num_pixels();
        if npix < 2 {
            return Err(Error::TooFewPixels {
                tel_id: self.tel_id,
                npix,
            });
        }
        let mut sum_r = 0.0;
        let mut max_r = 0.0_f64;
        let mut active = 0usize;
        for ipix in 0..npix {
            if disabled.get(ipix).copied().unwrap_or(false) {
                continue;
            }
            let r = self.pixel_r(ipix);
            sum_r += r;
            max_r = max_r.max(r);
            active += 1;
        }
        if active < 2 {
            return Err(Error::TooFewPixels {
                tel_id: self.tel_id,
                npix: active,
            });
        }
        Ok(CameraRadius {
            effective: 1.5 * sum_r / active as f64 / self.focal_length,
            max: max_r / self.focal_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line_camera(n: usize) -> CameraGeometry {
        CameraGeometry {
            tel_id: 1,
            pixel_x: (0..n).map(|i| i as f64 * 0.1).collect(),
            pixel_y: vec![0.0; n],
            size: vec![0.1; n],
            area: vec![0.01; n],
            focal_length: 1.0,
            cam_rot: 0.0,
            shape: Some(PixelShape::Square),
        }
    }

    #[test]
    fn test_radius_ignores_disabled() {
        let cam = line_camera(4);
        let all = cam.radius(&[false; 4]).unwrap();
        assert_relative_eq!(all.max, 0.3);
        // Disabling the outermost pixel shrinks both radii.
        let clipped = cam.radius(&[false, false, false, true]).unwrap();
        assert_relative_eq!(clipped.max, 0.2);
        assert!(clipped.effective < all.effective);
    }

    #[test]
    fn test_radius_too_few_pixels() {
        let cam = line_camera(4);
        assert!(cam.radius(&[true, true, true, false]).is_err());
    }
}
