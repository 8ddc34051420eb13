//! Second-moment image parameters and reconstructed shower parameters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Hillas-style second-moment parameters of one camera image.
///
/// Angles are stored in radians and positions in radians projected onto
/// the sky, i.e. already divided by the focal length.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageParameters {
    /// Validity flag.
    pub known: bool,
    /// Tag of the cleaning method/levels that produced this image.
    pub cut_id: u8,
    /// Number of pixels that survived cleaning.
    pub pixels: usize,
    /// Total image amplitude [peak p.e.].
    pub amplitude: f64,
    /// Centroid position in the camera [rad].
    pub x: f64,
    /// Centroid position in the camera [rad].
    pub y: f64,
    /// Orientation of the major axis [rad].
    pub phi: f64,
    /// Image length (major-axis RMS) [rad].
    pub l: f64,
    /// Image width (minor-axis RMS) [rad].
    pub w: f64,
    /// Third moment along the major axis, normalized.
    pub skewness: f64,
    /// Fourth moment along the major axis, normalized (excess kurtosis).
    pub kurtosis: f64,
    /// Number of pixels clipped at `clip_amp`.
    pub num_sat: usize,
    /// Clipping limit applied to pixel amplitudes [p.e.]; 0 = none.
    pub clip_amp: f64,
    /// Peak-time gradient along the major axis [slices/rad].
    pub tm_slope: f64,
    /// RMS residual of peak times around the linear fit [slices].
    pub tm_residual: f64,
    /// Mean pulse width at 50% of peak [slices].
    pub tm_width1: f64,
    /// Mean pulse width at 20% of peak [slices].
    pub tm_width2: f64,
    /// Mean rise time between 20% and 80% of peak [slices].
    pub tm_rise: f64,
}

impl ImageParameters {
    /// Marks the slot unused; keeps no stale values behind the flag.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Reconstructed shower direction and core position.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShowerParameters {
    /// Validity flag.
    pub known: bool,
    /// Which results are filled and whether errors are available:
    /// bit 0 direction, bit 1 direction error, bit 2 core position,
    /// bit 3 core error.
    pub result_bits: u8,
    /// Number of telescopes that triggered.
    pub num_trg: usize,
    /// Number of images used in the reconstruction.
    pub num_img: usize,
    /// IDs of the telescopes whose images were used.
    pub img_list: Vec<u16>,
    /// Shower azimuth [rad], N -> E.
    pub az: f64,
    /// Shower altitude [rad].
    pub alt: f64,
    /// Core position x (north) [m].
    pub xc: f64,
    /// Core position y (west) [m].
    pub yc: f64,
    /// Estimated direction error [rad]; 0 with fewer than 3 images.
    pub err_dir: f64,
    /// Estimated core position error [m]; 0 with fewer than 3 images.
    pub err_core: f64,
}

impl ShowerParameters {
    /// True if a direction was reconstructed.
    #[inline]
    pub fn has_direction(&self) -> bool {
        self.known && self.result_bits & 1 != 0
    }

    /// True if a core position was reconstructed.
    #[inline]
    pub fn has_core(&self) -> bool {
        self.known && self.result_bits & 4 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_bits() {
        let mut shower = ShowerParameters::default();
        assert!(!shower.has_direction());
        shower.known = true;
        shower.result_bits = 3;
        assert!(shower.has_direction());
        assert!(!shower.has_core());
        shower.result_bits = 15;
        assert!(shower.has_core());
    }

    #[test]
    fn test_image_clear() {
        let mut img = ImageParameters {
            known: true,
            amplitude: 120.0,
            ..Default::default()
        };
        img.clear();
        assert!(!img.known);
        assert_eq!(img.amplitude, 0.0);
    }
}
