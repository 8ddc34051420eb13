//! Per-run calibration constants, loaded once per run and read-only
//! during event processing.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::MAX_GAINS;

/// Per-pixel, per-gain calibration constants.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopeCalibration {
    /// Pedestal for the full trace length, per gain and pixel [ADC counts].
    pub pedestal: [Vec<f64>; MAX_GAINS],
    /// ADC-sum to mean-p.e. conversion factor, per gain and pixel.
    pub calib: [Vec<f64>; MAX_GAINS],
}

impl TelescopeCalibration {
    /// Uniform constants for `npix` pixels, mainly useful in tests and
    /// for idealized simulations.
    pub fn uniform(npix: usize, pedestal: f64, calib: f64) -> Self {
        Self {
            pedestal: [vec![pedestal; npix], vec![pedestal; npix]],
            calib: [vec![calib; npix], vec![calib; npix]],
        }
    }

    /// Pedestal per single sample for a trace of `num_samples` bins.
    #[inline]
    pub fn pedestal_per_sample(&self, igain: usize, ipix: usize, num_samples: usize) -> f64 {
        self.pedestal[igain][ipix] / num_samples as f64
    }
}

/// Reference single-p.e. pulse shape, fine-sampled, one per gain.
///
/// Used to evaluate which fraction of the full pulse area a finite
/// integration window captures.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReferencePulse {
    /// Fine-sampled shapes, one per gain channel.
    pub shapes: Vec<Vec<f64>>,
    /// Sampling step of the reference shapes [ns].
    pub step: f64,
    /// Width of one FADC time slice [ns].
    pub time_slice: f64,
}

impl ReferencePulse {
    /// True if a usable shape exists for the given gain.
    #[inline]
    pub fn has_shape(&self, igain: usize) -> bool {
        igain < self.shapes.len() && self.step > 0.0 && self.time_slice > 0.0
    }
}
