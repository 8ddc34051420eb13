//! Run-level setup: array layout and telescope pointing.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pointing direction of one telescope.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopePointing {
    /// Raw azimuth [rad], N -> E.
    pub azimuth: f64,
    /// Raw altitude [rad].
    pub altitude: f64,
    /// Tracking-corrected (azimuth, altitude) [rad], preferred when set.
    pub corrected: Option<(f64, f64)>,
}

impl TelescopePointing {
    /// Pointing to use for reconstruction: corrected if available.
    #[inline]
    pub fn effective(&self) -> (f64, f64) {
        self.corrected.unwrap_or((self.azimuth, self.altitude))
    }
}

/// Array layout and per-run pointing configuration.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunSetup {
    /// Telescope positions [m] in the array frame (x north, y west, z up),
    /// in run sequence order.
    pub tel_positions: Vec<[f64; 3]>,
    /// Per-telescope pointing, in run sequence order.
    pub pointing: Vec<TelescopePointing>,
    /// Reference azimuth of the common frame [rad].
    pub reference_az: f64,
    /// Reference altitude of the common frame [rad].
    pub reference_alt: f64,
}

impl RunSetup {
    /// Number of telescopes in the run.
    #[inline]
    pub fn num_telescopes(&self) -> usize {
        self.tel_positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_pointing() {
        let mut p = TelescopePointing {
            azimuth: 1.0,
            altitude: 0.5,
            corrected: None,
        };
        assert_eq!(p.effective(), (1.0, 0.5));
        p.corrected = Some((1.01, 0.49));
        assert_eq!(p.effective(), (1.01, 0.49));
    }
}
