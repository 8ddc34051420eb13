//! Per-telescope-type configuration for the reconstruction pipeline.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::MAX_GAINS;

/// Neighbor-distance thresholds, as ratios of the mean pixel size.
///
/// Tiers 0..2 are evaluated in increasing order and a pixel pair lands in
/// the innermost tier it satisfies; the extension tier is evaluated
/// independently with its own threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeighborConfig {
    /// Distance ratios for tiers 0..2; values <= 0 leave a tier unused.
    /// An unset tier 0 defaults to 1.2 (1.6 for square-pixel cameras,
    /// to include diagonal neighbors).
    pub ratios: [f64; 3],
    /// Independent wider extension tier; <= 0 disables it.
    pub extension_ratio: f64,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            ratios: [0.0, 0.0, 0.0],
            extension_ratio: 0.0,
        }
    }
}

impl NeighborConfig {
    /// Sets the immediate (tier 0) distance ratio.
    #[must_use]
    pub fn with_immediate_ratio(mut self, ratio: f64) -> Self {
        self.ratios[0] = ratio;
        self
    }

    /// Sets the extension-tier distance ratio.
    #[must_use]
    pub fn with_extension_ratio(mut self, ratio: f64) -> Self {
        self.extension_ratio = ratio;
        self
    }
}

/// Pulse integration strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegrationScheme {
    /// Fixed window at a configured offset from readout start.
    FixedWindow,
    /// Common window around the global peak of all significant pixels.
    GlobalPeak,
    /// Window around each pixel's own peak.
    LocalPeak,
    /// Window around the peak of the summed neighbor traces.
    NeighborPeak,
    /// Neighbor sum including the pixel itself at weight 3.
    NeighborPeakWeighted,
    /// Neighbor peak after upsampling and pole-zero pulse shaping.
    ShapedNeighborPeak,
}

impl IntegrationScheme {
    /// Maps the historical numeric selector (1..=7) to a scheme.
    ///
    /// Code 6 selected a gradient-fit scheme that is not part of this
    /// pipeline and is rejected.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::FixedWindow),
            2 => Ok(Self::GlobalPeak),
            3 => Ok(Self::LocalPeak),
            4 => Ok(Self::NeighborPeak),
            5 => Ok(Self::NeighborPeakWeighted),
            7 => Ok(Self::ShapedNeighborPeak),
            other => Err(Error::Config(format!(
                "unsupported integration scheme code {other}"
            ))),
        }
    }
}

/// Pulse shaping options for [`IntegrationScheme::ShapedNeighborPeak`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseShaping {
    /// Upsampling factor applied before shaping.
    pub upsample: usize,
    /// Differencing distance in upsampled bins.
    pub difference: usize,
    /// Pole coefficient of the single-pole-zero filter.
    pub pole: f64,
    /// Half-width of the peak-property integral, in upsampled bins;
    /// 0 selects the plain window sum around the shaped peak.
    pub peak_half_width: usize,
    /// Re-derive pixel timing (peak position, widths, rise time) from the
    /// shaped traces as a side effect.
    pub reevaluate_timing: bool,
}

impl Default for PulseShaping {
    fn default() -> Self {
        Self {
            upsample: 4,
            difference: 4,
            pole: 0.75,
            peak_half_width: 0,
            reevaluate_timing: false,
        }
    }
}

/// Pulse integration configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntegrationConfig {
    /// Selected strategy.
    pub scheme: IntegrationScheme,
    /// Number of samples summed up.
    pub window: usize,
    /// Offset: samples skipped from readout start (fixed window) or
    /// samples before the detected peak (peak-based schemes).
    pub offset: usize,
    /// Per-gain significance thresholds in ADC counts above pedestal.
    pub thresholds: [i32; MAX_GAINS],
    /// Skip the reference-pulse rescaling of narrow-window sums.
    pub no_rescale: bool,
    /// Shaping options for the shaped neighbor-peak scheme.
    pub shaping: PulseShaping,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            scheme: IntegrationScheme::FixedWindow,
            window: 8,
            offset: 2,
            thresholds: [8, 15],
            no_rescale: false,
            shaping: PulseShaping::default(),
        }
    }
}

impl IntegrationConfig {
    /// Sets the integration strategy.
    #[must_use]
    pub fn with_scheme(mut self, scheme: IntegrationScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets window width and offset.
    #[must_use]
    pub fn with_window(mut self, window: usize, offset: usize) -> Self {
        self.window = window;
        self.offset = offset;
        self
    }

    /// Sets the per-gain significance thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, high: i32, low: i32) -> Self {
        self.thresholds = [high, low];
        self
    }
}

/// Dual-threshold tailcut cleaning configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CleaningConfig {
    /// Lower tailcut threshold [p.e.].
    pub low: f64,
    /// Upper tailcut threshold [p.e.].
    pub high: f64,
    /// Rank of the pixel providing the reference amplitude for the
    /// top-N-fraction truncation; 0 disables the truncation.
    pub reference_rank: usize,
    /// Minimum fraction of the reference amplitude; <= 0 disables.
    pub min_fraction: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            low: 5.0,
            high: 10.0,
            reference_rank: 0,
            min_fraction: 0.0,
        }
    }
}

impl CleaningConfig {
    /// Sets the tailcut thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, low: f64, high: f64) -> Self {
        self.low = low;
        self.high = high;
        self
    }

    /// Enables top-N-fraction truncation.
    #[must_use]
    pub fn with_truncation(mut self, rank: usize, fraction: f64) -> Self {
        self.reference_rank = rank;
        self.min_fraction = fraction;
        self
    }
}

/// Restriction to one of the two gain channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChannelSelection {
    /// Use both channels with the per-pixel switch-over logic.
    #[default]
    Both,
    /// Ignore the low-gain channel.
    HighOnly,
    /// Ignore the high-gain channel.
    LowOnly,
}

/// Gain-channel switch-over thresholds.
///
/// The historical values (10000 / -1000 raw units) are tied to a specific
/// ADC bit depth, so they are configuration rather than literals.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GainSelection {
    /// Which channels participate at all.
    pub channel: ChannelSelection,
    /// Pedestal-subtracted high-gain sum above which low gain takes over.
    pub hg_saturation: f64,
    /// Pedestal-subtracted high-gain sum below which the value is
    /// implausible and low gain takes over.
    pub hg_negative: f64,
}

impl Default for GainSelection {
    fn default() -> Self {
        Self {
            channel: ChannelSelection::Both,
            hg_saturation: 10000.0,
            hg_negative: -1000.0,
        }
    }
}

/// Scale factor from mean p.e. units to units of the single-p.e. peak.
///
/// Depends on collection efficiency, the asymmetry of the single-p.e.
/// amplitude distribution and electronic noise; the default matches the
/// H.E.S.S. cameras.
pub const DEFAULT_CALIB_SCALE: f64 = 0.92;

/// Minimum image amplitude applied by the geometry stage when the
/// per-telescope value is unset.
pub const DEFAULT_MIN_AMP: f64 = 80.0;

/// All per-telescope-type parameters consumed by the pipeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopeTypeParams {
    /// Neighbor-distance tiers.
    pub neighbors: NeighborConfig,
    /// Pulse integration; `None` keeps the plain all-sample sums.
    pub integration: Option<IntegrationConfig>,
    /// Tailcut cleaning thresholds.
    pub cleaning: CleaningConfig,
    /// Gain channel selection and switch-over points.
    pub gain: GainSelection,
    /// Minimum usable image amplitude [p.e.]; <= 0 selects the default.
    pub min_amp: f64,
    /// Minimum usable image pixel count.
    pub min_pix: usize,
    /// Clip ceiling for calibrated amplitudes [p.e.]; <= 0 disables.
    pub clip_amp: f64,
    /// Single-p.e. peak-to-mean conversion; <= 0 selects the default.
    pub calib_scale: f64,
    /// Camera active-radius clipping angle [deg]; <= 0 disables.
    pub camera_clipping_deg: f64,
    /// Fraction of pixels randomly flagged broken; <= 0 disables.
    pub broken_pixels_fraction: f64,
    /// Reconstruction level: >= 3 re-cleans images before the geometry
    /// stage, >= 4 additionally re-evaluates total image intensities.
    pub reco_level: u8,
    /// Focal length override [m]; `None` uses the camera definition.
    pub focal_length: Option<f64>,
}

impl Default for TelescopeTypeParams {
    fn default() -> Self {
        Self {
            neighbors: NeighborConfig::default(),
            integration: None,
            cleaning: CleaningConfig::default(),
            gain: GainSelection::default(),
            min_amp: 0.0,
            min_pix: 2,
            clip_amp: 0.0,
            calib_scale: 0.0,
            camera_clipping_deg: 0.0,
            broken_pixels_fraction: 0.0,
            reco_level: 3,
            focal_length: None,
        }
    }
}

impl TelescopeTypeParams {
    /// Effective calibration scale, falling back to the built-in default.
    #[inline]
    pub fn effective_calib_scale(&self) -> f64 {
        if self.calib_scale > 0.0 {
            self.calib_scale
        } else {
            DEFAULT_CALIB_SCALE
        }
    }

    /// Effective minimum image amplitude for the geometry stage.
    #[inline]
    pub fn effective_min_amp(&self) -> f64 {
        if self.min_amp > 0.0 {
            self.min_amp
        } else {
            DEFAULT_MIN_AMP
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_codes() {
        assert_eq!(
            IntegrationScheme::from_code(1).unwrap(),
            IntegrationScheme::FixedWindow
        );
        assert_eq!(
            IntegrationScheme::from_code(5).unwrap(),
            IntegrationScheme::NeighborPeakWeighted
        );
        assert_eq!(
            IntegrationScheme::from_code(7).unwrap(),
            IntegrationScheme::ShapedNeighborPeak
        );
        assert!(IntegrationScheme::from_code(6).is_err());
        assert!(IntegrationScheme::from_code(0).is_err());
    }

    #[test]
    fn test_param_fallbacks() {
        let params = TelescopeTypeParams::default();
        assert!((params.effective_calib_scale() - DEFAULT_CALIB_SCALE).abs() < f64::EPSILON);
        assert!((params.effective_min_amp() - DEFAULT_MIN_AMP).abs() < f64::EPSILON);
    }
}
