//! Per-event telescope data: raw traces and sums, pixel timing,
//! calibrated pixels and array-level trigger bookkeeping.

use ndarray::{Array2, ArrayView1};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::image::{ImageParameters, ShowerParameters};
use crate::MAX_GAINS;

/// One gain channel of a camera readout.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GainChannel {
    /// Integrated ADC sum per pixel.
    pub sum: Vec<i32>,
    /// Whether the ADC value of a pixel is known.
    pub known: Vec<bool>,
    /// Time-sample traces (pixels x samples), if sample mode was read out.
    pub samples: Option<Array2<u16>>,
}

/// Raw camera data for one telescope in one event.
///
/// Allocated at run-header time and logically reset (not reallocated) at
/// the start of each new event.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawData {
    /// Telescope identifier.
    pub tel_id: u16,
    /// Number of pixels read out.
    pub num_pixels: usize,
    /// Samples per trace; <= 1 means sum-only mode.
    pub num_samples: usize,
    /// Gain channels, `HI_GAIN` first.
    pub gains: Vec<GainChannel>,
    /// Per-pixel significance flag.
    pub significant: Vec<bool>,
    /// Zero-suppressed sample mode: per-pixel sample significance.
    /// `None` when zero suppression does not apply.
    pub sample_significant: Option<Vec<bool>>,
    /// Overall validity flag.
    pub known: bool,
    /// Whether sample-mode traces were read out.
    pub has_samples: bool,
    /// Sparse readout pixel list, if the readout was list-based.
    pub pixel_list: Option<Vec<usize>>,
}

impl RawData {
    /// Creates sum-only raw data for `npix` pixels.
    pub fn new(tel_id: u16, npix: usize, num_gains: usize) -> Self {
        assert!(num_gains >= 1 && num_gains <= MAX_GAINS);
        Self {
            tel_id,
            num_pixels: npix,
            num_samples: 1,
            gains: (0..num_gains)
                .map(|_| GainChannel {
                    sum: vec![0; npix],
                    known: vec![false; npix],
                    samples: None,
                })
                .collect(),
            significant: vec![false; npix],
            sample_significant: None,
            known: false,
            has_samples: false,
            pixel_list: None,
        }
    }

    /// Creates sample-mode raw data with zeroed traces.
    pub fn with_samples(tel_id: u16, npix: usize, num_gains: usize, num_samples: usize) -> Self {
        let mut raw = Self::new(tel_id, npix, num_gains);
        raw.num_samples = num_samples;
        raw.has_samples = true;
        for gain in &mut raw.gains {
            gain.samples = Some(Array2::zeros((npix, num_samples)));
        }
        raw
    }

    /// Number of gain channels.
    #[inline]
    pub fn num_gains(&self) -> usize {
        self.gains.len()
    }

    /// True if sample-mode traces are present and usable.
    #[inline]
    pub fn has_traces(&self) -> bool {
        self.known && self.has_samples && self.num_samples > 1
    }

    /// Zero-suppression check: false only when a sample-significance mask
    /// exists and excludes the pixel.
    #[inline]
    pub fn sample_usable(&self, ipix: usize) -> bool {
        self.sample_significant.as_ref().is_none_or(|m| m[ipix])
    }

    /// True if the pixel carries a usable value in the given gain.
    #[inline]
    pub fn pixel_usable(&self, igain: usize, ipix: usize) -> bool {
        self.significant[ipix] && self.gains[igain].known[ipix]
    }

    /// Trace of one pixel in one gain, if sample mode is present.
    #[inline]
    pub fn trace(&self, igain: usize, ipix: usize) -> Option<ArrayView1<'_, u16>> {
        self.gains[igain].samples.as_ref().map(|s| s.row(ipix))
    }

    /// Logical per-event reset; keeps allocations.
    pub fn reset(&mut self) {
        self.known = false;
        for gain in &mut self.gains {
            gain.sum.fill(0);
            gain.known.fill(false);
            if let Some(samples) = &mut gain.samples {
                samples.fill(0);
            }
        }
        self.significant.fill(false);
        self.sample_significant = None;
        self.pixel_list = None;
    }
}

/// What a column of the pixel-timing value matrix means.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimingKind {
    /// Position of the pulse peak [time slices].
    PeakPos,
    /// Pulse width above an absolute threshold.
    WidthAbs,
    /// Pulse width at a fraction of the peak amplitude.
    WidthRel {
        /// Fraction of the peak (e.g. 0.5, 0.2).
        level: f64,
    },
    /// Position where the rising edge crosses a fraction of the peak.
    StartRel {
        /// Fraction of the peak (e.g. 0.2, 0.8).
        level: f64,
    },
}

/// Pixel timing analysis results for one telescope in one event.
///
/// The catalog of [`TimingKind`]s is fixed per run; column 0 is the peak
/// position by convention and a negative value there marks a pixel
/// without a significant peak.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelTiming {
    /// Validity flag.
    pub known: bool,
    /// Meaning of each value column.
    pub kinds: Vec<TimingKind>,
    /// Timing values (pixels x kinds).
    pub values: Array2<f64>,
    /// Pulse sums around the global peak, per gain and pixel.
    pub pulse_sum_glob: [Vec<f64>; MAX_GAINS],
    /// Pulse sums around the local peak, per gain and pixel.
    pub pulse_sum_loc: [Vec<f64>; MAX_GAINS],
    /// Window extent before the peak [slices]; negative if unset.
    pub before_peak: i32,
    /// Window extent after the peak [slices]; negative if unset.
    pub after_peak: i32,
    /// Significance threshold used when the timing was derived; a
    /// negative value means only selected pixels carry global sums.
    pub threshold: f64,
}

impl PixelTiming {
    /// True if the timing block carries usable peak windows.
    #[inline]
    pub fn has_windows(&self) -> bool {
        self.known && self.before_peak >= 0 && self.after_peak >= 0
    }

    /// True if global pulse sums are stored for all pixels rather than
    /// only the selected ones.
    #[inline]
    pub fn glob_all_pixels(&self) -> bool {
        self.threshold >= 0.0
    }

    /// True if the pixel has a significant peak.
    #[inline]
    pub fn significant_peak(&self, ipix: usize) -> bool {
        self.values[[ipix, 0]] >= 0.0
    }

    /// Column index of the peak position.
    pub fn peak_column(&self) -> Option<usize> {
        self.kinds.iter().position(|k| matches!(k, TimingKind::PeakPos))
    }

    /// Column index of the width above absolute threshold.
    pub fn width_abs_column(&self) -> Option<usize> {
        self.kinds
            .iter()
            .position(|k| matches!(k, TimingKind::WidthAbs))
    }

    /// Column index of a relative width with level inside (lo, hi).
    pub fn width_rel_column(&self, lo: f64, hi: f64) -> Option<usize> {
        self.kinds.iter().position(
            |k| matches!(k, TimingKind::WidthRel { level } if *level > lo && *level < hi),
        )
    }

    /// Column index of a relative start position with level inside (lo, hi).
    pub fn start_rel_column(&self, lo: f64, hi: f64) -> Option<usize> {
        self.kinds.iter().position(
            |k| matches!(k, TimingKind::StartRel { level } if *level > lo && *level < hi),
        )
    }
}

/// Calibrated per-pixel intensities kept for further use or storage.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibratedPixels {
    /// Telescope identifier.
    pub tel_id: u16,
    /// Validity flag.
    pub known: bool,
    /// Calibrated intensity per pixel [peak p.e.].
    pub pe: Vec<f64>,
    /// Per-pixel significance.
    pub significant: Vec<bool>,
    /// Sparse pixel list carried over from the raw readout.
    pub pixel_list: Option<Vec<usize>>,
    /// Amplitude source tag: 0 plain sums, negative values mark
    /// timing-correlated sums.
    pub int_method: i8,
}

/// All data of one telescope in one event.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopeEvent {
    /// Telescope identifier.
    pub tel_id: u16,
    /// Whether this telescope triggered and carries data.
    pub known: bool,
    /// Raw ADC data, if present.
    pub raw: Option<RawData>,
    /// Pixel timing block, if present.
    pub timing: Option<PixelTiming>,
    /// Persisted calibrated pixel intensities, if present.
    pub pixcal: Option<CalibratedPixels>,
    /// List of pixels that participated in the telescope trigger.
    pub trigger_pixels: Vec<usize>,
    /// Minimum trigger-pixel multiplicity for the telescope trigger.
    pub min_pixel_mult: usize,
    /// Image parameter slots (typically 1 or 2).
    pub images: Vec<ImageParameters>,
}

impl TelescopeEvent {
    /// True if raw data is present and marked known.
    #[inline]
    pub fn has_raw(&self) -> bool {
        self.raw.as_ref().is_some_and(|r| r.known)
    }

    /// Selects an image slot for the given cleaning-method tag: a slot
    /// already tagged with the same `cut_id` is reused, else the first
    /// free slot, else slot 0 as last resort.
    pub fn select_image_slot(&self, cut_id: u8) -> usize {
        let mut free = None;
        for (i, img) in self.images.iter().enumerate() {
            if img.known && img.cut_id == cut_id {
                return i;
            }
            if !img.known && free.is_none() {
                free = Some(i);
            }
        }
        free.unwrap_or(0)
    }
}

/// One array event: all telescope events plus central trigger bookkeeping.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArrayEvent {
    /// Telescope events in run sequence order.
    pub telescopes: Vec<TelescopeEvent>,
    /// IDs of triggered telescopes.
    pub triggered: Vec<u16>,
    /// IDs of telescopes with data.
    pub with_data: Vec<u16>,
    /// Legacy small-array trigger bit pattern (sequence indices < 32).
    pub teltrg_pattern: u32,
    /// Legacy small-array data bit pattern (sequence indices < 32).
    pub teldata_pattern: u32,
    /// Reconstructed shower parameters.
    pub shower: ShowerParameters,
}

impl ArrayEvent {
    /// Removes a telescope from all trigger bookkeeping after its trigger
    /// pixels dropped below the required multiplicity.
    pub fn drop_telescope(&mut self, seq: usize) {
        let tel_id = self.telescopes[seq].tel_id;
        self.telescopes[seq].known = false;
        self.triggered.retain(|&id| id != tel_id);
        self.with_data.retain(|&id| id != tel_id);
        if seq < 32 {
            let mask = !(1u32 << seq);
            self.teltrg_pattern &= mask;
            self.teldata_pattern &= mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_reset_keeps_shape() {
        let mut raw = RawData::with_samples(5, 3, 2, 16);
        raw.known = true;
        raw.significant[1] = true;
        raw.gains[0].sum[1] = 42;
        raw.reset();
        assert!(!raw.known);
        assert_eq!(raw.gains[0].sum, vec![0; 3]);
        assert!(!raw.significant[1]);
        assert_eq!(raw.num_samples, 16);
        assert!(raw.gains[0].samples.is_some());
    }

    #[test]
    fn test_zero_suppression_mask() {
        let mut raw = RawData::with_samples(5, 2, 1, 8);
        assert!(raw.sample_usable(0));
        raw.sample_significant = Some(vec![false, true]);
        assert!(!raw.sample_usable(0));
        assert!(raw.sample_usable(1));
    }

    #[test]
    fn test_timing_columns() {
        let timing = PixelTiming {
            kinds: vec![
                TimingKind::PeakPos,
                TimingKind::WidthRel { level: 0.5 },
                TimingKind::WidthRel { level: 0.2 },
                TimingKind::StartRel { level: 0.2 },
                TimingKind::StartRel { level: 0.8 },
            ],
            values: Array2::zeros((1, 5)),
            ..Default::default()
        };
        assert_eq!(timing.peak_column(), Some(0));
        assert_eq!(timing.width_rel_column(0.4, 0.6), Some(1));
        assert_eq!(timing.width_rel_column(0.15, 0.25), Some(2));
        assert_eq!(timing.start_rel_column(0.15, 0.25), Some(3));
        assert_eq!(timing.start_rel_column(0.7, 0.9), Some(4));
        assert_eq!(timing.width_abs_column(), None);
    }

    #[test]
    fn test_slot_selection() {
        let mut ev = TelescopeEvent {
            images: vec![ImageParameters::default(); 2],
            ..Default::default()
        };
        // Both free: first slot.
        assert_eq!(ev.select_image_slot(1), 0);
        ev.images[0].known = true;
        ev.images[0].cut_id = 1;
        // Matching cut id wins over the free slot.
        assert_eq!(ev.select_image_slot(1), 0);
        // Different cut id goes to the free slot.
        assert_eq!(ev.select_image_slot(2), 1);
        ev.images[1].known = true;
        ev.images[1].cut_id = 2;
        // No match, no free slot: last resort is slot 0.
        assert_eq!(ev.select_image_slot(3), 0);
    }

    #[test]
    fn test_drop_telescope() {
        let mut event = ArrayEvent {
            telescopes: vec![
                TelescopeEvent {
                    tel_id: 7,
                    known: true,
                    ..Default::default()
                },
                TelescopeEvent {
                    tel_id: 9,
                    known: true,
                    ..Default::default()
                },
            ],
            triggered: vec![7, 9],
            with_data: vec![7, 9],
            teltrg_pattern: 0b11,
            teldata_pattern: 0b11,
            ..Default::default()
        };
        event.drop_telescope(0);
        assert!(!event.telescopes[0].known);
        assert_eq!(event.triggered, vec![9]);
        assert_eq!(event.with_data, vec![9]);
        assert_eq!(event.teltrg_pattern, 0b10);
        assert_eq!(event.teldata_pattern, 0b10);
    }
}
