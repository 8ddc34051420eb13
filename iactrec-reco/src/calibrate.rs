//! Amplitude calibration: integrated ADC sums to photoelectron-equivalent
//! pixel amplitudes, with pedestal subtraction, per-pixel gain selection,
//! clipping and disabled-pixel masking.

use iactrec_core::calib::TelescopeCalibration;
use iactrec_core::config::{ChannelSelection, TelescopeTypeParams};
use iactrec_core::event::TelescopeEvent;
use iactrec_core::{Error, Result, HI_GAIN, LO_GAIN};

/// Where the per-pixel signal is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AmplitudeSource {
    /// Plain integrated ADC sums.
    #[default]
    Integrated,
    /// Pulse sums around the global peak from the timing analysis;
    /// may cover all pixels or only selected ones.
    TimingGlobal,
    /// Pulse sums around the local peak from the timing analysis
    /// (expected to be biased); zero for pixels without a significant
    /// peak.
    TimingLocal,
}

impl AmplitudeSource {
    /// Storage tag written into the calibrated-pixel record.
    #[inline]
    pub fn method_tag(self) -> i8 {
        match self {
            AmplitudeSource::Integrated => 0,
            AmplitudeSource::TimingGlobal => -1,
            AmplitudeSource::TimingLocal => -2,
        }
    }
}

/// Change to the event-level trigger bookkeeping caused by calibration.
///
/// Disabling pixels can invalidate trigger pixels; rather than mutating
/// array-level trigger lists from inside the calibrator, the change is
/// returned and applied by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct TriggerDelta {
    /// Trigger pixels removed because they are disabled.
    pub dropped_pixels: Vec<usize>,
    /// Fewer trigger pixels survive than the telescope trigger requires;
    /// the telescope must be dropped from the event.
    pub untriggered: bool,
}

/// Result of calibrating one telescope.
#[derive(Debug, Clone, Default)]
pub struct CalibrationOutcome {
    /// Number of significant pixels seen.
    pub significant_pixels: usize,
    /// Number of amplitudes clamped at the clip ceiling.
    pub saturated: usize,
    /// Trigger bookkeeping change to apply at the event level.
    pub trigger: TriggerDelta,
}

/// Calibrates all pixel amplitudes of one telescope into `amps`
/// [peak p.e.], recomputed in full on every call.
///
/// Raw data is preferred; without it a previously stored calibrated
/// record is used as-is. Per pixel the high gain wins unless its
/// pedestal-subtracted signal is outside the plausible range of the
/// [`iactrec_core::config::GainSelection`], in which case low gain takes
/// over. Disabled pixels are forced to zero and lose their significance
/// flag.
#[allow(clippy::too_many_lines)]
pub fn calibrate_amplitude(
    tel: &mut TelescopeEvent,
    calib: &TelescopeCalibration,
    params: &TelescopeTypeParams,
    disabled: &[bool],
    source: AmplitudeSource,
    amps: &mut [f64],
) -> Result<CalibrationOutcome> {
    let tel_id = tel.tel_id;
    let calib_scale = params.effective_calib_scale();
    let gain = &params.gain;
    let clip_amp = params.clip_amp;
    let mut outcome = CalibrationOutcome::default();

    amps.fill(0.0);

    let TelescopeEvent {
        raw,
        timing,
        pixcal,
        trigger_pixels,
        min_pixel_mult,
        ..
    } = tel;

    let Some(raw) = raw.as_mut().filter(|r| r.known) else {
        // No raw data; fall back to a stored calibrated record.
        let stored = pixcal.as_ref().filter(|pc| pc.known).ok_or(Error::NoEventData { tel_id })?;
        for (ipix, amp) in amps.iter_mut().enumerate().take(stored.pe.len()) {
            if stored.significant[ipix] {
                *amp = stored.pe[ipix];
            }
        }
        return Ok(outcome);
    };

    let npix = raw.num_pixels.min(amps.len());
    let timing = timing
        .as_ref()
        .filter(|t| source != AmplitudeSource::Integrated && t.has_windows());
    let glob_only_selected = timing.is_some_and(|t| !t.glob_all_pixels());

    for ipix in 0..npix {
        let significant = raw.significant[ipix];
        let hg_known = if gain.channel == ChannelSelection::LowOnly && raw.num_gains() > 1 {
            false
        } else {
            raw.gains[HI_GAIN].known[ipix]
        };
        let lg_known = raw.num_gains() >= 2
            && gain.channel != ChannelSelection::HighOnly
            && raw.gains[LO_GAIN].known[ipix];

        let (sig_hg, sig_lg) = if let Some(tm) = timing {
            if tm.significant_peak(ipix)
                || (source == AmplitudeSource::TimingGlobal && !glob_only_selected)
            {
                match source {
                    AmplitudeSource::TimingGlobal => (
                        tm.pulse_sum_glob[HI_GAIN][ipix] + 1e-12,
                        tm.pulse_sum_glob[LO_GAIN].get(ipix).copied().unwrap_or(0.0),
                    ),
                    _ => (
                        tm.pulse_sum_loc[HI_GAIN][ipix],
                        tm.pulse_sum_loc[LO_GAIN].get(ipix).copied().unwrap_or(0.0),
                    ),
                }
            } else {
                (0.0, 0.0)
            }
        } else {
            let hg = if hg_known {
                f64::from(raw.gains[HI_GAIN].sum[ipix]) - calib.pedestal[HI_GAIN][ipix]
            } else {
                0.0
            };
            let lg = if lg_known {
                f64::from(raw.gains[LO_GAIN].sum[ipix]) - calib.pedestal[LO_GAIN][ipix]
            } else {
                0.0
            };
            (hg, lg)
        };
        let npe_hg = sig_hg * calib.calib[HI_GAIN][ipix];
        let npe_lg = sig_lg * calib.calib[LO_GAIN].get(ipix).copied().unwrap_or(0.0);

        if disabled[ipix] {
            raw.significant[ipix] = false;
            amps[ipix] = 0.0;
            continue;
        }

        let mut npe = if !significant {
            0.0
        } else if hg_known && sig_hg < gain.hg_saturation && sig_hg > gain.hg_negative {
            npe_hg
        } else if raw.num_gains() >= 2 {
            npe_lg
        } else {
            npe_hg
        };

        if significant {
            outcome.significant_pixels += 1;
        }
        if clip_amp > 0.0 && npe > clip_amp {
            npe = clip_amp;
            outcome.saturated += 1;
        }

        // npe is in units of mean p.e.; convert to the experimentalist's
        // single-p.e. peak units. peak(10 p.e.) != 10 * peak(1 p.e.).
        amps[ipix] = calib_scale * npe;
    }

    // Keep the calibrated result for further use or storage.
    if let Some(pc) = pixcal.as_mut() {
        pc.tel_id = raw.tel_id;
        pc.pe.clear();
        pc.pe.extend_from_slice(&amps[..npix]);
        pc.significant.clear();
        pc.significant.extend_from_slice(&raw.significant[..npix]);
        pc.pixel_list.clone_from(&raw.pixel_list);
        pc.int_method = source.method_tag();
        pc.known = raw.known;
    }

    // Previously triggered pixels may be disabled now; the telescope
    // trigger itself may no longer hold.
    if disabled.iter().any(|&d| d) {
        let before = trigger_pixels.len();
        let mut dropped = Vec::new();
        trigger_pixels.retain(|&p| {
            if disabled[p] {
                dropped.push(p);
                false
            } else {
                true
            }
        });
        if trigger_pixels.len() < before {
            outcome.trigger.dropped_pixels = dropped;
            outcome.trigger.untriggered = trigger_pixels.len() < *min_pixel_mult;
        }
    }

    Ok(outcome)
}
