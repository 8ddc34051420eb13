//! Pulse integration: reduce per-pixel time-sample traces to one
//! integrated ADC sum per pixel and gain.
//!
//! All strategies share the same contract: sums are written back into the
//! raw data (traces are never modified), a pedestal share is restored for
//! samples outside the window, and a per-gain integration correction
//! factor compensates for the charge a narrow window misses. Integrating
//! the same traces twice therefore yields bit-identical sums.

use ndarray::ArrayView1;

use iactrec_core::calib::{ReferencePulse, TelescopeCalibration};
use iactrec_core::config::{IntegrationConfig, IntegrationScheme, PulseShaping};
use iactrec_core::event::{PixelTiming, RawData};
use iactrec_core::{Result, HI_GAIN, LO_GAIN, MAX_GAINS};

use crate::neighbors::NeighborGraph;

/// Everything an integration strategy may consume for one telescope.
pub struct IntegrationInput<'a> {
    /// Raw event data; sums are written back here.
    pub raw: &'a mut RawData,
    /// Per-run calibration constants (pedestals).
    pub calib: &'a TelescopeCalibration,
    /// Cached neighbor graph of the camera.
    pub graph: &'a NeighborGraph,
    /// Per-gain integration correction; values <= 0 skip the correction.
    pub correction: &'a [f64; MAX_GAINS],
    /// Pixel timing block, for strategies that re-derive timing fields.
    pub timing: Option<&'a mut PixelTiming>,
}

/// A pulse integration strategy.
///
/// Implementations are no-ops (returning `Ok`) when the event carries no
/// multi-sample trace data.
pub trait PulseIntegration {
    /// Strategy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Integrates all pixel traces of one telescope into per-pixel sums.
    fn integrate(&self, input: IntegrationInput<'_>) -> Result<()>;
}

/// Builds the strategy selected by an [`IntegrationConfig`].
#[must_use]
pub fn make_integrator(config: &IntegrationConfig) -> Box<dyn PulseIntegration> {
    match config.scheme {
        IntegrationScheme::FixedWindow => Box::new(FixedWindowIntegrator {
            window: config.window,
            skip: config.offset,
        }),
        IntegrationScheme::GlobalPeak => Box::new(GlobalPeakIntegrator {
            window: config.window,
            before: config.offset,
            thresholds: config.thresholds,
        }),
        IntegrationScheme::LocalPeak => Box::new(LocalPeakIntegrator {
            window: config.window,
            before: config.offset,
            thresholds: config.thresholds,
        }),
        IntegrationScheme::NeighborPeak => Box::new(NeighborPeakIntegrator {
            window: config.window,
            before: config.offset,
            local_weight: 0,
        }),
        IntegrationScheme::NeighborPeakWeighted => Box::new(NeighborPeakIntegrator {
            window: config.window,
            before: config.offset,
            local_weight: 3,
        }),
        IntegrationScheme::ShapedNeighborPeak => Box::new(ShapedPeakIntegrator {
            window: config.window,
            before: config.offset,
            shaping: config.shaping,
        }),
    }
}

/// Evaluates the per-gain integration correction for one telescope.
///
/// The correction is the ratio of the full reference-pulse area to the
/// area captured by a `window`-sample interval starting `offset` samples
/// before the pulse peak, averaged over five sub-sample phases of the
/// peak position. Gains without a usable reference shape fall back to 1.
#[must_use]
pub fn integration_correction(
    pulse: &ReferencePulse,
    num_gains: usize,
    window: usize,
    offset: usize,
) -> [f64; MAX_GAINS] {
    let mut correction = [1.0; MAX_GAINS];
    for (igain, corr) in correction.iter_mut().enumerate().take(num_gains) {
        if !pulse.has_shape(igain) {
            continue;
        }
        let shape = &pulse.shapes[igain];
        let st = pulse.time_slice / pulse.step;
        let sr = 1.0 / st;

        let mut asum = 0.0;
        let mut speak = 0.0;
        let mut ipeak = 0usize;
        for (ibin, &v) in shape.iter().enumerate() {
            asum += v;
            if v > speak {
                speak = v;
                ipeak = ibin;
            }
        }
        // Rescale the full area to the original time step.
        asum *= sr;

        let mut sum = 0.0;
        for iphase in 0..5 {
            let ti = ((f64::from(iphase) * 0.2 - 0.4) - offset as f64) * st + ipeak as f64;
            for ibin in 0..window {
                sum += qpol(ibin as f64 * st + ti, shape);
            }
        }
        sum *= 0.2;
        if sum > 0.0 && asum > 0.0 {
            *corr = asum / sum;
        }
    }
    correction
}

/// Linear interpolation into a sampled curve; zero outside its support.
fn qpol(x: f64, yval: &[f64]) -> f64 {
    let np = yval.len();
    if x < 0.0 || x >= np as f64 {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ix = x as usize;
    if ix + 1 >= np {
        return 0.0;
    }
    yval[ix] * (ix as f64 + 1.0 - x) + yval[ix + 1] * (x - ix as f64)
}

/// Window start position: `before` samples ahead of the peak, clamped
/// into the trace.
fn window_start(peakpos: usize, before: usize, window: usize, num_samples: usize) -> usize {
    let start = peakpos.saturating_sub(before);
    if start + window > num_samples {
        num_samples - window
    } else {
        start
    }
}

fn window_sum(trace: ArrayView1<'_, u16>, start: usize, window: usize) -> i64 {
    trace
        .iter()
        .skip(start)
        .take(window)
        .map(|&v| i64::from(v))
        .sum()
}

/// Pedestal restoration and correction scaling shared by all strategies.
///
/// Calibration subtracts a pedestal sized for the full trace, so the
/// pedestal share of the unsummed samples is added back; the correction
/// then scales only the pedestal-subtracted signal. Truncation matches
/// integer ADC arithmetic.
#[allow(clippy::cast_possible_truncation)]
fn finalize_sum(mut sum: i64, window: usize, num_samples: usize, ped: f64, corr: f64) -> i32 {
    if window != num_samples {
        sum += ((num_samples - window) as f64 * ped / num_samples as f64 + 0.5) as i64;
    }
    if corr > 0.0 {
        sum = ((sum as f64 - ped) * corr + ped + 0.5) as i64;
    }
    sum as i32
}

/// Pedestal per sample, rounded like the integer ADC baseline.
#[allow(clippy::cast_possible_truncation)]
fn pedestal_sample(calib: &TelescopeCalibration, igain: usize, ipix: usize, ns: usize) -> i32 {
    (calib.pedestal_per_sample(igain, ipix, ns) + 0.5) as i32
}

/// First-significant-then-maximum peak search: scan for the first sample
/// at least `threshold` above the per-sample pedestal, then take the
/// highest sample from there to the end of the trace.
fn significant_peak(
    trace: ArrayView1<'_, u16>,
    pedsamp: i32,
    threshold: i32,
) -> Option<(usize, i32)> {
    for (isamp, &v) in trace.iter().enumerate() {
        if i32::from(v) - pedsamp >= threshold {
            let mut ipeak = isamp;
            let mut p = i32::from(v);
            for (jsamp, &w) in trace.iter().enumerate().skip(isamp + 1) {
                if i32::from(w) > p {
                    p = i32::from(w);
                    ipeak = jsamp;
                }
            }
            return Some((ipeak, p));
        }
    }
    None
}

/// Fixed integration window at a configured offset from the trace start.
pub struct FixedWindowIntegrator {
    /// Samples summed up.
    pub window: usize,
    /// Samples skipped at the start of the trace.
    pub skip: usize,
}

impl PulseIntegration for FixedWindowIntegrator {
    fn name(&self) -> &'static str {
        "fixed-window"
    }

    fn integrate(&self, input: IntegrationInput<'_>) -> Result<()> {
        let raw = input.raw;
        if !raw.has_traces() {
            return Ok(());
        }
        let ns = raw.num_samples;
        let mut window = self.window;
        let mut skip = self.skip;
        if window + skip > ns {
            if window >= ns {
                skip = 0;
                window = ns;
            } else {
                skip = ns - window;
            }
        }
        for igain in 0..raw.num_gains() {
            for ipix in 0..raw.num_pixels {
                let sum = if raw.sample_usable(ipix) && raw.pixel_usable(igain, ipix) {
                    let raw_sum = raw
                        .trace(igain, ipix)
                        .map_or(0, |t| window_sum(t, skip, window));
                    finalize_sum(
                        raw_sum,
                        window,
                        ns,
                        input.calib.pedestal[igain][ipix],
                        input.correction[igain],
                    )
                } else {
                    0
                };
                raw.gains[igain].sum[ipix] = sum;
            }
        }
        Ok(())
    }
}

/// Common window around the amplitude-weighted global peak position of
/// all significant pixels of a gain channel.
pub struct GlobalPeakIntegrator {
    /// Samples summed up.
    pub window: usize,
    /// Samples ahead of the peak where the window starts.
    pub before: usize,
    /// Per-gain significance thresholds [ADC above pedestal].
    pub thresholds: [i32; MAX_GAINS],
}

impl PulseIntegration for GlobalPeakIntegrator {
    fn name(&self) -> &'static str {
        "global-peak"
    }

    fn integrate(&self, input: IntegrationInput<'_>) -> Result<()> {
        let raw = input.raw;
        if !raw.has_traces() {
            return Ok(());
        }
        let ns = raw.num_samples;
        let window = self.window.min(ns);
        let mut peakpos_hg: Option<usize> = None;

        for igain in 0..raw.num_gains() {
            raw.gains[igain].sum.fill(0);

            // Amplitude-weighted mean position of the per-pixel peaks.
            let mut ps = 0.0;
            let mut pjs = 0.0;
            let mut npeaks = 0usize;
            for ipix in 0..raw.num_pixels {
                if !raw.sample_usable(ipix) || !raw.pixel_usable(igain, ipix) {
                    continue;
                }
                let pedsamp = pedestal_sample(input.calib, igain, ipix, ns);
                if let Some(trace) = raw.trace(igain, ipix) {
                    if let Some((ipeak, p)) = significant_peak(trace, pedsamp, self.thresholds[igain])
                    {
                        let amp = f64::from(p - pedsamp);
                        ps += amp;
                        pjs += amp * ipeak as f64;
                        npeaks += 1;
                    }
                }
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let peakpos = if npeaks > 0 {
                let pos = if ps > 0.0 { (pjs / ps + 0.5) as usize } else { 0 };
                if igain == HI_GAIN {
                    peakpos_hg = Some(pos);
                }
                pos
            } else if let (true, Some(hg)) = (igain > 0, peakpos_hg) {
                // Low gain without a significant peak of its own follows
                // the high-gain window.
                hg
            } else {
                // No idea where to sum up; leaving the channel empty makes
                // an over-tight threshold visible.
                continue;
            };

            let start = window_start(peakpos, self.before, window, ns);
            for ipix in 0..raw.num_pixels {
                if !raw.sample_usable(ipix) || !raw.pixel_usable(igain, ipix) {
                    continue;
                }
                let raw_sum = raw
                    .trace(igain, ipix)
                    .map_or(0, |t| window_sum(t, start, window));
                raw.gains[igain].sum[ipix] = finalize_sum(
                    raw_sum,
                    window,
                    ns,
                    input.calib.pedestal[igain][ipix],
                    input.correction[igain],
                );
            }
        }
        Ok(())
    }
}

/// Window around each pixel's own peak, found independently per pixel.
pub struct LocalPeakIntegrator {
    /// Samples summed up.
    pub window: usize,
    /// Samples ahead of the peak where the window starts.
    pub before: usize,
    /// Per-gain significance thresholds [ADC above pedestal].
    pub thresholds: [i32; MAX_GAINS],
}

impl LocalPeakIntegrator {
    fn integrate_channel(
        &self,
        raw: &mut RawData,
        calib: &TelescopeCalibration,
        correction: &[f64; MAX_GAINS],
        igain: usize,
        ipix: usize,
        peakpos: usize,
    ) {
        let ns = raw.num_samples;
        let window = self.window.min(ns);
        let start = window_start(peakpos, self.before, window, ns);
        let raw_sum = raw
            .trace(igain, ipix)
            .map_or(0, |t| window_sum(t, start, window));
        raw.gains[igain].sum[ipix] = finalize_sum(
            raw_sum,
            window,
            ns,
            calib.pedestal[igain][ipix],
            correction[igain],
        );
    }
}

impl PulseIntegration for LocalPeakIntegrator {
    fn name(&self) -> &'static str {
        "local-peak"
    }

    fn integrate(&self, input: IntegrationInput<'_>) -> Result<()> {
        let raw = input.raw;
        if !raw.has_traces() {
            return Ok(());
        }
        let ns = raw.num_samples;

        for ipix in 0..raw.num_pixels {
            for igain in 0..raw.num_gains() {
                raw.gains[igain].sum[ipix] = 0;
            }
            if !raw.sample_usable(ipix) {
                continue;
            }

            let mut peakpos_hg: Option<usize> = None;
            if raw.pixel_usable(HI_GAIN, ipix) {
                let pedsamp = pedestal_sample(input.calib, HI_GAIN, ipix, ns);
                let peak = raw
                    .trace(HI_GAIN, ipix)
                    .and_then(|t| significant_peak(t, pedsamp, self.thresholds[HI_GAIN]));
                if let Some((ipeak, _)) = peak {
                    peakpos_hg = Some(ipeak);
                    self.integrate_channel(raw, input.calib, input.correction, HI_GAIN, ipix, ipeak);
                }
            }

            // The high-gain signal may be missing or fully saturated, so
            // low gain first searches for a peak of its own.
            if raw.num_gains() > 1 && raw.pixel_usable(LO_GAIN, ipix) {
                let pedsamp = pedestal_sample(input.calib, LO_GAIN, ipix, ns);
                let own = raw
                    .trace(LO_GAIN, ipix)
                    .and_then(|t| significant_peak(t, pedsamp, self.thresholds[LO_GAIN]))
                    .map(|(ipeak, _)| ipeak);
                if let Some(peakpos) = own.or(peakpos_hg) {
                    self.integrate_channel(
                        raw,
                        input.calib,
                        input.correction,
                        LO_GAIN,
                        ipix,
                        peakpos,
                    );
                }
            }
        }
        Ok(())
    }
}

/// Window positioned at the peak of the summed high-gain traces of a
/// pixel's immediate neighbors, optionally counting the pixel itself
/// with a configurable weight.
pub struct NeighborPeakIntegrator {
    /// Samples summed up.
    pub window: usize,
    /// Samples ahead of the peak where the window starts.
    pub before: usize,
    /// Weight of the pixel's own trace in the peak search; 0 uses
    /// neighbors only.
    pub local_weight: u32,
}

impl PulseIntegration for NeighborPeakIntegrator {
    fn name(&self) -> &'static str {
        "neighbor-peak"
    }

    fn integrate(&self, input: IntegrationInput<'_>) -> Result<()> {
        let raw = input.raw;
        if !raw.has_traces() {
            return Ok(());
        }
        let ns = raw.num_samples;
        let window = self.window.min(ns);

        for ipix in 0..raw.num_pixels {
            for igain in 0..raw.num_gains() {
                raw.gains[igain].sum[ipix] = 0;
            }
            if !raw.sample_usable(ipix) {
                continue;
            }

            // Flat pedestals cancel in a pure argmax, so the neighbor
            // traces are summed without subtraction.
            let mut nb_samples = vec![0i64; ns];
            let mut knb = 0usize;
            for &jpix in input.graph.immediate(ipix) {
                let jpix = jpix as usize;
                if !raw.sample_usable(jpix) || !raw.pixel_usable(HI_GAIN, jpix) {
                    continue;
                }
                if let Some(trace) = raw.trace(HI_GAIN, jpix) {
                    for (acc, &v) in nb_samples.iter_mut().zip(trace.iter()) {
                        *acc += i64::from(v);
                    }
                    knb += 1;
                }
            }
            if self.local_weight > 0 && raw.pixel_usable(HI_GAIN, ipix) {
                if let Some(trace) = raw.trace(HI_GAIN, ipix) {
                    for (acc, &v) in nb_samples.iter_mut().zip(trace.iter()) {
                        *acc += i64::from(v) * i64::from(self.local_weight);
                    }
                    knb += 1;
                }
            }
            if knb == 0 {
                // Isolated pixel: no usable window position, sums stay 0.
                continue;
            }

            let mut ipeak = 0usize;
            let mut p = nb_samples[0];
            for (isamp, &v) in nb_samples.iter().enumerate().skip(1) {
                if v > p {
                    p = v;
                    ipeak = isamp;
                }
            }
            let start = window_start(ipeak, self.before, window, ns);

            for igain in 0..raw.num_gains() {
                if !raw.pixel_usable(igain, ipix) {
                    continue;
                }
                let raw_sum = raw
                    .trace(igain, ipix)
                    .map_or(0, |t| window_sum(t, start, window));
                raw.gains[igain].sum[ipix] = finalize_sum(
                    raw_sum,
                    window,
                    ns,
                    input.calib.pedestal[igain][ipix],
                    input.correction[igain],
                );
            }
        }
        Ok(())
    }
}

/// Neighbor-peak integration on upsampled, pole-zero shaped traces, for
/// cameras whose front-end electronics require explicit pulse shaping.
pub struct ShapedPeakIntegrator {
    /// Samples summed up, in original time slices.
    pub window: usize,
    /// Samples ahead of the peak where the window starts, in original
    /// time slices.
    pub before: usize,
    /// Shaping filter parameters.
    pub shaping: PulseShaping,
}

impl ShapedPeakIntegrator {
    /// Upsamples a pedestal-subtracted trace by repetition, then applies
    /// the single-pole-zero differencing filter
    /// `y[i] = (x[i] - x[i-d]) + pole * y[i-1]`.
    fn shape_trace(&self, trace: ArrayView1<'_, u16>, pedsamp: f64) -> Vec<f64> {
        let u = self.shaping.upsample.max(1);
        let d = self.shaping.difference;
        let pole = self.shaping.pole;
        let n_up = trace.len() * u;
        let mut x = Vec::with_capacity(n_up);
        for &v in trace {
            let s = f64::from(v) - pedsamp;
            for _ in 0..u {
                x.push(s);
            }
        }
        let mut y = vec![0.0; n_up];
        for i in 0..n_up {
            let xd = if i >= d { x[i - d] } else { 0.0 };
            let prev = if i > 0 { pole * y[i - 1] } else { 0.0 };
            y[i] = (x[i] - xd) + prev;
        }
        y
    }

    /// Charge normalization of the shaped window sum: undo the upsampling
    /// multiplicity and the shaper's pass-band gain.
    fn charge_norm(&self) -> f64 {
        let u = self.shaping.upsample.max(1) as f64;
        let d = self.shaping.difference;
        let pole = self.shaping.pole;
        if (1.0 - pole).abs() > 1e-12 {
            #[allow(clippy::cast_possible_wrap)]
            let gain = (1.0 - pole.powi(d as i32)) / (1.0 - pole);
            u * gain.max(1e-12)
        } else {
            u * d.max(1) as f64
        }
    }

    /// Integral of the shaped trace around `ipeak`: either a plain window
    /// or a symmetric peak-property integral of configured half-width.
    fn shaped_integral(&self, shaped: &[f64], ipeak: usize) -> f64 {
        let u = self.shaping.upsample.max(1);
        if self.shaping.peak_half_width > 0 {
            let hw = self.shaping.peak_half_width;
            let lo = ipeak.saturating_sub(hw);
            let hi = (ipeak + hw + 1).min(shaped.len());
            shaped[lo..hi].iter().sum()
        } else {
            let window = (self.window * u).min(shaped.len());
            let start = window_start(ipeak, self.before * u, window, shaped.len());
            shaped[start..start + window].iter().sum()
        }
    }

    /// Re-derives timing fields of one pixel from its own shaped trace:
    /// peak position, widths at 50% and 20% of peak, and the 20%/80%
    /// rising-edge crossing positions, all in original time slices.
    fn reevaluate_timing(&self, timing: &mut PixelTiming, ipix: usize, shaped: &[f64]) {
        let u = self.shaping.upsample.max(1) as f64;
        let mut ipk = 0usize;
        let mut peak = shaped[0];
        for (i, &v) in shaped.iter().enumerate().skip(1) {
            if v > peak {
                peak = v;
                ipk = i;
            }
        }
        if peak <= 0.0 {
            return;
        }
        let crossing = |level: f64| -> (usize, usize) {
            let lvl = level * peak;
            let mut lo = ipk;
            while lo > 0 && shaped[lo - 1] >= lvl {
                lo -= 1;
            }
            let mut hi = ipk;
            while hi + 1 < shaped.len() && shaped[hi + 1] >= lvl {
                hi += 1;
            }
            (lo, hi)
        };
        if let Some(col) = timing.peak_column() {
            timing.values[[ipix, col]] = ipk as f64 / u;
        }
        if let Some(col) = timing.width_rel_column(0.4, 0.6) {
            let (lo, hi) = crossing(0.5);
            timing.values[[ipix, col]] = (hi - lo) as f64 / u;
        }
        if let Some(col) = timing.width_rel_column(0.15, 0.25) {
            let (lo, hi) = crossing(0.2);
            timing.values[[ipix, col]] = (hi - lo) as f64 / u;
        }
        if let Some(col) = timing.start_rel_column(0.15, 0.25) {
            let (lo, _) = crossing(0.2);
            timing.values[[ipix, col]] = lo as f64 / u;
        }
        if let Some(col) = timing.start_rel_column(0.7, 0.9) {
            let (lo, _) = crossing(0.8);
            timing.values[[ipix, col]] = lo as f64 / u;
        }
    }
}

impl PulseIntegration for ShapedPeakIntegrator {
    fn name(&self) -> &'static str {
        "shaped-neighbor-peak"
    }

    #[allow(clippy::cast_possible_truncation)]
    fn integrate(&self, input: IntegrationInput<'_>) -> Result<()> {
        let raw = input.raw;
        if !raw.has_traces() {
            return Ok(());
        }
        let ns = raw.num_samples;
        let norm = self.charge_norm();
        let mut timing = input.timing;

        // Shape every usable high-gain trace once up front.
        let mut shaped: Vec<Option<Vec<f64>>> = Vec::with_capacity(raw.num_pixels);
        for ipix in 0..raw.num_pixels {
            let usable = raw.sample_usable(ipix) && raw.pixel_usable(HI_GAIN, ipix);
            let s = if usable {
                raw.trace(HI_GAIN, ipix).map(|t| {
                    self.shape_trace(t, input.calib.pedestal_per_sample(HI_GAIN, ipix, ns))
                })
            } else {
                None
            };
            shaped.push(s);
        }

        for ipix in 0..raw.num_pixels {
            for igain in 0..raw.num_gains() {
                raw.gains[igain].sum[ipix] = 0;
            }
            let Some(own) = shaped[ipix].as_ref() else {
                continue;
            };

            let mut nb_sum = vec![0.0; own.len()];
            let mut knb = 0usize;
            for &jpix in input.graph.immediate(ipix) {
                if let Some(nb) = shaped[jpix as usize].as_ref() {
                    for (acc, &v) in nb_sum.iter_mut().zip(nb.iter()) {
                        *acc += v;
                    }
                    knb += 1;
                }
            }
            // Isolated pixels fall back to their own shaped trace.
            let search: &[f64] = if knb > 0 { &nb_sum } else { own };

            let mut ipeak = 0usize;
            let mut p = search[0];
            for (i, &v) in search.iter().enumerate().skip(1) {
                if v > p {
                    p = v;
                    ipeak = i;
                }
            }

            for igain in 0..raw.num_gains() {
                if !raw.pixel_usable(igain, ipix) {
                    continue;
                }
                let trace_shaped;
                let pix_shaped: &[f64] = if igain == HI_GAIN {
                    own
                } else {
                    match raw.trace(igain, ipix) {
                        Some(t) => {
                            trace_shaped = self.shape_trace(
                                t,
                                input.calib.pedestal_per_sample(igain, ipix, ns),
                            );
                            &trace_shaped
                        }
                        None => continue,
                    }
                };
                let mut charge = self.shaped_integral(pix_shaped, ipeak) / norm;
                if input.correction[igain] > 0.0 {
                    charge *= input.correction[igain];
                }
                let ped = input.calib.pedestal[igain][ipix];
                raw.gains[igain].sum[ipix] = (charge + ped + 0.5) as i32;
            }

            if self.shaping.reevaluate_timing {
                if let Some(t) = timing.as_deref_mut() {
                    self.reevaluate_timing(t, ipix, own);
                }
            }
        }
        Ok(())
    }
}
