//! Pixel-timing analysis: time gradient along the image axis plus
//! amplitude-weighted pulse width and rise-time summaries.

use iactrec_core::event::PixelTiming;
use iactrec_core::{CameraGeometry, Error, ImageParameters, Result};

/// Damping constant of the per-pixel fit weight `A / (A + 100)`: errors
/// shrink like 1/sqrt(A) but the influence of very bright pixels levels
/// off.
const WEIGHT_DAMPING: f64 = 100.0;

/// Fits a weighted linear time gradient of pulse peak times versus
/// position projected onto the image major axis, and accumulates
/// weighted means of pulse widths and rise time.
///
/// Results go into the timing fields of `img`, which must hold the image
/// parameters of the same cleaning pass as `image_pixels`. An
/// undetermined slope (fewer than 2 weighted pixels, or a degenerate
/// design matrix) is a valid outcome: the fields stay zero and `Ok` is
/// returned.
pub fn pixel_timing_analysis(
    geom: &CameraGeometry,
    timing: &PixelTiming,
    amps: &[f64],
    image_pixels: &[usize],
    disabled: &[bool],
    time_slice: f64,
    img: &mut ImageParameters,
) -> Result<()> {
    let img_scale = 1.0 / geom.focal_length;
    let time_slice = if time_slice > 0.0 { time_slice } else { 1.0 };

    img.tm_slope = 0.0;
    img.tm_residual = 0.0;
    img.tm_width1 = 0.0;
    img.tm_width2 = 0.0;
    img.tm_rise = 0.0;

    if !timing.known {
        return Err(Error::NoTiming { tel_id: geom.tel_id });
    }
    // The peak position is the one column we cannot do without.
    let kpeak = timing
        .peak_column()
        .ok_or(Error::NoTiming { tel_id: geom.tel_id })?;
    let kwa = timing.width_abs_column();
    let kwr50 = timing.width_rel_column(0.4, 0.6);
    let kwr20 = timing.width_rel_column(0.15, 0.25);
    let ksr20 = timing.start_rel_column(0.15, 0.25);
    let ksr80 = timing.start_rel_column(0.7, 0.9);

    let npix_tm = timing.values.nrows();
    let cphi = img.phi.cos();
    let sphi = img.phi.sin();
    let projected = |ipix: usize| {
        let x = geom.pixel_x[ipix] * img_scale - img.x;
        let y = geom.pixel_y[ipix] * img_scale - img.y;
        cphi * x + sphi * y
    };
    let usable = |ipix: usize| {
        ipix < npix_tm && timing.significant_peak(ipix) && !disabled[ipix] && amps[ipix] > 0.0
    };

    let mut sw = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut swd1 = 0.0;
    let mut swd2 = 0.0;
    let mut srt = 0.0;
    let mut n = 0usize;
    for &ipix in image_pixels {
        if !usable(ipix) {
            continue;
        }
        let a = amps[ipix];
        let wi = a / (a + WEIGHT_DAMPING);
        let xr = projected(ipix);
        let t = timing.values[[ipix, kpeak]];
        let wd1 = kwr50
            .or(kwa)
            .map_or(0.0, |k| timing.values[[ipix, k]]);
        let wd2 = kwr20.map_or(0.0, |k| timing.values[[ipix, k]]);
        let rt = match (ksr20, ksr80) {
            (Some(k20), Some(k80)) => timing.values[[ipix, k80]] - timing.values[[ipix, k20]],
            _ => 0.0,
        };
        n += 1;
        sw += wi;
        sx += wi * xr;
        sy += wi * t;
        sxx += wi * xr * xr;
        sxy += wi * xr * t;
        swd1 += wi * wd1;
        swd2 += wi * wd2;
        srt += wi * rt;
    }

    if sw == 0.0 || n < 2 {
        // Slope is definitely undetermined.
        return Ok(());
    }
    let d = sw * sxx - sx * sx;
    if d < 1e-10 {
        // Undetermined within numerical accuracy.
        return Ok(());
    }
    let m = (sw * sxy - sx * sy) / d;
    let b = (sxx * sy - sx * sxy) / d;

    img.tm_slope = m * time_slice;
    img.tm_width1 = swd1 / sw * time_slice;
    img.tm_width2 = swd2 / sw * time_slice;
    img.tm_rise = srt / sw * time_slice;

    // Second round for the r.m.s. residual about the fitted line.
    let mut sdt = 0.0;
    let mut sdt2 = 0.0;
    for &ipix in image_pixels {
        if !usable(ipix) {
            continue;
        }
        let a = amps[ipix];
        let wi = a / (a + WEIGHT_DAMPING);
        let xr = projected(ipix);
        let dt = timing.values[[ipix, kpeak]] - b - m * xr;
        sdt += wi * dt;
        sdt2 += wi * dt * dt;
    }
    let res = sdt2 / sw - (sdt / sw) * (sdt / sw);
    if res > 0.0 {
        img.tm_residual = (res * n as f64 / (n - 1) as f64).sqrt() * time_slice;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use iactrec_core::event::TimingKind;
    use ndarray::Array2;

    fn line_geom(n: usize) -> CameraGeometry {
        CameraGeometry {
            tel_id: 1,
            pixel_x: (0..n).map(|i| 0.1 * i as f64).collect(),
            pixel_y: vec![0.0; n],
            size: vec![0.1; n],
            area: vec![0.008; n],
            focal_length: 1.0,
            cam_rot: 0.0,
            shape: None,
        }
    }

    fn timing_with_peaks(peaks: &[f64]) -> PixelTiming {
        let mut values = Array2::zeros((peaks.len(), 3));
        for (i, &p) in peaks.iter().enumerate() {
            values[[i, 0]] = p;
            values[[i, 1]] = 4.0; // width at 50%
            values[[i, 2]] = 6.0; // width at 20%
        }
        PixelTiming {
            known: true,
            kinds: vec![
                TimingKind::PeakPos,
                TimingKind::WidthRel { level: 0.5 },
                TimingKind::WidthRel { level: 0.2 },
            ],
            values,
            ..Default::default()
        }
    }

    fn image_along_x() -> ImageParameters {
        ImageParameters {
            known: true,
            phi: 0.0,
            x: 0.0,
            y: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_linear_gradient_recovered() {
        let geom = line_geom(4);
        // Peak time rises by 2 slices per 0.1 rad: slope 20 per rad.
        let timing = timing_with_peaks(&[10.0, 12.0, 14.0, 16.0]);
        let amps = [50.0; 4];
        let pixels = [0usize, 1, 2, 3];
        let mut img = image_along_x();
        pixel_timing_analysis(&geom, &timing, &amps, &pixels, &[false; 4], 1.0, &mut img)
            .unwrap();
        assert_relative_eq!(img.tm_slope, 20.0, max_relative = 1e-9);
        // An exact line leaves no residual.
        assert_abs_diff_eq!(img.tm_residual, 0.0, epsilon = 1e-9);
        assert_relative_eq!(img.tm_width1, 4.0);
        assert_relative_eq!(img.tm_width2, 6.0);
    }

    #[test]
    fn test_time_slice_scales_results() {
        let geom = line_geom(3);
        let timing = timing_with_peaks(&[10.0, 12.0, 14.0]);
        let amps = [50.0; 3];
        let pixels = [0usize, 1, 2];
        let mut img = image_along_x();
        pixel_timing_analysis(&geom, &timing, &amps, &pixels, &[false; 3], 2.0, &mut img)
            .unwrap();
        assert_relative_eq!(img.tm_slope, 40.0, max_relative = 1e-9);
        assert_relative_eq!(img.tm_width1, 8.0);
    }

    #[test]
    fn test_single_pixel_undetermined_not_error() {
        let geom = line_geom(2);
        let timing = timing_with_peaks(&[10.0, 12.0]);
        let amps = [50.0, 0.0];
        let pixels = [0usize, 1];
        let mut img = image_along_x();
        img.tm_slope = 99.0;
        pixel_timing_analysis(&geom, &timing, &amps, &pixels, &[false; 2], 1.0, &mut img)
            .unwrap();
        assert_relative_eq!(img.tm_slope, 0.0);
    }

    #[test]
    fn test_degenerate_positions_undetermined() {
        // All pixels project to the same axis position.
        let mut geom = line_geom(3);
        geom.pixel_x = vec![0.0; 3];
        let timing = timing_with_peaks(&[10.0, 12.0, 14.0]);
        let amps = [50.0; 3];
        let pixels = [0usize, 1, 2];
        let mut img = image_along_x();
        pixel_timing_analysis(&geom, &timing, &amps, &pixels, &[false; 3], 1.0, &mut img)
            .unwrap();
        assert_relative_eq!(img.tm_slope, 0.0);
    }

    #[test]
    fn test_missing_peak_catalog_is_error() {
        let geom = line_geom(2);
        let timing = PixelTiming {
            known: true,
            kinds: vec![TimingKind::WidthRel { level: 0.5 }],
            values: Array2::zeros((2, 1)),
            ..Default::default()
        };
        let mut img = image_along_x();
        let r = pixel_timing_analysis(
            &geom,
            &timing,
            &[50.0; 2],
            &[0, 1],
            &[false; 2],
            1.0,
            &mut img,
        );
        assert!(matches!(r, Err(Error::NoTiming { tel_id: 1 })));
    }

    #[test]
    fn test_insignificant_peaks_skipped() {
        let geom = line_geom(3);
        // Pixel 1 has no significant peak (negative marker).
        let timing = timing_with_peaks(&[10.0, -1.0, 14.0]);
        let amps = [50.0; 3];
        let pixels = [0usize, 1, 2];
        let mut img = image_along_x();
        pixel_timing_analysis(&geom, &timing, &amps, &pixels, &[false; 3], 1.0, &mut img)
            .unwrap();
        // Fit through pixels 0 and 2 only: still slope 20.
        assert_relative_eq!(img.tm_slope, 20.0, max_relative = 1e-9);
    }
}
