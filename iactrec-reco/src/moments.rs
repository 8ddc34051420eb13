//! Second-moment (Hillas) image parameterization.

use iactrec_core::{CameraGeometry, ImageParameters};

/// Inputs for one parameterization pass.
pub struct MomentsInput<'a> {
    /// Camera geometry of the telescope.
    pub geom: &'a CameraGeometry,
    /// Calibrated pixel amplitudes [p.e.].
    pub amps: &'a [f64],
    /// Pixel indices surviving cleaning, from the current pass.
    pub image_pixels: &'a [usize],
    /// Tag of the cleaning method/levels used.
    pub cut_id: u8,
    /// Pixels clamped at the clip ceiling during calibration.
    pub saturated: usize,
    /// Clip ceiling applied during calibration [p.e.]; 0 = none.
    pub clip_amp: f64,
}

/// Computes the amplitude-weighted ellipse parameters of a cleaned image
/// and fills the target image slot.
///
/// Returns `false` without marking the slot known when the image is not
/// viable (fewer than 2 pixels, or total amplitude below 1 p.e.). Angles
/// and positions are stored in radians at unit focal length.
pub fn second_moments(input: &MomentsInput<'_>, img: &mut ImageParameters) -> bool {
    let geom = input.geom;
    let amps = input.amps;
    let pixels = input.image_pixels;
    let img_scale = 1.0 / geom.focal_length;

    img.clear();
    img.num_sat = input.saturated;
    img.clip_amp = input.clip_amp;

    if pixels.len() < 2 {
        return false;
    }

    let mut sa = 0.0;
    let mut hot: Vec<(f64, usize)> = Vec::with_capacity(pixels.len());
    for &ipix in pixels {
        sa += amps[ipix];
        hot.push((amps[ipix], ipix));
    }
    if sa < 1.0 {
        return false;
    }

    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for &ipix in pixels {
        let x = geom.pixel_x[ipix];
        let y = geom.pixel_y[ipix];
        let a = amps[ipix];
        sx += a * x;
        sxx += a * x * x;
        sxy += a * x * y;
        sy += a * y;
        syy += a * y * y;
    }
    sx /= sa;
    sy /= sa;
    sxx = sxx / sa - sx * sx;
    sxy = sxy / sa - sx * sy;
    syy = syy / sa - sy * sy;

    let (a, b, length, width);
    if sxy.abs() > 1e-8 * sxx.abs() && sxy.abs() > 1e-8 * syy.abs() {
        let p1 = syy - sxx;
        let p2 = sxy * sxy;
        // The quadratic loses precision when the off-diagonal term is
        // tiny relative to the axis difference.
        let q = if p2 > 1e-8 * (p1 * p1) {
            p1 + (p1 * p1 + 4.0 * p2).sqrt()
        } else {
            2.0 * p2
        };
        b = 0.5 * q / sxy;
        a = sy - b * sx;
        let r1 = syy + 2.0 * p2 / q;
        length = if r1 > 0.0 { img_scale * r1.sqrt() } else { 0.0 };
        let r2 = sxx - 2.0 * p2 / q;
        width = if r2 > 0.0 { img_scale * r2.sqrt() } else { 0.0 };
    } else {
        // Axis-aligned ellipse; avoid dividing by a near-zero covariance.
        let mut sxx_d = sxx;
        let mut syy_d = syy;
        if syy_d.abs() < 1e-8 * sxx_d.abs() {
            syy_d = 0.0;
        } else if sxx_d.abs() < 1e-8 * syy_d.abs() {
            sxx_d = 0.0;
        }
        if sxx_d > syy_d && syy_d >= 0.0 {
            length = img_scale * sxx_d.sqrt();
            width = img_scale * syy_d.sqrt();
            b = 0.0;
            a = sy;
        } else if syy_d >= 0.0 && sxx_d >= 0.0 {
            length = img_scale * syy_d.sqrt();
            width = img_scale * sxx_d.sqrt();
            b = 100_000.0;
            a = sy - b * sx;
        } else {
            a = 0.0;
            b = 0.0;
            length = img_scale * 0.001;
            width = img_scale * 0.001;
        }
    }

    let beta = b.atan();
    let cb = beta.cos();
    let sb = beta.sin();
    let mut distance = img_scale * sx.hypot(sy);
    if distance == 0.0 {
        distance = img_scale * 0.001;
    }
    let miss = img_scale * a.abs() / (b * b + 1.0).sqrt();
    let mut alpha = if miss / distance <= 1.0 {
        (miss / distance).asin()
    } else {
        std::f64::consts::FRAC_PI_2
    };
    let mut xmean = img_scale * sx;
    let mut ymean = img_scale * sy;
    let mut direction = beta + geom.cam_rot;
    let orientation = sy.atan2(sx) + geom.cam_rot;
    if geom.cam_rot != 0.0 {
        let rmean = xmean.hypot(ymean);
        let rphi = ymean.atan2(xmean) + geom.cam_rot;
        xmean = rmean * rphi.cos();
        ymean = rmean * rphi.sin();
    }

    // Third/fourth moments along the major axis.
    let mut mxx = 0.0;
    let mut mx3 = 0.0;
    let mut mx4 = 0.0;
    for &ipix in pixels {
        let x = geom.pixel_x[ipix];
        let y = geom.pixel_y[ipix];
        let amp = amps[ipix];
        let xp = cb * (x - sx) + sb * (y - sy);
        mxx += amp * xp * xp;
        mx3 += amp * xp * xp * xp;
        mx4 += amp * xp * xp * xp * xp;
    }

    let skewness = mx3 / mxx.powf(1.5);
    if skewness < 0.0 {
        // An asymmetric image points away from the source; flip the axis
        // to the leading edge.
        alpha = std::f64::consts::PI - alpha;
        direction += std::f64::consts::PI;
    }
    let kurtosis = if mxx > 0.0 {
        mx4 / (mxx * mxx) - 3.0
    } else {
        0.0
    };

    hot.sort_by(|p, q| q.0.partial_cmp(&p.0).unwrap_or(std::cmp::Ordering::Equal));
    hot.truncate(5);
    log::debug!(
        "CT{} image: size {:.1} pe in {} pixels, w/l {:.4}/{:.4} deg, \
         dist {:.4} miss {:.4} alpha {:.2} orient {:.2} deg, hottest {:?}",
        geom.tel_id,
        sa,
        pixels.len(),
        width.to_degrees(),
        length.to_degrees(),
        distance.to_degrees(),
        miss.to_degrees(),
        alpha.to_degrees(),
        orientation.to_degrees(),
        hot
    );

    img.pixels = pixels.len();
    img.cut_id = input.cut_id;
    img.amplitude = sa;
    img.x = xmean;
    img.y = ymean;
    img.phi = direction;
    img.w = width;
    img.l = length;
    img.skewness = skewness;
    img.kurtosis = kurtosis;
    img.known = true;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn line_camera(points: &[(f64, f64)], cam_rot: f64) -> CameraGeometry {
        CameraGeometry {
            tel_id: 1,
            pixel_x: points.iter().map(|p| p.0).collect(),
            pixel_y: points.iter().map(|p| p.1).collect(),
            size: vec![0.05; points.len()],
            area: vec![0.002; points.len()],
            focal_length: 1.0,
            cam_rot,
            shape: None,
        }
    }

    fn run(geom: &CameraGeometry, amps: &[f64]) -> (ImageParameters, bool) {
        let pixels: Vec<usize> = (0..amps.len()).filter(|&i| amps[i] > 0.0).collect();
        let input = MomentsInput {
            geom,
            amps,
            image_pixels: &pixels,
            cut_id: 1,
            saturated: 0,
            clip_amp: 0.0,
        };
        let mut img = ImageParameters::default();
        let ok = second_moments(&input, &mut img);
        (img, ok)
    }

    #[test]
    fn test_elongated_image_axis() {
        // Bright pixels along the x axis, small spread in y.
        let geom = line_camera(
            &[(-0.2, 0.0), (-0.1, 0.01), (0.0, 0.0), (0.1, -0.01), (0.2, 0.0)],
            0.0,
        );
        let amps = [50.0, 80.0, 100.0, 80.0, 50.0];
        let (img, ok) = run(&geom, &amps);
        assert!(ok && img.known);
        assert!(img.l > img.w);
        assert_relative_eq!(img.amplitude, 360.0);
        // Axis close to the x direction.
        let phi = img.phi.sin().abs();
        assert!(phi < 0.1, "phi {}", img.phi);
    }

    #[test]
    fn test_degenerate_two_pixel_line() {
        // Two pixels on one line through the centroid: width floors at 0.
        let geom = line_camera(&[(-0.1, 0.0), (0.1, 0.0)], 0.0);
        let amps = [50.0, 50.0];
        let (img, ok) = run(&geom, &amps);
        assert!(ok);
        assert!(img.w.abs() < 1e-12, "width {}", img.w);
        assert!(img.w.is_finite() && img.l.is_finite());
        assert_relative_eq!(img.l, 0.1, max_relative = 1e-10);
    }

    #[test]
    fn test_rotation_invariance() {
        let base = [
            (-0.2, 0.05),
            (-0.1, 0.0),
            (0.0, 0.02),
            (0.1, 0.06),
            (0.25, 0.1),
        ];
        let amps = [30.0, 90.0, 120.0, 70.0, 20.0];
        let (img0, _) = run(&line_camera(&base, 0.0), &amps);

        let rot: f64 = 0.7;
        let rotated: Vec<(f64, f64)> = base
            .iter()
            .map(|&(x, y)| {
                (
                    x * rot.cos() - y * rot.sin(),
                    x * rot.sin() + y * rot.cos(),
                )
            })
            .collect();
        // Rotating the pixels and counter-rotating the camera leaves the
        // sky-frame parameters unchanged.
        let (img1, _) = run(&line_camera(&rotated, -rot), &amps);

        assert_abs_diff_eq!(img0.w, img1.w, epsilon = 1e-12);
        assert_abs_diff_eq!(img0.l, img1.l, epsilon = 1e-12);
        assert_abs_diff_eq!(img0.x, img1.x, epsilon = 1e-12);
        assert_abs_diff_eq!(img0.y, img1.y, epsilon = 1e-12);
    }

    #[test]
    fn test_too_few_pixels_leaves_slot_unknown() {
        let geom = line_camera(&[(0.0, 0.0), (0.1, 0.0)], 0.0);
        let amps = [100.0, 0.0];
        let (img, ok) = run(&geom, &amps);
        assert!(!ok);
        assert!(!img.known);
    }

    #[test]
    fn test_faint_image_rejected() {
        let geom = line_camera(&[(0.0, 0.0), (0.1, 0.0)], 0.0);
        let amps = [0.3, 0.4];
        let (img, ok) = run(&geom, &amps);
        assert!(!ok);
        assert!(!img.known);
        assert_relative_eq!(img.amplitude, 0.0);
    }

    #[test]
    fn test_skewed_image_flips_direction() {
        // Amplitude falling off to +x: negative skewness along the axis.
        let geom = line_camera(
            &[(-0.2, 0.0), (-0.1, 0.0), (0.0, 0.0), (0.1, 0.0), (0.2, 0.0)],
            0.0,
        );
        let rising = [10.0, 20.0, 40.0, 90.0, 200.0];
        let falling = [200.0, 90.0, 40.0, 20.0, 10.0];
        let (img_r, _) = run(&geom, &rising);
        let (img_f, _) = run(&geom, &falling);
        assert!(img_r.skewness * img_f.skewness < 0.0);
        assert_abs_diff_eq!(
            (img_r.phi - img_f.phi).abs(),
            std::f64::consts::PI,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_focal_length_scales_angles() {
        let mut geom = line_camera(&[(-0.1, 0.0), (0.0, 0.0), (0.1, 0.0)], 0.0);
        let amps = [50.0, 100.0, 50.0];
        let (img1, _) = run(&geom, &amps);
        geom.focal_length = 2.0;
        let (img2, _) = run(&geom, &amps);
        assert_relative_eq!(img1.l, 2.0 * img2.l, max_relative = 1e-12);
        assert_relative_eq!(img1.x, 2.0 * img2.x, max_relative = 1e-12);
    }
}
