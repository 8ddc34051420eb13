//! Geometric shower reconstruction from the major axes of telescope
//! images.
//!
//! Image parameters from each telescope are transformed to a common
//! reference frame first, then the weighted average intersection point
//! of all image-axis pairs gives the shower direction, and a second
//! intersection pass in the shower plane gives the core position.

use iactrec_core::{Error, Result, MAX_TEL};
use std::f64::consts::PI;

/// Images with less total amplitude than this contribute no axis line.
const MIN_PAIR_AMPLITUDE: f64 = 10.0;

/// Distance between a straight line and a point in space.
///
/// `p` is a reference point on the line and `dir` its direction
/// cosines. Returns -1.0 for a degenerate (zero) direction.
#[must_use]
pub fn line_point_distance(p: [f64; 3], dir: [f64; 3], q: [f64; 3]) -> f64 {
    let a1 = (q[1] - p[1]) * dir[2] - (q[2] - p[2]) * dir[1];
    let a2 = (q[2] - p[2]) * dir[0] - (q[0] - p[0]) * dir[2];
    let a3 = (q[0] - p[0]) * dir[1] - (q[1] - p[1]) * dir[0];
    let a = a1 * a1 + a2 * a2 + a3 * a3;
    let b = dir[0] * dir[0] + dir[1] * dir[1] + dir[2] * dir[2];
    if a < 0.0 || b <= 0.0 {
        return -1.0;
    }
    (a / b).sqrt()
}

/// Transform telescope and object Az/Alt angles to the offset the
/// object has in the camera plane.
///
/// Camera rotation is not accounted for here.
#[must_use]
pub fn angles_to_offset(
    obj_azimuth: f64,
    obj_altitude: f64,
    azimuth: f64,
    altitude: f64,
    focal_length: f64,
) -> (f64, f64) {
    let daz = obj_azimuth - azimuth;
    let coa = obj_altitude.cos();

    let xp0 = -daz.cos() * coa;
    let yp0 = daz.sin() * coa;
    let zp0 = obj_altitude.sin();

    let cx = altitude.sin();
    let sx = altitude.cos();

    let xp1 = cx * xp0 + sx * zp0;
    let yp1 = yp0;
    let zp1 = -sx * xp0 + cx * zp0;

    if xp1 == 0.0 && yp1 == 0.0 {
        // On-axis.
        return (0.0, 0.0);
    }
    let s = focal_length / zp1;
    (s * xp1, s * yp1)
}

/// Transform from the offset an object has in the camera plane to the
/// corresponding Az/Alt direction.
///
/// The offsets are assumed to be corrected for camera rotation already.
/// Returns `(azimuth, altitude)` with azimuth normalized to [0, 2pi).
#[must_use]
pub fn offset_to_angles(
    xoff: f64,
    yoff: f64,
    azimuth: f64,
    altitude: f64,
    focal_length: f64,
) -> (f64, f64) {
    if xoff == 0.0 && yoff == 0.0 {
        return (azimuth, altitude);
    }
    let d = (xoff * xoff + yoff * yoff).sqrt();
    let q = (d / focal_length).atan();

    let sq = q.sin();
    let xp1 = xoff * (sq / d);
    let yp1 = yoff * (sq / d);
    let zp1 = q.cos();

    let cx = altitude.sin();
    let sx = altitude.cos();

    let xp0 = cx * xp1 - sx * zp1;
    let yp0 = yp1;
    let zp0 = sx * xp1 + cx * zp1;

    let obj_altitude = zp0.asin();
    let mut obj_azimuth = yp0.atan2(-xp0) + azimuth;
    if obj_azimuth < 0.0 {
        obj_azimuth += 2.0 * PI;
    } else if obj_azimuth >= 2.0 * PI {
        obj_azimuth -= 2.0 * PI;
    }
    (obj_azimuth, obj_altitude)
}

/// Transformation matrix from the horizontal reference frame to one
/// with the z axis along the given Az/Alt direction and the x axis in
/// the plane defined by that direction and zenith.
#[must_use]
pub fn shower_trans_matrix(azimuth: f64, altitude: f64) -> [[f64; 3]; 3] {
    let cos_z = altitude.sin();
    let sin_z = altitude.cos();
    let cos_az = azimuth.cos();
    let sin_az = azimuth.sin();

    [
        [cos_z * cos_az, -cos_z * sin_az, -sin_z],
        [sin_az, cos_az, 0.0],
        [sin_z * cos_az, -sin_z * sin_az, cos_z],
    ]
}

/// Transform image position and axis angle from the camera plane of a
/// telescope looking at `(azimuth, altitude)` to the plane coordinate
/// system of a potential telescope with unit focal length looking at
/// the reference direction.
///
/// Rotation of image angles is accounted for but not imaging errors.
/// Returns `(x_ref, y_ref, phi_ref)`.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn cam_to_ref(
    ximg: f64,
    yimg: f64,
    phi: f64,
    ref_azimuth: f64,
    ref_altitude: f64,
    cam_rot: f64,
    azimuth: f64,
    altitude: f64,
    focal_length: f64,
) -> (f64, f64, f64) {
    let (ximg_rot, yimg_rot) = if cam_rot.abs() > 1e-14 {
        let c = cam_rot.cos();
        let s = cam_rot.sin();
        (ximg * c + yimg * s, yimg * c - ximg * s)
    } else {
        (ximg, yimg)
    };

    let (azm_img, alt_img) =
        offset_to_angles(ximg_rot, yimg_rot, azimuth, altitude, focal_length);
    let dphi1 = -((azm_img - azimuth).tan() * alt_img.sin()).atan();
    let (axref, ayref) = angles_to_offset(azm_img, alt_img, ref_azimuth, ref_altitude, 1.0);
    let dphi2 = -((azm_img - ref_azimuth).tan() * alt_img.sin()).atan();

    (axref, ayref, phi + cam_rot + (dphi2 - dphi1))
}

/// Outcome of intersecting a pair of straight lines in a plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intersection {
    /// A proper intersection point, with the angle at which the lines
    /// cross.
    Point { x: f64, y: f64, angle: f64 },
    /// Parallel but distinct lines.
    Parallel,
    /// The two lines coincide; the midpoint of the reference points is
    /// returned as a stand-in.
    SameLine { x: f64, y: f64 },
}

/// Intersects two straight lines given as a point and an axis angle.
#[must_use]
pub fn intersect_lines(
    xp1: f64,
    yp1: f64,
    phi1: f64,
    xp2: f64,
    yp2: f64,
    phi2: f64,
) -> Intersection {
    // Hesse normal form of both lines.
    let s1 = phi1.sin();
    let c1 = phi1.cos();
    let a1 = s1;
    let b1 = -c1;
    let c_1 = yp1 * c1 - xp1 * s1;

    let s2 = phi2.sin();
    let c2 = phi2.cos();
    let a2 = s2;
    let b2 = -c2;
    let c_2 = yp2 * c2 - xp2 * s2;

    let det_ab = a1 * b2 - a2 * b1;
    let det_bc = b1 * c_2 - b2 * c_1;
    let det_ca = c_1 * a2 - c_2 * a1;

    if det_ab.abs() < 1e-14 {
        if det_bc.abs() < 1e-14 && det_ca.abs() < 1e-14 {
            return Intersection::SameLine {
                x: 0.5 * (xp1 + xp2),
                y: 0.5 * (yp1 + yp2),
            };
        }
        return Intersection::Parallel;
    }

    let xs = det_bc / det_ab;
    let ys = det_ca / det_ab;

    let dx1 = xs - xp1;
    let dx2 = xs - xp2;
    let dy1 = ys - yp1;
    let dy2 = ys - yp2;
    let dr1 = (dx1 * dx1 + dy1 * dy1).sqrt();
    let dr2 = (dx2 * dx2 + dy2 * dy2).sqrt();
    let angle = if dr1 * dr2 == 0.0 {
        0.0
    } else {
        let cos_ang = (dx1 * dx2 + dy1 * dy2) / (dr1 * dr2);
        if cos_ang >= 1.0 {
            0.0
        } else if cos_ang <= -1.0 {
            PI
        } else {
            cos_ang.acos()
        }
    };

    Intersection::Point { x: xs, y: ys, angle }
}

/// How a pair of image-axis lines is weighted in the average of
/// intersection points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PairWeighting {
    /// Squared product of the reduced amplitude, the sine of the
    /// intersection angle, and both elongation (disp) factors. Prefers
    /// bright elongated images crossing at large angles.
    #[default]
    DispScaled,
    /// The smaller of the two amplitudes times the sine of the
    /// intersection angle.
    MinAmplitude,
}

impl PairWeighting {
    fn weight(self, amp_i: f64, amp_j: f64, sin_angle: f64, disp_i: f64, disp_j: f64) -> f64 {
        match self {
            Self::DispScaled => {
                // "Reduced amplitude" like reduced mass in celestial
                // dynamics.
                let amp_red = amp_i * amp_j / (amp_i + amp_j);
                let w = amp_red * sin_angle * disp_i * disp_j;
                w * w
            }
            Self::MinAmplitude => amp_i.min(amp_j) * sin_angle,
        }
    }
}

/// Which direction the core-position stage projects the telescope
/// positions along.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoreFrame {
    /// Project along the reconstructed shower direction.
    #[default]
    Reconstructed,
    /// Project along the nominal (reference) direction. May slightly
    /// improve the core accuracy for well-defined point sources.
    Nominal,
}

/// Per-telescope inputs to the geometric reconstruction.
#[derive(Debug, Clone)]
pub struct TelescopeImage {
    /// Total image amplitude [p.e.].
    pub amplitude: f64,
    /// Image c.o.g. x in the local camera frame.
    pub ximg: f64,
    /// Image c.o.g. y in the local camera frame.
    pub yimg: f64,
    /// Image major axis angle [rad].
    pub phi: f64,
    /// Elongation preference factor, typically `1 - width/length`.
    pub disp: f64,
    /// Telescope position in the array [m].
    pub position: [f64; 3],
    /// Telescope pointing azimuth [rad].
    pub azimuth: f64,
    /// Telescope pointing altitude [rad].
    pub altitude: f64,
    /// Focal length the image c.o.g. is scaled to (1.0 for radians).
    pub focal_length: f64,
    /// Camera rotation angle [rad].
    pub cam_rot: f64,
}

/// Reconstructed core position in ground coordinates (z = 0).
#[derive(Debug, Clone, Copy)]
pub struct CoreSolution {
    pub x: f64,
    pub y: f64,
    /// Variance between pair intersections, zero for exactly two
    /// images.
    pub variance: f64,
}

/// Reconstructed shower geometry.
#[derive(Debug, Clone, Copy)]
pub struct ShowerSolution {
    /// Shower azimuth [rad], normalized to [0, 2pi).
    pub azimuth: f64,
    /// Shower altitude [rad].
    pub altitude: f64,
    /// Variance between pair intersections of the direction stage,
    /// zero for exactly two images.
    pub var_dir: f64,
    /// Core position, absent when all axis pairs are parallel in the
    /// shower plane.
    pub core: Option<CoreSolution>,
}

/// Reconstructs the shower direction and core position by intersecting
/// pairs of image-axis lines.
///
/// Returns `Ok(None)` when no direction can be determined: fewer than
/// two images above the amplitude floor, or all usable axis pairs
/// parallel. That is a valid outcome for poor events, not an error.
///
/// # Errors
/// Fails with [`Error::TooManyTelescopes`] if more images are passed
/// than the reconstruction supports.
pub fn shower_geometric_reconstruction(
    images: &[TelescopeImage],
    ref_azimuth: f64,
    ref_altitude: f64,
    weighting: PairWeighting,
    core_frame: CoreFrame,
) -> Result<Option<ShowerSolution>> {
    let ntel = images.len();
    if ntel < 2 {
        return Ok(None);
    }
    if ntel > MAX_TEL {
        return Err(Error::TooManyTelescopes { n: ntel, max: MAX_TEL });
    }

    // Convert image positions to the common reference frame.
    let mut xang = vec![0.0; ntel];
    let mut yang = vec![0.0; ntel];
    let mut aphi = vec![0.0; ntel];
    for (itel, img) in images.iter().enumerate() {
        if img.amplitude <= MIN_PAIR_AMPLITUDE {
            continue;
        }
        let (x, y, p) = cam_to_ref(
            img.ximg,
            img.yimg,
            img.phi,
            ref_azimuth,
            ref_altitude,
            img.cam_rot,
            img.azimuth,
            img.altitude,
            img.focal_length,
        );
        xang[itel] = x;
        yang[itel] = y;
        aphi[itel] = p;
    }

    let mut sum_xs = 0.0;
    let mut sum_ys = 0.0;
    let mut sum_xs2 = 0.0;
    let mut sum_ys2 = 0.0;
    let mut sum_w = 0.0;
    for (itel, img_i) in images.iter().enumerate() {
        if img_i.amplitude <= MIN_PAIR_AMPLITUDE {
            continue;
        }
        for (jtel, img_j) in images.iter().enumerate().take(itel) {
            if img_j.amplitude <= MIN_PAIR_AMPLITUDE {
                continue;
            }
            let Intersection::Point { x: xs, y: ys, angle } = intersect_lines(
                xang[itel],
                yang[itel],
                aphi[itel],
                xang[jtel],
                yang[jtel],
                aphi[jtel],
            ) else {
                continue;
            };
            let w = weighting.weight(
                img_i.amplitude,
                img_j.amplitude,
                angle.sin(),
                img_i.disp,
                img_j.disp,
            );
            sum_xs += xs * w;
            sum_xs2 += xs * xs * w;
            sum_ys += ys * w;
            sum_ys2 += ys * ys * w;
            sum_w += w;
        }
    }

    if sum_w.abs() < 1e-10 {
        return Ok(None);
    }

    // Weighted average of intersection points.
    let mean_xs = sum_xs / sum_w;
    let mean_ys = sum_ys / sum_w;
    let var_dir = if ntel > 2 {
        (sum_xs2 / sum_w - mean_xs * mean_xs) + (sum_ys2 / sum_w - mean_ys * mean_ys)
    } else {
        0.0
    };

    let (mut azimuth, altitude) =
        offset_to_angles(mean_xs, mean_ys, ref_azimuth, ref_altitude, 1.0);
    azimuth -= 2.0 * PI * (azimuth / (2.0 * PI)).floor();

    // Transformation from horizontal coordinates to the shower plane.
    let trans = match core_frame {
        CoreFrame::Reconstructed => shower_trans_matrix(azimuth, altitude),
        CoreFrame::Nominal => shower_trans_matrix(ref_azimuth, ref_altitude),
    };

    // Parallel projection of the telescope positions onto the shower
    // plane (zt = 0).
    let mut xt = vec![0.0; ntel];
    let mut yt = vec![0.0; ntel];
    for (itel, img) in images.iter().enumerate() {
        let p = img.position;
        xt[itel] = trans[0][0] * p[0] + trans[0][1] * p[1] + trans[0][2] * p[2];
        yt[itel] = trans[1][0] * p[0] + trans[1][1] * p[1] + trans[1][2] * p[2];
    }

    let mut sum_xs = 0.0;
    let mut sum_ys = 0.0;
    let mut sum_xs2 = 0.0;
    let mut sum_ys2 = 0.0;
    let mut sum_w = 0.0;
    for (itel, img_i) in images.iter().enumerate() {
        if img_i.amplitude <= MIN_PAIR_AMPLITUDE {
            continue;
        }
        for (jtel, img_j) in images.iter().enumerate().take(itel) {
            if img_j.amplitude <= MIN_PAIR_AMPLITUDE {
                continue;
            }
            let Intersection::Point { x: xs, y: ys, angle } = intersect_lines(
                xt[itel],
                yt[itel],
                aphi[itel],
                xt[jtel],
                yt[jtel],
                aphi[jtel],
            ) else {
                continue;
            };
            let w = weighting.weight(
                img_i.amplitude,
                img_j.amplitude,
                angle.sin(),
                img_i.disp,
                img_j.disp,
            );
            sum_xs += xs * w;
            sum_xs2 += xs * xs * w;
            sum_ys += ys * w;
            sum_ys2 += ys * ys * w;
            sum_w += w;
        }
    }

    let core = if sum_w == 0.0 {
        None
    } else {
        let xs = sum_xs / sum_w;
        let ys = sum_ys / sum_w;
        // Back from the shower plane: the reverse matrix is the
        // transpose, but z is generally nonzero.
        let xh = trans[0][0] * xs + trans[1][0] * ys;
        let yh = trans[0][1] * xs + trans[1][1] * ys;
        let zh = trans[0][2] * xs + trans[1][2] * ys;

        // Extrapolation to the ground (detection level).
        let variance = if ntel > 2 {
            (sum_xs2 / sum_w - xs * xs) + (sum_ys2 / sum_w - ys * ys)
        } else {
            0.0
        };
        Some(CoreSolution {
            x: xh - trans[2][0] * zh / trans[2][2],
            y: yh - trans[2][1] * zh / trans[2][2],
            variance,
        })
    };

    Ok(Some(ShowerSolution {
        azimuth,
        altitude,
        var_dir,
        core,
    }))
}

/// Angle between two directions given in spherical coordinates [rad].
#[must_use]
pub fn angle_between(azimuth1: f64, altitude1: f64, azimuth2: f64, altitude2: f64) -> f64 {
    let ax1 = azimuth1.cos() * altitude1.cos();
    let ay1 = (-azimuth1).sin() * altitude1.cos();
    let az1 = altitude1.sin();
    let ax2 = azimuth2.cos() * altitude2.cos();
    let ay2 = (-azimuth2).sin() * altitude2.cos();
    let az2 = altitude2.sin();
    let cos_ang = ax1 * ax2 + ay1 * ay2 + az1 * az2;
    // Rounding errors can push us just outside the valid range.
    if cos_ang <= -1.0 {
        PI
    } else if cos_ang >= 1.0 {
        0.0
    } else {
        cos_ang.acos()
    }
}
