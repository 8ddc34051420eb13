//! Dual-threshold tailcut image cleaning.

use iactrec_core::CleaningConfig;

use crate::neighbors::NeighborGraph;

/// Selects the image pixels with the classical dual-level tail cut,
/// optionally truncated to pixels above a fraction of the n-th hottest
/// pixel's amplitude.
///
/// A pixel is selected if it passes the high threshold and has a
/// neighbor above the low threshold, or passes the low threshold and has
/// a neighbor above the high one. The truncation stops width and length
/// from growing further with increasing image intensity.
///
/// Returns the selected pixel indices; an empty result is a valid
/// outcome, not an error. The caller guards data availability.
#[must_use]
pub fn clean_image_tailcut(
    amps: &[f64],
    graph: &NeighborGraph,
    config: &CleaningConfig,
) -> Vec<usize> {
    let npix = amps.len();
    let mut pass_low = vec![false; npix];
    let mut pass_high = vec![false; npix];
    for ipix in 0..npix {
        pass_low[ipix] = amps[ipix] >= config.low;
        pass_high[ipix] = amps[ipix] >= config.high;
    }

    let mut selected = Vec::new();
    for ipix in 0..npix {
        let nb_passes = |levels: &[bool]| {
            graph.immediate(ipix).iter().any(|&j| levels[j as usize])
        };
        if pass_high[ipix] {
            if nb_passes(&pass_low) {
                selected.push(ipix);
            }
        } else if pass_low[ipix] && nb_passes(&pass_high) {
            selected.push(ipix);
        }
    }

    let lref = config.reference_rank;
    if lref > 0 && lref < selected.len() && config.min_fraction > 0.0 {
        selected.sort_by(|&a, &b| {
            amps[b]
                .partial_cmp(&amps[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let refamp = amps[selected[lref - 1]];
        if let Some(cut) = selected[lref..]
            .iter()
            .position(|&ipix| amps[ipix] < config.min_fraction * refamp)
        {
            selected.truncate(lref + cut);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use iactrec_core::{CameraGeometry, NeighborConfig};

    /// 7-pixel hexagonal camera, center pixel first.
    fn hex7_graph() -> NeighborGraph {
        let mut x = vec![0.0];
        let mut y = vec![0.0];
        for k in 0..6 {
            let a = f64::from(k) * std::f64::consts::FRAC_PI_3;
            x.push(a.cos());
            y.push(a.sin());
        }
        let geom = CameraGeometry {
            tel_id: 1,
            pixel_x: x,
            pixel_y: y,
            size: vec![1.0; 7],
            area: vec![3.0_f64.sqrt() / 2.0; 7],
            focal_length: 15.0,
            cam_rot: 0.0,
            shape: None,
        };
        NeighborGraph::build(&geom, &[false; 7], &NeighborConfig::default())
    }

    #[test]
    fn test_dual_threshold_selection() {
        let graph = hex7_graph();
        let mut amps = [0.0; 7];
        amps[0] = 100.0;
        amps[1] = 60.0;
        let config = CleaningConfig::default().with_thresholds(10.0, 50.0);
        let selected = clean_image_tailcut(&amps, &graph, &config);
        assert_eq!(selected, vec![0, 1]);
    }

    #[test]
    fn test_low_pixel_needs_high_neighbor() {
        let graph = hex7_graph();
        let mut amps = [0.0; 7];
        // Two low-threshold pixels next to each other, no high pixel.
        amps[1] = 20.0;
        amps[2] = 20.0;
        let config = CleaningConfig::default().with_thresholds(10.0, 50.0);
        assert!(clean_image_tailcut(&amps, &graph, &config).is_empty());
    }

    #[test]
    fn test_isolated_high_pixel_rejected() {
        let graph = hex7_graph();
        let mut amps = [0.0; 7];
        amps[3] = 500.0;
        let config = CleaningConfig::default().with_thresholds(10.0, 50.0);
        assert!(clean_image_tailcut(&amps, &graph, &config).is_empty());
    }

    #[test]
    fn test_raising_high_threshold_never_grows_image() {
        let graph = hex7_graph();
        let amps = [100.0, 60.0, 30.0, 12.0, 0.0, 0.0, 45.0];
        let mut last = usize::MAX;
        for high in [20.0, 40.0, 60.0, 90.0, 150.0] {
            let config = CleaningConfig::default().with_thresholds(10.0, high);
            let n = clean_image_tailcut(&amps, &graph, &config).len();
            assert!(n <= last, "high={high}: {n} > {last}");
            last = n;
        }
    }

    #[test]
    fn test_top_fraction_truncation() {
        let graph = hex7_graph();
        // All pixels in the image, strongly falling amplitudes.
        let amps = [200.0, 150.0, 100.0, 20.0, 15.0, 12.0, 11.0];
        let config = CleaningConfig::default()
            .with_thresholds(5.0, 50.0)
            .with_truncation(3, 0.5);
        let selected = clean_image_tailcut(&amps, &graph, &config);
        // Reference is the 3rd hottest pixel (100); the 50% cut drops
        // everything below 50, keeping the three hottest.
        assert_eq!(selected, vec![0, 1, 2]);
    }
}
