//! Packed pixel adjacency lists with distance tiers, plus one-time pixel
//! shape inference from the bearing distribution of immediate neighbors.

use iactrec_core::{CameraGeometry, NeighborConfig, PixelShape};

/// Flat adjacency storage: per-pixel slices into one contiguous index array.
#[derive(Debug, Clone, Default)]
pub struct PackedAdjacency {
    offsets: Vec<u32>,
    indices: Vec<u32>,
}

impl PackedAdjacency {
    fn from_lists(lists: &[Vec<u32>]) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let mut indices = Vec::new();
        offsets.push(0);
        for list in lists {
            indices.extend_from_slice(list);
            #[allow(clippy::cast_possible_truncation)]
            offsets.push(indices.len() as u32);
        }
        Self { offsets, indices }
    }

    /// Neighbor indices of one pixel.
    #[inline]
    pub fn of(&self, ipix: usize) -> &[u32] {
        let lo = self.offsets[ipix] as usize;
        let hi = self.offsets[ipix + 1] as usize;
        &self.indices[lo..hi]
    }

    /// Number of neighbors of one pixel.
    #[inline]
    pub fn count(&self, ipix: usize) -> usize {
        (self.offsets[ipix + 1] - self.offsets[ipix]) as usize
    }

    /// True if the adjacency holds no pixel entries at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.len() <= 1
    }
}

/// Per-camera neighbor graph: three nested distance tiers plus an
/// independent wider extension tier.
///
/// A pixel pair lands in the innermost tier whose distance threshold it
/// satisfies; tiers with a non-positive ratio stay empty. Built once per
/// run and cached by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct NeighborGraph {
    num_pixels: usize,
    tiers: [PackedAdjacency; 3],
    extension: PackedAdjacency,
    /// Shape inferred from neighbor bearings, if the camera definition
    /// did not state one.
    pub inferred_shape: Option<PixelShape>,
}

/// Bearing histogram buckets at 0/60/90/120/30/150 degrees, in the
/// order the shape heuristics consult them.
#[derive(Debug, Default)]
struct BearingStats {
    deg0: u32,
    deg60: u32,
    deg90: u32,
    deg120: u32,
}

impl BearingStats {
    fn record(&mut self, dx: f64, dy: f64) {
        let mut a = dy.atan2(dx).to_degrees();
        if a < -1.0 {
            a += 180.0;
        }
        #[allow(clippy::cast_possible_truncation)]
        let ia = (((a + 0.5) / 5.0) as i32) * 5;
        match ia {
            0 => self.deg0 += 1,
            60 => self.deg60 += 1,
            90 => self.deg90 += 1,
            120 => self.deg120 += 1,
            _ => {}
        }
    }
}

impl NeighborGraph {
    /// Builds the neighbor graph for one camera.
    ///
    /// Distance tiers compare squared pixel distance against
    /// `ratio^2 * (0.5 * (size_i + size_j))^2`. An unset immediate-tier
    /// ratio defaults to 1.2, or 1.6 for square-pixel cameras so that
    /// diagonal neighbors are included.
    #[must_use]
    pub fn build(geom: &CameraGeometry, disabled: &[bool], config: &NeighborConfig) -> Self {
        let npix = geom.num_pixels();
        let default_immediate = match geom.shape {
            Some(PixelShape::Square) => 1.6,
            _ => 1.2,
        };
        let mut ratios = config.ratios;
        if ratios[0] <= 0.0 {
            ratios[0] = default_immediate;
        }
        let ratio2: Vec<f64> = ratios.iter().map(|r| r * r).collect();
        let ext2 = config.extension_ratio * config.extension_ratio;

        let mut tier_lists: [Vec<Vec<u32>>; 3] = [
            vec![Vec::new(); npix],
            vec![Vec::new(); npix],
            vec![Vec::new(); npix],
        ];
        let mut ext_lists: Vec<Vec<u32>> = vec![Vec::new(); npix];
        let mut stats = BearingStats::default();
        let mut area_sum = 0.0;
        let mut size_sum = 0.0;
        let mut active = 0usize;

        for i in 0..npix {
            if disabled[i] {
                continue;
            }
            active += 1;
            area_sum += geom.area[i];
            size_sum += geom.size[i];
            for j in 0..i {
                if disabled[j] {
                    continue;
                }
                let half_ds = 0.5 * (geom.size[i] + geom.size[j]);
                let dx = geom.pixel_x[i] - geom.pixel_x[j];
                let dy = geom.pixel_y[i] - geom.pixel_y[j];
                let d2 = dx * dx + dy * dy;
                let scale = half_ds * half_ds;
                for (tier, r2) in ratio2.iter().enumerate() {
                    if ratios[tier] > 0.0 && d2 < r2 * scale {
                        #[allow(clippy::cast_possible_truncation)]
                        {
                            tier_lists[tier][i].push(j as u32);
                            tier_lists[tier][j].push(i as u32);
                        }
                        if tier == 0 {
                            stats.record(dx, dy);
                        }
                        break;
                    }
                }
                if config.extension_ratio > 0.0 && d2 < ext2 * scale {
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        ext_lists[i].push(j as u32);
                        ext_lists[j].push(i as u32);
                    }
                }
            }
        }

        let inferred_shape = if geom.shape.is_some() {
            None
        } else {
            Some(infer_shape(geom.tel_id, &stats, area_sum, size_sum, active))
        };

        Self {
            num_pixels: npix,
            tiers: [
                PackedAdjacency::from_lists(&tier_lists[0]),
                PackedAdjacency::from_lists(&tier_lists[1]),
                PackedAdjacency::from_lists(&tier_lists[2]),
            ],
            extension: PackedAdjacency::from_lists(&ext_lists),
            inferred_shape,
        }
    }

    /// Number of pixels covered by the graph.
    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.num_pixels
    }

    /// Adjacency of one distance tier (0..=2).
    #[inline]
    pub fn tier(&self, tier: usize) -> &PackedAdjacency {
        &self.tiers[tier]
    }

    /// Immediate (tier-0) neighbors of one pixel.
    #[inline]
    pub fn immediate(&self, ipix: usize) -> &[u32] {
        self.tiers[0].of(ipix)
    }

    /// The independent wider extension tier.
    #[inline]
    pub fn extension(&self) -> &PackedAdjacency {
        &self.extension
    }
}

/// Shape heuristics on the tier-0 bearing histogram, cross-checked
/// against the mean area / size^2 ratio of the pixels.
fn infer_shape(
    tel_id: u16,
    stats: &BearingStats,
    area_sum: f64,
    size_sum: f64,
    active: usize,
) -> PixelShape {
    let n = active as f64 + 1e-10;
    let aod2 = (area_sum / n) / ((size_sum / n) * (size_sum / n));
    let sqrt3_2 = 3.0_f64.sqrt() / 2.0;
    let pi_4 = std::f64::consts::FRAC_PI_4;

    if stats.deg0 > 0 && stats.deg90 > 0 && stats.deg60 == 0 && stats.deg120 == 0 {
        if !(0.99..=1.01).contains(&aod2) {
            log::warn!(
                "pixel positions in telescope {tel_id} indicate square pixels \
                 but area/size^2 = {aod2:.3} does not match"
            );
        }
        return PixelShape::Square;
    }

    let mut shape = if 4 * stats.deg90 < stats.deg60 + stats.deg120 {
        PixelShape::HexFlat
    } else if stats.deg90 > 0 && stats.deg0 == 0 {
        PixelShape::HexPointy
    } else {
        if !(0.99 * pi_4..=1.01 * pi_4).contains(&aod2) {
            log::warn!(
                "pixel positions in telescope {tel_id} indicate round pixels \
                 but area/size^2 = {aod2:.3} does not match"
            );
        }
        return PixelShape::Circular;
    };

    if !(0.99 * sqrt3_2..=1.01 * sqrt3_2).contains(&aod2) {
        if (0.99 * pi_4..=1.01 * pi_4).contains(&aod2) {
            // Round pixels laid out on a hexagonal pattern.
            shape = PixelShape::Circular;
        } else {
            log::warn!(
                "pixel positions in telescope {tel_id} indicate hexagonal pixels \
                 but area/size^2 = {aod2:.3} matches neither {sqrt3_2:.3} nor {pi_4:.3}"
            );
        }
    }
    shape
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// 7-pixel hexagonal camera: one center pixel and six at unit spacing.
    fn hex7() -> CameraGeometry {
        let mut x = vec![0.0];
        let mut y = vec![0.0];
        for k in 0..6 {
            let a = f64::from(k) * std::f64::consts::FRAC_PI_3;
            x.push(a.cos());
            y.push(a.sin());
        }
        CameraGeometry {
            tel_id: 1,
            pixel_x: x,
            pixel_y: y,
            size: vec![1.0; 7],
            area: vec![3.0_f64.sqrt() / 2.0; 7],
            focal_length: 15.0,
            cam_rot: 0.0,
            shape: None,
        }
    }

    #[test]
    fn test_hex7_immediate_neighbors() {
        let geom = hex7();
        let graph = NeighborGraph::build(&geom, &[false; 7], &NeighborConfig::default());
        assert_eq!(graph.immediate(0).len(), 6);
        // Ring pixels see the center and their two ring neighbors.
        for i in 1..7 {
            assert_eq!(graph.immediate(i).len(), 3, "pixel {i}");
            assert!(graph.immediate(i).contains(&0));
        }
    }

    #[test]
    fn test_symmetry() {
        let geom = hex7();
        let graph = NeighborGraph::build(&geom, &[false; 7], &NeighborConfig::default());
        for i in 0..7 {
            for &j in graph.immediate(i) {
                assert!(
                    graph.immediate(j as usize).contains(&(i as u32)),
                    "asymmetric pair ({i}, {j})"
                );
            }
        }
    }

    #[test]
    fn test_disabled_pixels_excluded() {
        let geom = hex7();
        let mut disabled = [false; 7];
        disabled[1] = true;
        let graph = NeighborGraph::build(&geom, &disabled, &NeighborConfig::default());
        assert_eq!(graph.immediate(0).len(), 5);
        assert!(graph.immediate(1).is_empty());
    }

    #[test]
    fn test_tier_assignment_is_exclusive() {
        let geom = hex7();
        let config = NeighborConfig {
            ratios: [1.2, 2.2, 0.0],
            extension_ratio: 2.2,
        };
        let graph = NeighborGraph::build(&geom, &[false; 7], &config);
        // Opposite ring pixels are at distance 2: tier 1 only.
        assert!(!graph.immediate(1).contains(&4));
        assert!(graph.tier(1).of(1).contains(&4));
        // The extension tier is independent and contains both distances.
        assert!(graph.extension().of(1).contains(&2));
        assert!(graph.extension().of(1).contains(&4));
    }

    #[test]
    fn test_shape_inference_hex() {
        let geom = hex7();
        let graph = NeighborGraph::build(&geom, &[false; 7], &NeighborConfig::default());
        let shape = graph.inferred_shape.unwrap();
        assert!(shape.is_hexagonal(), "got {shape:?}");
    }

    #[test]
    fn test_shape_inference_square() {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for iy in 0..3 {
            for ix in 0..3 {
                x.push(f64::from(ix));
                y.push(f64::from(iy));
            }
        }
        let geom = CameraGeometry {
            tel_id: 2,
            pixel_x: x,
            pixel_y: y,
            size: vec![1.0; 9],
            area: vec![1.0; 9],
            focal_length: 15.0,
            cam_rot: 0.0,
            shape: None,
        };
        let graph = NeighborGraph::build(&geom, &[false; 9], &NeighborConfig::default());
        assert_eq!(graph.inferred_shape, Some(PixelShape::Square));
    }

    #[test]
    fn test_area_ratio_math() {
        // Sanity on the hex pixel area used in the fixtures.
        assert_abs_diff_eq!(3.0_f64.sqrt() / 2.0, 0.866, epsilon = 1e-3);
    }
}
