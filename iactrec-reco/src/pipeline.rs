//! Event-level orchestration: per-telescope contexts with cached derived
//! state, the image reconstruction chain and the shower geometry stage.

use iactrec_core::calib::{ReferencePulse, TelescopeCalibration};
use iactrec_core::config::TelescopeTypeParams;
use iactrec_core::event::{ArrayEvent, TelescopeEvent};
use iactrec_core::run::RunSetup;
use iactrec_core::{
    CameraGeometry, CameraRadius, Error, ImageParameters, Result, ShowerParameters, MAX_GAINS,
    MAX_TEL,
};

use crate::calibrate::{calibrate_amplitude, AmplitudeSource};
use crate::clean::clean_image_tailcut;
use crate::geometry::{
    shower_geometric_reconstruction, CoreFrame, PairWeighting, TelescopeImage,
};
use crate::integrate::{integration_correction, make_integrator, IntegrationInput};
use crate::moments::{second_moments, MomentsInput};
use crate::neighbors::NeighborGraph;
use crate::timing::pixel_timing_analysis;

/// Fraction of the effective camera radius inside which an image
/// centroid must lie to be trusted by the geometry stage.
const MAX_COG_FRACTION: f64 = 0.8;

/// Elongation fallback for images with degenerate length.
const MIN_DISP: f64 = 1e-3;

/// Cut-id tag of the second image derived from pixel timing.
const TIMING_CUT_ID: u8 = 2;

/// Everything the pipeline knows about one telescope, plus caches of
/// derived per-run state. Events only pass through; this context stays.
#[derive(Debug)]
pub struct TelescopeContext {
    geom: CameraGeometry,
    calib: TelescopeCalibration,
    pulse: ReferencePulse,
    params: TelescopeTypeParams,
    disabled: Vec<bool>,
    graph: Option<NeighborGraph>,
    correction: Option<[f64; MAX_GAINS]>,
    radius: Option<CameraRadius>,
    // Scratch buffers reused across events.
    amps: Vec<f64>,
    image_pixels: Vec<usize>,
}

impl TelescopeContext {
    fn new(
        mut geom: CameraGeometry,
        calib: TelescopeCalibration,
        pulse: ReferencePulse,
        params: TelescopeTypeParams,
    ) -> Self {
        if let Some(flen) = params.focal_length {
            geom.focal_length = flen;
        }
        let npix = geom.num_pixels();
        Self {
            geom,
            calib,
            pulse,
            params,
            disabled: vec![false; npix],
            graph: None,
            correction: None,
            radius: None,
            amps: vec![0.0; npix],
            image_pixels: Vec::new(),
        }
    }

    /// Camera geometry of this telescope.
    #[inline]
    pub fn geometry(&self) -> &CameraGeometry {
        &self.geom
    }

    /// Per-telescope parameters.
    #[inline]
    pub fn params(&self) -> &TelescopeTypeParams {
        &self.params
    }

    /// Disabled-pixel mask.
    #[inline]
    pub fn disabled(&self) -> &[bool] {
        &self.disabled
    }

    /// Calibrated amplitudes of the most recent calibration pass.
    #[inline]
    pub fn amplitudes(&self) -> &[f64] {
        &self.amps
    }

    /// Pixels surviving cleaning in the most recent image pass.
    #[inline]
    pub fn image_pixels(&self) -> &[usize] {
        &self.image_pixels
    }

    /// Marks pixels to be ignored in the analysis: pixels outside the
    /// clipped active camera radius, an optional random fraction of
    /// broken pixels, and pixels with HV turned off.
    ///
    /// `rng` supplies uniform deviates in [0, 1) for the broken-pixel
    /// draw; it is not consulted when the configured fraction is zero.
    /// Returns the number of disabled pixels. The neighbor graph and the
    /// camera radius are rebuilt on next use.
    pub fn set_disabled_pixels(
        &mut self,
        hv_disabled: &[usize],
        mut rng: impl FnMut() -> f64,
    ) -> usize {
        let clip_radius = if self.params.camera_clipping_deg > 0.0 {
            self.params.camera_clipping_deg.to_radians().tan() * self.geom.focal_length
        } else {
            0.0
        };
        let fraction = self.params.broken_pixels_fraction;

        for ipix in 0..self.geom.num_pixels() {
            let mut off = false;
            if clip_radius > 0.0
                && self.geom.pixel_r(ipix) + 0.5 * self.geom.size[ipix] >= clip_radius
            {
                off = true;
            }
            if fraction > 0.0 && rng() < fraction {
                off = true;
            }
            if hv_disabled.contains(&ipix) {
                off = true;
            }
            self.disabled[ipix] = off;
        }

        self.graph = None;
        self.radius = None;
        self.image_pixels.clear();
        self.disabled.iter().filter(|&&d| d).count()
    }

    /// Builds the neighbor graph now instead of lazily on first use.
    ///
    /// # Errors
    /// Fails if the graph was already built for the current
    /// disabled-pixel mask.
    pub fn build_neighbors(&mut self) -> Result<()> {
        if self.graph.is_some() {
            return Err(Error::NeighborsAlreadyBuilt {
                tel_id: self.geom.tel_id,
            });
        }
        self.graph = Some(NeighborGraph::build(
            &self.geom,
            &self.disabled,
            &self.params.neighbors,
        ));
        Ok(())
    }

    /// The neighbor graph, built on first use.
    pub fn neighbors(&mut self) -> &NeighborGraph {
        let Self {
            graph,
            geom,
            disabled,
            params,
            ..
        } = self;
        graph.get_or_insert_with(|| NeighborGraph::build(geom, disabled, &params.neighbors))
    }

    /// Effective and maximum camera radius, ignoring disabled pixels.
    pub fn camera_radius(&mut self) -> Result<CameraRadius> {
        if let Some(r) = self.radius {
            return Ok(r);
        }
        let r = self.geom.radius(&self.disabled)?;
        log::info!(
            "telescope {}: camera radius {:.4} rad effective, {:.4} rad max",
            self.geom.tel_id,
            r.effective,
            r.max
        );
        self.radius = Some(r);
        Ok(r)
    }

    /// Per-gain integration correction for the configured window,
    /// computed once per run from the reference pulse shape.
    fn window_correction(&mut self) -> [f64; MAX_GAINS] {
        if let Some(c) = self.correction {
            return c;
        }
        let c = match &self.params.integration {
            Some(cfg) if !cfg.no_rescale => {
                integration_correction(&self.pulse, MAX_GAINS, cfg.window, cfg.offset)
            }
            // Correction values <= 0 are skipped by the integrators.
            _ => [0.0; MAX_GAINS],
        };
        self.correction = Some(c);
        c
    }
}

/// The reconstruction pipeline for one run: array setup plus one
/// [`TelescopeContext`] per telescope, in run sequence order.
///
/// Single-threaded by design; all per-event scratch state lives in the
/// telescope contexts and is reused from event to event.
#[derive(Debug)]
pub struct ReconstructionPipeline {
    setup: RunSetup,
    tels: Vec<TelescopeContext>,
    weighting: PairWeighting,
    core_frame: CoreFrame,
    amp_source: AmplitudeSource,
    cut_id: u8,
    dual_image: bool,
}

impl ReconstructionPipeline {
    #[must_use]
    pub fn new(setup: RunSetup) -> Self {
        Self {
            setup,
            tels: Vec::new(),
            weighting: PairWeighting::default(),
            core_frame: CoreFrame::default(),
            amp_source: AmplitudeSource::default(),
            // Classical two-level tailcut.
            cut_id: 1,
            dual_image: false,
        }
    }

    /// Replaces the pair-weighting policy of the geometry stage.
    #[must_use]
    pub fn with_pair_weighting(mut self, weighting: PairWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Selects the direction the core stage projects along.
    #[must_use]
    pub fn with_core_frame(mut self, frame: CoreFrame) -> Self {
        self.core_frame = frame;
        self
    }

    /// Selects where pixel amplitudes are taken from.
    #[must_use]
    pub fn with_amplitude_source(mut self, source: AmplitudeSource) -> Self {
        self.amp_source = source;
        self
    }

    /// Reconstructs a second image per telescope from timing-correlated
    /// amplitudes, into image slot 1, where a second slot exists.
    #[must_use]
    pub fn with_dual_image(mut self, dual: bool) -> Self {
        self.dual_image = dual;
        self
    }

    /// Registers the next telescope of the run.
    ///
    /// Telescopes are added in run sequence order; the returned sequence
    /// index matches the positions and pointing in the run setup.
    pub fn add_telescope(
        &mut self,
        geom: CameraGeometry,
        calib: TelescopeCalibration,
        pulse: ReferencePulse,
        params: TelescopeTypeParams,
    ) -> Result<usize> {
        let seq = self.tels.len();
        if seq >= MAX_TEL {
            return Err(Error::TooManyTelescopes {
                n: seq + 1,
                max: MAX_TEL,
            });
        }
        if seq >= self.setup.num_telescopes() {
            return Err(Error::InvalidTelescope {
                index: seq,
                ntel: self.setup.num_telescopes(),
            });
        }
        self.tels.push(TelescopeContext::new(geom, calib, pulse, params));
        Ok(seq)
    }

    /// Number of registered telescopes.
    #[inline]
    pub fn num_telescopes(&self) -> usize {
        self.tels.len()
    }

    pub fn telescope(&self, seq: usize) -> Result<&TelescopeContext> {
        self.tels.get(seq).ok_or(Error::InvalidTelescope {
            index: seq,
            ntel: self.tels.len(),
        })
    }

    pub fn telescope_mut(&mut self, seq: usize) -> Result<&mut TelescopeContext> {
        let ntel = self.tels.len();
        self.tels
            .get_mut(seq)
            .ok_or(Error::InvalidTelescope { index: seq, ntel })
    }

    /// Re-sums the pixel intensities of one telescope from its sampled
    /// traces, using the configured integration scheme.
    ///
    /// A telescope without an integration config keeps its readout sums.
    pub fn pixel_integration(&mut self, event: &mut ArrayEvent, seq: usize) -> Result<()> {
        let ntel = self.tels.len();
        let ctx = self
            .tels
            .get_mut(seq)
            .ok_or(Error::InvalidTelescope { index: seq, ntel })?;
        let Some(cfg) = ctx.params.integration.clone() else {
            return Ok(());
        };
        let correction = ctx.window_correction();
        ctx.neighbors();

        let tel = event
            .telescopes
            .get_mut(seq)
            .ok_or(Error::InvalidTelescope { index: seq, ntel })?;
        let tel_id = tel.tel_id;
        let TelescopeEvent { raw, timing, .. } = tel;
        let raw = raw.as_mut().ok_or(Error::NoEventData { tel_id })?;
        let Some(graph) = ctx.graph.as_ref() else {
            return Ok(());
        };

        let integrator = make_integrator(&cfg);
        log::trace!("telescope {tel_id}: pixel integration via {}", integrator.name());
        integrator.integrate(IntegrationInput {
            raw,
            calib: &ctx.calib,
            graph,
            correction: &correction,
            timing: timing.as_mut(),
        })
    }

    /// Calibrates, cleans and parameterizes the image of one telescope,
    /// including the optional timing analysis and the optional second
    /// image from timing-correlated amplitudes.
    pub fn image_reconstruct(&mut self, event: &mut ArrayEvent, seq: usize) -> Result<()> {
        let ntel = self.tels.len();
        let ctx = self
            .tels
            .get_mut(seq)
            .ok_or(Error::InvalidTelescope { index: seq, ntel })?;
        if event.telescopes.len() <= seq {
            return Err(Error::InvalidTelescope { index: seq, ntel });
        }

        let tel = &event.telescopes[seq];
        let tel_id = tel.tel_id;
        if tel.images.is_empty() {
            return Err(Error::NoImageSlot { tel_id, slot: 0 });
        }
        let dual = self.dual_image && tel.images.len() >= 2;
        let slot = if dual {
            0
        } else {
            tel.select_image_slot(self.cut_id)
        };
        // In dual-image mode the first image always comes from the plain
        // integrated amplitudes.
        let source = if dual {
            AmplitudeSource::Integrated
        } else {
            self.amp_source
        };

        Self::image_pass(ctx, event, seq, source, self.cut_id, slot)?;

        if dual {
            let source = if self.amp_source == AmplitudeSource::Integrated {
                AmplitudeSource::TimingLocal
            } else {
                self.amp_source
            };
            Self::image_pass(ctx, event, seq, source, TIMING_CUT_ID, 1)?;
        }
        Ok(())
    }

    /// One calibrate/clean/moments/timing pass into a given image slot.
    fn image_pass(
        ctx: &mut TelescopeContext,
        event: &mut ArrayEvent,
        seq: usize,
        source: AmplitudeSource,
        cut_id: u8,
        slot: usize,
    ) -> Result<()> {
        let tel = &mut event.telescopes[seq];
        let outcome = calibrate_amplitude(
            tel,
            &ctx.calib,
            &ctx.params,
            &ctx.disabled,
            source,
            &mut ctx.amps,
        )?;
        if outcome.trigger.untriggered {
            log::debug!(
                "telescope {}: trigger lost after disabling pixels {:?}",
                tel.tel_id,
                outcome.trigger.dropped_pixels
            );
            event.drop_telescope(seq);
        }

        let TelescopeContext {
            graph,
            geom,
            disabled,
            params,
            amps,
            image_pixels,
            pulse,
            ..
        } = ctx;
        let graph =
            &*graph.get_or_insert_with(|| NeighborGraph::build(geom, disabled, &params.neighbors));
        *image_pixels = clean_image_tailcut(amps, graph, &params.cleaning);

        let geom: &CameraGeometry = geom;
        let amps: &[f64] = amps;
        let image_pixels: &[usize] = image_pixels;
        let disabled: &[bool] = disabled;

        let tel = &mut event.telescopes[seq];
        let img = &mut tel.images[slot];
        let found = second_moments(
            &MomentsInput {
                geom,
                amps,
                image_pixels,
                cut_id,
                saturated: outcome.saturated,
                clip_amp: params.clip_amp,
            },
            img,
        );

        // The timing analysis is optional and allowed to fail.
        if found && source == AmplitudeSource::Integrated {
            if let Some(timing) = tel.timing.as_ref() {
                let time_slice = if pulse.time_slice > 0.0 {
                    pulse.time_slice
                } else {
                    1.0
                };
                if let Err(e) = pixel_timing_analysis(
                    geom,
                    timing,
                    amps,
                    image_pixels,
                    disabled,
                    time_slice,
                    img,
                ) {
                    log::debug!("telescope {}: no timing parameters: {e}", tel.tel_id);
                }
            }
        }
        Ok(())
    }

    /// Geometric shower reconstruction from the usable telescope images.
    ///
    /// Fills `event.shower` and returns the number of images used; fewer
    /// than two usable images leave the shower unknown, which is a valid
    /// outcome.
    pub fn shower_reconstruct(&mut self, event: &mut ArrayEvent) -> Result<usize> {
        event.shower = ShowerParameters::default();

        let ntel = self.tels.len().min(event.telescopes.len());
        let mut images = Vec::new();
        let mut used_ids = Vec::new();
        let mut num_trg = 0usize;
        for seq in 0..ntel {
            let tel = &event.telescopes[seq];
            if !tel.known || tel.images.is_empty() {
                continue;
            }
            num_trg += 1;
            let Some(img) = Self::select_shower_image(tel, self.cut_id) else {
                continue;
            };
            let ctx = &mut self.tels[seq];
            if img.amplitude < ctx.params.effective_min_amp()
                || img.pixels < ctx.params.min_pix
            {
                continue;
            }
            let radius = ctx.camera_radius()?;
            if img.x.hypot(img.y) > MAX_COG_FRACTION * radius.effective {
                continue;
            }
            let disp = if img.l > 0.0 && img.l > img.w {
                1.0 - img.w / img.l
            } else {
                MIN_DISP
            };
            let (azimuth, altitude) = self
                .setup
                .pointing
                .get(seq)
                .map_or((self.setup.reference_az, self.setup.reference_alt), |p| {
                    p.effective()
                });
            images.push(TelescopeImage {
                amplitude: img.amplitude,
                ximg: img.x,
                yimg: img.y,
                phi: img.phi,
                disp,
                position: self.setup.tel_positions.get(seq).copied().unwrap_or([0.0; 3]),
                azimuth,
                altitude,
                // Image coordinates are already in radians; camera
                // rotation was folded in by the moments stage.
                focal_length: 1.0,
                cam_rot: 0.0,
            });
            used_ids.push(tel.tel_id);
        }

        let num_img = images.len();
        if num_img < 2 {
            return Ok(0);
        }

        let Some(sol) = shower_geometric_reconstruction(
            &images,
            self.setup.reference_az,
            self.setup.reference_alt,
            self.weighting,
            self.core_frame,
        )?
        else {
            return Ok(0);
        };

        let shower = &mut event.shower;
        shower.known = true;
        shower.num_trg = num_trg;
        shower.num_img = num_img;
        shower.img_list = used_ids;
        shower.az = sol.azimuth;
        shower.alt = sol.altitude;
        if num_img > 2 {
            // Equal contributions in both coordinates assumed.
            shower.err_dir = (sol.var_dir / (num_img as f64 - 2.0) / 2.0).sqrt();
        }
        if let Some(core) = sol.core {
            shower.xc = core.x;
            shower.yc = core.y;
            if num_img > 2 {
                shower.err_core = (core.variance / (num_img as f64 - 2.0) / 2.0).sqrt();
                shower.result_bits = 15;
            } else {
                shower.result_bits = 5;
            }
        } else if num_img > 2 {
            shower.result_bits = 3;
        } else {
            shower.result_bits = 1;
        }

        log::debug!(
            "shower reconstructed from {num_img} images: az {:.4} rad, alt {:.4} rad, bits {:#06b}",
            shower.az,
            shower.alt,
            shower.result_bits
        );
        Ok(num_img)
    }

    /// Image of the requested cleaning tag; a general tag (0 or 1) also
    /// accepts the first known image as fallback.
    fn select_shower_image(tel: &TelescopeEvent, cut_id: u8) -> Option<&ImageParameters> {
        if let Some(img) = tel
            .images
            .iter()
            .find(|img| img.known && img.cut_id == cut_id)
        {
            return Some(img);
        }
        if cut_id <= 1 {
            return tel.images.iter().find(|img| img.known);
        }
        None
    }

    /// Full event reconstruction: per-telescope re-integration and image
    /// reconstruction where the telescope's level asks for it, then the
    /// shower geometry stage.
    pub fn reconstruct_event(&mut self, event: &mut ArrayEvent) -> Result<()> {
        let ntel = self.tels.len().min(event.telescopes.len());
        let have_raw = event
            .telescopes
            .iter()
            .take(ntel)
            .any(|t| t.known && t.has_raw());

        if have_raw {
            for seq in 0..ntel {
                let level = self.tels[seq].params.reco_level;
                if level < 3 {
                    continue;
                }
                {
                    let tel = &event.telescopes[seq];
                    if !tel.known || !tel.has_raw() {
                        continue;
                    }
                }
                if self.tels[seq].params.integration.is_some() {
                    self.pixel_integration(event, seq)?;
                }
                self.image_reconstruct(event, seq)?;
                if level >= 4 {
                    let ctx = &self.tels[seq];
                    let total: f64 = ctx.amps.iter().sum();
                    log::info!(
                        "telescope {}: total image amplitude {total:.1} p.e.",
                        ctx.geom.tel_id
                    );
                }
            }
        }

        self.shower_reconstruct(event)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use iactrec_core::config::NeighborConfig;
    use iactrec_core::event::RawData;
    use iactrec_core::run::RunSetup;

    // Hexagonal 7-pixel camera: center pixel plus one ring.
    fn hex7_geom() -> CameraGeometry {
        let d = 0.05;
        let mut x = vec![0.0];
        let mut y = vec![0.0];
        for k in 0..6 {
            let ang = f64::from(k) * std::f64::consts::PI / 3.0;
            x.push(d * ang.cos());
            y.push(d * ang.sin());
        }
        CameraGeometry {
            tel_id: 1,
            pixel_x: x,
            pixel_y: y,
            size: vec![d; 7],
            area: vec![d * d * 0.866; 7],
            focal_length: 1.0,
            cam_rot: 0.0,
            shape: None,
        }
    }

    fn setup_two_tels() -> RunSetup {
        RunSetup {
            tel_positions: vec![[-50.0, 0.0, 0.0], [50.0, 0.0, 0.0]],
            pointing: vec![Default::default(); 2],
            reference_az: 0.0,
            reference_alt: 0.0,
        }
    }

    fn default_context_parts() -> (TelescopeCalibration, ReferencePulse, TelescopeTypeParams) {
        (
            TelescopeCalibration::uniform(7, 100.0, 0.1),
            ReferencePulse::default(),
            TelescopeTypeParams {
                neighbors: NeighborConfig::default().with_immediate_ratio(1.2),
                calib_scale: 1.0,
                ..Default::default()
            },
        )
    }

    fn sum_only_event(sums: &[i32]) -> ArrayEvent {
        let npix = sums.len();
        let mut raw = RawData::new(1, npix, 1);
        raw.known = true;
        raw.significant.fill(true);
        raw.gains[0].known.fill(true);
        raw.gains[0].sum.copy_from_slice(sums);
        ArrayEvent {
            telescopes: vec![TelescopeEvent {
                tel_id: 1,
                known: true,
                raw: Some(raw),
                images: vec![ImageParameters::default()],
                ..Default::default()
            }],
            triggered: vec![1],
            with_data: vec![1],
            ..Default::default()
        }
    }

    #[test]
    fn test_explicit_neighbor_build_only_once() {
        let (calib, pulse, params) = default_context_parts();
        let mut ctx = TelescopeContext::new(hex7_geom(), calib, pulse, params);
        ctx.build_neighbors().unwrap();
        assert!(matches!(
            ctx.build_neighbors(),
            Err(Error::NeighborsAlreadyBuilt { tel_id: 1 })
        ));
        // Changing the disabled mask resets the cache.
        ctx.set_disabled_pixels(&[3], || 1.0);
        ctx.build_neighbors().unwrap();
    }

    #[test]
    fn test_disabled_pixels_clip_and_hv() {
        let (calib, pulse, mut params) = default_context_parts();
        // Ring pixels sit at 0.05 m; clip just inside their outer edge.
        params.camera_clipping_deg = (0.05_f64).atan().to_degrees();
        let mut ctx = TelescopeContext::new(hex7_geom(), calib, pulse, params);
        let n = ctx.set_disabled_pixels(&[0], || 1.0);
        // All 6 ring pixels clipped plus the HV-disabled center.
        assert_eq!(n, 7);
        assert!(ctx.disabled().iter().all(|&d| d));
    }

    #[test]
    fn test_broken_pixel_fraction_uses_rng() {
        let (calib, pulse, mut params) = default_context_parts();
        params.broken_pixels_fraction = 0.5;
        let mut ctx = TelescopeContext::new(hex7_geom(), calib, pulse, params);
        let mut draws = [0.1, 0.9, 0.2, 0.8, 0.9, 0.9, 0.9].into_iter();
        let n = ctx.set_disabled_pixels(&[], move || draws.next().unwrap());
        assert_eq!(n, 2);
    }

    #[test]
    fn test_image_reconstruct_fills_slot() {
        let mut pipeline = ReconstructionPipeline::new(setup_two_tels());
        let (calib, pulse, params) = default_context_parts();
        pipeline
            .add_telescope(hex7_geom(), calib, pulse, params)
            .unwrap();
        // Center pixel 100 p.e., one neighbor 60 p.e. after calibration.
        let mut event = sum_only_event(&[1100, 700, 100, 100, 100, 100, 100]);
        pipeline.image_reconstruct(&mut event, 0).unwrap();
        let img = &event.telescopes[0].images[0];
        assert!(img.known);
        assert_eq!(img.pixels, 2);
        assert_relative_eq!(img.amplitude, 160.0, max_relative = 1e-12);
        assert_eq!(img.cut_id, 1);
        assert_eq!(pipeline.telescope(0).unwrap().image_pixels(), &[0, 1]);
    }

    #[test]
    fn test_image_reconstruct_requires_slot() {
        let mut pipeline = ReconstructionPipeline::new(setup_two_tels());
        let (calib, pulse, params) = default_context_parts();
        pipeline
            .add_telescope(hex7_geom(), calib, pulse, params)
            .unwrap();
        let mut event = sum_only_event(&[1100; 7]);
        event.telescopes[0].images.clear();
        assert!(matches!(
            pipeline.image_reconstruct(&mut event, 0),
            Err(Error::NoImageSlot { tel_id: 1, slot: 0 })
        ));
    }

    #[test]
    fn test_lost_trigger_drops_telescope() {
        let mut pipeline = ReconstructionPipeline::new(setup_two_tels());
        let (calib, pulse, params) = default_context_parts();
        pipeline
            .add_telescope(hex7_geom(), calib, pulse, params)
            .unwrap();
        pipeline
            .telescope_mut(0)
            .unwrap()
            .set_disabled_pixels(&[0, 1], || 1.0);
        let mut event = sum_only_event(&[1100; 7]);
        event.telescopes[0].trigger_pixels = vec![0, 1, 2];
        event.telescopes[0].min_pixel_mult = 2;
        pipeline.image_reconstruct(&mut event, 0).unwrap();
        assert!(!event.telescopes[0].known);
        assert!(event.triggered.is_empty());
    }

    #[test]
    fn test_add_telescope_bounded_by_setup() {
        let mut pipeline = ReconstructionPipeline::new(setup_two_tels());
        for _ in 0..2 {
            let (calib, pulse, params) = default_context_parts();
            pipeline
                .add_telescope(hex7_geom(), calib, pulse, params)
                .unwrap();
        }
        let (calib, pulse, params) = default_context_parts();
        assert!(matches!(
            pipeline.add_telescope(hex7_geom(), calib, pulse, params),
            Err(Error::InvalidTelescope { index: 2, ntel: 2 })
        ));
    }

    #[test]
    fn test_shower_unknown_with_single_image() {
        let mut pipeline = ReconstructionPipeline::new(setup_two_tels());
        let (calib, pulse, params) = default_context_parts();
        pipeline
            .add_telescope(hex7_geom(), calib, pulse, params)
            .unwrap();
        let mut event = sum_only_event(&[1100; 7]);
        pipeline.image_reconstruct(&mut event, 0).unwrap();
        let used = pipeline.shower_reconstruct(&mut event).unwrap();
        assert_eq!(used, 0);
        assert!(!event.shower.known);
    }
}
