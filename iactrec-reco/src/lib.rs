//! iactrec-reco: Image and shower reconstruction for IACT arrays.
//!
//! The chain runs per telescope from raw ADC data to Hillas-style image
//! parameters, then combines the images of all telescopes into a
//! geometric shower direction and core position:
//!
//! 1. [`neighbors`] — camera neighbor graph and pixel-shape inference,
//! 2. [`integrate`] — pulse integration of sampled traces (five
//!    strategies behind the [`integrate::PulseIntegration`] trait),
//! 3. [`calibrate`] — ADC sums to photoelectron amplitudes with per-pixel
//!    gain selection,
//! 4. [`clean`] — dual-threshold tailcut image cleaning,
//! 5. [`moments`] — second-moment image parameterization,
//! 6. [`timing`] — time-gradient fit along the image axis,
//! 7. [`geometry`] — intersection of image axes in a common frame,
//! 8. [`pipeline`] — per-run orchestration of all of the above.

pub mod calibrate;
pub mod clean;
pub mod geometry;
pub mod integrate;
pub mod moments;
pub mod neighbors;
pub mod pipeline;
pub mod timing;

pub use calibrate::{calibrate_amplitude, AmplitudeSource, CalibrationOutcome, TriggerDelta};
pub use clean::clean_image_tailcut;
pub use geometry::{
    angle_between, shower_geometric_reconstruction, CoreFrame, Intersection, PairWeighting,
    ShowerSolution, TelescopeImage,
};
pub use integrate::{integration_correction, make_integrator, IntegrationInput, PulseIntegration};
pub use moments::{second_moments, MomentsInput};
pub use neighbors::NeighborGraph;
pub use pipeline::{ReconstructionPipeline, TelescopeContext};
pub use timing::pixel_timing_analysis;
