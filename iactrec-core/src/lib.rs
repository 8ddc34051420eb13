//! iactrec-core: Core types for IACT air-shower event reconstruction.
//!
//! This crate provides the foundational data model shared by the
//! reconstruction algorithms: camera geometry, per-event raw and calibrated
//! pixel data, calibration constants, image (Hillas) and shower parameter
//! records, and the per-telescope-type configuration surface.
//!

pub mod calib;
pub mod camera;
pub mod config;
pub mod error;
pub mod event;
pub mod image;
pub mod run;

pub use calib::{ReferencePulse, TelescopeCalibration};
pub use camera::{CameraGeometry, CameraRadius, PixelShape};
pub use config::{
    ChannelSelection, CleaningConfig, GainSelection, IntegrationConfig, IntegrationScheme,
    NeighborConfig, PulseShaping, TelescopeTypeParams,
};
pub use error::{Error, Result};
pub use event::{
    ArrayEvent, CalibratedPixels, GainChannel, PixelTiming, RawData, TelescopeEvent, TimingKind,
};
pub use image::{ImageParameters, ShowerParameters};
pub use run::{RunSetup, TelescopePointing};

/// Index of the high-gain channel.
pub const HI_GAIN: usize = 0;
/// Index of the low-gain channel.
pub const LO_GAIN: usize = 1;
/// Maximum number of gain channels per pixel.
pub const MAX_GAINS: usize = 2;

/// Upper bound on telescopes contributing to one geometry reconstruction.
pub const MAX_TEL: usize = 100;
