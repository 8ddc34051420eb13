//! Error types for iactrec-core.

use thiserror::Error;

/// Result type alias for reconstruction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the reconstruction pipeline.
///
/// Degenerate-but-valid numerical outcomes (parallel image lines, an
/// undetermined timing slope, zero variance with only two telescopes) are
/// deliberately *not* errors; they are encoded in `Ok` status values so
/// that downstream aggregation can tell "computed and trivial" from
/// "not computed".
#[derive(Error, Debug)]
pub enum Error {
    /// Telescope sequence index outside the current run.
    #[error("invalid telescope index {index} (run has {ntel} telescopes)")]
    InvalidTelescope { index: usize, ntel: usize },

    /// Neighbor lists were already built for this telescope; rebuilding a
    /// live cache indicates a caller bug.
    #[error("neighbor lists for telescope {tel_id} already built")]
    NeighborsAlreadyBuilt { tel_id: u16 },

    /// Neither raw nor previously calibrated pixel data is present.
    #[error("telescope {tel_id}: neither raw nor calibrated pixel data available")]
    NoEventData { tel_id: u16 },

    /// Pixel timing block missing or not marked known.
    #[error("telescope {tel_id}: no usable pixel timing data")]
    NoTiming { tel_id: u16 },

    /// The requested image slot does not exist.
    #[error("telescope {tel_id}: image slot {slot} out of range")]
    NoImageSlot { tel_id: u16, slot: usize },

    /// A camera needs at least two pixels for radius and moment analysis.
    #[error("camera of telescope {tel_id} has too few pixels ({npix})")]
    TooFewPixels { tel_id: u16, npix: usize },

    /// More usable images than the geometry stage supports.
    #[error("too many usable images: {n} exceeds limit {max}")]
    TooManyTelescopes { n: usize, max: usize },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
