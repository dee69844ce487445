//! Shared defaults for the converter and the comparison harness.

/// Length given to thin elements that carry no `L` property, in metres.
pub const PLACEHOLDER_LENGTH: f64 = 1.0e-6;
/// Elements shorter than this are treated as zero-length.
pub const ZERO_LENGTH_THRESHOLD: f64 = 1.0e-9;
pub const DEFAULT_BEAM_PIPE_RADIUS: f64 = 0.2;
pub const DEFAULT_COLLIMATOR_MATERIAL: &str = "Copper";
/// Saveline cavities quote energy gain in GeV; GMAD gradients are MV/m.
pub const GEV_TO_MEV: f64 = 1000.0;
pub const MULTIPOLE_MAX_ORDER: usize = 6;
pub const DEFAULT_NGENERATE: usize = 1000;
pub const DEFAULT_COLLIMATOR_LOG: &str = "collimators.dat";
pub const LATTICE_LINE_NAME: &str = "lattice";
/// Marker closing a lattice converted from a twiss table.
pub const END_OF_LINE_MARKER: &str = "theendoftheline";
/// MAD-X writes an emittance of exactly 1 when none was set on the beam.
pub const UNSET_TWISS_EMITTANCE: f64 = 1.0;
pub const FALLBACK_EMITTANCE: f64 = 1.0e-9;

pub const MAX_HARNESS_ATTEMPTS: usize = 5;
pub const DEFAULT_HARNESS_PARTICLES: usize = 1000;
pub const RESIDUAL_BIN_COUNT: usize = 15;
pub const DEFAULT_MAX_FRACTIONAL_DEVIATION: f64 = 0.05;
