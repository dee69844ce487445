//! Statistical comparison of tracking and optics output from two codes.

mod distribution;
mod optics;
pub mod stats;

pub use distribution::{
    Coordinate, CoordinateComparison, DistributionComparison, PhaseSpace, compare_distributions,
};
pub use optics::{
    ComparisonThreshold, FunctionComparison, OPTICAL_FUNCTIONS, OpticalFunction, OpticsComparison,
    OpticsSource, compare_candidate_optics, compare_optics, compare_tables, render_optics_summary,
};
