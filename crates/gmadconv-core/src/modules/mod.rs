pub mod collimator;
pub mod comparator;
pub mod convert;
pub mod gmad;
pub mod harness;
pub mod mapper;
pub mod saveline;
pub mod serialization;
pub mod tfs;
pub mod tfs2gmad;

mod traits;

pub use traits::{LatticeBuilder, SimulationRunner};
