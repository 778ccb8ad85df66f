//! Configuration module for PipeTune
//!
//! Provides the tunable-parameter file model (knobs, workload topology,
//! server and address settings) and the command-line settings.

mod model;
mod params;
mod settings;
mod topology;

pub use model::*;
pub use params::*;
pub use settings::*;
pub use topology::*;
