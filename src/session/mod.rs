//! Tuning session
//!
//! Drives the iterative experiment loop: remote baseline exchange, timed
//! local and remote runs, log parsing, diagnosis and write-back.

mod ops;
mod options;
mod policy;
mod tuner;

pub use ops::*;
pub use options::*;
pub use policy::*;
pub use tuner::*;
